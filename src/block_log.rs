//! Append-only audit log of blocked addresses.
//!
//! Each successful drop produces one line:
//!
//! ```text
//! 2026-10-19 04:12:55 - Blocked IP: 203.0.113.9
//! ```
//!
//! The file is opened in append mode and never truncated or read back.

use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Destination for block records.
pub trait BlockSink {
    fn record(&mut self, addr: IpAddr) -> io::Result<()>;
}

/// Discards records (audit logging disabled).
#[derive(Debug, Default)]
pub struct NullBlockLog;

impl BlockSink for NullBlockLog {
    fn record(&mut self, _addr: IpAddr) -> io::Result<()> {
        Ok(())
    }
}

/// Audit log backed by a text file.
#[derive(Debug)]
pub struct FileBlockLog {
    path: PathBuf,
    file: File,
}

impl FileBlockLog {
    /// Open `path` for appending, creating it and its parent directory.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockSink for FileBlockLog {
    fn record(&mut self, addr: IpAddr) -> io::Result<()> {
        // One write per line so a crash never leaves a partial entry behind
        let line = format_entry(&Local::now().format(TIMESTAMP_FORMAT).to_string(), addr);
        self.file.write_all(line.as_bytes())
    }
}

impl<S: BlockSink + ?Sized> BlockSink for &mut S {
    fn record(&mut self, addr: IpAddr) -> io::Result<()> {
        (**self).record(addr)
    }
}

impl<S: BlockSink + ?Sized> BlockSink for Box<S> {
    fn record(&mut self, addr: IpAddr) -> io::Result<()> {
        (**self).record(addr)
    }
}

fn format_entry(timestamp: &str, addr: IpAddr) -> String {
    format!("{} - Blocked IP: {}\n", timestamp, addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_entry() {
        assert_eq!(
            format_entry("2026-10-19 04:12:55", "203.0.113.9".parse().unwrap()),
            "2026-10-19 04:12:55 - Blocked IP: 203.0.113.9\n"
        );
    }

    #[test]
    fn test_record_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log/blocked.log");

        let mut log = FileBlockLog::open(&path).unwrap();
        log.record("1.1.1.1".parse().unwrap()).unwrap();
        log.record("2001:db8::1".parse().unwrap()).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - Blocked IP: 1.1.1.1"));
        assert!(lines[1].ends_with(" - Blocked IP: 2001:db8::1"));
        // "YYYY-MM-DD HH:MM:SS" prefix
        assert_eq!(lines[0].find(" - ").unwrap(), 19);
    }

    #[test]
    fn test_reopen_never_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocked.log");

        FileBlockLog::open(&path)
            .unwrap()
            .record("1.1.1.1".parse().unwrap())
            .unwrap();
        FileBlockLog::open(&path)
            .unwrap()
            .record("2.2.2.2".parse().unwrap())
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("1.1.1.1"));
    }

    #[test]
    fn test_open_fails_on_directory() {
        let dir = TempDir::new().unwrap();
        assert!(FileBlockLog::open(dir.path()).is_err());
    }

    #[test]
    fn test_null_log() {
        let mut log = NullBlockLog;
        assert!(log.record("1.1.1.1".parse().unwrap()).is_ok());
    }
}

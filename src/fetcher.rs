//! Blacklist feed retrieval.
//!
//! The feed is published as a zip archive wrapping a flat text file. A fetch
//! either yields the complete text or fails with a [`FetchError`]; a partial
//! or corrupt feed is never handed to the compiler.

use async_trait::async_trait;
use reqwest::Client;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::FetchError;
use crate::utils::format_bytes;

const RETRY_DELAY_MS: u64 = 2000;

/// Upper bound on download attempts; keeps the total backoff under a minute
pub const MAX_RETRIES: u32 = 5;

/// Local file header signature of a zip archive
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Text of a fetched feed.
#[derive(Debug, Clone)]
pub struct FeedText {
    /// Where the text came from, for logs
    pub origin: String,
    pub content: String,
    /// Size of the downloaded or read payload before extraction
    pub payload_bytes: u64,
}

/// A source of blacklist feed text.
#[async_trait]
pub trait FeedSource: Send + Sync {
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<FeedText, FetchError>;
}

#[async_trait]
impl<T: FeedSource + ?Sized> FeedSource for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn fetch(&self) -> Result<FeedText, FetchError> {
        (**self).fetch().await
    }
}

/// Downloads the feed archive over HTTPS.
pub struct HttpFeed {
    client: Client,
    config: FeedConfig,
}

impl HttpFeed {
    pub fn new(config: &FeedConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("blockade/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Download with retry on transport errors and 5xx answers.
    ///
    /// Timeouts and 4xx answers are not retried.
    async fn download_with_retry(&self) -> Result<Vec<u8>, FetchError> {
        let attempts = self.config.retries.clamp(1, MAX_RETRIES);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = RETRY_DELAY_MS * (1 << (attempt - 1));
                debug!("Retry {} after {}ms for {}", attempt, delay, self.config.url);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.download().await {
                Ok(body) => return Ok(body),
                Err(e @ (FetchError::Http(_) | FetchError::Status(500..=599))) => {
                    warn!("Feed download attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Http("no download attempted".to_string())))
    }

    async fn download(&self) -> Result<Vec<u8>, FetchError> {
        let max = self.config.max_size;
        let timeout = self.config.timeout_secs;

        let mut response = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(len) = response.content_length() {
            if len > max {
                return Err(FetchError::TooLarge { size: len, max });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(e, timeout))? {
            if (body.len() + chunk.len()) as u64 > max {
                return Err(FetchError::TooLarge {
                    size: (body.len() + chunk.len()) as u64,
                    max,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn classify(err: reqwest::Error, timeout_secs: u64) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout_secs)
    } else {
        FetchError::Http(err.to_string())
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    fn describe(&self) -> String {
        format!("{} ({})", self.config.name, self.config.url)
    }

    async fn fetch(&self) -> Result<FeedText, FetchError> {
        info!("Downloading {} blacklist...", self.config.name);
        let body = self.download_with_retry().await?;
        info!("Downloaded {}", format_bytes(body.len() as u64));

        let content = extract_feed(
            &body,
            self.config.archive_entry.as_deref(),
            self.config.max_size,
        )?;
        Ok(FeedText {
            origin: self.config.url.clone(),
            content,
            payload_bytes: body.len() as u64,
        })
    }
}

/// Reads a feed from disk: a zip archive or an already-extracted text file.
pub struct FileFeed {
    path: PathBuf,
    archive_entry: Option<String>,
    max_size: u64,
}

impl FileFeed {
    pub fn new(path: &Path, archive_entry: Option<String>, max_size: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            archive_entry,
            max_size,
        }
    }
}

#[async_trait]
impl FeedSource for FileFeed {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<FeedText, FetchError> {
        let size = std::fs::metadata(&self.path)?.len();
        if size > self.max_size {
            return Err(FetchError::TooLarge {
                size,
                max: self.max_size,
            });
        }
        let payload = std::fs::read(&self.path)?;

        let content = if payload.starts_with(ZIP_MAGIC) {
            extract_feed(&payload, self.archive_entry.as_deref(), self.max_size)?
        } else {
            String::from_utf8(payload).map_err(|_| FetchError::Encoding)?
        };

        Ok(FeedText {
            origin: self.describe(),
            content,
            payload_bytes: size,
        })
    }
}

/// Decompress the feed text out of a zip archive.
///
/// With `entry` set, that file is used (matched by full path, then by file
/// name). Without it, the archive must hold exactly one file, or exactly
/// one `.txt` file.
pub fn extract_feed(archive: &[u8], entry: Option<&str>, max_size: u64) -> Result<String, FetchError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| FetchError::Archive(e.to_string()))?;

    let names: Vec<String> = zip
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(str::to_string)
        .collect();
    let name = select_entry(&names, entry)?;
    debug!("Extracting '{}' from feed archive", name);

    let file = zip
        .by_name(&name)
        .map_err(|e| FetchError::Archive(e.to_string()))?;
    if file.size() > max_size {
        return Err(FetchError::TooLarge {
            size: file.size(),
            max: max_size,
        });
    }

    // The declared size can lie; cap what is actually inflated
    let mut raw = Vec::new();
    file.take(max_size + 1)
        .read_to_end(&mut raw)
        .map_err(|e| FetchError::Archive(e.to_string()))?;
    if raw.len() as u64 > max_size {
        return Err(FetchError::TooLarge {
            size: raw.len() as u64,
            max: max_size,
        });
    }

    String::from_utf8(raw).map_err(|_| FetchError::Encoding)
}

fn select_entry(names: &[String], wanted: Option<&str>) -> Result<String, FetchError> {
    if let Some(wanted) = wanted {
        if let Some(exact) = names.iter().find(|n| n.as_str() == wanted) {
            return Ok(exact.clone());
        }
        return names
            .iter()
            .find(|n| n.rsplit('/').next() == Some(wanted))
            .cloned()
            .ok_or_else(|| FetchError::MissingEntry(wanted.to_string()));
    }

    if names.len() == 1 {
        return Ok(names[0].clone());
    }
    let texts: Vec<&String> = names.iter().filter(|n| n.ends_with(".txt")).collect();
    match texts.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(FetchError::Archive("archive holds no text file".to_string())),
        _ => Err(FetchError::Archive(format!(
            "archive holds {} text files, set feed.archive_entry",
            texts.len()
        ))),
    }
}

//! mod_evasive configuration for Apache httpd.

use anyhow::{Context, Result};
use tracing::info;

use super::AuxiliaryStep;
use crate::cmd_abstraction::{args_to_strings, CommandExecutor};
use crate::config::HttpDosConfig;
use crate::utils::write_atomic;

/// Writes the anti-DoS module config and restarts the web server.
pub struct HttpDosModule<E: CommandExecutor> {
    config: HttpDosConfig,
    executor: E,
}

impl<E: CommandExecutor> HttpDosModule<E> {
    pub fn new(config: HttpDosConfig, executor: E) -> Self {
        Self { config, executor }
    }

    fn render(&self) -> String {
        let c = &self.config;
        format!(
            "# Managed by blockade. Local changes are overwritten on every run.\n\
             LoadModule evasive20_module {}\n\
             \n\
             <IfModule mod_evasive24.c>\n\
             \x20   DOSHashTableSize    {}\n\
             \x20   DOSPageCount        {}\n\
             \x20   DOSPageInterval     {}\n\
             \x20   DOSSiteCount        {}\n\
             \x20   DOSSiteInterval     {}\n\
             \x20   DOSBlockingPeriod   {}\n\
             </IfModule>\n",
            c.module_path,
            c.hash_table_size,
            c.page_count,
            c.page_interval,
            c.site_count,
            c.site_interval,
            c.blocking_period
        )
    }
}

impl<E: CommandExecutor> AuxiliaryStep for HttpDosModule<E> {
    fn name(&self) -> &str {
        "http anti-DoS module"
    }

    fn run(&self) -> Result<()> {
        let path = &self.config.config_path;
        info!("Writing {}...", path.display());
        write_atomic(path, self.render().as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Restarting {}...", self.config.service);
        let args = args_to_strings(&["restart", &self.config.service]);
        let output = self.executor.execute("systemctl", &args)?;
        if !output.success {
            anyhow::bail!(
                "systemctl restart {} failed: {}",
                self.config.service,
                output.failure_reason()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandOutput, MockCommandExecutor};
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> HttpDosConfig {
        HttpDosConfig {
            enabled: true,
            config_path: dir.path().join("conf.d/mod_evasive.conf"),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_template() {
        let module = HttpDosModule::new(HttpDosConfig::default(), MockCommandExecutor::new());
        let text = module.render();
        assert!(text.contains("LoadModule evasive20_module modules/mod_evasive24.so\n"));
        assert!(text.contains("<IfModule mod_evasive24.c>"));
        assert!(text.contains("    DOSPageCount        2\n"));
        assert!(text.contains("    DOSSiteCount        50\n"));
        assert!(text.contains("    DOSBlockingPeriod   10\n"));
        assert!(text.ends_with("</IfModule>\n"));
    }

    #[test]
    fn test_module_loaded_before_its_settings() {
        let config = HttpDosConfig {
            module_path: "/usr/lib64/httpd/modules/mod_evasive24.so".to_string(),
            ..Default::default()
        };
        let text = HttpDosModule::new(config, MockCommandExecutor::new()).render();

        let load = text
            .find("LoadModule evasive20_module /usr/lib64/httpd/modules/mod_evasive24.so")
            .unwrap();
        let block = text.find("<IfModule mod_evasive24.c>").unwrap();
        assert!(load < block);
    }

    #[test]
    fn test_run_writes_and_restarts() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let path = config.config_path.clone();

        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|program, args| {
                program == "systemctl" && args == ["restart".to_string(), "httpd".to_string()]
            })
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    ..Default::default()
                })
            });

        HttpDosModule::new(config, mock).run().unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.contains("LoadModule evasive20_module"));
        assert!(written.contains("DOSHashTableSize    3097"));
    }

    #[test]
    fn test_restart_failure_is_error() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().times(1).returning(|_, _| {
            Ok(CommandOutput {
                stderr: "Unit httpd.service not found.".to_string(),
                code: Some(5),
                ..Default::default()
            })
        });

        let err = HttpDosModule::new(config_in(&dir), mock).run().unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}

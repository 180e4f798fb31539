//! Per-invocation defaults layered: compiled-in -> TOML file -> environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Resolved defaults consulted whenever a [`crate::request::TransferRequest`]
/// field is left at its "use the default" sentinel (`-1`, `<= 0`, `None`).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retry_limit: u32,
    pub report_interval_secs: u64,
    pub rsync_binary: PathBuf,
    pub log_dir: PathBuf,
    pub stack_dump_interval_secs: u64,
    pub stack_dump_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            report_interval_secs: 5,
            rsync_binary: PathBuf::from("/usr/local/bin/rsync"),
            log_dir: PathBuf::from("/var/log/rsync-wrapper"),
            stack_dump_interval_secs: 3600,
            stack_dump_dir: PathBuf::from("/var/log/rsync-wrapper-stack"),
        }
    }
}

/// On-disk shape of the optional TOML file pointed to by `RSYNC_WRAPPER_CONFIG`.
/// Every field is optional so a file only needs to override what it cares about.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    retry_limit: Option<u32>,
    report_interval_secs: Option<u64>,
    rsync_binary: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    stack_dump_interval_secs: Option<u64>,
    stack_dump_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Resolves defaults from compiled-in values, an optional TOML file named
    /// by `RSYNC_WRAPPER_CONFIG`, and individual `RSYNC_WRAPPER_*` overrides,
    /// in that order of increasing precedence.
    pub fn resolve() -> Self {
        Self::resolve_from_env(|key| std::env::var(key).ok())
    }

    /// Testable variant that takes an environment lookup function instead of
    /// reading the real process environment.
    pub fn resolve_from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("RSYNC_WRAPPER_CONFIG") {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                match toml::from_str::<FileConfig>(&contents) {
                    Ok(file) => config.apply_file(file),
                    Err(e) => {
                        log::warn!("[config-Warning] failed to parse {}: {}", path, e);
                    }
                }
            } else {
                log::warn!("[config-Warning] RSYNC_WRAPPER_CONFIG set but unreadable: {}", path);
            }
        }

        if let Some(v) = lookup("RSYNC_WRAPPER_RETRY_LIMIT").and_then(|s| s.parse().ok()) {
            config.retry_limit = v;
        }
        if let Some(v) = lookup("RSYNC_WRAPPER_REPORT_INTERVAL").and_then(|s| s.parse().ok()) {
            config.report_interval_secs = v;
        }
        if let Some(v) = lookup("RSYNC_WRAPPER_RSYNC_BIN") {
            config.rsync_binary = PathBuf::from(v);
        }
        if let Some(v) = lookup("RSYNC_WRAPPER_LOG_DIR") {
            config.log_dir = PathBuf::from(v);
        }

        config
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.retry_limit {
            self.retry_limit = v;
        }
        if let Some(v) = file.report_interval_secs {
            self.report_interval_secs = v;
        }
        if let Some(v) = file.rsync_binary {
            self.rsync_binary = v;
        }
        if let Some(v) = file.log_dir {
            self.log_dir = v;
        }
        if let Some(v) = file.stack_dump_interval_secs {
            self.stack_dump_interval_secs = v;
        }
        if let Some(v) = file.stack_dump_dir {
            self.stack_dump_dir = v;
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_with_no_environment() {
        let config = EngineConfig::resolve_from_env(|_| None);
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.report_interval_secs, 5);
        assert_eq!(config.rsync_binary, PathBuf::from("/usr/local/bin/rsync"));
    }

    #[test]
    fn env_overrides_defaults() {
        let mut env = HashMap::new();
        env.insert("RSYNC_WRAPPER_RETRY_LIMIT".to_string(), "7".to_string());
        env.insert(
            "RSYNC_WRAPPER_RSYNC_BIN".to_string(),
            "/opt/bin/rsync".to_string(),
        );
        let config = EngineConfig::resolve_from_env(|key| env.get(key).cloned());
        assert_eq!(config.retry_limit, 7);
        assert_eq!(config.rsync_binary, PathBuf::from("/opt/bin/rsync"));
        assert_eq!(config.report_interval_secs, 5);
    }

    #[test]
    fn file_config_parses_partial_toml() {
        let toml_str = "retry_limit = 9\nlog_dir = \"/tmp/logs\"\n";
        let parsed: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.retry_limit, Some(9));
        assert_eq!(parsed.log_dir, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(parsed.rsync_binary, None);
    }
}

//! The immutable per-invocation description of one transfer.

use std::path::{Path, PathBuf};

/// Everything a Workflow needs to run, assembled once by the CLI layer from
/// flags/environment and never mutated afterward.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source_mount: PathBuf,
    pub dest_mount: PathBuf,
    pub source_relative: String,
    pub dest_tmp_relative: String,
    pub dest_final_relative: String,
    pub track_file_relative: Option<String>,

    pub sparse: bool,
    pub overwrite: bool,
    /// Retained for parity with the CLI's `--checksum` flag; verification and
    /// sidecar generation are actually driven by `checksum_suffixes` alone.
    pub generate_checksum: bool,
    pub checksum_suffixes: Vec<String>,
    pub filter_rules: Vec<String>,

    /// -1 selects [`crate::config::EngineConfig::retry_limit`].
    pub retry_limit: i32,

    pub report_progress: bool,
    pub report_stderr: bool,
    pub report_url: Option<String>,
    /// <=0 selects [`crate::config::EngineConfig::report_interval_secs`].
    pub report_interval_secs: i64,

    /// Skips the mount-type probe entirely.
    pub debug: bool,
    pub rsync_binary: Option<PathBuf>,

    pub exclude_src_dir: bool,

    pub ignore_src_not_exist: bool,
    pub ignore_src_is_dir: bool,
    pub ignore_dest_is_dir: bool,
    pub remove_input_file: bool,
}

impl TransferRequest {
    pub fn source_path(&self) -> PathBuf {
        self.source_mount.join(&self.source_relative)
    }

    pub fn dest_tmp_dir(&self) -> PathBuf {
        self.dest_mount.join(&self.dest_tmp_relative)
    }

    pub fn dest_final_dir(&self) -> PathBuf {
        self.dest_mount.join(&self.dest_final_relative)
    }

    pub fn track_file_path(&self) -> Option<PathBuf> {
        self.track_file_relative
            .as_ref()
            .map(|rel| self.dest_mount.join(rel))
    }

    pub fn rsync_binary_path<'a>(&'a self, default: &'a Path) -> &'a Path {
        self.rsync_binary.as_deref().unwrap_or(default)
    }

    pub fn matches_checksum_suffix(&self, name: &str) -> bool {
        self.checksum_suffixes
            .iter()
            .any(|suffix| suffix_glob_matches(suffix, name))
    }
}

/// Matches a simple `*suffix` glob (the only shape checksum-suffix globs use).
fn suffix_glob_matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) => name.ends_with(suffix),
        None => name == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> TransferRequest {
        TransferRequest {
            source_mount: PathBuf::from("/mnt/a"),
            dest_mount: PathBuf::from("/mnt/b"),
            source_relative: "f.bin".into(),
            dest_tmp_relative: "t".into(),
            dest_final_relative: "F".into(),
            track_file_relative: None,
            sparse: false,
            overwrite: false,
            generate_checksum: true,
            checksum_suffixes: vec!["*.bin".into()],
            filter_rules: vec![],
            retry_limit: -1,
            report_progress: false,
            report_stderr: false,
            report_url: None,
            report_interval_secs: 0,
            debug: false,
            rsync_binary: None,
            exclude_src_dir: false,
            ignore_src_not_exist: false,
            ignore_src_is_dir: false,
            ignore_dest_is_dir: false,
            remove_input_file: false,
        }
    }

    #[test]
    fn resolves_absolute_paths() {
        let req = base_request();
        assert_eq!(req.source_path(), PathBuf::from("/mnt/a/f.bin"));
        assert_eq!(req.dest_tmp_dir(), PathBuf::from("/mnt/b/t"));
        assert_eq!(req.dest_final_dir(), PathBuf::from("/mnt/b/F"));
    }

    #[test]
    fn checksum_suffix_glob() {
        let req = base_request();
        assert!(req.matches_checksum_suffix("f.bin"));
        assert!(!req.matches_checksum_suffix("f.txt"));
    }

    #[test]
    fn default_rsync_binary_falls_back() {
        let req = base_request();
        let default = Path::new("/usr/local/bin/rsync");
        assert_eq!(req.rsync_binary_path(default), default);
    }
}

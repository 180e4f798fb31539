pub mod cleanup;
pub mod dir_copy;
pub mod file_copy;
pub mod list_copy;

use std::cell::RefCell;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;
use crate::file_system::FileSystem;
use crate::progress::ProgressCounters;
use crate::reporter::{spawn_progress_ticker, Reporter};
use crate::request::TransferRequest;
use crate::retry::{run_with_retry as run_retry_loop, RetryOutcome};
use crate::taxonomy::Outcome;

const NFS_STAT_RETRIES: u32 = 5;
const NFS_STAT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bundles the optional progress ticker and end-of-run failure report that
/// accompany a retry-wrapped rsync invocation, built from a
/// `TransferRequest`'s `report_*` fields. One instance is started before the
/// rsync attempts begin and torn down after the retry loop settles.
pub struct TransferReporting {
    counters: Option<Arc<ProgressCounters>>,
    reporter: Option<Arc<Reporter>>,
    ticker: Option<(Arc<AtomicBool>, std::thread::JoinHandle<()>)>,
    report_stderr: bool,
}

impl TransferReporting {
    pub fn start(req: &TransferRequest) -> Self {
        let reporter = req
            .report_url
            .as_ref()
            .map(|url| Arc::new(Reporter::new(url.clone())));
        let counters = if req.report_progress || reporter.is_some() {
            Some(Arc::new(ProgressCounters::new()))
        } else {
            None
        };
        let ticker = match (req.report_progress, &reporter, &counters) {
            (true, Some(reporter), Some(counters)) => {
                let interval = Duration::from_secs(req.report_interval_secs.max(1) as u64);
                Some(spawn_progress_ticker(
                    reporter.clone(),
                    counters.clone(),
                    interval,
                ))
            }
            _ => None,
        };
        Self {
            counters,
            reporter,
            ticker,
            report_stderr: req.report_stderr,
        }
    }

    /// Shared counters the driver should observe progress lines into, if any
    /// reporting was requested.
    pub fn counters(&self) -> Option<Arc<ProgressCounters>> {
        self.counters.clone()
    }

    /// Runs `attempt` through the retry state machine, POSTing an end-of-run
    /// failure report (if `report_stderr` and a report URL are configured)
    /// once the loop settles on a non-success outcome.
    pub fn run_with_retry(
        &self,
        retry_limit: u32,
        mut attempt: impl FnMut(Option<Arc<ProgressCounters>>) -> Outcome,
    ) -> (RetryOutcome, u32) {
        let counters = self.counters.clone();
        let last = RefCell::new(None);

        let result = run_retry_loop(retry_limit, || {
            let outcome = attempt(counters.clone());
            *last.borrow_mut() = Some(outcome.clone());
            outcome
        });

        if self.report_stderr {
            if let (Some(reporter), Some(last)) = (&self.reporter, last.into_inner()) {
                match &result.0 {
                    RetryOutcome::DirectExit(code) => {
                        reporter.report_failure(*code, &last.reason, &last.stderr);
                    }
                    RetryOutcome::Exhausted { last_code } => {
                        // Report the underlying rsync failure, then the
                        // retry-limit sentinel itself, per the retry FSM's
                        // exhaustion step.
                        reporter.report_failure(*last_code, &last.reason, &last.stderr);
                        reporter.report_failure(
                            crate::taxonomy::canonical::RETRY_LIMIT,
                            &last.reason,
                            &last.stderr,
                        );
                    }
                    RetryOutcome::Succeeded => {}
                }
            }
        }

        result
    }

    /// Cancels and joins the progress ticker, if one was started. Must be
    /// called before the workflow returns so the thread never outlives it.
    pub fn finish(self) {
        if let Some((cancel, handle)) = self.ticker {
            cancel.store(true, Ordering::Relaxed);
            let _ = handle.join();
        }
    }
}

/// Rejects paths this engine refuses to operate on: empty, not absolute, or
/// carrying a trailing `/`, `/*`, or `/.` where a plain file path is expected.
pub fn validate_file_path(path: &Path) -> Result<(), EngineError> {
    let s = path.to_string_lossy();
    if s.is_empty() || !s.starts_with('/') {
        return Err(EngineError::InvalidPath(s.into_owned()));
    }
    if s.ends_with('/') || s.ends_with("/*") || s.ends_with("/.") {
        return Err(EngineError::InvalidPath(s.into_owned()));
    }
    Ok(())
}

/// Rejects directory paths this engine refuses to operate on: empty or not
/// absolute. Unlike [`validate_file_path`], a trailing slash is expected and
/// allowed on directory arguments.
pub fn validate_dir_path(path: &Path) -> Result<(), EngineError> {
    let s = path.to_string_lossy();
    if s.is_empty() || !s.starts_with('/') {
        return Err(EngineError::InvalidPath(s.into_owned()));
    }
    Ok(())
}

/// Stats `path`, retrying only on `ENOENT` to ride out NFS attribute cache
/// staleness: up to [`NFS_STAT_RETRIES`] attempts, [`NFS_STAT_RETRY_DELAY`]
/// apart. Any other stat error (permission denied, I/O fault, ...) surfaces
/// immediately instead of being absorbed into the retry loop.
pub fn stat_with_nfs_retry(fs: &dyn FileSystem, path: &Path) -> Result<(), EngineError> {
    stat_with_nfs_retry_sleep(fs, path, std::thread::sleep)
}

/// Testable variant taking an injectable sleep function so retry timing tests
/// do not need to burn real wall-clock seconds.
pub fn stat_with_nfs_retry_sleep(
    fs: &dyn FileSystem,
    path: &Path,
    sleep: impl Fn(Duration),
) -> Result<(), EngineError> {
    for attempt in 0..NFS_STAT_RETRIES {
        match fs.stat(path) {
            Ok(()) => return Ok(()),
            Err(crate::file_system::FsError::NotFound(_)) => {}
            Err(e) => return Err(EngineError::FileSystem(e)),
        }
        if attempt + 1 < NFS_STAT_RETRIES {
            sleep(NFS_STAT_RETRY_DELAY);
        }
    }
    Err(EngineError::FileSystem(crate::file_system::FsError::NotFound(
        path.display().to_string(),
    )))
}

/// Idempotent directory creation: succeeds if `path` already exists as a
/// directory, fails distinctly if it exists as something else.
pub fn check_or_create_dir(fs: &dyn FileSystem, path: &Path) -> Result<(), EngineError> {
    if fs.exists(path) {
        if fs.is_dir(path) {
            return Ok(());
        }
        return Err(EngineError::NotADirectory(path.display().to_string()));
    }
    fs.create_dir_all(path).map_err(EngineError::FileSystem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_file_path() {
        assert!(validate_file_path(Path::new("rel/path")).is_err());
    }

    #[test]
    fn rejects_trailing_slash_on_file_path() {
        assert!(validate_file_path(Path::new("/a/b/")).is_err());
    }

    #[test]
    fn rejects_trailing_dotstar_on_file_path() {
        assert!(validate_file_path(Path::new("/a/b/*")).is_err());
        assert!(validate_file_path(Path::new("/a/b/.")).is_err());
    }

    #[test]
    fn accepts_plain_absolute_file_path() {
        assert!(validate_file_path(Path::new("/a/b/f.bin")).is_ok());
    }

    #[test]
    fn dir_path_allows_trailing_slash() {
        assert!(validate_dir_path(Path::new("/a/b/")).is_ok());
    }

    #[test]
    fn stat_retry_gives_up_on_enoent() {
        use crate::file_system::real_file_system::RealFileSystem;
        use std::cell::Cell;

        let fs = RealFileSystem::new();
        let sleeps = Cell::new(0u32);
        let result = stat_with_nfs_retry_sleep(&fs, Path::new("/nonexistent/path/xyz"), |_| {
            sleeps.set(sleeps.get() + 1);
        });
        assert!(result.is_err());
        assert_eq!(sleeps.get(), NFS_STAT_RETRIES - 1);
    }

    /// A stub implementing only the bits of `FileSystem` these tests drive;
    /// every other method panics if exercised.
    struct StatOnlyFs(crate::file_system::FsError);

    impl FileSystem for StatOnlyFs {
        fn exists(&self, _path: &Path) -> bool {
            unimplemented!()
        }
        fn is_dir(&self, _path: &Path) -> bool {
            unimplemented!()
        }
        fn is_file(&self, _path: &Path) -> bool {
            unimplemented!()
        }
        fn is_symlink(&self, _path: &Path) -> bool {
            unimplemented!()
        }
        fn stat(&self, _path: &Path) -> Result<(), crate::file_system::FsError> {
            Err(self.0.clone())
        }
        fn create_dir_all(&self, _path: &Path) -> Result<(), crate::file_system::FsError> {
            unimplemented!()
        }
        fn remove_dir_all(&self, _path: &Path) -> Result<(), crate::file_system::FsError> {
            unimplemented!()
        }
        fn read_dir(&self, _path: &Path) -> Result<Vec<std::path::PathBuf>, crate::file_system::FsError> {
            unimplemented!()
        }
        fn read_to_string(&self, _path: &Path) -> Result<String, crate::file_system::FsError> {
            unimplemented!()
        }
        fn write(&self, _path: &Path, _content: &str) -> Result<(), crate::file_system::FsError> {
            unimplemented!()
        }
        fn create_symlink(&self, _original: &Path, _link: &Path) -> Result<(), crate::file_system::FsError> {
            unimplemented!()
        }
        fn read_link(&self, _path: &Path) -> Result<std::path::PathBuf, crate::file_system::FsError> {
            unimplemented!()
        }
        fn remove_symlink(&self, _path: &Path) -> Result<(), crate::file_system::FsError> {
            unimplemented!()
        }
        fn available_space(&self, _path: &Path) -> Result<u64, crate::file_system::FsError> {
            unimplemented!()
        }
        fn dir_size(&self, _path: &Path) -> Result<u64, crate::file_system::FsError> {
            unimplemented!()
        }
        fn copy_file(&self, _from: &Path, _to: &Path) -> Result<(), crate::file_system::FsError> {
            unimplemented!()
        }
        fn rename(&self, _from: &Path, _to: &Path) -> Result<(), crate::file_system::FsError> {
            unimplemented!()
        }
        fn hard_link(&self, _original: &Path, _link: &Path) -> Result<(), crate::file_system::FsError> {
            unimplemented!()
        }
        fn walk_dir(&self, _path: &Path) -> Result<Vec<std::path::PathBuf>, crate::file_system::FsError> {
            unimplemented!()
        }
        fn filesystem_type(&self, _path: &Path) -> Option<String> {
            unimplemented!()
        }
    }

    #[test]
    fn stat_retry_surfaces_non_enoent_error_immediately() {
        use std::cell::Cell;

        let fs = StatOnlyFs(crate::file_system::FsError::PermissionDenied("/src".into()));
        let sleeps = Cell::new(0u32);
        let result = stat_with_nfs_retry_sleep(&fs, Path::new("/src"), |_| {
            sleeps.set(sleeps.get() + 1);
        });
        assert!(matches!(
            result,
            Err(EngineError::FileSystem(crate::file_system::FsError::PermissionDenied(_)))
        ));
        assert_eq!(sleeps.get(), 0, "must not sleep/retry on a non-ENOENT stat error");
    }

    fn base_transfer_request() -> TransferRequest {
        TransferRequest {
            source_mount: Path::new("/mnt/a").to_path_buf(),
            dest_mount: Path::new("/mnt/b").to_path_buf(),
            source_relative: "f.bin".into(),
            dest_tmp_relative: "t".into(),
            dest_final_relative: "F".into(),
            track_file_relative: None,
            sparse: false,
            overwrite: false,
            generate_checksum: false,
            checksum_suffixes: vec![],
            filter_rules: vec![],
            retry_limit: 0,
            report_progress: false,
            report_stderr: true,
            report_url: None,
            report_interval_secs: 0,
            debug: true,
            rsync_binary: None,
            exclude_src_dir: false,
            ignore_src_not_exist: false,
            ignore_src_is_dir: false,
            ignore_dest_is_dir: false,
            remove_input_file: false,
        }
    }

    /// Drains `expected` HTTP requests off a local listener, replying 200 to
    /// each, and returns the handle to join once the caller is done POSTing.
    fn spawn_counting_server(
        listener: std::net::TcpListener,
        expected: usize,
    ) -> (Arc<std::sync::atomic::AtomicUsize>, std::thread::JoinHandle<()>) {
        use std::io::{Read, Write};
        use std::sync::atomic::AtomicUsize;

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let handle = std::thread::spawn(move || {
            for stream in listener.incoming().take(expected) {
                if let Ok(mut stream) = stream {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf);
                    let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        (count, handle)
    }

    #[test]
    fn exhausted_retry_reports_last_code_then_retry_limit() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (count, handle) = spawn_counting_server(listener, 2);

        let mut req = base_transfer_request();
        req.report_url = Some(format!("http://{}/report", addr));

        let reporting = TransferReporting::start(&req);
        let (result, _attempts) = reporting.run_with_retry(0, |_| Outcome {
            exit_code: 10,
            reason: "recoverable".into(),
            stderr: String::new(),
        });
        reporting.finish();

        assert_eq!(result, RetryOutcome::Exhausted { last_code: 5 });
        handle.join().unwrap();
        assert_eq!(
            count.load(Ordering::SeqCst),
            2,
            "expected one report for the last rsync code and one for the retry-limit sentinel"
        );
    }
}

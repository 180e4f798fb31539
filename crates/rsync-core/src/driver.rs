//! Spawns rsync as a child process, captures its output, and classifies the result.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::progress::{self, ProgressCounters};
use crate::taxonomy::{driver_code, Outcome};

/// The fixed baseline options every invocation passes to rsync, ahead of any
/// filter rules and the source/dest arguments.
const BASE_OPTS: &str = "-rlptgoHA";

pub struct RsyncArgs<'a> {
    pub sparse: bool,
    pub progress: bool,
    pub filter_rules: &'a [String],
    pub src: &'a str,
    pub dest: &'a str,
}

/// Builds the argv passed to rsync: baseline flags, `--partial`, optional
/// `--sparse`/`--progress`, one `--filter=<rule>` per configured rule, then
/// source and destination.
pub fn build_argv(args: &RsyncArgs) -> Vec<String> {
    let mut argv = vec![BASE_OPTS.to_string(), "--partial".to_string()];
    if args.sparse {
        argv.push("--sparse".to_string());
    }
    if args.progress {
        argv.push("--progress".to_string());
    }
    for rule in args.filter_rules {
        argv.push(format!("--filter={}", rule));
    }
    argv.push(args.src.to_string());
    argv.push(args.dest.to_string());
    argv
}

pub struct RsyncDriver {
    binary: std::path::PathBuf,
}

impl RsyncDriver {
    pub fn new(binary: impl AsRef<Path>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
        }
    }

    /// Spawns rsync with the computed argv and waits for it to exit.
    ///
    /// When `counters` is `Some`, stdout is piped and consumed line-by-line by
    /// a dedicated reader thread that feeds the progress parser (the
    /// separate-pipe path); stderr is always captured in full. When `counters`
    /// is `None` (progress reporting not requested), stdout is discarded and
    /// rsync's exit is awaited directly via the simpler combined-capture path,
    /// matching the original wrapper's `isReportProgress` branch.
    pub fn execute(
        &self,
        args: &RsyncArgs,
        counters: Option<Arc<ProgressCounters>>,
    ) -> Outcome {
        let argv = build_argv(args);

        if let Some(counters) = counters {
            self.execute_with_progress(&argv, counters)
        } else {
            self.execute_combined(&argv)
        }
    }

    fn execute_combined(&self, argv: &[String]) -> Outcome {
        let output = match Command::new(&self.binary).args(argv).output() {
            Ok(o) => o,
            Err(e) => {
                return Outcome {
                    exit_code: driver_code::SPAWN_FAILED,
                    reason: e.to_string(),
                    stderr: String::new(),
                }
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(driver_code::WAIT_FAILED);
        Outcome {
            exit_code,
            reason: exit_reason(exit_code),
            stderr,
        }
    }

    fn execute_with_progress(&self, argv: &[String], counters: Arc<ProgressCounters>) -> Outcome {
        let mut child = match Command::new(&self.binary)
            .args(argv)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                return Outcome {
                    exit_code: driver_code::SPAWN_FAILED,
                    reason: e.to_string(),
                    stderr: String::new(),
                }
            }
        };

        let stdout = match child.stdout.take() {
            Some(s) => s,
            None => {
                return Outcome {
                    exit_code: driver_code::PIPE_FAILED,
                    reason: "stdout pipe unavailable".to_string(),
                    stderr: String::new(),
                }
            }
        };
        let stderr_pipe = match child.stderr.take() {
            Some(s) => s,
            None => {
                return Outcome {
                    exit_code: driver_code::PIPE_FAILED,
                    reason: "stderr pipe unavailable".to_string(),
                    stderr: String::new(),
                }
            }
        };

        let progress_handle = std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines().map_while(Result::ok) {
                progress::observe_line(&line, &counters);
            }
        });

        let stderr_handle = std::thread::spawn(move || {
            let reader = BufReader::new(stderr_pipe);
            let mut buf = String::new();
            for line in reader.lines().map_while(Result::ok) {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        let status = match child.wait() {
            Ok(s) => s,
            Err(e) => {
                let _ = progress_handle.join();
                let _ = stderr_handle.join();
                return Outcome {
                    exit_code: driver_code::WAIT_FAILED,
                    reason: e.to_string(),
                    stderr: String::new(),
                };
            }
        };

        let _ = progress_handle.join();
        let stderr = stderr_handle.join().unwrap_or_default();

        let exit_code = status.code().unwrap_or(driver_code::WAIT_FAILED);
        Outcome {
            exit_code,
            reason: exit_reason(exit_code),
            stderr,
        }
    }
}

fn exit_reason(exit_code: i32) -> String {
    if exit_code == 0 {
        "process succeed complete with exit code 0".to_string()
    } else {
        format!("process exited with code {}", exit_code)
    }
}

//! Background kernel- and user-space stack snapshots of a stuck rsync tree.
//!
//! Runs on a fixed interval for long file copies so an operator staring at a
//! wedged worker has something to look at besides "still running".

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_RUNNING: u8 = 0;
const STATE_SLEEPING: u8 = 1;

/// Shared between the dumper thread and the main workflow: lets the main
/// thread wait a bounded amount of time for an in-flight dump to finish
/// before exiting, so a partial snapshot is never left on disk.
pub struct DumpState(AtomicU8);

impl DumpState {
    pub fn new() -> Self {
        Self(AtomicU8::new(STATE_SLEEPING))
    }

    pub fn mark_running(&self) {
        self.0.store(STATE_RUNNING, Ordering::SeqCst);
    }

    pub fn mark_sleeping(&self) {
        self.0.store(STATE_SLEEPING, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst) == STATE_RUNNING
    }
}

impl Default for DumpState {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits up to 30s for an in-flight dump cycle to finish.
pub fn wait_dump_complete(state: &DumpState) {
    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    while state.is_running() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(200));
    }
}

/// Locates the sender/receiver/generator process tree rooted at `wrapper_pid`
/// by repeatedly following the first child whose command name contains
/// "rsync". Returns up to three descendant pids in sender, receiver,
/// generator order, plus the wrapper pid itself as the fourth.
pub fn locate_rsync_tree(wrapper_pid: u32) -> Vec<u32> {
    let mut pids = vec![wrapper_pid];
    let mut current = wrapper_pid;
    for _ in 0..3 {
        match first_rsync_child(current) {
            Some(child) => {
                pids.push(child);
                current = child;
            }
            None => break,
        }
    }
    pids
}

fn first_rsync_child(pid: u32) -> Option<u32> {
    let output = Command::new("pgrep")
        .arg("-l")
        .arg("-P")
        .arg(pid.to_string())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    for line in text.lines() {
        let mut parts = line.splitn(2, ' ');
        let pid_str = parts.next()?;
        let name = parts.next().unwrap_or("");
        if name.contains("rsync") {
            return pid_str.parse().ok();
        }
    }
    None
}

/// Snapshots `/proc/<pid>/task/*/stack` for each pid, concatenated with a
/// `"thread: <path>\n"` banner per task, into `save_dir/<timestamp>`.
pub fn dump_kernel_stacks(pids: &[u32], save_dir: &Path, timestamp: &str) -> std::io::Result<()> {
    fs::create_dir_all(save_dir)?;
    let mut contents = String::new();
    for pid in pids {
        let task_dir = PathBuf::from(format!("/proc/{}/task", pid));
        let entries = match fs::read_dir(&task_dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let stack_path = entry.path().join("stack");
            if let Ok(stack) = fs::read_to_string(&stack_path) {
                contents.push_str(&format!("thread: {}\n", stack_path.display()));
                contents.push_str(&stack);
                contents.push('\n');
            }
        }
    }
    fs::write(save_dir.join(timestamp), contents)
}

/// Captures a gdb backtrace of every thread in `pid`, writing it to
/// `save_dir/user/<timestamp>-<pid>`.
pub fn dump_user_backtrace(pid: u32, save_dir: &Path, timestamp: &str) -> std::io::Result<()> {
    let user_dir = save_dir.join("user");
    fs::create_dir_all(&user_dir)?;
    let output = Command::new("gdb")
        .arg("-batch")
        .arg("-ex")
        .arg("thread apply all bt")
        .arg("-p")
        .arg(pid.to_string())
        .output()?;
    fs::write(
        user_dir.join(format!("{}-{}", timestamp, pid)),
        output.stdout,
    )
}

/// Runs one stack-dump cycle: locate the process tree, snapshot kernel
/// stacks and gdb backtraces for each pid, record the pids in a summary file.
pub fn run_cycle(wrapper_pid: u32, save_dir: &Path, timestamp: &str) {
    let pids = locate_rsync_tree(wrapper_pid);

    if let Err(e) = dump_kernel_stacks(&pids, save_dir, timestamp) {
        log::warn!("[Stack-Debug] failed to write kernel stack dump: {}", e);
    }
    for pid in &pids {
        if let Err(e) = dump_user_backtrace(*pid, save_dir, timestamp) {
            log::warn!("[Stack-Debug] failed to capture gdb backtrace for {}: {}", pid, e);
        }
    }

    let summary = pids.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
    if let Err(e) = fs::write(save_dir.join(format!("{}-pids", timestamp)), summary) {
        log::warn!("[Stack-Debug] failed to write pid summary: {}", e);
    }
}

/// Formats the current instant as RFC3339, used to name each dump cycle's
/// output files.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Spawns the background dumper thread. Reads `SRM_TASK_ID` on each cycle;
/// if unset, that cycle is a no-op (per-cycle, not per-process, so the
/// variable can appear mid-run in exotic schedulers).
pub fn spawn(
    wrapper_pid: u32,
    interval: Duration,
    base_dir: PathBuf,
    state: Arc<DumpState>,
    cancel: Arc<std::sync::atomic::AtomicBool>,
    now_fn: impl Fn() -> String + Send + 'static,
) -> std::thread::JoinHandle<()> {
    const POLL: Duration = Duration::from_millis(200);

    std::thread::spawn(move || {
        'outer: while !cancel.load(Ordering::Relaxed) {
            let mut waited = Duration::ZERO;
            while waited < interval {
                if cancel.load(Ordering::Relaxed) {
                    break 'outer;
                }
                std::thread::sleep(POLL);
                waited += POLL;
            }
            let task_id = match std::env::var("SRM_TASK_ID") {
                Ok(v) if !v.is_empty() => v,
                _ => continue,
            };
            state.mark_running();
            let save_dir = base_dir.join(&task_id);
            run_cycle(wrapper_pid, &save_dir, &now_fn());
            state.mark_sleeping();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_state_starts_sleeping() {
        let state = DumpState::new();
        assert!(!state.is_running());
    }

    #[test]
    fn dump_state_transitions() {
        let state = DumpState::new();
        state.mark_running();
        assert!(state.is_running());
        state.mark_sleeping();
        assert!(!state.is_running());
    }

    #[test]
    fn wait_dump_complete_returns_promptly_when_sleeping() {
        let state = DumpState::new();
        let start = std::time::Instant::now();
        wait_dump_complete(&state);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn locate_rsync_tree_includes_wrapper_pid() {
        let pids = locate_rsync_tree(std::process::id());
        assert_eq!(pids[0], std::process::id());
    }
}

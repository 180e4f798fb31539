//! Periodic progress and once-off failure reporting to an HTTP sink.
//!
//! A failed POST is logged and discarded; reporting must never fail the
//! transfer itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::progress::ProgressCounters;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ReportPayload {
    current_count: i64,
    total_count: i64,
    message: String,
    errcode: i64,
    reason: String,
}

pub struct Reporter {
    client: reqwest::blocking::Client,
    url: String,
}

impl Reporter {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            client,
            url: url.into(),
        }
    }

    fn post(&self, payload: &ReportPayload) {
        match self.client.post(&self.url).json(payload).send() {
            Ok(resp) if !resp.status().is_success() => {
                log::warn!(
                    "[report-Warning] endpoint returned status {}",
                    resp.status()
                );
            }
            Err(e) => {
                log::warn!("[report-Warning] failed to POST report: {}", e);
            }
            Ok(_) => {}
        }
    }

    pub fn report_progress(&self, current: u64, total: u64) {
        self.post(&ReportPayload {
            current_count: current as i64,
            total_count: total as i64,
            message: String::new(),
            errcode: 0,
            reason: String::new(),
        });
    }

    pub fn report_failure(&self, errcode: i32, reason: &str, stderr: &str) {
        self.post(&ReportPayload {
            current_count: 0,
            total_count: 0,
            message: stderr.to_string(),
            errcode: errcode as i64,
            reason: reason.to_string(),
        });
    }
}

/// Spawns the progress ticker thread. Returns a cancellation flag the caller
/// must set before joining, so the thread wakes and exits promptly rather than
/// blocking past the workflow's own lifetime.
pub fn spawn_progress_ticker(
    reporter: Arc<Reporter>,
    counters: Arc<ProgressCounters>,
    interval: Duration,
) -> (Arc<AtomicBool>, std::thread::JoinHandle<()>) {
    const POLL: Duration = Duration::from_millis(50);

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel.clone();
    let handle = std::thread::spawn(move || {
        'outer: while !cancel_clone.load(Ordering::Relaxed) {
            let mut waited = Duration::ZERO;
            while waited < interval {
                if cancel_clone.load(Ordering::Relaxed) {
                    break 'outer;
                }
                std::thread::sleep(POLL.min(interval));
                waited += POLL;
            }
            let (current, total) = counters.get();
            reporter.report_progress(current, total);
        }
        // One final drain so the last known counters reach the sink.
        let (current, total) = counters.get();
        reporter.report_progress(current, total);
    });
    (cancel, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_expected_shape() {
        let payload = ReportPayload {
            current_count: 10,
            total_count: 100,
            message: String::new(),
            errcode: 0,
            reason: String::new(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["current_count"], 10);
        assert_eq!(json["total_count"], 100);
        assert_eq!(json["errcode"], 0);
    }

    #[test]
    fn progress_ticker_can_be_cancelled() {
        let reporter = Arc::new(Reporter::new("http://127.0.0.1:0/report"));
        let counters = Arc::new(ProgressCounters::new());
        let (cancel, handle) =
            spawn_progress_ticker(reporter, counters, Duration::from_millis(10));
        cancel.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}

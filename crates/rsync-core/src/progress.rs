//! Parses rsync's `--progress` stdout into shared atomic counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use regex::Regex;

/// Current/total counters updated by the progress reader thread and read by
/// the reporter thread on each tick. Relaxed ordering is sufficient: these
/// are a best-effort progress indicator, not a synchronization point.
#[derive(Default)]
pub struct ProgressCounters {
    current: AtomicU64,
    total: AtomicU64,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, current: u64, total: u64) {
        self.current.store(current, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64) {
        (
            self.current.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }
}

// rsync --progress summary line, e.g.:
//      32,768 100%   31.25kB/s    0:00:00 (xfr#1, to-chk=2/4)
// rsync 3.1+ may use ir-chk instead of to-chk (incremental recursion).
static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*([\d.,]+[KMGkmg]?)\s+(\d+)%\s+([\d.]+\w+/s)\s+(\d+:\d+:\d+)(?:\s+\(xfr#(\d+),\s*(?:to|ir)-chk=(\d+)/(\d+)\))?",
    )
    .expect("invalid progress regex")
});

// The bare "cur-total" form some call sites feed the parser directly.
static CUR_TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)$").expect("invalid cur-total regex"));

/// A parsed `(current, total)` pair extracted from one line of rsync output,
/// if that line carried one.
pub fn parse_progress_line(line: &str) -> Option<(u64, u64)> {
    if let Some(caps) = CUR_TOTAL_RE.captures(line.trim()) {
        let current: u64 = caps[1].parse().ok()?;
        let total: u64 = caps[2].parse().ok()?;
        return Some((current, total));
    }

    let caps = PROGRESS_RE.captures(line)?;
    let remaining = caps.get(6).and_then(|m| m.as_str().parse::<u64>().ok());
    let total = caps.get(7).and_then(|m| m.as_str().parse::<u64>().ok());
    match (remaining, total) {
        (Some(remaining), Some(total)) => Some((total.saturating_sub(remaining), total)),
        _ => None,
    }
}

/// Parses a byte value that may be human-readable (e.g. `"205.18M"`) or a raw
/// integer with thousands separators.
pub fn parse_human_bytes(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let last = s.as_bytes()[s.len() - 1];
    match last {
        b'K' | b'k' => {
            let num: f64 = s[..s.len() - 1].replace(',', "").parse().ok()?;
            Some((num * 1_000.0) as u64)
        }
        b'M' | b'm' => {
            let num: f64 = s[..s.len() - 1].replace(',', "").parse().ok()?;
            Some((num * 1_000_000.0) as u64)
        }
        b'G' | b'g' => {
            let num: f64 = s[..s.len() - 1].replace(',', "").parse().ok()?;
            Some((num * 1_000_000_000.0) as u64)
        }
        _ => s.replace(',', "").parse().ok(),
    }
}

/// Feeds one line of rsync stdout through the parser and, if it carried
/// progress information, stores the result into `counters`.
pub fn observe_line(line: &str, counters: &ProgressCounters) {
    if let Some((current, total)) = parse_progress_line(line) {
        counters.set(current, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cur_total_form() {
        assert_eq!(parse_progress_line("42-100"), Some((42, 100)));
    }

    #[test]
    fn parses_rich_progress_line() {
        let line = "     32,768 100%   31.25kB/s    0:00:00 (xfr#1, to-chk=2/4)";
        assert_eq!(parse_progress_line(line), Some((2, 4)));
    }

    #[test]
    fn parses_ir_chk_variant() {
        let line = "     65,536 100%   62.50kB/s    0:00:01 (xfr#42, ir-chk=0/100)";
        assert_eq!(parse_progress_line(line), Some((100, 100)));
    }

    #[test]
    fn non_progress_line_is_none() {
        assert_eq!(parse_progress_line("sending incremental file list"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn counters_round_trip() {
        let counters = ProgressCounters::new();
        observe_line("10-20", &counters);
        assert_eq!(counters.get(), (10, 20));
        observe_line("not progress at all", &counters);
        assert_eq!(counters.get(), (10, 20));
    }

    #[test]
    fn parse_human_bytes_suffixes() {
        assert_eq!(parse_human_bytes("205.18M"), Some(205_180_000));
        assert_eq!(parse_human_bytes("1.20G"), Some(1_200_000_000));
        assert_eq!(parse_human_bytes("32,768"), Some(32_768));
    }
}

//! Wraps repeated rsync attempts in the retry state machine from the outcome
//! taxonomy: distinguishes recoverable, unrecoverable, and "vanished" results.

use crate::classifier::classify_stderr;
use crate::taxonomy::{self, is_recoverable, is_unrecoverable, Outcome};

const VANISHED: i32 = 24;

#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded,
    DirectExit(i32),
    Exhausted { last_code: i32 },
}

/// Runs `attempt` (one rsync invocation) up to `retry_limit + 1` times,
/// following the same transition order as the original wrapper:
/// success, then vanished-without-counting, then stderr-phrase short-circuit,
/// then the unrecoverable table, then vanished-again, then the recoverable
/// counter.
pub fn run_with_retry(
    retry_limit: u32,
    mut attempt: impl FnMut() -> Outcome,
) -> (RetryOutcome, u32) {
    let mut attempts_made = 0u32;
    let mut retry_count = 0u32;

    loop {
        let outcome = attempt();
        attempts_made += 1;

        if outcome.exit_code == 0 {
            return (RetryOutcome::Succeeded, attempts_made);
        }

        let stderr_hit = if !outcome.stderr.is_empty() {
            classify_stderr(&outcome.stderr)
        } else {
            None
        };

        if !outcome.stderr.is_empty() && outcome.exit_code == VANISHED {
            log::info!("[Retry] source vanished mid-scan, retrying without counting");
            continue;
        }

        if let Some(code) = stderr_hit {
            return (RetryOutcome::DirectExit(code), attempts_made);
        }

        if is_unrecoverable(outcome.exit_code) {
            let code = taxonomy::exit_code_from_outcome(&outcome);
            return (RetryOutcome::DirectExit(code), attempts_made);
        }

        if outcome.exit_code == VANISHED {
            log::info!("[Retry] source vanished mid-scan, retrying without counting");
            continue;
        }

        if is_recoverable(outcome.exit_code) {
            retry_count += 1;
            if retry_count > retry_limit {
                return (
                    RetryOutcome::Exhausted {
                        last_code: taxonomy::exit_code_from_outcome(&outcome),
                    },
                    attempts_made,
                );
            }
            log::warn!(
                "[Retry] attempt {} failed with code {}, retrying ({}/{})",
                attempts_made,
                outcome.exit_code,
                retry_count,
                retry_limit
            );
            continue;
        }

        // Unknown code outside both sets: treat as unrecoverable via the taxonomy table.
        let code = taxonomy::exit_code_from_outcome(&outcome);
        return (RetryOutcome::DirectExit(code), attempts_made);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(code: i32, stderr: &str) -> Outcome {
        Outcome {
            exit_code: code,
            reason: "test".into(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn vanished_does_not_count_against_limit() {
        let sequence = vec![outcome(24, ""), outcome(24, ""), outcome(0, "")];
        let mut iter = sequence.into_iter();
        let (result, attempts) = run_with_retry(0, || iter.next().unwrap());
        assert_eq!(result, RetryOutcome::Succeeded);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn vanished_then_recoverable_counts_only_recoverable() {
        let sequence = vec![outcome(24, ""), outcome(24, ""), outcome(10, "")];
        let mut iter = sequence.into_iter();
        let (result, attempts) = run_with_retry(0, || iter.next().unwrap_or(outcome(10, "")));
        assert_eq!(result, RetryOutcome::Exhausted { last_code: 255 });
        assert_eq!(attempts, 3);
    }

    #[test]
    fn retry_cap_exhausts_after_n_plus_one_attempts() {
        let mut count = 0;
        let (result, attempts) = run_with_retry(3, || {
            count += 1;
            outcome(10, "")
        });
        assert_eq!(result, RetryOutcome::Exhausted { last_code: 255 });
        assert_eq!(attempts, 4);
        assert_eq!(count, 4);
    }

    #[test]
    fn posix_phrase_short_circuits_before_retry() {
        let (result, attempts) = run_with_retry(3, || {
            outcome(23, "rsync: mkdir failed: Permission denied (13)\n")
        });
        assert_eq!(result, RetryOutcome::DirectExit(13));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn unrecoverable_code_short_circuits() {
        let (result, attempts) = run_with_retry(3, || outcome(2, ""));
        assert_eq!(result, RetryOutcome::DirectExit(2));
        assert_eq!(attempts, 1);
    }
}

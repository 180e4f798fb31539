//! Maps the many shapes of rsync/OS failure to a single canonical exit code.

use crate::classifier::classify_stderr;
use crate::error::EngineError;

/// The outcome of one rsync child-process invocation.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub exit_code: i32,
    pub reason: String,
    pub stderr: String,
}

impl Outcome {
    pub fn success(reason: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            reason: reason.into(),
            stderr: String::new(),
        }
    }
}

/// Sentinel codes injected by the driver itself, ahead of rsync's own code space.
pub mod driver_code {
    pub const PIPE_FAILED: i32 = -10;
    pub const SPAWN_FAILED: i32 = -11;
    pub const WAIT_FAILED: i32 = -12;
}

/// The integer this engine actually hands to `exit(2)`.
pub type CanonicalExit = i32;

pub mod canonical {
    use super::CanonicalExit;

    pub const SUCCESS: CanonicalExit = 0;
    pub const CHECKSUM_REFUSE: CanonicalExit = 201;
    pub const UNKNOWN_FS: CanonicalExit = 202;
    pub const SAME_FILE: CanonicalExit = 203;
    pub const SELF_NEST: CanonicalExit = 204;
    pub const INVALID_LIST_FILE: CanonicalExit = 205;
    pub const RETRY_LIMIT: CanonicalExit = 208;
    pub const COPYLIST_PARTIAL: CanonicalExit = 252;
    pub const COPY_FILE_SUCCEEDED: CanonicalExit = 254;
    pub const GENERIC_SYSTEM: CanonicalExit = 255;

    /// Offset applied to a canonical code when it is recorded as a per-record
    /// manifest code, except for the reserved `SYSTEM_ERROR_SENTINEL`.
    pub const MANIFEST_OFFSET: CanonicalExit = 1200;
    pub const SYSTEM_ERROR_SENTINEL: CanonicalExit = 1001;
}

/// Whether an rsync-native code is worth retrying without operator intervention.
pub fn is_recoverable(code: i32) -> bool {
    matches!(
        code,
        10 | 11 | 12 | 13 | 14 | 15 | 16 | 19 | 20 | 21 | 22 | 23 | 24 | 25 | 30 | 35 | 124 | 125
            | 126 | 127
    ) || code == driver_code::PIPE_FAILED
        || code == driver_code::SPAWN_FAILED
        || code == driver_code::WAIT_FAILED
}

pub fn is_unrecoverable(code: i32) -> bool {
    matches!(code, 1 | 2 | 3 | 4 | 5)
}

/// Collapses an [`Outcome`] to the code this engine writes via `exit(2)`.
///
/// Precedence, matching the original wrapper: exact success, then any known
/// stderr phrase (which overrides even a "successful-looking" rsync code),
/// then driver-injected faults, then the rsync-native code table.
pub fn exit_code_from_outcome(outcome: &Outcome) -> CanonicalExit {
    if outcome.exit_code == 0 {
        return canonical::SUCCESS;
    }
    if let Some(code) = classify_stderr(&outcome.stderr) {
        return code;
    }
    match outcome.exit_code {
        driver_code::PIPE_FAILED | driver_code::SPAWN_FAILED | driver_code::WAIT_FAILED => {
            canonical::GENERIC_SYSTEM
        }
        1 | 4 => 22,
        3 => 2,
        2 | 5 | 14 | 15 | 16 | 19 | 20 | 21 | 25 | 30 | 35 | 124 | 125 | 126 | 127 => {
            canonical::GENERIC_SYSTEM
        }
        10 | 11 | 12 | 13 => 5,
        23 => 13,
        22 => canonical::GENERIC_SYSTEM,
        _ => canonical::GENERIC_SYSTEM,
    }
}

/// Maps an internal [`EngineError`] straight to a canonical exit code, for the
/// failure paths that never go through rsync at all (path validation, mount
/// probe, checksum mismatch, retry exhaustion, ...).
pub fn exit_code_from_engine_error(err: &EngineError) -> CanonicalExit {
    match err {
        EngineError::FileSystem(_) => canonical::GENERIC_SYSTEM,
        EngineError::Spawn(_) | EngineError::Wait(_) => canonical::GENERIC_SYSTEM,
        EngineError::InvalidPath(_) => 22,
        EngineError::NotADirectory(_) => 20,
        EngineError::SameFile(_) => canonical::SAME_FILE,
        EngineError::SelfNest(_) => canonical::SELF_NEST,
        EngineError::DestinationExists(_) => 17,
        EngineError::ChecksumMismatch(_) => canonical::CHECKSUM_REFUSE,
        EngineError::UnavailableFilesystem(_) => canonical::UNKNOWN_FS,
        EngineError::InvalidManifestLine(_) => canonical::INVALID_LIST_FILE,
        EngineError::RetryExhausted(_, _) => canonical::RETRY_LIMIT,
    }
}

/// The per-record code written into a list-copy output manifest: the canonical
/// code shifted into the 1200s, except the reserved system-error sentinel.
pub fn manifest_record_code(canonical: CanonicalExit) -> CanonicalExit {
    if canonical == canonical::GENERIC_SYSTEM {
        canonical::SYSTEM_ERROR_SENTINEL
    } else {
        canonical + canonical::MANIFEST_OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_zero() {
        let o = Outcome::success("ok");
        assert_eq!(exit_code_from_outcome(&o), 0);
    }

    #[test]
    fn stderr_phrase_overrides_code_table() {
        let o = Outcome {
            exit_code: 23,
            reason: "partial transfer".into(),
            stderr: "rsync: mkdir failed: Permission denied (13)\n".into(),
        };
        assert_eq!(exit_code_from_outcome(&o), 13);
    }

    #[test]
    fn code_table_partial_maps_to_permission_denied() {
        let o = Outcome {
            exit_code: 23,
            reason: "partial".into(),
            stderr: String::new(),
        };
        assert_eq!(exit_code_from_outcome(&o), 13);
    }

    #[test]
    fn driver_faults_map_to_generic_system() {
        for code in [
            driver_code::PIPE_FAILED,
            driver_code::SPAWN_FAILED,
            driver_code::WAIT_FAILED,
        ] {
            let o = Outcome {
                exit_code: code,
                reason: "driver fault".into(),
                stderr: String::new(),
            };
            assert_eq!(exit_code_from_outcome(&o), canonical::GENERIC_SYSTEM);
        }
    }

    #[test]
    fn manifest_offset_applies_except_sentinel() {
        assert_eq!(manifest_record_code(2), 1202);
        assert_eq!(manifest_record_code(canonical::GENERIC_SYSTEM), 1001);
    }

    #[test]
    fn not_a_directory_maps_to_20() {
        let err = EngineError::NotADirectory("/mnt/b/t".into());
        assert_eq!(exit_code_from_engine_error(&err), 20);
    }
}

//! Bottom-up substring classification of rsync's captured stderr.

/// Known POSIX phrases rsync prints to stderr, in the order they are tested
/// against each line. Order only matters within a single line; precedence
/// across lines comes from scanning bottom-up.
const PHRASE_TABLE: &[(&str, i32)] = &[
    ("No such file or directory", 2),
    ("Input/output error", 5),
    ("Permission denied", 13),
    ("Device or resource busy", 16),
    ("File exists", 17),
    ("Not a directory", 20),
    ("Is a directory", 21),
    ("Invalid argument", 22),
    ("No space left on device", 28),
    ("Read-only file system", 30),
    ("Disk quota exceeded", 122),
    ("Stale file handle", 116),
];

/// Scans `stderr` from the last line to the first, returning the canonical
/// code of the first known phrase matched. The last line dominates earlier
/// warnings, since it is closest to the actual terminal failure.
pub fn classify_stderr(stderr: &str) -> Option<i32> {
    if stderr.is_empty() {
        return None;
    }
    for line in stderr.lines().rev() {
        for (phrase, code) in PHRASE_TABLE {
            if line.contains(phrase) {
                return Some(*code);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stderr_is_none() {
        assert_eq!(classify_stderr(""), None);
    }

    #[test]
    fn single_phrase_matches() {
        assert_eq!(
            classify_stderr("rsync: mkdir \"/mnt/b/t/\" failed: No space left on device (28)\n"),
            Some(28)
        );
    }

    #[test]
    fn bottom_up_precedence() {
        let stderr = "rsync: connection unexpectedly closed: Input/output error\n\
                       rsync: recv_generator: mkdir failed: Permission denied (13)\n";
        assert_eq!(classify_stderr(stderr), Some(13));
    }

    #[test]
    fn no_known_phrase_is_none() {
        assert_eq!(classify_stderr("rsync error: some unrelated message\n"), None);
    }

    #[test]
    fn stale_handle_matches() {
        assert_eq!(
            classify_stderr("rsync: readlink_stat(\"foo\") failed: Stale file handle (116)\n"),
            Some(116)
        );
    }
}

//! Best-effort reverse of a copy: removes everything a copy would have left behind.

use std::path::{Path, PathBuf};

use crate::checksum;
use crate::error::EngineError;
use crate::file_system::FileSystem;
use crate::request::TransferRequest;
use crate::taxonomy::canonical;

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn append_slash(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.ends_with('/') {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{}/", s))
    }
}

fn completion_flag_path(tmp_dir: &Path) -> PathBuf {
    let stripped = tmp_dir.to_string_lossy();
    let stripped = stripped.trim_end_matches('/');
    PathBuf::from(format!("{}_succeed-copy-file", stripped))
}

/// Runs the cleanup workflow. Missing paths are never errors; every removal
/// is best-effort and logged, never surfaced as a failed exit code, since
/// this workflow exists precisely to undo a copy that may have partially
/// failed.
pub fn run(req: &TransferRequest, fs: &dyn FileSystem) -> i32 {
    match run_inner(req, fs) {
        Ok(()) => canonical::SUCCESS,
        Err(e) => {
            log::error!("[cleanup-Error] {}", e);
            crate::taxonomy::exit_code_from_engine_error(&e)
        }
    }
}

fn run_inner(req: &TransferRequest, fs: &dyn FileSystem) -> Result<(), EngineError> {
    let src = req.source_path();
    let final_dir = req.dest_final_dir();
    let tmp_dir = req.dest_tmp_dir();

    if fs.is_dir(&src) {
        if req.exclude_src_dir {
            if let Ok(entries) = fs.read_dir(&src) {
                for entry in entries {
                    let name = basename(&entry);
                    if name.is_empty() {
                        continue;
                    }
                    remove_best_effort(fs, &final_dir.join(name));
                }
            }
        } else {
            remove_best_effort(fs, &final_dir.join(basename(&src)));
        }
    } else {
        let target = final_dir.join(basename(&src));
        remove_best_effort(fs, &target);
        remove_best_effort(fs, &checksum::sidecar_path(&target));
        remove_best_effort(fs, &completion_flag_path(&append_slash(&tmp_dir)));
    }

    remove_best_effort(fs, &tmp_dir);

    if let Some(track_path) = req.track_file_path() {
        remove_best_effort(fs, &track_path);
    }

    Ok(())
}

fn remove_best_effort(fs: &dyn FileSystem, path: &Path) {
    if !fs.exists(path) {
        return;
    }
    let result = if fs.is_dir(path) {
        fs.remove_dir_all(path)
    } else {
        fs.remove_symlink(path)
    };
    if let Err(e) = result {
        log::warn!("[cleanup-Warning] failed to remove {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_flag_path_strips_trailing_slash() {
        let flag = completion_flag_path(Path::new("/mnt/b/t/"));
        assert_eq!(flag, PathBuf::from("/mnt/b/t_succeed-copy-file"));
    }
}

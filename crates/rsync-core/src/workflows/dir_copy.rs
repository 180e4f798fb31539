//! Directory-tree copy: collision check, rsync run, settle pause.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::driver::{RsyncArgs, RsyncDriver};
use crate::error::EngineError;
use crate::file_system::FileSystem;
use crate::mount::{self, MountProbe};
use crate::request::TransferRequest;
use crate::retry::RetryOutcome;
use crate::taxonomy::canonical;

const SETTLE_PAUSE: Duration = Duration::from_secs(5);
const COLLISION_PAGE_SIZE: usize = 100;

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

/// Whether `filter_rules` would exclude directory entry `name` from the
/// transfer, per the rsync `--filter` semantics this workflow relies on: a
/// rule ending in `name` or `name/` shields a directory, only `name` (not
/// `name/`) shields a plain file.
fn filter_excludes(filter_rules: &[String], name: &str, is_dir: bool) -> bool {
    let dir_suffix = format!("{}/", name);
    filter_rules.iter().any(|rule| {
        if is_dir {
            rule.ends_with(name) || rule.ends_with(&dir_suffix)
        } else {
            rule.ends_with(name) && !rule.ends_with(&dir_suffix)
        }
    })
}

pub fn run(
    req: &TransferRequest,
    fs: &dyn FileSystem,
    probe: &dyn MountProbe,
    config: &EngineConfig,
) -> i32 {
    match run_inner(req, fs, probe, config) {
        Ok(code) => code,
        Err(e) => {
            log::error!("[copy-Error] {}", e);
            crate::taxonomy::exit_code_from_engine_error(&e)
        }
    }
}

fn run_inner(
    req: &TransferRequest,
    fs: &dyn FileSystem,
    probe: &dyn MountProbe,
    config: &EngineConfig,
) -> Result<i32, EngineError> {
    let src = req.source_path();
    let final_dir = append_slash(&req.dest_final_dir());

    super::validate_dir_path(&src)?;
    super::validate_dir_path(&final_dir)?;

    if !req.debug
        && (mount::check_mount(probe, &req.source_mount).is_err()
            || mount::check_mount(probe, &req.dest_mount).is_err())
    {
        return Err(EngineError::UnavailableFilesystem(
            req.source_mount.display().to_string(),
        ));
    }

    let src_with_slash = append_slash(&src);

    if req.exclude_src_dir {
        if src_with_slash == final_dir {
            return Err(EngineError::SameFile(src.display().to_string()));
        }
        check_collisions(req, fs, &src, &final_dir)?;
    } else {
        let final_target = final_dir.join(basename(&src));
        if src == final_target {
            return Err(EngineError::SameFile(src.display().to_string()));
        }
        if src_with_slash == final_dir {
            return Err(EngineError::SelfNest(src.display().to_string()));
        }
    }

    let rsync_src = if req.exclude_src_dir {
        src_with_slash.to_string_lossy().into_owned()
    } else {
        src.to_string_lossy().into_owned()
    };
    let rsync_dest = final_dir.to_string_lossy().into_owned();

    let driver = RsyncDriver::new(req.rsync_binary_path(&config.rsync_binary));
    let retry_limit = if req.retry_limit < 0 {
        config.retry_limit
    } else {
        req.retry_limit as u32
    };

    let reporting = super::TransferReporting::start(req);
    let (retry_outcome, _attempts) = reporting.run_with_retry(retry_limit, |counters| {
        let args = RsyncArgs {
            sparse: req.sparse,
            progress: req.report_progress,
            filter_rules: &req.filter_rules,
            src: &rsync_src,
            dest: &rsync_dest,
        };
        driver.execute(&args, counters)
    });
    reporting.finish();

    let code = match retry_outcome {
        RetryOutcome::Succeeded => canonical::SUCCESS,
        RetryOutcome::DirectExit(code) => code,
        RetryOutcome::Exhausted { last_code } => {
            log::warn!("[Retry] retry limit exhausted, last canonical code {}", last_code);
            canonical::RETRY_LIMIT
        }
    };

    std::thread::sleep(SETTLE_PAUSE);
    Ok(code)
}

/// Scans the destination directory in pages, failing the whole workflow on
/// any name collision the filter rules wouldn't have excluded anyway.
fn check_collisions(
    req: &TransferRequest,
    fs: &dyn FileSystem,
    src: &Path,
    final_dir: &Path,
) -> Result<(), EngineError> {
    if !fs.is_dir(final_dir) {
        return Ok(());
    }
    let entries = fs.read_dir(final_dir).map_err(EngineError::FileSystem)?;

    for chunk in entries.chunks(COLLISION_PAGE_SIZE) {
        for dest_entry in chunk {
            let name = basename(dest_entry);
            if name.is_empty() {
                continue;
            }
            let src_entry = src.join(&name);
            if !fs.exists(&src_entry) {
                continue;
            }
            let is_dir = fs.is_dir(&src_entry);
            if !filter_excludes(&req.filter_rules, &name, is_dir) {
                return Err(collision_error(dest_entry));
            }
        }
    }
    Ok(())
}

fn collision_error(path: &Path) -> EngineError {
    EngineError::DestinationExists(path.display().to_string())
}

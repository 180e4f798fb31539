//! Single-file copy: stage to temp, optionally verify, atomic rename, flag.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::checksum;
use crate::config::EngineConfig;
use crate::driver::{RsyncArgs, RsyncDriver};
use crate::error::EngineError;
use crate::file_system::FileSystem;
use crate::mount::{self, MountProbe};
use crate::request::TransferRequest;
use crate::retry::RetryOutcome;
use crate::stack_dump::{self, DumpState};
use crate::taxonomy::canonical;

const COMPLETION_FLAG_SUFFIX: &str = "_succeed-copy-file";

fn completion_flag_path(tmp_dir: &Path) -> PathBuf {
    let stripped = tmp_dir.to_string_lossy();
    let stripped = stripped.trim_end_matches('/');
    PathBuf::from(format!("{}{}", stripped, COMPLETION_FLAG_SUFFIX))
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Runs the single-file copy workflow end to end and returns the canonical
/// exit code the worker binary should pass to `exit(2)`.
pub fn run(
    req: &TransferRequest,
    fs: &dyn FileSystem,
    probe: &dyn MountProbe,
    config: &EngineConfig,
) -> i32 {
    let dump_state = Arc::new(DumpState::new());
    let cancel = Arc::new(AtomicBool::new(false));
    let dumper = stack_dump::spawn(
        std::process::id(),
        Duration::from_secs(config.stack_dump_interval_secs),
        config.stack_dump_dir.clone(),
        dump_state.clone(),
        cancel.clone(),
        stack_dump::now_rfc3339,
    );

    let code = match run_inner(req, fs, probe, config) {
        Ok(code) => code,
        Err(e) => {
            log::error!("[copy-Error] {}", e);
            crate::taxonomy::exit_code_from_engine_error(&e)
        }
    };

    cancel.store(true, Ordering::Relaxed);
    stack_dump::wait_dump_complete(&dump_state);
    let _ = dumper.join();

    code
}

fn run_inner(
    req: &TransferRequest,
    fs: &dyn FileSystem,
    probe: &dyn MountProbe,
    config: &EngineConfig,
) -> Result<i32, EngineError> {
    let src = req.source_path();
    let tmp_dir = append_slash(&req.dest_tmp_dir());
    let final_dir = append_slash(&req.dest_final_dir());

    super::validate_file_path(&src)?;
    super::validate_dir_path(&tmp_dir)?;
    super::validate_dir_path(&final_dir)?;

    if !req.debug {
        if mount::check_mount(probe, &req.source_mount).is_err()
            || mount::check_mount(probe, &req.dest_mount).is_err()
        {
            return Err(EngineError::UnavailableFilesystem(
                req.source_mount.display().to_string(),
            ));
        }
    }

    super::stat_with_nfs_retry(fs, &src)?;

    super::check_or_create_dir(fs, &tmp_dir)?;

    let final_target = final_dir.join(basename(&src));
    if src == final_target {
        return Err(EngineError::SameFile(src.display().to_string()));
    }

    let flag_path = completion_flag_path(&tmp_dir);
    if fs.is_file(&flag_path) {
        log::info!("[copy-Info] completion flag already present, treating as already copied");
        return Ok(canonical::COPY_FILE_SUCCEEDED);
    }

    let tmp_file = tmp_dir.join(basename(&src));
    let driver = RsyncDriver::new(req.rsync_binary_path(&config.rsync_binary));
    let src_str = src.to_string_lossy().into_owned();
    let tmp_file_str = tmp_file.to_string_lossy().into_owned();

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
            src: &src_str,
            dest: &tmp_file_str,
        };
        driver.execute(&args, counters)
    });
    reporting.finish();

    match retry_outcome {
        RetryOutcome::Succeeded => {}
        RetryOutcome::DirectExit(code) => return Ok(code),
        RetryOutcome::Exhausted { last_code } => {
            log::warn!("[Retry] retry limit exhausted, last canonical code {}", last_code);
            return Ok(canonical::RETRY_LIMIT);
        }
    }

    if req.matches_checksum_suffix(&basename(&src)) {
        verify_checksum_with_one_retry(req, &driver, &src, &tmp_file)?;
    }

    if fs.is_dir(&final_target) {
        return Ok(21);
    }
    if fs.is_file(&final_target) && !req.overwrite {
        return Ok(17);
    }

    fs.rename(&tmp_file, &final_target)
        .map_err(EngineError::FileSystem)?;

    if req.matches_checksum_suffix(&basename(&src)) {
        let sidecar = checksum::sidecar_path(&tmp_file);
        let final_sidecar = checksum::sidecar_path(&final_target);
        if fs.is_file(&sidecar) {
            if let Err(e) = fs.rename(&sidecar, &final_sidecar) {
                log::warn!("[copy-Warning] failed to rename checksum sidecar: {}", e);
            }
        }
    }

    if let Some(track_path) = req.track_file_path() {
        super::check_or_create_dir(
            fs,
            track_path.parent().unwrap_or(Path::new("/")),
        )?;
        if let Err(e) = fs.write(&track_path, "") {
            log::warn!("[copy-Warning] failed to write track file: {}", e);
        }
    }

    if let Err(e) = fs.remove_dir_all(&tmp_dir) {
        log::warn!("[copy-Warning] failed to remove temp dir: {}", e);
    }

    let preamble = format!(
        "copy-file succeeded\nsrc={}\ntmp={}\nfinal={}\ntimestamp={}\n",
        src.display(),
        tmp_file.display(),
        final_target.display(),
        chrono::Utc::now().to_rfc3339(),
    );
    if let Err(e) = fs.write(&flag_path, &preamble) {
        log::warn!("[copy-Warning] failed to write completion flag: {}", e);
    }

    Ok(canonical::COPY_FILE_SUCCEEDED)
}

fn verify_checksum_with_one_retry(
    req: &TransferRequest,
    driver: &RsyncDriver,
    src: &Path,
    tmp_file: &Path,
) -> Result<(), EngineError> {
    let src_digest = checksum::md5_hex_of_file(src).map_err(EngineError::FileSystem)?;
    let tmp_digest = checksum::md5_hex_of_file(tmp_file).map_err(EngineError::FileSystem)?;

    if src_digest == tmp_digest {
        checksum::write_sidecar(tmp_file, &tmp_digest).map_err(EngineError::FileSystem)?;
        return Ok(());
    }

    log::warn!("[copy-Warning] checksum mismatch, retrying once internally");
    let _ = std::fs::remove_file(tmp_file);

    let src_str = src.to_string_lossy().into_owned();
    let tmp_str = tmp_file.to_string_lossy().into_owned();
    let args = RsyncArgs {
        sparse: req.sparse,
        progress: false,
        filter_rules: &req.filter_rules,
        src: &src_str,
        dest: &tmp_str,
    };
    let outcome = driver.execute(&args, None);
    if outcome.exit_code != 0 {
        return Err(EngineError::ChecksumMismatch(src.display().to_string()));
    }

    let retry_digest = checksum::md5_hex_of_file(tmp_file).map_err(EngineError::FileSystem)?;
    if retry_digest != src_digest {
        return Err(EngineError::ChecksumMismatch(src.display().to_string()));
    }
    checksum::write_sidecar(tmp_file, &retry_digest).map_err(EngineError::FileSystem)?;
    Ok(())
}

fn append_slash(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.ends_with('/') {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{}/", s))
    }
}

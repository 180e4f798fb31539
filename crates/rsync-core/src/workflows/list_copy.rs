//! Batch manifest processing: per-record classify+copy, aggregate exit code.

use std::io::Write as _;
use std::path::PathBuf;

use crate::checksum;
use crate::config::EngineConfig;
use crate::driver::{RsyncArgs, RsyncDriver};
use crate::error::EngineError;
use crate::file_system::FileSystem;
use crate::manifest::{self, Record};
use crate::request::TransferRequest;
use crate::taxonomy::{self, canonical};

pub struct ListCopyRequest<'a> {
    pub request: &'a TransferRequest,
    pub manifest_path: PathBuf,
    pub output_manifest_path: PathBuf,
}

/// The per-record result: `None` means the record succeeded or was silently
/// ignored (neither counts as an error, neither is echoed into the output
/// manifest); `Some((canonical, manifest_code, record))` means it failed.
type RecordResult = Option<(i32, i64, Record)>;

pub fn run(args: &ListCopyRequest, fs: &dyn FileSystem, config: &EngineConfig) -> i32 {
    match run_inner(args, fs, config) {
        Ok(code) => code,
        Err(e) => {
            log::error!("[copy-Error] {}", e);
            taxonomy::exit_code_from_engine_error(&e)
        }
    }
}

fn run_inner(
    args: &ListCopyRequest,
    fs: &dyn FileSystem,
    config: &EngineConfig,
) -> Result<i32, EngineError> {
    let contents = fs
        .read_to_string(&args.manifest_path)
        .map_err(EngineError::FileSystem)?;

    // First pass: whole-file format validation. Any malformed line fails the
    // whole invocation before any record is processed.
    let records = manifest::parse_manifest(&contents)?;

    let req = args.request;
    let driver = RsyncDriver::new(req.rsync_binary_path(&config.rsync_binary));

    let mut output_records: Vec<Record> = Vec::new();
    let mut first_failure_canonical: Option<i32> = None;
    let mut failure_count = 0usize;

    for record in &records {
        if let Some((canonical_code, manifest_code, out_record)) =
            process_record(req, fs, &driver, record)
        {
            failure_count += 1;
            if first_failure_canonical.is_none() {
                first_failure_canonical = Some(canonical_code);
            }
            let _ = manifest_code;
            output_records.push(out_record);
        }
    }

    write_output_manifest(&args.output_manifest_path, &output_records)?;

    if req.remove_input_file && failure_count == 0 {
        let _ = std::fs::remove_file(&args.manifest_path);
    }

    if !records.is_empty() && failure_count == records.len() {
        return Ok(first_failure_canonical.unwrap_or(canonical::GENERIC_SYSTEM));
    }
    if failure_count > 0 {
        return Ok(canonical::COPYLIST_PARTIAL);
    }
    Ok(canonical::SUCCESS)
}

/// Processes one manifest record against the filesystem and (on failure)
/// rsync, returning the failure tuple or `None` on success/ignore.
fn process_record(
    req: &TransferRequest,
    fs: &dyn FileSystem,
    driver: &RsyncDriver,
    record: &Record,
) -> RecordResult {
    let src = req.source_mount.join(&record.src_relative);
    let dst = req.dest_mount.join(&record.dst_relative);

    if super::validate_file_path(&src).is_err() || super::validate_file_path(&dst).is_err() {
        return Some(fail(22, record));
    }

    if !fs.exists(&src) {
        if req.ignore_src_not_exist {
            return None;
        }
        return Some(fail_with_manifest(2, 1202, record));
    }

    if fs.is_dir(&src) {
        if req.ignore_src_is_dir {
            return None;
        }
        return Some(fail_with_manifest(21, 1221, record));
    }

    if src == dst {
        return Some(fail_with_manifest(255, 1403, record));
    }

    if fs.is_dir(&dst) {
        if req.ignore_dest_is_dir {
            return None;
        }
        return Some(fail_with_manifest(21, 1221, record));
    }
    if fs.is_file(&dst) && !req.overwrite {
        return Some(fail_with_manifest(17, 1217, record));
    }

    if let Some(parent) = dst.parent() {
        if let Err(e) = super::check_or_create_dir(fs, parent) {
            let canonical_code = taxonomy::exit_code_from_engine_error(&e);
            return Some(fail(canonical_code, record));
        }
    }

    let src_str = src.to_string_lossy().into_owned();
    let dst_str = dst.to_string_lossy().into_owned();
    let rsync_args = RsyncArgs {
        sparse: req.sparse,
        progress: false,
        filter_rules: &req.filter_rules,
        src: &src_str,
        dest: &dst_str,
    };
    let outcome = driver.execute(&rsync_args, None);
    if outcome.exit_code != 0 {
        let _ = std::fs::remove_file(&dst);
        let canonical_code = taxonomy::exit_code_from_outcome(&outcome);
        return Some(fail(canonical_code, record));
    }

    if req.matches_checksum_suffix(&record.src_relative) {
        if checksum_mismatch(&src, &dst) {
            let _ = std::fs::remove_file(&dst);
            let _ = std::fs::remove_file(checksum::sidecar_path(&dst));
            let retry_outcome = driver.execute(&rsync_args, None);
            let retry_ok = retry_outcome.exit_code == 0 && !checksum_mismatch(&src, &dst);
            if !retry_ok {
                return Some(fail_with_manifest(255, 1401, record));
            }
        }
    }

    None
}

fn checksum_mismatch(src: &std::path::Path, dst: &std::path::Path) -> bool {
    match (checksum::md5_hex_of_file(src), checksum::md5_hex_of_file(dst)) {
        (Ok(a), Ok(b)) => a != b,
        _ => true,
    }
}

/// Builds a failure result where the manifest code is the plain
/// `canonical + 1200` offset (or the sentinel when canonical is 255).
fn fail(canonical_code: i32, record: &Record) -> (i32, i64, Record) {
    let manifest_code = taxonomy::manifest_record_code(canonical_code) as i64;
    (canonical_code, manifest_code, record.with_code(manifest_code))
}

/// Builds a failure result with an explicit manifest code that does not
/// follow the plain offset rule (the list-workflow's own diagnostic codes,
/// e.g. `1221`, `1217`, `1403`).
fn fail_with_manifest(canonical_code: i32, manifest_code: i64, record: &Record) -> (i32, i64, Record) {
    (canonical_code, manifest_code, record.with_code(manifest_code))
}

fn write_output_manifest(path: &std::path::Path, records: &[Record]) -> Result<(), EngineError> {
    let mut buf = Vec::new();
    for record in records {
        writeln!(buf, "{}", record.to_line()).map_err(|e| {
            EngineError::FileSystem(crate::file_system::FsError::IoError(e.to_string()))
        })?;
    }
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| EngineError::FileSystem(crate::file_system::FsError::IoError(e.to_string())))?;
    file.write_all(&buf)
        .map_err(|e| EngineError::FileSystem(crate::file_system::FsError::IoError(e.to_string())))?;
    file.flush()
        .map_err(|e| EngineError::FileSystem(crate::file_system::FsError::IoError(e.to_string())))?;
    file.sync_all()
        .map_err(|e| EngineError::FileSystem(crate::file_system::FsError::IoError(e.to_string())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_applies_plain_manifest_offset() {
        let record = Record {
            src_relative: "a".into(),
            dst_relative: "b".into(),
            code: None,
        };
        let (canonical_code, manifest_code, out) = fail(2, &record);
        assert_eq!(canonical_code, 2);
        assert_eq!(manifest_code, 1202);
        assert_eq!(out.code, Some(1202));
    }

    #[test]
    fn fail_applies_sentinel_for_generic_system() {
        let record = Record {
            src_relative: "a".into(),
            dst_relative: "b".into(),
            code: None,
        };
        let (_, manifest_code, _) = fail(canonical::GENERIC_SYSTEM, &record);
        assert_eq!(manifest_code, 1001);
    }
}

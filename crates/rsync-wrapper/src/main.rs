use std::path::PathBuf;

use clap::{Parser, Subcommand};

use rsync_core::config::EngineConfig;
use rsync_core::file_system::real_file_system::RealFileSystem;
use rsync_core::logging;
use rsync_core::mount::RealMountProbe;
use rsync_core::request::TransferRequest;
use rsync_core::workflows::list_copy::ListCopyRequest;
use rsync_core::workflows::{cleanup, dir_copy, file_copy, list_copy};

#[derive(Parser)]
#[command(name = "rsync-wrapper", about = "One-shot file-transfer worker commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every subcommand that builds a `TransferRequest`. Flag
/// parsing itself is deliberately minimal: required fields present, numeric
/// fields parse. Anything richer is the scheduler's concern, not this binary's.
#[derive(Parser)]
struct CommonArgs {
    #[arg(long)]
    source_mount: PathBuf,
    #[arg(long)]
    dest_mount: PathBuf,
    #[arg(long)]
    source_relative: String,
    #[arg(long)]
    dest_tmp_relative: String,
    #[arg(long)]
    dest_final_relative: String,
    #[arg(long)]
    track_file_relative: Option<String>,

    #[arg(long)]
    sparse: bool,
    #[arg(long)]
    overwrite: bool,
    #[arg(long)]
    checksum: bool,
    #[arg(long = "checksum-suffix")]
    checksum_suffixes: Vec<String>,
    #[arg(long = "filter")]
    filter_rules: Vec<String>,

    #[arg(long, default_value_t = -1)]
    retry_limit: i32,

    #[arg(long)]
    report_progress: bool,
    #[arg(long)]
    report_stderr: bool,
    #[arg(long)]
    report_url: Option<String>,
    #[arg(long, default_value_t = 0)]
    report_interval_secs: i64,

    #[arg(long)]
    debug: bool,
    #[arg(long)]
    rsync_binary: Option<PathBuf>,
}

impl CommonArgs {
    fn into_request(self, extra: ExtraFlags) -> TransferRequest {
        TransferRequest {
            source_mount: self.source_mount,
            dest_mount: self.dest_mount,
            source_relative: self.source_relative,
            dest_tmp_relative: self.dest_tmp_relative,
            dest_final_relative: self.dest_final_relative,
            track_file_relative: self.track_file_relative,
            sparse: self.sparse,
            overwrite: self.overwrite,
            generate_checksum: self.checksum,
            checksum_suffixes: self.checksum_suffixes,
            filter_rules: self.filter_rules,
            retry_limit: self.retry_limit,
            report_progress: self.report_progress,
            report_stderr: self.report_stderr,
            report_url: self.report_url,
            report_interval_secs: self.report_interval_secs,
            debug: self.debug,
            rsync_binary: self.rsync_binary,
            exclude_src_dir: extra.exclude_src_dir,
            ignore_src_not_exist: extra.ignore_src_not_exist,
            ignore_src_is_dir: extra.ignore_src_is_dir,
            ignore_dest_is_dir: extra.ignore_dest_is_dir,
            remove_input_file: extra.remove_input_file,
        }
    }
}

#[derive(Default)]
struct ExtraFlags {
    exclude_src_dir: bool,
    ignore_src_not_exist: bool,
    ignore_src_is_dir: bool,
    ignore_dest_is_dir: bool,
    remove_input_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a single file via a temp-stage, optionally-checksummed, atomic rename.
    CopyFile {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Copy a source directory tree into a destination directory.
    CopyDir {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long)]
        exclude_src_dir: bool,
    },
    /// Process a batch manifest of (src, dst) records.
    CopyList {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long)]
        manifest_path: PathBuf,
        #[arg(long)]
        output_manifest_path: PathBuf,
        #[arg(long)]
        ignore_src_not_exist: bool,
        #[arg(long)]
        ignore_src_is_dir: bool,
        #[arg(long)]
        ignore_dest_is_dir: bool,
        #[arg(long)]
        remove_input_file: bool,
    },
    /// Best-effort reverse of a prior copy.
    Cleanup {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long)]
        exclude_src_dir: bool,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let config = EngineConfig::resolve();
    let fs = RealFileSystem::new();
    let probe = RealMountProbe::new();

    let code = match cli.command {
        Commands::CopyFile { common } => {
            let req = common.into_request(ExtraFlags::default());
            file_copy::run(&req, &fs, &probe, &config)
        }
        Commands::CopyDir { common, exclude_src_dir } => {
            let req = common.into_request(ExtraFlags {
                exclude_src_dir,
                ..Default::default()
            });
            dir_copy::run(&req, &fs, &probe, &config)
        }
        Commands::CopyList {
            common,
            manifest_path,
            output_manifest_path,
            ignore_src_not_exist,
            ignore_src_is_dir,
            ignore_dest_is_dir,
            remove_input_file,
        } => {
            let req = common.into_request(ExtraFlags {
                ignore_src_not_exist,
                ignore_src_is_dir,
                ignore_dest_is_dir,
                remove_input_file,
                ..Default::default()
            });
            let list_args = ListCopyRequest {
                request: &req,
                manifest_path,
                output_manifest_path,
            };
            list_copy::run(&list_args, &fs, &config)
        }
        Commands::Cleanup { common, exclude_src_dir } => {
            let req = common.into_request(ExtraFlags {
                exclude_src_dir,
                ..Default::default()
            });
            cleanup::run(&req, &fs)
        }
    };

    std::process::exit(code);
}

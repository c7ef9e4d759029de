use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use tonarchy_builder::config::{parse_args, usage, BuildConfig, CliAction, CliOverrides, ExecMode};
use tonarchy_builder::logging::{BuildLog, DEFAULT_LOG_PATH};
use tonarchy_builder::{pipeline, preflight};

const PROG_NAME: &str = "tonarchy-builder";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let overrides = match parse_args(&args) {
        Ok(CliAction::Help) => {
            println!("{}", usage(PROG_NAME));
            return ExitCode::SUCCESS;
        }
        Ok(CliAction::Run(overrides)) => overrides,
        Err(err) => {
            eprintln!("[ERROR] {:#}", err);
            eprintln!("{}", usage(PROG_NAME));
            return ExitCode::FAILURE;
        }
    };

    // The log lives on the stack so its file handle closes on every exit
    // path, including the failure return below.
    let mut log = BuildLog::open(Path::new(DEFAULT_LOG_PATH));
    log.info("Tonarchy ISO builder starting...");

    match build(overrides, &mut log) {
        Ok(iso_path) => {
            log.info("===================================");
            log.info("ISO created successfully!");
            log.info(format!("Location: {}", iso_path.display()));
            log.info("Test with: make test");
            log.info("===================================");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log.error(format!("{:#}", err));
            ExitCode::FAILURE
        }
    }
}

fn build(overrides: CliOverrides, log: &mut BuildLog) -> Result<PathBuf> {
    let config = BuildConfig::resolve(overrides)?;

    log.info(format!("Tonarchy source: {}", config.source_root.display()));
    log.info(format!("ISO profile: {}", config.iso_profile.display()));
    log.info(format!("Work directory: {}", config.work_dir.display()));
    log.info(format!("Output directory: {}", config.out_dir.display()));
    match config.exec_mode {
        ExecMode::Host => {}
        ExecMode::DisposableContainer => log.info("Container mode: podman"),
        ExecMode::PersistentContainer => {
            log.info("Container mode: distrobox");
            log.info(format!("Distrobox name: {}", config.distrobox_name));
        }
    }

    preflight::check(&config)?;
    pipeline::run(&config, log)
}

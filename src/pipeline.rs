//! The build pipeline: fixed stage order, fail-fast.
//!
//! Stages run strictly in sequence; the first fatal failure aborts the run
//! with the failing stage named in the error chain. Advisory outcomes are
//! logged as warnings and the pipeline continues. Completed stages are never
//! rolled back; the cleanup stages inside the sequence are what make
//! repeated runs idempotent.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::BuildConfig;
use crate::logging::BuildLog;
use crate::stages::{build, clean, generate, locate, populate, StageOutcome};

/// Run all stages and return the path of the produced ISO.
pub fn run(config: &BuildConfig, log: &mut BuildLog) -> Result<PathBuf> {
    let target = config.exec_target();
    log.info(format!("Execution target: {}", target.describe()));

    log.info("Building tonarchy static binary...");
    stage(log, "build-artifact", || {
        build::build_static_binary(config, &target)
    })?;

    log.info("Cleaning airootfs...");
    stage(log, "clean-airootfs", || clean::clean_staging(config))?;

    log.info("Cleaning work directory...");
    stage(log, "clean-work-dir", || clean::clean_work_dir(config))?;

    log.info("Preparing airootfs...");
    stage(log, "populate-airootfs", || {
        populate::populate_staging(config)
    })?;

    log.info("Building ISO with mkarchiso...");
    stage(log, "generate-image", || {
        generate::generate_image(config, &target)
    })?;

    log.info("Cleaning work directory after build...");
    stage(log, "post-build-cleanup", || post_build_cleanup(config))?;

    log.info("Syncing filesystem...");
    clean::settle(2);

    let iso_path = locate::locate_artifact(&config.out_dir)
        .context("stage 'locate-iso' failed")?;

    match locate::write_checksum(&iso_path) {
        Ok(sidecar) => log.info(format!("Checksum: {}", sidecar.display())),
        Err(err) => log.warn(format!("checksum not written: {:#}", err)),
    }

    Ok(iso_path)
}

/// Run one stage, logging advisory outcomes and naming the stage on failure.
fn stage(
    log: &mut BuildLog,
    name: &str,
    run_stage: impl FnOnce() -> Result<StageOutcome>,
) -> Result<()> {
    match run_stage().with_context(|| format!("stage '{}' failed", name))? {
        StageOutcome::Ok => {}
        StageOutcome::Advisory(reason) => log.warn(format!("{}: {}", name, reason)),
    }
    Ok(())
}

/// The work tree is disposable housekeeping once the ISO exists.
fn post_build_cleanup(config: &BuildConfig) -> Result<StageOutcome> {
    match clean::clean_work_dir(config) {
        Ok(outcome) => Ok(outcome),
        Err(err) => Ok(StageOutcome::Advisory(format!(
            "work directory not cleaned: {:#}",
            err
        ))),
    }
}

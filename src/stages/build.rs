//! Stage: build the static appliance binary.
//!
//! Invokes the appliance's own build procedure and then verifies the
//! expected output file exists. The exit code of the build tool is not
//! trusted on its own: a build that "succeeds" without producing
//! `tonarchy-static` is still a failure.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{BuildConfig, ExecMode};
use crate::process::{ensure_exists, Cmd};
use crate::stages::StageOutcome;
use crate::target::{ExecTarget, GUEST_SRC};

/// File name of the statically linked appliance binary, produced in the
/// source root.
pub const STATIC_BINARY: &str = "tonarchy-static";

/// Expected location of the built binary.
pub fn artifact_path(config: &BuildConfig) -> PathBuf {
    config.source_root.join(STATIC_BINARY)
}

/// Build `tonarchy-static` on the configured execution target.
pub fn build_static_binary(config: &BuildConfig, target: &ExecTarget) -> Result<StageOutcome> {
    let script = build_script(config);
    target
        .wrap(&script)
        .error_msg("tonarchy-static build failed")
        .run_interactive()
        .context("building tonarchy-static")?;

    verify_artifact(config)?;
    Ok(StageOutcome::Ok)
}

/// Postcondition: the binary must exist after the build command returns.
pub fn verify_artifact(config: &BuildConfig) -> Result<()> {
    ensure_exists(&artifact_path(config), "tonarchy-static binary")
}

/// Command sequence for the configured execution mode.
///
/// - Disposable containers start from a bare Arch image, so the toolchain is
///   installed first and paths are the in-container mount points.
/// - Persistent containers are assumed to be Arch sessions sharing the host
///   filesystem; only the musl toolchain is ensured.
/// - Host builds assume the toolchain is present (checked in preflight).
fn build_script(config: &BuildConfig) -> Vec<Cmd> {
    let guest_src = Path::new(GUEST_SRC);
    match config.exec_mode {
        ExecMode::DisposableContainer => vec![
            Cmd::new("pacman").args(["-Sy", "--noconfirm", "musl", "gcc", "make"]),
            Cmd::new("rm")
                .args(["-f", "tonarchy", STATIC_BINARY])
                .current_dir(guest_src),
            Cmd::new("make")
                .args(["static", "CC=musl-gcc"])
                .current_dir(guest_src),
        ],
        ExecMode::PersistentContainer => vec![
            Cmd::new("sudo").args(["pacman", "-S", "--noconfirm", "--needed", "musl"]),
            Cmd::new("make").arg("clean").current_dir(&config.source_root),
            Cmd::new("make")
                .args(["static", "CC=musl-gcc"])
                .current_dir(&config.source_root),
        ],
        ExecMode::Host => vec![
            Cmd::new("make").arg("clean").current_dir(&config.source_root),
            Cmd::new("make")
                .args(["static", "CC=musl-gcc"])
                .current_dir(&config.source_root),
        ],
    }
}

//! Preflight checks: fail before the pipeline starts, not halfway through.
//!
//! Host builds need the archiso and musl toolchains installed; container
//! builds need the container runtime. Persistent-container mode also
//! requires the named distrobox session to already exist, since the
//! pipeline enters it but never creates it.

use anyhow::{bail, Result};

use crate::config::{BuildConfig, ExecMode};
use crate::process::Cmd;

/// Tools a host-mode build invokes directly.
const HOST_TOOLS: &[(&str, &str)] = &[
    ("make", "make"),
    ("musl-gcc", "musl"),
    ("mkarchiso", "archiso"),
    ("sudo", "sudo"),
];

/// Validate the host environment for the configured execution mode.
pub fn check(config: &BuildConfig) -> Result<()> {
    match config.exec_mode {
        ExecMode::Host => require_tools(HOST_TOOLS),
        ExecMode::DisposableContainer => {
            require_tools(&[("podman", "podman"), ("sudo", "sudo")])
        }
        ExecMode::PersistentContainer => {
            require_tools(&[("distrobox", "distrobox")])?;
            if !distrobox_session_exists(&config.distrobox_name)? {
                bail!(
                    "distrobox container '{}' does not exist; create it first: \
                     distrobox create --name {} --image docker.io/archlinux:latest",
                    config.distrobox_name,
                    config.distrobox_name
                );
            }
            Ok(())
        }
    }
}

/// Check that every listed command resolves on PATH.
fn require_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing = missing_tools(tools);
    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(tool, package)| format!("  {} (install: {})", tool, package))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }
    Ok(())
}

fn missing_tools<'a>(tools: &'a [(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    tools
        .iter()
        .copied()
        .filter(|(tool, _)| which::which(tool).is_err())
        .collect()
}

/// Whether a distrobox session with this name exists.
pub fn distrobox_session_exists(name: &str) -> Result<bool> {
    let result = Cmd::new("distrobox").arg("list").allow_fail().run()?;
    Ok(result.success() && result.stdout.lines().any(|line| line.contains(name)))
}

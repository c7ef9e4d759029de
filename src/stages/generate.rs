//! Stage: generate the bootable ISO with mkarchiso.
//!
//! Two variants:
//!
//! - direct: `sudo mkarchiso` against the profile, routed through the host
//!   or the persistent container session;
//! - disposable: a throwaway Arch container that installs `archiso` first
//!   and works against the bind-mounted profile/work/out directories. This
//!   variant provisions a permissive image-trust policy on the host so the
//!   base image can be pulled without a configured trust store; the file is
//!   overwritten each run.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::{BuildConfig, ExecMode};
use crate::process::Cmd;
use crate::stages::StageOutcome;
use crate::target::{ExecTarget, GUEST_OUT, GUEST_PROFILE, GUEST_WORK};

/// Host path of the container image-trust policy.
pub const POLICY_PATH: &str = "/etc/containers/policy.json";

/// Run mkarchiso on the configured execution target.
pub fn generate_image(config: &BuildConfig, target: &ExecTarget) -> Result<StageOutcome> {
    ensure_dirs(config)?;

    if config.exec_mode == ExecMode::DisposableContainer {
        provision_trust_policy(config)?;
    }

    let script = mkarchiso_script(config);
    target
        .wrap(&script)
        .error_msg("mkarchiso failed")
        .run_interactive()
        .context("generating ISO")?;

    Ok(StageOutcome::Ok)
}

/// Output and work directories must exist before mkarchiso runs.
fn ensure_dirs(config: &BuildConfig) -> Result<()> {
    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("creating output directory '{}'", config.out_dir.display()))?;
    fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("creating work directory '{}'", config.work_dir.display()))?;
    Ok(())
}

/// mkarchiso invocation for the configured execution mode.
fn mkarchiso_script(config: &BuildConfig) -> Vec<Cmd> {
    match config.exec_mode {
        ExecMode::Host | ExecMode::PersistentContainer => vec![Cmd::new("sudo")
            .args(["mkarchiso", "-v", "-w"])
            .arg_path(&config.work_dir)
            .arg("-o")
            .arg_path(&config.out_dir)
            .arg_path(&config.iso_profile)],
        ExecMode::DisposableContainer => vec![
            Cmd::new("pacman").args(["-Sy", "--noconfirm", "archiso"]),
            Cmd::new("mkarchiso")
                .args(["-v", "-w", GUEST_WORK, "-o", GUEST_OUT, GUEST_PROFILE]),
        ],
    }
}

/// Accept-anything image signature policy.
pub fn trust_policy_json() -> String {
    serde_json::json!({
        "default": [{ "type": "insecureAcceptAnything" }]
    })
    .to_string()
}

/// Install the trust policy at [`POLICY_PATH`], overwriting any previous one.
///
/// The file is staged in the work directory and moved into place with sudo,
/// since `/etc/containers` is root-owned.
fn provision_trust_policy(config: &BuildConfig) -> Result<()> {
    let staged = config.work_dir.join("policy.json");
    fs::write(&staged, trust_policy_json())
        .with_context(|| format!("writing staged policy '{}'", staged.display()))?;

    Cmd::new("sudo")
        .args(["mkdir", "-p"])
        .arg(parent_of(POLICY_PATH))
        .error_msg("failed to create /etc/containers")
        .run()?;
    Cmd::new("sudo")
        .args(["cp"])
        .arg_path(&staged)
        .arg(POLICY_PATH)
        .error_msg("failed to install container trust policy")
        .run()?;
    Ok(())
}

fn parent_of(path: &str) -> String {
    Path::new(path)
        .parent()
        .unwrap_or_else(|| Path::new("/"))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_args, CliAction, CliOverrides};
    use tempfile::TempDir;

    fn config_for(temp: &TempDir, args: &[&str]) -> BuildConfig {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let overrides = match parse_args(&args).unwrap() {
            CliAction::Run(overrides) => overrides,
            _ => panic!("expected run action"),
        };
        BuildConfig::resolve_from(temp.path(), overrides).unwrap()
    }

    #[test]
    fn test_direct_variant_is_one_sudo_mkarchiso() {
        let temp = TempDir::new().unwrap();
        let config = config_for(&temp, &[]);

        let script = mkarchiso_script(&config);
        assert_eq!(script.len(), 1);
        let text = script[0].shell_text();
        assert!(text.starts_with("sudo mkarchiso -v -w "));
        assert!(text.ends_with(&config.iso_profile.to_string_lossy().into_owned()));
    }

    #[test]
    fn test_persistent_variant_shares_direct_invocation() {
        let temp = TempDir::new().unwrap();
        let host = mkarchiso_script(&config_for(&temp, &[]));
        let boxed = mkarchiso_script(&config_for(&temp, &["--distrobox", "arch"]));
        assert_eq!(host[0].shell_text(), boxed[0].shell_text());
    }

    #[test]
    fn test_disposable_variant_installs_archiso_first() {
        let temp = TempDir::new().unwrap();
        let config = config_for(&temp, &["--container", "podman"]);

        let script = mkarchiso_script(&config);
        assert_eq!(script[0].shell_text(), "pacman -Sy --noconfirm archiso");
        assert_eq!(
            script[1].shell_text(),
            "mkarchiso -v -w /work -o /out /profile"
        );

        let wrapped = config.exec_target().wrap(&script).shell_text();
        assert!(wrapped.starts_with("sudo podman run --rm --privileged"));
    }

    #[test]
    fn test_trust_policy_accepts_anything() {
        assert_eq!(
            trust_policy_json(),
            r#"{"default":[{"type":"insecureAcceptAnything"}]}"#
        );
    }

    #[test]
    fn test_ensure_dirs_creates_out_and_work() {
        let temp = TempDir::new().unwrap();
        let mut overrides = CliOverrides::default();
        overrides.work_dir = Some(temp.path().join("work"));
        let config = BuildConfig::resolve_from(temp.path(), overrides).unwrap();

        ensure_dirs(&config).unwrap();
        assert!(config.out_dir.is_dir());
        assert!(config.work_dir.is_dir());
        // Re-running is fine; the directories already exist.
        ensure_dirs(&config).unwrap();
    }
}

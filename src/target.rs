//! Execution targets: where a command actually runs.
//!
//! A stage builds its commands as plain [`Cmd`] values and hands them to an
//! [`ExecTarget`], which produces the concrete invocation:
//!
//! - **Host** - direct execution.
//! - **PersistentContainer** - `distrobox enter <name> -- sh -c '...'`
//!   against a long-lived session that is managed outside this process.
//! - **DisposableContainer** - `sudo podman run --rm --privileged` with the
//!   build directories bind-mounted read-write; the container is removed on
//!   exit whether or not the wrapped command succeeded.
//!
//! This is the only place that turns structured commands into shell text.

use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// Mount point of the appliance source tree inside a disposable container.
pub const GUEST_SRC: &str = "/src";
/// Mount point of the archiso profile inside a disposable container.
pub const GUEST_PROFILE: &str = "/profile";
/// Mount point of the output directory inside a disposable container.
pub const GUEST_OUT: &str = "/out";
/// Mount point of the mkarchiso work directory inside a disposable container.
pub const GUEST_WORK: &str = "/work";

/// A host directory exposed inside a disposable container.
#[derive(Debug, Clone)]
pub struct BindMount {
    pub host: PathBuf,
    pub guest: &'static str,
}

impl BindMount {
    pub fn new(host: &Path, guest: &'static str) -> Self {
        Self {
            host: host.to_path_buf(),
            guest,
        }
    }
}

/// Routing decision for one stage's commands.
#[derive(Debug, Clone)]
pub enum ExecTarget {
    Host,
    PersistentContainer {
        name: String,
    },
    DisposableContainer {
        image: String,
        mounts: Vec<BindMount>,
    },
}

impl ExecTarget {
    /// Wrap a command sequence into a single host-level invocation.
    ///
    /// Multiple commands are chained with `&&`, so the sequence stops at the
    /// first failure on every backend.
    pub fn wrap(&self, script: &[Cmd]) -> Cmd {
        assert!(!script.is_empty(), "empty command script");

        match self {
            ExecTarget::Host => {
                if script.len() == 1 {
                    script[0].clone()
                } else {
                    Cmd::new("sh").arg("-c").arg(join_script(script))
                }
            }
            ExecTarget::PersistentContainer { name } => Cmd::new("distrobox")
                .args(["enter", name.as_str(), "--", "sh", "-c"])
                .arg(join_script(script)),
            ExecTarget::DisposableContainer { image, mounts } => {
                let mut cmd = Cmd::new("sudo").args(["podman", "run", "--rm", "--privileged"]);
                for mount in mounts {
                    cmd = cmd.arg("-v").arg(format!(
                        "{}:{}",
                        mount.host.to_string_lossy(),
                        mount.guest
                    ));
                }
                cmd.arg(image.as_str())
                    .args(["sh", "-c"])
                    .arg(join_script(script))
            }
        }
    }

    /// Human-readable name for log lines.
    pub fn describe(&self) -> String {
        match self {
            ExecTarget::Host => "host".to_string(),
            ExecTarget::PersistentContainer { name } => {
                format!("distrobox '{}'", name)
            }
            ExecTarget::DisposableContainer { image, .. } => {
                format!("disposable podman container ({})", image)
            }
        }
    }
}

fn join_script(script: &[Cmd]) -> String {
    script
        .iter()
        .map(Cmd::shell_text)
        .collect::<Vec<_>>()
        .join(" && ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_script() -> Vec<Cmd> {
        vec![
            Cmd::new("pacman").args(["-Sy", "--noconfirm", "archiso"]),
            Cmd::new("mkarchiso").args(["-v", "-w", "/work", "-o", "/out", "/profile"]),
        ]
    }

    #[test]
    fn test_host_single_command_unwrapped() {
        let script = vec![Cmd::new("mkarchiso").args(["-v", "/profile"])];
        let wrapped = ExecTarget::Host.wrap(&script);
        assert_eq!(wrapped.shell_text(), "mkarchiso -v /profile");
    }

    #[test]
    fn test_host_sequence_goes_through_sh() {
        let wrapped = ExecTarget::Host.wrap(&sample_script());
        assert_eq!(wrapped.program(), "sh");
        assert!(wrapped.shell_text().contains("&&"));
    }

    #[test]
    fn test_persistent_wraps_with_distrobox_enter() {
        let target = ExecTarget::PersistentContainer {
            name: "arch".to_string(),
        };
        let wrapped = target.wrap(&sample_script());
        let text = wrapped.shell_text();
        assert!(text.starts_with("distrobox enter arch -- sh -c "));
        assert!(text.contains("pacman -Sy --noconfirm archiso && mkarchiso"));
    }

    #[test]
    fn test_disposable_mounts_and_removes_container() {
        let target = ExecTarget::DisposableContainer {
            image: "docker.io/archlinux:latest".to_string(),
            mounts: vec![
                BindMount::new(Path::new("/home/me/tonarchy"), GUEST_SRC),
                BindMount::new(Path::new("/home/me/tonarchy/iso"), GUEST_PROFILE),
            ],
        };
        let wrapped = target.wrap(&sample_script());
        let text = wrapped.shell_text();
        assert!(text.starts_with("sudo podman run --rm --privileged"));
        assert!(text.contains("-v /home/me/tonarchy:/src"));
        assert!(text.contains("-v /home/me/tonarchy/iso:/profile"));
        assert!(text.contains("docker.io/archlinux:latest sh -c"));
    }
}

//! Build configuration: defaults, `builder.toml`, and CLI flags.
//!
//! A [`BuildConfig`] is resolved once at startup and treated as immutable
//! input for the rest of the run. Precedence is defaults, then the optional
//! `builder.toml` in the source root, then command-line flags. Every path is
//! absolutized before the pipeline starts.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::target::{BindMount, ExecTarget, GUEST_OUT, GUEST_PROFILE, GUEST_SRC, GUEST_WORK};

/// Scratch directory handed to mkarchiso; destroyed and recreated each run.
pub const DEFAULT_WORK_DIR: &str = "/tmp/tonarchy-iso-work";
/// Default persistent distrobox session name.
pub const DEFAULT_DISTROBOX_NAME: &str = "arch";
/// Base image for disposable build containers.
pub const DEFAULT_CONTAINER_IMAGE: &str = "docker.io/archlinux:latest";
/// Optional config file looked up in the source root.
pub const CONFIG_FILENAME: &str = "builder.toml";

/// Where a stage's commands execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Host,
    PersistentContainer,
    DisposableContainer,
}

/// Immutable snapshot of one pipeline run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Appliance source checkout; the static binary is built here.
    pub source_root: PathBuf,
    /// Archiso profile directory; its `airootfs/` becomes the live rootfs.
    pub iso_profile: PathBuf,
    /// mkarchiso scratch directory.
    pub work_dir: PathBuf,
    /// Directory the finished ISO lands in.
    pub out_dir: PathBuf,
    pub exec_mode: ExecMode,
    /// Meaningful only in persistent-container mode.
    pub distrobox_name: String,
    /// Base image for disposable containers.
    pub container_image: String,
}

impl BuildConfig {
    /// Resolve the configuration for the current directory.
    pub fn resolve(overrides: CliOverrides) -> Result<Self> {
        let source_root = std::env::current_dir().context("resolving current directory")?;
        Self::resolve_from(&source_root, overrides)
    }

    /// Resolve the configuration for an explicit source root.
    pub fn resolve_from(source_root: &Path, overrides: CliOverrides) -> Result<Self> {
        let file = load_config_file(source_root)?.unwrap_or_default();

        let iso_profile = overrides
            .iso_profile
            .or(file.iso_profile.map(PathBuf::from))
            .unwrap_or_else(|| source_root.join("iso"));
        let out_dir = overrides
            .out_dir
            .or(file.out_dir.map(PathBuf::from))
            .unwrap_or_else(|| source_root.join("out"));
        let work_dir = overrides
            .work_dir
            .or(file.work_dir.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));

        let file_mode = file
            .container
            .as_deref()
            .map(parse_container_kind)
            .transpose()
            .with_context(|| format!("invalid 'container' in {}", CONFIG_FILENAME))?;
        let exec_mode = match overrides.container.or(file_mode) {
            // --distrobox NAME alone selects the persistent container.
            None if overrides.distrobox_name.is_some() => ExecMode::PersistentContainer,
            None => ExecMode::Host,
            Some(ContainerKind::Podman) => ExecMode::DisposableContainer,
            Some(ContainerKind::Distrobox) => ExecMode::PersistentContainer,
        };

        let distrobox_name = overrides
            .distrobox_name
            .or(file.distrobox_name)
            .unwrap_or_else(|| DEFAULT_DISTROBOX_NAME.to_string());
        let container_image = file
            .container_image
            .unwrap_or_else(|| DEFAULT_CONTAINER_IMAGE.to_string());

        Ok(Self {
            source_root: source_root.to_path_buf(),
            iso_profile: absolutize(iso_profile, source_root),
            work_dir: absolutize(work_dir, source_root),
            out_dir: absolutize(out_dir, source_root),
            exec_mode,
            distrobox_name,
            container_image,
        })
    }

    /// The execution target that routes this run's containerizable commands.
    pub fn exec_target(&self) -> ExecTarget {
        match self.exec_mode {
            ExecMode::Host => ExecTarget::Host,
            ExecMode::PersistentContainer => ExecTarget::PersistentContainer {
                name: self.distrobox_name.clone(),
            },
            ExecMode::DisposableContainer => ExecTarget::DisposableContainer {
                image: self.container_image.clone(),
                mounts: vec![
                    BindMount::new(&self.source_root, GUEST_SRC),
                    BindMount::new(&self.iso_profile, GUEST_PROFILE),
                    BindMount::new(&self.out_dir, GUEST_OUT),
                    BindMount::new(&self.work_dir, GUEST_WORK),
                ],
            },
        }
    }

    /// Staging tree inside the profile (`<profile>/airootfs`).
    pub fn airootfs(&self) -> PathBuf {
        self.iso_profile.join("airootfs")
    }
}

fn absolutize(path: PathBuf, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuilderToml {
    build: Option<BuildTable>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildTable {
    iso_profile: Option<String>,
    out_dir: Option<String>,
    work_dir: Option<String>,
    container: Option<String>,
    distrobox_name: Option<String>,
    container_image: Option<String>,
}

fn load_config_file(source_root: &Path) -> Result<Option<BuildTable>> {
    let path = source_root.join(CONFIG_FILENAME);
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read_to_string(&path)
        .with_context(|| format!("reading config '{}'", path.display()))?;
    let parsed: BuilderToml = toml::from_str(&bytes)
        .with_context(|| format!("parsing config '{}'", path.display()))?;
    Ok(parsed.build)
}

/// Container flavor named on the CLI or in `builder.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Podman,
    Distrobox,
}

fn parse_container_kind(value: &str) -> Result<ContainerKind> {
    match value {
        "podman" => Ok(ContainerKind::Podman),
        "distrobox" => Ok(ContainerKind::Distrobox),
        other => bail!("unknown container type '{}' (expected 'podman' or 'distrobox')", other),
    }
}

/// Command-line overrides applied on top of defaults and `builder.toml`.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub iso_profile: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub container: Option<ContainerKind>,
    pub distrobox_name: Option<String>,
}

/// Outcome of flag parsing.
#[derive(Debug)]
pub enum CliAction {
    Help,
    Run(CliOverrides),
}

pub fn usage(prog_name: &str) -> String {
    format!(
        "Usage: {} [OPTIONS]\n\
         \n\
         Options:\n\
         \x20 --iso-profile PATH    Path to ISO profile directory (default: ./iso)\n\
         \x20 --out-dir PATH        Output directory for ISO (default: ./out)\n\
         \x20 --work-dir PATH       mkarchiso work directory (default: {})\n\
         \x20 --container [TYPE]    Build using a container (podman or distrobox)\n\
         \x20 --distrobox NAME      Distrobox container name (default: {})\n\
         \x20 -h, --help            Show this help message",
        prog_name, DEFAULT_WORK_DIR, DEFAULT_DISTROBOX_NAME
    )
}

/// Parse command-line flags (without the program name).
pub fn parse_args(args: &[String]) -> Result<CliAction> {
    let mut overrides = CliOverrides::default();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--iso-profile" => {
                overrides.iso_profile = Some(expect_value(&mut iter, "--iso-profile")?.into());
            }
            "--out-dir" => {
                overrides.out_dir = Some(expect_value(&mut iter, "--out-dir")?.into());
            }
            "--work-dir" => {
                overrides.work_dir = Some(expect_value(&mut iter, "--work-dir")?.into());
            }
            "--container" => {
                // Optional value; bare `--container` means podman.
                let kind = match iter.peek() {
                    Some(next) if !next.starts_with('-') => {
                        let value = iter.next().map(String::as_str).unwrap_or_default();
                        parse_container_kind(value)?
                    }
                    _ => ContainerKind::Podman,
                };
                overrides.container = Some(kind);
            }
            "--distrobox" => {
                overrides.distrobox_name = Some(expect_value(&mut iter, "--distrobox")?);
                overrides.container = Some(ContainerKind::Distrobox);
            }
            "-h" | "--help" => return Ok(CliAction::Help),
            other => bail!("unknown option: {}", other),
        }
    }

    Ok(CliAction::Run(overrides))
}

fn expect_value(
    iter: &mut std::iter::Peekable<std::slice::Iter<'_, String>>,
    flag: &str,
) -> Result<String> {
    match iter.next() {
        Some(value) => Ok(value.clone()),
        None => bail!("{} requires a value", flag),
    }
}

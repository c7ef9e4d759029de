//! Build pipeline for the Tonarchy appliance installer ISO.
//!
//! The pipeline builds the static `tonarchy` binary, stages it into an
//! archiso profile's `airootfs`, and runs `mkarchiso` to produce a bootable
//! ISO, either on the host or inside a container:
//!
//! ```text
//! BuildConfig (defaults + builder.toml + flags)
//!     │
//!     ▼
//! pipeline::run ──► build-artifact      make/musl-gcc, binary must exist
//!     │             clean-airootfs      advisory
//!     │             clean-work-dir      fatal
//!     │             populate-airootfs   binary + assets, chown root:root
//!     │             generate-image      mkarchiso (direct or disposable)
//!     │             post-build-cleanup  advisory
//!     ▼             locate-iso          newest *.iso + sha256 sidecar
//! ISO path
//! ```
//!
//! Stages are idempotent: each run destroys and recreates the directories
//! it mutates, so the builder can be re-invoked freely during development.
//! Commands are structured [`process::Cmd`] values routed through a
//! [`target::ExecTarget`] (host, persistent distrobox session, or a
//! disposable privileged podman container with the build directories
//! bind-mounted).

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod stages;
pub mod target;

pub use config::{BuildConfig, CliAction, CliOverrides, ExecMode};
pub use logging::BuildLog;
pub use stages::StageOutcome;
pub use target::ExecTarget;

//! Build log: console output teed into a per-run log file.
//!
//! A [`BuildLog`] is constructed once in `main` and passed down through the
//! pipeline. Info lines go to stdout, warnings and errors to stderr, and
//! every line is appended to the log file, which starts with a timestamped
//! run header. The file handle is released by `Drop`, so it closes on every
//! exit path.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;

/// Default log file location, appended to across runs.
pub const DEFAULT_LOG_PATH: &str = "/tmp/tonarchy-builder.log";

pub struct BuildLog {
    file: Option<File>,
}

impl BuildLog {
    /// Open the log file for appending and write the run header.
    ///
    /// A log file that cannot be opened is not fatal: the build proceeds
    /// with console output only.
    pub fn open(path: &Path) -> Self {
        match Self::open_file(path) {
            Ok(file) => Self { file: Some(file) },
            Err(err) => {
                eprintln!("[WARN] log file unavailable: {:#}", err);
                Self { file: None }
            }
        }
    }

    /// A log that writes to the console only. Used by tests.
    pub fn console_only() -> Self {
        Self { file: None }
    }

    fn open_file(path: &Path) -> Result<File> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file '{}'", path.display()))?;

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc2822)
            .unwrap_or_else(|_| "unknown time".to_string());
        writeln!(file, "\n=== Tonarchy ISO Build Log - {} ===", timestamp)
            .with_context(|| format!("writing run header to '{}'", path.display()))?;
        Ok(file)
    }

    pub fn info(&mut self, msg: impl AsRef<str>) {
        println!("[INFO] {}", msg.as_ref());
        self.append("INFO", msg.as_ref());
    }

    pub fn warn(&mut self, msg: impl AsRef<str>) {
        eprintln!("[WARN] {}", msg.as_ref());
        self.append("WARN", msg.as_ref());
    }

    pub fn error(&mut self, msg: impl AsRef<str>) {
        eprintln!("[ERROR] {}", msg.as_ref());
        self.append("ERROR", msg.as_ref());
    }

    fn append(&mut self, level: &str, msg: &str) {
        if let Some(file) = &mut self.file {
            // Console output already happened; a full log disk is not a
            // reason to abort the build.
            let _ = writeln!(file, "[{}] {}", level, msg);
            let _ = file.flush();
        }
    }
}

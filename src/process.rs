//! Structured external command execution.
//!
//! Every external tool invocation in this crate is built as a [`Cmd`] value
//! (program + argument list + optional working directory) instead of a
//! formatted shell string. Shell rendering and quoting live here and in
//! [`crate::target`], nowhere else.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A single external command invocation.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    error_msg: Option<String>,
    allow_fail: bool,
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CmdResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            error_msg: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Working directory for the command (rendered as `cd <dir> &&` when
    /// the command is wrapped for a container).
    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Message used when the command exits nonzero.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Report nonzero exit through [`CmdResult`] instead of an error.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Render this command as a single shell line.
    ///
    /// Used when the command has to travel through `sh -c` into a container.
    /// Arguments are single-quoted whenever they contain anything beyond
    /// `[A-Za-z0-9_./:=-]`.
    pub fn shell_text(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        if let Some(dir) = &self.current_dir {
            parts.push("cd".to_string());
            parts.push(shell_quote(&dir.to_string_lossy()));
            parts.push("&&".to_string());
        }
        parts.push(shell_quote(&self.program));
        for arg in &self.args {
            parts.push(shell_quote(arg));
        }
        parts.join(" ")
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }

    /// Run the command, capturing stdout and stderr.
    pub fn run(self) -> Result<CmdResult> {
        let output = self
            .command()
            .output()
            .with_context(|| format!("failed to spawn '{}'", self.program))?;

        let result = CmdResult {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        self.check(result)
    }

    /// Run the command with stdio inherited from this process.
    ///
    /// Used for long-running tools (make, mkarchiso, podman) whose progress
    /// output should stream to the operator.
    pub fn run_interactive(self) -> Result<CmdResult> {
        let status = self
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("failed to spawn '{}'", self.program))?;

        let result = CmdResult {
            code: status.code(),
            stdout: String::new(),
            stderr: String::new(),
        };

        self.check(result)
    }

    fn check(self, result: CmdResult) -> Result<CmdResult> {
        if result.success() || self.allow_fail {
            return Ok(result);
        }

        let msg = match &self.error_msg {
            Some(msg) => msg.clone(),
            None => format!("command '{}' failed", self.shell_text()),
        };
        let detail = result.stderr.trim();
        if detail.is_empty() {
            bail!("{} (exit code {:?})", msg, result.code);
        }
        bail!("{} (exit code {:?}): {}", msg, result.code, detail);
    }
}

/// Quote a string for POSIX `sh` if it needs quoting.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | ':' | '=' | '-'));
    if safe {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Error if a path produced by an earlier step does not exist.
pub fn ensure_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{} not found at {}", what, path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_passthrough() {
        assert_eq!(shell_quote("mkarchiso"), "mkarchiso");
        assert_eq!(shell_quote("/tmp/out-dir"), "/tmp/out-dir");
        assert_eq!(shell_quote("CC=musl-gcc"), "CC=musl-gcc");
    }

    #[test]
    fn test_shell_quote_special() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_shell_text_with_dir() {
        let cmd = Cmd::new("make")
            .args(["static", "CC=musl-gcc"])
            .current_dir(Path::new("/home/me/my src"));
        assert_eq!(cmd.shell_text(), "cd '/home/me/my src' && make static CC=musl-gcc");
    }

    #[test]
    fn test_run_captures_output() {
        let result = Cmd::new("echo").arg("hello").run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn test_run_nonzero_is_error() {
        let err = Cmd::new("false").error_msg("boom").run().unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_allow_fail_returns_result() {
        let result = Cmd::new("false").allow_fail().run().unwrap();
        assert!(!result.success());
    }

    #[test]
    fn test_ensure_exists() {
        assert!(ensure_exists(Path::new("/definitely/not/here"), "artifact").is_err());
        assert!(ensure_exists(Path::new("/"), "root").is_ok());
    }
}

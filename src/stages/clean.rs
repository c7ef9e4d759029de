//! Stages: clean the staging tree and the mkarchiso work tree.
//!
//! Both stages exist so repeated runs start from known state. Removal first
//! tries a plain `remove_dir_all` and escalates to `sudo rm -rf` only when
//! permissions deny it; mkarchiso leaves root-owned files behind.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::config::BuildConfig;
use crate::process::Cmd;
use crate::stages::StageOutcome;

/// Subtrees of the staging tree that this builder owns and recreates.
const STAGING_SUBTREES: &[&str] = &["usr", "root/tonarchy"];

/// Remove the builder-owned subtrees of `airootfs`.
///
/// A subtree that cannot be removed is reported as advisory; a missing
/// subtree is the normal case on a fresh checkout.
pub fn clean_staging(config: &BuildConfig) -> Result<StageOutcome> {
    let airootfs = config.airootfs();
    let mut outcome = StageOutcome::Ok;

    for subtree in STAGING_SUBTREES {
        let path = airootfs.join(subtree);
        if let Err(err) = remove_tree(&path) {
            outcome = outcome.merge(StageOutcome::Advisory(format!(
                "could not clean '{}': {:#}",
                path.display(),
                err
            )));
        }
    }

    Ok(outcome)
}

/// Destroy the work tree so mkarchiso starts from scratch.
///
/// Any filesystem still mounted under it is unmounted best-effort first
/// (absence of mounts is normal). Failure to remove the tree itself is
/// fatal: a stale work tree poisons the next image.
pub fn clean_work_dir(config: &BuildConfig) -> Result<StageOutcome> {
    // Recursive unmount; ignored entirely, including a missing umount/sudo.
    let _ = Cmd::new("sudo")
        .args(["umount", "-R"])
        .arg_path(&config.work_dir)
        .allow_fail()
        .run();

    remove_tree(&config.work_dir)
        .with_context(|| format!("removing work directory '{}'", config.work_dir.display()))?;

    // Let queued device writes drain before the tree is recreated.
    settle(1);

    Ok(StageOutcome::Ok)
}

/// Flush filesystem buffers and pause for asynchronous writes.
pub fn settle(seconds: u64) {
    unsafe {
        libc::sync();
    }
    thread::sleep(Duration::from_secs(seconds));
}

/// Remove a directory tree, escalating to `sudo rm -rf` on permission errors.
fn remove_tree(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            Cmd::new("sudo")
                .args(["rm", "-rf"])
                .arg_path(path)
                .error_msg(format!("failed to remove '{}'", path.display()))
                .run()?;
            Ok(())
        }
        Err(err) => Err(err).with_context(|| format!("removing '{}'", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliOverrides;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_clean_work_dir_removes_tree() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        fs::create_dir_all(work.join("x86_64/airootfs/etc")).unwrap();
        fs::write(work.join("x86_64/airootfs/etc/hostname"), "tonarchy").unwrap();

        let mut overrides = CliOverrides::default();
        overrides.work_dir = Some(work.clone());
        let config = BuildConfig::resolve_from(temp.path(), overrides).unwrap();

        let outcome = clean_work_dir(&config).unwrap();
        assert_eq!(outcome, StageOutcome::Ok);
        assert!(!work.exists());
    }

    #[test]
    fn test_clean_work_dir_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let mut overrides = CliOverrides::default();
        overrides.work_dir = Some(temp.path().join("never-created"));
        let config = BuildConfig::resolve_from(temp.path(), overrides).unwrap();

        clean_work_dir(&config).unwrap();
        clean_work_dir(&config).unwrap();
    }

    #[test]
    fn test_clean_staging_tolerates_missing_subtrees() {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig::resolve_from(temp.path(), CliOverrides::default()).unwrap();

        // No airootfs at all: both subtrees are simply absent.
        assert_eq!(clean_staging(&config).unwrap(), StageOutcome::Ok);
    }

    #[test]
    fn test_clean_staging_removes_owned_subtrees() {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig::resolve_from(temp.path(), CliOverrides::default()).unwrap();

        let usr = config.airootfs().join("usr/local/bin");
        let keep = config.airootfs().join("etc");
        fs::create_dir_all(&usr).unwrap();
        fs::create_dir_all(&keep).unwrap();

        clean_staging(&config).unwrap();
        assert!(!config.airootfs().join("usr").exists());
        assert!(keep.exists(), "profile-owned files must survive");
    }
}

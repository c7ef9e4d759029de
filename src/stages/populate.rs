//! Stage: populate the staging tree (`airootfs`) with the built appliance.
//!
//! Layout produced inside the profile:
//!
//! ```text
//! airootfs/usr/local/bin/tonarchy       the static binary, mode 0755
//! airootfs/usr/share/tonarchy/          the assets/ tree
//! airootfs/usr/share/wallpapers/        assets/wallpapers (optional)
//! ```
//!
//! Everything except the wallpaper copy is fatal on failure. The populated
//! subtree is handed to root:root afterwards so mkarchiso packs it with
//! sane ownership; that step is fatal too.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::config::BuildConfig;
use crate::process::Cmd;
use crate::stages::build::artifact_path;
use crate::stages::StageOutcome;

/// Installed name of the appliance binary.
pub const INSTALLED_BINARY: &str = "tonarchy";
/// Share directory for appliance assets, relative to `airootfs`.
pub const SHARE_SUBDIR: &str = "usr/share/tonarchy";

/// Copy the binary and asset trees into `airootfs`, then fix ownership.
pub fn populate_staging(config: &BuildConfig) -> Result<StageOutcome> {
    let outcome = populate_tree(config)?;
    own_tree(config)?;
    Ok(outcome)
}

/// Filesystem part of the stage: directories, binary, assets, wallpapers.
pub fn populate_tree(config: &BuildConfig) -> Result<StageOutcome> {
    let airootfs = config.airootfs();

    let bin_dir = airootfs.join("usr/local/bin");
    fs::create_dir_all(&bin_dir)
        .with_context(|| format!("creating '{}'", bin_dir.display()))?;

    let installed = bin_dir.join(INSTALLED_BINARY);
    let built = artifact_path(config);
    fs::copy(&built, &installed).with_context(|| {
        format!(
            "copying '{}' to '{}'",
            built.display(),
            installed.display()
        )
    })?;
    fs::set_permissions(&installed, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("setting permissions on '{}'", installed.display()))?;

    let assets = config.source_root.join("assets");
    let share = airootfs.join(SHARE_SUBDIR);
    copy_dir_recursive(&assets, &share)
        .with_context(|| format!("copying assets to '{}'", share.display()))?;

    // Wallpapers are cosmetic; a checkout without them still builds.
    let wallpapers = assets.join("wallpapers");
    let wallpapers_dest = airootfs.join("usr/share/wallpapers");
    match copy_dir_recursive(&wallpapers, &wallpapers_dest) {
        Ok(()) => Ok(StageOutcome::Ok),
        Err(err) => Ok(StageOutcome::Advisory(format!(
            "wallpapers not staged: {:#}",
            err
        ))),
    }
}

/// Hand the populated subtree to the privileged system owner.
fn own_tree(config: &BuildConfig) -> Result<()> {
    let usr = config.airootfs().join("usr");
    Cmd::new("sudo")
        .args(["chown", "-R", "root:root"])
        .arg_path(&usr)
        .error_msg(format!("failed to set ownership on '{}'", usr.display()))
        .run()?;
    Ok(())
}

/// Recursively copy a directory, preserving symlinks as symlinks.
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        anyhow::bail!("source directory not found: {}", src.display());
    }
    fs::create_dir_all(dst)
        .with_context(|| format!("creating '{}'", dst.display()))?;

    for entry in
        fs::read_dir(src).with_context(|| format!("reading '{}'", src.display()))?
    {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            let link_target = fs::read_link(&src_path)?;
            if dst_path.is_symlink() || dst_path.exists() {
                fs::remove_file(&dst_path)?;
            }
            std::os::unix::fs::symlink(&link_target, &dst_path)
                .with_context(|| format!("creating symlink '{}'", dst_path.display()))?;
        } else if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)
                .with_context(|| format!("copying '{}'", src_path.display()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliOverrides;
    use tempfile::TempDir;

    fn config_with_artifact(temp: &TempDir) -> BuildConfig {
        let config = BuildConfig::resolve_from(temp.path(), CliOverrides::default()).unwrap();
        fs::write(artifact_path(&config), b"\x7fELF fake").unwrap();
        config
    }

    #[test]
    fn test_populate_tree_installs_binary_executable() {
        let temp = TempDir::new().unwrap();
        let config = config_with_artifact(&temp);
        fs::create_dir_all(temp.path().join("assets/wallpapers")).unwrap();
        fs::write(temp.path().join("assets/keybindings.conf"), "mod=SUPER\n").unwrap();

        let outcome = populate_tree(&config).unwrap();
        assert_eq!(outcome, StageOutcome::Ok);

        let installed = config.airootfs().join("usr/local/bin").join(INSTALLED_BINARY);
        assert!(installed.is_file());
        let mode = fs::metadata(&installed).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        assert!(config
            .airootfs()
            .join(SHARE_SUBDIR)
            .join("keybindings.conf")
            .is_file());
    }

    #[test]
    fn test_missing_wallpapers_is_advisory() {
        let temp = TempDir::new().unwrap();
        let config = config_with_artifact(&temp);
        fs::create_dir_all(temp.path().join("assets")).unwrap();
        fs::write(temp.path().join("assets/motd"), "welcome\n").unwrap();

        match populate_tree(&config).unwrap() {
            StageOutcome::Advisory(reason) => assert!(reason.contains("wallpapers")),
            StageOutcome::Ok => panic!("expected advisory outcome"),
        }

        assert!(config.airootfs().join(SHARE_SUBDIR).join("motd").is_file());
    }

    #[test]
    fn test_missing_assets_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config = config_with_artifact(&temp);

        let err = populate_tree(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("copying assets"));
    }

    #[test]
    fn test_missing_artifact_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig::resolve_from(temp.path(), CliOverrides::default()).unwrap();
        fs::create_dir_all(temp.path().join("assets")).unwrap();

        assert!(populate_tree(&config).is_err());
    }

    #[test]
    fn test_populate_tree_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let config = config_with_artifact(&temp);
        fs::create_dir_all(temp.path().join("assets/wallpapers")).unwrap();

        populate_tree(&config).unwrap();
        populate_tree(&config).unwrap();
    }

    #[test]
    fn test_copy_dir_recursive_preserves_symlinks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("sub/file"), "data").unwrap();
        std::os::unix::fs::symlink("sub/file", src.join("link")).unwrap();

        copy_dir_recursive(&src, &dst).unwrap();

        assert!(dst.join("sub/file").is_file());
        assert!(dst.join("link").is_symlink());
        assert_eq!(fs::read_link(dst.join("link")).unwrap(), Path::new("sub/file"));
    }
}

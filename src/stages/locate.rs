//! Stage: locate the produced ISO and write its checksum sidecar.
//!
//! mkarchiso names the image itself, so the pipeline finds the newest
//! `*.iso` in the output directory rather than guessing the name. An empty
//! output directory after a "successful" generation is a fatal condition:
//! the tool produced nothing where it was told to.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Newest `*.iso` in the output directory.
pub fn locate_artifact(out_dir: &Path) -> Result<PathBuf> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in fs::read_dir(out_dir)
        .with_context(|| format!("reading output directory '{}'", out_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "iso") {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .with_context(|| format!("reading mtime of '{}'", path.display()))?;

        match &newest {
            Some((best, _)) if *best >= modified => {}
            _ => newest = Some((modified, path)),
        }
    }

    match newest {
        Some((_, path)) => Ok(path),
        None => bail!("no ISO image found in '{}'", out_dir.display()),
    }
}

/// Write `<iso>.sha256` next to the image.
///
/// The sidecar uses the plain `sha256sum` format with just the file name,
/// so `cd out && sha256sum -c *.sha256` verifies it.
pub fn write_checksum(iso_path: &Path) -> Result<PathBuf> {
    let hash = sha256_file(iso_path)?;
    let filename = iso_path
        .file_name()
        .with_context(|| format!("no file name in '{}'", iso_path.display()))?
        .to_string_lossy()
        .into_owned();

    let sidecar = iso_path.with_file_name(format!("{}.sha256", filename));
    fs::write(&sidecar, format!("{}  {}\n", hash, filename))
        .with_context(|| format!("writing checksum '{}'", sidecar.display()))?;
    Ok(sidecar)
}

fn sha256_file(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("reading '{}'", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

//! Packs a converted model directory into a single zip archive.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::Result;

/// A packaged asset ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    /// File name only, e.g. `cat.zip`
    pub file_name: String,
    /// Location on disk
    pub path: PathBuf,
}

/// Packs every file under `<models_dir>/<asset_name>/` into
/// `<models_dir>/<asset_name>.zip`.
///
/// Entry names are relative to the model directory and never carry the
/// directory's own name. Entries are written in sorted order with a fixed
/// timestamp and mode, so the same tree always gives the same bytes.
///
/// The source directory is left in place.
pub fn package_model(models_dir: &Path, asset_name: &str) -> Result<Archive> {
    let model_dir = models_dir.join(asset_name);
    if !model_dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Model directory not found: {}", model_dir.display()),
        )
        .into());
    }

    let file_name = format!("{}.zip", asset_name);
    let path = models_dir.join(&file_name);
    let partial = models_dir.join(format!("{}.partial", file_name));

    if let Err(e) = write_archive(&model_dir, &partial) {
        if let Err(remove_err) = fs::remove_file(&partial) {
            if remove_err.kind() != io::ErrorKind::NotFound {
                warn!("Could not remove partial archive {}: {}", partial.display(), remove_err);
            }
        }
        return Err(e);
    }
    fs::rename(&partial, &path)?;

    info!("Packaged {} into {}", model_dir.display(), path.display());
    Ok(Archive { file_name, path })
}

fn write_archive(model_dir: &Path, target: &Path) -> Result<()> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(File::create(target)?);
    let mut entries = 0usize;

    for entry in WalkDir::new(model_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry_name(model_dir, entry.path())?;
        debug!("Adding {}", name);
        writer.start_file(name, options)?;
        let mut file = File::open(entry.path())?;
        io::copy(&mut file, &mut writer)?;
        entries += 1;
    }

    writer.finish()?;
    debug!("Wrote {} entries", entries);
    Ok(())
}

/// Archive-internal name: path relative to the model directory, `/`-separated.
fn entry_name(model_dir: &Path, path: &Path) -> io::Result<String> {
    let relative = path.strip_prefix(model_dir).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is outside {}", path.display(), model_dir.display()),
        )
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Unexpected path component {:?} in {}", other, path.display()),
                ))
            }
        }
    }
    Ok(parts.join("/"))
}

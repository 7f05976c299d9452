//! Directory-to-archive bundling for data push.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use numass_core::error::{NumassError, Result};
pub use numass_core::NUMASS_ZIP_EXTENSION;

/// True for a path ending in [`NUMASS_ZIP_EXTENSION`].
pub fn is_numass_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(NUMASS_ZIP_EXTENSION))
        .unwrap_or(false)
}

/// Archive name without the numass extension.
pub fn archive_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    Some(name.strip_suffix(NUMASS_ZIP_EXTENSION).unwrap_or(name).to_string())
}

/// Zip `dir` into a temporary `.nm.zip` file.
///
/// The file lives in `temp_dir` (system temp dir when `None`) and is removed
/// when the returned handle is dropped.
pub fn pack_directory(dir: &Path, temp_dir: Option<&Path>) -> Result<NamedTempFile> {
    if !dir.is_dir() {
        return Err(NumassError::UnsupportedSource(dir.to_path_buf()));
    }

    let prefix = dir
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| format!("{n}-"))
        .unwrap_or_else(|| "numass-".to_string());
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(NUMASS_ZIP_EXTENSION);
    let mut tmp = match temp_dir {
        Some(d) => builder.tempfile_in(d),
        None => builder.tempfile(),
    }
    .map_err(|e| storage("create temporary archive", e))?;

    let mut files = Vec::new();
    collect_files(dir, &mut files)?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(tmp.as_file_mut());
    for path in &files {
        let name = entry_name(dir, path)?;
        zip.start_file(name, options)
            .map_err(|e| storage("write archive entry", e))?;
        let mut src = File::open(path).map_err(|e| storage("open archive source", e))?;
        io::copy(&mut src, &mut zip).map_err(|e| storage("copy archive entry", e))?;
    }
    zip.finish().map_err(|e| storage("finish archive", e))?;

    tracing::debug!(
        dir = %dir.display(),
        archive = %tmp.path().display(),
        entries = files.len(),
        "directory packed"
    );
    Ok(tmp)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| storage("list directory", e))?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| storage("list directory", e))?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Zip entry name: `/`-separated path relative to `root`.
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|e| storage("relativize archive entry", e))?;
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    Ok(parts.join("/"))
}

fn storage(what: &str, err: impl std::fmt::Display) -> NumassError {
    NumassError::Storage(format!("{what}: {err}"))
}

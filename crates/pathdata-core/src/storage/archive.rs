//! Zip packaging for directory-backed databases.
//!
//! A finalized database is one archive whose entries all live under
//! [`ARCHIVE_ROOT`]; unpacking restores the working directory contents.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{Result, StorageError};

/// Fixed root directory name inside every archive
pub const ARCHIVE_ROOT: &str = "database";

/// Pack every file under `source_dir` into `archive_path`.
///
/// The archive is written next to its destination and renamed into place,
/// so an interrupted pack never leaves a truncated archive behind.
pub fn pack_dir(source_dir: &Path, archive_path: &Path) -> Result<u64> {
    let tmp_path = archive_path.with_extension("zip.tmp");
    let file = File::create(&tmp_path)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    writer.add_directory(format!("{ARCHIVE_ROOT}/"), options)?;

    let mut bytes = 0u64;
    for entry in walk_files(source_dir)? {
        let relative = entry
            .strip_prefix(source_dir)
            .map_err(|_| StorageError::connection("archive entry outside working directory"))?;
        let name = format!(
            "{ARCHIVE_ROOT}/{}",
            relative.to_string_lossy().replace('\\', "/")
        );
        writer.start_file(name, options)?;
        let mut input = File::open(&entry)?;
        bytes += io::copy(&mut input, &mut writer)?;
    }

    writer.finish()?;
    fs::rename(&tmp_path, archive_path)?;
    Ok(bytes)
}

/// Unpack `archive_path` into `target_dir`, replacing whatever was there.
pub fn unpack(archive_path: &Path, target_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    if target_dir.exists() {
        fs::remove_dir_all(target_dir)?;
    }
    fs::create_dir_all(target_dir)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(enclosed) = entry.enclosed_name() else {
            return Err(StorageError::connection(
                "archive entry path traversal detected",
            ));
        };
        let Ok(relative) = enclosed.strip_prefix(ARCHIVE_ROOT) else {
            return Err(StorageError::connection(format!(
                "archive entry '{}' outside '{ARCHIVE_ROOT}/'",
                enclosed.display()
            )));
        };
        let entry_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&entry_path)?;
        io::copy(&mut entry, &mut outfile)?;
    }
    Ok(())
}

/// All regular files below `root`, in a stable order
fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

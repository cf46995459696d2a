//! Enumeration of candidate files under a source root.
//!
//! Filtering is purely name based, no file is opened for content
//! inspection here. Whether a candidate really is DICOM is decided later by
//! the extractor.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::ScanError;

/// Name of the media index file, which carries no image data.
pub const INDEX_FILE_NAME: &str = "DICOMDIR";

pub type Archive = ZipArchive<BufReader<File>>;

/// Whether the last component of `name` is the reserved index file name.
pub fn is_index_file(name: &str) -> bool {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.eq_ignore_ascii_case(INDEX_FILE_NAME)
}

/// Recursively list every regular file below `root`.
///
/// Unreadable subdirectories are skipped. The order of the returned paths
/// is not meaningful.
pub fn scan_directory(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !root.exists() {
        return Err(ScanError::NotFound(root.to_path_buf()));
    }

    let files = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("Skipping unreadable entry under {}: {}", root.display(), err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            !entry
                .file_name()
                .to_str()
                .is_some_and(is_index_file)
        })
        .map(|entry| entry.into_path())
        .collect();

    Ok(files)
}

/// Open a zip archive for reading.
pub fn open_archive(path: &Path) -> Result<Archive, ScanError> {
    if !path.exists() {
        return Err(ScanError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    Ok(ZipArchive::new(BufReader::new(file))?)
}

/// List the names of the file entries contained in an open archive.
pub fn archive_entries(archive: &Archive) -> Vec<String> {
    archive
        .file_names()
        .filter(|name| !name.ends_with('/') && !is_index_file(name))
        .map(str::to_string)
        .collect()
}

/// List the names of the file entries in the archive at `path`.
pub fn scan_archive(path: &Path) -> Result<Vec<String>, ScanError> {
    let archive = open_archive(path)?;
    Ok(archive_entries(&archive))
}

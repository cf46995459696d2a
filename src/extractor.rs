//! Metadata extraction for single files.
//!
//! The bulk scan only needs a handful of attributes per file, so headers are
//! parsed up to the pixel data element and never further. Failures are split
//! in two classes: content that is not DICOM ([`ExtractError::Unrecognized`])
//! and files that cannot be read at all.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use dicom::object::{
    FileDicomObject, InMemDicomObject, OpenFileOptions, ReadError, ReadPreamble,
    mem::InMemElement, open_file,
};
use dicom_dictionary_std::tags;
use zip::ZipArchive;

use crate::enums::LoadAttribute;
use crate::error::ExtractError;

/// A parsed DICOM file.
pub type DicomObject = FileDicomObject<InMemDicomObject>;

/// The abbreviated attribute map captured during the initial scan.
///
/// Only attributes present in the file are included.
pub type LoadAttributes = BTreeMap<LoadAttribute, String>;

/// Upper bound on the buffer reserved up front for an archive entry; the
/// declared size comes from the archive and is not trusted beyond this.
const MAX_ENTRY_PREALLOC: u64 = 64 * 1024 * 1024;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// Where the bytes of one series member live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileLocator {
    Path(PathBuf),
    /// An entry of a zip archive, named `<archive>?<entry>`
    ArchiveEntry { archive: PathBuf, entry: String },
}

impl FileLocator {
    pub fn archive_entry(archive: &Path, entry: impl Into<String>) -> Self {
        FileLocator::ArchiveEntry {
            archive: archive.to_path_buf(),
            entry: entry.into(),
        }
    }

    /// Name used for display and for ordering the files of a series.
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Parse the header of this file, stopping before the pixel data.
    ///
    /// Archive entries are always parsed completely since the entry has to be
    /// inflated into memory anyway.
    pub fn read_header(&self) -> Result<DicomObject, ExtractError> {
        match self {
            FileLocator::Path(path) => open_header(path),
            FileLocator::ArchiveEntry { .. } => self.read_full(),
        }
    }

    /// Parse the whole file including the pixel data.
    pub fn read_full(&self) -> Result<DicomObject, ExtractError> {
        match self {
            FileLocator::Path(path) => {
                open_file(path).map_err(|err| classify(path.display().to_string(), err))
            }
            FileLocator::ArchiveEntry { archive, entry } => {
                let bytes = read_archive_entry(archive, entry)?;
                parse_buffer(&self.name(), bytes)
            }
        }
    }
}

impl fmt::Display for FileLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileLocator::Path(path) => write!(f, "{}", path.display()),
            FileLocator::ArchiveEntry { archive, entry } => {
                write!(f, "{}?{}", archive.display(), entry)
            }
        }
    }
}

/// Parse the header of the file at `path` without its pixel payload.
pub fn open_header(path: &Path) -> Result<DicomObject, ExtractError> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|err| classify(path.display().to_string(), err))
}

/// Fully parse an in-memory DICOM file, with or without its preamble.
pub fn parse_buffer(name: &str, bytes: Vec<u8>) -> Result<DicomObject, ExtractError> {
    let offset = if bytes.get(PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()) == Some(&MAGIC[..]) {
        PREAMBLE_LEN
    } else if bytes.starts_with(MAGIC) {
        0
    } else {
        return Err(ExtractError::Unrecognized {
            name: name.to_string(),
            reason: "missing DICM magic code".to_string(),
        });
    };

    let mut cursor = Cursor::new(bytes);
    cursor.set_position(offset as u64);

    OpenFileOptions::new()
        .read_preamble(ReadPreamble::Never)
        .from_reader(cursor)
        .map_err(|err| classify(name.to_string(), err))
}

/// Read the raw bytes of one archive entry.
pub fn read_archive_entry(archive: &Path, entry: &str) -> Result<Vec<u8>, ExtractError> {
    let name = format!("{}?{}", archive.display(), entry);
    let file = File::open(archive).map_err(|source| ExtractError::Io {
        name: name.clone(),
        source,
    })?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|source| {
        ExtractError::Archive {
            name: name.clone(),
            source,
        }
    })?;
    let zip_entry = zip.by_name(entry).map_err(|source| ExtractError::Archive {
        name: name.clone(),
        source,
    })?;

    let size = zip_entry.size();
    read_entry(&name, size, zip_entry)
}

/// Read an archive entry that declares `size` bytes to the end.
///
/// The declared size is only a capacity hint, capped so that a corrupt
/// header cannot request an arbitrary allocation.
pub fn read_entry(
    name: &str,
    size: u64,
    mut reader: impl Read,
) -> Result<Vec<u8>, ExtractError> {
    let mut bytes = Vec::with_capacity(size.min(MAX_ENTRY_PREALLOC) as usize);
    reader
        .read_to_end(&mut bytes)
        .map_err(|source| ExtractError::Io {
            name: name.to_string(),
            source,
        })?;
    Ok(bytes)
}

/// Collect the load attributes present in `object`.
pub fn load_attributes(object: &DicomObject) -> LoadAttributes {
    LoadAttribute::ALL
        .into_iter()
        .filter_map(|attr| {
            let tag = attribute_tag(attr);
            let value = object.element(tag).ok().and_then(element_to_string)?;
            Some((attr, value))
        })
        .collect()
}

/// Header-only parse of `path` reduced to its load attributes.
///
/// This is the unit of parallel work during bulk ingestion. A file that is
/// not DICOM yields `Ok(None)`; only unreadable files are errors.
pub fn extract_load_attributes(path: &Path) -> Result<Option<LoadAttributes>, ExtractError> {
    match open_header(path) {
        Ok(object) => Ok(Some(load_attributes(&object))),
        Err(ExtractError::Unrecognized { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

/// String form of an element value with DICOM padding removed.
///
/// Sequences and values that cannot be represented as text yield `None`.
pub fn element_to_string(element: &InMemElement) -> Option<String> {
    let value = element.to_str().ok()?;
    Some(value.trim_end_matches([' ', '\0']).to_string())
}

fn attribute_tag(attr: LoadAttribute) -> dicom::core::Tag {
    match attr {
        LoadAttribute::SeriesInstanceUid => tags::SERIES_INSTANCE_UID,
        LoadAttribute::TriggerTime => tags::TRIGGER_TIME,
        LoadAttribute::PatientName => tags::PATIENT_NAME,
        LoadAttribute::SeriesDescription => tags::SERIES_DESCRIPTION,
        LoadAttribute::SeriesNumber => tags::SERIES_NUMBER,
        LoadAttribute::StudyDescription => tags::STUDY_DESCRIPTION,
    }
}

fn classify(name: String, err: ReadError) -> ExtractError {
    match err {
        ReadError::OpenFile { source, .. } => ExtractError::Io { name, source },
        other => ExtractError::Unrecognized {
            name,
            reason: other.to_string(),
        },
    }
}

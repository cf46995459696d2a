use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while enumerating the files under a root.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The root path does not exist
    #[error("Scan target not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not read archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Errors raised while parsing a single file.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The content is not a DICOM header
    #[error("Unrecognized file {name}: {reason}")]
    Unrecognized { name: String, reason: String },

    /// The file could not be read at all
    #[error("Could not read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not read archive entry {name}: {source}")]
    Archive {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Errors raised by the on-demand accessors of a series.
#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("Image index {index} out of range for series with {len} files")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Errors that abort the ingestion of one source.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The worker pool could not be started or lost tasks
    #[error("Worker pool failure: {0}")]
    WorkerPool(String),

    /// Nothing under the root could be parsed
    #[error("No DICOM series found under {}", .0.display())]
    NoSeries(PathBuf),

    /// A series ended up without any successfully ingested file
    #[error("Series {0} has no files, source rejected")]
    EmptySeriesRejected(String),
}

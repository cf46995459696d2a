use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::ScanError;

/// Kind of root a source was added from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Directory,
    Archive,
}

impl SourceKind {
    /// Classify `root` before dispatching it to a loader.
    ///
    /// Anything that exists and is not a directory is treated as an archive.
    pub fn classify(root: &Path) -> Result<Self, ScanError> {
        if root.is_dir() {
            Ok(SourceKind::Directory)
        } else if root.exists() {
            Ok(SourceKind::Archive)
        } else {
            Err(ScanError::NotFound(root.to_path_buf()))
        }
    }
}

/// Attributes captured from every file during the fast initial scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum LoadAttribute {
    SeriesInstanceUid,
    #[default]
    TriggerTime,
    PatientName,
    SeriesDescription,
    SeriesNumber,
    StudyDescription,
}

impl LoadAttribute {
    pub const ALL: [LoadAttribute; 6] = [
        LoadAttribute::SeriesInstanceUid,
        LoadAttribute::TriggerTime,
        LoadAttribute::PatientName,
        LoadAttribute::SeriesDescription,
        LoadAttribute::SeriesNumber,
        LoadAttribute::StudyDescription,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            LoadAttribute::SeriesInstanceUid => "SeriesInstanceUID",
            LoadAttribute::TriggerTime => "TriggerTime",
            LoadAttribute::PatientName => "PatientName",
            LoadAttribute::SeriesDescription => "SeriesDescription",
            LoadAttribute::SeriesNumber => "SeriesNumber",
            LoadAttribute::StudyDescription => "StudyDescription",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.keyword() == keyword)
    }
}

impl fmt::Display for LoadAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for LoadAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_keyword(s).ok_or_else(|| format!("not a load attribute keyword: {s}"))
    }
}

/// Keywords for values derived from a whole series rather than read from a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtraKeyword {
    NumImages,
    TimestepSpec,
    StartTime,
    NumTimesteps,
    TimeInterval,
}

impl ExtraKeyword {
    pub const ALL: [ExtraKeyword; 5] = [
        ExtraKeyword::NumImages,
        ExtraKeyword::TimestepSpec,
        ExtraKeyword::StartTime,
        ExtraKeyword::NumTimesteps,
        ExtraKeyword::TimeInterval,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            ExtraKeyword::NumImages => "NumImages",
            ExtraKeyword::TimestepSpec => "TimestepSpec",
            ExtraKeyword::StartTime => "StartTime",
            ExtraKeyword::NumTimesteps => "NumTimesteps",
            ExtraKeyword::TimeInterval => "TimeInterval",
        }
    }

    /// Column header shown for this keyword.
    pub fn display_name(self) -> &'static str {
        match self {
            ExtraKeyword::NumImages => "# Images",
            ExtraKeyword::TimestepSpec => "Timestep Info",
            ExtraKeyword::StartTime => "Start Time",
            ExtraKeyword::NumTimesteps => "# Timesteps",
            ExtraKeyword::TimeInterval => "Time Interval",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|extra| extra.keyword() == keyword)
    }
}

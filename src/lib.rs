//! # DICOM-browser library
//!
//! This crate finds DICOM series in directories and zip archives and serves
//! their headers and pixel data on demand.
//!
//! It is built on the dicom-rs ecosystem. When a source is added, only the
//! header of every file is parsed, in parallel using rayon, and the files are
//! grouped by Series Instance UID. The full header and the pixel data of an
//! image are read the first time they are asked for and cached in the
//! [`Series`] from then on. Zip archives are read once, completely, with
//! every entry cached up front.
//!
//!  The engine makes the following assumptions:
//!   - Files that do not parse as DICOM are skipped silently
//!   - Files without a Series Instance UID share one series, `"???"`
//!   - Files of a series are ordered by file name
//!   - Multi-dimensional pixel data is reduced to its middle 2D plane for
//!     display
//!
//! # Examples
//!
//! ## Listing the series of a directory
//!
//! Load every DICOM file below `dicom/`, then print the patient name and
//! number of images of each series found.
//!
//! ```no_run
//! # use dicom_browser::{ingest, IngestOptions, NoProgress};
//! # use std::path::Path;
//! let series = ingest(Path::new("dicom"), &IngestOptions::default(), &NoProgress)
//!     .expect("should have found series in directory");
//! for s in &series {
//!     let values = s
//!         .get_attr_values(&["PatientName", "NumImages"], 0)
//!         .expect("should have read first image");
//!     println!("{}: {}", s.series_id(), values.join(", "));
//! }
//! ```
//!
//! ## Browsing in the background
//!
//! A [`Browser`] ingests sources on its own thread and reports through a
//! channel, so a user interface stays responsive.
//!
//! ```no_run
//! # use dicom_browser::{Browser, BrowserEvent, IngestOptions};
//! let (browser, mut events) = Browser::new(IngestOptions::default()).unwrap();
//! browser.add_source("study.zip");
//! while let Some(event) = events.blocking_recv() {
//!     if let BrowserEvent::SourceAdded { series, .. } = event {
//!         println!("found {series} series");
//!         break;
//!     }
//! }
//! ```

pub mod attributes;
pub mod browser;
pub mod config;
pub mod dictionary;
pub mod enums;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod pixel;
pub mod progress;
pub mod scanner;
pub mod series;

pub use browser::{Browser, BrowserEvent, SeriesRow, Source};
pub use config::Config;
pub use enums::{ExtraKeyword, LoadAttribute, SourceKind};
pub use error::{ExtractError, IngestError, ScanError, SeriesError};
pub use ingest::{IngestOptions, ingest};
pub use progress::{NoProgress, Progress, ProgressSink};
pub use series::{Series, TimestepSpec};

//! Command line configuration for the `dicom-browser` binary.
//!
//! Every option can also be given through an environment variable with the
//! `DICOM_BROWSER_` prefix:
//!
//! - `DICOM_BROWSER_WORKERS` - Header parsing threads (default: available parallelism)
//! - `DICOM_BROWSER_COLUMNS` - Comma-separated series list keywords
//! - `DICOM_BROWSER_TEMPORAL` - Keyword the timestep spec is computed over (default: TriggerTime)

use std::path::PathBuf;

use clap::Parser;
use regex::Regex;

use crate::dictionary::{SERIES_LIST_COLUMNS, is_known_keyword};
use crate::enums::LoadAttribute;
use crate::ingest::IngestOptions;

/// Scan directories and zip archives for DICOM series and list them.
#[derive(Parser, Debug, Clone)]
#[command(name = "dicom-browser")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Directories or zip archives to load, in order.
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Number of header parsing threads.
    #[arg(short, long, env = "DICOM_BROWSER_WORKERS")]
    pub workers: Option<usize>,

    /// Keywords shown for each series.
    #[arg(
        long,
        env = "DICOM_BROWSER_COLUMNS",
        value_delimiter = ',',
        default_values_t = SERIES_LIST_COLUMNS.map(String::from)
    )]
    pub columns: Vec<String>,

    /// Keyword the timestep spec is computed over.
    #[arg(long, env = "DICOM_BROWSER_TEMPORAL", default_value_t = LoadAttribute::TriggerTime)]
    pub temporal: LoadAttribute,

    /// Print the attributes of this image of the first series.
    #[arg(short = 'a', long, value_name = "INDEX")]
    pub show_attributes: Option<usize>,

    /// Only print attributes whose name, tag and value match this regex.
    #[arg(short, long, requires = "show_attributes")]
    pub filter: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("workers must be greater than 0".to_string());
        }

        if self.columns.is_empty() {
            return Err("at least one column is required".to_string());
        }
        if let Some(unknown) = self.columns.iter().find(|c| !is_known_keyword(c)) {
            return Err(format!("unknown column keyword: {unknown}"));
        }

        if let Some(filter) = &self.filter {
            Regex::new(filter).map_err(|err| format!("invalid filter: {err}"))?;
        }

        Ok(())
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            workers: self.workers,
            temporal_attribute: self.temporal,
        }
    }

    /// The compiled attribute filter, call validate() first.
    pub fn filter_regex(&self) -> Option<Regex> {
        self.filter.as_deref().and_then(|f| Regex::new(f).ok())
    }
}

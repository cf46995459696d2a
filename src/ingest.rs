//! Ingestion of a source root into series.
//!
//! A root is classified as a directory or an archive and handed to the
//! matching [`SeriesLoader`]. The directory loader fans header parsing out
//! over a rayon thread pool and groups the results by series instance UID as
//! they arrive, in whatever order the workers finish. The archive loader
//! parses each entry completely and caches header and pixel data right away,
//! since entries are expensive to reopen later.
//!
//! After loading, [`finalize`] rejects sources with empty series and sorts
//! every series by file name, which fixes the display order for good.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use rayon::ThreadPoolBuilder;
use tracing::{debug, error, info, trace, warn};
use web_time::Instant;

use crate::enums::{LoadAttribute, SourceKind};
use crate::error::{ExtractError, IngestError};
use crate::extractor::{
    FileLocator, LoadAttributes, extract_load_attributes, load_attributes, parse_buffer,
    read_entry,
};
use crate::pixel::decode_image;
use crate::progress::{LOADING_STAGE, Progress, ProgressSink, ProgressThrottle, SCANNING_STAGE};
use crate::scanner::{archive_entries, open_archive, scan_directory};
use crate::series::{Series, UNKNOWN_SERIES_ID};

/// How long the collector waits on the result channel per poll.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options for ingesting one source.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Number of worker threads, the host's available parallelism if unset.
    pub workers: Option<usize>,
    /// Attribute the timestep spec of every series is computed over.
    pub temporal_attribute: LoadAttribute,
}

impl IngestOptions {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: Some(workers),
            ..Self::default()
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|&workers| workers > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
    }
}

/// Phases the directory coordinator moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Idle,
    Scanning,
    Dispatching,
    Collecting,
    Grouping,
    Done,
}

/// Turns one source root into its series.
pub trait SeriesLoader: Send + Sync {
    /// Load every series under `root`.
    ///
    /// Files that are not DICOM are skipped. The result is in no particular
    /// order and files within a series are not sorted yet. Implementations
    /// end every call, successful or not, with a [`Progress::finished`]
    /// notification.
    fn load(&self, root: &Path, progress: &dyn ProgressSink) -> Result<Vec<Series>, IngestError>;
}

/// Pick the loader for a classified root.
pub fn loader_for(kind: SourceKind, options: &IngestOptions) -> Box<dyn SeriesLoader> {
    match kind {
        SourceKind::Directory => Box::new(DirectoryLoader::new(options.clone())),
        SourceKind::Archive => Box::new(ArchiveLoader::new(options.clone())),
    }
}

/// Ingest the directory or archive at `root` and return its series, each
/// sorted by file name.
///
/// # Arguments
///
/// * `root` - Directory tree or zip archive to load
/// * `options` - Worker count and temporal attribute
/// * `progress` - Receives throttled notifications, always ending with
///   [`Progress::finished`]
///
/// # Errors
///
/// Returns error if the root does not exist or cannot be listed, the worker
/// pool fails, or the source holds no usable series
pub fn ingest(
    root: &Path,
    options: &IngestOptions,
    progress: &dyn ProgressSink,
) -> Result<Vec<Series>, IngestError> {
    ingest_classified(root, options, progress).map(|(_, series)| series)
}

/// Like [`ingest`], also returning how the root was classified.
pub fn ingest_classified(
    root: &Path,
    options: &IngestOptions,
    progress: &dyn ProgressSink,
) -> Result<(SourceKind, Vec<Series>), IngestError> {
    let kind = match SourceKind::classify(root) {
        Ok(kind) => kind,
        Err(err) => {
            progress.report(Progress::finished());
            return Err(err.into());
        }
    };

    let started = Instant::now();
    let series = loader_for(kind, options).load(root, progress)?;
    let series = finalize(root, series)?;

    info!(
        "Loaded {} series ({} files) from {} in {:?}",
        series.len(),
        series.iter().map(Series::len).sum::<usize>(),
        root.display(),
        started.elapsed()
    );
    Ok((kind, series))
}

/// Accept or reject the result of loading one source.
///
/// A source without series, or with any series that has no files, is
/// rejected as a whole. Accepted series are sorted by file name, and the
/// series themselves by identifier.
///
/// # Errors
///
/// Returns [`IngestError::NoSeries`] for an empty list and
/// [`IngestError::EmptySeriesRejected`] if any series has no files
pub fn finalize(root: &Path, mut series: Vec<Series>) -> Result<Vec<Series>, IngestError> {
    if series.is_empty() {
        return Err(IngestError::NoSeries(root.to_path_buf()));
    }
    if let Some(empty) = series.iter().find(|s| s.is_empty()) {
        return Err(IngestError::EmptySeriesRejected(empty.series_id().to_string()));
    }

    for s in &mut series {
        s.sort_files();
    }
    series.sort_by(|a, b| a.series_id().cmp(b.series_id()));
    Ok(series)
}

/// Reports the end of a load when dropped, whatever the outcome.
struct FinishGuard<'a>(&'a dyn ProgressSink);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.report(Progress::finished());
    }
}

/// Series keyed by identifier while a source is being loaded.
struct SeriesGroups {
    root: PathBuf,
    temporal_attribute: LoadAttribute,
    series: HashMap<String, Series>,
}

impl SeriesGroups {
    fn new(root: &Path, options: &IngestOptions) -> Self {
        Self {
            root: root.to_path_buf(),
            temporal_attribute: options.temporal_attribute,
            series: HashMap::new(),
        }
    }

    fn series_for(&mut self, load_attrs: &LoadAttributes) -> &mut Series {
        let series_id = load_attrs
            .get(&LoadAttribute::SeriesInstanceUid)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SERIES_ID);

        self.series
            .entry(series_id.to_string())
            .or_insert_with(|| {
                Series::new(series_id, self.root.clone())
                    .with_temporal_attribute(self.temporal_attribute)
            })
    }

    fn into_series(self) -> Vec<Series> {
        self.series.into_values().collect()
    }
}

/// Loads a directory tree with a pool of header parsing workers.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLoader {
    options: IngestOptions,
}

impl DirectoryLoader {
    pub fn new(options: IngestOptions) -> Self {
        Self { options }
    }
}

impl SeriesLoader for DirectoryLoader {
    fn load(&self, root: &Path, progress: &dyn ProgressSink) -> Result<Vec<Series>, IngestError> {
        let _finish = FinishGuard(progress);
        Coordinator::new(root, &self.options).run(&self.options, progress)
    }
}

/// The per-file unit of work run on the pool.
type ExtractFn = fn(&Path) -> Result<Option<LoadAttributes>, ExtractError>;

struct Coordinator {
    state: IngestState,
    groups: SeriesGroups,
    extract: ExtractFn,
}

impl Coordinator {
    fn new(root: &Path, options: &IngestOptions) -> Self {
        Self::with_extractor(root, options, extract_load_attributes)
    }

    fn with_extractor(root: &Path, options: &IngestOptions, extract: ExtractFn) -> Self {
        Self {
            state: IngestState::Idle,
            groups: SeriesGroups::new(root, options),
            extract,
        }
    }

    fn transition(&mut self, next: IngestState) {
        trace!("Ingestion state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn run(
        mut self,
        options: &IngestOptions,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Series>, IngestError> {
        self.transition(IngestState::Scanning);
        progress.report(Progress::new(SCANNING_STAGE, 0, 0));
        let files = scan_directory(&self.groups.root)?;
        let total = files.len();

        if total == 0 {
            debug!("No files found under {}", self.groups.root.display());
            self.transition(IngestState::Done);
            return Ok(Vec::new());
        }

        self.transition(IngestState::Dispatching);
        let workers = options.worker_count();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("dicom-ingest-{i}"))
            .panic_handler(|_| error!("Ingestion worker panicked"))
            .build()
            .map_err(|err| IngestError::WorkerPool(err.to_string()))?;

        debug!("Dispatching {} files to {} workers", total, workers);
        let (sender, receiver) = mpsc::channel();
        let extract = self.extract;
        for path in files {
            let sender = sender.clone();
            pool.spawn(move || {
                let result = extract(&path);
                // the collector only hangs up after a fatal error
                let _ = sender.send((path, result));
            });
        }
        drop(sender);

        self.transition(IngestState::Collecting);
        let throttle = ProgressThrottle::new(total);
        let mut completed = 0;
        let mut unreadable = 0;

        loop {
            let (path, result) = match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            completed += 1;

            match result {
                Ok(Some(load_attrs)) => {
                    self.transition(IngestState::Grouping);
                    self.groups
                        .series_for(&load_attrs)
                        .add_file(FileLocator::Path(path), load_attrs);
                    self.transition(IngestState::Collecting);
                }
                Ok(None) => trace!("Skipping non-DICOM file {}", path.display()),
                Err(err) => {
                    unreadable += 1;
                    warn!("Skipping unreadable file: {}", err);
                }
            }

            if throttle.should_report(completed) {
                progress.report(Progress::new(LOADING_STAGE, completed, total));
            }
        }

        if completed < total {
            return Err(IngestError::WorkerPool(format!(
                "{} of {} extraction tasks did not complete",
                total - completed,
                total
            )));
        }
        if unreadable > 0 {
            warn!(
                "{} of {} files under {} could not be read",
                unreadable,
                total,
                self.groups.root.display()
            );
        }

        self.transition(IngestState::Done);
        Ok(self.groups.into_series())
    }
}

/// Loads the entries of a zip archive, caching header and pixel data of
/// every DICOM entry up front.
#[derive(Debug, Clone, Default)]
pub struct ArchiveLoader {
    options: IngestOptions,
}

impl ArchiveLoader {
    pub fn new(options: IngestOptions) -> Self {
        Self { options }
    }
}

impl SeriesLoader for ArchiveLoader {
    fn load(&self, root: &Path, progress: &dyn ProgressSink) -> Result<Vec<Series>, IngestError> {
        let _finish = FinishGuard(progress);
        progress.report(Progress::new(SCANNING_STAGE, 0, 0));

        let mut archive = open_archive(root)?;
        let entries = archive_entries(&archive);
        let total = entries.len();
        let throttle = ProgressThrottle::new(total);
        let mut groups = SeriesGroups::new(root, &self.options);

        for (i, entry) in entries.iter().enumerate() {
            let locator = FileLocator::archive_entry(root, entry.as_str());

            let parsed = archive
                .by_name(entry)
                .map_err(|source| ExtractError::Archive {
                    name: locator.name(),
                    source,
                })
                .and_then(|file| {
                    let size = file.size();
                    read_entry(&locator.name(), size, file)
                })
                .and_then(|bytes| parse_buffer(&locator.name(), bytes));

            match parsed {
                Ok(object) => {
                    let load_attrs = load_attributes(&object);
                    let image = decode_image(&object);
                    groups
                        .series_for(&load_attrs)
                        .add_file_cached(locator, load_attrs, object, image);
                }
                Err(ExtractError::Unrecognized { name, .. }) => {
                    trace!("Skipping non-DICOM entry {}", name)
                }
                Err(err) => warn!("Skipping unreadable entry: {}", err),
            }

            if throttle.should_report(i + 1) {
                progress.report(Progress::new(LOADING_STAGE, i + 1, total));
            }
        }

        Ok(groups.into_series())
    }
}

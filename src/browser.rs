//! Source list and background ingestion for an interactive front end.
//!
//! Roots added with [`Browser::add_source`] are queued and ingested one at a
//! time on a dedicated thread; each root's own file parsing is still
//! parallel. The front end never blocks on ingestion. It receives
//! [`BrowserEvent`]s over an unbounded channel that can be polled with
//! `try_recv` from a UI loop or awaited from async code, and reads the
//! source list whenever it needs to redraw.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, error, info, warn};

use crate::enums::SourceKind;
use crate::error::IngestError;
use crate::ingest::{IngestOptions, ingest_classified};
use crate::progress::{Progress, ProgressSink};
use crate::series::Series;

/// A directory or archive added by the user, with the series found in it.
#[derive(Debug)]
pub struct Source {
    pub root: PathBuf,
    pub kind: SourceKind,
    pub series: Vec<Arc<Series>>,
}

impl Source {
    /// Ingest `root` into a new source.
    pub fn load(
        root: &Path,
        options: &IngestOptions,
        progress: &dyn ProgressSink,
    ) -> Result<Self, IngestError> {
        let (kind, series) = ingest_classified(root, options, progress)?;
        Ok(Self {
            root: root.to_path_buf(),
            kind,
            series: series.into_iter().map(Arc::new).collect(),
        })
    }
}

/// One line of the series list.
#[derive(Debug, Clone)]
pub struct SeriesRow {
    pub source: PathBuf,
    pub series: Arc<Series>,
    pub values: Vec<String>,
}

/// Notifications from the ingestion thread.
#[derive(Debug, Clone)]
pub enum BrowserEvent {
    Progress(Progress),
    SourceAdded { root: PathBuf, series: usize },
    /// Nothing usable was found, the source was not added
    SourceRejected { root: PathBuf, reason: String },
    /// Ingestion failed with a structural error
    Failed { root: PathBuf, error: String },
}

impl BrowserEvent {
    /// Whether this event ends the processing of one queued root.
    pub fn is_outcome(&self) -> bool {
        !matches!(self, BrowserEvent::Progress(_))
    }
}

type SourceList = Arc<RwLock<Vec<Arc<Source>>>>;

/// Owns the source list and the ingestion thread feeding it.
///
/// Dropping the browser never waits for ingestion: roots still queued are
/// skipped and the thread is left to finish the source it is working on.
pub struct Browser {
    sources: SourceList,
    queue: Option<mpsc::Sender<PathBuf>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Browser {
    /// Start the ingestion thread.
    ///
    /// Returns the browser together with the receiving end of its event
    /// channel.
    pub fn new(
        options: IngestOptions,
    ) -> Result<(Self, UnboundedReceiver<BrowserEvent>), IngestError> {
        let sources = SourceList::default();
        let stop = Arc::new(AtomicBool::new(false));
        let (queue, roots) = mpsc::channel::<PathBuf>();
        let (events, receiver) = unbounded_channel();

        let worker = {
            let sources = Arc::clone(&sources);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("dicom-browser-ingest".to_string())
                .spawn(move || drain_queue(roots, &stop, &options, &sources, &events))
                .map_err(|err| IngestError::WorkerPool(err.to_string()))?
        };

        Ok((
            Self {
                sources,
                queue: Some(queue),
                stop,
                worker: Some(worker),
            },
            receiver,
        ))
    }

    /// Queue `root` for ingestion.
    ///
    /// Returns `false` if the ingestion thread is no longer running.
    pub fn add_source(&self, root: impl Into<PathBuf>) -> bool {
        let root = root.into();
        match &self.queue {
            Some(queue) => queue.send(root).is_ok(),
            None => false,
        }
    }

    /// Snapshot of the sources in the order they were added.
    pub fn sources(&self) -> Vec<Arc<Source>> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove the source at `index`, dropping its series.
    pub fn remove_source(&self, index: usize) -> Option<Arc<Source>> {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        (index < sources.len()).then(|| sources.remove(index))
    }

    /// Summary rows for every series of every source, with one value per
    /// keyword in `columns` taken from the first image of the series.
    pub fn series_table<S: AsRef<str>>(&self, columns: &[S]) -> Vec<SeriesRow> {
        self.sources()
            .iter()
            .flat_map(|source| {
                source.series.iter().map(move |series| {
                    let values = series.get_attr_values(columns, 0).unwrap_or_else(|err| {
                        warn!("Could not read summary of series {}: {}", series.series_id(), err);
                        vec![String::new(); columns.len()]
                    });
                    SeriesRow {
                        source: source.root.clone(),
                        series: Arc::clone(series),
                        values,
                    }
                })
            })
            .collect()
    }

    /// Skip the roots still queued and wait for the source being ingested,
    /// if any, to finish.
    pub fn shutdown(mut self) {
        self.close();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Ingestion thread panicked");
            }
        }
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.queue.take();
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        self.close();
        // detached, the thread exits after its current source
        self.worker.take();
    }
}

fn drain_queue(
    roots: mpsc::Receiver<PathBuf>,
    stop: &AtomicBool,
    options: &IngestOptions,
    sources: &SourceList,
    events: &UnboundedSender<BrowserEvent>,
) {
    for root in roots {
        if stop.load(Ordering::Acquire) {
            debug!("Browser closed, skipping {}", root.display());
            continue;
        }
        process_source(&root, options, sources, events);
    }
}

fn process_source(
    root: &Path,
    options: &IngestOptions,
    sources: &SourceList,
    events: &UnboundedSender<BrowserEvent>,
) {
    // a closed receiver only means nobody is watching any more
    let progress = |progress: Progress| {
        let _ = events.send(BrowserEvent::Progress(progress));
    };

    let event = match Source::load(root, options, &progress) {
        Ok(source) => {
            let count = source.series.len();
            sources
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Arc::new(source));
            BrowserEvent::SourceAdded {
                root: root.to_path_buf(),
                series: count,
            }
        }
        Err(err @ (IngestError::NoSeries(_) | IngestError::EmptySeriesRejected(_))) => {
            info!("Not adding {}: {}", root.display(), err);
            BrowserEvent::SourceRejected {
                root: root.to_path_buf(),
                reason: err.to_string(),
            }
        }
        Err(err) => {
            error!("Failed to load {}: {}", root.display(), err);
            BrowserEvent::Failed {
                root: root.to_path_buf(),
                error: err.to_string(),
            }
        }
    };

    let _ = events.send(event);
}

//! Progress notifications sent from ingestion to whoever displays status.

/// Stage label while the file list is being built.
pub const SCANNING_STAGE: &str = "Scanning files";

/// Stage label while files are being parsed.
pub const LOADING_STAGE: &str = "Loading DICOM files";

/// Roughly how many loading notifications one source produces.
pub const PROGRESS_STEPS: usize = 100;

/// One progress notification. An empty stage means ingestion of the
/// current source has finished, successfully or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub stage: String,
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(stage: impl Into<String>, completed: usize, total: usize) -> Self {
        Self {
            stage: stage.into(),
            completed,
            total,
        }
    }

    pub fn finished() -> Self {
        Self::new("", 0, 0)
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_empty()
    }
}

/// Receiver of progress notifications.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn report(&self, progress: Progress) {
        self(progress)
    }
}

/// Sink that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: Progress) {}
}

/// Limits notifications to about [`PROGRESS_STEPS`] per batch.
#[derive(Debug, Clone, Copy)]
pub struct ProgressThrottle {
    step: usize,
}

impl ProgressThrottle {
    pub fn new(total: usize) -> Self {
        Self {
            step: (total / PROGRESS_STEPS).max(1),
        }
    }

    /// Whether the `completed`-th completion should be reported.
    pub fn should_report(&self, completed: usize) -> bool {
        completed % self.step == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reports(total: usize) -> usize {
        let throttle = ProgressThrottle::new(total);
        (1..=total).filter(|&c| throttle.should_report(c)).count()
    }

    #[test]
    fn test_throttle_limits_large_batches() {
        assert_eq!(reports(1000), 100);
        assert_eq!(reports(100_000), 100);
        assert!((100..=110).contains(&reports(1050)));
    }

    #[test]
    fn test_throttle_reports_every_file_of_small_batches() {
        assert_eq!(reports(7), 7);
        assert_eq!(reports(99), 99);
    }

    #[test]
    fn test_finished_marker() {
        assert!(Progress::finished().is_finished());
        assert!(!Progress::new(LOADING_STAGE, 1, 2).is_finished());
    }

    #[test]
    fn test_closure_sink() {
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |p: Progress| seen.lock().unwrap().push(p);
        sink.report(Progress::new(LOADING_STAGE, 1, 1));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}

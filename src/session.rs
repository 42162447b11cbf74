use arc_swap::ArcSwapOption;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::bundle::{AtomicUnitDetector, BundleExtensionDetector};
use crate::config::ScanConfig;
use crate::crawler::{CancelToken, FileCrawler, ScanSnapshot, ScanStatus};
use crate::error::ScanError;
use crate::throttle::{Clock, SystemClock};

/// Deep trees recurse once per level on the worker thread.
const SCAN_STACK_SIZE: usize = 16 * 1024 * 1024;

pub type ScanId = u64;

/// Terminal state of a scan, delivered exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed,
    Cancelled,
    Failed { message: String },
}

impl From<Result<ScanStatus, ScanError>> for ScanOutcome {
    fn from(result: Result<ScanStatus, ScanError>) -> Self {
        match result {
            Ok(ScanStatus::Completed) => ScanOutcome::Completed,
            Ok(ScanStatus::Cancelled) => ScanOutcome::Cancelled,
            Err(err) => ScanOutcome::Failed {
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    Snapshot(Arc<ScanSnapshot>),
    Finished(ScanOutcome),
}

/// Caller-side reference to one scan.
#[derive(Debug, Clone)]
pub struct ScanHandle {
    id: ScanId,
    root: PathBuf,
    cancel: CancelToken,
}

impl ScanHandle {
    pub fn id(&self) -> ScanId {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ask the scan to stop. A no-op once it has finished or was already
    /// cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct ActiveScan {
    handle: ScanHandle,
    events: Receiver<ScanEvent>,
    worker: Option<JoinHandle<()>>,
    finished: bool,
}

/// Runs at most one scan at a time on a background thread.
///
/// Snapshots arrive in order through [`ScanSession::poll_events`]; the
/// newest one is also kept in a slot readable at any time through
/// [`ScanSession::latest`]. Only the scan worker writes that slot.
pub struct ScanSession {
    config: ScanConfig,
    detector: Arc<dyn AtomicUnitDetector>,
    clock: Arc<dyn Clock>,
    latest: Arc<ArcSwapOption<ScanSnapshot>>,
    active: Option<ActiveScan>,
    next_id: ScanId,
}

impl ScanSession {
    pub fn new(config: ScanConfig) -> Self {
        let detector = Arc::new(BundleExtensionDetector::from_config(&config));
        Self {
            config,
            detector,
            clock: Arc::new(SystemClock),
            latest: Arc::new(ArcSwapOption::empty()),
            active: None,
            next_id: 1,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn AtomicUnitDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Start scanning `root`, first cancelling and joining any scan still
    /// running. The previous result stays in [`ScanSession::latest`] until
    /// the new scan publishes.
    pub fn start_scan<P: AsRef<Path>>(&mut self, root: P) -> Result<ScanHandle, ScanError> {
        self.stop_active();

        let id = self.next_id;
        self.next_id += 1;
        let handle = ScanHandle {
            id,
            root: root.as_ref().to_path_buf(),
            cancel: CancelToken::new(),
        };

        let (tx, rx) = mpsc::channel::<ScanEvent>();
        let crawler = FileCrawler::new(self.config.clone())
            .with_detector(self.detector.clone())
            .with_clock(self.clock.clone())
            .with_cancel_token(handle.cancel.clone());
        let latest = self.latest.clone();
        let root_path = handle.root.clone();

        let worker = thread::Builder::new()
            .name(format!("dirscope-scan-{id}"))
            .stack_size(SCAN_STACK_SIZE)
            .spawn(move || {
                let snapshot_tx = tx.clone();
                let result = catch_unwind(AssertUnwindSafe(|| {
                    crawler.scan(&root_path, |snapshot| {
                        let snapshot = Arc::new(snapshot);
                        latest.store(Some(snapshot.clone()));
                        let _ = snapshot_tx.send(ScanEvent::Snapshot(snapshot));
                    })
                }));

                let outcome = match result {
                    Ok(result) => ScanOutcome::from(result),
                    Err(_) => ScanOutcome::Failed {
                        message: ScanError::WorkerPanicked.to_string(),
                    },
                };
                if let ScanOutcome::Failed { message } = &outcome {
                    log::warn!("Scan of {} failed: {}", root_path.display(), message);
                }
                let _ = tx.send(ScanEvent::Finished(outcome));
            })
            .map_err(ScanError::WorkerSpawn)?;

        self.active = Some(ActiveScan {
            handle: handle.clone(),
            events: rx,
            worker: Some(worker),
            finished: false,
        });
        Ok(handle)
    }

    /// Cancel the scan behind `handle`; harmless if it already ended.
    pub fn cancel(&self, handle: &ScanHandle) {
        handle.cancel();
    }

    pub fn cancel_active(&self) {
        if let Some(active) = &self.active {
            active.handle.cancel();
        }
    }

    pub fn active_handle(&self) -> Option<&ScanHandle> {
        self.active.as_ref().map(|active| &active.handle)
    }

    pub fn is_scanning(&self) -> bool {
        self.active.as_ref().map(|a| !a.finished).unwrap_or(false)
    }

    /// Most recent snapshot published by any scan of this session.
    pub fn latest(&self) -> Option<Arc<ScanSnapshot>> {
        self.latest.load_full()
    }

    /// Forget the last published result.
    pub fn clear(&mut self) {
        self.latest.store(None);
    }

    /// Drain pending events without blocking.
    pub fn poll_events(&mut self) -> Vec<ScanEvent> {
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        loop {
            match active.events.try_recv() {
                Ok(event) => {
                    if matches!(event, ScanEvent::Finished(_)) {
                        active.finished = true;
                    }
                    events.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !active.finished {
                        active.finished = true;
                        events.push(ScanEvent::Finished(ScanOutcome::Failed {
                            message: "Scan channel disconnected".to_string(),
                        }));
                    }
                    break;
                }
            }
        }
        events
    }

    /// Block until the active scan ends and return its outcome.
    ///
    /// Intermediate snapshots are discarded; the final one is available
    /// through [`ScanSession::latest`]. Returns `None` when no scan is
    /// pending.
    pub fn wait(&mut self) -> Option<ScanOutcome> {
        let active = self.active.as_mut()?;
        if active.finished {
            return None;
        }

        let outcome = loop {
            match active.events.recv() {
                Ok(ScanEvent::Snapshot(_)) => continue,
                Ok(ScanEvent::Finished(outcome)) => break outcome,
                Err(_) => {
                    break ScanOutcome::Failed {
                        message: "Scan channel disconnected".to_string(),
                    }
                }
            }
        };
        active.finished = true;
        if let Some(worker) = active.worker.take() {
            let _ = worker.join();
        }
        Some(outcome)
    }

    fn stop_active(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.handle.cancel();
        if let Some(worker) = active.worker.take() {
            if worker.join().is_err() {
                log::warn!("Scan worker {} did not shut down cleanly", active.handle.id);
            }
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.stop_active();
    }
}

// Directory scanning module
// Enumerates the regular files of one directory, digests and classifies each

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver};
use tracing::{debug, info, warn};

use super::classify::Classifier;
use super::digest::{DigestEngine, DigestSet};
use super::error::ScanError;
use super::registry::Label;

#[derive(Debug, Default)]
struct CancelFlag {
    cancelled: AtomicBool,
    /// Bumped on every `cancel`
    trips: AtomicU64,
}

/// Shared flag used to stop a scan between files (and between chunks of a file)
///
/// A child token is cancelled by its own `cancel` or by any `cancel` on the
/// parent made after the child was created.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<CancelFlag>,
    parent: Option<(Arc<CancelFlag>, u64)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.cancelled.store(true, Ordering::Relaxed);
        self.flag.trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        match &self.parent {
            Some((parent, seen)) => parent.trips.load(Ordering::Relaxed) != *seen,
            None => false,
        }
    }

    /// Clear this token's own flag; children already tripped stay cancelled
    pub fn reset(&self) {
        self.flag.cancelled.store(false, Ordering::Relaxed);
    }

    /// New token tripped by this one from now on, and cancellable on its own
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(CancelFlag::default()),
            parent: Some((Arc::clone(&self.flag), self.flag.trips.load(Ordering::Relaxed))),
        }
    }
}

/// Verdict for one scanned file
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanResult {
    /// Position in enumeration order, starting at 0
    pub index: usize,
    /// File name relative to the scanned directory
    pub file_name: String,
    pub path: PathBuf,
    pub label: Label,
    /// Absent when the file could not be digested
    pub digests: Option<DigestSet>,
    pub size: u64,
    /// Why the file could not be classified
    pub error: Option<String>,
}

impl ScanResult {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_malicious(&self) -> bool {
        self.label.is_malicious()
    }
}

/// Progress information emitted after each file
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanProgress {
    /// Number of files reported so far, starting at 1
    pub current: usize,
    pub total: usize,
    pub current_file: String,
}

/// Statistics collected during a directory scan
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ScanStats {
    pub files_total: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub files_malicious: usize,
    pub total_bytes: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    pub started_at: String,
}

// Helper function to serialize Duration as seconds
fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Lifecycle of a scan run
///
/// `Idle` and `Enumerating` are only observable inside `ScanEngine::scan`;
/// a missing or invalid root is reported as an error from that call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Idle,
    Enumerating,
    Scanning { index: usize },
    /// The directory held no regular files
    Empty,
    Done,
    Cancelled,
}

impl ScanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Empty | ScanState::Done | ScanState::Cancelled)
    }
}

/// Events delivered to the registered callback
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ScanEvent {
    Started { total: usize },
    Progress(ScanProgress),
    Empty,
    Completed(ScanStats),
    Cancelled { processed: usize, total: usize },
}

/// Type alias for event callback function
pub type EventCallback = Box<dyn Fn(&ScanEvent) + Send + Sync>;

/// Everything a scan produced, collected
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanReport {
    pub root: PathBuf,
    pub state: ScanState,
    pub results: Vec<ScanResult>,
    pub stats: ScanStats,
}

/// Engine for scanning directories against a signature registry
pub struct ScanEngine {
    digest: DigestEngine,
    classifier: Classifier,
    concurrency: usize,
    cancel: CancelToken,
    event_callback: Option<Arc<EventCallback>>,
}

impl ScanEngine {
    /// Create a sequential ScanEngine
    pub fn new(classifier: Classifier) -> Self {
        Self {
            digest: DigestEngine::new(),
            classifier,
            concurrency: 1,
            cancel: CancelToken::new(),
            event_callback: None,
        }
    }

    /// Set the number of files digested at once (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_digest_engine(mut self, digest: DigestEngine) -> Self {
        self.digest = digest;
        self
    }

    /// Use an externally owned cancellation token
    ///
    /// Cancelling it stops the runs in progress. Runs started afterwards are
    /// not affected.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set an event callback function
    pub fn with_event_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ScanEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Collect the regular files directly inside `root`, sorted by name
    ///
    /// Subdirectories, symbolic links and special files are left out.
    pub fn collect_files(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        let metadata = fs::metadata(root).map_err(|e| {
            ScanError::from_io_error(e, "scanning directory", Some(root.to_path_buf()))
        })?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        let entries = fs::read_dir(root).map_err(|e| {
            ScanError::from_io_error(e, "listing directory", Some(root.to_path_buf()))
        })?;

        let mut files = Vec::new();
        for entry_result in entries {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %root.display(), error = %e, "cannot read directory entry");
                    continue;
                }
            };

            // file_type() does not follow symlinks
            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => files.push(entry.path()),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "cannot read file type");
                }
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Start scanning `root`
    ///
    /// The root is validated and enumerated before this returns; digesting
    /// happens as the returned run is iterated. Each call starts over.
    pub fn scan(&self, root: &Path) -> Result<ScanRun, ScanError> {
        let files = self.collect_files(root)?;
        let cancel = self.cancel.child();
        let total = files.len();
        let started = Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();

        let mut run = ScanRun {
            root: root.to_path_buf(),
            total,
            next_index: 0,
            state: ScanState::Enumerating,
            mode: RunMode::Sequential { files: Vec::new() },
            digest: self.digest.clone(),
            classifier: self.classifier.clone(),
            cancel: cancel.clone(),
            event_callback: self.event_callback.clone(),
            stats: ScanStats {
                files_total: total,
                started_at,
                ..ScanStats::default()
            },
            started,
        };

        if total == 0 {
            info!(root = %root.display(), "no regular files to scan");
            run.state = ScanState::Empty;
            run.emit(&ScanEvent::Empty);
            return Ok(run);
        }

        let workers = self.concurrency.min(total);
        info!(root = %root.display(), files = total, workers, "starting scan");
        run.mode = if workers > 1 {
            self.spawn_workers(files, workers, &cancel)
        } else {
            RunMode::Sequential { files }
        };
        run.emit(&ScanEvent::Started { total });
        Ok(run)
    }

    /// Scan `root` and collect every result
    pub fn scan_all(&self, root: &Path) -> Result<ScanReport, ScanError> {
        let mut run = self.scan(root)?;
        let results: Vec<ScanResult> = run.by_ref().collect();
        Ok(ScanReport {
            root: root.to_path_buf(),
            state: run.state(),
            results,
            stats: run.stats(),
        })
    }

    /// Hand the file list to a bounded pool; results come back tagged with their index
    fn spawn_workers(
        &self,
        files: Vec<PathBuf>,
        workers: usize,
        cancel: &CancelToken,
    ) -> RunMode {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("scan-worker-{}", i))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "cannot start worker pool, scanning sequentially");
                return RunMode::Sequential { files };
            }
        };

        let (job_tx, job_rx) = unbounded::<(usize, PathBuf)>();
        for job in files.into_iter().enumerate() {
            // Receiver is alive in this scope
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        // Bounded so workers cannot run far ahead of a slow consumer
        let (result_tx, result_rx) = bounded::<(usize, ScanResult)>(workers * 2);

        for _ in 0..workers {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let digest = self.digest.clone();
            let classifier = self.classifier.clone();
            let cancel = cancel.clone();

            pool.spawn(move || {
                for (index, path) in jobs.iter() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let Some(result) = scan_file(index, &path, &digest, &classifier, &cancel) else {
                        break;
                    };
                    // The run was dropped
                    if results.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }

        RunMode::Pooled {
            results: result_rx,
            pending: BTreeMap::new(),
            _pool: pool,
        }
    }
}

/// Digest and classify one file
///
/// Returns `None` only when the scan was cancelled while reading it.
fn scan_file(
    index: usize,
    path: &Path,
    digest: &DigestEngine,
    classifier: &Classifier,
    cancel: &CancelToken,
) -> Option<ScanResult> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match digest.compute_digests_sized(path, cancel) {
        Ok((digests, size)) => {
            let label = classifier.classify(Some(&digests));
            debug!(file = %file_name, %label, "classified");
            Some(ScanResult {
                index,
                file_name,
                path: path.to_path_buf(),
                label,
                digests: Some(digests),
                size,
                error: None,
            })
        }
        Err(ScanError::Cancelled) => None,
        Err(e) => {
            // Keep the headline, drop the suggestion line
            let reason = e.to_string().lines().next().unwrap_or_default().to_string();
            warn!(file = %file_name, error = %reason, "could not digest file");
            Some(ScanResult {
                index,
                file_name,
                path: path.to_path_buf(),
                label: classifier.classify(None),
                digests: None,
                size: 0,
                error: Some(reason),
            })
        }
    }
}

enum RunMode {
    /// Files are digested one at a time as the run is iterated
    Sequential { files: Vec<PathBuf> },
    /// Workers digest ahead; out-of-order arrivals wait in `pending`
    Pooled {
        results: Receiver<(usize, ScanResult)>,
        pending: BTreeMap<usize, ScanResult>,
        _pool: rayon::ThreadPool,
    },
}

/// A scan in progress
///
/// Yields one `ScanResult` per enumerated file, always in enumeration order,
/// and stops early only when cancelled. Dropping the run cancels it, so
/// workers stop at their next chunk.
pub struct ScanRun {
    root: PathBuf,
    total: usize,
    next_index: usize,
    state: ScanState,
    mode: RunMode,
    digest: DigestEngine,
    classifier: Classifier,
    cancel: CancelToken,
    event_callback: Option<Arc<EventCallback>>,
    stats: ScanStats,
    started: Instant,
}

impl ScanRun {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of regular files found during enumeration
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Token that cancels this run only
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.state == ScanState::Empty
    }

    /// Statistics so far; final once the run reaches a terminal state
    pub fn stats(&self) -> ScanStats {
        let mut stats = self.stats.clone();
        if !self.state.is_terminal() {
            stats.duration = self.started.elapsed();
        }
        stats
    }

    fn emit(&self, event: &ScanEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }

    fn record(&mut self, result: ScanResult) -> ScanResult {
        if result.is_failure() {
            self.stats.files_failed += 1;
        } else {
            self.stats.files_processed += 1;
            self.stats.total_bytes += result.size;
        }
        if result.is_malicious() {
            self.stats.files_malicious += 1;
        }

        self.state = ScanState::Scanning { index: result.index };
        self.next_index += 1;
        self.emit(&ScanEvent::Progress(ScanProgress {
            current: self.next_index,
            total: self.total,
            current_file: result.file_name.clone(),
        }));
        result
    }

    fn finish(&mut self, state: ScanState) {
        self.state = state;
        self.stats.duration = self.started.elapsed();
        // Release worker channels
        self.mode = RunMode::Sequential { files: Vec::new() };

        match state {
            ScanState::Cancelled => {
                info!(processed = self.next_index, total = self.total, "scan cancelled");
                self.emit(&ScanEvent::Cancelled {
                    processed: self.next_index,
                    total: self.total,
                });
            }
            _ => {
                info!(
                    processed = self.stats.files_processed,
                    failed = self.stats.files_failed,
                    malicious = self.stats.files_malicious,
                    "scan complete"
                );
                self.emit(&ScanEvent::Completed(self.stats.clone()));
            }
        }
    }

    fn next_sequential(&mut self) -> Option<ScanResult> {
        let RunMode::Sequential { files } = &self.mode else {
            return None;
        };
        let path = files.get(self.next_index)?.clone();
        scan_file(self.next_index, &path, &self.digest, &self.classifier, &self.cancel)
    }

    fn next_pooled(&mut self) -> Option<ScanResult> {
        let RunMode::Pooled { results, pending, .. } = &mut self.mode else {
            return None;
        };
        loop {
            if let Some(result) = pending.remove(&self.next_index) {
                return Some(result);
            }
            if self.cancel.is_cancelled() {
                return None;
            }
            // Disconnect with a gap means the workers stopped early
            let (index, result) = results.recv().ok()?;
            pending.insert(index, result);
        }
    }
}

impl Iterator for ScanRun {
    type Item = ScanResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state.is_terminal() {
            return None;
        }
        if self.next_index >= self.total {
            self.finish(ScanState::Done);
            return None;
        }
        if self.cancel.is_cancelled() {
            self.finish(ScanState::Cancelled);
            return None;
        }

        let next = if matches!(self.mode, RunMode::Pooled { .. }) {
            self.next_pooled()
        } else {
            self.next_sequential()
        };

        match next {
            Some(result) => Some(self.record(result)),
            None => {
                self.finish(ScanState::Cancelled);
                None
            }
        }
    }
}

impl Drop for ScanRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

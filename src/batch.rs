//! Folder walking, progress reporting and the background worker.
//!
//! A run counts matching files up front, then walks the tree a second time
//! doing the work, so the two passes can disagree if the tree changes in
//! between. `done` may then stop short of `total` or overshoot it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::compression::CompressionAlgorithm;
use crate::error::{BatchError, OptimizeError};
use crate::formats::{is_image_file, output_file_name};
use crate::optimizer::{self, Optimized};
use crate::request::{OptimizationRequest, OptimizeOptions};

/// Everything a run needs, fixed when the user presses start.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchJob {
    /// A single image or a folder to walk.
    pub input: PathBuf,
    pub output_root: PathBuf,
    pub options: OptimizeOptions,
}

impl BatchJob {
    pub fn new(
        input: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        options: OptimizeOptions,
    ) -> Self {
        Self {
            input: input.into(),
            output_root: output_root.into(),
            options,
        }
    }
}

/// Reported after every processed file, failed ones included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    /// Source file that was just handled.
    pub current: PathBuf,
}

impl Progress {
    pub fn percentage(&self) -> usize {
        if self.total > 0 {
            (self.done * 100 / self.total).min(100)
        } else {
            0
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub algorithm_used: Option<CompressionAlgorithm>,
    pub original_size: u64,
    pub new_size: u64,
    pub success: bool,
    pub message: String,
}

impl ProcessResult {
    fn from_outcome(source: &Path, outcome: Result<Optimized, OptimizeError>) -> Self {
        match outcome {
            Ok(optimized) => Self {
                source: source.to_path_buf(),
                output: Some(optimized.output_path),
                algorithm_used: Some(optimized.algorithm_used),
                original_size: optimized.original_size,
                new_size: optimized.new_size,
                success: true,
                message: String::new(),
            },
            Err(e) => Self::failed(source, &e),
        }
    }

    fn failed(source: &Path, error: &OptimizeError) -> Self {
        Self {
            source: source.to_path_buf(),
            output: None,
            algorithm_used: None,
            original_size: 0,
            new_size: 0,
            success: false,
            message: error.to_string(),
        }
    }

    pub fn filename(&self) -> String {
        self.source
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Count from the pre-scan.
    pub total: usize,
    pub results: Vec<ProcessResult>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcessResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn bytes_saved(&self) -> i64 {
        self.results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.original_size as i64 - r.new_size as i64)
            .sum()
    }
}

/// Cooperative stop signal, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Messages from the worker thread to whoever renders progress.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Progress(Progress),
    Finished(BatchReport),
    Failed(String),
}

/// Runs `job`, choosing single-file mode or a folder walk from the input.
pub fn run(
    job: &BatchJob,
    cancel: &CancelFlag,
    progress: impl FnMut(&Progress),
) -> Result<BatchReport, BatchError> {
    let input = job.input.as_path();
    if input.is_file() {
        run_single(job, cancel, progress)
    } else if input.is_dir() {
        run_batch(job, cancel, progress)
    } else if input.exists() {
        Err(BatchError::UnsupportedInput(input.to_path_buf()))
    } else {
        Err(BatchError::InputNotFound(input.to_path_buf()))
    }
}

/// Optimizes `job.input` as one file straight into the output root.
pub fn run_single(
    job: &BatchJob,
    cancel: &CancelFlag,
    mut progress: impl FnMut(&Progress),
) -> Result<BatchReport, BatchError> {
    prepare_output_root(&job.output_root)?;
    let mut report = BatchReport {
        total: 1,
        ..BatchReport::default()
    };
    if cancel.is_cancelled() {
        report.cancelled = true;
        return Ok(report);
    }

    let output = job
        .output_root
        .join(output_file_name(&job.input, job.options.force_jpeg));
    let request = OptimizationRequest::new(&job.input, output, job.options);
    report
        .results
        .push(ProcessResult::from_outcome(&job.input, optimizer::optimize(&request)));

    progress(&Progress {
        done: 1,
        total: 1,
        current: job.input.clone(),
    });
    Ok(report)
}

/// Walks `job.input`, mirroring its folders under `job.output_root`.
pub fn run_batch(
    job: &BatchJob,
    cancel: &CancelFlag,
    mut progress: impl FnMut(&Progress),
) -> Result<BatchReport, BatchError> {
    let root = job.input.as_path();
    prepare_output_root(&job.output_root)?;
    let skip = nested_output_root(root, &job.output_root);

    let total = count_images(root, skip.as_deref());
    info!(
        "Optimizing {} images from {} into {}",
        total,
        root.display(),
        job.output_root.display()
    );

    let mut report = BatchReport {
        total,
        ..BatchReport::default()
    };
    for source in image_files(root, skip) {
        if cancel.is_cancelled() {
            info!("Run cancelled after {} of {} images", report.processed(), total);
            report.cancelled = true;
            break;
        }

        let result = process_file(job, &source);
        debug!("{} -> success: {}", source.display(), result.success);
        report.results.push(result);

        progress(&Progress {
            done: report.processed(),
            total,
            current: source,
        });
    }

    info!(
        "Finished: {} optimized, {} failed, {} bytes saved",
        report.succeeded(),
        report.processed() - report.succeeded(),
        report.bytes_saved()
    );
    Ok(report)
}

/// Counts files with a recognized extension under `root`, leaving out the
/// `skip` subtree.
pub fn count_images(root: &Path, skip: Option<&Path>) -> usize {
    image_files(root, skip.map(Path::to_path_buf)).count()
}

/// Spawns the run on its own thread. Events go out through a bounded
/// channel; once the receiver is dropped the run is cancelled.
pub fn spawn(
    job: BatchJob,
    cancel: CancelFlag,
    events: mpsc::Sender<BatchEvent>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("batch-worker".to_string())
        .spawn(move || {
            let outcome = run(&job, &cancel, |progress| {
                if events
                    .blocking_send(BatchEvent::Progress(progress.clone()))
                    .is_err()
                {
                    debug!("Progress receiver closed, cancelling run");
                    cancel.cancel();
                }
            });

            let event = match outcome {
                Ok(report) => BatchEvent::Finished(report),
                Err(e) => {
                    error!("Run failed: {}", e);
                    BatchEvent::Failed(e.to_string())
                }
            };
            let _ = events.blocking_send(event);
        })
}

fn process_file(job: &BatchJob, source: &Path) -> ProcessResult {
    let relative_dir = source
        .strip_prefix(&job.input)
        .ok()
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty());
    let target_dir = match relative_dir {
        Some(dir) => job.output_root.join(dir),
        None => job.output_root.clone(),
    };

    if let Err(e) = fs::create_dir_all(&target_dir) {
        let error = OptimizeError::filesystem(&target_dir, e);
        warn!("Skipping {}: {}", source.display(), error);
        return ProcessResult::failed(source, &error);
    }

    let output = target_dir.join(output_file_name(source, job.options.force_jpeg));
    let request = OptimizationRequest::new(source, output, job.options);
    ProcessResult::from_outcome(source, optimizer::optimize(&request))
}

fn prepare_output_root(path: &Path) -> Result<(), BatchError> {
    fs::create_dir_all(path).map_err(|source| BatchError::OutputDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Canonical output root when it sits strictly inside the input root.
fn nested_output_root(input: &Path, output: &Path) -> Option<PathBuf> {
    let input = fs::canonicalize(input).ok()?;
    let output = fs::canonicalize(output).ok()?;
    (output != input && output.starts_with(&input)).then_some(output)
}

fn image_files(root: &Path, skip: Option<PathBuf>) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(move |entry| match &skip {
            Some(skip) if entry.depth() > 0 && entry.file_type().is_dir() => {
                fs::canonicalize(entry.path()).map_or(true, |path| &path != skip)
            }
            _ => true,
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.into_path()),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|path| path.is_file() && is_image_file(path))
}

//! Batch image re-encoding: strip metadata, shrink JPEG/PNG/WebP files and
//! mirror folder trees into an output directory.

pub mod batch;
pub mod compression;
pub mod error;
pub mod formats;
pub mod logging;
pub mod optimizer;
pub mod request;
pub mod settings;

pub use batch::{BatchEvent, BatchJob, BatchReport, CancelFlag, ProcessResult, Progress};
pub use error::{BatchError, OptimizeError};
pub use optimizer::{optimize, Optimized};
pub use request::{OptimizationRequest, OptimizeOptions, Quality};

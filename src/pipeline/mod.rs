//! Item and job orchestration around the evaluation engine.

use thiserror::Error;

pub mod item;
pub mod job;

pub use item::ItemProcessor;
pub use job::{ActiveRuns, CancelFlag, JobRunner, JobSummary};

/// Faults that stop a run. Provider errors never appear here; they are
/// absorbed into item state. Storage breakage is the only thing that can
/// fail a job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

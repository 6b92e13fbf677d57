//! Job runner: claims pending items, fans them out to the processor, and
//! keeps the job-level state machine and counters in step.

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::db::Repository;
use crate::domain::{JobCounters, JobId, JobStatus, ProcessStatus};
use crate::pipeline::item::ItemProcessor;
use crate::pipeline::PipelineError;

/// Claim batch size per run.
const CLAIM_LIMIT: i64 = 100_000;

/// Cooperative cancellation: stops claiming new items, lets in-flight
/// items finish so no item record is left half-written.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub processed: usize,
    pub counters: JobCounters,
}

pub struct JobRunner {
    repo: Arc<Repository>,
    processor: Arc<ItemProcessor>,
    concurrency: usize,
}

impl JobRunner {
    pub fn new(repo: Arc<Repository>, processor: Arc<ItemProcessor>, concurrency: usize) -> Self {
        Self {
            repo,
            processor,
            concurrency: concurrency.max(1),
        }
    }

    /// Drive a job's pending items to terminal states.
    ///
    /// Item-level failures stay item-level. The job only FAILs when storage
    /// itself breaks; a cancelled run drops back to PENDING so a later run
    /// can resume the remaining items.
    pub async fn run(
        &self,
        job_id: &JobId,
        cancel: CancelFlag,
    ) -> Result<JobSummary, PipelineError> {
        let job = self
            .repo
            .load_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;

        self.repo
            .update_job_status(job_id, JobStatus::Running)
            .await?;
        info!("job {} running", job_id);

        let pending = self.repo.list_pending_items(job_id, CLAIM_LIMIT).await?;
        let processed = AtomicUsize::new(0);
        let storage_broken = AtomicBool::new(false);

        futures::stream::iter(pending)
            .for_each_concurrent(self.concurrency, |mut item| {
                let job = &job;
                let cancel = &cancel;
                let processed = &processed;
                let storage_broken = &storage_broken;
                async move {
                    if cancel.is_cancelled() || storage_broken.load(Ordering::SeqCst) {
                        return;
                    }

                    match self.repo.claim_item(item.id).await {
                        Ok(true) => {}
                        Ok(false) => return, // another worker took it
                        Err(e) => {
                            error!("claim failed for item {}: {}", item.id, e);
                            storage_broken.store(true, Ordering::SeqCst);
                            return;
                        }
                    }
                    item.process_status = ProcessStatus::Processing;

                    match self.processor.process(job, &mut item).await {
                        Ok(()) => {
                            processed.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            error!("storage fault processing {}: {}", item.asin, e);
                            storage_broken.store(true, Ordering::SeqCst);
                            return;
                        }
                    }

                    // Aggregate recompute, safe under concurrent completions.
                    if let Err(e) = self.repo.update_job_counters(&job.job_id).await {
                        warn!("counter update failed for {}: {}", job.job_id, e);
                    }
                }
            })
            .await;

        let status = if storage_broken.load(Ordering::SeqCst) {
            JobStatus::Failed
        } else if self.repo.count_unfinished_items(job_id).await? == 0 {
            JobStatus::Done
        } else {
            // cancelled mid-run with items left; resumable
            JobStatus::Pending
        };
        self.repo.update_job_status(job_id, status).await?;
        let counters = self.repo.update_job_counters(job_id).await?;

        info!(
            "job {} finished run: status={} processed={}",
            job_id,
            status,
            processed.load(Ordering::SeqCst)
        );

        Ok(JobSummary {
            job_id: job_id.clone(),
            status,
            processed: processed.load(Ordering::SeqCst),
            counters,
        })
    }
}

/// Registry of in-flight runs so the API layer can cancel by job id.
#[derive(Clone, Default)]
pub struct ActiveRuns(Arc<Mutex<HashMap<String, CancelFlag>>>);

impl ActiveRuns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run. Returns None when the job is already running.
    pub fn register(&self, job_id: &JobId) -> Option<CancelFlag> {
        let mut runs = self.0.lock().expect("active runs lock poisoned");
        if runs.contains_key(job_id.as_str()) {
            return None;
        }
        let flag = CancelFlag::new();
        runs.insert(job_id.as_str().to_string(), flag.clone());
        Some(flag)
    }

    /// Request cancellation. Returns false when no run is registered.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let runs = self.0.lock().expect("active runs lock poisoned");
        match runs.get(job_id.as_str()) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, job_id: &JobId) {
        let mut runs = self.0.lock().expect("active runs lock poisoned");
        runs.remove(job_id.as_str());
    }
}

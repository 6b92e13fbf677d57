//! Research job: lifecycle, frozen configuration, rollup counters.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::JobId;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "RUNNING" => Some(JobStatus::Running),
            "DONE" => Some(JobStatus::Done),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point rates and pass thresholds, frozen at job creation.
///
/// Finished jobs must stay reproducible, so this snapshot is read back from
/// the job row and threaded through the pipeline; live defaults are only
/// consulted when the snapshot is first taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub point_rate_normal: Decimal,
    pub point_rate_spu: Decimal,
    pub point_rate_total: Decimal,
    pub threshold_profit_amount: i64,
    pub threshold_profit_rate: Decimal,
    pub threshold_rank: i64,
    pub threshold_sales_30: i64,
}

impl JobConfig {
    /// Snapshot a config from its parts; the total point rate is always
    /// normal + SPU.
    pub fn new(
        point_rate_normal: Decimal,
        point_rate_spu: Decimal,
        threshold_profit_amount: i64,
        threshold_profit_rate: Decimal,
        threshold_rank: i64,
        threshold_sales_30: i64,
    ) -> Self {
        JobConfig {
            point_rate_normal,
            point_rate_spu,
            point_rate_total: point_rate_normal + point_rate_spu,
            threshold_profit_amount,
            threshold_profit_rate,
            threshold_rank,
            threshold_sales_30,
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        JobConfig::new(
            Decimal::new(1, 2),  // 0.01
            Decimal::new(7, 2),  // 0.07
            1000,
            Decimal::new(15, 2), // 0.15
            50_000,
            10,
        )
    }
}

/// Rollup counters derived from item states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub total_count: i64,
    pub success_count: i64,
    pub fail_count: i64,
    pub skip_count: i64,
    pub review_count: i64,
    pub pass_count: i64,
}

/// One research run over a batch of ASINs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchJob {
    pub job_id: JobId,
    pub status: JobStatus,
    pub config: JobConfig,
    pub counters: JobCounters,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResearchJob {
    /// Create a fresh PENDING job with the given frozen config.
    pub fn create(config: JobConfig, total_count: i64) -> Self {
        ResearchJob {
            job_id: JobId::generate(),
            status: JobStatus::Pending,
            config,
            counters: JobCounters {
                total_count,
                ..JobCounters::default()
            },
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

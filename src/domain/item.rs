//! Research item: one ASIN's evaluation state within a job.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::reason::{Reason, Verdict};
use crate::domain::risk::RiskFlags;
use crate::domain::{Asin, JanCode, JobId, ModelNumber};

/// Per-item processing state machine.
///
/// PENDING -> PROCESSING -> SUCCESS | FAILED | SKIPPED. Terminal states are
/// final. A REVIEW verdict still completes as SUCCESS; FAILED is reserved
/// for processing faults, not judgement outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Skipped,
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Success | ProcessStatus::Failed | ProcessStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Pending => "PENDING",
            ProcessStatus::Processing => "PROCESSING",
            ProcessStatus::Success => "SUCCESS",
            ProcessStatus::Failed => "FAILED",
            ProcessStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ProcessStatus::Pending),
            "PROCESSING" => Some(ProcessStatus::Processing),
            "SUCCESS" => Some(ProcessStatus::Success),
            "FAILED" => Some(ProcessStatus::Failed),
            "SKIPPED" => Some(ProcessStatus::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the Rakuten matching step as recorded on the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchOutcome {
    Jan,
    Model,
    Keyword,
    /// Matching ran and found nothing. Not an error.
    None,
    /// Matching did not run or errored out.
    Unknown,
}

impl MatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::Jan => "JAN",
            MatchOutcome::Model => "MODEL",
            MatchOutcome::Keyword => "KEYWORD",
            MatchOutcome::None => "NONE",
            MatchOutcome::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "JAN" => Some(MatchOutcome::Jan),
            "MODEL" => Some(MatchOutcome::Model),
            "KEYWORD" => Some(MatchOutcome::Keyword),
            "NONE" => Some(MatchOutcome::None),
            "UNKNOWN" => Some(MatchOutcome::Unknown),
            _ => None,
        }
    }
}

/// Catalog/descriptive fields, filled from Keepa and backfilled from the
/// SP-API catalog endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFields {
    pub title: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub jan_code: Option<JanCode>,
    pub model_number: Option<ModelNumber>,
}

/// Amazon-side pricing and fees, all integer JPY.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmazonFields {
    pub price_fba_lowest: Option<i64>,
    pub fee_referral: Option<i64>,
    pub fee_fba: Option<i64>,
    pub fee_other: Option<i64>,
    pub fee_total: Option<i64>,
    pub payout: Option<i64>,
}

/// Rakuten-side fields copied from the chosen candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RakutenFields {
    pub match_outcome: Option<MatchOutcome>,
    pub item_name: Option<String>,
    pub shop_name: Option<String>,
    pub item_url: Option<String>,
    pub price: Option<i64>,
    pub shipping: Option<i64>,
    pub shipping_status: Option<crate::domain::ShippingStatus>,
    pub point_amount: Option<i64>,
    pub cost_gross: Option<i64>,
    pub cost_net: Option<i64>,
}

/// Computed profit figures. Populated if and only if processing reached the
/// calculation step with complete inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitFields {
    pub amount: Option<i64>,
    pub rate: Option<Decimal>,
}

/// Sales-rank and estimated-sales figures from Keepa stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingFields {
    pub rank_current: Option<i64>,
    pub rank_avg_30: Option<i64>,
    pub rank_avg_90: Option<i64>,
    pub sales_est_30: Option<i64>,
    pub sales_est_90: Option<i64>,
    pub sales_est_180: Option<i64>,
}

impl RankingFields {
    /// Rank used for judgement: current, falling back to the 30-day
    /// average.
    pub fn effective_rank(&self) -> Option<i64> {
        self.rank_current.or(self.rank_avg_30)
    }
}

/// Competing-seller counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerFields {
    pub seller_count: Option<i64>,
    pub fba_seller_count: Option<i64>,
    pub fba_lowest_seller_count: Option<i64>,
}

/// Seasonality indicators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalityFields {
    pub flag: Option<bool>,
    pub score: Option<Decimal>,
    pub note: Option<String>,
}

/// One ASIN's evaluation within a job. (job, ASIN) is unique.
///
/// Terminal items are immutable except for the user-controlled candidate
/// marker and memo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchItem {
    /// Row id; 0 until persisted.
    pub id: i64,
    pub job_id: JobId,
    pub asin: Asin,
    pub process_status: ProcessStatus,
    pub fail_reason: Option<String>,
    pub catalog: CatalogFields,
    pub amazon: AmazonFields,
    pub rakuten: RakutenFields,
    pub profit: ProfitFields,
    pub ranking: RankingFields,
    pub sellers: SellerFields,
    pub seasonality: SeasonalityFields,
    pub risk: RiskFlags,
    /// Item-level override for the applied point rate; the job's total
    /// rate is used when absent.
    pub point_rate_override: Option<Decimal>,
    pub verdict: Option<Verdict>,
    pub reasons: Vec<Reason>,
    pub is_candidate: bool,
    pub user_memo: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl ResearchItem {
    /// Create a fresh PENDING item for a job.
    pub fn pending(job_id: JobId, asin: Asin) -> Self {
        ResearchItem {
            id: 0,
            job_id,
            asin,
            process_status: ProcessStatus::Pending,
            fail_reason: None,
            catalog: CatalogFields::default(),
            amazon: AmazonFields::default(),
            rakuten: RakutenFields::default(),
            profit: ProfitFields::default(),
            ranking: RankingFields::default(),
            sellers: SellerFields::default(),
            seasonality: SeasonalityFields::default(),
            risk: RiskFlags::new(),
            point_rate_override: None,
            verdict: None,
            reasons: Vec::new(),
            is_candidate: false,
            user_memo: None,
            fetched_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ProcessStatus::Pending.is_terminal());
        assert!(!ProcessStatus::Processing.is_terminal());
        assert!(ProcessStatus::Success.is_terminal());
        assert!(ProcessStatus::Failed.is_terminal());
        assert!(ProcessStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_effective_rank_prefers_current() {
        let ranking = RankingFields {
            rank_current: Some(1200),
            rank_avg_30: Some(3000),
            ..RankingFields::default()
        };
        assert_eq!(ranking.effective_rank(), Some(1200));

        let avg_only = RankingFields {
            rank_avg_30: Some(3000),
            ..RankingFields::default()
        };
        assert_eq!(avg_only.effective_rank(), Some(3000));
        assert_eq!(RankingFields::default().effective_rank(), None);
    }

    #[test]
    fn test_pending_item_is_blank() {
        let item = ResearchItem::pending(JobId::new("job".to_string()), Asin::new("B00EXAMPL1"));
        assert_eq!(item.process_status, ProcessStatus::Pending);
        assert!(item.verdict.is_none());
        assert!(item.reasons.is_empty());
        assert!(item.profit.amount.is_none());
        assert!(!item.is_candidate);
    }
}

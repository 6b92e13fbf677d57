//! First-pass screening on Keepa figures.
//!
//! Runs before any SP-API or Rakuten call. An ASIN that already misses the
//! rank or sales thresholds is finished early without spending the more
//! expensive provider budget. Unknown figures pass through; they are
//! re-checked by the full judgement.

use crate::domain::item::RankingFields;
use crate::domain::{JobConfig, Reason};

/// Check rank and 30-day sales against the job thresholds. Returns the
/// failure reasons when the item should be rejected up front, None when it
/// should continue to the full pipeline.
pub fn screen(ranking: &RankingFields, config: &JobConfig) -> Option<Vec<Reason>> {
    let mut reasons = Vec::new();

    if let Some(rank) = ranking.effective_rank() {
        if rank > config.threshold_rank {
            reasons.push(Reason::RankAbove {
                actual: rank,
                threshold: config.threshold_rank,
            });
        }
    }

    if let Some(sales) = ranking.sales_est_30 {
        if sales < config.threshold_sales_30 {
            reasons.push(Reason::SalesBelow {
                actual: sales,
                threshold: config.threshold_sales_30,
            });
        }
    }

    if reasons.is_empty() {
        None
    } else {
        Some(reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_good_figures_pass() {
        let ranking = RankingFields {
            rank_current: Some(4200),
            sales_est_30: Some(25),
            ..RankingFields::default()
        };
        assert_eq!(screen(&ranking, &JobConfig::default()), None);
    }

    #[test]
    fn test_unknown_figures_pass_through() {
        assert_eq!(screen(&RankingFields::default(), &JobConfig::default()), None);
    }

    #[test]
    fn test_bad_rank_rejects() {
        let ranking = RankingFields {
            rank_current: Some(200_000),
            sales_est_30: Some(25),
            ..RankingFields::default()
        };
        let reasons = screen(&ranking, &JobConfig::default()).expect("should reject");
        assert_eq!(reasons.len(), 1);
        assert!(matches!(reasons[0], Reason::RankAbove { .. }));
    }

    #[test]
    fn test_bad_rank_and_sales_both_recorded() {
        let ranking = RankingFields {
            rank_current: Some(200_000),
            sales_est_30: Some(1),
            ..RankingFields::default()
        };
        let reasons = screen(&ranking, &JobConfig::default()).expect("should reject");
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn test_avg_rank_used_when_current_missing() {
        let ranking = RankingFields {
            rank_avg_30: Some(200_000),
            sales_est_30: Some(25),
            ..RankingFields::default()
        };
        assert!(screen(&ranking, &JobConfig::default()).is_some());
    }
}

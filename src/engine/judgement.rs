//! PASS/FAIL/REVIEW rule evaluation.
//!
//! A pure function over the evaluated item and the job's frozen config:
//! re-running on unchanged inputs produces the identical verdict and
//! reason list. Every triggered rule is recorded, not just the first, so
//! the verdict is fully auditable.

use crate::domain::item::ResearchItem;
use crate::domain::{
    JobConfig, MatchOutcome, PricingGap, Provenance, Reason, Severity, ShippingStatus, Verdict,
};

/// The verdict with its itemized reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub verdict: Verdict,
    pub reasons: Vec<Reason>,
}

/// Evaluate an item against the job thresholds and its risk flags.
pub fn judge(item: &ResearchItem, config: &JobConfig) -> Judgement {
    let mut reasons = Vec::new();

    // 1. Profit figures undefined -> review, with the gaps spelled out.
    let profit_defined = item.profit.amount.is_some() && item.profit.rate.is_some();
    if !profit_defined {
        reasons.push(Reason::InsufficientPricingData {
            gaps: pricing_gaps(item),
        });
    }

    // 2. Risk flags. UNKNOWN provenance never triggers; severity is decided
    // per reason (manual always fails, auto fails only for the hard trio).
    for flag in item.risk.iter() {
        if flag.value == Some(true) && flag.provenance != Provenance::Unknown {
            reasons.push(Reason::RiskFlag {
                kind: flag.kind,
                provenance: flag.provenance,
            });
        }
    }

    // 3. Profit thresholds, only meaningful when profit was computed.
    if let (Some(amount), Some(rate)) = (item.profit.amount, item.profit.rate) {
        if amount < config.threshold_profit_amount {
            reasons.push(Reason::ProfitAmountBelow {
                actual: amount,
                threshold: config.threshold_profit_amount,
            });
        }
        if rate < config.threshold_profit_rate {
            reasons.push(Reason::ProfitRateBelow {
                actual: rate,
                threshold: config.threshold_profit_rate,
            });
        }
    }

    // 4. Demand thresholds.
    match item.ranking.effective_rank() {
        Some(rank) if rank > config.threshold_rank => {
            reasons.push(Reason::RankAbove {
                actual: rank,
                threshold: config.threshold_rank,
            });
        }
        Some(_) => {}
        None => reasons.push(Reason::RankUnknown),
    }
    match item.ranking.sales_est_30 {
        Some(sales) if sales < config.threshold_sales_30 => {
            reasons.push(Reason::SalesBelow {
                actual: sales,
                threshold: config.threshold_sales_30,
            });
        }
        Some(_) => {}
        None => reasons.push(Reason::SalesUnknown),
    }

    // 5. Any hard-fail reason decides FAIL; otherwise any reason at all
    // demotes to REVIEW.
    let verdict = if reasons.iter().any(|r| r.severity() == Severity::Fail) {
        Verdict::Fail
    } else if reasons.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Review
    };

    Judgement { verdict, reasons }
}

fn pricing_gaps(item: &ResearchItem) -> Vec<PricingGap> {
    let mut gaps = Vec::new();

    if item.amazon.price_fba_lowest.is_none() {
        gaps.push(PricingGap::AmazonPriceMissing);
    } else if item.amazon.fee_total.is_none() {
        gaps.push(PricingGap::FeeEstimateMissing);
    }
    if matches!(item.amazon.payout, Some(p) if p <= 0) {
        gaps.push(PricingGap::PayoutNotPositive);
    }

    match item.rakuten.match_outcome {
        Some(MatchOutcome::None) => gaps.push(PricingGap::NoRakutenMatch),
        Some(MatchOutcome::Unknown) | None => gaps.push(PricingGap::MatchNotRun),
        _ => {
            if item.rakuten.shipping_status == Some(ShippingStatus::Unknown) {
                gaps.push(PricingGap::ShippingUnknown);
            }
        }
    }

    gaps
}

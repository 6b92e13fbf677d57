//! Deterministic profit arithmetic.
//!
//! All monetary values are integer JPY. The single rounding step in the
//! whole chain is the point amount, rounded half-up; everything else is
//! exact integer arithmetic. The profit rate is quantized to four decimal
//! places at the end.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::{JobConfig, RakutenCandidate};

/// Loyalty points earned on a purchase, in JPY equivalent: price times the
/// applied rate, rounded half-up.
pub fn point_amount(price: i64, rate: Decimal) -> i64 {
    (Decimal::from(price) * rate)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// The point rate applied to an item: its own override when present, the
/// job's combined rate otherwise.
pub fn point_rate_used(config: &JobConfig, item_override: Option<Decimal>) -> Decimal {
    item_override.unwrap_or(config.point_rate_total)
}

/// Purchase-side cost of the chosen candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostBreakdown {
    /// Price plus known shipping.
    pub gross: i64,
    /// Point discount already computed for the candidate.
    pub point: i64,
    /// Gross minus points.
    pub net: i64,
}

/// Cost of sourcing the candidate. None when shipping is UNKNOWN: an
/// unstated shipping cost is never assumed to be zero, so the gross cost is
/// indeterminate and profit cannot be computed.
pub fn rakuten_cost(candidate: &RakutenCandidate) -> Option<CostBreakdown> {
    let gross = candidate.total_cost()?;
    Some(CostBreakdown {
        gross,
        point: candidate.point_amount,
        net: gross - candidate.point_amount,
    })
}

/// Sale-side and bottom-line figures. Any missing input leaves the
/// dependent figures None; the judgement engine turns that into REVIEW.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfitFigures {
    pub payout: Option<i64>,
    pub fee_total: Option<i64>,
    pub amount: Option<i64>,
    pub rate: Option<Decimal>,
}

/// Compute payout, profit amount and profit rate.
///
/// payout = lowest FBA price - total fees; profit = payout - net sourcing
/// cost; rate = profit / payout, undefined when payout is not positive.
pub fn compute_profit(
    amazon_price_fba_lowest: Option<i64>,
    fee_total: Option<i64>,
    cost: Option<CostBreakdown>,
) -> ProfitFigures {
    let mut out = ProfitFigures {
        fee_total,
        ..ProfitFigures::default()
    };

    let (Some(price), Some(fees)) = (amazon_price_fba_lowest, fee_total) else {
        return out;
    };
    out.payout = Some(price - fees);

    let Some(cost) = cost else {
        return out;
    };
    let payout = price - fees;
    out.amount = Some(payout - cost.net);

    if payout > 0 {
        let rate = Decimal::from(payout - cost.net) / Decimal::from(payout);
        out.rate = Some(rate.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero));
    }

    out
}

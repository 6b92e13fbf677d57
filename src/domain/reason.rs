//! Judgement verdicts and the itemized reasons behind them.

use crate::domain::risk::{Provenance, RiskKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Final classification of an evaluated item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    Review,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Review => "REVIEW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PASS" => Some(Verdict::Pass),
            "FAIL" => Some(Verdict::Fail),
            "REVIEW" => Some(Verdict::Review),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How strongly a reason counts against the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fail,
    Review,
}

/// Which pricing input was missing when profit could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingGap {
    AmazonPriceMissing,
    FeeEstimateMissing,
    PayoutNotPositive,
    NoRakutenMatch,
    MatchNotRun,
    ShippingUnknown,
}

impl PricingGap {
    fn describe(&self) -> &'static str {
        match self {
            PricingGap::AmazonPriceMissing => "no FBA price on the Amazon side",
            PricingGap::FeeEstimateMissing => "no Amazon fee estimate",
            PricingGap::PayoutNotPositive => "Amazon payout is not positive",
            PricingGap::NoRakutenMatch => "no Rakuten match found",
            PricingGap::MatchNotRun => "Rakuten matching did not run",
            PricingGap::ShippingUnknown => "Rakuten shipping cost unknown",
        }
    }
}

/// One itemized judgement reason. The full list is recorded, not just the
/// first hit, so every verdict is auditable after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Reason {
    InsufficientPricingData { gaps: Vec<PricingGap> },
    RiskFlag { kind: RiskKind, provenance: Provenance },
    ProfitAmountBelow { actual: i64, threshold: i64 },
    ProfitRateBelow { actual: Decimal, threshold: Decimal },
    RankAbove { actual: i64, threshold: i64 },
    RankUnknown,
    SalesBelow { actual: i64, threshold: i64 },
    SalesUnknown,
}

impl Reason {
    pub fn severity(&self) -> Severity {
        match self {
            Reason::InsufficientPricingData { .. } => Severity::Review,
            Reason::RiskFlag { kind, provenance } => match provenance {
                Provenance::Manual => Severity::Fail,
                Provenance::Auto if kind.hard_fails_on_auto() => Severity::Fail,
                _ => Severity::Review,
            },
            Reason::ProfitAmountBelow { .. }
            | Reason::ProfitRateBelow { .. }
            | Reason::RankAbove { .. }
            | Reason::SalesBelow { .. } => Severity::Fail,
            Reason::RankUnknown | Reason::SalesUnknown => Severity::Review,
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reason::InsufficientPricingData { gaps } => {
                write!(f, "insufficient pricing data")?;
                for (i, gap) in gaps.iter().enumerate() {
                    let sep = if i == 0 { ": " } else { ", " };
                    write!(f, "{}{}", sep, gap.describe())?;
                }
                Ok(())
            }
            Reason::RiskFlag { kind, provenance } => {
                let who = match provenance {
                    Provenance::Auto => "auto-detected",
                    Provenance::Manual => "manually confirmed",
                    Provenance::Unknown => "unverified",
                };
                write!(f, "risk flag {} ({})", kind, who)
            }
            Reason::ProfitAmountBelow { actual, threshold } => {
                write!(f, "profit amount {} JPY < {} JPY", actual, threshold)
            }
            Reason::ProfitRateBelow { actual, threshold } => {
                write!(f, "profit rate {} < {}", actual, threshold)
            }
            Reason::RankAbove { actual, threshold } => {
                write!(f, "sales rank {} > {}", actual, threshold)
            }
            Reason::RankUnknown => write!(f, "sales rank unknown"),
            Reason::SalesBelow { actual, threshold } => {
                write!(f, "30-day sales {} < {}", actual, threshold)
            }
            Reason::SalesUnknown => write!(f, "30-day sales unknown"),
        }
    }
}

//! Rakuten supply candidates discovered during matching.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Asin, JobId};

/// How a candidate was matched to the ASIN. JAN is the strongest signal,
/// keyword the weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchType {
    Jan,
    Model,
    Keyword,
}

impl MatchType {
    /// Lower is more trustworthy; selection never crosses priority levels.
    pub fn priority(&self) -> u8 {
        match self {
            MatchType::Jan => 0,
            MatchType::Model => 1,
            MatchType::Keyword => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Jan => "JAN",
            MatchType::Model => "MODEL",
            MatchType::Keyword => "KEYWORD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "JAN" => Some(MatchType::Jan),
            "MODEL" => Some(MatchType::Model),
            "KEYWORD" => Some(MatchType::Keyword),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shipping-cost certainty for a listing.
///
/// UNKNOWN means the listing did not state a cost; it is never assumed to
/// be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShippingStatus {
    Free,
    Paid,
    Unknown,
}

impl ShippingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingStatus::Free => "FREE",
            ShippingStatus::Paid => "PAID",
            ShippingStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FREE" => Some(ShippingStatus::Free),
            "PAID" => Some(ShippingStatus::Paid),
            "UNKNOWN" => Some(ShippingStatus::Unknown),
            _ => None,
        }
    }
}

/// One Rakuten offer considered for sourcing an ASIN.
///
/// Created by the matcher and immutable afterward, except for the chosen
/// flag which marks the single selected candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RakutenCandidate {
    pub job_id: JobId,
    pub asin: Asin,
    pub match_type: MatchType,
    pub match_value: Option<String>,
    pub item_code: Option<String>,
    pub item_name: Option<String>,
    pub item_url: Option<String>,
    pub shop_code: Option<String>,
    pub shop_name: Option<String>,
    /// Listing price in JPY.
    pub price: i64,
    /// Stated shipping cost in JPY; None when FREE or UNKNOWN.
    pub shipping: Option<i64>,
    pub shipping_status: ShippingStatus,
    /// Base point rate of the listing, when the listing advertises one.
    pub point_rate: Option<Decimal>,
    /// Rate actually applied when computing the point amount.
    pub point_rate_used: Decimal,
    /// Loyalty points earned, in JPY equivalent.
    pub point_amount: i64,
    pub is_chosen: bool,
}

impl RakutenCandidate {
    /// Price plus shipping, when shipping is known. UNKNOWN shipping makes
    /// the total indeterminate.
    pub fn total_cost(&self) -> Option<i64> {
        match self.shipping_status {
            ShippingStatus::Free => Some(self.price),
            ShippingStatus::Paid => Some(self.price + self.shipping.unwrap_or(0)),
            ShippingStatus::Unknown => None,
        }
    }

    /// Total cost minus the point discount, when the total is known.
    pub fn net_cost(&self) -> Option<i64> {
        self.total_cost().map(|total| total - self.point_amount)
    }

    /// Ranking figure used when comparing candidates with unknown shipping:
    /// the known part of the cost minus points. A lower bound, not a cost.
    pub fn net_cost_floor(&self) -> i64 {
        self.total_cost().unwrap_or(self.price) - self.point_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(price: i64, shipping: Option<i64>, status: ShippingStatus) -> RakutenCandidate {
        RakutenCandidate {
            job_id: JobId::new("job".to_string()),
            asin: Asin::new("B00EXAMPL1"),
            match_type: MatchType::Jan,
            match_value: Some("4902370536485".to_string()),
            item_code: None,
            item_name: None,
            item_url: None,
            shop_code: None,
            shop_name: None,
            price,
            shipping,
            shipping_status: status,
            point_rate: None,
            point_rate_used: Decimal::new(8, 2),
            point_amount: 96,
            is_chosen: false,
        }
    }

    #[test]
    fn test_total_cost_free_shipping() {
        let c = candidate(1200, None, ShippingStatus::Free);
        assert_eq!(c.total_cost(), Some(1200));
        assert_eq!(c.net_cost(), Some(1104));
    }

    #[test]
    fn test_total_cost_paid_shipping() {
        let c = candidate(1200, Some(500), ShippingStatus::Paid);
        assert_eq!(c.total_cost(), Some(1700));
        assert_eq!(c.net_cost(), Some(1604));
    }

    #[test]
    fn test_unknown_shipping_has_no_total() {
        let c = candidate(1200, None, ShippingStatus::Unknown);
        assert_eq!(c.total_cost(), None);
        assert_eq!(c.net_cost(), None);
        assert_eq!(c.net_cost_floor(), 1104);
    }

    #[test]
    fn test_match_type_priority_order() {
        assert!(MatchType::Jan.priority() < MatchType::Model.priority());
        assert!(MatchType::Model.priority() < MatchType::Keyword.priority());
    }
}

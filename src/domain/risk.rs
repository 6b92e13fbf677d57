//! Risk flags and their provenance.
//!
//! Each ASIN carries a fixed set of independent risk flags. A flag has a
//! tri-state value (unknown / true / false) and a provenance recording who
//! set it, so the judgement engine can weigh an automated detection
//! differently from a human confirmation.

use serde::{Deserialize, Serialize};

/// The closed set of tracked risk kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    Hazardous,
    Oversized,
    Fragile,
    HighReturn,
    MakerRestriction,
    AuthenticityRisk,
    ListingRestriction,
    Seasonal,
}

impl RiskKind {
    pub const ALL: [RiskKind; 8] = [
        RiskKind::Hazardous,
        RiskKind::Oversized,
        RiskKind::Fragile,
        RiskKind::HighReturn,
        RiskKind::MakerRestriction,
        RiskKind::AuthenticityRisk,
        RiskKind::ListingRestriction,
        RiskKind::Seasonal,
    ];

    /// Kinds that hard-fail even on automated detection. The remaining
    /// kinds only demote to REVIEW until a human confirms them.
    pub fn hard_fails_on_auto(&self) -> bool {
        matches!(
            self,
            RiskKind::Hazardous | RiskKind::ListingRestriction | RiskKind::AuthenticityRisk
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskKind::Hazardous => "hazardous",
            RiskKind::Oversized => "oversized",
            RiskKind::Fragile => "fragile",
            RiskKind::HighReturn => "high_return",
            RiskKind::MakerRestriction => "maker_restriction",
            RiskKind::AuthenticityRisk => "authenticity_risk",
            RiskKind::ListingRestriction => "listing_restriction",
            RiskKind::Seasonal => "seasonal",
        }
    }
}

impl std::fmt::Display for RiskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who set a flag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provenance {
    Auto,
    Manual,
    Unknown,
}

/// One flag observation: kind, value, provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFlag {
    pub kind: RiskKind,
    pub value: Option<bool>,
    pub provenance: Provenance,
}

impl RiskFlag {
    fn unset(kind: RiskKind) -> Self {
        RiskFlag {
            kind,
            value: None,
            provenance: Provenance::Unknown,
        }
    }
}

/// The full flag set for one item, one slot per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFlags([RiskFlag; 8]);

impl RiskFlags {
    pub fn new() -> Self {
        RiskFlags(RiskKind::ALL.map(RiskFlag::unset))
    }

    pub fn get(&self, kind: RiskKind) -> &RiskFlag {
        &self.0[Self::slot(kind)]
    }

    /// Record an observation. A MANUAL value is authoritative: an AUTO
    /// observation never overwrites a flag a human has already set.
    pub fn record(&mut self, kind: RiskKind, value: bool, provenance: Provenance) {
        let flag = &mut self.0[Self::slot(kind)];
        if flag.provenance == Provenance::Manual && provenance == Provenance::Auto {
            return;
        }
        flag.value = Some(value);
        flag.provenance = provenance;
    }

    pub fn iter(&self) -> impl Iterator<Item = &RiskFlag> {
        self.0.iter()
    }

    fn slot(kind: RiskKind) -> usize {
        RiskKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default()
    }
}

impl Default for RiskFlags {
    fn default() -> Self {
        Self::new()
    }
}

//! Core domain types for the research pipeline.

pub mod candidate;
pub mod item;
pub mod job;
pub mod primitives;
pub mod reason;
pub mod risk;
pub mod timeseries;

pub use candidate::{MatchType, RakutenCandidate, ShippingStatus};
pub use item::{MatchOutcome, ProcessStatus, ResearchItem};
pub use job::{JobConfig, JobCounters, JobStatus, ResearchJob};
pub use primitives::{normalize_model, Asin, JanCode, JobId, ModelNumber};
pub use reason::{PricingGap, Reason, Severity, Verdict};
pub use risk::{Provenance, RiskFlag, RiskFlags, RiskKind};
pub use timeseries::{Metric, TimeseriesPoint, TsSource};

//! Evaluation engine: matching, profit arithmetic, screening, judgement.

pub mod calculator;
pub mod judgement;
pub mod matching;
pub mod screening;

pub use calculator::{compute_profit, point_amount, point_rate_used, CostBreakdown, ProfitFigures};
pub use judgement::{judge, Judgement};
pub use matching::{MatchRequest, MatchResult, Matcher};
pub use screening::screen;

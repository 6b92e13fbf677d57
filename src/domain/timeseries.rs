//! Dated observations of volatile per-ASIN metrics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Asin, JobId};

/// Which metric a timeseries point observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Metric {
    Price,
    Rank,
    SellerCount,
    FbaSellerCount,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Price => "PRICE",
            Metric::Rank => "RANK",
            Metric::SellerCount => "SELLER_COUNT",
            Metric::FbaSellerCount => "FBA_SELLER_COUNT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRICE" => Some(Metric::Price),
            "RANK" => Some(Metric::Rank),
            "SELLER_COUNT" => Some(Metric::SellerCount),
            "FBA_SELLER_COUNT" => Some(Metric::FbaSellerCount),
            _ => None,
        }
    }
}

/// Where an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TsSource {
    Keepa,
    SpApi,
    Manual,
}

impl TsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TsSource::Keepa => "KEEPA",
            TsSource::SpApi => "SP_API",
            TsSource::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "KEEPA" => Some(TsSource::Keepa),
            "SP_API" => Some(TsSource::SpApi),
            "MANUAL" => Some(TsSource::Manual),
            _ => None,
        }
    }
}

/// One observation. Append-only; unique per (job, asin, metric, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub job_id: JobId,
    pub asin: Asin,
    pub metric: Metric,
    pub recorded_date: NaiveDate,
    pub value: i64,
    pub source: TsSource,
}

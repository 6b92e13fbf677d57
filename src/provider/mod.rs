//! Provider gateways: cached, rate-paced access to the upstream data
//! sources (Keepa, Amazon SP-API, Rakuten Ichiba).
//!
//! Every gateway call consults the shared [`crate::cache::ApiCache`] first
//! and stores the raw validated response on a miss. Errors are surfaced in
//! one uniform shape; rate limiting is propagated to the caller rather than
//! retried indefinitely inside the adapter.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::Asin;

pub mod keepa;
pub mod mock;
pub mod pacing;
pub mod rakuten;
pub mod sp_api;

pub use keepa::KeepaHttpGateway;
pub use mock::{MockAmazonGateway, MockKeepaGateway, MockRakutenGateway};
pub use pacing::RequestPacer;
pub use rakuten::RakutenHttpGateway;
pub use sp_api::SpApiHttpGateway;

/// Upstream requests never wait longer than this; a slow provider surfaces
/// as an Upstream error instead of blocking the item pipeline.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

/// Uniform error shape for all provider calls.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The ASIN/product is not known upstream. Terminal, never retried.
    #[error("not found")]
    NotFound,
    /// The provider refused the request rate. Propagated so the caller can
    /// back off; bounded retries already happened inside the adapter.
    #[error("rate limited")]
    RateLimited,
    /// Transient upstream failure (network, 5xx, malformed response).
    #[error("provider error: {0}")]
    Upstream(String),
}

/// One dated value from a provider-side history series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub value: i64,
}

/// Parsed Keepa product snapshot: catalog data, rank/sales statistics and
/// decoded history series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeepaProduct {
    pub title: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub jan_code: Option<String>,
    pub model_number: Option<String>,
    pub rank_current: Option<i64>,
    pub rank_avg_30: Option<i64>,
    pub rank_avg_90: Option<i64>,
    pub sales_est_30: Option<i64>,
    pub sales_est_90: Option<i64>,
    pub sales_est_180: Option<i64>,
    pub seller_count: Option<i64>,
    pub fba_seller_count: Option<i64>,
    pub price_history: Vec<HistoryPoint>,
    pub rank_history: Vec<HistoryPoint>,
}

/// Offer summary from the SP-API pricing endpoint. Prices are integer JPY.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferSummary {
    pub fba_lowest_price: Option<i64>,
    pub new_lowest_price: Option<i64>,
    pub seller_count: i64,
    pub fba_seller_count: i64,
}

/// Fee estimate from the SP-API fees endpoint, integer JPY.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeEstimate {
    pub referral_fee: i64,
    pub fba_fee: i64,
    pub other_fee: i64,
    pub total_fee: i64,
}

/// Catalog attributes used to backfill JAN codes and model numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogInfo {
    pub title: Option<String>,
    pub brand: Option<String>,
    pub model_number: Option<String>,
    pub part_number: Option<String>,
    pub ean: Option<String>,
    pub upc: Option<String>,
}

/// Listing-restriction check result. `has_restriction` is None when the
/// check itself could not determine an answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestrictionInfo {
    pub has_restriction: Option<bool>,
    pub reason: Option<String>,
}

/// One raw Rakuten Ichiba search hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RakutenOffer {
    pub item_code: Option<String>,
    pub item_name: Option<String>,
    pub item_url: Option<String>,
    pub shop_code: Option<String>,
    pub shop_name: Option<String>,
    /// Listing price in JPY.
    pub price: i64,
    /// True when the listing states shipping is included in the price.
    pub postage_included: bool,
    /// Explicit shipping cost in JPY when the source states one. The
    /// Ichiba search API does not, so this is usually None.
    pub shipping_cost: Option<i64>,
}

/// Keepa product data, one call per ASIN.
#[async_trait]
pub trait KeepaGateway: Send + Sync {
    async fn product(&self, asin: &Asin) -> Result<KeepaProduct, ProviderError>;
}

/// Amazon SP-API: pricing, fees, catalog and restriction lookups.
#[async_trait]
pub trait AmazonGateway: Send + Sync {
    async fn item_offers(&self, asin: &Asin) -> Result<OfferSummary, ProviderError>;
    async fn fees_estimate(&self, asin: &Asin, price: i64) -> Result<FeeEstimate, ProviderError>;
    async fn catalog_item(&self, asin: &Asin) -> Result<CatalogInfo, ProviderError>;
    async fn listing_restrictions(&self, asin: &Asin) -> Result<RestrictionInfo, ProviderError>;
}

/// Rakuten Ichiba item search by arbitrary keyword (JAN, model number or
/// title fragment).
#[async_trait]
pub trait RakutenGateway: Send + Sync {
    async fn search_items(&self, keyword: &str) -> Result<Vec<RakutenOffer>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        assert_eq!(ProviderError::NotFound.to_string(), "not found");
        assert_eq!(ProviderError::RateLimited.to_string(), "rate limited");
        assert_eq!(
            ProviderError::Upstream("connection reset".to_string()).to_string(),
            "provider error: connection reset"
        );
    }
}

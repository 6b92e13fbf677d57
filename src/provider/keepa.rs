//! Keepa API gateway.
//!
//! Uses the product request (basic info + stats) only; offer pages cost
//! extra tokens and everything the pipeline needs is in the stats block.

use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{Duration as ChronoDuration, NaiveDate};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::cache::{ApiCache, ApiType, CacheKey};
use crate::domain::Asin;
use crate::provider::pacing::RequestPacer;
use crate::provider::{HistoryPoint, KeepaGateway, KeepaProduct, ProviderError};

/// Keepa domain code for amazon.co.jp.
const KEEPA_DOMAIN_JP: u8 = 5;
/// Stats window requested, in days.
const KEEPA_STATS_DAYS: u16 = 180;

// Keepa csv array indices.
const CSV_SALES_RANK: usize = 3;
const CSV_NEW_FBA: usize = 10;
const CSV_COUNT_NEW: usize = 11;
const CSV_COUNT_NEW_FBA: usize = 18;

/// Keepa timestamps are minutes since 2011-01-01.
fn keepa_minutes_to_date(minutes: i64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(2011, 1, 1)?;
    epoch.checked_add_signed(ChronoDuration::minutes(minutes))
}

pub struct KeepaHttpGateway {
    client: Client,
    base_url: String,
    api_key: String,
    cache: ApiCache,
    ttl: ChronoDuration,
    pacer: RequestPacer,
}

impl KeepaHttpGateway {
    pub fn new(
        base_url: String,
        api_key: String,
        cache: ApiCache,
        ttl: ChronoDuration,
        rate_limit_rps: f64,
    ) -> Self {
        Self {
            client: super::http_client(),
            base_url,
            api_key,
            cache,
            ttl,
            pacer: RequestPacer::from_rps(rate_limit_rps),
        }
    }

    async fn fetch_product_raw(&self, asin: &Asin) -> Result<serde_json::Value, ProviderError> {
        self.pacer.pace().await;

        let url = format!("{}/product", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let body = retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("key", self.api_key.as_str()),
                    ("domain", &KEEPA_DOMAIN_JP.to_string()),
                    ("asin", asin.as_str()),
                    ("stats", &KEEPA_STATS_DAYS.to_string()),
                ])
                .send()
                .await
                .map_err(|e| backoff::Error::transient(ProviderError::Upstream(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(ProviderError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(ProviderError::Upstream(format!(
                    "keepa http {}",
                    status
                ))));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ProviderError::Upstream(format!(
                    "keepa http {}",
                    status
                ))));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(ProviderError::Upstream(e.to_string())))
        })
        .await?;

        if let Some(tokens) = body.get("tokensLeft").and_then(|v| v.as_i64()) {
            debug!("keepa tokens left: {}", tokens);
        }

        let product = body
            .get("products")
            .and_then(|p| p.as_array())
            .and_then(|arr| arr.first())
            .cloned();

        product.ok_or(ProviderError::NotFound)
    }
}

#[async_trait]
impl KeepaGateway for KeepaHttpGateway {
    async fn product(&self, asin: &Asin) -> Result<KeepaProduct, ProviderError> {
        let key = CacheKey::new(
            ApiType::KeepaProduct,
            &[
                ("asin", asin.as_str()),
                ("domain", "5"),
                ("stats", "180"),
            ],
        );

        match self.cache.get(&key).await {
            Ok(Some(raw)) => return Ok(parse_product(&raw)),
            Ok(None) => {}
            Err(e) => warn!("keepa cache read failed, fetching: {}", e),
        }

        let raw = self.fetch_product_raw(asin).await?;
        if let Err(e) = self.cache.put(&key, &raw, self.ttl).await {
            warn!("keepa cache write failed: {}", e);
        }
        Ok(parse_product(&raw))
    }
}

/// Parse a raw Keepa product object into the fields the pipeline uses.
/// Keepa encodes "no value" as -1 or 0 throughout; those read as None.
pub fn parse_product(product: &serde_json::Value) -> KeepaProduct {
    let mut out = KeepaProduct {
        title: product
            .get("title")
            .and_then(|v| v.as_str())
            .map(String::from),
        brand: product
            .get("brand")
            .and_then(|v| v.as_str())
            .map(String::from),
        ..KeepaProduct::default()
    };

    // Deepest category node is the most specific.
    out.category = product
        .get("categoryTree")
        .and_then(|v| v.as_array())
        .and_then(|tree| tree.last())
        .and_then(|node| node.get("name"))
        .and_then(|v| v.as_str())
        .map(String::from);

    out.jan_code = product
        .get("eanList")
        .and_then(|v| v.as_array())
        .and_then(|list| list.first())
        .and_then(|v| v.as_str())
        .map(String::from);

    out.model_number = product
        .get("model")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .or_else(|| product.get("partNumber").and_then(|v| v.as_str()))
        .map(String::from);

    if let Some(stats) = product.get("stats") {
        parse_stats(stats, &mut out);
    }

    if let Some(csv) = product.get("csv").and_then(|v| v.as_array()) {
        if let Some(prices) = csv.get(CSV_NEW_FBA).and_then(|v| v.as_array()) {
            out.price_history = parse_history(prices);
        }
        if let Some(ranks) = csv.get(CSV_SALES_RANK).and_then(|v| v.as_array()) {
            out.rank_history = parse_history(ranks);
        }
    }

    out
}

fn parse_stats(stats: &serde_json::Value, out: &mut KeepaProduct) {
    let positive = |v: Option<i64>| v.filter(|n| *n > 0);

    let current = stats.get("current").and_then(|v| v.as_array());
    if let Some(current) = current {
        out.rank_current = positive(current.get(CSV_SALES_RANK).and_then(|v| v.as_i64()));
        out.seller_count = positive(current.get(CSV_COUNT_NEW).and_then(|v| v.as_i64()));
        out.fba_seller_count = positive(current.get(CSV_COUNT_NEW_FBA).and_then(|v| v.as_i64()));
    }

    // avg[0] = 30 days, avg[1] = 90 days.
    if let Some(avg) = stats.get("avg").and_then(|v| v.as_array()) {
        let period_rank = |idx: usize| {
            avg.get(idx)
                .and_then(|p| p.as_array())
                .and_then(|p| p.get(CSV_SALES_RANK))
                .and_then(|v| v.as_i64())
                .filter(|n| *n > 0)
        };
        out.rank_avg_30 = period_rank(0);
        out.rank_avg_90 = period_rank(1);
    }

    // Sales estimates come from the rank-drop counters.
    out.sales_est_30 = positive(stats.get("salesRankDrops30").and_then(|v| v.as_i64()));
    out.sales_est_90 = positive(stats.get("salesRankDrops90").and_then(|v| v.as_i64()));
    out.sales_est_180 = positive(stats.get("salesRankDrops180").and_then(|v| v.as_i64()));
}

/// Decode a Keepa history series: a flat [time, value, time, value, ...]
/// array, value -1 meaning "no data at this point".
fn parse_history(data: &[serde_json::Value]) -> Vec<HistoryPoint> {
    let mut points = Vec::new();
    for pair in data.chunks_exact(2) {
        let (Some(minutes), Some(value)) = (pair[0].as_i64(), pair[1].as_i64()) else {
            continue;
        };
        if value == -1 {
            continue;
        }
        if let Some(date) = keepa_minutes_to_date(minutes) {
            points.push(HistoryPoint { date, value });
        }
    }
    points
}

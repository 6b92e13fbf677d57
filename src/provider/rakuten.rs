//! Rakuten Ichiba item search gateway.

use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::Duration as ChronoDuration;
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

use async_trait::async_trait;

use crate::cache::{ApiCache, ApiType, CacheKey};
use crate::provider::pacing::RequestPacer;
use crate::provider::{ProviderError, RakutenGateway, RakutenOffer};

/// Ichiba search endpoint version path.
const ICHIBA_SEARCH_PATH: &str = "/services/api/IchibaItem/Search/20220601";
/// Maximum hits per search; the API caps at 30.
const SEARCH_HITS: u8 = 30;

pub struct RakutenHttpGateway {
    client: Client,
    base_url: String,
    application_id: String,
    cache: ApiCache,
    ttl: ChronoDuration,
    pacer: RequestPacer,
}

impl RakutenHttpGateway {
    pub fn new(
        base_url: String,
        application_id: String,
        cache: ApiCache,
        ttl: ChronoDuration,
        rate_limit_rps: f64,
    ) -> Self {
        Self {
            client: super::http_client(),
            base_url,
            application_id,
            cache,
            ttl,
            pacer: RequestPacer::from_rps(rate_limit_rps),
        }
    }

    async fn fetch_raw(&self, keyword: &str) -> Result<serde_json::Value, ProviderError> {
        self.pacer.pace().await;

        let url = format!("{}{}", self.base_url, ICHIBA_SEARCH_PATH);
        let hits = SEARCH_HITS.to_string();
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("applicationId", self.application_id.as_str()),
                    ("format", "json"),
                    ("keyword", keyword),
                    ("hits", hits.as_str()),
                    // Cheapest first; selection re-sorts by net cost anyway.
                    ("sort", "+itemPrice"),
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
                    "rakuten http {}",
                    status
                ))));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ProviderError::Upstream(format!(
                    "rakuten http {}",
                    status
                ))));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(ProviderError::Upstream(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl RakutenGateway for RakutenHttpGateway {
    async fn search_items(&self, keyword: &str) -> Result<Vec<RakutenOffer>, ProviderError> {
        let key = CacheKey::new(ApiType::RakutenSearch, &[("keyword", keyword)]);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => return Ok(parse_search(&raw)),
            Ok(None) => {}
            Err(e) => warn!("rakuten cache read failed, fetching: {}", e),
        }

        let raw = self.fetch_raw(keyword).await?;
        if let Err(e) = self.cache.put(&key, &raw, self.ttl).await {
            warn!("rakuten cache write failed: {}", e);
        }
        Ok(parse_search(&raw))
    }
}

/// Parse an Ichiba search response. `postageFlag` 0 means shipping is
/// included in the price; 1 means it is charged separately (amount not
/// exposed by the API).
pub fn parse_search(body: &serde_json::Value) -> Vec<RakutenOffer> {
    let Some(items) = body.get("Items").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|entry| entry.get("Item"))
        .filter_map(|item| {
            let price = item.get("itemPrice").and_then(|v| v.as_i64())?;
            let text = |name: &str| {
                item.get(name)
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            };
            Some(RakutenOffer {
                item_code: text("itemCode"),
                item_name: text("itemName"),
                item_url: text("itemUrl"),
                shop_code: text("shopCode"),
                shop_name: text("shopName"),
                price,
                postage_included: item.get("postageFlag").and_then(|v| v.as_i64()) == Some(0),
                shipping_cost: None,
            })
        })
        .collect()
}

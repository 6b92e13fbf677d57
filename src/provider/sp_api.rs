//! Amazon SP-API gateway: pricing, fees, catalog, listing restrictions.
//!
//! Auth is a pre-issued LWA access token injected via config; token refresh
//! is owned by the deployment, not this crate.

use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::Duration as ChronoDuration;
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

use async_trait::async_trait;

use crate::cache::{ApiCache, ApiType, CacheKey};
use crate::domain::Asin;
use crate::provider::pacing::RequestPacer;
use crate::provider::{
    AmazonGateway, CatalogInfo, FeeEstimate, OfferSummary, ProviderError, RestrictionInfo,
};

pub struct SpApiHttpGateway {
    client: Client,
    base_url: String,
    access_token: String,
    marketplace_id: String,
    seller_id: String,
    cache: ApiCache,
    ttl: ChronoDuration,
    pacer: RequestPacer,
}

impl SpApiHttpGateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_url: String,
        access_token: String,
        marketplace_id: String,
        seller_id: String,
        cache: ApiCache,
        ttl: ChronoDuration,
        rate_limit_rps: f64,
    ) -> Self {
        Self {
            client: super::http_client(),
            base_url,
            access_token,
            marketplace_id,
            seller_id,
            cache,
            ttl,
            pacer: RequestPacer::from_rps(rate_limit_rps),
        }
    }

    async fn request_json<F>(&self, make: F) -> Result<serde_json::Value, ProviderError>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        self.pacer.pace().await;

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = make()
                .header("x-amz-access-token", &self.access_token)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(ProviderError::Upstream(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(ProviderError::RateLimited));
            }
            if status == 404 {
                return Err(backoff::Error::permanent(ProviderError::NotFound));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(ProviderError::Upstream(format!(
                    "sp-api http {}",
                    status
                ))));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ProviderError::Upstream(format!(
                    "sp-api http {}",
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

    async fn cached(
        &self,
        key: &CacheKey,
    ) -> Option<serde_json::Value> {
        match self.cache.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("sp-api cache read failed, fetching: {}", e);
                None
            }
        }
    }

    async fn store(&self, key: &CacheKey, raw: &serde_json::Value) {
        if let Err(e) = self.cache.put(key, raw, self.ttl).await {
            warn!("sp-api cache write failed: {}", e);
        }
    }
}

#[async_trait]
impl AmazonGateway for SpApiHttpGateway {
    async fn item_offers(&self, asin: &Asin) -> Result<OfferSummary, ProviderError> {
        let key = CacheKey::new(ApiType::SpApiPricing, &[("asin", asin.as_str())]);
        if let Some(raw) = self.cached(&key).await {
            return Ok(parse_offers(&raw));
        }

        let url = format!(
            "{}/products/pricing/v0/items/{}/offers",
            self.base_url,
            asin.as_str()
        );
        let marketplace = self.marketplace_id.clone();
        let raw = self
            .request_json(|| {
                self.client.get(&url).query(&[
                    ("MarketplaceId", marketplace.as_str()),
                    ("ItemCondition", "New"),
                ])
            })
            .await?;

        self.store(&key, &raw).await;
        Ok(parse_offers(&raw))
    }

    async fn fees_estimate(&self, asin: &Asin, price: i64) -> Result<FeeEstimate, ProviderError> {
        let price_str = price.to_string();
        let key = CacheKey::new(
            ApiType::SpApiFees,
            &[("asin", asin.as_str()), ("price", &price_str)],
        );
        if let Some(raw) = self.cached(&key).await {
            return Ok(parse_fees(&raw));
        }

        let url = format!(
            "{}/products/fees/v0/items/{}/feesEstimate",
            self.base_url,
            asin.as_str()
        );
        let body = serde_json::json!({
            "FeesEstimateRequest": {
                "MarketplaceId": self.marketplace_id,
                "IsAmazonFulfilled": true,
                "PriceToEstimateFees": {
                    "ListingPrice": { "CurrencyCode": "JPY", "Amount": price }
                },
                "Identifier": asin.as_str(),
            }
        });
        let raw = self
            .request_json(|| self.client.post(&url).json(&body))
            .await?;

        self.store(&key, &raw).await;
        Ok(parse_fees(&raw))
    }

    async fn catalog_item(&self, asin: &Asin) -> Result<CatalogInfo, ProviderError> {
        let key = CacheKey::new(ApiType::SpApiCatalog, &[("asin", asin.as_str())]);
        if let Some(raw) = self.cached(&key).await {
            return Ok(parse_catalog(&raw));
        }

        let url = format!("{}/catalog/2022-04-01/items/{}", self.base_url, asin.as_str());
        let marketplace = self.marketplace_id.clone();
        let raw = self
            .request_json(|| {
                self.client.get(&url).query(&[
                    ("marketplaceIds", marketplace.as_str()),
                    ("includedData", "attributes,identifiers,summaries"),
                ])
            })
            .await?;

        self.store(&key, &raw).await;
        Ok(parse_catalog(&raw))
    }

    async fn listing_restrictions(&self, asin: &Asin) -> Result<RestrictionInfo, ProviderError> {
        let key = CacheKey::new(ApiType::SpApiRestrictions, &[("asin", asin.as_str())]);
        if let Some(raw) = self.cached(&key).await {
            return Ok(parse_restrictions(&raw));
        }

        let url = format!("{}/listings/2021-08-01/restrictions", self.base_url);
        let marketplace = self.marketplace_id.clone();
        let seller = self.seller_id.clone();
        let raw = self
            .request_json(|| {
                self.client.get(&url).query(&[
                    ("asin", asin.as_str()),
                    ("sellerId", seller.as_str()),
                    ("marketplaceIds", marketplace.as_str()),
                ])
            })
            .await?;

        self.store(&key, &raw).await;
        Ok(parse_restrictions(&raw))
    }
}

fn amount_as_yen(value: &serde_json::Value) -> Option<i64> {
    value
        .get("Amount")
        .and_then(|a| a.as_f64())
        .map(|a| a as i64)
}

/// Parse the getItemOffers payload: lowest FBA/merchant prices and seller
/// counts.
pub fn parse_offers(body: &serde_json::Value) -> OfferSummary {
    let mut out = OfferSummary::default();
    let payload = body.get("payload").unwrap_or(body);

    if let Some(summary) = payload.get("Summary") {
        out.seller_count = summary
            .get("TotalOfferCount")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        if let Some(lowest) = summary.get("LowestPrices").and_then(|v| v.as_array()) {
            for entry in lowest {
                if entry.get("condition").and_then(|v| v.as_str()) != Some("New") {
                    continue;
                }
                let landed = entry.get("LandedPrice").and_then(amount_as_yen);
                match entry.get("fulfillmentChannel").and_then(|v| v.as_str()) {
                    Some("Amazon") => {
                        if out.fba_lowest_price.is_none() {
                            out.fba_lowest_price = landed;
                        }
                    }
                    Some("Merchant") => {
                        if out.new_lowest_price.is_none() {
                            out.new_lowest_price = landed;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    if let Some(offers) = payload.get("Offers").and_then(|v| v.as_array()) {
        let mut fba_count = 0;
        for offer in offers {
            if offer.get("IsFulfilledByAmazon").and_then(|v| v.as_bool()) != Some(true) {
                continue;
            }
            fba_count += 1;
            if out.fba_lowest_price.is_none() {
                let listing = offer.get("ListingPrice").and_then(amount_as_yen);
                let shipping = offer
                    .get("Shipping")
                    .map(amount_as_yen)
                    .flatten()
                    .unwrap_or(0);
                out.fba_lowest_price = listing.map(|p| p + shipping);
            }
        }
        if fba_count > 0 {
            out.fba_seller_count = fba_count;
        }
    }

    out
}

/// Parse the getMyFeesEstimateForASIN payload into per-bucket fee totals.
pub fn parse_fees(body: &serde_json::Value) -> FeeEstimate {
    let mut out = FeeEstimate::default();
    let payload = body.get("payload").unwrap_or(body);

    let Some(estimate) = payload
        .get("FeesEstimateResult")
        .and_then(|r| r.get("FeesEstimate"))
    else {
        return out;
    };

    if let Some(total) = estimate.get("TotalFeesEstimate").and_then(amount_as_yen) {
        out.total_fee = total;
    }

    if let Some(details) = estimate.get("FeeDetailList").and_then(|v| v.as_array()) {
        for fee in details {
            let fee_type = fee.get("FeeType").and_then(|v| v.as_str()).unwrap_or("");
            let amount = fee.get("FinalFee").and_then(amount_as_yen).unwrap_or(0);

            if fee_type.contains("ReferralFee") {
                out.referral_fee += amount;
            } else if fee_type.contains("FBA") || fee_type.contains("Fulfillment") {
                out.fba_fee += amount;
            } else {
                out.other_fee += amount;
            }
        }
    }

    out
}

/// Parse a catalog item: title/brand plus the identifiers used to backfill
/// JAN codes and model numbers.
pub fn parse_catalog(body: &serde_json::Value) -> CatalogInfo {
    let mut out = CatalogInfo::default();

    if let Some(summaries) = body.get("summaries").and_then(|v| v.as_array()) {
        for summary in summaries {
            if out.title.is_none() {
                out.title = summary
                    .get("itemName")
                    .and_then(|v| v.as_str())
                    .map(String::from);
            }
            if out.brand.is_none() {
                out.brand = summary
                    .get("brand")
                    .and_then(|v| v.as_str())
                    .map(String::from);
            }
        }
    }

    if let Some(attributes) = body.get("attributes") {
        let first_value = |name: &str| {
            attributes
                .get(name)
                .and_then(|v| v.as_array())
                .and_then(|arr| arr.first())
                .and_then(|entry| entry.get("value"))
                .and_then(|v| v.as_str())
                .map(String::from)
        };
        out.model_number = first_value("model_number");
        out.part_number = first_value("part_number");
    }

    if let Some(groups) = body.get("identifiers").and_then(|v| v.as_array()) {
        for group in groups {
            let Some(ids) = group.get("identifiers").and_then(|v| v.as_array()) else {
                continue;
            };
            for id in ids {
                let id_type = id.get("identifierType").and_then(|v| v.as_str());
                let id_value = id
                    .get("identifier")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                match id_type {
                    Some("EAN") if out.ean.is_none() => out.ean = id_value,
                    Some("UPC") if out.upc.is_none() => out.upc = id_value,
                    _ => {}
                }
            }
        }
    }

    out
}

/// Parse a listings-restrictions response. An empty restriction list means
/// a confirmed "no restriction", not an unknown.
pub fn parse_restrictions(body: &serde_json::Value) -> RestrictionInfo {
    let Some(restrictions) = body.get("restrictions").and_then(|v| v.as_array()) else {
        return RestrictionInfo {
            has_restriction: None,
            reason: None,
        };
    };

    if restrictions.is_empty() {
        return RestrictionInfo {
            has_restriction: Some(false),
            reason: None,
        };
    }

    let reason = restrictions
        .first()
        .and_then(|r| r.get("reasons"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|r| r.get("message"))
        .and_then(|v| v.as_str())
        .map(String::from);

    RestrictionInfo {
        has_restriction: Some(true),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_offers_summary() {
        let body = json!({
            "payload": {
                "Summary": {
                    "TotalOfferCount": 12,
                    "LowestPrices": [
                        {
                            "condition": "New",
                            "fulfillmentChannel": "Amazon",
                            "LandedPrice": {"CurrencyCode": "JPY", "Amount": 2980.0}
                        },
                        {
                            "condition": "New",
                            "fulfillmentChannel": "Merchant",
                            "LandedPrice": {"CurrencyCode": "JPY", "Amount": 2700.0}
                        }
                    ]
                },
                "Offers": [
                    {"IsFulfilledByAmazon": true},
                    {"IsFulfilledByAmazon": true},
                    {"IsFulfilledByAmazon": false}
                ]
            }
        });

        let offers = parse_offers(&body);
        assert_eq!(offers.fba_lowest_price, Some(2980));
        assert_eq!(offers.new_lowest_price, Some(2700));
        assert_eq!(offers.seller_count, 12);
        assert_eq!(offers.fba_seller_count, 2);
    }

    #[test]
    fn test_parse_offers_falls_back_to_offer_listing_price() {
        let body = json!({
            "payload": {
                "Offers": [{
                    "IsFulfilledByAmazon": true,
                    "ListingPrice": {"Amount": 1500.0},
                    "Shipping": {"Amount": 350.0}
                }]
            }
        });

        let offers = parse_offers(&body);
        assert_eq!(offers.fba_lowest_price, Some(1850));
    }

    #[test]
    fn test_parse_fees_buckets() {
        let body = json!({
            "payload": {
                "FeesEstimateResult": {
                    "FeesEstimate": {
                        "TotalFeesEstimate": {"Amount": 900.0},
                        "FeeDetailList": [
                            {"FeeType": "ReferralFee", "FinalFee": {"Amount": 450.0}},
                            {"FeeType": "FBAFees", "FinalFee": {"Amount": 400.0}},
                            {"FeeType": "VariableClosingFee", "FinalFee": {"Amount": 50.0}}
                        ]
                    }
                }
            }
        });

        let fees = parse_fees(&body);
        assert_eq!(fees.referral_fee, 450);
        assert_eq!(fees.fba_fee, 400);
        assert_eq!(fees.other_fee, 50);
        assert_eq!(fees.total_fee, 900);
    }

    #[test]
    fn test_parse_catalog_identifiers() {
        let body = json!({
            "summaries": [{"itemName": "Example Widget", "brand": "ACME"}],
            "attributes": {
                "model_number": [{"value": "WID-100"}],
                "part_number": [{"value": "PN-1"}]
            },
            "identifiers": [{
                "identifiers": [
                    {"identifierType": "EAN", "identifier": "4902370536485"},
                    {"identifierType": "UPC", "identifier": "012345678905"}
                ]
            }]
        });

        let catalog = parse_catalog(&body);
        assert_eq!(catalog.title.as_deref(), Some("Example Widget"));
        assert_eq!(catalog.brand.as_deref(), Some("ACME"));
        assert_eq!(catalog.model_number.as_deref(), Some("WID-100"));
        assert_eq!(catalog.part_number.as_deref(), Some("PN-1"));
        assert_eq!(catalog.ean.as_deref(), Some("4902370536485"));
        assert_eq!(catalog.upc.as_deref(), Some("012345678905"));
    }

    #[test]
    fn test_parse_restrictions_present() {
        let body = json!({
            "restrictions": [{
                "conditionType": "new_new",
                "reasons": [{"message": "Approval required"}]
            }]
        });

        let info = parse_restrictions(&body);
        assert_eq!(info.has_restriction, Some(true));
        assert_eq!(info.reason.as_deref(), Some("Approval required"));
    }

    #[test]
    fn test_parse_restrictions_empty_means_clear() {
        let info = parse_restrictions(&json!({"restrictions": []}));
        assert_eq!(info.has_restriction, Some(false));
        assert_eq!(info.reason, None);
    }

    #[test]
    fn test_parse_restrictions_missing_means_unknown() {
        let info = parse_restrictions(&json!({}));
        assert_eq!(info.has_restriction, None);
    }
}

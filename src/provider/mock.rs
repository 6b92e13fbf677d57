//! Mock gateways for tests: predefined data, optional error injection, no
//! network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::Asin;
use crate::provider::{
    AmazonGateway, CatalogInfo, FeeEstimate, KeepaGateway, KeepaProduct, OfferSummary,
    ProviderError, RakutenGateway, RakutenOffer, RestrictionInfo,
};

/// Mock Keepa gateway keyed by ASIN. Unknown ASINs answer NotFound.
#[derive(Debug, Default)]
pub struct MockKeepaGateway {
    products: HashMap<String, KeepaProduct>,
    error: Option<ProviderError>,
    calls: AtomicUsize,
}

impl MockKeepaGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, asin: &str, product: KeepaProduct) -> Self {
        self.products.insert(asin.to_string(), product);
        self
    }

    /// Make every call fail with the given error.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeepaGateway for MockKeepaGateway {
    async fn product(&self, asin: &Asin) -> Result<KeepaProduct, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        self.products
            .get(asin.as_str())
            .cloned()
            .ok_or(ProviderError::NotFound)
    }
}

/// Mock SP-API gateway. Fees default to a flat 30% of price when no
/// explicit estimate is registered.
#[derive(Debug, Default)]
pub struct MockAmazonGateway {
    offers: HashMap<String, OfferSummary>,
    fees: HashMap<String, FeeEstimate>,
    catalogs: HashMap<String, CatalogInfo>,
    restrictions: HashMap<String, RestrictionInfo>,
    error: Option<ProviderError>,
}

impl MockAmazonGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offers(mut self, asin: &str, offers: OfferSummary) -> Self {
        self.offers.insert(asin.to_string(), offers);
        self
    }

    pub fn with_fees(mut self, asin: &str, fees: FeeEstimate) -> Self {
        self.fees.insert(asin.to_string(), fees);
        self
    }

    pub fn with_catalog(mut self, asin: &str, catalog: CatalogInfo) -> Self {
        self.catalogs.insert(asin.to_string(), catalog);
        self
    }

    pub fn with_restrictions(mut self, asin: &str, info: RestrictionInfo) -> Self {
        self.restrictions.insert(asin.to_string(), info);
        self
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    fn check_error(&self) -> Result<(), ProviderError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AmazonGateway for MockAmazonGateway {
    async fn item_offers(&self, asin: &Asin) -> Result<OfferSummary, ProviderError> {
        self.check_error()?;
        Ok(self.offers.get(asin.as_str()).cloned().unwrap_or_default())
    }

    async fn fees_estimate(&self, asin: &Asin, price: i64) -> Result<FeeEstimate, ProviderError> {
        self.check_error()?;
        Ok(self
            .fees
            .get(asin.as_str())
            .copied()
            .unwrap_or_else(|| {
                let total = price * 3 / 10;
                FeeEstimate {
                    referral_fee: price / 10,
                    fba_fee: total - price / 10,
                    other_fee: 0,
                    total_fee: total,
                }
            }))
    }

    async fn catalog_item(&self, asin: &Asin) -> Result<CatalogInfo, ProviderError> {
        self.check_error()?;
        Ok(self.catalogs.get(asin.as_str()).cloned().unwrap_or_default())
    }

    async fn listing_restrictions(&self, asin: &Asin) -> Result<RestrictionInfo, ProviderError> {
        self.check_error()?;
        Ok(self
            .restrictions
            .get(asin.as_str())
            .cloned()
            .unwrap_or(RestrictionInfo {
                has_restriction: Some(false),
                reason: None,
            }))
    }
}

/// Mock Rakuten gateway keyed by exact search keyword.
#[derive(Debug, Default)]
pub struct MockRakutenGateway {
    results: HashMap<String, Vec<RakutenOffer>>,
    error: Option<ProviderError>,
    calls: AtomicUsize,
}

impl MockRakutenGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, keyword: &str, offers: Vec<RakutenOffer>) -> Self {
        self.results.insert(keyword.to_string(), offers);
        self
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RakutenGateway for MockRakutenGateway {
    async fn search_items(&self, keyword: &str) -> Result<Vec<RakutenOffer>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        Ok(self.results.get(keyword).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_keepa_returns_registered_product() {
        let product = KeepaProduct {
            title: Some("Example Widget".to_string()),
            ..KeepaProduct::default()
        };
        let mock = MockKeepaGateway::new().with_product("B00EXAMPL1", product.clone());

        let got = mock.product(&Asin::new("B00EXAMPL1")).await.unwrap();
        assert_eq!(got, product);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_keepa_unknown_asin_is_not_found() {
        let mock = MockKeepaGateway::new();
        let err = mock.product(&Asin::new("B00MISSING")).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound));
    }

    #[tokio::test]
    async fn test_mock_amazon_default_fees_are_thirty_percent() {
        let mock = MockAmazonGateway::new();
        let fees = mock
            .fees_estimate(&Asin::new("B00EXAMPL1"), 3000)
            .await
            .unwrap();
        assert_eq!(fees.total_fee, 900);
    }

    #[tokio::test]
    async fn test_mock_rakuten_error_injection() {
        let mock = MockRakutenGateway::failing(ProviderError::RateLimited);
        let err = mock.search_items("anything").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));
    }
}

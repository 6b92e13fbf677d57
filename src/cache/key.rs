//! Deterministic cache keys for provider responses.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which upstream call a cache entry belongs to. Part of the key, so two
/// providers can never collide even on identical parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiType {
    KeepaProduct,
    SpApiPricing,
    SpApiFees,
    SpApiCatalog,
    SpApiRestrictions,
    RakutenSearch,
}

impl ApiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::KeepaProduct => "keepa_product",
            ApiType::SpApiPricing => "sp_api_pricing",
            ApiType::SpApiFees => "sp_api_fees",
            ApiType::SpApiCatalog => "sp_api_catalog",
            ApiType::SpApiRestrictions => "sp_api_restrictions",
            ApiType::RakutenSearch => "rakuten_search",
        }
    }
}

/// A cache key derived purely from (api type, request parameters).
///
/// Parameters are sorted by name before hashing, so construction is
/// order-independent; equal requests always map to the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    api_type: ApiType,
    key: String,
    params_json: String,
}

impl CacheKey {
    pub fn new(api_type: ApiType, params: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<(&str, &str)> = params.to_vec();
        sorted.sort();

        let canonical = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();

        let params_json = serde_json::to_string(
            &sorted
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<std::collections::BTreeMap<_, _>>(),
        )
        .unwrap_or_else(|_| "{}".to_string());

        CacheKey {
            api_type,
            key: format!("{}:{}", api_type.as_str(), &hex::encode(digest)[..32]),
            params_json,
        }
    }

    pub fn api_type(&self) -> ApiType {
        self.api_type
    }

    /// The storage key.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Normalized parameters as JSON, stored alongside the entry for
    /// debugging cache contents.
    pub fn params_json(&self) -> &str {
        &self.params_json
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_order_independent() {
        let a = CacheKey::new(ApiType::RakutenSearch, &[("keyword", "x"), ("hits", "30")]);
        let b = CacheKey::new(ApiType::RakutenSearch, &[("hits", "30"), ("keyword", "x")]);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = CacheKey::new(ApiType::KeepaProduct, &[("asin", "B00EXAMPL1")]);
        let b = CacheKey::new(ApiType::KeepaProduct, &[("asin", "B00EXAMPL1")]);
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_different_params_differ() {
        let a = CacheKey::new(ApiType::KeepaProduct, &[("asin", "B00EXAMPL1")]);
        let b = CacheKey::new(ApiType::KeepaProduct, &[("asin", "B00EXAMPL2")]);
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_api_type_prefixes_key() {
        let a = CacheKey::new(ApiType::SpApiFees, &[("asin", "B00EXAMPL1")]);
        let b = CacheKey::new(ApiType::SpApiCatalog, &[("asin", "B00EXAMPL1")]);
        assert!(a.as_str().starts_with("sp_api_fees:"));
        assert!(b.as_str().starts_with("sp_api_catalog:"));
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_params_json_sorted() {
        let key = CacheKey::new(ApiType::RakutenSearch, &[("keyword", "x"), ("hits", "30")]);
        assert_eq!(key.params_json(), r#"{"hits":"30","keyword":"x"}"#);
    }
}

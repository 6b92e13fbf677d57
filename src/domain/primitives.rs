//! Domain primitives: Asin, JobId, JanCode, ModelNumber.

use serde::{Deserialize, Serialize};

/// Amazon Standard Identification Number.
///
/// Stored as entered (trimmed, uppercased); syntactic validity is checked
/// separately so malformed input can still be recorded and skipped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Asin(pub String);

impl Asin {
    /// Create an Asin, trimming whitespace and uppercasing.
    pub fn new(raw: &str) -> Self {
        Asin(raw.trim().to_ascii_uppercase())
    }

    /// Get the ASIN as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this looks like a real ASIN: exactly 10 ASCII alphanumerics.
    pub fn is_wellformed(&self) -> bool {
        self.0.len() == 10 && self.0.bytes().all(|b| b.is_ascii_alphanumeric())
    }
}

impl std::fmt::Display for Asin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque research job identifier (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Wrap an existing identifier.
    pub fn new(id: String) -> Self {
        JobId(id)
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        JobId(uuid::Uuid::new_v4().to_string())
    }

    /// Get the identifier as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// JAN (EAN) barcode of a product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JanCode(pub String);

impl JanCode {
    pub fn new(raw: &str) -> Self {
        JanCode(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A JAN is worth searching with only when it has at least 8 digits.
    pub fn is_searchable(&self) -> bool {
        self.0.len() >= 8 && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl std::fmt::Display for JanCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Manufacturer model number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelNumber(pub String);

impl ModelNumber {
    pub fn new(raw: &str) -> Self {
        ModelNumber(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Uppercase with whitespace, hyphens and underscores stripped.
    ///
    /// Used both for search dedup and for exact-containment matching of
    /// model numbers against listing titles.
    pub fn normalized(&self) -> String {
        normalize_model(&self.0)
    }

    /// Normalized models shorter than 3 chars match too loosely to use.
    pub fn is_searchable(&self) -> bool {
        self.normalized().len() >= 3
    }
}

impl std::fmt::Display for ModelNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalize any string the way model numbers are normalized.
pub fn normalize_model(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(|c| c.to_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asin_normalizes_input() {
        let asin = Asin::new("  b00example  ");
        assert_eq!(asin.as_str(), "B00EXAMPLE");
    }

    #[test]
    fn test_asin_wellformed() {
        assert!(Asin::new("B00EXAMPL1").is_wellformed());
        assert!(Asin::new("4901234567").is_wellformed());
        assert!(!Asin::new("B00").is_wellformed());
        assert!(!Asin::new("B00EXAMPL1X").is_wellformed());
        assert!(!Asin::new("B00-XAMPL1").is_wellformed());
    }

    #[test]
    fn test_jan_searchable() {
        assert!(JanCode::new("4902370536485").is_searchable());
        assert!(JanCode::new("49023705").is_searchable());
        assert!(!JanCode::new("4902370").is_searchable());
        assert!(!JanCode::new("49023705X").is_searchable());
    }

    #[test]
    fn test_model_normalization() {
        let model = ModelNumber::new("hac-s-ka aa_a");
        assert_eq!(model.normalized(), "HACSKAAAA");
        assert!(model.is_searchable());
        assert!(!ModelNumber::new("a-1").is_searchable());
    }

    #[test]
    fn test_job_id_generate_unique() {
        assert_ne!(JobId::generate(), JobId::generate());
    }
}

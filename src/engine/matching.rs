//! Rakuten candidate matching and selection.
//!
//! Search order is JAN, then model number, then a title-derived keyword;
//! each step only runs when the previous one found nothing, so every
//! candidate set carries a single match type. Selection is nevertheless
//! written against mixed sets: match-type priority is strict, and within
//! the best type the cheapest net cost wins.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::{
    normalize_model, Asin, JanCode, JobId, MatchOutcome, MatchType, ModelNumber, RakutenCandidate,
    ShippingStatus,
};
use crate::engine::calculator::point_amount;
use crate::provider::{ProviderError, RakutenGateway, RakutenOffer};

/// Keyword searches use at most this many leading characters of the title.
const KEYWORD_MAX_CHARS: usize = 64;
/// How many candidates are kept per (job, asin).
const MAX_SAVED_CANDIDATES: usize = 20;

/// Inputs the matcher needs for one ASIN.
pub struct MatchRequest<'a> {
    pub job_id: &'a JobId,
    pub asin: &'a Asin,
    pub jan_code: Option<&'a JanCode>,
    pub model_number: Option<&'a ModelNumber>,
    pub title: Option<&'a str>,
    /// Point rate applied when computing candidate point amounts.
    pub point_rate: Decimal,
}

/// Result of matching one ASIN. At most one candidate has `is_chosen`.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub outcome: MatchOutcome,
    pub candidates: Vec<RakutenCandidate>,
}

impl MatchResult {
    pub fn chosen(&self) -> Option<&RakutenCandidate> {
        self.candidates.iter().find(|c| c.is_chosen)
    }

    fn empty() -> Self {
        MatchResult {
            outcome: MatchOutcome::None,
            candidates: Vec::new(),
        }
    }
}

pub struct Matcher {
    gateway: Arc<dyn RakutenGateway>,
}

impl Matcher {
    pub fn new(gateway: Arc<dyn RakutenGateway>) -> Self {
        Matcher { gateway }
    }

    /// Search Rakuten for supply candidates and select the best one.
    ///
    /// An empty result is not an error; it is recorded as "no match found".
    pub async fn find_candidates(
        &self,
        request: &MatchRequest<'_>,
    ) -> Result<MatchResult, ProviderError> {
        let (outcome, offers, match_value) = self.search(request).await?;
        if offers.is_empty() {
            return Ok(MatchResult::empty());
        }

        let match_type = match outcome {
            MatchOutcome::Jan => MatchType::Jan,
            MatchOutcome::Model => MatchType::Model,
            _ => MatchType::Keyword,
        };

        let mut candidates: Vec<RakutenCandidate> = offers
            .iter()
            .map(|offer| build_candidate(request, offer, match_type, &match_value))
            .collect();

        sort_for_selection(&mut candidates);
        candidates.truncate(MAX_SAVED_CANDIDATES);
        if let Some(first) = candidates.first_mut() {
            first.is_chosen = true;
        }

        Ok(MatchResult {
            outcome,
            candidates,
        })
    }

    async fn search(
        &self,
        request: &MatchRequest<'_>,
    ) -> Result<(MatchOutcome, Vec<RakutenOffer>, String), ProviderError> {
        if let Some(jan) = request.jan_code.filter(|j| j.is_searchable()) {
            let offers = self.gateway.search_items(jan.as_str()).await?;
            if !offers.is_empty() {
                return Ok((MatchOutcome::Jan, offers, jan.as_str().to_string()));
            }
        }

        if let Some(model) = request.model_number.filter(|m| m.is_searchable()) {
            let offers = self.gateway.search_items(model.as_str()).await?;
            let matched = filter_by_model(offers, model);
            if !matched.is_empty() {
                return Ok((MatchOutcome::Model, matched, model.as_str().to_string()));
            }
        }

        if let Some(keyword) = request.title.map(title_keyword).filter(|k| !k.is_empty()) {
            let offers = self.gateway.search_items(&keyword).await?;
            if !offers.is_empty() {
                return Ok((MatchOutcome::Keyword, offers, keyword));
            }
        }

        Ok((MatchOutcome::None, Vec::new(), String::new()))
    }
}

/// Keep only offers whose listing title contains the normalized model
/// number. A bare model-number search matches accessories and lookalikes;
/// exact containment weeds those out.
fn filter_by_model(offers: Vec<RakutenOffer>, model: &ModelNumber) -> Vec<RakutenOffer> {
    let normalized = model.normalized();
    offers
        .into_iter()
        .filter(|offer| {
            offer
                .item_name
                .as_deref()
                .map(|name| normalize_model(name).contains(&normalized))
                .unwrap_or(false)
        })
        .collect()
}

fn title_keyword(title: &str) -> String {
    title.trim().chars().take(KEYWORD_MAX_CHARS).collect()
}

fn build_candidate(
    request: &MatchRequest<'_>,
    offer: &RakutenOffer,
    match_type: MatchType,
    match_value: &str,
) -> RakutenCandidate {
    let (shipping_status, shipping) = if offer.postage_included {
        (ShippingStatus::Free, None)
    } else {
        match offer.shipping_cost {
            Some(0) => (ShippingStatus::Free, None),
            Some(cost) => (ShippingStatus::Paid, Some(cost)),
            None => (ShippingStatus::Unknown, None),
        }
    };

    RakutenCandidate {
        job_id: request.job_id.clone(),
        asin: request.asin.clone(),
        match_type,
        match_value: Some(match_value.to_string()),
        item_code: offer.item_code.clone(),
        item_name: offer.item_name.clone(),
        item_url: offer.item_url.clone(),
        shop_code: offer.shop_code.clone(),
        shop_name: offer.shop_name.clone(),
        price: offer.price,
        shipping,
        shipping_status,
        point_rate: None,
        point_rate_used: request.point_rate,
        point_amount: point_amount(offer.price, request.point_rate),
        is_chosen: false,
    }
}

/// Stable-sort candidates into selection order: strongest match type first,
/// then known shipping before unknown, then lowest net cost, then lowest
/// total cost. After sorting, the best candidate is at index 0.
pub fn sort_for_selection(candidates: &mut [RakutenCandidate]) {
    candidates.sort_by_key(|c| {
        (
            c.match_type.priority(),
            c.shipping_status == ShippingStatus::Unknown,
            c.net_cost_floor(),
            c.total_cost().unwrap_or(c.price),
        )
    });
}

//! Per-item processing: fetch, screen, match, compute, judge.
//!
//! Provider failures are absorbed here and turn into terminal item states;
//! only storage errors escape to the job runner.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::Repository;
use crate::domain::{
    MatchOutcome, Metric, ProcessStatus, Provenance, ResearchItem, ResearchJob, RiskKind,
    TimeseriesPoint, TsSource, Verdict,
};
use crate::engine::calculator::{compute_profit, point_rate_used, rakuten_cost};
use crate::engine::judgement::judge;
use crate::engine::matching::{MatchRequest, Matcher};
use crate::engine::screening::screen;
use crate::pipeline::PipelineError;
use crate::provider::{AmazonGateway, KeepaGateway, KeepaProduct, ProviderError, RakutenGateway};

/// How many trailing history points are persisted per metric.
const HISTORY_KEEP: usize = 90;
/// fail_reason column budget.
const FAIL_REASON_MAX: usize = 500;

pub struct ItemProcessor {
    keepa: Arc<dyn KeepaGateway>,
    amazon: Arc<dyn AmazonGateway>,
    matcher: Matcher,
    repo: Arc<Repository>,
}

impl ItemProcessor {
    pub fn new(
        keepa: Arc<dyn KeepaGateway>,
        amazon: Arc<dyn AmazonGateway>,
        rakuten: Arc<dyn RakutenGateway>,
        repo: Arc<Repository>,
    ) -> Self {
        Self {
            keepa,
            amazon,
            matcher: Matcher::new(rakuten),
            repo,
        }
    }

    /// Drive one claimed item to a terminal state.
    ///
    /// The item must already be PROCESSING. Whatever happens upstream, the
    /// item ends SUCCESS, FAILED or SKIPPED; only a storage error leaves it
    /// in PROCESSING and propagates.
    pub async fn process(
        &self,
        job: &ResearchJob,
        item: &mut ResearchItem,
    ) -> Result<(), PipelineError> {
        if !item.asin.is_wellformed() {
            item.process_status = ProcessStatus::Skipped;
            item.fail_reason = Some("malformed ASIN".to_string());
            self.repo.save_item(item).await?;
            return Ok(());
        }

        // First pass: Keepa. A missing product is terminal for the item.
        let product = match self.keepa.product(&item.asin).await {
            Ok(product) => product,
            Err(error) => {
                self.fail_item(item, &error).await?;
                return Ok(());
            }
        };

        apply_keepa(item, &product);
        self.record_history(job, item, &product).await?;

        // Cost-saving screen on rank/sales before any further provider
        // spend. A screening miss is a completed FAIL judgement.
        if let Some(reasons) = screen(&item.ranking, &job.config) {
            item.verdict = Some(Verdict::Fail);
            item.reasons = reasons;
            self.finish_item(item).await?;
            return Ok(());
        }

        self.fetch_amazon(item).await;

        let chosen = self.match_rakuten(job, item).await?;

        let cost = chosen.as_ref().and_then(rakuten_cost);
        let figures = compute_profit(item.amazon.price_fba_lowest, item.amazon.fee_total, cost);
        item.amazon.payout = figures.payout;
        item.profit.amount = figures.amount;
        item.profit.rate = figures.rate;

        let judgement = judge(item, &job.config);
        item.verdict = Some(judgement.verdict);
        item.reasons = judgement.reasons;

        self.finish_item(item).await?;
        Ok(())
    }

    /// SP-API enrichment. Degraded data routes to REVIEW downstream, so
    /// none of these failures are fatal to the item.
    async fn fetch_amazon(&self, item: &mut ResearchItem) {
        match self.amazon.item_offers(&item.asin).await {
            Ok(offers) => {
                item.amazon.price_fba_lowest = offers.fba_lowest_price;
                if offers.seller_count > 0 {
                    item.sellers.seller_count = Some(offers.seller_count);
                }
                if offers.fba_seller_count > 0 {
                    item.sellers.fba_seller_count = Some(offers.fba_seller_count);
                }
            }
            Err(error) => warn!("offers fetch failed for {}: {}", item.asin, error),
        }

        if let Some(price) = item.amazon.price_fba_lowest {
            match self.amazon.fees_estimate(&item.asin, price).await {
                Ok(fees) => {
                    item.amazon.fee_referral = Some(fees.referral_fee);
                    item.amazon.fee_fba = Some(fees.fba_fee);
                    item.amazon.fee_other = Some(fees.other_fee);
                    item.amazon.fee_total = Some(fees.total_fee);
                }
                Err(error) => warn!("fee estimate failed for {}: {}", item.asin, error),
            }
        }

        // Catalog backfill and restriction check are independent reads.
        let need_catalog =
            item.catalog.jan_code.is_none() || item.catalog.model_number.is_none();
        let catalog_fut = async {
            if need_catalog {
                Some(self.amazon.catalog_item(&item.asin).await)
            } else {
                None
            }
        };
        let restrictions_fut = self.amazon.listing_restrictions(&item.asin);
        let (catalog, restrictions) = futures::join!(catalog_fut, restrictions_fut);

        match catalog {
            Some(Ok(catalog)) => {
                if item.catalog.jan_code.is_none() {
                    item.catalog.jan_code = catalog.ean.map(|e| crate::domain::JanCode::new(&e));
                }
                if item.catalog.model_number.is_none() {
                    item.catalog.model_number = catalog
                        .model_number
                        .or(catalog.part_number)
                        .map(|m| crate::domain::ModelNumber::new(&m));
                }
                if item.catalog.title.is_none() {
                    item.catalog.title = catalog.title;
                }
                if item.catalog.brand.is_none() {
                    item.catalog.brand = catalog.brand;
                }
            }
            Some(Err(error)) => warn!("catalog fetch failed for {}: {}", item.asin, error),
            None => {}
        }

        match restrictions {
            Ok(info) => {
                if let Some(restricted) = info.has_restriction {
                    item.risk
                        .record(RiskKind::ListingRestriction, restricted, Provenance::Auto);
                }
            }
            Err(error) => warn!("restriction check failed for {}: {}", item.asin, error),
        }
    }

    /// Run Rakuten matching, persist the candidate set, and copy the chosen
    /// candidate onto the item. A search failure records UNKNOWN and moves
    /// on; the judgement turns that into REVIEW.
    async fn match_rakuten(
        &self,
        job: &ResearchJob,
        item: &mut ResearchItem,
    ) -> Result<Option<crate::domain::RakutenCandidate>, PipelineError> {
        let point_rate = point_rate_used(&job.config, item.point_rate_override);
        let request = MatchRequest {
            job_id: &item.job_id,
            asin: &item.asin,
            jan_code: item.catalog.jan_code.as_ref(),
            model_number: item.catalog.model_number.as_ref(),
            title: item.catalog.title.as_deref(),
            point_rate,
        };

        let result = match self.matcher.find_candidates(&request).await {
            Ok(result) => result,
            Err(error) => {
                warn!("rakuten matching failed for {}: {}", item.asin, error);
                item.rakuten.match_outcome = Some(MatchOutcome::Unknown);
                return Ok(None);
            }
        };

        item.rakuten.match_outcome = Some(result.outcome);
        self.repo
            .replace_candidates(&item.job_id, &item.asin, &result.candidates)
            .await?;

        let chosen = result.chosen().cloned();
        if let Some(chosen) = &chosen {
            item.rakuten.item_name = chosen.item_name.clone();
            item.rakuten.shop_name = chosen.shop_name.clone();
            item.rakuten.item_url = chosen.item_url.clone();
            item.rakuten.price = Some(chosen.price);
            item.rakuten.shipping = chosen.shipping;
            item.rakuten.shipping_status = Some(chosen.shipping_status);
            item.rakuten.point_amount = Some(chosen.point_amount);
            item.rakuten.cost_gross = chosen.total_cost();
            item.rakuten.cost_net = chosen.net_cost();
        }

        Ok(chosen)
    }

    async fn record_history(
        &self,
        job: &ResearchJob,
        item: &ResearchItem,
        product: &KeepaProduct,
    ) -> Result<(), PipelineError> {
        let mut points = Vec::new();
        let tail = |series: &[crate::provider::HistoryPoint]| {
            series
                .iter()
                .skip(series.len().saturating_sub(HISTORY_KEEP))
                .copied()
                .collect::<Vec<_>>()
        };

        for point in tail(&product.price_history) {
            points.push(TimeseriesPoint {
                job_id: job.job_id.clone(),
                asin: item.asin.clone(),
                metric: Metric::Price,
                recorded_date: point.date,
                value: point.value,
                source: TsSource::Keepa,
            });
        }
        for point in tail(&product.rank_history) {
            points.push(TimeseriesPoint {
                job_id: job.job_id.clone(),
                asin: item.asin.clone(),
                metric: Metric::Rank,
                recorded_date: point.date,
                value: point.value,
                source: TsSource::Keepa,
            });
        }

        if !points.is_empty() {
            let inserted = self.repo.append_timeseries(&points).await?;
            debug!("{}: {} new timeseries points", item.asin, inserted);
        }
        Ok(())
    }

    async fn finish_item(&self, item: &mut ResearchItem) -> Result<(), PipelineError> {
        item.process_status = ProcessStatus::Success;
        item.fetched_at = Some(Utc::now());
        self.repo.save_item(item).await?;
        Ok(())
    }

    async fn fail_item(
        &self,
        item: &mut ResearchItem,
        error: &ProviderError,
    ) -> Result<(), PipelineError> {
        let reason = match error {
            ProviderError::NotFound => "ASIN not found".to_string(),
            ProviderError::RateLimited => "rate limited by provider".to_string(),
            ProviderError::Upstream(msg) => format!("provider error: {}", msg),
        };

        item.process_status = ProcessStatus::Failed;
        item.fail_reason = Some(truncate(&reason, FAIL_REASON_MAX));
        self.repo.save_item(item).await?;
        Ok(())
    }
}

fn apply_keepa(item: &mut ResearchItem, product: &KeepaProduct) {
    let catalog = &mut item.catalog;
    if catalog.title.is_none() {
        catalog.title = product.title.clone();
    }
    if catalog.brand.is_none() {
        catalog.brand = product.brand.clone();
    }
    if catalog.category.is_none() {
        catalog.category = product.category.clone();
    }
    if catalog.jan_code.is_none() {
        catalog.jan_code = product
            .jan_code
            .as_deref()
            .map(crate::domain::JanCode::new);
    }
    if catalog.model_number.is_none() {
        catalog.model_number = product
            .model_number
            .as_deref()
            .map(crate::domain::ModelNumber::new);
    }

    item.ranking.rank_current = product.rank_current;
    item.ranking.rank_avg_30 = product.rank_avg_30;
    item.ranking.rank_avg_90 = product.rank_avg_90;
    item.ranking.sales_est_30 = product.sales_est_30;
    item.ranking.sales_est_90 = product.sales_est_90;
    item.ranking.sales_est_180 = product.sales_est_180;
    item.sellers.seller_count = product.seller_count;
    item.sellers.fba_seller_count = product.fba_seller_count;
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::{JobConfig, ShippingStatus};
    use crate::provider::{
        MockAmazonGateway, MockKeepaGateway, MockRakutenGateway, OfferSummary, RakutenOffer,
    };
    use crate::domain::Asin;
    use tempfile::TempDir;

    async fn setup(
        keepa: MockKeepaGateway,
        amazon: MockAmazonGateway,
        rakuten: MockRakutenGateway,
    ) -> (ItemProcessor, Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));
        let processor = ItemProcessor::new(
            Arc::new(keepa),
            Arc::new(amazon),
            Arc::new(rakuten),
            repo.clone(),
        );
        (processor, repo, temp_dir)
    }

    fn keepa_product() -> KeepaProduct {
        KeepaProduct {
            title: Some("Example Widget".to_string()),
            jan_code: Some("4902370536485".to_string()),
            model_number: Some("WID-100".to_string()),
            rank_current: Some(4200),
            sales_est_30: Some(25),
            ..KeepaProduct::default()
        }
    }

    async fn claimed_item(repo: &Repository, job: &ResearchJob) -> ResearchItem {
        let mut item = repo
            .list_pending_items(&job.job_id, 10)
            .await
            .unwrap()
            .remove(0);
        assert!(repo.claim_item(item.id).await.unwrap());
        item.process_status = ProcessStatus::Processing;
        item
    }

    #[tokio::test]
    async fn test_malformed_asin_is_skipped_without_provider_calls() {
        let keepa = MockKeepaGateway::new();
        let (processor, repo, _temp) =
            setup(keepa, MockAmazonGateway::new(), MockRakutenGateway::new()).await;
        let job = repo
            .create_job(JobConfig::default(), &[Asin::new("BAD")])
            .await
            .unwrap();
        let mut item = claimed_item(&repo, &job).await;

        processor.process(&job, &mut item).await.unwrap();

        assert_eq!(item.process_status, ProcessStatus::Skipped);
        assert_eq!(item.fail_reason.as_deref(), Some("malformed ASIN"));
    }

    #[tokio::test]
    async fn test_unknown_asin_fails_with_not_found_reason() {
        let (processor, repo, _temp) = setup(
            MockKeepaGateway::new(),
            MockAmazonGateway::new(),
            MockRakutenGateway::new(),
        )
        .await;
        let job = repo
            .create_job(JobConfig::default(), &[Asin::new("B00MISSING")])
            .await
            .unwrap();
        let mut item = claimed_item(&repo, &job).await;

        processor.process(&job, &mut item).await.unwrap();

        assert_eq!(item.process_status, ProcessStatus::Failed);
        assert_eq!(item.fail_reason.as_deref(), Some("ASIN not found"));
        assert!(item.verdict.is_none());
    }

    #[tokio::test]
    async fn test_screening_miss_finishes_without_rakuten_search() {
        let product = KeepaProduct {
            rank_current: Some(400_000),
            sales_est_30: Some(25),
            ..keepa_product()
        };
        let rakuten = MockRakutenGateway::new();
        let keepa = MockKeepaGateway::new().with_product("B00EXAMPL1", product);
        let (processor, repo, _temp) = setup(keepa, MockAmazonGateway::new(), rakuten).await;
        let job = repo
            .create_job(JobConfig::default(), &[Asin::new("B00EXAMPL1")])
            .await
            .unwrap();
        let mut item = claimed_item(&repo, &job).await;

        processor.process(&job, &mut item).await.unwrap();

        assert_eq!(item.process_status, ProcessStatus::Success);
        assert_eq!(item.verdict, Some(Verdict::Fail));
        assert!(item.profit.amount.is_none());
        // no Rakuten search happened
        let candidates = repo
            .list_candidates(&job.job_id, &item.asin)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_full_pipeline_reference_scenario() {
        // 3000 JPY FBA price, 900 JPY fees, 1200 JPY free-shipping match,
        // 8% points -> profit 996 -> FAIL on the 1000 JPY threshold.
        let keepa = MockKeepaGateway::new().with_product("B00EXAMPL1", keepa_product());
        let amazon = MockAmazonGateway::new()
            .with_offers(
                "B00EXAMPL1",
                OfferSummary {
                    fba_lowest_price: Some(3000),
                    new_lowest_price: None,
                    seller_count: 5,
                    fba_seller_count: 2,
                },
            )
            .with_fees(
                "B00EXAMPL1",
                crate::provider::FeeEstimate {
                    referral_fee: 450,
                    fba_fee: 400,
                    other_fee: 50,
                    total_fee: 900,
                },
            );
        let rakuten = MockRakutenGateway::new().with_result(
            "4902370536485",
            vec![RakutenOffer {
                item_name: Some("Example Widget".to_string()),
                shop_name: Some("Example Shop".to_string()),
                price: 1200,
                postage_included: true,
                ..RakutenOffer::default()
            }],
        );

        let (processor, repo, _temp) = setup(keepa, amazon, rakuten).await;
        let job = repo
            .create_job(JobConfig::default(), &[Asin::new("B00EXAMPL1")])
            .await
            .unwrap();
        let mut item = claimed_item(&repo, &job).await;

        processor.process(&job, &mut item).await.unwrap();

        assert_eq!(item.process_status, ProcessStatus::Success);
        assert_eq!(item.amazon.payout, Some(2100));
        assert_eq!(item.rakuten.point_amount, Some(96));
        assert_eq!(item.rakuten.cost_net, Some(1104));
        assert_eq!(item.profit.amount, Some(996));
        assert_eq!(item.verdict, Some(Verdict::Fail));

        // The candidate set was persisted with the chosen flag.
        let candidates = repo
            .list_candidates(&job.job_id, &item.asin)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].is_chosen);
    }

    #[tokio::test]
    async fn test_unknown_shipping_routes_to_review() {
        let keepa = MockKeepaGateway::new().with_product("B00EXAMPL1", keepa_product());
        let amazon = MockAmazonGateway::new().with_offers(
            "B00EXAMPL1",
            OfferSummary {
                fba_lowest_price: Some(3000),
                ..OfferSummary::default()
            },
        );
        let rakuten = MockRakutenGateway::new().with_result(
            "4902370536485",
            vec![RakutenOffer {
                item_name: Some("Example Widget".to_string()),
                price: 1200,
                postage_included: false,
                ..RakutenOffer::default()
            }],
        );

        let (processor, repo, _temp) = setup(keepa, amazon, rakuten).await;
        let job = repo
            .create_job(JobConfig::default(), &[Asin::new("B00EXAMPL1")])
            .await
            .unwrap();
        let mut item = claimed_item(&repo, &job).await;

        processor.process(&job, &mut item).await.unwrap();

        assert_eq!(item.process_status, ProcessStatus::Success);
        assert_eq!(
            item.rakuten.shipping_status,
            Some(ShippingStatus::Unknown)
        );
        assert!(item.profit.amount.is_none());
        assert_eq!(item.verdict, Some(Verdict::Review));
    }

    #[tokio::test]
    async fn test_rakuten_failure_degrades_to_review() {
        let keepa = MockKeepaGateway::new().with_product("B00EXAMPL1", keepa_product());
        let rakuten = MockRakutenGateway::failing(ProviderError::Upstream("boom".to_string()));
        let (processor, repo, _temp) = setup(keepa, MockAmazonGateway::new(), rakuten).await;
        let job = repo
            .create_job(JobConfig::default(), &[Asin::new("B00EXAMPL1")])
            .await
            .unwrap();
        let mut item = claimed_item(&repo, &job).await;

        processor.process(&job, &mut item).await.unwrap();

        assert_eq!(item.process_status, ProcessStatus::Success);
        assert_eq!(item.rakuten.match_outcome, Some(MatchOutcome::Unknown));
        assert_eq!(item.verdict, Some(Verdict::Review));
    }

    #[tokio::test]
    async fn test_auto_restriction_flag_hard_fails() {
        let keepa = MockKeepaGateway::new().with_product("B00EXAMPL1", keepa_product());
        let amazon = MockAmazonGateway::new()
            .with_offers(
                "B00EXAMPL1",
                OfferSummary {
                    fba_lowest_price: Some(3000),
                    ..OfferSummary::default()
                },
            )
            .with_restrictions(
                "B00EXAMPL1",
                crate::provider::RestrictionInfo {
                    has_restriction: Some(true),
                    reason: Some("Approval required".to_string()),
                },
            );
        let rakuten = MockRakutenGateway::new().with_result(
            "4902370536485",
            vec![RakutenOffer {
                item_name: Some("Example Widget".to_string()),
                price: 1200,
                postage_included: true,
                ..RakutenOffer::default()
            }],
        );

        let (processor, repo, _temp) = setup(keepa, amazon, rakuten).await;
        let job = repo
            .create_job(JobConfig::default(), &[Asin::new("B00EXAMPL1")])
            .await
            .unwrap();
        let mut item = claimed_item(&repo, &job).await;

        processor.process(&job, &mut item).await.unwrap();

        assert_eq!(item.verdict, Some(Verdict::Fail));
        assert_eq!(
            item.risk.get(RiskKind::ListingRestriction).value,
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_timeseries_recorded_from_keepa_history() {
        use crate::provider::HistoryPoint;
        let mut product = keepa_product();
        product.rank_history = vec![
            HistoryPoint {
                date: chrono::NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
                value: 5000,
            },
            HistoryPoint {
                date: chrono::NaiveDate::from_ymd_opt(2025, 7, 2).unwrap(),
                value: 4100,
            },
        ];
        let keepa = MockKeepaGateway::new().with_product("B00EXAMPL1", product);
        let (processor, repo, _temp) =
            setup(keepa, MockAmazonGateway::new(), MockRakutenGateway::new()).await;
        let job = repo
            .create_job(JobConfig::default(), &[Asin::new("B00EXAMPL1")])
            .await
            .unwrap();
        let mut item = claimed_item(&repo, &job).await;

        processor.process(&job, &mut item).await.unwrap();

        let series = repo
            .list_timeseries(&job.job_id, &item.asin, Metric::Rank)
            .await
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].value, 5000);
    }
}

//! Repository layer: all SQL for jobs, items, candidates and timeseries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use crate::domain::item::{
    AmazonFields, CatalogFields, ProfitFields, RakutenFields, RankingFields, SeasonalityFields,
    SellerFields,
};
use crate::domain::{
    Asin, JanCode, JobConfig, JobCounters, JobId, JobStatus, MatchOutcome, MatchType, Metric,
    ModelNumber, ProcessStatus, RakutenCandidate, ResearchItem, ResearchJob, RiskFlags,
    ShippingStatus, TimeseriesPoint, TsSource, Verdict,
};

/// Filters for listing a job's items.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub verdict: Option<Verdict>,
    pub is_candidate: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // ----- jobs -----

    /// Insert a job and one PENDING item per ASIN. Duplicates are dropped
    /// preserving first occurrence; total_count reflects the deduped set.
    pub async fn create_job(
        &self,
        config: JobConfig,
        asins: &[Asin],
    ) -> Result<ResearchJob, sqlx::Error> {
        let mut unique: Vec<&Asin> = Vec::new();
        for asin in asins {
            if !unique.iter().any(|a| *a == asin) {
                unique.push(asin);
            }
        }

        let job = ResearchJob::create(config, unique.len() as i64);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO research_job (
                job_id, status,
                point_rate_normal, point_rate_spu, point_rate_total,
                threshold_profit_amount, threshold_profit_rate,
                threshold_rank, threshold_sales_30,
                total_count, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.job_id.as_str())
        .bind(job.status.as_str())
        .bind(job.config.point_rate_normal.to_string())
        .bind(job.config.point_rate_spu.to_string())
        .bind(job.config.point_rate_total.to_string())
        .bind(job.config.threshold_profit_amount)
        .bind(job.config.threshold_profit_rate.to_string())
        .bind(job.config.threshold_rank)
        .bind(job.config.threshold_sales_30)
        .bind(job.counters.total_count)
        .bind(job.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        for asin in unique {
            sqlx::query(
                "INSERT INTO research_item (job_id, asin, process_status) VALUES (?, ?, 'PENDING')",
            )
            .bind(job.job_id.as_str())
            .bind(asin.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(job)
    }

    pub async fn load_job(&self, job_id: &JobId) -> Result<Option<ResearchJob>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM research_job WHERE job_id = ?")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| job_from_row(&r)))
    }

    pub async fn list_jobs(&self, limit: i64, offset: i64) -> Result<Vec<ResearchJob>, sqlx::Error> {
        let rows =
            sqlx::query("SELECT * FROM research_job ORDER BY created_at DESC LIMIT ? OFFSET ?")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    /// Set the job status, stamping started_at / completed_at on the
    /// RUNNING and terminal transitions.
    pub async fn update_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().timestamp_millis();
        let sql = match status {
            JobStatus::Running => {
                "UPDATE research_job SET status = ?, started_at = COALESCE(started_at, ?) WHERE job_id = ?"
            }
            JobStatus::Done | JobStatus::Failed => {
                "UPDATE research_job SET status = ?, completed_at = ? WHERE job_id = ?"
            }
            JobStatus::Pending => {
                "UPDATE research_job SET status = ?, completed_at = NULL WHERE job_id = ?"
            }
        };

        let mut query = sqlx::query(sql).bind(status.as_str());
        if !matches!(status, JobStatus::Pending) {
            query = query.bind(now);
        }
        query.bind(job_id.as_str()).execute(&self.pool).await?;
        Ok(())
    }

    /// Recompute all rollup counters from item state in a single statement.
    /// Aggregate-from-items, so concurrent completions can never lose an
    /// increment.
    pub async fn update_job_counters(&self, job_id: &JobId) -> Result<JobCounters, sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE research_job SET
                success_count = (SELECT COUNT(*) FROM research_item
                                 WHERE job_id = ?1 AND process_status = 'SUCCESS'),
                fail_count = (SELECT COUNT(*) FROM research_item
                              WHERE job_id = ?1 AND process_status = 'FAILED'),
                skip_count = (SELECT COUNT(*) FROM research_item
                              WHERE job_id = ?1 AND process_status = 'SKIPPED'),
                pass_count = (SELECT COUNT(*) FROM research_item
                              WHERE job_id = ?1 AND process_status = 'SUCCESS'
                                AND pass_status = 'PASS'),
                review_count = (SELECT COUNT(*) FROM research_item
                                WHERE job_id = ?1 AND process_status = 'SUCCESS'
                                  AND pass_status = 'REVIEW')
            WHERE job_id = ?1
            "#,
        )
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await?;

        let job = self.load_job(job_id).await?;
        Ok(job.map(|j| j.counters).unwrap_or_default())
    }

    /// Number of items not yet in a terminal state.
    pub async fn count_unfinished_items(&self, job_id: &JobId) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM research_item
             WHERE job_id = ? AND process_status IN ('PENDING', 'PROCESSING')",
        )
        .bind(job_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    pub async fn delete_job(&self, job_id: &JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM research_job WHERE job_id = ?")
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ----- items -----

    pub async fn get_item(&self, id: i64) -> Result<Option<ResearchItem>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM research_item WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| item_from_row(&r)))
    }

    pub async fn get_item_by_asin(
        &self,
        job_id: &JobId,
        asin: &Asin,
    ) -> Result<Option<ResearchItem>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM research_item WHERE job_id = ? AND asin = ?")
            .bind(job_id.as_str())
            .bind(asin.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| item_from_row(&r)))
    }

    pub async fn list_pending_items(
        &self,
        job_id: &JobId,
        limit: i64,
    ) -> Result<Vec<ResearchItem>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM research_item
             WHERE job_id = ? AND process_status = 'PENDING'
             ORDER BY id ASC LIMIT ?",
        )
        .bind(job_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(item_from_row).collect())
    }

    /// Atomically claim a PENDING item for processing. Returns false when
    /// another worker got there first.
    pub async fn claim_item(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE research_item SET process_status = 'PROCESSING'
             WHERE id = ? AND process_status = 'PENDING'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist the full evaluation state of an item.
    pub async fn save_item(&self, item: &ResearchItem) -> Result<(), sqlx::Error> {
        let risk_json = serde_json::to_string(&item.risk).unwrap_or_else(|_| "[]".to_string());
        let reasons_json =
            serde_json::to_string(&item.reasons).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            UPDATE research_item SET
                process_status = ?, fail_reason = ?,
                title = ?, brand = ?, category = ?, jan_code = ?, model_number = ?,
                amazon_price_fba_lowest = ?, amazon_fee_referral = ?, amazon_fee_fba = ?,
                amazon_fee_other = ?, amazon_fee_total = ?, amazon_payout = ?,
                rakuten_match_outcome = ?, rakuten_item_name = ?, rakuten_shop_name = ?,
                rakuten_item_url = ?, rakuten_price = ?, rakuten_shipping = ?,
                rakuten_shipping_status = ?, rakuten_point = ?, rakuten_cost_gross = ?,
                rakuten_cost_net = ?,
                profit_amount = ?, profit_rate = ?,
                rank_current = ?, rank_avg_30 = ?, rank_avg_90 = ?,
                sales_est_30 = ?, sales_est_90 = ?, sales_est_180 = ?,
                seller_count = ?, fba_seller_count = ?, fba_lowest_seller_count = ?,
                seasonality_flag = ?, seasonality_score = ?, seasonality_note = ?,
                risk_flags = ?, point_rate_override = ?,
                pass_status = ?, pass_fail_reasons = ?,
                fetched_at = ?
            WHERE id = ?
            "#,
        )
        .bind(item.process_status.as_str())
        .bind(&item.fail_reason)
        .bind(&item.catalog.title)
        .bind(&item.catalog.brand)
        .bind(&item.catalog.category)
        .bind(item.catalog.jan_code.as_ref().map(|j| j.as_str()))
        .bind(item.catalog.model_number.as_ref().map(|m| m.as_str()))
        .bind(item.amazon.price_fba_lowest)
        .bind(item.amazon.fee_referral)
        .bind(item.amazon.fee_fba)
        .bind(item.amazon.fee_other)
        .bind(item.amazon.fee_total)
        .bind(item.amazon.payout)
        .bind(item.rakuten.match_outcome.map(|m| m.as_str()))
        .bind(&item.rakuten.item_name)
        .bind(&item.rakuten.shop_name)
        .bind(&item.rakuten.item_url)
        .bind(item.rakuten.price)
        .bind(item.rakuten.shipping)
        .bind(item.rakuten.shipping_status.map(|s| s.as_str()))
        .bind(item.rakuten.point_amount)
        .bind(item.rakuten.cost_gross)
        .bind(item.rakuten.cost_net)
        .bind(item.profit.amount)
        .bind(item.profit.rate.map(|r| r.to_string()))
        .bind(item.ranking.rank_current)
        .bind(item.ranking.rank_avg_30)
        .bind(item.ranking.rank_avg_90)
        .bind(item.ranking.sales_est_30)
        .bind(item.ranking.sales_est_90)
        .bind(item.ranking.sales_est_180)
        .bind(item.sellers.seller_count)
        .bind(item.sellers.fba_seller_count)
        .bind(item.sellers.fba_lowest_seller_count)
        .bind(item.seasonality.flag)
        .bind(item.seasonality.score.map(|s| s.to_string()))
        .bind(&item.seasonality.note)
        .bind(risk_json)
        .bind(item.point_rate_override.map(|r| r.to_string()))
        .bind(item.verdict.map(|v| v.as_str()))
        .bind(reasons_json)
        .bind(item.fetched_at.map(|t| t.timestamp_millis()))
        .bind(item.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_items(
        &self,
        job_id: &JobId,
        filter: &ItemFilter,
    ) -> Result<Vec<ResearchItem>, sqlx::Error> {
        let mut sql = String::from("SELECT * FROM research_item WHERE job_id = ?");
        if filter.verdict.is_some() {
            sql.push_str(" AND pass_status = ?");
        }
        if filter.is_candidate.is_some() {
            sql.push_str(" AND is_candidate = ?");
        }
        // NULL profits sort last either way
        sql.push_str(
            " ORDER BY (profit_amount IS NULL) ASC, profit_amount DESC, id ASC LIMIT ? OFFSET ?",
        );

        let mut query = sqlx::query(&sql).bind(job_id.as_str());
        if let Some(verdict) = filter.verdict {
            query = query.bind(verdict.as_str());
        }
        if let Some(is_candidate) = filter.is_candidate {
            query = query.bind(is_candidate);
        }
        let limit = if filter.limit > 0 { filter.limit } else { 50 };
        query = query.bind(limit).bind(filter.offset);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(item_from_row).collect())
    }

    /// Update the user-controlled island of a (possibly terminal) item.
    pub async fn update_user_fields(
        &self,
        id: i64,
        is_candidate: bool,
        user_memo: Option<&str>,
    ) -> Result<Option<ResearchItem>, sqlx::Error> {
        sqlx::query(
            "UPDATE research_item SET is_candidate = ?, user_memo = COALESCE(?, user_memo) WHERE id = ?",
        )
        .bind(is_candidate)
        .bind(user_memo)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_item(id).await
    }

    /// Reset FAILED items of a job back to PENDING for another run.
    pub async fn retry_failed_items(&self, job_id: &JobId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE research_item SET process_status = 'PENDING', fail_reason = NULL
             WHERE job_id = ? AND process_status = 'FAILED'",
        )
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ----- candidates -----

    /// Replace the stored candidate set for (job, asin).
    pub async fn replace_candidates(
        &self,
        job_id: &JobId,
        asin: &Asin,
        candidates: &[RakutenCandidate],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM rakuten_candidate WHERE job_id = ? AND asin = ?")
            .bind(job_id.as_str())
            .bind(asin.as_str())
            .execute(&mut *tx)
            .await?;

        for candidate in candidates {
            sqlx::query(
                r#"
                INSERT INTO rakuten_candidate (
                    job_id, asin, match_type, match_value,
                    item_code, item_name, item_url, shop_code, shop_name,
                    price, shipping, shipping_status,
                    point_rate, point_rate_used, point_amount, is_chosen
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(candidate.job_id.as_str())
            .bind(candidate.asin.as_str())
            .bind(candidate.match_type.as_str())
            .bind(&candidate.match_value)
            .bind(&candidate.item_code)
            .bind(&candidate.item_name)
            .bind(&candidate.item_url)
            .bind(&candidate.shop_code)
            .bind(&candidate.shop_name)
            .bind(candidate.price)
            .bind(candidate.shipping)
            .bind(candidate.shipping_status.as_str())
            .bind(candidate.point_rate.map(|r| r.to_string()))
            .bind(candidate.point_rate_used.to_string())
            .bind(candidate.point_amount)
            .bind(candidate.is_chosen)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_candidates(
        &self,
        job_id: &JobId,
        asin: &Asin,
    ) -> Result<Vec<RakutenCandidate>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM rakuten_candidate WHERE job_id = ? AND asin = ? ORDER BY id ASC",
        )
        .bind(job_id.as_str())
        .bind(asin.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(candidate_from_row).collect())
    }

    // ----- timeseries -----

    /// Append observations. Existing (job, asin, metric, date) rows are
    /// kept untouched; the series is append-only.
    pub async fn append_timeseries(&self, points: &[TimeseriesPoint]) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;
        for point in points {
            let result = sqlx::query(
                r#"
                INSERT INTO research_timeseries (job_id, asin, metric, recorded_date, value, source)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(job_id, asin, metric, recorded_date) DO NOTHING
                "#,
            )
            .bind(point.job_id.as_str())
            .bind(point.asin.as_str())
            .bind(point.metric.as_str())
            .bind(point.recorded_date.to_string())
            .bind(point.value)
            .bind(point.source.as_str())
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    pub async fn list_timeseries(
        &self,
        job_id: &JobId,
        asin: &Asin,
        metric: Metric,
    ) -> Result<Vec<TimeseriesPoint>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM research_timeseries
             WHERE job_id = ? AND asin = ? AND metric = ?
             ORDER BY recorded_date ASC",
        )
        .bind(job_id.as_str())
        .bind(asin.as_str())
        .bind(metric.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let date_str: String = row.get("recorded_date");
                Some(TimeseriesPoint {
                    job_id: JobId::new(row.get("job_id")),
                    asin: Asin::new(row.get::<String, _>("asin").as_str()),
                    metric: Metric::parse(row.get::<String, _>("metric").as_str())?,
                    recorded_date: NaiveDate::from_str(&date_str).ok()?,
                    value: row.get("value"),
                    source: TsSource::parse(row.get::<String, _>("source").as_str())?,
                })
            })
            .collect())
    }
}

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn decimal_col(row: &SqliteRow, name: &str) -> Option<Decimal> {
    row.get::<Option<String>, _>(name)
        .and_then(|s| Decimal::from_str(&s).ok())
}

fn job_from_row(row: &SqliteRow) -> ResearchJob {
    let config = JobConfig {
        point_rate_normal: decimal_col(row, "point_rate_normal").unwrap_or_default(),
        point_rate_spu: decimal_col(row, "point_rate_spu").unwrap_or_default(),
        point_rate_total: decimal_col(row, "point_rate_total").unwrap_or_default(),
        threshold_profit_amount: row.get("threshold_profit_amount"),
        threshold_profit_rate: decimal_col(row, "threshold_profit_rate").unwrap_or_default(),
        threshold_rank: row.get("threshold_rank"),
        threshold_sales_30: row.get("threshold_sales_30"),
    };

    ResearchJob {
        job_id: JobId::new(row.get("job_id")),
        status: JobStatus::parse(row.get::<String, _>("status").as_str())
            .unwrap_or(JobStatus::Pending),
        config,
        counters: JobCounters {
            total_count: row.get("total_count"),
            success_count: row.get("success_count"),
            fail_count: row.get("fail_count"),
            skip_count: row.get("skip_count"),
            review_count: row.get("review_count"),
            pass_count: row.get("pass_count"),
        },
        created_at: ms_to_datetime(row.get("created_at")),
        started_at: row
            .get::<Option<i64>, _>("started_at")
            .map(ms_to_datetime),
        completed_at: row
            .get::<Option<i64>, _>("completed_at")
            .map(ms_to_datetime),
    }
}

fn item_from_row(row: &SqliteRow) -> ResearchItem {
    let risk: RiskFlags = row
        .get::<Option<String>, _>("risk_flags")
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    let reasons = row
        .get::<Option<String>, _>("pass_fail_reasons")
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    ResearchItem {
        id: row.get("id"),
        job_id: JobId::new(row.get("job_id")),
        asin: Asin::new(row.get::<String, _>("asin").as_str()),
        process_status: ProcessStatus::parse(row.get::<String, _>("process_status").as_str())
            .unwrap_or(ProcessStatus::Pending),
        fail_reason: row.get("fail_reason"),
        catalog: CatalogFields {
            title: row.get("title"),
            brand: row.get("brand"),
            category: row.get("category"),
            jan_code: row
                .get::<Option<String>, _>("jan_code")
                .map(|s| JanCode::new(&s)),
            model_number: row
                .get::<Option<String>, _>("model_number")
                .map(|s| ModelNumber::new(&s)),
        },
        amazon: AmazonFields {
            price_fba_lowest: row.get("amazon_price_fba_lowest"),
            fee_referral: row.get("amazon_fee_referral"),
            fee_fba: row.get("amazon_fee_fba"),
            fee_other: row.get("amazon_fee_other"),
            fee_total: row.get("amazon_fee_total"),
            payout: row.get("amazon_payout"),
        },
        rakuten: RakutenFields {
            match_outcome: row
                .get::<Option<String>, _>("rakuten_match_outcome")
                .and_then(|s| MatchOutcome::parse(&s)),
            item_name: row.get("rakuten_item_name"),
            shop_name: row.get("rakuten_shop_name"),
            item_url: row.get("rakuten_item_url"),
            price: row.get("rakuten_price"),
            shipping: row.get("rakuten_shipping"),
            shipping_status: row
                .get::<Option<String>, _>("rakuten_shipping_status")
                .and_then(|s| ShippingStatus::parse(&s)),
            point_amount: row.get("rakuten_point"),
            cost_gross: row.get("rakuten_cost_gross"),
            cost_net: row.get("rakuten_cost_net"),
        },
        profit: ProfitFields {
            amount: row.get("profit_amount"),
            rate: decimal_col(row, "profit_rate"),
        },
        ranking: RankingFields {
            rank_current: row.get("rank_current"),
            rank_avg_30: row.get("rank_avg_30"),
            rank_avg_90: row.get("rank_avg_90"),
            sales_est_30: row.get("sales_est_30"),
            sales_est_90: row.get("sales_est_90"),
            sales_est_180: row.get("sales_est_180"),
        },
        sellers: SellerFields {
            seller_count: row.get("seller_count"),
            fba_seller_count: row.get("fba_seller_count"),
            fba_lowest_seller_count: row.get("fba_lowest_seller_count"),
        },
        seasonality: SeasonalityFields {
            flag: row.get("seasonality_flag"),
            score: decimal_col(row, "seasonality_score"),
            note: row.get("seasonality_note"),
        },
        risk,
        point_rate_override: decimal_col(row, "point_rate_override"),
        verdict: row
            .get::<Option<String>, _>("pass_status")
            .and_then(|s| Verdict::parse(&s)),
        reasons,
        is_candidate: row.get("is_candidate"),
        user_memo: row.get("user_memo"),
        fetched_at: row
            .get::<Option<i64>, _>("fetched_at")
            .map(ms_to_datetime),
    }
}

fn candidate_from_row(row: &SqliteRow) -> RakutenCandidate {
    RakutenCandidate {
        job_id: JobId::new(row.get("job_id")),
        asin: Asin::new(row.get::<String, _>("asin").as_str()),
        match_type: MatchType::parse(row.get::<String, _>("match_type").as_str())
            .unwrap_or(MatchType::Keyword),
        match_value: row.get("match_value"),
        item_code: row.get("item_code"),
        item_name: row.get("item_name"),
        item_url: row.get("item_url"),
        shop_code: row.get("shop_code"),
        shop_name: row.get("shop_name"),
        price: row.get("price"),
        shipping: row.get("shipping"),
        shipping_status: ShippingStatus::parse(row.get::<String, _>("shipping_status").as_str())
            .unwrap_or(ShippingStatus::Unknown),
        point_rate: decimal_col(row, "point_rate"),
        point_rate_used: decimal_col(row, "point_rate_used").unwrap_or_default(),
        point_amount: row.get("point_amount"),
        is_chosen: row.get("is_chosen"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::{Provenance, Reason, RiskKind};
    use tempfile::TempDir;

    async fn setup_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn asins(list: &[&str]) -> Vec<Asin> {
        list.iter().map(|a| Asin::new(a)).collect()
    }

    #[tokio::test]
    async fn test_create_job_dedupes_asins() {
        let (repo, _temp) = setup_repo().await;
        let job = repo
            .create_job(
                JobConfig::default(),
                &asins(&["B00EXAMPL1", "B00EXAMPL2", "B00EXAMPL1"]),
            )
            .await
            .expect("create failed");

        assert_eq!(job.counters.total_count, 2);
        let pending = repo.list_pending_items(&job.job_id, 100).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].asin.as_str(), "B00EXAMPL1");
    }

    #[tokio::test]
    async fn test_load_job_round_trips_config() {
        let (repo, _temp) = setup_repo().await;
        let job = repo
            .create_job(JobConfig::default(), &asins(&["B00EXAMPL1"]))
            .await
            .unwrap();

        let loaded = repo.load_job(&job.job_id).await.unwrap().expect("missing");
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.config, job.config);
        assert_eq!(loaded.counters.total_count, 1);
    }

    #[tokio::test]
    async fn test_claim_item_is_exclusive() {
        let (repo, _temp) = setup_repo().await;
        let job = repo
            .create_job(JobConfig::default(), &asins(&["B00EXAMPL1"]))
            .await
            .unwrap();
        let items = repo.list_pending_items(&job.job_id, 10).await.unwrap();

        assert!(repo.claim_item(items[0].id).await.unwrap());
        assert!(!repo.claim_item(items[0].id).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_item_round_trips_fields() {
        let (repo, _temp) = setup_repo().await;
        let job = repo
            .create_job(JobConfig::default(), &asins(&["B00EXAMPL1"]))
            .await
            .unwrap();
        let mut item = repo
            .list_pending_items(&job.job_id, 10)
            .await
            .unwrap()
            .remove(0);

        item.process_status = ProcessStatus::Success;
        item.catalog.title = Some("Example Widget".to_string());
        item.catalog.jan_code = Some(JanCode::new("4902370536485"));
        item.amazon.price_fba_lowest = Some(3000);
        item.amazon.fee_total = Some(900);
        item.amazon.payout = Some(2100);
        item.rakuten.match_outcome = Some(MatchOutcome::Jan);
        item.rakuten.price = Some(1200);
        item.rakuten.shipping_status = Some(ShippingStatus::Free);
        item.profit.amount = Some(996);
        item.profit.rate = Some(Decimal::from_str("0.4743").unwrap());
        item.risk
            .record(RiskKind::Hazardous, true, Provenance::Auto);
        item.verdict = Some(Verdict::Fail);
        item.reasons = vec![Reason::ProfitAmountBelow {
            actual: 996,
            threshold: 1000,
        }];
        item.fetched_at = Some(Utc::now());

        repo.save_item(&item).await.expect("save failed");

        let loaded = repo.get_item(item.id).await.unwrap().expect("missing");
        assert_eq!(loaded.process_status, ProcessStatus::Success);
        assert_eq!(loaded.catalog.title.as_deref(), Some("Example Widget"));
        assert_eq!(loaded.amazon.payout, Some(2100));
        assert_eq!(loaded.rakuten.match_outcome, Some(MatchOutcome::Jan));
        assert_eq!(
            loaded.profit.rate,
            Some(Decimal::from_str("0.4743").unwrap())
        );
        assert_eq!(loaded.risk.get(RiskKind::Hazardous).value, Some(true));
        assert_eq!(loaded.verdict, Some(Verdict::Fail));
        assert_eq!(loaded.reasons, item.reasons);
    }

    #[tokio::test]
    async fn test_update_job_counters_aggregates_item_states() {
        let (repo, _temp) = setup_repo().await;
        let job = repo
            .create_job(
                JobConfig::default(),
                &asins(&["B00EXAMPL1", "B00EXAMPL2", "B00EXAMPL3", "B00EXAMPL4"]),
            )
            .await
            .unwrap();

        let mut items = repo.list_pending_items(&job.job_id, 10).await.unwrap();

        items[0].process_status = ProcessStatus::Success;
        items[0].verdict = Some(Verdict::Pass);
        items[1].process_status = ProcessStatus::Success;
        items[1].verdict = Some(Verdict::Review);
        items[2].process_status = ProcessStatus::Failed;
        items[2].fail_reason = Some("boom".to_string());
        items[3].process_status = ProcessStatus::Skipped;
        for item in &items {
            repo.save_item(item).await.unwrap();
        }

        let counters = repo.update_job_counters(&job.job_id).await.unwrap();
        assert_eq!(counters.total_count, 4);
        assert_eq!(counters.success_count, 2);
        assert_eq!(counters.fail_count, 1);
        assert_eq!(counters.skip_count, 1);
        assert_eq!(counters.pass_count, 1);
        assert_eq!(counters.review_count, 1);
        // success + fail + skip == total once all items are terminal
        assert_eq!(
            counters.success_count + counters.fail_count + counters.skip_count,
            counters.total_count
        );
    }

    #[tokio::test]
    async fn test_replace_candidates_round_trip() {
        let (repo, _temp) = setup_repo().await;
        let job = repo
            .create_job(JobConfig::default(), &asins(&["B00EXAMPL1"]))
            .await
            .unwrap();
        let asin = Asin::new("B00EXAMPL1");

        let candidate = RakutenCandidate {
            job_id: job.job_id.clone(),
            asin: asin.clone(),
            match_type: MatchType::Jan,
            match_value: Some("4902370536485".to_string()),
            item_code: Some("shop:10001".to_string()),
            item_name: Some("Example Widget".to_string()),
            item_url: None,
            shop_code: None,
            shop_name: Some("Example Shop".to_string()),
            price: 1200,
            shipping: None,
            shipping_status: ShippingStatus::Free,
            point_rate: None,
            point_rate_used: Decimal::from_str("0.08").unwrap(),
            point_amount: 96,
            is_chosen: true,
        };

        repo.replace_candidates(&job.job_id, &asin, &[candidate.clone()])
            .await
            .unwrap();
        // replacing again must not duplicate
        repo.replace_candidates(&job.job_id, &asin, &[candidate.clone()])
            .await
            .unwrap();

        let stored = repo.list_candidates(&job.job_id, &asin).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], candidate);
    }

    #[tokio::test]
    async fn test_timeseries_append_only() {
        let (repo, _temp) = setup_repo().await;
        let job = repo
            .create_job(JobConfig::default(), &asins(&["B00EXAMPL1"]))
            .await
            .unwrap();

        let point = TimeseriesPoint {
            job_id: job.job_id.clone(),
            asin: Asin::new("B00EXAMPL1"),
            metric: Metric::Rank,
            recorded_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            value: 4200,
            source: TsSource::Keepa,
        };

        assert_eq!(repo.append_timeseries(&[point.clone()]).await.unwrap(), 1);
        // same (job, asin, metric, date) is kept, not overwritten
        let mut updated = point.clone();
        updated.value = 9999;
        assert_eq!(repo.append_timeseries(&[updated]).await.unwrap(), 0);

        let series = repo
            .list_timeseries(&job.job_id, &point.asin, Metric::Rank)
            .await
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].value, 4200);
    }

    #[tokio::test]
    async fn test_retry_failed_items_resets_to_pending() {
        let (repo, _temp) = setup_repo().await;
        let job = repo
            .create_job(JobConfig::default(), &asins(&["B00EXAMPL1"]))
            .await
            .unwrap();
        let mut item = repo
            .list_pending_items(&job.job_id, 10)
            .await
            .unwrap()
            .remove(0);
        item.process_status = ProcessStatus::Failed;
        item.fail_reason = Some("rate limited".to_string());
        repo.save_item(&item).await.unwrap();

        let reset = repo.retry_failed_items(&job.job_id).await.unwrap();
        assert_eq!(reset, 1);

        let reloaded = repo.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(reloaded.process_status, ProcessStatus::Pending);
        assert_eq!(reloaded.fail_reason, None);
    }

    #[tokio::test]
    async fn test_list_items_filters_by_verdict() {
        let (repo, _temp) = setup_repo().await;
        let job = repo
            .create_job(JobConfig::default(), &asins(&["B00EXAMPL1", "B00EXAMPL2"]))
            .await
            .unwrap();
        let mut items = repo.list_pending_items(&job.job_id, 10).await.unwrap();
        items[0].process_status = ProcessStatus::Success;
        items[0].verdict = Some(Verdict::Pass);
        items[0].profit.amount = Some(1200);
        items[1].process_status = ProcessStatus::Success;
        items[1].verdict = Some(Verdict::Fail);
        for item in &items {
            repo.save_item(item).await.unwrap();
        }

        let passed = repo
            .list_items(
                &job.job_id,
                &ItemFilter {
                    verdict: Some(Verdict::Pass),
                    ..ItemFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].verdict, Some(Verdict::Pass));
    }

    #[tokio::test]
    async fn test_user_fields_survive_on_terminal_item() {
        let (repo, _temp) = setup_repo().await;
        let job = repo
            .create_job(JobConfig::default(), &asins(&["B00EXAMPL1"]))
            .await
            .unwrap();
        let mut item = repo
            .list_pending_items(&job.job_id, 10)
            .await
            .unwrap()
            .remove(0);
        item.process_status = ProcessStatus::Success;
        repo.save_item(&item).await.unwrap();

        let updated = repo
            .update_user_fields(item.id, true, Some("buy 3 units"))
            .await
            .unwrap()
            .unwrap();
        assert!(updated.is_candidate);
        assert_eq!(updated.user_memo.as_deref(), Some("buy 3 units"));

        // memo untouched when None is passed
        let updated = repo
            .update_user_fields(item.id, false, None)
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.is_candidate);
        assert_eq!(updated.user_memo.as_deref(), Some("buy 3 units"));
    }

    #[tokio::test]
    async fn test_delete_job_cascades() {
        let (repo, _temp) = setup_repo().await;
        let job = repo
            .create_job(JobConfig::default(), &asins(&["B00EXAMPL1"]))
            .await
            .unwrap();

        assert!(repo.delete_job(&job.job_id).await.unwrap());
        assert!(repo.load_job(&job.job_id).await.unwrap().is_none());
        let items = repo.list_pending_items(&job.job_id, 10).await.unwrap();
        assert!(items.is_empty());
    }
}

use axum::extract::{Path, Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::api::AppState;
use crate::domain::{Asin, JobConfig, JobId, ResearchJob};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    /// ASIN list as a JSON array.
    #[serde(default)]
    pub asins: Vec<String>,
    /// Alternatively (or additionally), an ASIN list as CSV text with the
    /// ASIN in the first column.
    pub asins_csv: Option<String>,
    pub point_rate_normal: Option<Decimal>,
    pub point_rate_spu: Option<Decimal>,
    pub threshold_profit_amount: Option<i64>,
    pub threshold_profit_rate: Option<Decimal>,
    pub threshold_rank: Option<i64>,
    pub threshold_sales_30: Option<i64>,
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<Json<ResearchJob>, AppError> {
    let mut raw_asins = request.asins.clone();
    if let Some(csv_text) = &request.asins_csv {
        raw_asins.extend(parse_asin_csv(csv_text)?);
    }

    let asins: Vec<Asin> = raw_asins
        .iter()
        .map(|raw| Asin::new(raw))
        .filter(|asin| !asin.as_str().is_empty())
        .collect();
    if asins.is_empty() {
        return Err(AppError::BadRequest("no ASINs supplied".to_string()));
    }

    let config = build_config(&state.config.default_job_config(), &request)?;
    let job = state.repo.create_job(config, &asins).await?;
    Ok(Json(job))
}

fn build_config(
    defaults: &JobConfig,
    request: &CreateJobRequest,
) -> Result<JobConfig, AppError> {
    let config = JobConfig::new(
        request
            .point_rate_normal
            .unwrap_or(defaults.point_rate_normal),
        request.point_rate_spu.unwrap_or(defaults.point_rate_spu),
        request
            .threshold_profit_amount
            .unwrap_or(defaults.threshold_profit_amount),
        request
            .threshold_profit_rate
            .unwrap_or(defaults.threshold_profit_rate),
        request.threshold_rank.unwrap_or(defaults.threshold_rank),
        request
            .threshold_sales_30
            .unwrap_or(defaults.threshold_sales_30),
    );

    if config.point_rate_normal.is_sign_negative()
        || config.point_rate_spu.is_sign_negative()
        || config.point_rate_total >= Decimal::ONE
    {
        return Err(AppError::BadRequest(
            "point rates must be non-negative and total below 1.0".to_string(),
        ));
    }
    if config.threshold_rank <= 0 || config.threshold_sales_30 < 0 {
        return Err(AppError::BadRequest(
            "thresholds must be positive".to_string(),
        ));
    }

    Ok(config)
}

/// Parse ASINs out of pasted CSV: first column, header-less, blank rows
/// skipped.
fn parse_asin_csv(text: &str) -> Result<Vec<String>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut asins = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| AppError::BadRequest(format!("invalid CSV: {}", e)))?;
        if let Some(field) = record.get(0) {
            let trimmed = field.trim();
            if !trimmed.is_empty() {
                asins.push(trimmed.to_string());
            }
        }
    }
    Ok(asins)
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<ResearchJob>>, AppError> {
    let jobs = state
        .repo
        .list_jobs(query.limit.unwrap_or(50), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ResearchJob>, AppError> {
    let job_id = JobId::new(job_id);
    let job = state
        .repo
        .load_job(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
    Ok(Json(job))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let job_id = JobId::new(job_id);
    if !state.repo.delete_job(&job_id).await? {
        return Err(AppError::NotFound(format!("job {}", job_id)));
    }
    Ok(Json(json!({ "deleted": true })))
}

/// Kick off a background run over the job's pending items. One run per job
/// at a time.
pub async fn run_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let job_id = JobId::new(job_id);
    state
        .repo
        .load_job(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;

    let cancel = state
        .active_runs
        .register(&job_id)
        .ok_or_else(|| AppError::Conflict(format!("job {} is already running", job_id)))?;

    let runner = state.runner.clone();
    let active_runs = state.active_runs.clone();
    let spawned_id = job_id.clone();
    tokio::spawn(async move {
        let result = runner.run(&spawned_id, cancel).await;
        active_runs.finish(&spawned_id);
        if let Err(e) = result {
            error!("job {} run failed: {}", spawned_id, e);
        }
    });

    Ok(Json(json!({ "job_id": job_id.as_str(), "status": "RUNNING" })))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let job_id = JobId::new(job_id);
    if !state.active_runs.cancel(&job_id) {
        return Err(AppError::NotFound(format!(
            "no active run for job {}",
            job_id
        )));
    }
    Ok(Json(json!({ "cancelling": true })))
}

pub async fn retry_failed(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let job_id = JobId::new(job_id);
    state
        .repo
        .load_job(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;

    let reset = state.repo.retry_failed_items(&job_id).await?;
    Ok(Json(json!({ "reset": reset })))
}

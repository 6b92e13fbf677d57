use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::AppState;
use crate::db::ItemFilter;
use crate::domain::{JobId, ResearchItem, Verdict};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ListItemsQuery {
    /// PASS / FAIL / REVIEW
    pub verdict: Option<String>,
    pub is_candidate: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_items(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<ListItemsQuery>,
) -> Result<Json<Vec<ResearchItem>>, AppError> {
    let job_id = JobId::new(job_id);
    state
        .repo
        .load_job(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;

    let verdict = match &query.verdict {
        Some(raw) => Some(
            Verdict::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("invalid verdict: {}", raw)))?,
        ),
        None => None,
    };

    let filter = ItemFilter {
        verdict,
        is_candidate: query.is_candidate,
        limit: query.limit.unwrap_or(50),
        offset: query.offset.unwrap_or(0),
    };

    let items = state.repo.list_items(&job_id, &filter).await?;
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub is_candidate: bool,
    pub user_memo: Option<String>,
}

/// Only the user-controlled island is writable here; evaluation fields of
/// a terminal item stay frozen.
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<ResearchItem>, AppError> {
    let item = state
        .repo
        .update_user_fields(id, request.is_candidate, request.user_memo.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("item {}", id)))?;
    Ok(Json(item))
}

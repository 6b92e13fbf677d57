//! Thin HTTP surface over the repository and job runner. No business
//! logic lives here.

pub mod health;
pub mod items;
pub mod jobs;

use axum::routing::{get, patch, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db::Repository;
use crate::pipeline::{ActiveRuns, JobRunner};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub runner: Arc<JobRunner>,
    pub active_runs: ActiveRuns,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config, runner: Arc<JobRunner>) -> Self {
        Self {
            repo,
            config,
            runner,
            active_runs: ActiveRuns::new(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/:job_id", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/:job_id/run", post(jobs::run_job))
        .route("/jobs/:job_id/cancel", post(jobs::cancel_job))
        .route("/jobs/:job_id/retry-failed", post(jobs::retry_failed))
        .route("/jobs/:job_id/items", get(items::list_items))
        .route("/items/:id", patch(items::update_item))
        .layer(cors)
        .with_state(state)
}

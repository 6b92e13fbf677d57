pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod provider;

pub use cache::{ApiCache, ApiType, CacheKey};
pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Asin, JanCode, JobConfig, JobId, JobStatus, MatchType, ModelNumber, ProcessStatus,
    RakutenCandidate, ResearchItem, ResearchJob, ShippingStatus, Verdict,
};
pub use error::AppError;
pub use pipeline::{ActiveRuns, CancelFlag, ItemProcessor, JobRunner};
pub use provider::{AmazonGateway, KeepaGateway, ProviderError, RakutenGateway};

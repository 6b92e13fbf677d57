use std::net::SocketAddr;
use std::sync::Arc;

use sedori::api;
use sedori::cache::ApiCache;
use sedori::config::Config;
use sedori::db::init_db;
use sedori::pipeline::{ItemProcessor, JobRunner};
use sedori::provider::{
    AmazonGateway, KeepaGateway, KeepaHttpGateway, RakutenGateway, RakutenHttpGateway,
    SpApiHttpGateway,
};
use sedori::Repository;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool.clone()));

    // One cache instance per process, shared by every gateway.
    let cache = ApiCache::new(pool);
    let ttl = chrono::Duration::seconds(config.cache_ttl_seconds);

    let keepa: Arc<dyn KeepaGateway> = Arc::new(KeepaHttpGateway::new(
        config.keepa_api_url.clone(),
        config.keepa_api_key.clone(),
        cache.clone(),
        ttl,
        config.rate_limit_keepa,
    ));
    let amazon: Arc<dyn AmazonGateway> = Arc::new(SpApiHttpGateway::new(
        config.sp_api_base_url.clone(),
        config.sp_api_access_token.clone(),
        config.sp_api_marketplace_id.clone(),
        config.sp_api_seller_id.clone(),
        cache.clone(),
        ttl,
        config.rate_limit_sp_api,
    ));
    let rakuten: Arc<dyn RakutenGateway> = Arc::new(RakutenHttpGateway::new(
        config.rakuten_api_url.clone(),
        config.rakuten_app_id.clone(),
        cache.clone(),
        ttl,
        config.rate_limit_rakuten,
    ));

    // Hourly sweep of expired cache rows; reads already treat them as
    // absent, this just reclaims the space.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        interval.tick().await;
        loop {
            interval.tick().await;
            match cache.evict_expired().await {
                Ok(evicted) if evicted > 0 => {
                    tracing::info!("evicted {} expired cache entries", evicted)
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("cache eviction failed: {}", e),
            }
        }
    });

    let processor = Arc::new(ItemProcessor::new(keepa, amazon, rakuten, repo.clone()));
    let runner = Arc::new(JobRunner::new(
        repo.clone(),
        processor,
        config.pipeline_concurrency,
    ));

    let port = config.port;
    let app = api::create_router(api::AppState::new(repo, config, runner));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

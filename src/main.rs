use anyhow::Context;
use post_curator::{
    api::{build_router, AppState},
    config::Config,
    pipeline::CuratorService,
    scheduler::{init_scheduler_metrics, SchedulerService, TopicJobQueue},
    state::create_stores,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load_validated().context("Failed to load configuration")?;

    init_tracing(&config);

    tracing::info!("Starting post-curator v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = post_curator::metrics::init_metrics() {
            tracing::warn!(error = %e, "Failed to initialize metrics, continuing without them");
        }
        init_scheduler_metrics();
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    // Initialize storage backend
    tracing::info!(backend = ?config.state.backend, "Opening storage backend");
    let stores = create_stores(&config.state)?;

    let service = Arc::new(CuratorService::new(stores, &config)?);

    // Scheduler: per-topic classification, action and training jobs
    let mut scheduler = SchedulerService::new(config.scheduler.clone()).await?;
    if config.scheduler.enabled {
        let jobs = scheduler
            .register_curation_jobs(service.clone(), TopicJobQueue::new())
            .await?;
        tracing::info!(jobs = jobs.len(), "Curation jobs registered");
    }
    scheduler.start().await?;

    // HTTP surface: accept/reject links, item records, health, metrics
    let app = build_router(AppState::new(service));
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", http_addr))?;

    tracing::info!(
        address = %http_addr,
        public_base_url = %config.server.public_base_url,
        "HTTP server listening"
    );

    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tokio::select! {
        _ = http_handle => {
            tracing::warn!("HTTP server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Shutting down gracefully...");
    scheduler.shutdown().await?;
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "post_curator={},tower_http=info",
            config.observability.log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

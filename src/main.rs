use std::sync::Arc;

use adreport::{
    build_router,
    config::AppConfig,
    db,
    handlers,
    models::Platform,
    report::PptxRenderer,
    sources::{MetricsSources, PlatformClient, StoredMetrics},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent, env vars may already be set)
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adreport=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env()?;
    tracing::info!("Starting adreport on {}:{}", config.host, config.port);

    // Open SQLite pool and run embedded migrations (files in migrations/)
    let db = db::connect(&config.database_url).await?;

    if let Some((email, password)) = &config.bootstrap_admin {
        handlers::auth::bootstrap_admin(&db, email, password)
            .await
            .map_err(|e| anyhow::anyhow!("failed to create bootstrap admin: {e}"))?;
    }

    // Metric sources: the local store, plus every platform with credentials
    let mut sources = MetricsSources::new(
        Arc::new(StoredMetrics::new(db.clone())),
        config.degrade_on_source_failure,
    );
    for platform in Platform::ALL {
        let platform_config = config.platform(platform);
        if !platform_config.is_configured() {
            tracing::info!(platform = %platform, "no credentials; using stored metrics only");
            continue;
        }
        let client = PlatformClient::new(platform, platform_config, &config.platform_http)?;
        sources = sources.with_platform(Arc::new(client));
        tracing::info!(platform = %platform, "platform metrics enabled");
    }

    let bind_addr = format!("{}:{}", config.host, config.port);

    let state = Arc::new(AppState {
        db,
        config,
        sources,
        renderer: Arc::new(PptxRenderer),
    });

    let app = build_router(state);

    // ── Serve ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

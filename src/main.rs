use anyhow::Context;
use profitledger::store::LedgerStore;
use profitledger::{api, config::Config, db::init_db, ProfitRecomputer, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;

    let pool = init_db(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let repo = Arc::new(Repository::new(pool));
    let store: Arc<dyn LedgerStore> = repo.clone();
    let recomputer = Arc::new(ProfitRecomputer::new(
        store,
        Duration::from_millis(config.recompute_timeout_ms),
    ));

    let addr = SocketAddr::new(config.bind_addr, config.port);
    let app = api::create_router(api::AppState::new(repo, recomputer));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

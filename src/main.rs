use acbtrack::fx::{FxOracle, StoredRateOracle};
use acbtrack::{api, config::Config, db::init_db, LedgerService, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let pool = init_db(&config.database_path).await?;
    let repo = Arc::new(Repository::new(pool));
    let oracle: Arc<dyn FxOracle> =
        Arc::new(StoredRateOracle::new(repo.clone(), config.fx_lookback_days));
    let ledger = Arc::new(LedgerService::new(
        repo.clone(),
        oracle.clone(),
        Duration::from_millis(config.fx_timeout_ms),
    ));

    let app = api::create_router(api::AppState {
        repo,
        ledger,
        oracle,
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

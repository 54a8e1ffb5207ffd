use std::sync::Arc;

use tracing::info;

use bloodlink_api::AppStateInner;
use bloodlink_db::Database;
use bloodlink_gateway::dispatcher::Dispatcher;
use bloodlink_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bloodlink=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    let state = Arc::new(AppStateInner::new(
        db,
        config.jwt_secret.clone(),
        config.token_ttl(),
        Dispatcher::new(),
    ));

    let addr = config.addr()?;
    info!("Bloodlink server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, bloodlink_server::app(state)).await?;

    Ok(())
}

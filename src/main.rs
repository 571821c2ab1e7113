// UBI Directory Server
// Community listings backed by Postgres and the chain metrics indexer

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use ubi_directory::{
    config::Config,
    governance::SubgraphProposalSource,
    indexer::{graphql::GraphqlClient, subgraph::SubgraphClient, MetricsIndexer},
    router,
    service::Directory,
    store::PgStore,
    sync::AcceptanceSync,
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ubi_directory=info".parse()?)
                .add_directive("sqlx=warn".parse()?),
        )
        .init();

    info!("Starting UBI Directory Server");

    // Load configuration
    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Indexer: {}", config.indexer_url);
    info!("  DAO subgraph: {}", config.dao_subgraph_url);
    info!("  Token decimals: {}", config.listing.token_decimals);
    info!("  Server Port: {}", config.port);

    // Initialize database
    let store = PgStore::connect(&config.database_url, config.db_max_connections)
        .await
        .context("database initialization failed")?;

    let timeout = config.listing.request_timeout;
    let indexer: Arc<dyn MetricsIndexer> = Arc::new(SubgraphClient::new(
        GraphqlClient::new(config.indexer_url.clone(), timeout)?,
    ));
    let proposals = Arc::new(SubgraphProposalSource::new(GraphqlClient::new(
        config.dao_subgraph_url.clone(),
        timeout,
    )?));

    let directory = Arc::new(Directory::new(
        Arc::new(store),
        indexer.clone(),
        proposals,
        config.listing.clone(),
    ));

    // Start acceptance sync in background
    let sync = AcceptanceSync::new(directory.clone(), indexer, config.sync_poll_interval);
    tokio::spawn(async move {
        if let Err(e) = sync.run().await {
            tracing::error!("Acceptance sync error: {}", e);
        }
    });

    let app = router(Arc::new(AppState { directory }));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("UBI Directory listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}

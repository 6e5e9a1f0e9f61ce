use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::router;
use crate::store::{DedupStore, MemoryStore, SqliteStore};
use crate::time::SystemTime;

async fn create_store(config: &Config) -> anyhow::Result<Arc<dyn DedupStore + Send + Sync>> {
    if config.memory_store {
        tracing::warn!("using in-memory dedup store, state is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = SqliteStore::open(&config.dedup_db, config.max_db_connections)
        .await
        .with_context(|| format!("failed to open dedup store at {}", config.dedup_db))?;

    Ok(Arc::new(store))
}

/// Run the service until `shutdown` resolves. In-flight requests finish,
/// then the consumer is stopped and the store closed.
pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = create_store(&config).await?;
    let pipeline = Pipeline::start(store, config.queue_capacity);

    let app = router::router(SystemTime {}, &pipeline, config.export_prometheus);

    tracing::info!("listening on {:?}", listener.local_addr()?);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed");

    pipeline.shutdown().await;

    served
}

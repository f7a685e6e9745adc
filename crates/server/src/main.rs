//! # SiltKV server binary
//!
//! Loads [`config::Config`] from the environment, replays the WAL, starts the
//! background maintenance task and serves the HTTP API until Ctrl+C.
//!
//! ```text
//! $ DATA_DIR=/var/lib/silt LISTEN_ADDR=0.0.0.0:3000 \
//!   REPLICATION_PEERS=http://10.0.0.2:3000,http://10.0.0.3:3000 \
//!   REPLICATION_ACK=MAJORITY cargo run -p server
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use config::Config;
use engine::{maintenance, Db, NoReplication, Replicate};
use replication::HttpReplicator;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();

    let cfg = Config::from_env().context("invalid configuration")?;

    let replicator: Arc<dyn Replicate> = if cfg.replication_peers.is_empty() {
        Arc::new(NoReplication)
    } else {
        Arc::new(HttpReplicator::from_config(&cfg).context("failed to build replication client")?)
    };

    let db = Db::open(&cfg, replicator).context("failed to open storage engine")?;
    {
        let engine = db.lock().await;
        info!(
            data_dir = %cfg.data_dir.display(),
            keys = engine.memtable_len(),
            sstables = engine.sstable_count(),
            peers = cfg.replication_peers.len(),
            ack = %cfg.replication_ack,
            "engine ready"
        );
    }

    let maintenance = maintenance::spawn(db.clone(), (&cfg).into());

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
    info!("listening on http://{}", cfg.listen_addr);

    axum::serve(listener, server::router(db.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    maintenance.abort();
    if let Err(e) = db.flush_wal().await {
        warn!(error = %e, "failed to flush WAL on shutdown");
    }
    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("received Ctrl+C, shutting down");
}

//! # Replication - leader-to-follower write propagation
//!
//! [`HttpReplicator`] implements [`engine::Replicate`] by POSTing JSON to
//! every configured peer:
//!
//! | Call              | Endpoint                     | Body               |
//! |-------------------|------------------------------|--------------------|
//! | `replicate`       | `<peer>/replicate/append`      | one `WalRecord`    |
//! | `replicate_batch` | `<peer>/replicate/appendBatch` | `{"recs":[...]}`   |
//!
//! Any 2xx response is an acknowledgment. Followers apply what they receive
//! through the engine's replica ingestion path, which never replicates again.
//!
//! ## Ack modes
//!
//! - `ASYNC`: one detached task per peer; the call returns immediately.
//! - `MAJORITY`: all peers are contacted concurrently and every response is
//!   awaited (there is no timeout). The write is considered replicated once
//!   `peers/2 + 1` nodes hold it, counting the leader. A shortfall is logged
//!   and never fails the write.

use async_trait::async_trait;
use config::{AckMode, Config};
use engine::Replicate;
use futures_util::stream::{FuturesUnordered, StreamExt};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use wal::WalRecord;

pub const APPEND_PATH: &str = "/replicate/append";
pub const APPEND_BATCH_PATH: &str = "/replicate/appendBatch";

/// Body of an `appendBatch` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaBatch {
    #[serde(default)]
    pub recs: Vec<WalRecord>,
}

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("peer {url} answered {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to encode replication payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Acknowledgments needed for a majority of `peers` followers plus the
/// leader.
#[must_use]
pub fn quorum(peers: usize) -> usize {
    peers / 2 + 1
}

/// Whether `peer_acks` acknowledgments plus the leader's own copy reach
/// [`quorum`].
#[must_use]
pub fn quorum_met(peer_acks: usize, peers: usize) -> bool {
    peer_acks + 1 >= quorum(peers)
}

/// HTTP fan-out to follower nodes.
#[derive(Clone)]
pub struct HttpReplicator {
    client: reqwest::Client,
    peers: Vec<String>,
    mode: AckMode,
}

impl std::fmt::Debug for HttpReplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReplicator")
            .field("peers", &self.peers)
            .field("mode", &self.mode)
            .finish()
    }
}

impl HttpReplicator {
    /// `peers` are base URLs such as `http://10.0.0.2:3000`.
    pub fn new(peers: Vec<String>, mode: AckMode) -> Result<Self, ReplicationError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(16)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|source| ReplicationError::Http {
                url: String::new(),
                source,
            })?;

        let peers = peers
            .into_iter()
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();

        Ok(Self {
            client,
            peers,
            mode,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ReplicationError> {
        Self::new(cfg.replication_peers.clone(), cfg.replication_ack)
    }

    #[must_use]
    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    #[must_use]
    pub fn mode(&self) -> AckMode {
        self.mode
    }

    /// Sends `body` to every peer at `path` according to the ack mode.
    ///
    /// Returns the number of peer acknowledgments in `MAJORITY` mode, and 0
    /// in `ASYNC` mode (nothing is awaited).
    pub async fn broadcast<T: Serialize + ?Sized>(&self, path: &'static str, body: &T) -> usize {
        if self.peers.is_empty() {
            return 0;
        }
        let payload = match serde_json::to_vec(body) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to encode replication payload");
                return 0;
            }
        };

        match self.mode {
            AckMode::Async => {
                for peer in &self.peers {
                    let client = self.client.clone();
                    let url = format!("{}{}", peer, path);
                    let payload = payload.clone();
                    tokio::spawn(async move {
                        if let Err(e) = post(&client, &url, payload).await {
                            warn!(error = %e, "async replication failed");
                        }
                    });
                }
                0
            }
            AckMode::Majority => {
                let mut pending: FuturesUnordered<_> = self
                    .peers
                    .iter()
                    .map(|peer| {
                        let url = format!("{}{}", peer, path);
                        let payload = payload.clone();
                        async move { post(&self.client, &url, payload).await }
                    })
                    .collect();

                let mut acks = 0;
                while let Some(result) = pending.next().await {
                    match result {
                        Ok(()) => acks += 1,
                        Err(e) => warn!(error = %e, "replication to peer failed"),
                    }
                }

                if quorum_met(acks, self.peers.len()) {
                    debug!(acks, peers = self.peers.len(), "replication quorum reached");
                } else {
                    warn!(
                        acks = acks + 1,
                        needed = quorum(self.peers.len()),
                        peers = self.peers.len(),
                        "replication quorum not met"
                    );
                }
                acks
            }
        }
    }
}

#[async_trait]
impl Replicate for HttpReplicator {
    async fn replicate(&self, record: &WalRecord) {
        self.broadcast(APPEND_PATH, record).await;
    }

    async fn replicate_batch(&self, records: &[WalRecord]) {
        #[derive(Serialize)]
        struct BatchRef<'a> {
            recs: &'a [WalRecord],
        }
        self.broadcast(APPEND_BATCH_PATH, &BatchRef { recs: records })
            .await;
    }
}

async fn post(client: &reqwest::Client, url: &str, payload: Vec<u8>) -> Result<(), ReplicationError> {
    let resp = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(payload)
        .send()
        .await
        .map_err(|source| ReplicationError::Http {
            url: url.to_string(),
            source,
        })?;

    if !resp.status().is_success() {
        return Err(ReplicationError::Status {
            url: url.to_string(),
            status: resp.status(),
        });
    }
    Ok(())
}

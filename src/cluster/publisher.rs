use std::sync::Arc;
use std::time::Duration;

use serenity::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::cluster::snapshot::ClusterSnapshot;
use crate::cluster::store::StatusStore;
use crate::errors::TransportResult;

/// Channel that carries snapshots between cluster processes.
#[async_trait]
pub trait SnapshotTransport: Send + Sync {
    async fn broadcast(&self, snapshot: &ClusterSnapshot) -> TransportResult<()>;
    async fn fetch_all(&self) -> TransportResult<Vec<ClusterSnapshot>>;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct PublishReport {
    pub broadcast: bool,
    pub accepted_remote: usize,
}

pub struct Publisher {
    store: Arc<StatusStore>,
    transport: Arc<dyn SnapshotTransport>,
    refresh_timeout: Duration,
}

impl Publisher {
    pub fn new(store: Arc<StatusStore>, transport: Arc<dyn SnapshotTransport>, refresh_timeout: Duration) -> Self {
        Publisher { store, transport, refresh_timeout }
    }

    /// Stores and broadcasts the local snapshot, then pulls everyone else's.
    #[tracing::instrument(skip(self), fields(cluster = self.store.local_cluster_id()))]
    pub async fn publish_once(&self) -> PublishReport {
        let local = self.store.refresh_local().await;

        let broadcast = match timeout(self.refresh_timeout, self.transport.broadcast(&local)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!("Failed to broadcast snapshot: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!("Broadcasting snapshot timed out after {:?}", self.refresh_timeout);
                false
            }
        };

        let accepted_remote = self.refresh_now(self.refresh_timeout).await;
        PublishReport { broadcast, accepted_remote }
    }

    /// Pulls remote snapshots into the store, keeping the cached ones if the transport fails or times out.
    #[tracing::instrument(skip(self), fields(cluster = self.store.local_cluster_id()))]
    pub async fn refresh_now(&self, budget: Duration) -> usize {
        let remote = match timeout(budget, self.transport.fetch_all()).await {
            Ok(Ok(remote)) => remote,
            Ok(Err(e)) => {
                tracing::warn!("Failed to fetch cluster snapshots, using cached ones: {}", e);
                return 0;
            }
            Err(_) => {
                tracing::warn!("Fetching cluster snapshots timed out after {:?}, using cached ones", budget);
                return 0;
            }
        };

        let mut accepted = 0;
        for snapshot in remote {
            // The local entry always comes from this process.
            if snapshot.cluster_id == self.store.local_cluster_id() {
                continue;
            }
            if self.store.publish_snapshot(snapshot).await {
                accepted += 1;
            }
        }
        accepted
    }

    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.publish_once().await;
                tracing::debug!("Published cluster status: {:?}", report);
            }
        })
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cluster::snapshot::{ClusterSnapshot, GlobalStatus};
use crate::cluster::store::StatusStore;
use crate::errors::{StatusError, StatusResult};

/// One line of the per-cluster breakdown.
#[derive(Clone, PartialEq, Debug)]
pub struct ClusterOverview {
    pub cluster_id: String,
    pub guild_count: u64,
    pub member_count: u64,
    pub shard_ids: Vec<u32>,
    pub mean_latency_ms: Option<f64>,
    pub stale: bool,
}

impl ClusterOverview {
    fn from_snapshot(snapshot: &ClusterSnapshot, stale: bool) -> Self {
        ClusterOverview {
            cluster_id: snapshot.cluster_id.clone(),
            guild_count: snapshot.guild_count,
            member_count: snapshot.member_count,
            shard_ids: snapshot.shards.iter().map(|shard| shard.shard_id).collect(),
            mean_latency_ms: snapshot.mean_latency_ms(),
            stale,
        }
    }
}

#[derive(Clone)]
pub struct StatusAggregator {
    store: Arc<StatusStore>,
}

impl StatusAggregator {
    pub fn new(store: Arc<StatusStore>) -> Self {
        StatusAggregator { store }
    }

    #[cfg(test)]
    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    /// Totals over `all_snapshots()`; clusters left out as stale are named, not counted.
    pub async fn aggregate(&self) -> GlobalStatus {
        let snapshots = self.store.all_snapshots().await;
        let mut status = GlobalStatus::from_snapshots(&snapshots);
        status.stale_clusters = self
            .store
            .stale_clusters()
            .await
            .into_iter()
            .filter(|cluster_id| !snapshots.iter().any(|snapshot| &snapshot.cluster_id == cluster_id))
            .collect();
        status
    }

    pub async fn shard_latency(&self, cluster_id: &str, shard_id: u32) -> StatusResult<Option<f64>> {
        if cluster_id == self.store.local_cluster_id() {
            return self.local_shard_latency(shard_id).await;
        }
        let snapshot = self.store.cached(cluster_id).await.ok_or_else(|| StatusError::ShardNotFound {
            cluster_id: cluster_id.to_string(),
            shard_id,
        })?;
        latency_in(&snapshot, shard_id, Utc::now(), self.store.stale_after())
    }

    pub async fn local_shard_latency(&self, shard_id: u32) -> StatusResult<Option<f64>> {
        let snapshot = self.store.refresh_local().await;
        latency_in(&snapshot, shard_id, Utc::now(), self.store.stale_after())
    }

    /// Mean over this cluster's measured shards; other clusters are never mixed in.
    pub async fn local_latency(&self) -> Option<f64> {
        self.store.refresh_local().await.mean_latency_ms()
    }

    pub async fn cluster_overview(&self) -> Vec<ClusterOverview> {
        let view = self.store.view().await;
        let mut rows: Vec<ClusterOverview> = view
            .fresh
            .iter()
            .map(|snapshot| ClusterOverview::from_snapshot(snapshot, false))
            .chain(view.stale.iter().map(|snapshot| ClusterOverview::from_snapshot(snapshot, true)))
            .collect();
        rows.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
        rows
    }
}

fn latency_in(snapshot: &ClusterSnapshot, shard_id: u32, now: DateTime<Utc>, stale_after: chrono::Duration) -> StatusResult<Option<f64>> {
    if snapshot.is_stale(now, stale_after) {
        return Err(StatusError::StaleData {
            cluster_id: snapshot.cluster_id.clone(),
            age_secs: snapshot.age(now).num_seconds(),
        });
    }
    snapshot.shard(shard_id).map(|shard| shard.latency_ms).ok_or_else(|| StatusError::ShardNotFound {
        cluster_id: snapshot.cluster_id.clone(),
        shard_id,
    })
}

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::cluster::local::LocalStatusSource;
use crate::cluster::snapshot::ClusterSnapshot;

/// Latest known snapshot of every cluster, keyed by cluster id.
///
/// Created empty when the process starts and dropped with it. Entries are only ever replaced
/// by a snapshot of the same cluster with an equal or newer `reported_at`.
pub struct StatusStore {
    local: Arc<dyn LocalStatusSource>,
    snapshots: RwLock<BTreeMap<String, ClusterSnapshot>>,
    stale_after: chrono::Duration,
}

/// Snapshots split by the staleness threshold at one instant.
#[derive(Clone, Debug, Default)]
pub struct StoreView {
    pub fresh: Vec<ClusterSnapshot>,
    pub stale: Vec<ClusterSnapshot>,
}

impl StatusStore {
    pub fn new(local: Arc<dyn LocalStatusSource>, stale_after: chrono::Duration) -> Self {
        StatusStore {
            local,
            snapshots: RwLock::new(BTreeMap::new()),
            stale_after,
        }
    }

    pub fn local_cluster_id(&self) -> &str {
        self.local.cluster_id()
    }

    pub fn stale_after(&self) -> chrono::Duration {
        self.stale_after
    }

    /// Returns whether the snapshot was stored.
    pub async fn publish_snapshot(&self, snapshot: ClusterSnapshot) -> bool {
        let mut snapshots = self.snapshots.write().await;
        let current_reported_at = snapshots.get(&snapshot.cluster_id).map(|current| current.reported_at);
        if let Some(current_reported_at) = current_reported_at {
            if current_reported_at > snapshot.reported_at {
                tracing::debug!("Ignoring out of date snapshot for cluster {} ({} < {})", snapshot.cluster_id, snapshot.reported_at, current_reported_at);
                return false;
            }
        }
        snapshots.insert(snapshot.cluster_id.clone(), snapshot);
        true
    }

    pub async fn local_snapshot(&self) -> ClusterSnapshot {
        self.local.snapshot().await
    }

    /// Recomputes the local snapshot and stores it.
    pub async fn refresh_local(&self) -> ClusterSnapshot {
        let snapshot = self.local_snapshot().await;
        self.publish_snapshot(snapshot.clone()).await;
        snapshot
    }

    pub async fn cached(&self, cluster_id: &str) -> Option<ClusterSnapshot> {
        self.snapshots.read().await.get(cluster_id).cloned()
    }

    pub async fn view_at(&self, now: DateTime<Utc>) -> StoreView {
        let snapshots = self.snapshots.read().await;
        let mut view = StoreView::default();
        for snapshot in snapshots.values() {
            if snapshot.is_stale(now, self.stale_after) {
                view.stale.push(snapshot.clone());
            } else {
                view.fresh.push(snapshot.clone());
            }
        }
        view
    }

    /// Refreshes the local entry, then splits every known snapshot into fresh and stale.
    pub async fn view(&self) -> StoreView {
        self.refresh_local().await;
        self.view_at(Utc::now()).await
    }

    /// Fresh snapshots in ascending cluster id order, the local one included.
    pub async fn all_snapshots(&self) -> Vec<ClusterSnapshot> {
        self.view().await.fresh
    }

    pub async fn stale_clusters(&self) -> Vec<String> {
        self.view_at(Utc::now()).await.stale.into_iter().map(|snapshot| snapshot.cluster_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::cluster::snapshot::ShardStatus;
    use crate::cluster::test_utils::{snapshot, snapshot_at, FixedSource};

    fn store(local: ClusterSnapshot) -> StatusStore {
        StatusStore::new(Arc::new(FixedSource::new(local)), Duration::seconds(120))
    }

    #[tokio::test]
    async fn cold_start_returns_only_local() {
        let store = store(snapshot("Alpha", 3, 30, vec![ShardStatus::new(0, Some(40.0))]));
        let all = store.all_snapshots().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].cluster_id, "Alpha");
        assert_eq!(all[0].guild_count, 3);
    }

    #[tokio::test]
    async fn snapshots_are_ordered_by_cluster_id() {
        let store = store(snapshot("M", 0, 0, vec![]));
        store.publish_snapshot(snapshot("Z", 1, 1, vec![])).await;
        store.publish_snapshot(snapshot("A", 1, 1, vec![])).await;

        let ids: Vec<String> = store.all_snapshots().await.into_iter().map(|s| s.cluster_id).collect();
        assert_eq!(ids, vec!["A", "M", "Z"]);
    }

    #[tokio::test]
    async fn newer_snapshot_replaces_older() {
        let store = store(snapshot("local", 0, 0, vec![]));
        let now = Utc::now();
        assert!(store.publish_snapshot(snapshot_at("B", 5, 200, now - Duration::seconds(10))).await);
        assert!(store.publish_snapshot(snapshot_at("B", 6, 210, now)).await);

        let b: Vec<ClusterSnapshot> = store.all_snapshots().await.into_iter().filter(|s| s.cluster_id == "B").collect();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].guild_count, 6);
    }

    #[tokio::test]
    async fn older_snapshot_is_ignored() {
        let store = store(snapshot("local", 0, 0, vec![]));
        let now = Utc::now();
        store.publish_snapshot(snapshot_at("B", 6, 210, now)).await;
        assert!(!store.publish_snapshot(snapshot_at("B", 1, 1, now - Duration::seconds(5))).await);

        assert_eq!(store.cached("B").await.map(|s| s.guild_count), Some(6));
    }

    #[tokio::test]
    async fn republishing_same_snapshot_is_idempotent() {
        let store = store(snapshot("local", 0, 0, vec![]));
        let b = snapshot("B", 2, 2, vec![]);
        assert!(store.publish_snapshot(b.clone()).await);
        assert!(store.publish_snapshot(b.clone()).await);
        assert_eq!(store.cached("B").await, Some(b));
        assert_eq!(store.all_snapshots().await.len(), 2);
    }

    #[tokio::test]
    async fn stale_snapshots_are_excluded_and_listed() {
        let store = store(snapshot("local", 0, 0, vec![]));
        store.publish_snapshot(snapshot_at("old", 9, 9, Utc::now() - Duration::seconds(600))).await;
        store.publish_snapshot(snapshot("new", 1, 1, vec![])).await;

        let ids: Vec<String> = store.all_snapshots().await.into_iter().map(|s| s.cluster_id).collect();
        assert_eq!(ids, vec!["local", "new"]);
        assert_eq!(store.stale_clusters().await, vec!["old".to_string()]);
    }

    #[tokio::test]
    async fn local_snapshot_is_recomputed_on_each_query() {
        let source = Arc::new(FixedSource::new(snapshot("local", 1, 1, vec![])));
        let store = StatusStore::new(source.clone(), Duration::seconds(120));
        assert_eq!(store.all_snapshots().await[0].guild_count, 1);

        source.set_guild_count(7);
        assert_eq!(store.all_snapshots().await[0].guild_count, 7);
    }

    #[tokio::test]
    async fn concurrent_publishes_for_different_clusters_all_land() {
        let store = Arc::new(store(snapshot("local", 0, 0, vec![])));
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.publish_snapshot(snapshot(&format!("c{:02}", i), 1, 1, vec![])).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(store.all_snapshots().await.len(), 17);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ShardStatus {
    pub shard_id: u32,
    /// `None` until the shard has completed a heartbeat.
    pub latency_ms: Option<f64>,
}

impl ShardStatus {
    pub fn new(shard_id: u32, latency_ms: Option<f64>) -> Self {
        ShardStatus { shard_id, latency_ms }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct ClusterSnapshot {
    pub cluster_id: String,
    pub guild_count: u64,
    pub member_count: u64,
    pub shards: Vec<ShardStatus>,
    pub reported_at: DateTime<Utc>,
}

impl ClusterSnapshot {
    pub fn shard(&self, shard_id: u32) -> Option<&ShardStatus> {
        self.shards.iter().find(|shard| shard.shard_id == shard_id)
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.reported_at
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        self.age(now) > stale_after
    }

    /// Mean latency over shards that have been measured.
    pub fn mean_latency_ms(&self) -> Option<f64> {
        let measured: Vec<f64> = self.shards.iter().filter_map(|shard| shard.latency_ms).collect();
        if measured.is_empty() {
            return None;
        }
        Some(measured.iter().sum::<f64>() / measured.len() as f64)
    }
}

/// Whole-bot totals, recomputed on every query.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct GlobalStatus {
    pub total_guilds: u64,
    pub total_members: u64,
    pub cluster_count: usize,
    pub shard_count: usize,
    pub stale_clusters: Vec<String>,
}

impl GlobalStatus {
    pub fn from_snapshots(snapshots: &[ClusterSnapshot]) -> Self {
        GlobalStatus {
            total_guilds: snapshots.iter().map(|s| s.guild_count).sum(),
            total_members: snapshots.iter().map(|s| s.member_count).sum(),
            cluster_count: snapshots.len(),
            shard_count: snapshots.iter().map(|s| s.shards.len()).sum(),
            stale_clusters: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_utils::snapshot;

    #[test]
    fn totals_sum_counts_and_shards() {
        let snapshots = vec![
            snapshot("A", 10, 500, vec![ShardStatus::new(0, Some(12.3))]),
            snapshot("B", 5, 200, vec![ShardStatus::new(1, Some(8.0)), ShardStatus::new(2, None)]),
        ];
        let status = GlobalStatus::from_snapshots(&snapshots);
        assert_eq!(status.total_guilds, 15);
        assert_eq!(status.total_members, 700);
        assert_eq!(status.cluster_count, 2);
        assert_eq!(status.shard_count, 3);
    }

    #[test]
    fn totals_of_nothing_are_zero() {
        assert_eq!(GlobalStatus::from_snapshots(&[]), GlobalStatus::default());
    }

    #[test]
    fn mean_latency_skips_unmeasured_shards() {
        let s = snapshot("A", 0, 0, vec![ShardStatus::new(0, Some(10.0)), ShardStatus::new(1, None), ShardStatus::new(2, Some(20.0))]);
        assert_eq!(s.mean_latency_ms(), Some(15.0));

        let unmeasured = snapshot("B", 0, 0, vec![ShardStatus::new(0, None)]);
        assert_eq!(unmeasured.mean_latency_ms(), None);
    }

    #[test]
    fn staleness_uses_threshold() {
        let mut s = snapshot("A", 0, 0, vec![]);
        let now = s.reported_at;
        assert!(!s.is_stale(now + chrono::Duration::seconds(60), chrono::Duration::seconds(120)));
        s.reported_at = now - chrono::Duration::seconds(121);
        assert!(s.is_stale(now, chrono::Duration::seconds(120)));
    }
}

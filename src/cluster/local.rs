use std::sync::Arc;

use chrono::Utc;
use serenity::all::{Cache, ShardManager};
use serenity::async_trait;

use crate::cluster::snapshot::{ClusterSnapshot, ShardStatus};

/// Produces the snapshot of the cluster running in this process.
#[async_trait]
pub trait LocalStatusSource: Send + Sync {
    fn cluster_id(&self) -> &str;
    async fn snapshot(&self) -> ClusterSnapshot;
}

/// Reads guild and user counts from the gateway cache and latencies from the shard runners.
pub struct SerenityStatusSource {
    cluster_id: String,
    cache: Arc<Cache>,
    shard_manager: Arc<ShardManager>,
}

impl SerenityStatusSource {
    pub fn new(cluster_id: String, cache: Arc<Cache>, shard_manager: Arc<ShardManager>) -> Self {
        SerenityStatusSource { cluster_id, cache, shard_manager }
    }
}

#[async_trait]
impl LocalStatusSource for SerenityStatusSource {
    fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    async fn snapshot(&self) -> ClusterSnapshot {
        let mut shards: Vec<ShardStatus> = {
            let runners = self.shard_manager.runners.lock().await;
            runners
                .iter()
                .map(|(shard_id, info)| ShardStatus::new(shard_id.0, info.latency.map(|latency| latency.as_secs_f64() * 1000.0)))
                .collect()
        };
        shards.sort_by_key(|shard| shard.shard_id);

        ClusterSnapshot {
            cluster_id: self.cluster_id.clone(),
            guild_count: self.cache.guild_count() as u64,
            member_count: self.cache.user_count() as u64,
            shards,
            reported_at: Utc::now(),
        }
    }
}

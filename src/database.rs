use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use serenity::async_trait;

use crate::cluster::publisher::SnapshotTransport;
use crate::cluster::snapshot::{ClusterSnapshot, ShardStatus};
use crate::errors::TransportResult;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_SIZE: u32 = 4;

/// Sqlite file shared by every cluster on the host; each cluster owns one row.
#[derive(Clone)]
pub struct StatsDatabase {
    pool: Pool<SqliteConnectionManager>,
}

impl fmt::Debug for StatsDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.pool.state();
        f.debug_struct("StatsDatabase").field("connections", &state.connections).field("idle", &state.idle_connections).finish()
    }
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    // Fixed width so sqlite can compare the strings directly.
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl StatsDatabase {
    pub fn new(path: &str) -> TransportResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
        let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;

        let conn = pool.get()?;
        let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        drop(conn);

        Self::from_pool(pool)
    }

    #[cfg(test)]
    pub fn in_memory() -> TransportResult<Self> {
        let pool = Pool::builder().max_size(1).build(SqliteConnectionManager::memory())?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: Pool<SqliteConnectionManager>) -> TransportResult<Self> {
        let conn = pool.get()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cluster_stats (
            cluster_id TEXT PRIMARY KEY,
            guild_count INTEGER NOT NULL,
            member_count INTEGER NOT NULL,
            shards TEXT NOT NULL,
            reported_at TEXT NOT NULL
        )",
            [],
        )?;
        drop(conn);

        Ok(StatsDatabase { pool })
    }

    pub fn save_snapshot(&self, snapshot: &ClusterSnapshot) -> TransportResult<()> {
        let shards = serde_json::to_string(&snapshot.shards)?;
        let guild_count = i64::try_from(snapshot.guild_count)?;
        let member_count = i64::try_from(snapshot.member_count)?;
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO cluster_stats (cluster_id, guild_count, member_count, shards, reported_at) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(cluster_id) DO UPDATE SET
                guild_count = excluded.guild_count,
                member_count = excluded.member_count,
                shards = excluded.shards,
                reported_at = excluded.reported_at
            WHERE excluded.reported_at >= cluster_stats.reported_at",
            params![snapshot.cluster_id, guild_count, member_count, shards, format_timestamp(&snapshot.reported_at)],
        )?;
        Ok(())
    }

    pub fn load_snapshots(&self) -> TransportResult<Vec<ClusterSnapshot>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT cluster_id, guild_count, member_count, shards, reported_at FROM cluster_stats ORDER BY cluster_id")?;
        let rows = stmt.query_map([], |row| {
            let cluster_id: String = row.get(0)?;
            let guild_count: i64 = row.get(1)?;
            let member_count: i64 = row.get(2)?;
            let shards: String = row.get(3)?;
            let reported_at: String = row.get(4)?;
            Ok((cluster_id, guild_count, member_count, shards, reported_at))
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (cluster_id, guild_count, member_count, shards, reported_at) = row?;
            let shards: Vec<ShardStatus> = serde_json::from_str(&shards)?;
            let reported_at = DateTime::parse_from_rfc3339(&reported_at)?.with_timezone(&Utc);
            snapshots.push(ClusterSnapshot {
                cluster_id,
                guild_count: u64::try_from(guild_count)?,
                member_count: u64::try_from(member_count)?,
                shards,
                reported_at,
            });
        }
        Ok(snapshots)
    }
}

#[async_trait]
impl SnapshotTransport for StatsDatabase {
    #[tracing::instrument(skip(self, snapshot), fields(cluster = snapshot.cluster_id.as_str()))]
    async fn broadcast(&self, snapshot: &ClusterSnapshot) -> TransportResult<()> {
        let database = self.clone();
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || database.save_snapshot(&snapshot)).await?
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_all(&self) -> TransportResult<Vec<ClusterSnapshot>> {
        let database = self.clone();
        tokio::task::spawn_blocking(move || database.load_snapshots()).await?
    }
}

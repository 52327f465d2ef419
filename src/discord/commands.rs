use std::sync::Arc;
use std::time::Duration;

use crate::checks::{is_owner, support_server};
use crate::cluster::aggregator::{ClusterOverview, StatusAggregator};
use crate::cluster::publisher::Publisher;
use crate::cluster::snapshot::GlobalStatus;
use crate::config::AccessConfig;

// User data, which is stored and accessible in all command invocations
pub struct Data {
    pub cluster_name: String,
    pub access: AccessConfig,
    pub aggregator: StatusAggregator,
    pub publisher: Arc<Publisher>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// How long a command waits on other clusters before answering from the cache.
const COMMAND_REFRESH_BUDGET: Duration = Duration::from_millis(1500);

pub fn format_latency(latency_ms: Option<f64>) -> String {
    match latency_ms {
        Some(ms) => format!("{:.2} ms", ms),
        None => "unmeasured".to_string(),
    }
}

pub fn format_bot_stats(status: &GlobalStatus) -> String {
    let mut text = format!(
        "**Bot Stats**\nguilds: **{}**\nusers: **{}**\nclusters: **{}**\nshards: **{}**",
        status.total_guilds, status.total_members, status.cluster_count, status.shard_count
    );
    if !status.stale_clusters.is_empty() {
        text.push_str(&format!("\n(no recent report from: {})", status.stale_clusters.join(", ")));
    }
    text
}

pub fn format_overview(rows: &[ClusterOverview]) -> String {
    let mut text = "**Clusters**".to_string();
    for row in rows {
        let shards = row.shard_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
        text.push_str(&format!(
            "\n`{}` guilds: {} users: {} shards: [{}] latency: {}{}",
            row.cluster_id,
            row.guild_count,
            row.member_count,
            shards,
            format_latency(row.mean_latency_ms),
            if row.stale { " (stale)" } else { "" }
        ));
    }
    text
}

/// Shows bot statistics
#[poise::command(prefix_command, aliases("botinfo"))]
pub async fn botstats(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data().publisher.refresh_now(COMMAND_REFRESH_BUDGET).await;
    let status = ctx.data().aggregator.aggregate().await;
    ctx.say(format_bot_stats(&status)).await?;
    Ok(())
}

/// Shows current clusters and shards latency
///
/// With a cluster name and shard id, shows that shard's last reported latency instead.
#[poise::command(prefix_command, aliases("latency"))]
pub async fn ping(ctx: Context<'_>, #[description = "Cluster name"] cluster: Option<String>, #[description = "Shard ID"] shard: Option<u32>) -> Result<(), Error> {
    let data = ctx.data();

    if let (Some(cluster), Some(shard)) = (cluster, shard) {
        data.publisher.refresh_now(COMMAND_REFRESH_BUDGET).await;
        let latency = data.aggregator.shard_latency(&cluster, shard).await?;
        ctx.say(format!("**Pong!**\nCluster **{}** shard **{}**: {}", cluster, shard, format_latency(latency))).await?;
        return Ok(());
    }

    let shard_id = ctx.serenity_context().shard_id.0;

    let cluster_latency = data.aggregator.local_latency().await;
    let shard_latency = data.aggregator.local_shard_latency(shard_id).await?;

    let response = format!(
        "**Pong!**\nCluster **{}**: {}\nShard **{}**: {}",
        data.cluster_name,
        format_latency(cluster_latency),
        shard_id,
        format_latency(shard_latency)
    );
    ctx.say(response).await?;
    Ok(())
}

/// Lists every known cluster with its shards
#[poise::command(prefix_command, check = "is_owner", check = "support_server")]
pub async fn clusters(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data().publisher.refresh_now(COMMAND_REFRESH_BUDGET).await;
    let rows = ctx.data().aggregator.cluster_overview().await;
    ctx.say(format_overview(&rows)).await?;
    Ok(())
}

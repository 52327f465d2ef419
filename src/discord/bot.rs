use std::sync::Arc;

use anyhow::Context as _;
use poise::FrameworkError;
use serenity::all::{Client, GatewayIntents};

use crate::cluster::aggregator::StatusAggregator;
use crate::cluster::local::SerenityStatusSource;
use crate::cluster::publisher::Publisher;
use crate::cluster::store::StatusStore;
use crate::config::BotConfig;
use crate::database::StatsDatabase;
use crate::discord::commands::{botstats, clusters, ping, Data, Error};
use crate::errors::CheckError;

pub struct DiscordBot {
    cluster_name: String,
    shard_start: u32,
    shard_end: u32,
    total_shards: u32,
    client: Client,
}

async fn on_error(error: FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::CommandCheckFailed { error: Some(error), ctx, .. } => match error.downcast_ref::<CheckError>() {
            Some(reason) => {
                if let Err(e) = ctx.say(reason.to_string()).await {
                    tracing::warn!("Failed to send check failure for {}: {}", ctx.command().name, e);
                }
            }
            None => tracing::error!("Check for {} failed unexpectedly: {}", ctx.command().name, error),
        },
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}

impl DiscordBot {
    pub async fn new(config: BotConfig) -> anyhow::Result<Self> {
        let stats_database = StatsDatabase::new(&config.stats_database).with_context(|| format!("Failed to open stats database {}", config.stats_database))?;

        // Set gateway intents, which decides what events the bot will be notified about
        let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT | GatewayIntents::GUILD_MEMBERS;

        let setup_config = config.clone();
        let framework = poise::Framework::builder()
            .options(poise::FrameworkOptions {
                commands: vec![botstats(), ping(), clusters()],
                prefix_options: poise::PrefixFrameworkOptions {
                    prefix: Some(config.prefix.clone()),
                    ..Default::default()
                },
                on_error: |error| Box::pin(on_error(error)),
                ..Default::default()
            })
            .setup(move |ctx, _ready, framework| {
                Box::pin(async move {
                    let config = setup_config;
                    let source = SerenityStatusSource::new(config.cluster_name.clone(), Arc::clone(&ctx.cache), Arc::clone(framework.shard_manager()));
                    let store = Arc::new(StatusStore::new(Arc::new(source), config.stale_after()));
                    let publisher = Arc::new(Publisher::new(Arc::clone(&store), Arc::new(stats_database), config.refresh_timeout()));

                    Arc::clone(&publisher).spawn(config.publish_interval());
                    tracing::info!("Cluster {} is publishing status every {:?}", config.cluster_name, config.publish_interval());

                    Ok(Data {
                        cluster_name: config.cluster_name.clone(),
                        access: config.access(),
                        aggregator: StatusAggregator::new(store),
                        publisher,
                    })
                })
            })
            .build();

        let client = Client::builder(&config.discord_token, intents).framework(framework).await.context("Err creating client")?;

        Ok(DiscordBot {
            cluster_name: config.cluster_name,
            shard_start: config.shard_start,
            shard_end: config.shard_end,
            total_shards: config.total_shards,
            client,
        })
    }

    pub async fn run_bot(&mut self) -> anyhow::Result<()> {
        tracing::info!("Starting cluster {} with shards {}..{} of {}", self.cluster_name, self.shard_start, self.shard_end, self.total_shards);
        self.client.start_shard_range(self.shard_start..self.shard_end, self.total_shards).await.context("Error starting client")?;
        Ok(())
    }
}

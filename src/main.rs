use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, Layer, Registry};

use crate::config::{read_config, BotConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use crate::discord::bot::DiscordBot;

mod checks;
mod cluster;
mod config;
mod database;
mod discord;
mod errors;

fn main() -> anyhow::Result<()> {
    let config_path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = read_config(&config_path)?;

    let (_file_guard, _stdout_guard) = init_logging(&config);

    let span = tracing::span!(tracing::Level::INFO, "cluster", name = config.cluster_name.as_str());
    let _enter = span.enter();
    tracing::info!("Loaded config from {}", config_path);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut discord_bot = DiscordBot::new(config).await?;
        discord_bot.run_bot().await
    })
}

type LogGuards = (WorkerGuard, WorkerGuard);

/// File and stdout layers share the configured level; the file rolls hourly per cluster.
fn init_logging(config: &BotConfig) -> LogGuards {
    let level = config.log_level_filter();

    let file_appender = tracing_appender::rolling::hourly(&config.log_directory, config.log_file_prefix());
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::Layer::new()
        .compact()
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(file_writer)
        .with_filter(level);
    let stdout_layer = tracing_subscriber::fmt::Layer::new()
        .compact()
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(stdout_writer)
        .with_filter(level);

    Registry::default().with(file_layer).with(stdout_layer).init();

    (file_guard, stdout_guard)
}

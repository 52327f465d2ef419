use thiserror::Error;

pub type StatusResult<T> = Result<T, StatusError>;
pub type TransportResult<T> = Result<T, TransportError>;

/// Reasons a command check can refuse an invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("Only the bot owners can run this command.")]
    NotOwner,
    #[error("This command can't be used in DMs.")]
    NoPrivateMessages,
    #[error("This command can only be used in the support server.")]
    SupportServerOnly,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatusError {
    #[error("No status known for shard {shard_id} of cluster {cluster_id}")]
    ShardNotFound { cluster_id: String, shard_id: u32 },
    #[error("Status of cluster {cluster_id} is stale ({age_secs}s old)")]
    StaleData { cluster_id: String, age_secs: i64 },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Pool(#[from] r2d2::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to encode shard list: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Invalid reported_at timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("Count out of range for the stats table: {0}")]
    Count(#[from] std::num::TryFromIntError),
    #[error("Stats database task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

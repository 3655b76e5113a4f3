use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub store: StoreConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub notifications: NotificationConfig,
}

#[derive(Clone, Debug, Args)]
pub struct StoreConfig {
    /// Redis connection URL
    #[arg(long, env = "CAUSERIE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub url: String,

    /// Minimum backoff between pub/sub reconnect attempts, in seconds
    #[arg(long, env = "CAUSERIE_STORE_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub min_backoff_secs: u64,

    /// Maximum backoff between pub/sub reconnect attempts, in seconds
    #[arg(long, env = "CAUSERIE_STORE_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub max_backoff_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Prefix for per-conversation message list keys
    #[arg(long, env = "CAUSERIE_KEY_PREFIX", default_value = "conversation:")]
    pub key_prefix: String,

    /// Maximum number of messages retained per conversation (0 or less = unbounded)
    #[arg(long, env = "CAUSERIE_MAX_LOG_LEN", default_value_t = 1000)]
    pub max_log_len: i64,

    /// Which messages a mark-read pass flips: those received by the reader,
    /// or those the reader sent (legacy behavior)
    #[arg(long, env = "CAUSERIE_READ_RECEIPT_SCOPE", value_enum, default_value = "received")]
    pub read_receipt_scope: ReadReceiptScope,
}

#[derive(Clone, Debug, Args)]
pub struct NotificationConfig {
    /// Prefix for per-conversation notification channels
    #[arg(long, env = "CAUSERIE_CHANNEL_PREFIX", default_value = "conversation:")]
    pub channel_prefix: String,

    /// Capacity of the store-level pattern subscription channel
    #[arg(long, env = "CAUSERIE_GLOBAL_CHANNEL_CAPACITY", default_value_t = 1024)]
    pub global_channel_capacity: usize,

    /// Capacity of each per-conversation subscriber channel
    #[arg(long, env = "CAUSERIE_CONVERSATION_CHANNEL_CAPACITY", default_value_t = 16)]
    pub conversation_channel_capacity: usize,

    /// How often to reclaim conversation channels with no subscribers
    #[arg(long, env = "CAUSERIE_GC_INTERVAL_SECS", default_value_t = 60)]
    pub gc_interval_secs: u64,
}

/// Selects which records a mark-read pass rewrites (see `MessageLog::mark_read`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReadReceiptScope {
    /// Mark unread messages sent *to* the reader by other participants
    Received,
    /// Mark unread messages the reader sent, matching the historical behavior
    Sent,
}

impl Config {
    pub fn load() -> Self {
        Self::parse()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { url: "redis://127.0.0.1:6379".to_string(), min_backoff_secs: 1, max_backoff_secs: 30 }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            key_prefix: "conversation:".to_string(),
            max_log_len: 1000,
            read_receipt_scope: ReadReceiptScope::Received,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_prefix: "conversation:".to_string(),
            global_channel_capacity: 1024,
            conversation_channel_capacity: 16,
            gc_interval_secs: 60,
        }
    }
}

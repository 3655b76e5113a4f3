use crate::config::StoreConfig;
use crate::error::Result;
use crate::storage::{LogStore, StoreEvent};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::StreamExt;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;

// Compare-and-set on one list slot: rewrite index ARGV[1] only while it
// still holds ARGV[2]. Runs as a single script so an index shifted by a
// concurrent LTRIM or LPOP can never be rewritten with a stale value.
const LSET_IF_EQUAL: &str = r"
if redis.call('LINDEX', KEYS[1], ARGV[1]) == ARGV[2] then
    redis.call('LSET', KEYS[1], ARGV[1], ARGV[3])
    return 1
end
return 0
";

/// Redis-backed [`LogStore`]: a connection manager for commands and one
/// background listener task per subscribed pattern, each fanning received
/// messages into a local broadcast channel.
#[derive(Debug)]
pub struct RedisLogStore {
    publisher: redis::aio::ConnectionManager,
    // Maps patterns (e.g. "conversation:*") to broadcast senders
    subscriptions: Arc<DashMap<String, broadcast::Sender<StoreEvent>>>,
    client: redis::Client,
    shutdown: watch::Receiver<bool>,
    channel_capacity: usize,
    config: StoreConfig,
}

impl RedisLogStore {
    /// Creates a new Redis-backed log store. `channel_capacity` sizes each
    /// pattern broadcast channel; hosts pass
    /// `NotificationConfig::global_channel_capacity` here.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn new(
        config: &StoreConfig,
        channel_capacity: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Arc<Self>> {
        let client = redis::Client::open(config.url.as_str())?;
        let publisher = client.get_connection_manager().await?;
        let subscriptions = Arc::new(DashMap::new());

        Ok(Arc::new(Self {
            publisher,
            subscriptions,
            client,
            shutdown,
            channel_capacity,
            config: config.clone(),
        }))
    }

    fn publisher(&self) -> redis::aio::ConnectionManager {
        self.publisher.clone()
    }

    async fn run_pattern_listener(
        client: redis::Client,
        pattern: String,
        tx: broadcast::Sender<StoreEvent>,
        mut shutdown: watch::Receiver<bool>,
        subscriptions: Arc<DashMap<String, broadcast::Sender<StoreEvent>>>,
        config: StoreConfig,
        ready_tx: tokio::sync::oneshot::Sender<std::result::Result<(), redis::RedisError>>,
    ) {
        let (initial_retry, reconnect_retry) = retry_strategies(&config);

        let mut ready_tx = Some(ready_tx);

        loop {
            // Before the first PSUBSCRIBE succeeds the retry budget is
            // bounded, so `subscribe_pattern` fails fast instead of hanging
            // its caller. Once established, reconnects keep going until
            // shutdown.
            let strategy =
                if ready_tx.is_some() { &initial_retry } else { &reconnect_retry };

            let subscribe = (|| async {
                let mut pubsub = client.get_async_pubsub().await?;
                pubsub.psubscribe(&pattern).await?;
                Ok::<redis::aio::PubSub, redis::RedisError>(pubsub)
            })
            .retry(strategy)
            .when(|e| {
                tracing::warn!(error = %e, "Failed to subscribe to the store, retrying...");
                true
            })
            .notify(|e, duration| {
                tracing::debug!("Store subscription retry in {:?} due to error: {:?}", duration, e);
            });

            let pubsub_result = tokio::select! {
                _ = shutdown.changed() => break,
                result = subscribe => result,
            };

            let pubsub: redis::aio::PubSub = match pubsub_result {
                Ok(ps) => ps,
                Err(e) => {
                    tracing::error!(error = %e, "Store subscription failed after retries");
                    if let Some(rtx) = ready_tx.take() {
                        let _ = rtx.send(Err(e));
                    }
                    break;
                }
            };

            tracing::info!(pattern = %pattern, "Subscribed to store pattern");
            if let Some(rtx) = ready_tx.take() {
                let _ = rtx.send(Ok(()));
            }

            let mut message_stream = pubsub.into_on_message();

            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    msg = message_stream.next() => {
                        if let Some(msg) = msg {
                            let event = StoreEvent {
                                channel: msg.get_channel_name().to_string(),
                                payload: msg.get_payload().unwrap_or_default(),
                            };
                            if tx.send(event).is_err() {
                                // No local receivers right now; keep listening
                                // until shutdown.
                            }
                        } else {
                            tracing::warn!(pattern = %pattern, "Store pub/sub connection lost, reconnecting...");
                            break;
                        }
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }

        subscriptions.remove(&pattern);
    }
}

// Backoff pair for the pattern listener: a bounded budget for the initial
// subscription (its failure is reported through the readiness channel) and
// an unbounded one for reconnects, which only shutdown interrupts.
fn retry_strategies(config: &StoreConfig) -> (ExponentialBuilder, ExponentialBuilder) {
    let base = || {
        ExponentialBuilder::default()
            .with_min_delay(std::time::Duration::from_secs(config.min_backoff_secs))
            .with_max_delay(std::time::Duration::from_secs(config.max_backoff_secs))
    };
    (base(), base().without_max_times())
}

#[async_trait]
impl LogStore for RedisLogStore {
    async fn append(&self, key: &str, entry: &str) -> Result<()> {
        let mut conn = self.publisher();
        conn.rpush::<_, _, i64>(key, entry).await?;
        Ok(())
    }

    async fn read_range(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.publisher();
        let entries: Vec<String> = conn.lrange(key, 0, -1).await?;
        Ok(entries)
    }

    async fn write_at_if(
        &self,
        key: &str,
        index: usize,
        expected: &str,
        entry: &str,
    ) -> Result<bool> {
        let mut conn = self.publisher();
        let swapped = redis::Script::new(LSET_IF_EQUAL)
            .key(key)
            .arg(index)
            .arg(expected)
            .arg(entry)
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn trim_to_latest(&self, key: &str, max_len: i64) -> Result<()> {
        let mut conn = self.publisher();
        conn.ltrim::<_, ()>(key, (-max_len) as isize, -1).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.publisher();
        conn.del::<_, i64>(key).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        let mut conn = self.publisher();
        conn.publish::<_, _, i64>(channel, payload).await?;
        Ok(())
    }

    /// Subscribes to a Redis pattern.
    /// If a background listener for this pattern isn't already running, it
    /// will be started.
    async fn subscribe_pattern(&self, pattern: &str) -> Result<broadcast::Receiver<StoreEvent>> {
        // The entry lock makes check-and-insert atomic, so concurrent first
        // subscribers to one pattern share a single listener.
        let (tx, rx) = match self.subscriptions.entry(pattern.to_string()) {
            Entry::Occupied(occupied) => return Ok(occupied.get().subscribe()),
            Entry::Vacant(vacant) => {
                let (tx, rx) = broadcast::channel(self.channel_capacity);
                vacant.insert(tx.clone());
                (tx, rx)
            }
        };

        // Spawn a background listener for this specific pattern
        let pattern_str = pattern.to_string();
        let client = self.client.clone();
        let shutdown = self.shutdown.clone();
        let subscriptions = Arc::clone(&self.subscriptions);
        let config = self.config.clone();

        // We use a channel to wait for the first successful subscription
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(
            async move {
                Self::run_pattern_listener(
                    client,
                    pattern_str,
                    tx,
                    shutdown,
                    subscriptions,
                    config,
                    ready_tx,
                )
                .await;
            }
            .instrument(tracing::debug_span!("store_pattern_listener", pattern = %pattern)),
        );

        // Wait for the listener to be ready (psubscribed). A listener that
        // never got there hands back its subscription error instead of a
        // dead receiver.
        match ready_rx.await {
            Ok(Ok(())) => Ok(rx),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(redis::RedisError::from((
                redis::ErrorKind::Client,
                "pattern listener exited before subscribing",
            ))
            .into()),
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.publisher();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::BackoffBuilder;

    #[test]
    fn reconnect_backoff_outlasts_any_outage() {
        let config = StoreConfig::default();
        let (initial, reconnect) = retry_strategies(&config);

        // The initial subscription fails fast so callers get an error, not
        // a hang; an established listener retries for as long as shutdown
        // lets it, no matter how long the store stays away.
        assert!(initial.build().count() < 10, "initial subscription must be bounded");
        assert_eq!(
            reconnect.build().take(10_000).count(),
            10_000,
            "reconnect backoff must never run out of attempts"
        );
    }

    #[test]
    fn backoff_delays_stay_within_the_configured_bounds() {
        let config = StoreConfig::default();
        let (_, reconnect) = retry_strategies(&config);

        let max = std::time::Duration::from_secs(config.max_backoff_secs);
        assert!(reconnect.build().take(100).all(|delay| delay <= max));
    }
}

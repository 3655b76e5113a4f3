use async_trait::async_trait;
use causerie::config::Config;
use causerie::domain::message::NewMessage;
use causerie::error::Result;
use causerie::services::{MessageService, NotificationService};
use causerie::storage::{LogStore, MessageLog, StoreEvent};
use causerie::workers::NotificationWorker;
use dashmap::DashMap;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("causerie=debug".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

/// In-memory [`LogStore`] double: list semantics of the real store plus
/// pattern-matched broadcast topics, so the default suite runs without a
/// live server.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    lists: DashMap<String, Vec<String>>,
    topics: DashMap<String, broadcast::Sender<StoreEvent>>,
}

impl MemoryLogStore {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }
}

// Only the "prefix*" shape is needed; that is the sole pattern the crate
// subscribes with.
fn pattern_matches(pattern: &str, channel: &str) -> bool {
    pattern.strip_suffix('*').map_or(pattern == channel, |prefix| channel.starts_with(prefix))
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, key: &str, entry: &str) -> Result<()> {
        self.lists.entry(key.to_string()).or_default().push(entry.to_string());
        Ok(())
    }

    async fn read_range(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.lists.get(key).map(|list| list.value().clone()).unwrap_or_default())
    }

    async fn write_at_if(&self, key: &str, index: usize, expected: &str, entry: &str) -> Result<bool> {
        // The entry lock makes the check-and-write atomic, like the real
        // store's script.
        let Some(mut list) = self.lists.get_mut(key) else {
            return Ok(false);
        };
        match list.get_mut(index) {
            Some(slot) if slot == expected => {
                *slot = entry.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn trim_to_latest(&self, key: &str, max_len: i64) -> Result<()> {
        if let Some(mut list) = self.lists.get_mut(key) {
            let max_len = usize::try_from(max_len).unwrap_or(usize::MAX);
            if list.len() > max_len {
                let excess = list.len() - max_len;
                list.drain(..excess);
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lists.remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        for topic in self.topics.iter() {
            if pattern_matches(topic.key(), channel) {
                let _ = topic.value().send(StoreEvent {
                    channel: channel.to_string(),
                    payload: payload.to_vec(),
                });
            }
        }
        Ok(())
    }

    async fn subscribe_pattern(&self, pattern: &str) -> Result<broadcast::Receiver<StoreEvent>> {
        let tx = self
            .topics
            .entry(pattern.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .value()
            .clone();
        Ok(tx.subscribe())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// The full core wired over the in-memory store.
#[allow(dead_code)]
pub struct TestCore {
    pub store: Arc<MemoryLogStore>,
    pub log: MessageLog,
    pub notifier: NotificationService,
    pub service: MessageService,
    pub config: Config,
}

#[allow(dead_code)]
impl TestCore {
    pub fn build() -> Self {
        Self::build_with_config(Config::default())
    }

    pub fn build_with_config(config: Config) -> Self {
        setup_tracing();
        let store = Arc::new(MemoryLogStore::default());
        let log = MessageLog::new(Arc::clone(&store) as Arc<dyn LogStore>, &config.messaging);
        let notifier =
            NotificationService::new(Arc::clone(&store) as Arc<dyn LogStore>, &config.notifications);
        let service = MessageService::new(log.clone(), notifier.clone(), &config.messaging);
        Self { store, log, notifier, service, config }
    }
}

/// Spawns the notification worker for `core`. Its pattern subscription is
/// live once this returns, so events published afterwards will be routed.
#[allow(dead_code)]
pub async fn spawn_worker(core: &TestCore) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = NotificationWorker::new(core.notifier.clone(), core.config.notifications.gc_interval_secs)
        .await
        .expect("worker subscription");
    let handle = tokio::spawn(worker.run(shutdown_rx));
    (shutdown_tx, handle)
}

#[allow(dead_code)]
pub fn new_message(sender_id: i64, sender_email: &str, sent_by: &str, content: &str) -> NewMessage {
    NewMessage {
        id: None,
        content: content.to_string(),
        sender_id,
        sender_email: sender_email.to_string(),
        sent_by: sent_by.to_string(),
    }
}

#[allow(dead_code)]
pub async fn recv_timeout<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed or lagged")
}

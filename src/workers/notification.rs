use crate::error::Result;
use crate::services::notification_service::NotificationService;
use crate::storage::StoreEvent;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tracing::Instrument;

/// Drives the notification service: drains the store-level pattern
/// subscription into local conversation channels and periodically reclaims
/// stale ones.
#[derive(Debug)]
pub struct NotificationWorker {
    service: NotificationService,
    events: broadcast::Receiver<StoreEvent>,
    gc_interval_secs: u64,
}

impl NotificationWorker {
    /// Creates the worker, opening the store-level pattern subscription.
    /// The subscription is live on return, so nothing published between
    /// construction and spawning `run` is missed.
    ///
    /// # Errors
    /// Returns an error if the subscription fails.
    pub async fn new(service: NotificationService, gc_interval_secs: u64) -> Result<Self> {
        let events = service.subscribe_realtime().await?;
        Ok(Self { service, events, gc_interval_secs })
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut gc_interval = tokio::time::interval(Duration::from_secs(self.gc_interval_secs));

        tracing::info!("Notification worker started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                _ = gc_interval.tick() => {
                    async {
                        self.service.perform_gc();
                    }
                    .instrument(tracing::debug_span!("notification_gc_iteration"))
                    .await;
                }

                result = self.events.recv() => {
                    match result {
                        Ok(event) => {
                            self.service.dispatch_event(&event);
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "Notification dispatcher lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::error!("Store event stream closed, worker exiting");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("Notification worker shutting down...");
    }
}

//! Periodic outbox drain.

use std::sync::Arc;
use std::time::Duration;

use domain::OutboxEvent;
use store::{OutboxStore, StoreError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::broker::MessageBroker;

/// Publish attempts per event before it is skipped forever.
pub const MAX_RETRIES: u32 = 5;

/// Default cadence of the poll-dispatch-update cycle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Publisher settings.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub poll_interval: Duration,
    pub max_retries: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_retries: MAX_RETRIES,
        }
    }
}

/// Outcome of one publisher cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Events published and marked processed.
    pub published: usize,
    /// Events whose publish attempt failed this cycle.
    pub failed: usize,
    /// True when the cycle was skipped because another run was in flight.
    pub skipped: bool,
}

/// Background task draining the outbox store into the broker.
///
/// Each event's publish attempt is independent; a failing event never
/// blocks the others in the same cycle. Events that exhaust the retry
/// budget stay in the store unprocessed and are only reported through a
/// log line and a counter.
pub struct OutboxPublisher<S, B> {
    store: S,
    broker: B,
    config: PublisherConfig,
    // Single-flight guard so overlapping ticks cannot double-process a batch.
    in_flight: Mutex<()>,
}

impl<S, B> OutboxPublisher<S, B>
where
    S: OutboxStore + 'static,
    B: MessageBroker + 'static,
{
    pub fn new(store: S, broker: B) -> Self {
        Self::with_config(store, broker, PublisherConfig::default())
    }

    pub fn with_config(store: S, broker: B, config: PublisherConfig) -> Self {
        Self {
            store,
            broker,
            config,
            in_flight: Mutex::new(()),
        }
    }

    /// Runs one poll-dispatch-update cycle.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("previous publisher cycle still running, skipping tick");
            return Ok(CycleReport {
                skipped: true,
                ..CycleReport::default()
            });
        };

        let pending = self.store.dispatchable_events(self.config.max_retries).await?;
        if pending.is_empty() {
            tracing::debug!("no pending outbox events");
            return Ok(CycleReport::default());
        }

        tracing::info!(count = pending.len(), "processing pending outbox events");
        let mut report = CycleReport::default();
        for event in pending {
            match self.dispatch(&event).await {
                Ok(()) => report.published += 1,
                Err(()) => report.failed += 1,
            }
        }
        Ok(report)
    }

    async fn dispatch(&self, event: &OutboxEvent) -> Result<(), ()> {
        match self
            .broker
            .publish(&event.exchange, &event.routing_key, &event.payload)
            .await
        {
            Ok(()) => {
                if let Err(err) = self.store.mark_processed(event.id).await {
                    // The broker accepted the message but the flag write
                    // failed; the event will be published again next cycle.
                    tracing::error!(event_id = %event.id, error = %err, "failed to mark outbox event processed");
                    return Err(());
                }
                metrics::counter!("outbox_published_total").increment(1);
                tracing::info!(event_id = %event.id, event_type = %event.event_type, "outbox event published");
                Ok(())
            }
            Err(err) => {
                match self.store.record_publish_failure(event.id).await {
                    Ok(retry_count) => {
                        metrics::counter!("outbox_publish_failures_total").increment(1);
                        tracing::error!(
                            event_id = %event.id,
                            retry_count,
                            error = %err,
                            "failed to publish outbox event"
                        );
                        if retry_count >= self.config.max_retries {
                            metrics::counter!("outbox_dead_letter_total").increment(1);
                            tracing::warn!(
                                event_id = %event.id,
                                event_type = %event.event_type,
                                "outbox event exhausted retries, dead-lettered in place"
                            );
                        }
                    }
                    Err(store_err) => {
                        tracing::error!(event_id = %event.id, error = %store_err, "failed to record publish failure");
                    }
                }
                Err(())
            }
        }
    }

    /// Spawns the publisher loop on the given cadence.
    ///
    /// The first tick fires immediately; ticks missed while a cycle runs
    /// are skipped rather than bursted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = self.run_cycle().await {
                    tracing::error!(error = %err, "outbox publisher cycle failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerError, InMemoryBroker, MessageBroker};
    use async_trait::async_trait;
    use domain::NewOutboxEvent;
    use store::InMemoryStore;
    use tokio::sync::Notify;

    fn event_with_payload(payload: serde_json::Value) -> NewOutboxEvent {
        NewOutboxEvent {
            event_type: "order.completed".to_string(),
            payload,
            exchange: "email-exchange".to_string(),
            routing_key: "user.pdf".to_string(),
        }
    }

    fn publisher(
        store: InMemoryStore,
        broker: InMemoryBroker,
    ) -> OutboxPublisher<InMemoryStore, InMemoryBroker> {
        OutboxPublisher::new(store, broker)
    }

    #[tokio::test]
    async fn one_failing_event_does_not_block_the_others() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();

        let a = store
            .insert_event(event_with_payload(serde_json::json!({"order": "A"})))
            .await
            .unwrap();
        let b = store
            .insert_event(event_with_payload(serde_json::json!({"order": "B"})))
            .await
            .unwrap();
        let c = store
            .insert_event(event_with_payload(serde_json::json!({"order": "C"})))
            .await
            .unwrap();
        broker.fail_payload(serde_json::json!({"order": "B"}));

        let report = publisher(store.clone(), broker.clone()).run_cycle().await.unwrap();
        assert_eq!(report.published, 2);
        assert_eq!(report.failed, 1);

        for (id, processed, retries) in [(a.id, true, 0), (b.id, false, 1), (c.id, true, 0)] {
            let stored = store.get_event(id).await.unwrap().unwrap();
            assert_eq!(stored.processed, processed, "event {id}");
            assert_eq!(stored.retry_count, retries, "event {id}");
        }
        assert_eq!(broker.published_count(), 2);
    }

    #[tokio::test]
    async fn event_stays_unprocessed_until_a_publish_succeeds() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        let event = store
            .insert_event(event_with_payload(serde_json::json!({"order": 1})))
            .await
            .unwrap();

        broker.set_fail_all(true);
        let publisher = publisher(store.clone(), broker.clone());
        publisher.run_cycle().await.unwrap();

        let stored = store.get_event(event.id).await.unwrap().unwrap();
        assert!(!stored.processed);
        assert_eq!(stored.retry_count, 1);

        broker.set_fail_all(false);
        publisher.run_cycle().await.unwrap();

        let stored = store.get_event(event.id).await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(broker.published_count(), 1);
    }

    #[tokio::test]
    async fn processed_events_are_never_republished() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        store
            .insert_event(event_with_payload(serde_json::json!({"order": 1})))
            .await
            .unwrap();

        let publisher = publisher(store.clone(), broker.clone());
        publisher.run_cycle().await.unwrap();
        publisher.run_cycle().await.unwrap();

        assert_eq!(broker.published_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_events_are_skipped_forever() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        let event = store
            .insert_event(event_with_payload(serde_json::json!({"order": 1})))
            .await
            .unwrap();
        broker.set_fail_all(true);

        let publisher = publisher(store.clone(), broker.clone());
        for _ in 0..MAX_RETRIES {
            publisher.run_cycle().await.unwrap();
        }
        let stored = store.get_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, MAX_RETRIES);
        assert!(!stored.processed);

        // Further cycles no longer pick the event up, even with the broker
        // healthy again.
        broker.set_fail_all(false);
        let report = publisher.run_cycle().await.unwrap();
        assert_eq!(report.published + report.failed, 0);

        let stored = store.get_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, MAX_RETRIES);
        assert!(!stored.processed);
        assert_eq!(broker.published_count(), 0);
    }

    /// Broker that blocks until released, to hold a cycle open.
    #[derive(Clone)]
    struct BlockingBroker {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl MessageBroker for BlockingBroker {
        async fn publish(
            &self,
            _exchange: &str,
            _routing_key: &str,
            _payload: &serde_json::Value,
        ) -> Result<(), BrokerError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn overlapping_cycles_are_skipped() {
        let store = InMemoryStore::new();
        store
            .insert_event(event_with_payload(serde_json::json!({"order": 1})))
            .await
            .unwrap();

        let broker = BlockingBroker {
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        let started = broker.started.clone();
        let release = broker.release.clone();

        let publisher = Arc::new(OutboxPublisher::new(store, broker));
        let running = {
            let publisher = publisher.clone();
            tokio::spawn(async move { publisher.run_cycle().await })
        };
        started.notified().await;

        let report = publisher.run_cycle().await.unwrap();
        assert!(report.skipped);

        release.notify_one();
        let first = running.await.unwrap().unwrap();
        assert_eq!(first.published, 1);
    }
}

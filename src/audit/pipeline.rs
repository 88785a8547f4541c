// Asynchronous audit ingestion: bounded queue, single consumer, sequential routing

use crate::constants::defaults;
use crate::core::errors::TrustError;
use crate::core::models::{AuditEvent, EventRecord};
use crate::core::resilience::{create_circuit_breaker, execute_with_cb, CollaboratorCircuitBreaker};
use crate::engine::rule_engine::RuleEngine;
use crate::engine::threat_detector::ThreatDetector;
use crate::state::AuditStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Queue and storage resilience settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub storage_failure_threshold: u32,
    pub storage_cooldown: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::AUDIT_QUEUE_CAPACITY,
            storage_failure_threshold: defaults::STORAGE_FAILURE_THRESHOLD,
            storage_cooldown: Duration::from_secs(defaults::STORAGE_COOLDOWN_SECS),
        }
    }
}

/// Point-in-time pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Events accepted onto the queue
    pub submitted: u64,
    /// Events rejected because the queue was full or closed
    pub dropped: u64,
    /// Events fully routed by the consumer
    pub processed: u64,
    pub storage_failures: u64,
    pub alerts_raised: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    storage_failures: AtomicU64,
    alerts_raised: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
        }
    }
}

/// State owned by the consumer task
struct Consumer {
    store: Arc<dyn AuditStore>,
    detector: Arc<ThreatDetector>,
    rules: Arc<RuleEngine>,
    breaker: CollaboratorCircuitBreaker,
    counters: Arc<Counters>,
}

impl Consumer {
    async fn run(self, mut events: mpsc::Receiver<AuditEvent>, mut shutdown: watch::Receiver<bool>) {
        info!("Audit consumer started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = events.recv() => match next {
                    Some(event) => self.process(event).await,
                    None => break,
                },
            }
        }
        info!("Audit consumer stopped");
    }

    /// persist -> threat detection -> rules, one event at a time
    async fn process(&self, event: AuditEvent) {
        let stored = execute_with_cb(&self.breaker, "audit-store", || self.store.store(&event)).await;
        if let Err(e) = stored {
            self.counters.storage_failures.fetch_add(1, Ordering::Relaxed);
            warn!(event_id = %event.id, error = %e, "Failed to persist audit event");
        }

        match self.detector.analyze(&event).await {
            Ok(alerts) => self.count_alerts(alerts.len()),
            Err(e) => warn!(event_id = %event.id, error = %e, "Threat detection failed"),
        }

        match self.rules.evaluate(&event).await {
            Ok(alerts) => self.count_alerts(alerts.len()),
            Err(e) => warn!(event_id = %event.id, error = %e, "Rule evaluation failed"),
        }

        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            risk_score = event.risk_score,
            "Audit event processed"
        );
    }

    fn count_alerts(&self, n: usize) {
        self.counters.alerts_raised.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Non-blocking audit event ingestion
///
/// Producers call [`AuditPipeline::submit`] from any thread. A single
/// consumer task stores each event, then runs threat detection and rule
/// evaluation in enqueue order.
pub struct AuditPipeline {
    sender: mpsc::Sender<AuditEvent>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl AuditPipeline {
    /// Spawn the consumer task. Must be called inside a Tokio runtime.
    pub fn start(
        config: PipelineConfig,
        store: Arc<dyn AuditStore>,
        detector: Arc<ThreatDetector>,
        rules: Arc<RuleEngine>,
    ) -> Result<Self, TrustError> {
        if config.queue_capacity == 0 {
            return Err(TrustError::ConfigurationError(
                "Audit queue capacity must be greater than 0".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let consumer = Consumer {
            store,
            detector,
            rules,
            breaker: create_circuit_breaker(config.storage_failure_threshold, config.storage_cooldown),
            counters: Arc::clone(&counters),
        };
        let worker = tokio::spawn(consumer.run(receiver, shutdown_rx));

        info!(queue_capacity = config.queue_capacity, "Audit pipeline started");

        Ok(Self {
            sender,
            shutdown,
            worker: Mutex::new(Some(worker)),
            counters,
        })
    }

    /// Enqueue an event; drops it if the queue is full or closed
    ///
    /// Never blocks and never fails. Drops are counted and logged.
    pub fn submit(&self, record: EventRecord) {
        let event = AuditEvent::from_record(record, Utc::now());

        match self.sender.try_send(event) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Audit queue full, event dropped"
                );
            }
            Err(TrySendError::Closed(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Audit pipeline stopped, event dropped"
                );
            }
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Stop the consumer after its in-flight event and wait for it to exit
    ///
    /// Events still queued are discarded. Calling `stop` twice is harmless.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);

        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Audit consumer task ended abnormally");
            }
        }
    }
}

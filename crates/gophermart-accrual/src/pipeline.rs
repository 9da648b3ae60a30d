//! Three-stage accrual pipeline.
//!
//! ```text
//! discovery --(order numbers)--> lookup --(ProcessingResult)--> apply
//!   polls storage                 AccrualLookup                  AccrualStore
//! ```
//!
//! Stages are connected by bounded queues, so a slow lookup stage throttles
//! discovery. There is no retry queue: an order whose lookup or apply fails
//! keeps its status in storage and is picked up again by the next poll.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use gophermart_db::Database;
use gophermart_types::models::ProcessingResult;

use crate::client::{AccrualClient, AccrualError};

/// Storage side of the pipeline. Calls are blocking and run on the blocking
/// thread pool.
pub trait AccrualStore: Send + Sync + 'static {
    /// Orders in `NEW` or `PROCESSING`, oldest first.
    fn orders_needing_accrual(&self) -> anyhow::Result<Vec<String>>;

    fn apply_accrual_result(&self, result: &ProcessingResult) -> anyhow::Result<bool>;
}

impl AccrualStore for Database {
    fn orders_needing_accrual(&self) -> anyhow::Result<Vec<String>> {
        Database::orders_needing_accrual(self)
    }

    fn apply_accrual_result(&self, result: &ProcessingResult) -> anyhow::Result<bool> {
        Database::apply_accrual_result(self, result)
    }
}

/// Remote side of the pipeline.
#[async_trait]
pub trait AccrualLookup: Send + Sync + 'static {
    async fn fetch_order(&self, number: &str) -> Result<ProcessingResult, AccrualError>;
}

#[async_trait]
impl AccrualLookup for AccrualClient {
    async fn fetch_order(&self, number: &str) -> Result<ProcessingResult, AccrualError> {
        AccrualClient::fetch_order(self, number).await
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Wait between polls when the last poll found work.
    pub poll_interval: Duration,
    /// Wait between polls when nothing was pending.
    pub idle_interval: Duration,
    /// Capacity of each hand-off queue.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            idle_interval: Duration::from_secs(10),
            queue_capacity: 64,
        }
    }
}

/// Order numbers currently between discovery and the end of apply.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    /// Returns false if the order is already in flight.
    fn claim(&self, number: &str) -> bool {
        match self.0.lock() {
            Ok(mut set) => set.insert(number.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(number.to_string()),
        }
    }

    fn release(&self, number: &str) {
        match self.0.lock() {
            Ok(mut set) => set.remove(number),
            Err(poisoned) => poisoned.into_inner().remove(number),
        };
    }
}

pub struct AccrualPipeline<S, L> {
    store: Arc<S>,
    lookup: Arc<L>,
    config: PipelineConfig,
}

impl<S: AccrualStore, L: AccrualLookup> AccrualPipeline<S, L> {
    pub fn new(store: Arc<S>, lookup: Arc<L>, config: PipelineConfig) -> Self {
        Self {
            store,
            lookup,
            config,
        }
    }

    /// Spawn the three stages. They run until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> PipelineHandle {
        let capacity = self.config.queue_capacity.max(1);
        let (numbers_tx, numbers_rx) = mpsc::channel::<String>(capacity);
        let (results_tx, results_rx) = mpsc::channel::<ProcessingResult>(capacity);
        let in_flight = InFlight::default();

        info!(
            poll = ?self.config.poll_interval,
            idle = ?self.config.idle_interval,
            capacity,
            "starting accrual pipeline"
        );

        let discovery = tokio::spawn(discover(
            self.store.clone(),
            numbers_tx,
            in_flight.clone(),
            self.config.clone(),
            cancel.clone(),
        ));
        let lookup = tokio::spawn(look_up(
            self.lookup,
            numbers_rx,
            results_tx,
            in_flight.clone(),
            cancel.clone(),
        ));
        let apply = tokio::spawn(apply(self.store, results_rx, in_flight, cancel));

        PipelineHandle {
            tasks: vec![discovery, lookup, apply],
        }
    }
}

pub struct PipelineHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Wait for every stage to finish.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("accrual pipeline stage panicked: {}", e);
            }
        }
    }
}

/// Stage A: poll storage and feed pending order numbers to the lookup stage.
async fn discover<S: AccrualStore>(
    store: Arc<S>,
    tx: mpsc::Sender<String>,
    in_flight: InFlight,
    config: PipelineConfig,
    cancel: CancellationToken,
) {
    loop {
        let polled = {
            let store = store.clone();
            tokio::task::spawn_blocking(move || store.orders_needing_accrual()).await
        };

        let pending = match polled {
            Ok(Ok(numbers)) => numbers,
            Ok(Err(e)) => {
                warn!("discovery: reading pending orders failed: {}", e);
                Vec::new()
            }
            Err(e) => {
                error!("discovery: spawn_blocking join error: {}", e);
                Vec::new()
            }
        };

        let wait = if pending.is_empty() {
            config.idle_interval
        } else {
            config.poll_interval
        };

        for number in pending {
            if !in_flight.claim(&number) {
                continue;
            }
            debug!(order = %number, "discovery: queued for lookup");
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("discovery stage stopped");
                    return;
                }
                sent = tx.send(number) => {
                    if sent.is_err() {
                        warn!("discovery: lookup stage is gone, stopping");
                        return;
                    }
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("discovery stage stopped");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

/// Stage B: ask the accrual service about each order.
async fn look_up<L: AccrualLookup>(
    lookup: Arc<L>,
    mut rx: mpsc::Receiver<String>,
    tx: mpsc::Sender<ProcessingResult>,
    in_flight: InFlight,
    cancel: CancellationToken,
) {
    loop {
        let number = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(number) => number,
                None => break,
            },
        };

        let fetched = tokio::select! {
            _ = cancel.cancelled() => {
                in_flight.release(&number);
                break;
            }
            fetched = lookup.fetch_order(&number) => fetched,
        };

        match fetched {
            Ok(result) if result.order_number != number => {
                warn!(
                    order = %number,
                    reported = %result.order_number,
                    "lookup: accrual service answered for a different order, ignoring"
                );
                in_flight.release(&number);
            }
            Ok(result) => {
                if tx.send(result).await.is_err() {
                    in_flight.release(&number);
                    warn!("lookup: apply stage is gone, stopping");
                    break;
                }
            }
            Err(AccrualError::RateLimited) => {
                debug!(order = %number, "lookup: rate limited, leaving for next poll");
                in_flight.release(&number);
            }
            Err(AccrualError::EmptyOrder) => {
                debug!(order = %number, "lookup: no accrual data yet");
                in_flight.release(&number);
            }
            Err(e) => {
                warn!(order = %number, error = %e, "lookup: accrual request failed");
                in_flight.release(&number);
            }
        }
    }
    info!("lookup stage stopped");
}

/// Stage C: persist results. A failed write leaves the order non-terminal for
/// the next poll to retry.
async fn apply<S: AccrualStore>(
    store: Arc<S>,
    mut rx: mpsc::Receiver<ProcessingResult>,
    in_flight: InFlight,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(result) => result,
                None => break,
            },
        };

        let number = result.order_number.clone();
        let written = {
            let store = store.clone();
            tokio::task::spawn_blocking(move || {
                let applied = store.apply_accrual_result(&result);
                (result, applied)
            })
            .await
        };

        match written {
            Ok((result, Ok(true))) => {
                info!(
                    order = %number,
                    status = ?result.status,
                    accrual = ?result.effective_accrual(),
                    "apply: accrual result stored"
                );
            }
            Ok((_, Ok(false))) => {
                debug!(order = %number, "apply: nothing to update");
            }
            Ok((_, Err(e))) => {
                error!(order = %number, error = %e, "apply: failed to store accrual result");
            }
            Err(e) => {
                error!(order = %number, "apply: spawn_blocking join error: {}", e);
            }
        }
        in_flight.release(&number);
    }
    info!("apply stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_claims_once_until_released() {
        let in_flight = InFlight::default();
        assert!(in_flight.claim("1230"));
        assert!(!in_flight.claim("1230"));
        in_flight.release("1230");
        assert!(in_flight.claim("1230"));
    }

    #[test]
    fn default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.idle_interval, Duration::from_secs(10));
        assert_eq!(config.queue_capacity, 64);
    }
}

//! The consumer loop: pop, decode, transform, deliver, repeat.
//!
//! The loop is a two-state machine. In [`LoopState::Waiting`] it blocks on the
//! queue for a bounded window; a popped message moves it to
//! [`LoopState::Processing`], and handling that message always brings it back
//! to `Waiting`, whatever the delivery outcome. One message is in flight at a
//! time and nothing is requeued.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{QUEUE_BLOCK_TIME, QUEUE_ERROR_BACKOFF};
use crate::delivery::{DeliveryClient, Receiver};
use crate::models::{ReceiverPayload, SchemaVersion, SensorReading};
use crate::queue::MessageQueue;
use crate::retry::RetryPolicy;

// ---

/// Where the loop currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Waiting,
    Processing(Vec<u8>),
}

/// Per-receiver result of one message. `secondary` is `None` when disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub primary: bool,
    pub secondary: Option<bool>,
}

/// What a single [`Worker::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Wait window elapsed with an empty queue.
    Idle,
    /// Pop failed; the backoff has already been slept.
    QueueError,
    /// A message was popped and is now being processed.
    Received,
    /// The message did not decode and was dropped.
    Discarded,
    /// Delivery was attempted on every configured receiver.
    Dispatched(DispatchReport),
}

/// Timing and schema knobs for the loop.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    // ---
    pub schema_version: SchemaVersion,
    pub retry: RetryPolicy,
    pub queue_wait: Duration,
    pub queue_error_backoff: Duration,
}

impl WorkerSettings {
    /// Production timings for the given schema.
    pub fn new(schema_version: SchemaVersion) -> Self {
        WorkerSettings {
            schema_version,
            retry: RetryPolicy::default(),
            queue_wait: QUEUE_BLOCK_TIME,
            queue_error_backoff: QUEUE_ERROR_BACKOFF,
        }
    }
}

/// Everything the loop needs, built once at startup and owned here.
pub struct Worker<Q> {
    queue: Q,
    client: DeliveryClient,
    primary: Receiver,
    secondary: Option<Receiver>,
    settings: WorkerSettings,
    state: LoopState,
}

impl<Q: MessageQueue> Worker<Q> {
    // ---
    pub fn new(
        queue: Q,
        client: DeliveryClient,
        primary: Receiver,
        secondary: Option<Receiver>,
        settings: WorkerSettings,
    ) -> Self {
        Worker {
            queue,
            client,
            primary,
            secondary,
            settings,
            state: LoopState::Waiting,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Step forever. Only process termination stops the loop.
    pub async fn run(mut self) {
        // ---
        info!(
            schema = %self.settings.schema_version,
            secondary = self.secondary.is_some(),
            "Worker started"
        );
        loop {
            self.step().await;
        }
    }

    /// Perform exactly one state transition.
    pub async fn step(&mut self) -> StepOutcome {
        // ---
        match std::mem::replace(&mut self.state, LoopState::Waiting) {
            LoopState::Waiting => match self.queue.pop(self.settings.queue_wait).await {
                Ok(Some(raw)) => {
                    debug!(bytes = raw.len(), "Message received");
                    self.state = LoopState::Processing(raw);
                    StepOutcome::Received
                }
                Ok(None) => StepOutcome::Idle,
                Err(e) => {
                    error!(error = %e, "Failed to pop from queue, backing off");
                    tokio::time::sleep(self.settings.queue_error_backoff).await;
                    StepOutcome::QueueError
                }
            },
            LoopState::Processing(raw) => self.process(&raw).await,
        }
    }

    async fn process(&self, raw: &[u8]) -> StepOutcome {
        // ---
        let reading = match SensorReading::decode(raw, self.settings.schema_version) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(
                    schema = %self.settings.schema_version,
                    error = %e,
                    raw = %String::from_utf8_lossy(raw),
                    "Discarding message that does not decode"
                );
                return StepOutcome::Discarded;
            }
        };

        let payload = reading.to_payload();
        info!(
            city = reading.city(),
            observed_at = ?reading.observed_at(),
            "Dispatching reading"
        );

        // Secondary is attempted regardless of how primary went.
        let primary = self.dispatch(&self.primary, &payload).await;
        let secondary = match &self.secondary {
            Some(receiver) => Some(self.dispatch(receiver, &payload).await),
            None => {
                debug!("Secondary receiver disabled, skipping");
                None
            }
        };

        StepOutcome::Dispatched(DispatchReport { primary, secondary })
    }

    async fn dispatch(&self, receiver: &Receiver, payload: &ReceiverPayload) -> bool {
        // ---
        let client = &self.client;
        match self
            .settings
            .retry
            .run(|| client.deliver(receiver, payload))
            .await
        {
            Ok(()) => {
                info!(receiver = receiver.name, url = %receiver.url, "Reading delivered");
                true
            }
            Err(e) => {
                error!(
                    receiver = receiver.name,
                    url = %receiver.url,
                    attempts = e.attempts,
                    error = %e.last,
                    "Delivery failed, dropping reading"
                );
                false
            }
        }
    }
}

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use bsn_core::TelemetryEvent;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The viewer is not draining its queue fast enough.
    #[error("subscriber queue is full")]
    Full,

    #[error("subscriber is closed")]
    Closed,
}

/// Output side of one live viewer.
///
/// `try_deliver` must not block: the hub calls it from the ingestion context.
pub trait SubscriberSink: Send + Sync {
    fn try_deliver(&self, event: &Arc<TelemetryEvent>) -> Result<(), DeliveryError>;
}

/// Bounded channel sink; the receiving half backs a [`crate::Subscription`].
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<TelemetryEvent>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Arc<TelemetryEvent>>) -> Self {
        Self { tx }
    }
}

impl SubscriberSink for ChannelSink {
    fn try_deliver(&self, event: &Arc<TelemetryEvent>) -> Result<(), DeliveryError> {
        self.tx.try_send(Arc::clone(event)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

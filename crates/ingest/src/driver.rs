use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bsn_core::TelemetrySink;

use crate::handler::MessageHandler;
use crate::normalizer::{normalize, NormalizeFn};

/// Counters exposed on the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub dropped: u64,
}

/// Turns raw channel messages into events and forwards each one to every sink.
///
/// The normalizer is injected so tests can swap it; production wiring uses
/// [`normalize`].
pub struct IngestionDriver {
    normalizer: NormalizeFn,
    sinks: Vec<Arc<dyn TelemetrySink>>,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl IngestionDriver {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self::with_normalizer(normalize, sinks)
    }

    pub fn with_normalizer(normalizer: NormalizeFn, sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self {
            normalizer,
            sinks,
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl MessageHandler for IngestionDriver {
    fn on_message(&self, channel: &str, payload: &[u8]) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let raw = String::from_utf8_lossy(payload);

        let Some(event) = (self.normalizer)(&raw, channel) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(channel, "payload did not normalize, dropped");
            return;
        };

        let event = Arc::new(event);
        for sink in &self.sinks {
            sink.accept(Arc::clone(&event));
        }
    }
}

//! Subscriber registry and publish path.
//!
//! Publishing snapshots the current entries under a short read lock and then
//! delivers without holding it, so viewers can connect and disconnect while a
//! publish pass is running. Failed subscribers are removed once the pass ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use bsn_core::{TelemetryEvent, TelemetrySink};

use crate::filter::SubscriberFilter;
use crate::sink::{ChannelSink, SubscriberSink};
use crate::subscription::Subscription;

pub type SubscriberId = u64;

const DEFAULT_BUFFER: usize = 256;

struct Entry {
    filter: SubscriberFilter,
    sink: Arc<dyn SubscriberSink>,
    /// Set when the entry leaves the registry; a snapshot taken earlier must not send to it.
    removed: AtomicBool,
}

pub(crate) struct HubInner {
    entries: RwLock<HashMap<SubscriberId, Arc<Entry>>>,
    next_id: AtomicU64,
    buffer: usize,
    /// Set by `close_all`; later registrations are dropped immediately.
    closed: AtomicBool,
}

impl HubInner {
    pub(crate) fn remove(&self, id: SubscriberId, reason: &str) -> bool {
        let removed = match self.entries.write() {
            Ok(mut entries) => entries.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };
        match removed {
            Some(entry) => {
                entry.removed.store(true, Ordering::Release);
                debug!(subscriber = id, reason, "subscriber removed");
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> Vec<(SubscriberId, Arc<Entry>)> {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.iter().map(|(id, e)| (*id, Arc::clone(e))).collect()
    }
}

/// Fan-out of telemetry events to live viewers. Cheap to clone.
#[derive(Clone)]
pub struct DistributionHub {
    inner: Arc<HubInner>,
}

impl Default for DistributionHub {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl DistributionHub {
    /// `buffer` bounds each viewer's queue; a full queue counts as a failed write.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                entries: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a sink under `filter`. The caller owns removal via [`Self::unsubscribe`].
    pub fn register(&self, filter: SubscriberFilter, sink: Arc<dyn SubscriberSink>) -> SubscriberId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(Entry {
            filter,
            sink,
            removed: AtomicBool::new(false),
        });
        let mut entries = match self.inner.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.inner.closed.load(Ordering::Acquire) {
            debug!(subscriber = id, "hub closed, subscriber rejected");
            return id;
        }
        entries.insert(id, entry);
        drop(entries);
        debug!(subscriber = id, "subscriber added");
        id
    }

    /// Register a channel-backed viewer. The returned stream ends on timeout,
    /// on removal after a failed write, or when dropped, and the registry entry
    /// is removed exactly once in every case.
    pub fn subscribe(&self, filter: SubscriberFilter, timeout: Option<Duration>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let id = self.register(filter, Arc::new(ChannelSink::new(tx)));
        Subscription::new(id, rx, Arc::clone(&self.inner), timeout)
    }

    /// Remove a subscriber. Returns `false` when it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.remove(id, "unsubscribed")
    }

    /// Remove every subscriber and refuse new ones. Dropping the sinks ends
    /// each channel-backed stream once its buffered events are drained.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<Entry>> = {
            let mut entries = match self.inner.entries.write() {
                Ok(entries) => entries,
                Err(poisoned) => poisoned.into_inner(),
            };
            self.inner.closed.store(true, Ordering::Release);
            entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &drained {
            entry.removed.store(true, Ordering::Release);
        }
        debug!(count = drained.len(), "all subscribers closed");
        drained.len()
    }

    /// Deliver `event` to every matching subscriber. Returns how many accepted it.
    pub fn publish(&self, event: &Arc<TelemetryEvent>) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, entry) in self.inner.snapshot() {
            if entry.removed.load(Ordering::Acquire) || !entry.filter.matches(event) {
                continue;
            }
            match entry.sink.try_deliver(event) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(subscriber = id, error = %e, "delivery failed");
                    failed.push(id);
                }
            }
        }

        for id in failed {
            self.inner.remove(id, "delivery failed");
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        match self.inner.entries.read() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        match self.inner.entries.read() {
            Ok(entries) => entries.contains_key(&id),
            Err(poisoned) => poisoned.into_inner().contains_key(&id),
        }
    }
}

impl TelemetrySink for DistributionHub {
    fn accept(&self, event: Arc<TelemetryEvent>) {
        self.publish(&event);
    }

    fn name(&self) -> &str {
        "distribution-hub"
    }
}

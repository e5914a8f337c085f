use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};

use bsn_core::TelemetryEvent;

use crate::hub::{HubInner, SubscriberId};

/// Handle of one registered viewer, consumed as a stream of events.
///
/// The stream ends on timeout or once the hub dropped the subscriber after a
/// failed write (buffered events are still yielded first). Dropping the handle
/// unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<TelemetryEvent>>,
    hub: Arc<HubInner>,
    deadline: Option<Pin<Box<Sleep>>>,
    finished: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        rx: mpsc::Receiver<Arc<TelemetryEvent>>,
        hub: Arc<HubInner>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            id,
            rx,
            hub,
            deadline: timeout.map(|t| Box::pin(tokio::time::sleep_until(Instant::now() + t))),
            finished: false,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    fn finish(&mut self, reason: &str) {
        if !self.finished {
            self.finished = true;
            self.rx.close();
            self.hub.remove(self.id, reason);
        }
    }
}

impl Stream for Subscription {
    type Item = Arc<TelemetryEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if let Some(deadline) = this.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                this.finish("timeout");
                return Poll::Ready(None);
            }
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(event)),
            Poll::Ready(None) => {
                this.finish("sink closed");
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.finish("viewer disconnected");
    }
}

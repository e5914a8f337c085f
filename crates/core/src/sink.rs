use std::sync::Arc;

use crate::event::TelemetryEvent;

/// Downstream consumer of normalized telemetry.
///
/// Called from the ingestion context for every event, so implementations must
/// return quickly: anything involving network I/O is dispatched in the
/// background and its failure is the sink's own concern.
pub trait TelemetrySink: Send + Sync {
    fn accept(&self, event: Arc<TelemetryEvent>);

    /// Name used in logs.
    fn name(&self) -> &str;
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Arc<T> {
    fn accept(&self, event: Arc<TelemetryEvent>) {
        (**self).accept(event)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

//! Transaction lifecycle callbacks

use serde_json::Value;

/// Callbacks invoked as a transaction moves through requery and cancellation.
///
/// Every method has a no-op default, so implementors only override what they
/// care about. Per requery chain exactly one of `on_successful`,
/// `on_failure`, `on_timeout`, `on_requery_error` (or `on_cancel` when the
/// chain is cancelled) fires.
pub trait EventSink: Send + Sync {
    /// A requery attempt is about to be made
    fn on_requery(&self, _reference: &str) {}

    /// Gateway confirmed the transaction (`data.status == successful`)
    fn on_successful(&self, _data: &Value) {}

    /// Gateway marked the transaction failed
    fn on_failure(&self, _data: &Value) {}

    /// No decisive status after the maximum number of requeries.
    ///
    /// The transaction should be handed to an out-of-band poller.
    fn on_timeout(&self, _reference: &str, _raw_body: &str) {}

    /// Requery call failed or the gateway returned an error envelope
    fn on_requery_error(&self, _raw_body: &str) {}

    /// Customer cancelled the payment
    fn on_cancel(&self, _reference: &str) {}
}

/// Sink that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {}

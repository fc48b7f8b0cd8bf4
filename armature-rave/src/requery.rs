//! Transaction requery loop
//!
//! Polls `GET /v3/transactions/{id}/verify` until the gateway reports a
//! decisive status, the attempt budget runs out, or the caller cancels.
//! Attempts run strictly one after another with a delay in between.

use crate::error::{RaveError, RaveResult};
use crate::events::EventSink;
use crate::response::{GatewayEnvelope, TransactionStatus};
use crate::transport::{GatewayRequest, Transport, path_segment};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Requery retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequeryPolicy {
    /// Retries allowed after the first attempt before giving up
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RequeryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}

/// Loop state for one requery chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequeryState {
    /// Transaction being polled
    pub reference: String,
    /// Attempts made so far
    pub attempts: u32,
    /// Retry ceiling
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RequeryState {
    /// Fresh state for `reference`
    pub fn new(reference: impl Into<String>, policy: &RequeryPolicy) -> Self {
        Self {
            reference: reference.into(),
            attempts: 0,
            max_attempts: policy.max_attempts,
            delay: policy.delay,
        }
    }

    /// Attempt budget is used up
    pub fn exhausted(&self) -> bool {
        self.attempts > self.max_attempts
    }
}

/// Waits between requery attempts
#[async_trait]
pub trait RequeryDelay: Send + Sync {
    /// Wait for `duration`
    async fn wait(&self, duration: Duration);
}

/// Non-blocking delay on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl RequeryDelay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Flag for abandoning an in-progress requery chain.
///
/// Checked before each attempt. Stays set until [`CancelHandle::reset`].
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Create an unset handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clear a previous cancellation
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How a requery chain ended
#[derive(Debug)]
pub enum RequeryOutcome {
    /// `data.status == successful`
    Successful(Value),
    /// `data.status == failed`
    Failed(Value),
    /// Still undecided after the last allowed attempt
    TimedOut {
        reference: String,
        attempts: u32,
        body: String,
    },
    /// Transport failure, undecodable body or gateway error envelope
    Error(RaveError),
    /// Cancelled through the [`CancelHandle`]
    Cancelled { reference: String, attempts: u32 },
}

impl RequeryOutcome {
    /// Chain ended on a `successful` or `failed` status
    pub fn is_decisive(&self) -> bool {
        matches!(self, Self::Successful(_) | Self::Failed(_))
    }

    /// Decisive status and transaction data, or the reason there is none
    pub fn into_result(self) -> RaveResult<(TransactionStatus, Value)> {
        match self {
            Self::Successful(data) => Ok((TransactionStatus::Successful, data)),
            Self::Failed(data) => Ok((TransactionStatus::Failed, data)),
            Self::TimedOut {
                reference,
                attempts,
                ..
            } => Err(RaveError::TimeoutExceeded {
                reference,
                attempts,
            }),
            Self::Error(err) => Err(err),
            Self::Cancelled { reference, .. } => Err(RaveError::UndecisiveStatus {
                reference,
                status: "cancelled".to_string(),
            }),
        }
    }
}

/// Verification endpoint for a transaction id, encoded as one path segment
pub fn verify_path(reference: &str) -> RaveResult<String> {
    Ok(format!("/v3/transactions/{}/verify", path_segment(reference)?))
}

/// Runs one requery chain against a transport
pub struct RequeryEngine<'a> {
    transport: &'a dyn Transport,
    sink: Option<&'a dyn EventSink>,
    delay: &'a dyn RequeryDelay,
    policy: &'a RequeryPolicy,
    cancel: &'a CancelHandle,
}

impl<'a> RequeryEngine<'a> {
    /// Create an engine
    pub fn new(
        transport: &'a dyn Transport,
        sink: Option<&'a dyn EventSink>,
        delay: &'a dyn RequeryDelay,
        policy: &'a RequeryPolicy,
        cancel: &'a CancelHandle,
    ) -> Self {
        Self {
            transport,
            sink,
            delay,
            policy,
            cancel,
        }
    }

    /// Poll until a terminal state. Exactly one terminal callback fires.
    pub async fn run(&self, reference: &str) -> RequeryOutcome {
        let mut state = RequeryState::new(reference, self.policy);

        let path = match verify_path(reference) {
            Ok(path) => path,
            Err(err) => {
                warn!(reference = %reference, error = %err, "Refusing to requery");
                return self.requery_error(reference, err);
            }
        };

        loop {
            if self.cancel.is_cancelled() {
                info!(reference = %state.reference, attempts = state.attempts, "Requery cancelled");
                if let Some(sink) = self.sink {
                    sink.on_cancel(&state.reference);
                }
                return RequeryOutcome::Cancelled {
                    reference: state.reference,
                    attempts: state.attempts,
                };
            }

            state.attempts += 1;
            info!(reference = %state.reference, attempt = state.attempts, "Requerying transaction");
            if let Some(sink) = self.sink {
                sink.on_requery(&state.reference);
            }

            let response = match self
                .transport
                .send(GatewayRequest::get(path.clone()))
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    warn!(reference = %state.reference, error = %err, "Requery call failed");
                    return self.requery_error(&err.to_string(), err);
                }
            };

            let envelope = match GatewayEnvelope::parse(&response.body) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(reference = %state.reference, status = response.status, "Requery returned an undecodable body");
                    return self.requery_error(&response.body, err);
                }
            };

            if !envelope.is_success() {
                warn!(reference = %state.reference, status = %envelope.status, "Requery returned an error envelope");
                let err = RaveError::Gateway(envelope.message_or_default());
                return self.requery_error(&response.body, err);
            }

            let data = envelope.data.clone().unwrap_or(Value::Null);
            match TransactionStatus::from_str(envelope.data_status().unwrap_or_default()) {
                TransactionStatus::Successful => {
                    info!(reference = %state.reference, "Requeried a successful transaction");
                    if let Some(sink) = self.sink {
                        sink.on_successful(&data);
                    }
                    return RequeryOutcome::Successful(data);
                }
                TransactionStatus::Failed => {
                    warn!(reference = %state.reference, "Requeried a failed transaction");
                    if let Some(sink) = self.sink {
                        sink.on_failure(&data);
                    }
                    return RequeryOutcome::Failed(data);
                }
                TransactionStatus::Pending(status) => {
                    warn!(
                        reference = %state.reference,
                        attempt = state.attempts,
                        status = %status,
                        "Requeried an undecided transaction"
                    );

                    if state.exhausted() {
                        warn!(reference = %state.reference, attempts = state.attempts, "Requery attempts exhausted");
                        if let Some(sink) = self.sink {
                            sink.on_timeout(&state.reference, &response.body);
                        }
                        return RequeryOutcome::TimedOut {
                            reference: state.reference,
                            attempts: state.attempts,
                            body: response.body,
                        };
                    }

                    debug!(delay = ?state.delay, "Delaying next requery");
                    self.delay.wait(state.delay).await;
                }
            }
        }
    }

    fn requery_error(&self, raw_body: &str, err: RaveError) -> RequeryOutcome {
        if let Some(sink) = self.sink {
            sink.on_requery_error(raw_body);
        }
        RequeryOutcome::Error(err)
    }
}

//! Flutterwave Rave v3 Module for Armature Framework
//!
//! Drives the card and mobile money authorization flow against the Rave v3
//! gateway: initiate a charge, act on the authorization mode the gateway asks
//! for, then requery the transaction until it settles. Saved card tokens
//! and preauthorized charges go through `token_charge` and `preauth`.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     ChargeOrchestrator                          │
//! │                                                                 │
//! │   charge() ──► card: 3DES {client} ──┐                          │
//! │            ──► momo / mpesa: JSON ───┼──► Transport ──► Rave    │
//! │                                      │                          │
//! │   ChargeOutcome ◄── redirect | pin/avs | otp | passthrough      │
//! │                                                                 │
//! │   requery_transaction() ──► verify (≤ 1 + max_attempts calls)   │
//! │            │                                                    │
//! │            ▼                                                    │
//! │   EventSink: on_requery → on_successful | on_failure |          │
//! │                           on_timeout | on_requery_error         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use armature_rave::{ChargeOrchestrator, ChargeRequest, ChargeType, CardDetails, RaveConfig};
//!
//! let config = RaveConfig::from_env()?;
//! let mut rave = ChargeOrchestrator::connect(config, ChargeType::Card)?
//!     .with_event_sink(Arc::new(MyHandler));
//!
//! let outcome = rave.charge(
//!     ChargeRequest::new(Decimal::from(100), "NGN", "user@example.com")
//!         .card(CardDetails::new("5531886652142950", "564", "09", "32")),
//! ).await?;
//!
//! if let Some(url) = outcome.redirect_url() {
//!     // send the customer to `url`, then requery when they come back
//! }
//!
//! rave.requery_transaction(&transaction_id).await;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod reference;
pub mod requery;
pub mod response;
pub mod signer;
pub mod transport;
pub mod types;

pub use config::*;
pub use error::*;
pub use events::*;
pub use orchestrator::*;
pub use reference::*;
pub use requery::*;
pub use response::*;
pub use transport::*;
pub use types::*;

//! Charge orchestration
//!
//! One [`ChargeOrchestrator`] drives one logical transaction: it owns the
//! transaction reference, dispatches the charge for its payment family,
//! classifies the gateway's authorization response and runs the requery
//! chain that settles the final status.

use crate::config::RaveConfig;
use crate::error::{RaveError, RaveResult};
use crate::events::EventSink;
use crate::reference::ReferenceGenerator;
use crate::requery::{CancelHandle, RequeryDelay, RequeryEngine, RequeryOutcome, TokioDelay, verify_path};
use crate::response::GatewayEnvelope;
use crate::signer;
use crate::transport::{GatewayRequest, HttpTransport, Transport};
use crate::types::{
    AuthorizationMode, ChargeOutcome, ChargeRequest, ChargeType, PreauthAction, TokenChargeRequest,
    ValidationType,
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// OTP validation endpoint
pub const VALIDATE_CHARGE_PATH: &str = "/v3/validate-charge";

/// Saved card token charge endpoint
pub const TOKENIZED_CHARGE_PATH: &str = "/v3/tokenized-charges";

/// Drives charge, validation and requery for one transaction
pub struct ChargeOrchestrator<T: Transport = HttpTransport> {
    config: Arc<RaveConfig>,
    transport: Arc<T>,
    charge_type: ChargeType,
    reference: String,
    sink: Option<Arc<dyn EventSink>>,
    delay: Arc<dyn RequeryDelay>,
    cancel: CancelHandle,
    auth_model: Option<String>,
    flw_ref: Option<String>,
}

impl ChargeOrchestrator<HttpTransport> {
    /// Create an orchestrator over HTTP
    pub fn connect(config: RaveConfig, charge_type: ChargeType) -> RaveResult<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(config, transport, charge_type))
    }
}

impl<T: Transport> ChargeOrchestrator<T> {
    /// Create an orchestrator and generate its transaction reference
    pub fn new(config: RaveConfig, transport: T, charge_type: ChargeType) -> Self {
        let reference =
            ReferenceGenerator::generate(&config.transaction_prefix, config.override_reference);
        info!(reference = %reference, channel = charge_type.channel(), "Rave orchestrator initialized");

        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            charge_type,
            reference,
            sink: None,
            delay: Arc::new(TokioDelay),
            cancel: CancelHandle::new(),
            auth_model: None,
            flw_ref: None,
        }
    }

    /// M-Pesa orchestrator
    pub fn mpesa(config: RaveConfig, transport: T) -> Self {
        Self::new(config, transport, ChargeType::mpesa())
    }

    /// Set the event sink
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the delay used between requery attempts
    pub fn with_requery_delay(mut self, delay: Arc<dyn RequeryDelay>) -> Self {
        self.delay = delay;
        self
    }

    /// Configuration
    pub fn config(&self) -> &RaveConfig {
        &self.config
    }

    /// Transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Payment family
    pub fn charge_type(&self) -> &ChargeType {
        &self.charge_type
    }

    /// Current transaction reference
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Replace the transaction reference
    pub fn set_reference(&mut self, reference: impl Into<String>) {
        self.reference = reference.into();
    }

    /// Generate a fresh reference for a new logical transaction
    pub fn regenerate_reference(&mut self) -> &str {
        self.reference = ReferenceGenerator::generate(
            &self.config.transaction_prefix,
            self.config.override_reference,
        );
        debug!(reference = %self.reference, "Generated reference number");
        &self.reference
    }

    /// Authorization model recorded by the last charge
    pub fn auth_model(&self) -> Option<&str> {
        self.auth_model.as_deref()
    }

    /// Gateway reference recorded by the last charge
    pub fn flw_ref(&self) -> Option<&str> {
        self.flw_ref.as_deref()
    }

    /// Handle for cancelling a running requery chain.
    ///
    /// Cancellation is sticky: once set, every later [`requery_transaction`]
    /// on this orchestrator returns [`RequeryOutcome::Cancelled`] without
    /// calling the gateway until [`CancelHandle::reset`] is called.
    ///
    /// ```
    /// use armature_rave::{ChargeOrchestrator, ChargeType, RaveConfig, RequeryOutcome};
    ///
    /// # tokio_test::block_on(async {
    /// let mut rave = ChargeOrchestrator::connect(RaveConfig::new("FLWSECK_TEST-abc"), ChargeType::Card)?;
    /// let cancel = rave.cancel_handle();
    /// cancel.cancel();
    ///
    /// let outcome = rave.requery_transaction("288200108").await;
    /// assert!(matches!(outcome, RequeryOutcome::Cancelled { attempts: 0, .. }));
    ///
    /// cancel.reset();
    /// assert!(!rave.cancel_handle().is_cancelled());
    /// # Ok::<(), armature_rave::RaveError>(())
    /// # }).unwrap();
    /// ```
    ///
    /// [`requery_transaction`]: Self::requery_transaction
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Initiate a charge and classify the gateway's answer.
    ///
    /// `tx_ref` defaults to the current reference when absent or empty.
    pub async fn charge(&mut self, mut request: ChargeRequest) -> RaveResult<ChargeOutcome> {
        if !request.has_tx_ref() {
            request.tx_ref = Some(self.reference.clone());
        }
        request.validate(&self.charge_type)?;

        match self.charge_type {
            ChargeType::Card => self.charge_card(&request).await,
            ChargeType::MobileMoney { .. } => self.charge_mobile_money(&request).await,
            ChargeType::Other { .. } => self.charge_other(&request).await,
        }
    }

    async fn charge_card(&mut self, request: &ChargeRequest) -> RaveResult<ChargeOutcome> {
        info!(reference = ?request.tx_ref, "Checking payment details");

        let payload = serde_json::to_string(request)?;
        let client = signer::encrypt(&payload, &self.encryption_key())?;

        let (raw, envelope) = self
            .post(&self.charge_type.endpoint(), json!({ "client": client }))
            .await?;

        if !envelope.is_success() {
            let message = envelope.message_or_default();
            warn!(message = %message, "Card charge rejected");
            return Ok(ChargeOutcome::Error { message });
        }

        let mode = envelope
            .authorization_mode()
            .map(AuthorizationMode::from_str)
            .ok_or_else(|| RaveError::UnclassifiedAuthMode("missing".to_string()))?;
        info!(mode = %mode, "Payment requires validation");

        match mode {
            AuthorizationMode::Redirect => {
                let url = envelope
                    .authorization_redirect()
                    .ok_or_else(|| {
                        RaveError::MalformedResponse(
                            "redirect authorization without a redirect url".to_string(),
                        )
                    })?
                    .to_string();
                self.auth_model = Some(mode.to_string());
                Ok(ChargeOutcome::Redirect {
                    url,
                    response: envelope,
                })
            }
            AuthorizationMode::Pin | AuthorizationMode::AvsNoauth => {
                self.auth_model = Some(mode.to_string());
                Ok(ChargeOutcome::PinOrAvs(raw))
            }
            AuthorizationMode::Otp => {
                let flw_ref = envelope
                    .data_str("flw_ref")
                    .ok_or_else(|| {
                        RaveError::MalformedResponse("otp authorization without flw_ref".to_string())
                    })?
                    .to_string();
                let id = envelope
                    .data
                    .as_ref()
                    .and_then(|d| d.get("id"))
                    .cloned()
                    .unwrap_or(Value::Null);

                self.auth_model = Some(mode.to_string());
                self.flw_ref = Some(flw_ref.clone());
                Ok(ChargeOutcome::Otp {
                    flw_ref,
                    id,
                    auth_mode: mode.to_string(),
                })
            }
            AuthorizationMode::Unknown(other) => {
                warn!(mode = %other, "Unclassified authorization mode");
                Err(RaveError::UnclassifiedAuthMode(other))
            }
        }
    }

    async fn charge_mobile_money(&mut self, request: &ChargeRequest) -> RaveResult<ChargeOutcome> {
        let (raw, envelope) = self
            .post(&self.charge_type.endpoint(), serde_json::to_value(request)?)
            .await?;

        let redirect = envelope
            .authorization()
            .and_then(|auth| auth.get("redirect"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(url) = &redirect {
            debug!(url = %url, "Mobile money charge requires redirect");
        }

        Ok(ChargeOutcome::Passthrough {
            response: raw,
            redirect,
        })
    }

    async fn charge_other(&mut self, request: &ChargeRequest) -> RaveResult<ChargeOutcome> {
        let (raw, envelope) = self
            .post(&self.charge_type.endpoint(), serde_json::to_value(request)?)
            .await?;

        let redirect = envelope.meta_redirect().map(str::to_string);

        if envelope.data_status().is_some() {
            info!("Payment requires validation");
            self.auth_model = envelope.data_str("auth_model").map(str::to_string);
            self.flw_ref = envelope.data_str("flw_ref").map(str::to_string);
            if let Some(tx_ref) = envelope.data_str("tx_ref") {
                debug!(from = %self.reference, to = %tx_ref, "Adopting gateway transaction reference");
                self.reference = tx_ref.to_string();
            }
        }

        Ok(ChargeOutcome::Passthrough {
            response: raw,
            redirect,
        })
    }

    /// Submit the OTP for a charge
    pub async fn validate_charge(
        &self,
        otp: &str,
        flw_ref: &str,
        kind: ValidationType,
    ) -> RaveResult<GatewayEnvelope> {
        if otp.trim().is_empty() {
            return Err(RaveError::Validation("otp is required".to_string()));
        }
        info!(flw_ref = %flw_ref, "Validating otp");

        let body = json!({
            "type": kind,
            "flw_ref": flw_ref,
            "otp": otp,
        });
        let (_, envelope) = self.post(VALIDATE_CHARGE_PATH, body).await?;

        if !envelope.is_success() {
            return Err(RaveError::Gateway(envelope.message_or_default()));
        }
        Ok(envelope)
    }

    /// Charge a saved card token.
    ///
    /// `tx_ref` defaults to the current reference when absent or empty.
    pub async fn token_charge(
        &mut self,
        mut request: TokenChargeRequest,
    ) -> RaveResult<GatewayEnvelope> {
        if !request.has_tx_ref() {
            request.tx_ref = Some(self.reference.clone());
        }
        request.validate()?;
        info!(reference = ?request.tx_ref, "Charging saved card token");

        let (_, envelope) = self
            .post(TOKENIZED_CHARGE_PATH, serde_json::to_value(&request)?)
            .await?;

        if !envelope.is_success() {
            return Err(RaveError::Gateway(envelope.message_or_default()));
        }
        if let Some(flw_ref) = envelope.data_str("flw_ref") {
            self.flw_ref = Some(flw_ref.to_string());
        }
        Ok(envelope)
    }

    /// Capture, void or refund a preauthorized charge
    pub async fn preauth(
        &self,
        flw_ref: &str,
        action: PreauthAction,
    ) -> RaveResult<GatewayEnvelope> {
        action.validate()?;
        let path = action.endpoint(flw_ref)?;
        info!(flw_ref = %flw_ref, action = action.as_str(), "Updating preauthorized charge");

        let (_, envelope) = self.post(&path, action.body()).await?;

        if !envelope.is_success() {
            return Err(RaveError::Gateway(envelope.message_or_default()));
        }
        Ok(envelope)
    }

    /// Capture held funds, all of them when `amount` is `None`
    pub async fn capture_funds(
        &self,
        flw_ref: &str,
        amount: Option<Decimal>,
    ) -> RaveResult<GatewayEnvelope> {
        self.preauth(flw_ref, PreauthAction::Capture { amount }).await
    }

    /// Release a hold
    pub async fn void_preauth(&self, flw_ref: &str) -> RaveResult<GatewayEnvelope> {
        self.preauth(flw_ref, PreauthAction::Void).await
    }

    /// Refund captured funds, all of them when `amount` is `None`
    pub async fn refund_preauth(
        &self,
        flw_ref: &str,
        amount: Option<Decimal>,
    ) -> RaveResult<GatewayEnvelope> {
        self.preauth(flw_ref, PreauthAction::Refund { amount }).await
    }

    /// Fetch the verification envelope for a transaction once
    pub async fn verify_transaction(&self, id: &str) -> RaveResult<GatewayEnvelope> {
        info!(id = %id, "Verifying transaction");
        let response = self.transport.send(GatewayRequest::get(verify_path(id)?)).await?;
        GatewayEnvelope::parse(&response.body)
    }

    /// Verify the current reference once
    pub async fn verify_current(&self) -> RaveResult<GatewayEnvelope> {
        self.verify_transaction(&self.reference).await
    }

    /// Poll the gateway until `reference` reaches a terminal state.
    ///
    /// Lifecycle callbacks go to the event sink, if any.
    pub async fn requery_transaction(&mut self, reference: &str) -> RequeryOutcome {
        self.reference = reference.to_string();

        let engine = RequeryEngine::new(
            self.transport.as_ref(),
            self.sink.as_deref(),
            self.delay.as_ref(),
            &self.config.requery,
            &self.cancel,
        );
        engine.run(reference).await
    }

    /// Customer abandoned the payment
    pub fn payment_canceled(&self, reference: &str) {
        info!(reference = %reference, "Payment was canceled by user");
        if let Some(sink) = &self.sink {
            sink.on_cancel(reference);
        }
    }

    fn encryption_key(&self) -> String {
        match &self.config.encryption_key {
            Some(key) => key.expose_secret().to_string(),
            None => signer::derive_key(self.config.secret_key.expose_secret()),
        }
    }

    async fn post(&self, path: &str, body: Value) -> RaveResult<(Value, GatewayEnvelope)> {
        let response = self.transport.send(GatewayRequest::post(path, body)).await?;

        let raw: Value = serde_json::from_str(&response.body).map_err(|e| {
            RaveError::MalformedResponse(format!("{} (HTTP {})", e, response.status))
        })?;
        let envelope: GatewayEnvelope = serde_json::from_value(raw.clone())
            .map_err(|e| RaveError::MalformedResponse(e.to_string()))?;

        Ok((raw, envelope))
    }
}

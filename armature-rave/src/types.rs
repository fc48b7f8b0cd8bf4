//! Charge types and data structures

use crate::error::{RaveError, RaveResult};
use crate::response::GatewayEnvelope;
use crate::transport::path_segment;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Payment family an orchestrator charges through. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChargeType {
    /// Card charge with a 3DES encrypted payload
    Card,
    /// Mobile money (`mobile_money_ghana`, `mobile_money_uganda`, ...)
    MobileMoney { channel: String },
    /// Any other charge channel sent in clear (`mpesa`, `ussd`, ...)
    Other { channel: String },
}

impl ChargeType {
    /// Mobile money charge on the given channel
    pub fn mobile_money(channel: impl Into<String>) -> Self {
        Self::MobileMoney {
            channel: channel.into(),
        }
    }

    /// M-Pesa charge
    pub fn mpesa() -> Self {
        Self::Other {
            channel: "mpesa".to_string(),
        }
    }

    /// Other charge channel
    pub fn other(channel: impl Into<String>) -> Self {
        Self::Other {
            channel: channel.into(),
        }
    }

    /// Value of the `type` query parameter
    pub fn channel(&self) -> &str {
        match self {
            Self::Card => "card",
            Self::MobileMoney { channel } | Self::Other { channel } => channel,
        }
    }

    /// Charge endpoint path
    pub fn endpoint(&self) -> String {
        format!("/v3/charges?type={}", self.channel())
    }
}

/// Card details, merged into the charge payload
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDetails {
    pub card_number: String,
    pub cvv: String,
    pub expiry_month: String,
    pub expiry_year: String,
}

impl CardDetails {
    /// Create card details
    pub fn new(
        card_number: impl Into<String>,
        cvv: impl Into<String>,
        expiry_month: impl Into<String>,
        expiry_year: impl Into<String>,
    ) -> Self {
        Self {
            card_number: card_number.into(),
            cvv: cvv.into(),
            expiry_month: expiry_month.into(),
            expiry_year: expiry_year.into(),
        }
    }

    /// Last four digits
    pub fn last4(&self) -> &str {
        let len = self.card_number.len();
        self.card_number.get(len.saturating_sub(4)..).unwrap_or_default()
    }
}

// Card data must never reach logs.
impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("last4", &self.last4())
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .finish_non_exhaustive()
    }
}

/// Charge request
///
/// Required: `amount`, `currency`, `email`. Card charges also need `card`;
/// mobile money charges need `phone_number`. Channel specific keys
/// (`network`, `authorization`, `meta`, ...) go in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Merchant reference. Filled from the orchestrator when absent or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    /// Amount in major units
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// ISO currency code
    pub currency: String,
    /// Customer email
    pub email: String,
    /// Customer full name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
    /// Customer phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Where the gateway sends the customer after authorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    /// Card details (card charges only)
    #[serde(flatten)]
    pub card: Option<CardDetails>,
    /// Channel specific fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChargeRequest {
    /// Create a charge request
    pub fn new(amount: Decimal, currency: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            tx_ref: None,
            amount,
            currency: currency.into(),
            email: email.into(),
            fullname: None,
            phone_number: None,
            redirect_url: None,
            card: None,
            extra: Map::new(),
        }
    }

    /// With merchant reference
    pub fn tx_ref(mut self, tx_ref: impl Into<String>) -> Self {
        self.tx_ref = Some(tx_ref.into());
        self
    }

    /// With customer name
    pub fn fullname(mut self, fullname: impl Into<String>) -> Self {
        self.fullname = Some(fullname.into());
        self
    }

    /// With customer phone number
    pub fn phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }

    /// With redirect URL
    pub fn redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    /// With card details
    pub fn card(mut self, card: CardDetails) -> Self {
        self.card = Some(card);
        self
    }

    /// With a channel specific field
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Reference is set and non-empty
    pub fn has_tx_ref(&self) -> bool {
        self.tx_ref.as_deref().is_some_and(|r| !r.is_empty())
    }

    /// Check the key schedule for the given charge type
    pub fn validate(&self, charge_type: &ChargeType) -> RaveResult<()> {
        check_payment_fields(self.amount, &self.currency, &self.email)?;

        match charge_type {
            ChargeType::Card => {
                let card = self
                    .card
                    .as_ref()
                    .ok_or_else(|| RaveError::Validation("card details are required".to_string()))?;
                if card.card_number.is_empty() || !card.card_number.chars().all(|c| c.is_ascii_digit()) {
                    return Err(RaveError::Validation("invalid card number".to_string()));
                }
                if card.cvv.is_empty() || card.expiry_month.is_empty() || card.expiry_year.is_empty() {
                    return Err(RaveError::Validation(
                        "card cvv and expiry are required".to_string(),
                    ));
                }
            }
            ChargeType::MobileMoney { .. } => {
                if self.phone_number.as_deref().is_none_or(str::is_empty) {
                    return Err(RaveError::Validation(
                        "phone number is required for mobile money".to_string(),
                    ));
                }
            }
            ChargeType::Other { .. } => {}
        }

        Ok(())
    }
}

fn check_payment_fields(amount: Decimal, currency: &str, email: &str) -> RaveResult<()> {
    if amount <= Decimal::ZERO {
        return Err(RaveError::Validation("amount must be positive".to_string()));
    }
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(RaveError::Validation(format!(
            "invalid currency code: {}",
            currency
        )));
    }
    if !email.contains('@') {
        return Err(RaveError::Validation("customer email is required".to_string()));
    }
    Ok(())
}

/// Tokenized card charge
///
/// Charges a card token saved from an earlier successful charge. Sent in
/// clear to `/v3/tokenized-charges`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenChargeRequest {
    /// Card token (`flw-t1nf-...`)
    pub token: String,
    /// Merchant reference. Filled from the orchestrator when absent or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    /// Amount in major units
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// ISO currency code
    pub currency: String,
    /// ISO country code of the card
    pub country: String,
    /// Customer email
    pub email: String,
    /// Optional fields (`narration`, `first_name`, `ip`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenChargeRequest {
    /// Create a tokenized charge
    pub fn new(
        token: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
        country: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            tx_ref: None,
            amount,
            currency: currency.into(),
            country: country.into(),
            email: email.into(),
            extra: Map::new(),
        }
    }

    /// With merchant reference
    pub fn tx_ref(mut self, tx_ref: impl Into<String>) -> Self {
        self.tx_ref = Some(tx_ref.into());
        self
    }

    /// With an optional field
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Reference is set and non-empty
    pub fn has_tx_ref(&self) -> bool {
        self.tx_ref.as_deref().is_some_and(|r| !r.is_empty())
    }

    /// Every key the gateway requires is present
    pub fn validate(&self) -> RaveResult<()> {
        if self.token.trim().is_empty() {
            return Err(RaveError::Validation("card token is required".to_string()));
        }
        if !self.has_tx_ref() {
            return Err(RaveError::Validation("tx_ref is required".to_string()));
        }
        if self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RaveError::Validation(format!(
                "invalid country code: {}",
                self.country
            )));
        }
        check_payment_fields(self.amount, &self.currency, &self.email)
    }
}

/// Follow-up on a preauthorized card charge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreauthAction {
    /// Collect held funds. Without an amount the full hold is captured.
    Capture { amount: Option<Decimal> },
    /// Release the hold
    Void,
    /// Refund captured funds. Without an amount the full capture is refunded.
    Refund { amount: Option<Decimal> },
}

impl PreauthAction {
    /// Action name as used in the endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capture { .. } => "capture",
            Self::Void => "void",
            Self::Refund { .. } => "refund",
        }
    }

    /// Amount to capture or refund, if partial
    pub fn amount(&self) -> Option<Decimal> {
        match self {
            Self::Capture { amount } | Self::Refund { amount } => *amount,
            Self::Void => None,
        }
    }

    /// Endpoint for the charge identified by `flw_ref`
    pub fn endpoint(&self, flw_ref: &str) -> RaveResult<String> {
        Ok(format!("/v3/charges/{}/{}", path_segment(flw_ref)?, self.as_str()))
    }

    /// Request body
    pub fn body(&self) -> Value {
        match self.amount().and_then(|amount| amount.to_f64()) {
            Some(amount) => json!({ "amount": amount }),
            None => json!({}),
        }
    }

    /// Partial amounts must be positive
    pub fn validate(&self) -> RaveResult<()> {
        if self.amount().is_some_and(|amount| amount <= Decimal::ZERO) {
            return Err(RaveError::Validation(format!(
                "{} amount must be positive",
                self.as_str()
            )));
        }
        Ok(())
    }
}

/// Authorization mode returned in `meta.authorization.mode`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationMode {
    /// Customer PIN required
    Pin,
    /// Billing address required
    AvsNoauth,
    /// 3-D Secure redirect
    Redirect,
    /// One-time password sent to the customer
    Otp,
    /// Anything else
    Unknown(String),
}

impl AuthorizationMode {
    /// Parse from string
    pub fn from_str(s: &str) -> Self {
        match s {
            "pin" => Self::Pin,
            "avs_noauth" => Self::AvsNoauth,
            "redirect" => Self::Redirect,
            "otp" => Self::Otp,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pin => "pin",
            Self::AvsNoauth => "avs_noauth",
            Self::Redirect => "redirect",
            Self::Otp => "otp",
            Self::Unknown(s) => s,
        }
    }
}

impl std::fmt::Display for AuthorizationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified result of one charge call
#[derive(Debug, Clone, PartialEq)]
pub enum ChargeOutcome {
    /// Send the customer to `url`, then verify when they return
    Redirect {
        url: String,
        response: GatewayEnvelope,
    },
    /// Charge needs a PIN or billing address; raw gateway response
    PinOrAvs(Value),
    /// Charge needs an OTP submitted against `flw_ref`
    Otp {
        flw_ref: String,
        id: Value,
        auth_mode: String,
    },
    /// Non-card charge response, returned as received
    Passthrough {
        response: Value,
        redirect: Option<String>,
    },
    /// Gateway rejected the charge
    Error { message: String },
}

impl ChargeOutcome {
    /// URL the boundary layer should redirect the customer to
    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            Self::Redirect { url, .. } => Some(url),
            Self::Passthrough { redirect, .. } => redirect.as_deref(),
            _ => None,
        }
    }

    /// Gateway rejected the charge
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// JSON view of the outcome.
    ///
    /// OTP outcomes expose only `{data: {flw_ref, id, auth_mode}}`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Redirect { response, .. } => {
                serde_json::to_value(response).unwrap_or(Value::Null)
            }
            Self::PinOrAvs(raw) => raw.clone(),
            Self::Otp {
                flw_ref,
                id,
                auth_mode,
            } => json!({
                "data": {
                    "flw_ref": flw_ref,
                    "id": id,
                    "auth_mode": auth_mode,
                }
            }),
            Self::Passthrough { response, .. } => response.clone(),
            Self::Error { message } => json!({ "status": "error", "message": message }),
        }
    }
}

/// What an OTP is being validated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationType {
    Card,
    Account,
}

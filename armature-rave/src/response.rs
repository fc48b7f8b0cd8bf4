//! Gateway response envelope

use crate::error::{RaveError, RaveResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level status string for accepted calls
pub const STATUS_SUCCESS: &str = "success";

/// `{status, message?, meta?, data?}` envelope returned by every v3 endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEnvelope {
    /// `success` or `error`
    pub status: String,
    /// Human readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Authorization hints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Transaction data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl GatewayEnvelope {
    /// Decode a raw response body
    pub fn parse(body: &str) -> RaveResult<Self> {
        serde_json::from_str(body)
            .map_err(|e| RaveError::MalformedResponse(format!("{}: {}", e, truncate(body))))
    }

    /// Top-level status is `success`
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Gateway message, or a placeholder when absent
    pub fn message_or_default(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("gateway returned status '{}'", self.status))
    }

    /// `meta.authorization`, if present
    pub fn authorization(&self) -> Option<&Value> {
        self.meta.as_ref()?.get("authorization")
    }

    /// `meta.authorization.mode`
    pub fn authorization_mode(&self) -> Option<&str> {
        self.authorization()?.get("mode")?.as_str()
    }

    /// `meta.authorization.redirect`
    pub fn authorization_redirect(&self) -> Option<&str> {
        self.authorization()?.get("redirect")?.as_str()
    }

    /// `meta.redirect`
    pub fn meta_redirect(&self) -> Option<&str> {
        self.meta.as_ref()?.get("redirect")?.as_str()
    }

    /// String field inside `data`
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.as_ref()?.get(field)?.as_str()
    }

    /// `data.status`
    pub fn data_status(&self) -> Option<&str> {
        self.data_str("status")
    }

    /// Transaction status, if decisive.
    ///
    /// Fails with [`RaveError::Gateway`] on an error envelope and with
    /// [`RaveError::UndecisiveStatus`] when the transaction is still open.
    pub fn decisive_status(&self, reference: &str) -> RaveResult<TransactionStatus> {
        if !self.is_success() {
            return Err(RaveError::Gateway(self.message_or_default()));
        }
        match TransactionStatus::from_str(self.data_status().unwrap_or_default()) {
            TransactionStatus::Pending(status) => Err(RaveError::UndecisiveStatus {
                reference: reference.to_string(),
                status,
            }),
            status => Ok(status),
        }
    }
}

/// `data.status` of a verified transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Money collected
    Successful,
    /// Charge failed
    Failed,
    /// Anything else (`pending`, missing, ...)
    Pending(String),
}

impl TransactionStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Self {
        match s {
            "successful" => Self::Successful,
            "failed" => Self::Failed,
            other => Self::Pending(other.to_string()),
        }
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

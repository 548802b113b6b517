//! Carrier-facing types shared by every telephony provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the telephony leg and the carrier control API.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TelephonyError {
    /// The media stream handshake carried no call identifier
    #[error("Missing call identifier in media stream handshake")]
    MissingCallIdentifier,

    /// The call identifier contains characters no carrier SID uses
    #[error("Invalid call identifier in media stream handshake")]
    InvalidCallIdentifier,

    /// Call metadata could not be fetched from the carrier
    #[error("Carrier lookup failed for {call_sid}: {message}")]
    CarrierLookupError { call_sid: String, message: String },

    /// The carrier refused or failed to originate a call
    #[error("Call origination failed: {0}")]
    OriginationError(String),

    /// The carrier failed to terminate a call
    #[error("Call termination failed for {call_sid}: {message}")]
    TerminationError { call_sid: String, message: String },

    /// Invalid carrier configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for telephony operations.
pub type TelephonyResult<T> = Result<T, TelephonyError>;

// =============================================================================
// Call Types
// =============================================================================

/// Direction of a call relative to the gateway's number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl CallDirection {
    /// Map a carrier direction string (`inbound`, `outbound-api`, `outbound-dial`).
    pub fn from_carrier(value: &str) -> Self {
        if value.trim().to_lowercase().starts_with("outbound") {
            Self::Outbound
        } else {
            Self::Inbound
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a call: initiated -> ringing -> in-progress -> completed | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Failed,
}

impl CallStatus {
    /// Map a carrier status string. Carrier-specific failure flavours
    /// (`busy`, `no-answer`, `canceled`) collapse to `Failed`.
    pub fn from_carrier(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "queued" | "initiated" => Some(Self::Initiated),
            "ringing" => Some(Self::Ringing),
            "in-progress" | "answered" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" | "busy" | "no-answer" | "canceled" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed calls never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call details as reported by the carrier.
#[derive(Debug, Clone, PartialEq)]
pub struct CallMetadata {
    pub call_sid: String,
    pub from: String,
    pub to: String,
    pub direction: CallDirection,
    pub status: CallStatus,
}

/// Result of asking the carrier to place a call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginatedCall {
    pub call_sid: String,
    pub status: CallStatus,
}

// =============================================================================
// Carrier Trait
// =============================================================================

/// Carrier control API (REST side of the telephony leg).
#[async_trait]
pub trait CarrierClient: Send + Sync {
    /// Fetch from/to/direction/status for a live call.
    async fn fetch_call_metadata(&self, call_sid: &str) -> TelephonyResult<CallMetadata>;

    /// Place a call that fetches its instructions from `instructions_url`.
    /// Status callbacks go to `{instructions_url}/status`.
    async fn originate_call(
        &self,
        to: &str,
        from: &str,
        instructions_url: &str,
    ) -> TelephonyResult<OriginatedCall>;

    /// Hang up a call.
    async fn terminate(&self, call_sid: &str) -> TelephonyResult<()>;

    /// Provider name for logging.
    fn provider_name(&self) -> &'static str;
}

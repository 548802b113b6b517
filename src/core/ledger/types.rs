//! Call ledger data types.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::pricing::CallCost;
use crate::core::telephony::{CallDirection, CallMetadata, CallStatus};

/// Errors raised by the ledger, its store and the wallet.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Call {0} already has a ledger entry")]
    AlreadyExists(String),

    #[error("No ledger entry for call {0}")]
    NotFound(String),

    #[error("Call {0} was already finalized")]
    AlreadyFinalized(String),

    #[error("Call store error: {0}")]
    StoreError(String),

    #[error("Wallet debit failed: {0}")]
    WalletError(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Data needed to open a ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCall {
    pub call_sid: String,
    pub from: String,
    pub to: String,
    pub direction: CallDirection,
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
}

impl NewCall {
    pub fn from_metadata(metadata: &CallMetadata) -> Self {
        Self {
            call_sid: metadata.call_sid.clone(),
            from: metadata.from.clone(),
            to: metadata.to.clone(),
            direction: metadata.direction,
            agent_id: None,
            user_id: None,
        }
    }

    pub fn with_owner(mut self, agent_id: Option<String>, user_id: Option<String>) -> Self {
        self.agent_id = agent_id;
        self.user_id = user_id;
        self
    }
}

/// A row of the `calls` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Store-assigned row id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "twilio_call_sid")]
    pub call_sid: String,
    pub from_number: String,
    pub to_number: String,
    pub direction: CallDirection,
    pub status: CallStatus,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
}

impl CallRecord {
    /// A fresh `in-progress` record.
    pub fn open(call: NewCall, started_at: OffsetDateTime) -> Self {
        Self {
            id: None,
            call_sid: call.call_sid,
            from_number: call.from,
            to_number: call.to,
            direction: call.direction,
            status: CallStatus::InProgress,
            agent_id: call.agent_id,
            user_id: call.user_id,
            started_at,
            ended_at: None,
            duration_seconds: None,
            transcript: None,
            cost_usd: None,
        }
    }
}

/// How the call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Completed,
    Failed,
}

impl CallOutcome {
    pub fn status(&self) -> CallStatus {
        match self {
            Self::Completed => CallStatus::Completed,
            Self::Failed => CallStatus::Failed,
        }
    }
}

/// Fields written together when a call reaches its terminal status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallFinalization {
    pub status: CallStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub ended_at: OffsetDateTime,
    pub duration_seconds: u64,
    pub cost_usd: f64,
}

/// Result of the wallet debit that follows a finalization.
#[derive(Debug, Clone, PartialEq)]
pub enum DebitOutcome {
    Debited,
    /// Nothing to charge: zero cost or no owning user
    Skipped(&'static str),
    /// The wallet refused or errored; the recorded cost stands
    Failed(String),
}

/// Billing projection of a finalized call.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub call_sid: String,
    pub status: CallStatus,
    pub started_at: OffsetDateTime,
    pub ended_at: OffsetDateTime,
    pub cost: CallCost,
    pub debit: DebitOutcome,
}

impl LedgerEntry {
    pub fn duration_seconds(&self) -> u64 {
        self.cost.duration_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_record_serializes_as_calls_row() {
        let record = CallRecord::open(
            NewCall {
                call_sid: "CA123".to_string(),
                from: "+15551234567".to_string(),
                to: "+15557654321".to_string(),
                direction: CallDirection::Inbound,
                agent_id: Some("agent-1".to_string()),
                user_id: None,
            },
            datetime!(2025-01-15 10:30:00 UTC),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["twilio_call_sid"], "CA123");
        assert_eq!(json["from_number"], "+15551234567");
        assert_eq!(json["direction"], "inbound");
        assert_eq!(json["status"], "in-progress");
        assert_eq!(json["started_at"], "2025-01-15T10:30:00Z");
        assert!(json["ended_at"].is_null());
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_record_deserializes_from_row() {
        let row = r#"{
            "id": "6f1c",
            "twilio_call_sid": "CA123",
            "from_number": "+15551234567",
            "to_number": "+15557654321",
            "direction": "outbound",
            "status": "completed",
            "started_at": "2025-01-15T10:30:00Z",
            "ended_at": "2025-01-15T10:31:30Z",
            "duration_seconds": 90,
            "cost_usd": 0.0945,
            "transcript": null
        }"#;
        let record: CallRecord = serde_json::from_str(row).unwrap();
        assert_eq!(record.id.as_deref(), Some("6f1c"));
        assert_eq!(record.status, CallStatus::Completed);
        assert_eq!(record.duration_seconds, Some(90));
        assert_eq!(record.ended_at, Some(datetime!(2025-01-15 10:31:30 UTC)));
        assert!(record.agent_id.is_none());
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(CallOutcome::Completed.status(), CallStatus::Completed);
        assert_eq!(CallOutcome::Failed.status(), CallStatus::Failed);
    }
}

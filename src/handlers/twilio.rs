//! Carrier webhooks.
//!
//! Both endpoints answer 200 whatever happens internally: the carrier
//! retries anything else, and a retry can never fix a local failure.

use axum::{
    Form,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::core::ledger::{CallOutcome, LedgerError};
use crate::core::telephony::CallStatus;
use crate::core::telephony::twilio::{hangup_instructions, stream_instructions};
use crate::state::AppState;

/// Form posted to the voice webhook when a call connects.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VoiceWebhookForm {
    pub call_sid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub direction: Option<String>,
}

/// Form posted to the status callback.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StatusWebhookForm {
    pub call_sid: Option<String>,
    pub call_status: Option<String>,
    pub call_duration: Option<String>,
}

fn twiml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

/// `POST /twilio/voice`: point the carrier at the media stream.
pub async fn voice_webhook(
    State(state): State<Arc<AppState>>,
    Form(form): Form<VoiceWebhookForm>,
) -> Response {
    let Some(call_sid) = form.call_sid.filter(|s| !s.trim().is_empty()) else {
        warn!("Voice webhook without CallSid, hanging up");
        return twiml(hangup_instructions());
    };

    info!(
        call_sid = %call_sid,
        from = form.from.as_deref().unwrap_or_default(),
        to = form.to.as_deref().unwrap_or_default(),
        direction = form.direction.as_deref().unwrap_or_default(),
        "Incoming call"
    );

    match stream_instructions(&state.config.media_stream_url(), &call_sid) {
        Ok(markup) => twiml(markup),
        Err(e) => {
            error!(call_sid = %call_sid, "Failed to build stream instructions: {}", e);
            twiml(hangup_instructions())
        }
    }
}

/// `POST /twilio/voice/status`: reconcile the ledger with the carrier's view.
pub async fn status_webhook(
    State(state): State<Arc<AppState>>,
    Form(form): Form<StatusWebhookForm>,
) -> StatusCode {
    let (Some(call_sid), Some(raw_status)) = (form.call_sid, form.call_status) else {
        warn!("Status callback without CallSid or CallStatus");
        return StatusCode::OK;
    };

    let duration = form
        .call_duration
        .as_deref()
        .and_then(|d| d.trim().parse::<u64>().ok());

    info!(
        call_sid = %call_sid,
        status = %raw_status,
        duration_seconds = ?duration,
        "Call status update"
    );

    let outcome = match CallStatus::from_carrier(&raw_status) {
        Some(CallStatus::Completed) => CallOutcome::Completed,
        Some(CallStatus::Failed) => CallOutcome::Failed,
        _ => return StatusCode::OK,
    };

    state.agents.forget(&call_sid);

    match state.ledger.close_entry(&call_sid, duration, outcome).await {
        Ok(entry) => info!(
            call_sid = %call_sid,
            cost_usd = entry.cost.total,
            "Ledger entry closed from status callback"
        ),
        Err(LedgerError::AlreadyFinalized(_)) => {
            debug!(call_sid = %call_sid, "Ledger entry already finalized")
        }
        Err(LedgerError::NotFound(_)) => {
            debug!(call_sid = %call_sid, "No ledger entry, call never reached the media stream")
        }
        Err(e) => error!(call_sid = %call_sid, "Failed to close ledger entry: {}", e),
    }

    StatusCode::OK
}

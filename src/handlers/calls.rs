use axum::{Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::core::telephony::OriginatedCall;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutboundCallRequest {
    pub to: Option<String>,
    pub from: Option<String>,
    pub agent_id: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> AppResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("`{name}` is required")))
}

/// `POST /calls/outbound`: have the carrier dial `to` from `from`.
pub async fn outbound_call(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OutboundCallRequest>,
) -> AppResult<Json<OriginatedCall>> {
    let to = required(&request.to, "to")?;
    let from = required(&request.from, "from")?;

    let agent_id = request
        .agent_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    if let Some(agent_id) = agent_id
        && state.agents.get(agent_id).is_none()
    {
        return Err(AppError::NotFound(format!("Unknown agent '{agent_id}'")));
    }

    let call = state
        .carrier
        .originate_call(to, from, &state.config.voice_webhook_url())
        .await?;

    if let Some(agent_id) = agent_id {
        state.agents.remember_outbound(&call.call_sid, agent_id);
    }

    info!(
        call_sid = %call.call_sid,
        agent_id = ?agent_id,
        status = call.status.as_str(),
        "Outbound call placed"
    );
    Ok(Json(call))
}

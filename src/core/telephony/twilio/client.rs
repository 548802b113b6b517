//! Twilio REST client for call control.
//!
//! - `GET  /2010-04-01/Accounts/{sid}/Calls/{call_sid}.json` - call metadata
//! - `POST /2010-04-01/Accounts/{sid}/Calls.json` - originate
//! - `POST /2010-04-01/Accounts/{sid}/Calls/{call_sid}.json` with `Status=completed` - hang up

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};
use url::Url;

use crate::core::telephony::base::{
    CallDirection, CallMetadata, CallStatus, CarrierClient, OriginatedCall, TelephonyError,
    TelephonyResult,
};

/// Default Twilio API host.
pub const TWILIO_API_BASE_URL: &str = "https://api.twilio.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Status callback events requested for originated calls.
const STATUS_CALLBACK_EVENTS: [&str; 4] = ["initiated", "ringing", "answered", "completed"];

/// Call resource as returned by the Calls API.
#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    direction: Option<String>,
}

/// Error body returned by the Twilio API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

/// Twilio Calls API client.
#[derive(Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    api_base: Url,
}

impl std::fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioClient")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl Drop for TwilioClient {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.auth_token.zeroize();
    }
}

impl TwilioClient {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> TelephonyResult<Self> {
        let account_sid = account_sid.into();
        let auth_token = auth_token.into();
        if account_sid.trim().is_empty() || auth_token.trim().is_empty() {
            return Err(TelephonyError::InvalidConfiguration(
                "Twilio account SID and auth token are required".to_string(),
            ));
        }

        let api_base = Url::parse(&api_base.into())
            .map_err(|e| TelephonyError::InvalidConfiguration(format!("Twilio API base URL: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(TelephonyError::InvalidConfiguration(
                "Twilio API base URL cannot carry a path".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TelephonyError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            http,
            account_sid,
            auth_token,
            api_base,
        })
    }

    /// Resolve an API path under the account. Each segment is percent-encoded,
    /// so identifiers cannot step outside the `Calls` collection.
    fn account_url(&self, resource: &[&str]) -> Result<Url, String> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| "Twilio API base URL cannot carry a path".to_string())?
            .pop_if_empty()
            .extend(["2010-04-01", "Accounts", self.account_sid.as_str()])
            .extend(resource);
        Ok(url)
    }

    fn calls_url(&self) -> Result<Url, String> {
        self.account_url(&["Calls.json"])
    }

    fn call_url(&self, call_sid: &str) -> Result<Url, String> {
        self.account_url(&["Calls", &format!("{call_sid}.json")])
    }

    /// Send a request and decode a call resource, turning API errors into a message.
    async fn send_for_call(&self, request: reqwest::RequestBuilder) -> Result<CallResource, String> {
        let response = request
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(describe_api_error(status, &body));
        }

        response
            .json::<CallResource>()
            .await
            .map_err(|e| format!("unexpected response body: {e}"))
    }
}

fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody {
            code: Some(code),
            message: Some(message),
        }) => format!("HTTP {status} (Twilio {code}): {message}"),
        Ok(ApiErrorBody {
            message: Some(message),
            ..
        }) => format!("HTTP {status}: {message}"),
        _ => format!("HTTP {status}"),
    }
}

#[async_trait]
impl CarrierClient for TwilioClient {
    async fn fetch_call_metadata(&self, call_sid: &str) -> TelephonyResult<CallMetadata> {
        let lookup = async {
            let url = self.call_url(call_sid)?;
            self.send_for_call(self.http.get(url)).await
        };
        let call = lookup.await.map_err(|message| {
            error!(call_sid = %call_sid, "Failed to fetch call details: {}", message);
            TelephonyError::CarrierLookupError {
                call_sid: call_sid.to_string(),
                message,
            }
        })?;

        let status = call
            .status
            .as_deref()
            .and_then(CallStatus::from_carrier)
            .unwrap_or(CallStatus::InProgress);

        Ok(CallMetadata {
            call_sid: call.sid,
            from: call.from.unwrap_or_default(),
            to: call.to.unwrap_or_default(),
            direction: CallDirection::from_carrier(call.direction.as_deref().unwrap_or("inbound")),
            status,
        })
    }

    async fn originate_call(
        &self,
        to: &str,
        from: &str,
        instructions_url: &str,
    ) -> TelephonyResult<OriginatedCall> {
        let status_callback = format!("{}/status", instructions_url.trim_end_matches('/'));

        let mut form: Vec<(&str, &str)> = vec![
            ("To", to),
            ("From", from),
            ("Url", instructions_url),
            ("Method", "POST"),
            ("StatusCallback", status_callback.as_str()),
            ("StatusCallbackMethod", "POST"),
            ("Record", "true"),
        ];
        for event in STATUS_CALLBACK_EVENTS {
            form.push(("StatusCallbackEvent", event));
        }

        let create = async {
            let url = self.calls_url()?;
            self.send_for_call(self.http.post(url).form(&form)).await
        };
        let call = create.await.map_err(|message| {
            error!(to = %to, from = %from, "Failed to create outbound call: {}", message);
            TelephonyError::OriginationError(message)
        })?;

        let status = call
            .status
            .as_deref()
            .and_then(CallStatus::from_carrier)
            .unwrap_or(CallStatus::Initiated);

        info!(call_sid = %call.sid, status = %status, "Created outbound call");
        Ok(OriginatedCall {
            call_sid: call.sid,
            status,
        })
    }

    async fn terminate(&self, call_sid: &str) -> TelephonyResult<()> {
        let hang_up = async {
            let url = self.call_url(call_sid)?;
            self.send_for_call(self.http.post(url).form(&[("Status", "completed")]))
                .await
        };
        hang_up.await.map_err(|message| TelephonyError::TerminationError {
            call_sid: call_sid.to_string(),
            message,
        })?;

        info!(call_sid = %call_sid, "Ended call");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "twilio"
    }
}

//! TwiML generation.

use url::Url;

use crate::core::telephony::base::{TelephonyError, TelephonyResult};

/// Query parameter carrying the call identifier on the media-stream URL.
pub const CALL_SID_PARAM: &str = "callSid";

/// Build the media-stream URL for a call: `{stream_url}?callSid={call_sid}`.
pub fn media_stream_url(stream_url: &str, call_sid: &str) -> TelephonyResult<String> {
    let mut url = Url::parse(stream_url).map_err(|e| {
        TelephonyError::InvalidConfiguration(format!("invalid media stream URL '{stream_url}': {e}"))
    })?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(TelephonyError::InvalidConfiguration(format!(
            "media stream URL must use ws:// or wss://, got '{}'",
            url.scheme()
        )));
    }
    url.query_pairs_mut().append_pair(CALL_SID_PARAM, call_sid);
    Ok(url.to_string())
}

/// TwiML instructing the carrier to connect the call to our media stream.
pub fn stream_instructions(stream_url: &str, call_sid: &str) -> TelephonyResult<String> {
    let url = media_stream_url(stream_url, call_sid)?;
    Ok(format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Response>\n  <Connect>\n    <Stream url=\"{}\" />\n  </Connect>\n</Response>",
        escape_xml(&url)
    ))
}

/// TwiML that ends the call immediately.
pub fn hangup_instructions() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n  <Hangup />\n</Response>".to_string()
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

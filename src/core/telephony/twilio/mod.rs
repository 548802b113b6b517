//! Twilio carrier integration: REST call control and TwiML.

mod client;
pub mod markup;

pub use client::{TWILIO_API_BASE_URL, TwilioClient};
pub use markup::{CALL_SID_PARAM, hangup_instructions, media_stream_url, stream_instructions};

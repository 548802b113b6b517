//! Telephony leg.
//!
//! Two halves:
//! - carrier control over REST ([`CarrierClient`], implemented by [`TwilioClient`])
//! - the live media stream, bridged to the session over channels ([`TelephonyLeg`])
//!
//! Audio frames are opaque bytes at this layer; nothing is decoded.

mod base;
mod leg;
pub mod twilio;

pub use base::{
    CallDirection, CallMetadata, CallStatus, CarrierClient, OriginatedCall, TelephonyError,
    TelephonyResult,
};
pub use leg::{
    MEDIA_CHANNEL_CAPACITY, MediaStreamHandle, TelephonyCommand, TelephonyEvent, TelephonyEvents,
    TelephonyLeg, accept_connection, media_channel,
};
pub use twilio::TwilioClient;

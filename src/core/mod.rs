pub mod agents;
pub mod ledger;
pub mod realtime;
pub mod session;
pub mod telephony;

// Re-export commonly used types for convenience
pub use agents::{AgentDirectory, AgentProfile, ResolvedAgent};

pub use ledger::{CallLedger, CallOutcome, CallRecord, LedgerEntry, LedgerError, LedgerResult};

pub use realtime::{
    GrokVoiceConnector, Persona, RealtimeError, RealtimeEvent, RealtimeResult, VoiceAiConnector,
    VoiceAiLeg,
};

pub use session::{CallSession, SessionContext, SessionError, SessionState, SessionTracker};

pub use telephony::{
    CallDirection, CallMetadata, CallStatus, CarrierClient, TelephonyError, TelephonyResult,
    TwilioClient,
};

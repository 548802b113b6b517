//! Call sessions.
//!
//! ```text
//! INITIALIZING --voice-AI open--> ACTIVE --either leg closes/errors--> CLOSING --> CLOSED
//!      |                                                                  ^
//!      +------------------- connect failure -------------------------------+
//! ```

mod call;
mod tracker;

pub use call::{
    CallSession, CloseReason, RelayStats, SessionContext, SessionError, SessionReport,
    SessionResult, SessionState,
};
pub use tracker::SessionTracker;

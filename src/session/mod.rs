//! Session round-trip verification.
//!
//! A session is opened from a route's source to an echo endpoint, a fixed
//! padded message sequence is pushed through it and the echoed bytes are
//! compared with what was sent.

pub mod error;
pub mod state_machine;
pub mod types;
pub mod verifier;

pub use error::{SessionError, SessionResult};
pub use state_machine::SessionStateMachine;
pub use types::{
    padded_message, SessionEvent, SessionState, SessionVerifierConfig, VerificationReport,
};
pub use verifier::{SessionGuard, SessionVerifier};

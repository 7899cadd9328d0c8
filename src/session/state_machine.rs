use crate::session::error::{SessionError, SessionResult};
use crate::session::types::{SessionEvent, SessionState};
use parking_lot::RwLock;
use std::sync::Arc;

/// Closed -> Opening -> Open -> Closing -> Closed, with Open -> Failed on an
/// unrecoverable transport error.
#[derive(Clone)]
pub struct SessionStateMachine {
    state: Arc<RwLock<SessionState>>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::Closed)),
        }
    }

    /// Get current state
    pub fn current_state(&self) -> SessionState {
        self.state.read().clone()
    }

    /// Transition state based on event
    pub fn transition(&self, event: SessionEvent) -> SessionResult<SessionState> {
        let mut state = self.state.write();

        let new_state = match (&*state, &event) {
            (SessionState::Closed, SessionEvent::Open) => SessionState::Opening,

            (SessionState::Opening, SessionEvent::Opened { port }) => {
                SessionState::Open { port: *port }
            }

            // A session that never opened goes straight back to closed
            (SessionState::Opening, SessionEvent::OpenFailed { .. }) => SessionState::Closed,

            (SessionState::Open { .. }, SessionEvent::Close) => SessionState::Closing,

            (SessionState::Open { .. }, SessionEvent::TransportError { error }) => {
                SessionState::Failed {
                    error: error.clone(),
                }
            }

            // A failed session is still closed on the node
            (SessionState::Failed { .. }, SessionEvent::Close) => SessionState::Closing,

            (SessionState::Closing, SessionEvent::Closed) => SessionState::Closed,

            _ => {
                return Err(SessionError::InvalidStateTransition(format!(
                    "Cannot handle {:?} in state {:?}",
                    event, *state
                )));
            }
        };

        *state = new_state.clone();
        Ok(new_state)
    }
}

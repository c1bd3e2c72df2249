//! Bus Session State Machine
//!
//! Defines valid session transitions:
//! ```text
//! Disconnected -> Connecting -> Handshaking -> Active
//!       ^              |             |           |
//!       +--------------+-------------+-----------+   (any transport error)
//! ```
//! There is no terminal state; the session loop runs for the process lifetime.

use std::fmt;

/// Session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Handshaking,
    Active,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Handshaking => write!(f, "handshaking"),
            SessionState::Active => write!(f, "active"),
        }
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connect attempt started
    ConnectStarted,
    /// Transport opened
    TransportOpened,
    /// Subscribe request written
    SubscribeSent,
    /// Any connect, write or read failure (including remote close)
    TransportFailed { reason: String },
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(SessionState),
    /// Transition was invalid from current state
    Invalid {
        from: SessionState,
        event: SessionEvent,
    },
    /// Session dropped back to disconnected
    Dropped { from: SessionState, reason: String },
}

/// The bus session state machine
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    current_state: SessionState,
    /// Handshakes sent on the current connection
    handshakes: u32,
    /// Connections that reached `Active`
    sessions_established: u64,
}

impl SessionStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.current_state
    }

    /// Whether outbound frames may be written
    pub fn is_active(&self) -> bool {
        self.current_state == SessionState::Active
    }

    /// Handshakes sent since the current connection was opened
    pub fn handshake_count(&self) -> u32 {
        self.handshakes
    }

    /// Number of connections that completed a handshake
    pub fn sessions_established(&self) -> u64 {
        self.sessions_established
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: SessionEvent) -> TransitionResult {
        if let SessionEvent::TransportFailed { reason } = &event {
            let from = self.current_state;
            self.current_state = SessionState::Disconnected;
            self.handshakes = 0;
            return TransitionResult::Dropped {
                from,
                reason: reason.clone(),
            };
        }

        match self.get_next_state(&event) {
            Some(state) => {
                match state {
                    SessionState::Handshaking => self.handshakes = 0,
                    SessionState::Active => {
                        self.handshakes += 1;
                        self.sessions_established += 1;
                    }
                    _ => {}
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: &SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self.current_state, event) {
            (Disconnected, ConnectStarted) => Some(Connecting),
            (Connecting, TransportOpened) => Some(Handshaking),
            // One handshake per connection: a second SubscribeSent while Active is rejected
            (Handshaking, SubscribeSent) => Some(Active),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(reason: &str) -> SessionEvent {
        SessionEvent::TransportFailed {
            reason: reason.into(),
        }
    }

    #[test]
    fn test_initial_state() {
        let fsm = SessionStateMachine::new();
        assert_eq!(fsm.state(), SessionState::Disconnected);
        assert!(!fsm.is_active());
    }

    #[test]
    fn test_normal_session_flow() {
        let mut fsm = SessionStateMachine::new();

        let result = fsm.process_event(SessionEvent::ConnectStarted);
        assert_eq!(result, TransitionResult::Success(SessionState::Connecting));

        let result = fsm.process_event(SessionEvent::TransportOpened);
        assert_eq!(result, TransitionResult::Success(SessionState::Handshaking));

        let result = fsm.process_event(SessionEvent::SubscribeSent);
        assert_eq!(result, TransitionResult::Success(SessionState::Active));
        assert!(fsm.is_active());
        assert_eq!(fsm.handshake_count(), 1);
    }

    #[test]
    fn test_no_duplicate_handshake_without_reconnect() {
        let mut fsm = SessionStateMachine::new();
        fsm.process_event(SessionEvent::ConnectStarted);
        fsm.process_event(SessionEvent::TransportOpened);
        fsm.process_event(SessionEvent::SubscribeSent);

        let result = fsm.process_event(SessionEvent::SubscribeSent);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.handshake_count(), 1);
        assert_eq!(fsm.state(), SessionState::Active);
    }

    #[test]
    fn test_read_error_while_active_drops_and_allows_fresh_handshake() {
        let mut fsm = SessionStateMachine::new();
        fsm.process_event(SessionEvent::ConnectStarted);
        fsm.process_event(SessionEvent::TransportOpened);
        fsm.process_event(SessionEvent::SubscribeSent);

        let result = fsm.process_event(failed("read error"));
        assert_eq!(
            result,
            TransitionResult::Dropped {
                from: SessionState::Active,
                reason: "read error".into()
            }
        );
        assert_eq!(fsm.state(), SessionState::Disconnected);
        assert_eq!(fsm.handshake_count(), 0);

        // A handshake cannot be sent before the reconnect happens
        let result = fsm.process_event(SessionEvent::SubscribeSent);
        assert!(matches!(result, TransitionResult::Invalid { .. }));

        fsm.process_event(SessionEvent::ConnectStarted);
        fsm.process_event(SessionEvent::TransportOpened);
        let result = fsm.process_event(SessionEvent::SubscribeSent);
        assert_eq!(result, TransitionResult::Success(SessionState::Active));
        assert_eq!(fsm.sessions_established(), 2);
    }

    #[test]
    fn test_connect_failure_returns_to_disconnected() {
        let mut fsm = SessionStateMachine::new();
        fsm.process_event(SessionEvent::ConnectStarted);

        let result = fsm.process_event(failed("refused"));
        assert!(matches!(
            result,
            TransitionResult::Dropped {
                from: SessionState::Connecting,
                ..
            }
        ));
        assert_eq!(fsm.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_invalid_transition() {
        let mut fsm = SessionStateMachine::new();

        // Can't open a transport without starting a connect attempt
        let result = fsm.process_event(SessionEvent::TransportOpened);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), SessionState::Disconnected);
    }
}

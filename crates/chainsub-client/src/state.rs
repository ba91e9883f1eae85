//! Session lifecycle state machine.
//!
//! ```text
//! Idle ──connecting──▶ Connecting ──connected──▶ Connected ⇄ Disconnected
//!                          │                         │            │
//!                          └──────connecting─────────┴────────────┘
//!                                      ▼
//!                               Reconnect (rebuild, new client starts Idle)
//!
//! any ──unsubscribe / retries exhausted──▶ Closed
//! ```
//!
//! Transitions are pure so the table can be tested without a transport.

use chainsub_core::ClientEvent;

/// Lifecycle state of the live client of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Client built, no lifecycle event seen yet.
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Closed,
}

/// What the controller must do in response to a lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ReportConnecting,
    ReportConnected,
    ReportDisconnected,
    ReportError(String),
    /// Tear the session down and rebuild it from the resume cursor.
    Reconnect,
    Ignore,
}

impl SessionState {
    /// Apply a connection-level event. Non-lifecycle events leave the state
    /// unchanged and yield [`Action::Ignore`].
    pub fn on_lifecycle(self, event: &ClientEvent) -> (SessionState, Action) {
        use SessionState::*;

        if self == Closed {
            return (Closed, Action::Ignore);
        }
        match event {
            ClientEvent::Connecting => match self {
                Idle => (Connecting, Action::ReportConnecting),
                _ => (Connecting, Action::Reconnect),
            },
            ClientEvent::Connected => (Connected, Action::ReportConnected),
            ClientEvent::Disconnected { .. } => (Disconnected, Action::ReportDisconnected),
            ClientEvent::Error { message } => (self, Action::ReportError(message.clone())),
            _ => (self, Action::Ignore),
        }
    }

    pub fn is_live(self) -> bool {
        self != SessionState::Closed
    }
}

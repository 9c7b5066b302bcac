//! Observable state of a push channel.

use serde::{Deserialize, Serialize};

/// Which of the three mutually exclusive connection phases holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    Connected,
    Reconnecting,
    Idle,
}

/// Connection state exposed to the store and the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_reconnecting: bool,
    pub last_error: Option<String>,
    pub retry_count: u32,
}

impl ConnectionState {
    /// A freshly established channel.
    pub fn connected() -> Self {
        Self {
            is_connected: true,
            ..Self::default()
        }
    }

    /// Waiting for reconnect attempt `retry_count`.
    pub fn reconnecting(retry_count: u32, last_error: impl Into<String>) -> Self {
        Self {
            is_connected: false,
            is_reconnecting: true,
            last_error: Some(last_error.into()),
            retry_count,
        }
    }

    /// Down with no attempt pending.
    pub fn idle(retry_count: u32, last_error: Option<String>) -> Self {
        Self {
            is_connected: false,
            is_reconnecting: false,
            last_error,
            retry_count,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        if self.is_connected {
            ConnectionPhase::Connected
        } else if self.is_reconnecting {
            ConnectionPhase::Reconnecting
        } else {
            ConnectionPhase::Idle
        }
    }

    /// Down with an error and nothing scheduled: only a manual connect recovers.
    pub fn is_terminally_disconnected(&self) -> bool {
        self.phase() == ConnectionPhase::Idle && self.last_error.is_some()
    }
}

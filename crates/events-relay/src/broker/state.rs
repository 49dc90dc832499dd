//! Broker connection state machine.
//!
//! `Disconnected → Connecting → Connected`, or `Connecting → Failed`.
//! `Failed` is terminal. Lock-free atomic, read on every publish.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Failed = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }

    fn can_move_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting) | (Connecting, Connected) | (Connecting, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

/// Thread-safe connection state, created once per process.
#[derive(Debug)]
pub struct BrokerState {
    inner: AtomicU8,
}

impl BrokerState {
    pub fn new() -> Self {
        Self {
            inner: AtomicU8::new(ConnectionState::Disconnected as u8),
        }
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Move to `next` if the transition is legal. Returns whether it moved.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let current = self.get();
        if !current.can_move_to(next) {
            tracing::warn!(
                from = current.as_str(),
                to = next.as_str(),
                "Ignoring illegal broker state transition"
            );
            return false;
        }
        self.inner
            .compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for BrokerState {
    fn default() -> Self {
        Self::new()
    }
}

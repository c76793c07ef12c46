//! Pure reconnect state machine
//!
//! The transport driver feeds socket lifecycle events in here and executes
//! whatever effects come back: `transition(state, input) -> (state, effects)`.
//! No IO, no timers, no async.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConnectionState;

/// Default base delay for exponential backoff in ms.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay between attempts in ms.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// ReconnectPolicy: backoff parameters
// ---------------------------------------------------------------------------

/// Backoff parameters for automatic reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt in ms.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay in ms.
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (zero-based).
    ///
    /// Formula: `min(base * 2^attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(31));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }
}

// ---------------------------------------------------------------------------
// ReconnectState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// No socket, no pending timer.
    Idle,
    Connecting,
    Open,
    /// Socket lost; a reconnect timer may be armed.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectState {
    pub phase: LinkPhase,
    /// Consecutive losses since the last successful open.
    pub attempt: u32,
    /// Policy latch: set by `connect`, cleared by `disconnect`.
    pub should_reconnect: bool,
    pub timer_armed: bool,
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self {
            phase: LinkPhase::Idle,
            attempt: 0,
            should_reconnect: false,
            timer_armed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkInput {
    Connect,
    Disconnect,
    /// The handshake completed.
    Opened,
    /// The socket (or the attempt to open it) ended.
    Closed,
    TimerFired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEffect {
    /// Start opening a new socket.
    Open,
    /// Abort an in-flight open or close the open socket.
    Close,
    ArmTimer(Duration),
    CancelTimer,
    Emit(ConnectionState),
}

/// Pure, synchronous link transition.
pub fn transition(
    mut state: ReconnectState,
    input: LinkInput,
    policy: &ReconnectPolicy,
) -> (ReconnectState, Vec<LinkEffect>) {
    let mut effects = Vec::new();

    match input {
        LinkInput::Connect => {
            state.should_reconnect = true;
            match state.phase {
                // Already have (or are getting) a socket
                LinkPhase::Connecting | LinkPhase::Open => {}
                LinkPhase::Idle | LinkPhase::Closed => {
                    if state.timer_armed {
                        state.timer_armed = false;
                        effects.push(LinkEffect::CancelTimer);
                    }
                    state.phase = LinkPhase::Connecting;
                    effects.push(LinkEffect::Open);
                }
            }
        }

        LinkInput::Disconnect => {
            state.should_reconnect = false;
            if state.timer_armed {
                state.timer_armed = false;
                effects.push(LinkEffect::CancelTimer);
            }
            if matches!(state.phase, LinkPhase::Connecting | LinkPhase::Open) {
                effects.push(LinkEffect::Close);
            }
            state.phase = LinkPhase::Idle;
            effects.push(LinkEffect::Emit(ConnectionState::Disconnected));
        }

        LinkInput::Opened => {
            if state.phase == LinkPhase::Connecting {
                state.phase = LinkPhase::Open;
                state.attempt = 0;
                effects.push(LinkEffect::Emit(ConnectionState::Connected));
            }
        }

        LinkInput::Closed => {
            if matches!(state.phase, LinkPhase::Connecting | LinkPhase::Open) {
                if state.should_reconnect {
                    let delay = policy.delay(state.attempt);
                    state.attempt = state.attempt.saturating_add(1);
                    state.phase = LinkPhase::Closed;
                    state.timer_armed = true;
                    effects.push(LinkEffect::ArmTimer(delay));
                    effects.push(LinkEffect::Emit(ConnectionState::Reconnecting));
                } else {
                    state.phase = LinkPhase::Idle;
                    effects.push(LinkEffect::Emit(ConnectionState::Disconnected));
                }
            }
        }

        LinkInput::TimerFired => {
            if state.phase == LinkPhase::Closed && state.timer_armed {
                state.timer_armed = false;
                if state.should_reconnect {
                    state.phase = LinkPhase::Connecting;
                    effects.push(LinkEffect::Open);
                }
            }
        }
    }

    (state, effects)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

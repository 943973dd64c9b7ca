//! Supervision state machine.
//!
//! ```text
//! [STARTING] ──registered──→ [RUNNING] ──worker failed──→ [BACKING_OFF {attempt: n}]
//!     ↑  │                      │                               │      │
//!     │  │                      │                               │      └── n > max_restarts ──→ [FAILED_TERMINAL]
//!     │  │                      └── stopped ──→ [STOPPED]       │
//!     │  └── registration failed ───────────────────────────────┼─────────→ [FAILED_TERMINAL]
//!     └─────────────────── backoff elapsed ─────────────────────┘
//! ```
//!
//! `attempt` counts consecutive abnormal terminations. A worker that ran
//! long enough before failing resets the count first (`StableRun`).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisionState {
    #[default]
    Starting,
    Running,
    BackingOff { attempt: u32 },
    FailedTerminal,
    Stopped,
}

impl SupervisionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FailedTerminal | Self::Stopped)
    }
}

impl fmt::Display for SupervisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::BackingOff { attempt } => write!(f, "backing_off({attempt})"),
            Self::FailedTerminal => f.write_str("failed_terminal"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisionEvent {
    Registered,
    RegistrationFailed,
    WorkerFailed,
    /// The failed worker had been up for at least `reset_after`.
    StableRun,
    BackoffElapsed,
    Stop,
}

#[derive(Debug)]
pub struct SupervisionStateMachine {
    state: SupervisionState,
    max_restarts: u32,
    consecutive_failures: u32,
    total_restarts: u64,
}

impl SupervisionStateMachine {
    pub fn new(max_restarts: u32) -> Self {
        Self {
            state: SupervisionState::Starting,
            max_restarts,
            consecutive_failures: 0,
            total_restarts: 0,
        }
    }

    pub fn state(&self) -> SupervisionState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_restarts(&self) -> u64 {
        self.total_restarts
    }

    pub fn process_event(&mut self, event: SupervisionEvent) -> SupervisionState {
        match event {
            SupervisionEvent::WorkerFailed if self.state == SupervisionState::Running => {
                self.consecutive_failures += 1;
            }
            SupervisionEvent::StableRun => self.consecutive_failures = 0,
            SupervisionEvent::BackoffElapsed if matches!(self.state, SupervisionState::BackingOff { .. }) => {
                self.total_restarts += 1;
            }
            _ => {}
        }
        self.state = self.next_state(event);
        self.state
    }

    /// Pure transition. Events that do not apply leave the state unchanged.
    fn next_state(&self, event: SupervisionEvent) -> SupervisionState {
        use SupervisionEvent as E;
        use SupervisionState as S;

        match (self.state, event) {
            (S::FailedTerminal, _) | (S::Stopped, _) => self.state,
            (_, E::Stop) => S::Stopped,
            (S::Starting, E::Registered) => S::Running,
            (S::Starting, E::RegistrationFailed) => S::FailedTerminal,
            (S::Running, E::WorkerFailed) if self.consecutive_failures > self.max_restarts => {
                S::FailedTerminal
            }
            (S::Running, E::WorkerFailed) => S::BackingOff {
                attempt: self.consecutive_failures,
            },
            (S::BackingOff { .. }, E::BackoffElapsed) => S::Starting,
            (state, _) => state,
        }
    }
}

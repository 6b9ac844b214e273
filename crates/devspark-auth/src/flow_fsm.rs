//! Redirect flow state machine using rust-fsm.
//!
//! Tracks one OAuth authorization-code round trip on the site API facade.
//!
//! ## State Diagram
//!
//! ```text
//!   Idle
//!    │ Initiate
//!    ▼
//!   AwaitingRedirect
//!    │ CallbackArrived          (Idle also accepts CallbackArrived:
//!    ▼                           the callback may land in a new process)
//!   CallbackReceived
//!    │ TokenReceived
//!    ▼
//!   TokenExchanged
//!    │ ProfileReceived
//!    ▼
//!   ProfileFetched
//!    │ Finish
//!    ▼
//!   Complete
//!
//!   any non-terminal state ── Fail ──► Failed
//! ```
//!
//! Every flow owns its machine ([`RedirectFlow`]), so overlapping callbacks
//! never drive each other's transitions.

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub redirect_flow(Idle)

    Idle => {
        Initiate => AwaitingRedirect,
        CallbackArrived => CallbackReceived,
        Fail => Failed
    },
    AwaitingRedirect => {
        CallbackArrived => CallbackReceived,
        Fail => Failed
    },
    CallbackReceived => {
        TokenReceived => TokenExchanged,
        Fail => Failed
    },
    TokenExchanged => {
        ProfileReceived => ProfileFetched,
        Fail => Failed
    },
    ProfileFetched => {
        Finish => Complete,
        Fail => Failed
    }
}

pub use redirect_flow::Input as FlowInput;
pub use redirect_flow::State as FlowMachineState;
pub use redirect_flow::StateMachine as FlowMachine;

/// Redirect flow state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    AwaitingRedirect,
    CallbackReceived,
    TokenExchanged,
    ProfileFetched,
    Complete,
    Failed,
}

impl FlowState {
    /// Complete and Failed end a flow; only a new flow leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Complete | FlowState::Failed)
    }
}

impl From<&FlowMachineState> for FlowState {
    fn from(state: &FlowMachineState) -> Self {
        match state {
            FlowMachineState::Idle => FlowState::Idle,
            FlowMachineState::AwaitingRedirect => FlowState::AwaitingRedirect,
            FlowMachineState::CallbackReceived => FlowState::CallbackReceived,
            FlowMachineState::TokenExchanged => FlowState::TokenExchanged,
            FlowMachineState::ProfileFetched => FlowState::ProfileFetched,
            FlowMachineState::Complete => FlowState::Complete,
            FlowMachineState::Failed => FlowState::Failed,
        }
    }
}

/// Machine for one redirect round trip.
#[derive(Debug)]
pub(crate) struct RedirectFlow {
    machine: FlowMachine,
}

impl RedirectFlow {
    pub(crate) fn new() -> Self {
        Self {
            machine: FlowMachine::new(),
        }
    }

    pub(crate) fn state(&self) -> FlowState {
        FlowState::from(self.machine.state())
    }

    /// Apply `input` and return the resulting state.
    ///
    /// The machine only tracks progress; a rejected input is logged and
    /// leaves the state where it was.
    pub(crate) fn step(&mut self, input: FlowInput) -> FlowState {
        if self.machine.consume(&input).is_err() {
            warn!(
                input = ?input,
                state = %self.state(),
                "Ignoring invalid OAuth flow transition"
            );
        }
        self.state()
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FlowState::Idle => "idle",
            FlowState::AwaitingRedirect => "awaiting_redirect",
            FlowState::CallbackReceived => "callback_received",
            FlowState::TokenExchanged => "token_exchanged",
            FlowState::ProfileFetched => "profile_fetched",
            FlowState::Complete => "complete",
            FlowState::Failed => "failed",
        };
        f.write_str(s)
    }
}

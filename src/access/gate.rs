//! Per-session admission state machine.

use serde::Serialize;

use super::AllowList;

/// Admission state of one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Unset,
    /// An identifier was submitted and is being checked
    Pending,
    Admitted,
    /// Not terminal; the user may submit again
    Denied,
}

/// Tracks admission for a session without ever storing the identifier
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    state: GateState,
    before_pending: GateState,
}

impl AccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_admitted(&self) -> bool {
        self.state == GateState::Admitted
    }

    /// An identifier has been entered; the check is in flight
    pub fn begin(&mut self) -> GateState {
        if self.state != GateState::Pending {
            self.before_pending = self.state;
        }
        self.state = GateState::Pending;
        self.state
    }

    /// The check could not run; return to the state before `begin`
    pub fn abort(&mut self) -> GateState {
        if self.state == GateState::Pending {
            self.state = self.before_pending;
        }
        self.state
    }

    /// Membership-test the identifier. It is consumed here and dropped when
    /// this returns, whatever the outcome.
    pub fn resolve(&mut self, identifier: String, allow_list: &AllowList) -> GateState {
        self.state = if allow_list.contains(&identifier) {
            GateState::Admitted
        } else {
            GateState::Denied
        };
        drop(identifier);
        self.state
    }

    /// `begin` and `resolve` in one step
    pub fn submit(&mut self, identifier: String, allow_list: &AllowList) -> GateState {
        self.begin();
        self.resolve(identifier, allow_list)
    }
}

//! Sharing Gate.
//!
//! `Closed → Open → {Confirmed(consent) | Cancelled} → Closed`. Confirming
//! needs the acknowledgment flag whatever the consent value; every close
//! wipes the dialog's local flags so reopening starts fresh.

use serde::Serialize;

use super::types::SharingDecision;
use super::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Closed,
    Open {
        consent: bool,
        acknowledged: bool,
    },
}

#[derive(Debug, Default)]
pub struct SharingGate {
    state: GateState,
}

impl SharingGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, GateState::Open { .. })
    }

    /// Open the dialog. Re-opening an open dialog keeps its flags.
    pub fn open(&mut self) {
        if !self.is_open() {
            self.state = GateState::Open {
                consent: false,
                acknowledged: false,
            };
        }
    }

    /// Returns `false` when the dialog is closed and nothing changed.
    pub fn set_consent(&mut self, value: bool) -> bool {
        match &mut self.state {
            GateState::Open { consent, .. } => {
                *consent = value;
                true
            }
            GateState::Closed => false,
        }
    }

    /// Returns `false` when the dialog is closed and nothing changed.
    pub fn set_acknowledged(&mut self, value: bool) -> bool {
        match &mut self.state {
            GateState::Open { acknowledged, .. } => {
                *acknowledged = value;
                true
            }
            GateState::Closed => false,
        }
    }

    pub fn cancel(&mut self) {
        self.state = GateState::Closed;
    }

    /// Close with a decision. Without acknowledgment the dialog stays open.
    pub fn confirm(&mut self) -> Result<SharingDecision, ScanError> {
        match self.state {
            GateState::Closed => Err(ScanError::AcknowledgementRequired),
            GateState::Open {
                acknowledged: false,
                ..
            } => Err(ScanError::AcknowledgementRequired),
            GateState::Open {
                consent,
                acknowledged: true,
            } => {
                self.state = GateState::Closed;
                Ok(SharingDecision {
                    consent,
                    acknowledged: true,
                })
            }
        }
    }
}

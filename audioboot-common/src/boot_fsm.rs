// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Loader state machine - pure logic without hardware dependencies.
//!
//! The controller feeds events in and acts on the resulting state; the
//! transition table and the entry dwell gate can be tested on their own.

use crate::protocol::Command;

/// Asserted samples of the boot-request input needed to enter the loader.
pub const DEFAULT_DWELL_THRESHOLD: u32 = 3_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    /// Sampling the boot-request input after reset.
    EntryDecision,
    /// Receiving and dispatching frames.
    CommandLoop,
    /// Handing off to the application.
    ExitToApplication,
    /// Reception failed; only a hardware reset leaves this state.
    FrameError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootEvent {
    /// The request stayed asserted for the whole dwell.
    DwellReached,
    /// The request was released before the dwell elapsed.
    RequestReleased,
    /// An exit found no application to start.
    NoApplication,
    /// A frame arrived; `None` for an unknown command code.
    Command(Option<Command>),
    ReceptionFailed,
}

/// Outcome of the power-up entry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDecision {
    RunApplication,
    EnterCommandLoop,
}

/// Next state for `event` in `state`. Events with no meaning in a state
/// leave it unchanged.
pub fn transition(state: BootState, event: BootEvent) -> BootState {
    match (state, event) {
        (BootState::FrameError, _) => BootState::FrameError,
        (BootState::EntryDecision, BootEvent::DwellReached) => BootState::CommandLoop,
        (BootState::EntryDecision, BootEvent::RequestReleased) => BootState::ExitToApplication,
        (BootState::ExitToApplication, BootEvent::NoApplication) => BootState::CommandLoop,
        (BootState::CommandLoop, BootEvent::ReceptionFailed) => BootState::FrameError,
        (BootState::CommandLoop, BootEvent::Command(Some(Command::Run | Command::Eeprom))) => {
            BootState::ExitToApplication
        }
        (state, _) => state,
    }
}

/// Counts asserted samples of the boot-request input.
///
/// Reaching the threshold wins over a release on the same sample: a request
/// held for exactly `threshold` samples enters the command loop.
#[derive(Debug, Clone, Copy)]
pub struct DwellGate {
    threshold: u32,
    count: u32,
}

impl DwellGate {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            count: 0,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Feed one sample. Returns the decision once it is known.
    pub fn sample(&mut self, asserted: bool) -> Option<EntryDecision> {
        if !asserted {
            return Some(EntryDecision::RunApplication);
        }
        self.count = self.count.saturating_add(1);
        (self.count >= self.threshold).then_some(EntryDecision::EnterCommandLoop)
    }

    /// Decide from a finite sample sequence; running out of samples counts
    /// as a release.
    pub fn decide(mut self, samples: impl IntoIterator<Item = bool>) -> EntryDecision {
        samples
            .into_iter()
            .find_map(|asserted| self.sample(asserted))
            .unwrap_or(EntryDecision::RunApplication)
    }
}

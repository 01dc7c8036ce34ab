// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Top-level loader: entry decision, command loop and application handoff.
//!
//! The controller owns every hardware handle it needs. It never jumps by
//! itself; [`Bootloader::run`] returns a [`BootOutcome`] and the board code
//! performs the handoff or the error blink.

use embedded_hal::digital::{InputPin, StatefulOutputPin};

use crate::boot_fsm::{self, BootEvent, BootState, DwellGate, EntryDecision};
use crate::config::{BootConfig, LayoutError, RequestPolarity};
use crate::decoder::{FrameSource, ReceiveError};
use crate::eeprom::{Eeprom, EepromWriter};
use crate::flash::FlashProgrammer;
use crate::memory::{AppEntry, MemoryImage};
use crate::protocol::{Command, Frame};

/// How a loader session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Reset the hardware and jump here.
    Application(AppEntry),
    /// Reception failed; blink until reset.
    FrameError(ReceiveError),
}

pub struct Bootloader<S, M, E, R, L, const FRAME: usize> {
    source: S,
    flash: FlashProgrammer<M>,
    eeprom: EepromWriter<E>,
    request: R,
    led: L,
    config: BootConfig,
    frame: Frame<FRAME>,
    state: BootState,
    session_entry: Option<AppEntry>,
}

impl<S, M, E, R, L, const FRAME: usize> Bootloader<S, M, E, R, L, FRAME>
where
    S: FrameSource,
    M: MemoryImage,
    E: Eeprom,
    R: InputPin,
    L: StatefulOutputPin,
{
    /// Assemble a loader. Fails when the layout is unusable or the frame
    /// payload does not match its page size.
    pub fn new(
        source: S,
        flash: FlashProgrammer<M>,
        eeprom: EepromWriter<E>,
        request: R,
        led: L,
        config: BootConfig,
    ) -> Result<Self, LayoutError> {
        let layout = *flash.layout();
        layout.validate()?;
        if Frame::<FRAME>::PAGE_SIZE != layout.page_size as usize {
            return Err(LayoutError::FrameMismatch {
                payload: Frame::<FRAME>::PAGE_SIZE,
                page: layout.page_size,
            });
        }

        Ok(Self {
            source,
            flash,
            eeprom,
            request,
            led,
            config,
            frame: Frame::new(),
            state: BootState::EntryDecision,
            session_entry: None,
        })
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    pub fn flash(&self) -> &FlashProgrammer<M> {
        &self.flash
    }

    pub fn eeprom(&self) -> &EepromWriter<E> {
        &self.eeprom
    }

    /// Entry pointer captured from page 0 during this session.
    pub fn session_entry(&self) -> Option<AppEntry> {
        self.session_entry
    }

    pub fn into_parts(self) -> (S, FlashProgrammer<M>, EepromWriter<E>, R, L) {
        (self.source, self.flash, self.eeprom, self.request, self.led)
    }

    /// Run from power-up until the application should start or reception
    /// fails.
    pub fn run(&mut self) -> BootOutcome {
        if self.decide_entry() == EntryDecision::RunApplication {
            if let Some(outcome) = self.exit_to_application() {
                return outcome;
            }
        }
        self.command_loop()
    }

    /// Sample the boot-request input until the dwell gate decides. The
    /// status LED is lit while the request is held.
    pub fn decide_entry(&mut self) -> EntryDecision {
        let mut gate = DwellGate::new(self.config.dwell_threshold);
        let decision = loop {
            let asserted = self.request_asserted();
            if asserted {
                self.led.set_high().ok();
            }
            if let Some(decision) = gate.sample(asserted) {
                break decision;
            }
        };
        self.led.set_low().ok();

        let event = match decision {
            EntryDecision::EnterCommandLoop => BootEvent::DwellReached,
            EntryDecision::RunApplication => BootEvent::RequestReleased,
        };
        self.advance(event);
        log::debug!("entry decision after {} samples: {:?}", gate.count(), decision);
        decision
    }

    /// Receive and dispatch frames until one of them exits.
    pub fn command_loop(&mut self) -> BootOutcome {
        loop {
            if let Some(outcome) = self.step() {
                return outcome;
            }
        }
    }

    /// Receive one frame and dispatch it.
    pub fn step(&mut self) -> Option<BootOutcome> {
        if let Err(err) = self.source.receive(self.frame.as_bytes_mut()) {
            log::warn!("reception failed: {}", err);
            self.advance(BootEvent::ReceptionFailed);
            return Some(BootOutcome::FrameError(err));
        }
        self.dispatch()
    }

    /// Act on the frame currently in the buffer, then clear its command.
    pub fn dispatch(&mut self) -> Option<BootOutcome> {
        let command = self.frame.command();
        self.advance(BootEvent::Command(command));

        let outcome = match command {
            Some(Command::Program) => {
                self.program_frame_page();
                None
            }
            Some(Command::Run) => self.run_application(),
            Some(Command::Eeprom) => {
                self.write_frame_eeprom();
                self.led.set_low().ok();
                self.exit_to_application()
            }
            Some(Command::None | Command::Test | Command::Exit) | None => None,
        };

        self.frame.clear_command();
        outcome
    }

    /// Load raw bytes into the frame buffer, as the receiver would.
    pub fn load_frame(&mut self, frame: &Frame<FRAME>) {
        self.frame = frame.clone();
    }

    pub fn frame(&self) -> &Frame<FRAME> {
        &self.frame
    }

    fn program_frame_page(&mut self) {
        let page = self.frame.page_index();
        let address = page as u32 * self.flash.layout().page_size as u32;

        if !self.flash.is_writable(address) {
            log::warn!("refusing page {} at {:#06x}: loader region", page, address);
            return;
        }

        let captured = self.flash.program_page(address, self.frame.payload());
        if address == 0 {
            // a rewritten page 0 replaces whatever entry an earlier copy gave
            if let Some(entry) = captured {
                log::debug!("captured entry {:#06x}", entry.word_address());
            }
            self.session_entry = captured;
        }
        self.led.toggle().ok();
    }

    fn write_frame_eeprom(&mut self) {
        let page_size = self.flash.layout().page_size as u32;
        let start = (self.frame.page_index() as u32 * page_size).min(u16::MAX as u32) as u16;
        let payload = self.frame.payload();
        let len = (self.frame.length() as usize).min(payload.len());
        self.eeprom.write_block(start, &payload[..len]);
    }

    /// Persist the entry captured this session, then exit to it.
    fn run_application(&mut self) -> Option<BootOutcome> {
        if let Some(entry) = self.session_entry {
            self.flash.store_entry_pointer(entry);
        }
        self.exit_to_application()
    }

    /// Hand off to the persisted entry pointer. Without one the loader stays
    /// in the command loop.
    fn exit_to_application(&mut self) -> Option<BootOutcome> {
        match self.flash.read_entry_pointer() {
            Some(entry) => Some(BootOutcome::Application(entry)),
            None => {
                log::warn!("no application entry, staying in loader");
                self.advance(BootEvent::NoApplication);
                None
            }
        }
    }

    fn request_asserted(&mut self) -> bool {
        match self.config.request_polarity {
            RequestPolarity::ActiveLow => self.request.is_low().unwrap_or(false),
            RequestPolarity::ActiveHigh => self.request.is_high().unwrap_or(false),
        }
    }

    fn advance(&mut self, event: BootEvent) {
        let next = boot_fsm::transition(self.state, event);
        if next != self.state {
            log::debug!("{:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }
}

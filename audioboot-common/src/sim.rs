// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Simulated hardware for host-side verification and tests.
//!
//! A [`SimLine`] and a [`SimTimer`] share one [`SimClock`]; every pin read or
//! timer poll costs a few ticks, so a [`SignalDecoder`](crate::SignalDecoder)
//! driven by them behaves like the polling loop on the device.

use std::cell::Cell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};

use crate::config::MemoryLayout;
use crate::decoder::{FrameSource, ReceiveError, TickTimer};
use crate::eeprom::Eeprom;
use crate::linecode::Waveform;
use crate::memory::MemoryImage;

// =============================================================================
// Clock, line and timer
// =============================================================================

/// Shared tick counter.
#[derive(Debug, Clone, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.0.get()
    }

    pub fn advance(&self, ticks: u64) {
        self.0.set(self.0.get() + ticks);
    }
}

/// Input pin replaying a waveform against the shared clock.
pub struct SimLine {
    wave: Waveform,
    clock: SimClock,
    read_cost: u64,
}

impl SimLine {
    pub fn new(wave: Waveform, clock: SimClock) -> Self {
        Self {
            wave,
            clock,
            read_cost: 1,
        }
    }

    pub fn with_read_cost(mut self, ticks: u64) -> Self {
        self.read_cost = ticks;
        self
    }

    /// Whether the clock has run past the end of the waveform.
    pub fn finished(&self) -> bool {
        self.clock.now() >= self.wave.duration
    }
}

impl ErrorType for SimLine {
    type Error = Infallible;
}

impl InputPin for SimLine {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let level = self.wave.level_at(self.clock.now());
        self.clock.advance(self.read_cost);
        Ok(level)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// Tick timer on the shared clock, saturating like the 16-bit hardware count.
pub struct SimTimer {
    clock: SimClock,
    start: u64,
    poll_cost: u64,
}

impl SimTimer {
    pub fn new(clock: SimClock) -> Self {
        let start = clock.now();
        Self {
            clock,
            start,
            poll_cost: 1,
        }
    }
}

impl TickTimer for SimTimer {
    fn restart(&mut self) {
        self.start = self.clock.now();
    }

    fn elapsed(&mut self) -> u16 {
        self.clock.advance(self.poll_cost);
        (self.clock.now() - self.start).min(u16::MAX as u64) as u16
    }
}

// =============================================================================
// Flash with an AVR page buffer
// =============================================================================

/// Program memory modelled on AVR self-programming: `write_word` fills a
/// temporary buffer and `commit_page` can only clear bits.
#[derive(Debug, Clone)]
pub struct SimFlash {
    bytes: Vec<u8>,
    page_size: usize,
    buffer: Vec<u8>,
    erased: Vec<u32>,
    committed: Vec<u32>,
}

impl SimFlash {
    /// Fully erased flash for `layout`.
    pub fn new(layout: &MemoryLayout) -> Self {
        let page_size = layout.page_size as usize;
        Self {
            bytes: vec![0xFF; layout.flash_size as usize],
            page_size,
            buffer: vec![0xFF; page_size],
            erased: Vec::new(),
            committed: Vec::new(),
        }
    }

    /// Place `data` at `addr` directly, bypassing the programming sequence.
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        let start = addr as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page(&self, page_addr: u32) -> &[u8] {
        let start = page_addr as usize;
        &self.bytes[start..start + self.page_size]
    }

    /// Page addresses erased so far, in order.
    pub fn erased_pages(&self) -> &[u32] {
        &self.erased
    }

    /// Page addresses committed so far, in order.
    pub fn committed_pages(&self) -> &[u32] {
        &self.committed
    }

    fn page_range(&self, page_addr: u32) -> std::ops::Range<usize> {
        let start = page_addr as usize;
        assert_eq!(start % self.page_size, 0, "unaligned page address {start:#x}");
        start..start + self.page_size
    }
}

impl MemoryImage for SimFlash {
    fn erase_page(&mut self, page_addr: u32) {
        let range = self.page_range(page_addr);
        self.bytes[range].fill(0xFF);
        self.erased.push(page_addr);
    }

    fn write_word(&mut self, addr: u32, word: u16) {
        let offset = addr as usize % self.page_size;
        self.buffer[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
    }

    fn commit_page(&mut self, page_addr: u32) {
        let range = self.page_range(page_addr);
        for (cell, &value) in self.bytes[range].iter_mut().zip(&self.buffer) {
            *cell &= value;
        }
        self.buffer.fill(0xFF);
        self.committed.push(page_addr);
    }

    fn read_word(&self, addr: u32) -> u16 {
        let at = addr as usize;
        u16::from_le_bytes([self.bytes[at], self.bytes[at + 1]])
    }
}

// =============================================================================
// EEPROM
// =============================================================================

/// EEPROM that stays busy for a number of polls after each write and panics
/// if written while busy.
#[derive(Debug, Clone)]
pub struct SimEeprom {
    cells: Vec<u8>,
    busy_polls: u32,
    busy_left: Cell<u32>,
    writes: Vec<(u16, u8)>,
}

impl SimEeprom {
    pub fn new(size: u16) -> Self {
        Self {
            cells: vec![0xFF; size as usize],
            busy_polls: 3,
            busy_left: Cell::new(0),
            writes: Vec::new(),
        }
    }

    pub fn with_busy_polls(mut self, polls: u32) -> Self {
        self.busy_polls = polls;
        self
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Every `(address, value)` written, in order.
    pub fn writes(&self) -> &[(u16, u8)] {
        &self.writes
    }
}

impl Eeprom for SimEeprom {
    fn is_busy(&self) -> bool {
        let left = self.busy_left.get();
        self.busy_left.set(left.saturating_sub(1));
        left > 0
    }

    fn start_write(&mut self, addr: u16, value: u8) {
        assert_eq!(self.busy_left.get(), 0, "EEPROM written while busy");
        self.cells[addr as usize] = value;
        self.writes.push((addr, value));
        self.busy_left.set(self.busy_polls);
    }
}

// =============================================================================
// Pins
// =============================================================================

/// Input pin returning scripted levels, then repeating the last one.
#[derive(Debug, Clone)]
pub struct ScriptedPin {
    levels: VecDeque<bool>,
    last: bool,
    reads: usize,
}

impl ScriptedPin {
    pub fn new(levels: impl IntoIterator<Item = bool>, then: bool) -> Self {
        Self {
            levels: levels.into_iter().collect(),
            last: then,
            reads: 0,
        }
    }

    /// A pin stuck at `level`.
    pub fn constant(level: bool) -> Self {
        Self::new(std::iter::empty(), level)
    }

    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl ErrorType for ScriptedPin {
    type Error = Infallible;
}

impl InputPin for ScriptedPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.reads += 1;
        Ok(self.levels.pop_front().unwrap_or(self.last))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// Output pin that remembers every level it was driven to.
#[derive(Debug, Clone, Default)]
pub struct RecordingLed {
    high: bool,
    history: Vec<bool>,
}

impl RecordingLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_lit(&self) -> bool {
        self.high
    }

    pub fn history(&self) -> &[bool] {
        &self.history
    }
}

impl ErrorType for RecordingLed {
    type Error = Infallible;
}

impl OutputPin for RecordingLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.history.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.history.push(true);
        Ok(())
    }
}

impl StatefulOutputPin for RecordingLed {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high)
    }
}

// =============================================================================
// Frame source
// =============================================================================

/// Hands out queued frames, then reports the line as idle.
#[derive(Debug, Clone, Default)]
pub struct FrameQueue {
    frames: VecDeque<Vec<u8>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: &[u8]) {
        self.frames.push_back(frame.to_vec());
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FromIterator<Vec<u8>> for FrameQueue {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl FrameSource for FrameQueue {
    fn receive(&mut self, frame: &mut [u8]) -> Result<(), ReceiveError> {
        let next = self.frames.pop_front().ok_or(ReceiveError::Idle)?;
        let n = next.len().min(frame.len());
        frame[..n].copy_from_slice(&next[..n]);
        frame[n..].fill(0);
        Ok(())
    }
}

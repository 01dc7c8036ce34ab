// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Differential Manchester receiver.
//!
//! Every bit cell starts with a transition; a `1` adds a second transition in
//! the middle of the cell. The receiver has no clock of its own, so each frame
//! starts with a run of `0` cells that is timed to learn the bit period:
//!
//! 1. Wait for the first edge, then time the next 16 edge-to-edge intervals.
//!    The first 8 are line settling and are dropped; the last 8 are averaged.
//! 2. Skip further `0` cells until one carries a mid-cell transition. That
//!    cell is the start bit and is not stored.
//! 3. For each data bit: wait for the cell edge, sample, wait 3/4 of a period,
//!    sample again. Differing samples mean `1`. Bits are packed MSB first.
//!
//! Every wait inside a frame has a deadline, so a dropped signal surfaces as
//! [`ReceiveError::EdgeTimeout`] instead of a hang. Before the period is known
//! a stalled edge run is treated as line noise and synchronisation starts
//! over; only the idle deadline bounds that wait.

use embedded_hal::digital::InputPin;
use thiserror::Error;

use crate::config::DecoderConfig;

/// Edge intervals timed during synchronisation.
pub const SYNC_EDGES: u16 = 16;

/// Leading intervals discarded while the coupling network settles.
pub const SETTLE_EDGES: u16 = 8;

const MEASURED_EDGES: u32 = (SYNC_EDGES - SETTLE_EDGES) as u32;

/// Restart point for the idle wait, well clear of timer saturation.
const IDLE_CHUNK_TICKS: u16 = 0x8000;

/// Free-running tick counter.
pub trait TickTimer {
    /// Reset the count to zero.
    fn restart(&mut self);

    /// Ticks since the last restart, saturating at `u16::MAX`.
    fn elapsed(&mut self) -> u16;
}

/// Anything that can fill a frame buffer.
pub trait FrameSource {
    fn receive(&mut self, frame: &mut [u8]) -> Result<(), ReceiveError>;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveError {
    #[error("no edge within {ticks} ticks")]
    EdgeTimeout { ticks: u16 },
    #[error("preamble gave an unusable bit period of {ticks} ticks")]
    BadPreamble { ticks: u16 },
    #[error("no signal before the idle deadline")]
    Idle,
}

/// Bit period measured from a preamble, in timer ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitPeriod {
    ticks: u16,
    sample_offset: u16,
}

impl BitPeriod {
    /// Derive the period from the sum of `MEASURED_EDGES` intervals.
    fn from_total(total: u32) -> Result<Self, ReceiveError> {
        let ticks = (total / MEASURED_EDGES).min(u16::MAX as u32) as u16;
        let sample_offset = (total * 3 / (4 * MEASURED_EDGES)).min(u16::MAX as u32) as u16;
        if ticks == 0 || sample_offset == 0 {
            return Err(ReceiveError::BadPreamble { ticks });
        }
        Ok(Self {
            ticks,
            sample_offset,
        })
    }

    pub fn ticks(&self) -> u16 {
        self.ticks
    }

    /// Delay from a cell edge to the data sample (3/4 period).
    pub fn sample_offset(&self) -> u16 {
        self.sample_offset
    }

    fn edge_deadline(&self, periods: u16) -> u16 {
        self.ticks.saturating_mul(periods.max(1))
    }
}

pub struct SignalDecoder<P, T> {
    pin: P,
    timer: T,
    config: DecoderConfig,
}

impl<P: InputPin, T: TickTimer> SignalDecoder<P, T> {
    pub fn new(pin: P, timer: T, config: DecoderConfig) -> Self {
        Self { pin, timer, config }
    }

    pub fn into_parts(self) -> (P, T) {
        (self.pin, self.timer)
    }

    /// Receive one frame into `frame`, returning the bit period it was sent at.
    pub fn receive_frame(&mut self, frame: &mut [u8]) -> Result<BitPeriod, ReceiveError> {
        let (mut p, period) = self.synchronise()?;
        let delay = period.sample_offset();
        let deadline = period.edge_deadline(self.config.edge_timeout_periods);
        log::debug!("bit period {} ticks, sampling at {}", period.ticks(), delay);

        // skip zero cells up to the start bit
        self.hold(delay);
        while self.level() == p {
            p = self.wait_edge(p, deadline).inspect_err(log_timeout)?;
            self.timer.restart();
            self.hold(delay);
        }
        p = self.level();

        for byte in frame.iter_mut() {
            let mut value = 0u8;
            for _ in 0..8 {
                let edge = self.wait_edge(p, deadline).inspect_err(log_timeout)?;
                self.timer.restart();
                self.hold(delay);
                let t = self.level();
                value = (value << 1) | u8::from(edge != t);
                p = t;
            }
            *byte = value;
        }

        Ok(period)
    }

    /// Time the preamble and return the line level after its last measured
    /// edge. A run of edges that stops before the count is reached is taken
    /// as noise: the decoder goes back to waiting for a first edge.
    fn synchronise(&mut self) -> Result<(bool, BitPeriod), ReceiveError> {
        let mut p = self.level();
        'arm: loop {
            p = self.wait_first_edge(p)?;
            self.timer.restart();

            let mut total: u32 = 0;
            for n in 0..SYNC_EDGES {
                match self.wait_edge(p, self.config.sync_timeout_ticks) {
                    Ok(level) => p = level,
                    Err(_) => {
                        log::debug!("edge run stopped after {} intervals, rearming", n);
                        continue 'arm;
                    }
                }
                let interval = self.timer.elapsed();
                self.timer.restart();
                if n >= SETTLE_EDGES {
                    total += interval as u32;
                }
            }
            return Ok((p, BitPeriod::from_total(total)?));
        }
    }

    fn level(&mut self) -> bool {
        self.pin.is_high().unwrap_or(false)
    }

    /// Wait for the line to leave `from`, giving up once the timer reaches
    /// `deadline`. Returns the new level.
    fn wait_edge(&mut self, from: bool, deadline: u16) -> Result<bool, ReceiveError> {
        loop {
            let level = self.level();
            if level != from {
                return Ok(level);
            }
            if self.timer.elapsed() >= deadline {
                return Err(ReceiveError::EdgeTimeout { ticks: deadline });
            }
        }
    }

    /// Wait for the first edge of a frame, bounded only by the idle deadline.
    fn wait_first_edge(&mut self, from: bool) -> Result<bool, ReceiveError> {
        self.timer.restart();
        let mut waited: u32 = 0;
        loop {
            let level = self.level();
            if level != from {
                return Ok(level);
            }
            let Some(limit) = self.config.idle_timeout_ticks else {
                continue;
            };
            let now = self.timer.elapsed();
            if waited.saturating_add(now as u32) >= limit {
                return Err(ReceiveError::Idle);
            }
            if now >= IDLE_CHUNK_TICKS {
                waited = waited.saturating_add(now as u32);
                self.timer.restart();
            }
        }
    }

    fn hold(&mut self, ticks: u16) {
        while self.timer.elapsed() < ticks {}
    }
}

fn log_timeout(err: &ReceiveError) {
    log::warn!("{}", err);
}

impl<P: InputPin, T: TickTimer> FrameSource for SignalDecoder<P, T> {
    fn receive(&mut self, frame: &mut [u8]) -> Result<(), ReceiveError> {
        self.receive_frame(frame).map(|_| ())
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Differential Manchester encoder, the transmit side of
//! [`SignalDecoder`](crate::decoder::SignalDecoder).
//!
//! Output is a [`Waveform`]: a starting level and the instants at which the
//! line flips, in abstract ticks. The host tool renders it to audio samples;
//! the tests replay it through a simulated input pin.

/// Zero cells sent before the start bit unless configured otherwise.
pub const DEFAULT_PREAMBLE_BITS: u32 = 40;

/// Fewest zero cells the receiver can synchronise on: one to arm, sixteen to
/// time.
pub const MIN_PREAMBLE_BITS: u32 = 17;

/// Idle cells placed before each frame unless configured otherwise.
pub const DEFAULT_GAP_BITS: u32 = 8;

/// A two-level signal described by its transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waveform {
    pub initial_level: bool,
    /// Strictly increasing transition instants.
    pub transitions: Vec<u64>,
    /// Length of the signal; the level holds after the last transition.
    pub duration: u64,
}

impl Waveform {
    /// Line level at tick `t`.
    pub fn level_at(&self, t: u64) -> bool {
        let flips = self.transitions.partition_point(|&x| x <= t);
        self.initial_level ^ (flips % 2 == 1)
    }

    /// Stretch every instant by `factor`.
    pub fn scaled(&self, factor: u64) -> Self {
        Self {
            initial_level: self.initial_level,
            transitions: self.transitions.iter().map(|t| t * factor).collect(),
            duration: self.duration * factor,
        }
    }

    /// Shift transition `i` by `offset(i)` ticks, keeping the order strict.
    pub fn perturb(&self, mut offset: impl FnMut(usize) -> i64) -> Self {
        let mut transitions = Vec::with_capacity(self.transitions.len());
        let mut floor = 0u64;
        for (i, &t) in self.transitions.iter().enumerate() {
            let moved = (t as i64 + offset(i)).max(0) as u64;
            let moved = moved.max(floor);
            transitions.push(moved);
            floor = moved + 1;
        }
        let duration = self.duration.max(floor);
        Self {
            initial_level: self.initial_level,
            transitions,
            duration,
        }
    }

    /// Drop everything from `at` on, as if the signal were cut.
    pub fn truncated(&self, at: u64) -> Self {
        Self {
            initial_level: self.initial_level,
            transitions: self.transitions.iter().copied().take_while(|&t| t < at).collect(),
            duration: self.duration.min(at),
        }
    }

    /// Level of every tick from 0 to `duration`.
    pub fn levels(&self) -> impl Iterator<Item = bool> + '_ {
        let mut flips = self.transitions.iter().peekable();
        let mut level = self.initial_level;
        (0..self.duration).map(move |t| {
            while flips.next_if(|&&x| x <= t).is_some() {
                level = !level;
            }
            level
        })
    }
}

/// Turns frames into bit cells of `2 * half_period` ticks.
#[derive(Debug, Clone, Copy)]
pub struct LineEncoder {
    pub half_period: u64,
    pub preamble_bits: u32,
    pub gap_bits: u32,
}

impl LineEncoder {
    pub fn new(half_period: u64) -> Self {
        Self {
            half_period,
            preamble_bits: DEFAULT_PREAMBLE_BITS,
            gap_bits: DEFAULT_GAP_BITS,
        }
    }

    pub fn with_preamble(mut self, bits: u32) -> Self {
        self.preamble_bits = bits;
        self
    }

    pub fn with_gap(mut self, bits: u32) -> Self {
        self.gap_bits = bits;
        self
    }

    pub fn cell_ticks(&self) -> u64 {
        2 * self.half_period
    }

    pub fn encode(&self, frame: &[u8]) -> Waveform {
        self.encode_frames([frame])
    }

    /// Encode frames back to back. Each is preceded by `gap_bits` idle cells
    /// and its preamble.
    pub fn encode_frames<'a>(&self, frames: impl IntoIterator<Item = &'a [u8]>) -> Waveform {
        let mut cells = CellWriter {
            at: 0,
            half: self.half_period,
            transitions: Vec::new(),
        };

        for frame in frames {
            for _ in 0..self.gap_bits {
                cells.idle();
            }
            for _ in 0..self.preamble_bits {
                cells.bit(false);
            }
            cells.bit(true);
            for &byte in frame {
                for shift in (0..8).rev() {
                    cells.bit(byte >> shift & 1 == 1);
                }
            }
        }
        // let the last cell finish before the signal ends
        cells.idle();

        Waveform {
            initial_level: false,
            transitions: cells.transitions,
            duration: cells.at,
        }
    }
}

struct CellWriter {
    at: u64,
    half: u64,
    transitions: Vec<u64>,
}

impl CellWriter {
    fn idle(&mut self) {
        self.at += 2 * self.half;
    }

    fn bit(&mut self, one: bool) {
        self.transitions.push(self.at);
        if one {
            self.transitions.push(self.at + self.half);
        }
        self.at += 2 * self.half;
    }
}

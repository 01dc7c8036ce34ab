// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Wire frame shared by the loader and the host encoder.
//!
//! A frame is a fixed block of `page_size + 7` bytes, all multi-byte fields
//! little-endian:
//!
//! | Offset | Field      | Size |
//! |--------|------------|------|
//! | 0      | command    | 1    |
//! | 1      | page index | 2    |
//! | 3      | length     | 2    |
//! | 5      | checksum   | 2    |
//! | 7      | payload    | page |
//!
//! The checksum is carried for compatibility with existing encoders and is
//! never checked by the loader.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Field offsets ---

pub const COMMAND: usize = 0;
pub const PAGE_INDEX_LOW: usize = 1;
pub const PAGE_INDEX_HIGH: usize = 2;
pub const LENGTH_LOW: usize = 3;
pub const LENGTH_HIGH: usize = 4;
pub const CHECKSUM_LOW: usize = 5;
pub const CHECKSUM_HIGH: usize = 6;
pub const DATA_START: usize = 7;

/// Bytes preceding the payload.
pub const HEADER_LEN: usize = DATA_START;

/// Total frame size for a given page size.
pub const fn frame_size(page_size: usize) -> usize {
    page_size + HEADER_LEN
}

// --- Commands ---

#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Idle sentinel, written back after every dispatch.
    None = 0,
    /// Reserved, no action.
    Test = 1,
    /// Erase and program one application page.
    Program = 2,
    /// Persist the entry pointer and start the application.
    Run = 3,
    /// Write the payload into EEPROM, then start the application.
    Eeprom = 4,
    /// Reserved code with no action yet.
    Exit = 5,
}

impl Command {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Test),
            2 => Some(Self::Program),
            3 => Some(Self::Run),
            4 => Some(Self::Eeprom),
            5 => Some(Self::Exit),
            _ => None,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("expected {expected} frame bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Write a frame into `out`. The payload is padded with `0xFF` (erased flash)
/// when shorter than the page.
pub fn encode_frame_into(
    out: &mut [u8],
    command: Command,
    page_index: u16,
    length: u16,
    checksum: u16,
    payload: &[u8],
) {
    let [page_lo, page_hi] = page_index.to_le_bytes();
    let [len_lo, len_hi] = length.to_le_bytes();
    let [sum_lo, sum_hi] = checksum.to_le_bytes();
    out[COMMAND] = command.code();
    out[PAGE_INDEX_LOW] = page_lo;
    out[PAGE_INDEX_HIGH] = page_hi;
    out[LENGTH_LOW] = len_lo;
    out[LENGTH_HIGH] = len_hi;
    out[CHECKSUM_LOW] = sum_lo;
    out[CHECKSUM_HIGH] = sum_hi;

    let data = &mut out[DATA_START..];
    let n = payload.len().min(data.len());
    data[..n].copy_from_slice(&payload[..n]);
    data[n..].fill(0xFF);
}

// --- Frame buffer ---

/// One received frame of `SIZE` bytes (`page_size + HEADER_LEN`).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Frame<const SIZE: usize> {
    bytes: [u8; SIZE],
}

impl<const SIZE: usize> Frame<SIZE> {
    /// Payload bytes carried by this frame type.
    pub const PAGE_SIZE: usize = SIZE - HEADER_LEN;

    pub const fn new() -> Self {
        Self { bytes: [0; SIZE] }
    }

    /// Build a frame from its fields.
    pub fn build(
        command: Command,
        page_index: u16,
        length: u16,
        checksum: u16,
        payload: &[u8],
    ) -> Self {
        let mut frame = Self::new();
        encode_frame_into(&mut frame.bytes, command, page_index, length, checksum, payload);
        frame
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let bytes: [u8; SIZE] = bytes.try_into().map_err(|_| FrameError::Length {
            expected: SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn command_code(&self) -> u8 {
        self.bytes[COMMAND]
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.command_code())
    }

    /// Reset the command byte so the frame cannot be dispatched twice.
    pub fn clear_command(&mut self) {
        self.bytes[COMMAND] = Command::None.code();
    }

    pub fn page_index(&self) -> u16 {
        u16::from_le_bytes([self.bytes[PAGE_INDEX_LOW], self.bytes[PAGE_INDEX_HIGH]])
    }

    /// Declared payload length. Only the EEPROM command reads it.
    pub fn length(&self) -> u16 {
        u16::from_le_bytes([self.bytes[LENGTH_LOW], self.bytes[LENGTH_HIGH]])
    }

    pub fn checksum(&self) -> u16 {
        u16::from_le_bytes([self.bytes[CHECKSUM_LOW], self.bytes[CHECKSUM_HIGH]])
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[DATA_START..]
    }
}

impl<const SIZE: usize> Default for Frame<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

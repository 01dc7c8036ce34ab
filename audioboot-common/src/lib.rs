// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Core logic for the audioboot loader.
//!
//! This crate supports both `no_std` (firmware) and `std` (host) environments:
//! - Without default features: `no_std`, used by `audioboot-loader`
//! - `std` feature (default): adds the line-code encoder and the simulated
//!   hardware used by the host tool and the tests

#![cfg_attr(not(feature = "std"), no_std)]

pub mod boot_fsm;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod eeprom;
pub mod flash;
pub mod memory;
pub mod protocol;

#[cfg(feature = "std")]
pub mod linecode;
#[cfg(feature = "std")]
pub mod sim;

// Re-export commonly used types
pub use boot_fsm::{BootEvent, BootState, EntryDecision};
pub use config::{BootConfig, DecoderConfig, LayoutError, MemoryLayout, RequestPolarity};
pub use controller::{BootOutcome, Bootloader};
pub use decoder::{FrameSource, ReceiveError, SignalDecoder, TickTimer};
pub use eeprom::{Eeprom, EepromWriter};
pub use flash::FlashProgrammer;
pub use memory::{AppEntry, MemoryImage};
pub use protocol::{frame_size, Command, Frame, FrameError, HEADER_LEN};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// Blink an LED a specified number of times.
pub fn blink(led: &mut impl OutputPin, delay: &mut impl DelayNs, count: u32, period_ms: u32) {
    for _ in 0..count {
        led.set_high().ok();
        delay.delay_ms(period_ms);
        led.set_low().ok();
        delay.delay_ms(period_ms);
    }
}

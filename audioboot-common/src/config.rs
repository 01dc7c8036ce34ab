// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Build-time configuration: memory layout, decoder deadlines and entry policy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the persisted application entry slot (one word address).
pub const ENTRY_SLOT_SIZE: u32 = 2;

/// Largest flash an RJMP can cover from address 0 (12-bit offset, wraps at 4K words).
pub const RJMP_REACH: u32 = 8 * 1024;

// --- Memory layout ---

/// Flash and EEPROM geometry of the target device.
///
/// The application owns `[0, bootloader_start)`, the loader owns
/// `[bootloader_start, flash_size)`. The two bytes just below
/// `bootloader_start` hold the persisted application entry pointer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    pub flash_size: u32,
    pub page_size: u16,
    pub bootloader_start: u32,
    pub eeprom_size: u16,
}

impl MemoryLayout {
    /// ATtiny85 with the loader in the top 2 KiB.
    pub const ATTINY85: Self = Self {
        flash_size: 0x2000,
        page_size: 64,
        bootloader_start: 0x1800,
        eeprom_size: 512,
    };

    /// ATtiny45, same loader size as the ATtiny85 build.
    pub const ATTINY45: Self = Self {
        flash_size: 0x1000,
        page_size: 64,
        bootloader_start: 0x0800,
        eeprom_size: 256,
    };

    /// ATmega8 with the loader at the start of its largest (2 KiB) boot section.
    pub const ATMEGA8: Self = Self {
        flash_size: 0x2000,
        page_size: 64,
        bootloader_start: 0x1800,
        eeprom_size: 512,
    };

    /// Look up a built-in layout by device name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "attiny85" => Some(Self::ATTINY85),
            "attiny45" => Some(Self::ATTINY45),
            "atmega8" => Some(Self::ATMEGA8),
            _ => None,
        }
    }

    /// Names accepted by [`MemoryLayout::by_name`].
    pub const DEVICE_NAMES: [&'static str; 3] = ["attiny85", "attiny45", "atmega8"];

    /// Byte address of the persisted application entry slot.
    pub const fn slot_address(&self) -> u32 {
        self.bootloader_start - ENTRY_SLOT_SIZE
    }

    /// Word address the boot vector redirects to.
    pub const fn bootloader_word(&self) -> u16 {
        (self.bootloader_start / 2) as u16
    }

    /// Number of pages available to the application.
    pub const fn app_page_count(&self) -> u32 {
        self.bootloader_start / self.page_size as u32
    }

    /// Page-aligned start of the page containing `addr`.
    pub const fn page_start(&self, addr: u32) -> u32 {
        addr / self.page_size as u32 * self.page_size as u32
    }

    /// Whether `addr` lies inside the loader's own region.
    pub const fn is_protected(&self, addr: u32) -> bool {
        addr >= self.bootloader_start
    }

    /// Check the geometry is one the loader can actually serve.
    pub const fn validate(&self) -> Result<(), LayoutError> {
        let page = self.page_size as u32;
        if page < 4 || !page.is_power_of_two() {
            return Err(LayoutError::PageSize(self.page_size));
        }
        if self.flash_size > RJMP_REACH || self.flash_size % page != 0 {
            return Err(LayoutError::FlashSize(self.flash_size));
        }
        if self.bootloader_start % page != 0
            || self.bootloader_start <= page
            || self.bootloader_start >= self.flash_size
        {
            return Err(LayoutError::BootloaderStart(self.bootloader_start));
        }
        Ok(())
    }
}

/// Rejected layout or frame geometry.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    #[error("page size {0} is not a power of two of at least 4 bytes")]
    PageSize(u16),
    #[error("flash size {0:#x} is not page aligned or out of RJMP reach")]
    FlashSize(u32),
    #[error("bootloader start {0:#x} must be page aligned, above page 0 and below flash end")]
    BootloaderStart(u32),
    #[error("frame payload of {payload} bytes does not match the {page}-byte page")]
    FrameMismatch { payload: usize, page: u16 },
}

// --- Decoder deadlines ---

/// Deadlines for the signal decoder, in timer ticks.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Bit periods to wait for an edge once the rate is known.
    pub edge_timeout_periods: u16,
    /// Longest inter-edge interval accepted while measuring the preamble.
    pub sync_timeout_ticks: u16,
    /// Longest wait for the first edge of a frame; `None` waits forever.
    pub idle_timeout_ticks: Option<u32>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            edge_timeout_periods: 4,
            sync_timeout_ticks: u16::MAX,
            idle_timeout_ticks: None,
        }
    }
}

// --- Entry policy ---

/// Electrical sense of the boot-request input.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPolarity {
    /// Pulled up, asserted by a button to ground.
    ActiveLow,
    ActiveHigh,
}

/// Entry-decision parameters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// Asserted samples needed before committing to the command loop.
    pub dwell_threshold: u32,
    pub request_polarity: RequestPolarity,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            dwell_threshold: crate::boot_fsm::DEFAULT_DWELL_THRESHOLD,
            request_polarity: RequestPolarity::ActiveLow,
        }
    }
}

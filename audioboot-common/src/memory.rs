// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Program-memory abstraction and the boot-vector transforms.
//!
//! The boot vector is an AVR `RJMP` at address 0. When page 0 is programmed the
//! application's own jump target is pulled out of that word and the word is
//! replaced by a jump into the loader; the target lives on in the entry slot
//! just below the loader. The transforms here are pure so they can be tested
//! without any flash behind them.

use crate::config::MemoryLayout;

/// Page-granular program memory with an AVR-style temporary page buffer.
///
/// `write_word` only fills the page buffer; nothing reaches flash until
/// `commit_page`. Implementations busy-wait on the hardware themselves.
pub trait MemoryImage {
    /// Erase the page starting at `page_addr` to `0xFF`.
    fn erase_page(&mut self, page_addr: u32);

    /// Place `word` in the page buffer at byte address `addr`.
    fn write_word(&mut self, addr: u32, word: u16);

    /// Write the page buffer to the (erased) page at `page_addr`.
    fn commit_page(&mut self, page_addr: u32);

    /// Read the little-endian word stored at byte address `addr`.
    fn read_word(&self, addr: u32) -> u16;

    /// Make flash readable again after programming (RWW enable).
    fn enable_reads(&mut self) {}
}

// --- RJMP codec ---

const RJMP_OPCODE: u16 = 0xC000;
const RJMP_OPCODE_MASK: u16 = 0xF000;
const RJMP_OFFSET_MASK: u16 = 0x0FFF;

/// Decode an `RJMP` located at address 0, returning its target word address.
///
/// `RJMP k` at word 0 lands on `k + 1`, wrapping in the 4K-word window.
pub const fn decode_rjmp(word: u16) -> Option<u16> {
    if word & RJMP_OPCODE_MASK != RJMP_OPCODE {
        return None;
    }
    Some(((word & RJMP_OFFSET_MASK) + 1) & RJMP_OFFSET_MASK)
}

/// Encode an `RJMP` at address 0 that lands on `target_word`.
pub const fn encode_rjmp(target_word: u16) -> u16 {
    RJMP_OPCODE | (target_word.wrapping_sub(1) & RJMP_OFFSET_MASK)
}

/// Boot-vector word that sends a reset into the loader.
pub const fn redirect_word(layout: &MemoryLayout) -> u16 {
    encode_rjmp(layout.bootloader_word())
}

// --- Application entry pointer ---

/// Word address of the application's real entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppEntry(u16);

impl AppEntry {
    /// Accept `word` as an entry point if it can hold application code:
    /// not null, not erased flash, and below the loader.
    pub fn new(word: u16, layout: &MemoryLayout) -> Option<Self> {
        let in_app = (word as u32) * 2 < layout.bootloader_start;
        (word != 0 && word != 0xFFFF && in_app).then_some(Self(word))
    }

    pub const fn word_address(self) -> u16 {
        self.0
    }

    pub const fn byte_address(self) -> u32 {
        self.0 as u32 * 2
    }

    /// Slot encoding, as stored below the loader.
    pub const fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

/// Read the persisted entry pointer from the slot below the loader.
pub fn read_entry_slot(memory: &impl MemoryImage, layout: &MemoryLayout) -> Option<AppEntry> {
    AppEntry::new(memory.read_word(layout.slot_address()), layout)
}

/// Follow the chain a hardware reset would take: page-0 vector, then the
/// entry slot if the vector points at the loader.
///
/// Returns the word address control would finally reach, or `None` when
/// the vector is not a jump or the loader has no application to start.
pub fn resolve_reset_target(memory: &impl MemoryImage, layout: &MemoryLayout) -> Option<u16> {
    let words = (layout.flash_size / 2) as u16;
    let target = decode_rjmp(memory.read_word(0))? & (words - 1);
    if target == layout.bootloader_word() {
        read_entry_slot(memory, layout).map(AppEntry::word_address)
    } else {
        Some(target)
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Page programming for the application region.
//!
//! Two entry points write flash:
//! - [`FlashProgrammer::program_page`] for pages received from the host,
//!   patching the boot vector when page 0 goes by
//! - [`FlashProgrammer::merge_write_block`] for the entry slot, rebuilding the
//!   rest of its page from what is already in flash
//!
//! Neither checks the loader's protected region. Callers must only pass
//! addresses for which [`FlashProgrammer::is_writable`] holds.

use crate::config::MemoryLayout;
use crate::memory::{self, AppEntry, MemoryImage};

pub struct FlashProgrammer<M> {
    memory: M,
    layout: MemoryLayout,
}

impl<M: MemoryImage> FlashProgrammer<M> {
    pub fn new(memory: M, layout: MemoryLayout) -> Self {
        Self { memory, layout }
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn into_inner(self) -> M {
        self.memory
    }

    /// Whether a page at `page_addr` may be programmed.
    pub fn is_writable(&self, page_addr: u32) -> bool {
        !self.layout.is_protected(page_addr)
    }

    /// Erase the page at `page_addr` and program it with `payload`.
    ///
    /// For page 0 the first word must be the application's `RJMP`; its target
    /// is returned and the word is replaced by a jump into the loader. A first
    /// word that does not decode to a usable entry still gets redirected, and
    /// `None` is returned.
    ///
    /// Runs with interrupts masked and restores the previous state on return.
    pub fn program_page(&mut self, page_addr: u32, payload: &[u8]) -> Option<AppEntry> {
        debug_assert_eq!(payload.len(), self.layout.page_size as usize);
        let layout = self.layout;
        let memory = &mut self.memory;
        let mut captured = None;

        critical_section::with(|_| {
            memory.erase_page(page_addr);

            for (i, pair) in payload.chunks(2).enumerate() {
                let offset = 2 * i as u32;
                let mut word = u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0xFF)]);

                if page_addr == 0 && offset == 0 {
                    captured = memory::decode_rjmp(word).and_then(|t| AppEntry::new(t, &layout));
                    if captured.is_none() {
                        log::warn!("page 0 vector {:#06x} is not an application jump", word);
                    }
                    word = memory::redirect_word(&layout);
                }

                memory.write_word(page_addr + offset, word);
            }

            memory.commit_page(page_addr);
            memory.enable_reads();
        });

        captured
    }

    /// Overwrite `block.len()` bytes at `flash_addr`, keeping every other byte
    /// of the surrounding page as it was.
    ///
    /// The block must not cross the end of the page containing `flash_addr`.
    pub fn merge_write_block(&mut self, flash_addr: u32, block: &[u8]) {
        let start = self.layout.page_start(flash_addr);
        let page_words = self.layout.page_size as u32 / 2;
        let memory = &mut self.memory;
        let mut remaining = block.len();
        let mut incoming = block.chunks(2);

        critical_section::with(|_| {
            for idx in 0..page_words {
                let addr = start + 2 * idx;
                let fresh = if addr >= flash_addr && remaining > 0 {
                    incoming.next()
                } else {
                    None
                };
                let word = match fresh {
                    Some(pair) => {
                        remaining = remaining.saturating_sub(2);
                        let high = match pair.get(1) {
                            Some(&b) => b,
                            None => (memory.read_word(addr) >> 8) as u8,
                        };
                        u16::from_le_bytes([pair[0], high])
                    }
                    None => memory.read_word(addr),
                };
                memory.write_word(addr, word);
            }

            memory.erase_page(start);
            memory.commit_page(start);
            memory.enable_reads();
        });
    }

    /// Persisted application entry pointer, if the slot holds a usable one.
    pub fn read_entry_pointer(&self) -> Option<AppEntry> {
        memory::read_entry_slot(&self.memory, &self.layout)
    }

    /// Persist `entry` in the slot below the loader.
    pub fn store_entry_pointer(&mut self, entry: AppEntry) {
        log::debug!("storing entry pointer {:#06x}", entry.word_address());
        self.merge_write_block(self.layout.slot_address(), &entry.to_le_bytes());
    }
}

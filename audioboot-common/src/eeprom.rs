// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Byte writes into the device EEPROM.

/// Raw EEPROM access. One write may be in flight at a time.
pub trait Eeprom {
    /// Whether the previous write is still in progress.
    fn is_busy(&self) -> bool;

    /// Start writing `value` at `addr`. Only called when not busy.
    fn start_write(&mut self, addr: u16, value: u8);
}

pub struct EepromWriter<E> {
    eeprom: E,
    capacity: u16,
}

impl<E: Eeprom> EepromWriter<E> {
    pub fn new(eeprom: E, capacity: u16) -> Self {
        Self { eeprom, capacity }
    }

    pub fn eeprom(&self) -> &E {
        &self.eeprom
    }

    pub fn into_inner(self) -> E {
        self.eeprom
    }

    /// Write one byte. Addresses past the end land on the last cell.
    pub fn write_byte(&mut self, addr: u16, value: u8) {
        while self.eeprom.is_busy() {
            core::hint::spin_loop();
        }
        let last = self.capacity.saturating_sub(1);
        self.eeprom.start_write(addr.min(last), value);
    }

    /// Write `data` starting at `start`, one clamped byte at a time.
    pub fn write_block(&mut self, start: u16, data: &[u8]) {
        for (i, &value) in data.iter().enumerate() {
            let addr = start.saturating_add(i as u16);
            self.write_byte(addr, value);
        }
    }
}

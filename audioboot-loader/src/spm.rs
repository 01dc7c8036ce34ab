// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Self-programming of the ATtiny85 flash through SPM.

use core::arch::asm;

use audioboot_common::MemoryImage;
use avr_device::attiny85::BOOT_LOAD;

// SPMCSR sits at I/O address 0x37; SPM must follow the `out` within four cycles.
const SPMEN: u8 = 0x01;
const PGERS: u8 = 0x02;
const PGWRT: u8 = 0x04;
const CTPB: u8 = 0x10;

pub struct SpmFlash;

fn wait_idle() {
    let boot_load = unsafe { &*BOOT_LOAD::ptr() };
    while boot_load.spmcsr.read().bits() & SPMEN != 0 {}
}

/// Issue an SPM command on the page containing `addr`.
fn spm(addr: u16, command: u8) {
    unsafe {
        asm!(
            "out 0x37, {cmd}",
            "spm",
            cmd = in(reg) command,
            in("Z") addr,
        );
    }
    wait_idle();
}

impl MemoryImage for SpmFlash {
    fn erase_page(&mut self, page_addr: u32) {
        spm(page_addr as u16, PGERS | SPMEN);
    }

    fn write_word(&mut self, addr: u32, word: u16) {
        unsafe {
            asm!(
                "movw r0, {word}",
                "out 0x37, {cmd}",
                "spm",
                "clr r1",
                word = in(reg_pair) word,
                cmd = in(reg) SPMEN,
                in("Z") addr as u16,
            );
        }
        wait_idle();
    }

    fn commit_page(&mut self, page_addr: u32) {
        spm(page_addr as u16, PGWRT | SPMEN);
    }

    fn read_word(&self, addr: u32) -> u16 {
        let low: u8;
        let high: u8;
        unsafe {
            asm!(
                "lpm {low}, Z+",
                "lpm {high}, Z",
                low = out(reg) low,
                high = out(reg) high,
                inout("Z") addr as u16 => _,
            );
        }
        u16::from_le_bytes([low, high])
    }

    fn enable_reads(&mut self) {
        // no RWW section on the ATtiny; clear the page buffer instead
        spm(0, CTPB | SPMEN);
    }
}

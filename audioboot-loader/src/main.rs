// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Audio bootloader for the ATtiny85.
//!
//! Reset lands here through the RJMP at address 0. The loader either starts
//! the installed application or, while the request pin is held, receives
//! page frames from the audio input and programs them.

#![no_std]
#![no_main]
#![feature(asm_experimental_arch)]

mod board;
mod spm;

use panic_halt as _;

use audioboot_common::boot_fsm::DEFAULT_DWELL_THRESHOLD;
use audioboot_common::memory::redirect_word;
use audioboot_common::{
    frame_size, BootConfig, BootOutcome, Bootloader, DecoderConfig, EepromWriter,
    FlashProgrammer, Frame, MemoryLayout, SignalDecoder,
};

const LAYOUT: MemoryLayout = MemoryLayout::ATTINY85;
const FRAME: usize = frame_size(LAYOUT.page_size as usize);

// Everything `Bootloader::new` checks, settled at compile time.
const _: () = assert!(LAYOUT.validate().is_ok(), "unusable memory layout");
const _: () = assert!(Frame::<FRAME>::PAGE_SIZE == LAYOUT.page_size as usize);

/// Word 0 of flash as shipped: jump into the loader.
#[unsafe(link_section = ".bootreset")]
#[used]
pub static RESET_VECTOR: u16 = redirect_word(&LAYOUT);

#[avr_device::entry]
fn main() -> ! {
    let board = board::init();

    let decoder = SignalDecoder::new(board.audio, board.timer, DecoderConfig::default());
    let flash = FlashProgrammer::new(spm::SpmFlash, LAYOUT);
    let eeprom = EepromWriter::new(board.eeprom, LAYOUT.eeprom_size);
    let config = BootConfig {
        dwell_threshold: DEFAULT_DWELL_THRESHOLD,
        request_polarity: board::REQUEST_POLARITY,
    };

    let Ok(mut loader) = Bootloader::<_, _, _, _, _, FRAME>::new(
        decoder,
        flash,
        eeprom,
        board.request,
        board.led,
        config,
    ) else {
        unreachable!();
    };

    match loader.run() {
        BootOutcome::Application(entry) => board::start_application(entry),
        BootOutcome::FrameError(_) => {
            let (decoder, _, _, _, mut led) = loader.into_parts();
            let (_, mut timer) = decoder.into_parts();
            loop {
                audioboot_common::blink(&mut led, &mut timer, 1, 50);
            }
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash programming, boot-vector redirection and entry slot persistence.

use audioboot_common::config::MemoryLayout;
use audioboot_common::eeprom::EepromWriter;
use audioboot_common::flash::FlashProgrammer;
use audioboot_common::memory::{
    decode_rjmp, encode_rjmp, redirect_word, resolve_reset_target, AppEntry, MemoryImage,
};
use audioboot_common::sim::{SimEeprom, SimFlash};

const LAYOUT: MemoryLayout = MemoryLayout::ATTINY85;

fn programmer() -> FlashProgrammer<SimFlash> {
    FlashProgrammer::new(SimFlash::new(&LAYOUT), LAYOUT)
}

/// Page 0 of an application whose reset vector jumps to `entry_word`.
fn app_page0(entry_word: u16) -> Vec<u8> {
    let mut page: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(3)).collect();
    page[..2].copy_from_slice(&encode_rjmp(entry_word).to_le_bytes());
    page
}

// =============================================================================
// program_page
// =============================================================================

#[test]
fn test_program_page_writes_payload() {
    let mut flash = programmer();
    let payload: Vec<u8> = (0..64u8).collect();

    assert_eq!(flash.program_page(0x40, &payload), None);
    assert_eq!(flash.memory().page(0x40), &payload[..]);
    assert_eq!(flash.memory().erased_pages(), &[0x40]);
    assert_eq!(flash.memory().committed_pages(), &[0x40]);
}

#[test]
fn test_program_page_clears_previous_contents() {
    let mut flash = programmer();
    flash.program_page(0x80, &[0x00; 64]);
    flash.program_page(0x80, &[0xA5; 64]);
    assert!(flash.memory().page(0x80).iter().all(|&b| b == 0xA5));
}

#[test]
fn test_program_page_is_idempotent() {
    let mut once = programmer();
    let mut twice = programmer();
    let page = app_page0(0x0034);

    once.program_page(0, &page);
    twice.program_page(0, &page);
    twice.program_page(0, &page);

    assert_eq!(once.memory().bytes(), twice.memory().bytes());
}

#[test]
fn test_page_zero_vector_is_redirected_and_captured() {
    let mut flash = programmer();
    let page = app_page0(0x0034);

    let entry = flash.program_page(0, &page);

    assert_eq!(entry.map(AppEntry::word_address), Some(0x0034));
    assert_eq!(flash.memory().read_word(0), redirect_word(&LAYOUT));
    assert_eq!(flash.memory().read_word(0), 0xCBFF);
    // the rest of the page is untouched
    assert_eq!(&flash.memory().page(0)[2..], &page[2..]);
}

#[test]
fn test_page_zero_without_rjmp_is_still_redirected() {
    let mut flash = programmer();
    let mut page = app_page0(0x0034);
    page[..2].copy_from_slice(&0x940Cu16.to_le_bytes());

    assert_eq!(flash.program_page(0, &page), None);
    assert_eq!(flash.memory().read_word(0), 0xCBFF);
}

#[test]
fn test_vector_only_patched_on_page_zero() {
    let mut flash = programmer();
    let page = app_page0(0x0034);

    assert_eq!(flash.program_page(0x40, &page), None);
    assert_eq!(flash.memory().page(0x40), &page[..]);
}

// =============================================================================
// merge_write_block and the entry slot
// =============================================================================

#[test]
fn test_merge_write_keeps_rest_of_page() {
    let mut flash = programmer();
    let before: Vec<u8> = (0..64u8).map(|i| 0x80 | i).collect();
    flash.program_page(0x17C0, &before);

    flash.merge_write_block(0x17D0, &[0x11, 0x22, 0x33, 0x44]);

    let page = flash.memory().page(0x17C0);
    assert_eq!(&page[..0x10], &before[..0x10]);
    assert_eq!(&page[0x10..0x14], &[0x11, 0x22, 0x33, 0x44]);
    assert_eq!(&page[0x14..], &before[0x14..]);
}

#[test]
fn test_merge_write_odd_length_keeps_trailing_byte() {
    let mut flash = programmer();
    let before = [0x5Au8; 64];
    flash.program_page(0x17C0, &before);

    flash.merge_write_block(0x17C0, &[0x01, 0x02, 0x03]);

    let page = flash.memory().page(0x17C0);
    assert_eq!(&page[..4], &[0x01, 0x02, 0x03, 0x5A]);
    assert!(page[4..].iter().all(|&b| b == 0x5A));
}

#[test]
fn test_store_entry_pointer_writes_slot() {
    let mut flash = programmer();
    let entry = AppEntry::new(0x0034, &LAYOUT).unwrap();

    flash.store_entry_pointer(entry);

    let slot = LAYOUT.slot_address() as usize;
    assert_eq!(&flash.memory().bytes()[slot..slot + 2], &[0x34, 0x00]);
    assert_eq!(flash.read_entry_pointer(), Some(entry));
}

#[test]
fn test_store_entry_pointer_preserves_application_tail() {
    let mut flash = programmer();
    let tail: Vec<u8> = (0..64u8).collect();
    flash.program_page(0x17C0, &tail);

    flash.store_entry_pointer(AppEntry::new(0x0100, &LAYOUT).unwrap());

    let page = flash.memory().page(0x17C0);
    assert_eq!(&page[..62], &tail[..62]);
    assert_eq!(&page[62..], &[0x00, 0x01]);
}

#[test]
fn test_erased_slot_has_no_entry() {
    let flash = programmer();
    assert_eq!(flash.read_entry_pointer(), None);
}

#[test]
fn test_slot_pointing_into_loader_is_rejected() {
    let mut memory = SimFlash::new(&LAYOUT);
    memory.load(LAYOUT.slot_address(), &LAYOUT.bootloader_word().to_le_bytes());
    let flash = FlashProgrammer::new(memory, LAYOUT);
    assert_eq!(flash.read_entry_pointer(), None);
}

// =============================================================================
// Reset vector round trip
// =============================================================================

#[test]
fn test_reset_resolves_to_original_entry_after_programming() {
    let mut flash = programmer();
    let page = app_page0(0x0034);

    let entry = flash.program_page(0, &page).unwrap();
    flash.store_entry_pointer(entry);

    assert_eq!(decode_rjmp(flash.memory().read_word(0)), Some(LAYOUT.bootloader_word()));
    assert_eq!(resolve_reset_target(flash.memory(), &LAYOUT), Some(0x0034));
}

#[test]
fn test_reset_target_without_loader_redirect() {
    let mut memory = SimFlash::new(&LAYOUT);
    memory.load(0, &encode_rjmp(0x0020).to_le_bytes());
    assert_eq!(resolve_reset_target(&memory, &LAYOUT), Some(0x0020));
}

#[test]
fn test_reset_target_of_blank_device() {
    let memory = SimFlash::new(&LAYOUT);
    assert_eq!(resolve_reset_target(&memory, &LAYOUT), None);
}

#[test]
fn test_reset_target_with_redirect_but_empty_slot() {
    let mut memory = SimFlash::new(&LAYOUT);
    memory.load(0, &redirect_word(&LAYOUT).to_le_bytes());
    assert_eq!(resolve_reset_target(&memory, &LAYOUT), None);
}

// =============================================================================
// EepromWriter
// =============================================================================

#[test]
fn test_eeprom_block_waits_for_each_write() {
    let mut eeprom = EepromWriter::new(SimEeprom::new(512).with_busy_polls(5), 512);
    eeprom.write_block(0x10, &[1, 2, 3]);

    let sim = eeprom.into_inner();
    assert_eq!(sim.writes(), &[(0x10, 1), (0x11, 2), (0x12, 3)]);
    assert_eq!(&sim.cells()[0x10..0x13], &[1, 2, 3]);
}

#[test]
fn test_eeprom_addresses_clamp_to_last_cell() {
    let mut eeprom = EepromWriter::new(SimEeprom::new(512), 512);
    eeprom.write_block(510, &[0xA, 0xB, 0xC, 0xD]);

    let sim = eeprom.into_inner();
    assert_eq!(sim.writes(), &[(510, 0xA), (511, 0xB), (511, 0xC), (511, 0xD)]);
    assert_eq!(sim.cells()[511], 0xD);
}

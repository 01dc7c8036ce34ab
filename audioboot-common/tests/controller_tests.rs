// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! End-to-end loader sessions on simulated hardware.

use audioboot_common::config::{
    BootConfig, DecoderConfig, LayoutError, MemoryLayout, RequestPolarity,
};
use audioboot_common::controller::{BootOutcome, Bootloader};
use audioboot_common::decoder::{FrameSource, ReceiveError, SignalDecoder};
use audioboot_common::eeprom::EepromWriter;
use audioboot_common::flash::FlashProgrammer;
use audioboot_common::linecode::LineEncoder;
use audioboot_common::memory::{encode_rjmp, resolve_reset_target, AppEntry, MemoryImage};
use audioboot_common::protocol::{frame_size, Command, Frame};
use audioboot_common::sim::{
    FrameQueue, RecordingLed, ScriptedPin, SimClock, SimEeprom, SimFlash, SimLine, SimTimer,
};
use audioboot_common::BootState;

const LAYOUT: MemoryLayout = MemoryLayout::ATTINY85;
const FRAME: usize = frame_size(64);

type Loader<S> = Bootloader<S, SimFlash, SimEeprom, ScriptedPin, RecordingLed, FRAME>;

fn config(threshold: u32) -> BootConfig {
    BootConfig {
        dwell_threshold: threshold,
        request_polarity: RequestPolarity::ActiveLow,
    }
}

fn loader_with<S: FrameSource>(source: S, flash: SimFlash, request: ScriptedPin) -> Loader<S> {
    Bootloader::new(
        source,
        FlashProgrammer::new(flash, LAYOUT),
        EepromWriter::new(SimEeprom::new(LAYOUT.eeprom_size), LAYOUT.eeprom_size),
        request,
        RecordingLed::new(),
        config(10),
    )
    .unwrap()
}

/// Loader whose boot button is held down for the whole dwell.
fn held_loader(frames: &[Frame<FRAME>]) -> Loader<FrameQueue> {
    let queue = frames.iter().map(|f| f.as_bytes().to_vec()).collect();
    loader_with(queue, SimFlash::new(&LAYOUT), ScriptedPin::constant(false))
}

fn program(page: u16, payload: &[u8]) -> Frame<FRAME> {
    Frame::build(Command::Program, page, payload.len() as u16, 0, payload)
}

fn run() -> Frame<FRAME> {
    Frame::build(Command::Run, 0, 0, 0, &[])
}

/// A small application: reset vector to `entry_word`, then filler code.
fn application(entry_word: u16, len: usize) -> Vec<u8> {
    let mut image: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    image[..2].copy_from_slice(&encode_rjmp(entry_word).to_le_bytes());
    image
}

fn image_frames(image: &[u8]) -> Vec<Frame<FRAME>> {
    image
        .chunks(64)
        .enumerate()
        .map(|(i, chunk)| program(i as u16, chunk))
        .chain([run()])
        .collect()
}

// =============================================================================
// Construction
// =============================================================================

#[test]
fn test_new_rejects_mismatched_frame_size() {
    let result = Bootloader::<_, _, _, _, _, { frame_size(128) }>::new(
        FrameQueue::new(),
        FlashProgrammer::new(SimFlash::new(&LAYOUT), LAYOUT),
        EepromWriter::new(SimEeprom::new(512), 512),
        ScriptedPin::constant(false),
        RecordingLed::new(),
        config(10),
    );
    assert!(matches!(
        result,
        Err(LayoutError::FrameMismatch {
            payload: 128,
            page: 64
        })
    ));
}

// =============================================================================
// Entry decision
// =============================================================================

#[test]
fn test_released_button_starts_installed_application() {
    let mut flash = SimFlash::new(&LAYOUT);
    flash.load(LAYOUT.slot_address(), &[0x34, 0x00]);
    let mut loader = loader_with(FrameQueue::new(), flash, ScriptedPin::constant(true));

    let outcome = loader.run();

    assert_eq!(outcome, BootOutcome::Application(AppEntry::new(0x34, &LAYOUT).unwrap()));
    assert_eq!(loader.state(), BootState::ExitToApplication);
}

#[test]
fn test_released_button_without_application_stays_in_loader() {
    let frames = image_frames(&application(0x0034, 128));
    let queue: FrameQueue = frames.iter().map(|f| f.as_bytes().to_vec()).collect();
    let mut loader = loader_with(queue, SimFlash::new(&LAYOUT), ScriptedPin::constant(true));

    let outcome = loader.run();

    assert_eq!(outcome, BootOutcome::Application(AppEntry::new(0x34, &LAYOUT).unwrap()));
}

#[test]
fn test_led_lit_while_button_held() {
    let request = ScriptedPin::new([false, false, false], true);
    let mut loader = loader_with(FrameQueue::new(), SimFlash::new(&LAYOUT), request);

    loader.decide_entry();

    let (_, _, _, request, led) = loader.into_parts();
    assert_eq!(request.reads(), 4);
    assert_eq!(led.history(), &[true, true, true, false]);
}

#[test]
fn test_dwell_threshold_boundary() {
    let request = ScriptedPin::new([false; 10], true);
    let mut loader = loader_with(FrameQueue::new(), SimFlash::new(&LAYOUT), request);
    assert_eq!(loader.decide_entry(), audioboot_common::EntryDecision::EnterCommandLoop);
    assert_eq!(loader.state(), BootState::CommandLoop);

    let request = ScriptedPin::new([false; 9], true);
    let mut loader = loader_with(FrameQueue::new(), SimFlash::new(&LAYOUT), request);
    assert_eq!(loader.decide_entry(), audioboot_common::EntryDecision::RunApplication);
}

#[test]
fn test_active_high_request() {
    let mut loader = Loader::<FrameQueue>::new(
        FrameQueue::new(),
        FlashProgrammer::new(SimFlash::new(&LAYOUT), LAYOUT),
        EepromWriter::new(SimEeprom::new(512), 512),
        ScriptedPin::constant(true),
        RecordingLed::new(),
        BootConfig {
            dwell_threshold: 5,
            request_polarity: RequestPolarity::ActiveHigh,
        },
    )
    .unwrap();
    assert_eq!(loader.decide_entry(), audioboot_common::EntryDecision::EnterCommandLoop);
}

// =============================================================================
// Command loop
// =============================================================================

#[test]
fn test_full_session_programs_image_and_runs_it() {
    let image = application(0x0034, 300);
    let mut loader = held_loader(&image_frames(&image));

    let outcome = loader.run();

    let entry = AppEntry::new(0x0034, &LAYOUT).unwrap();
    assert_eq!(outcome, BootOutcome::Application(entry));
    let flash = loader.flash().memory();
    assert_eq!(flash.read_word(0), 0xCBFF);
    assert_eq!(&flash.bytes()[2..300], &image[2..]);
    assert_eq!(resolve_reset_target(flash, &LAYOUT), Some(0x0034));
    assert_eq!(loader.session_entry(), Some(entry));
}

#[test]
fn test_led_toggles_per_programmed_page() {
    let image = application(0x0034, 64 * 3);
    let mut loader = held_loader(&image_frames(&image));
    loader.run();

    let (_, _, _, _, led) = loader.into_parts();
    // dwell lights it, entry switches it off, then one toggle per page
    let toggles = &led.history()[led.history().len() - 3..];
    assert_eq!(toggles, &[true, false, true]);
}

#[test]
fn test_run_without_programming_uses_persisted_entry() {
    let mut flash = SimFlash::new(&LAYOUT);
    flash.load(LAYOUT.slot_address(), &[0x20, 0x00]);
    let queue: FrameQueue = [run().as_bytes().to_vec()].into_iter().collect();
    let mut loader = loader_with(queue, flash, ScriptedPin::constant(false));

    let outcome = loader.run();

    assert_eq!(outcome, BootOutcome::Application(AppEntry::new(0x20, &LAYOUT).unwrap()));
    // slot page was not rewritten
    assert!(loader.flash().memory().committed_pages().is_empty());
}

#[test]
fn test_resent_page_zero_without_jump_drops_captured_entry() {
    let mut foreign = vec![0u8; 64];
    foreign[..4].copy_from_slice(&[0x0C, 0x94, 0x34, 0x00]); // jmp, not rjmp
    let mut loader = held_loader(&[
        program(0, &application(0x0034, 64)),
        program(0, &foreign),
        run(),
    ]);

    let outcome = loader.run();

    // no usable entry is left, so the loader keeps listening until the line goes idle
    assert_eq!(outcome, BootOutcome::FrameError(ReceiveError::Idle));
    assert_eq!(loader.session_entry(), None);
    let flash = loader.flash().memory();
    assert_eq!(flash.read_word(0), 0xCBFF);
    assert_eq!(flash.read_word(LAYOUT.slot_address()), 0xFFFF);
    assert_eq!(resolve_reset_target(flash, &LAYOUT), None);
}

#[test]
fn test_run_without_any_application_keeps_listening() {
    let mut loader = held_loader(&[run()]);

    let outcome = loader.run();

    assert_eq!(outcome, BootOutcome::FrameError(ReceiveError::Idle));
    assert_eq!(loader.state(), BootState::FrameError);
}

#[test]
fn test_protected_page_is_refused() {
    let protected = LAYOUT.app_page_count() as u16;
    let mut loader = held_loader(&[program(protected, &[0u8; 64]), program(0x7F, &[0u8; 64])]);

    loader.decide_entry();
    assert_eq!(loader.step(), None);
    assert_eq!(loader.step(), None);

    let flash = loader.flash().memory();
    assert!(flash.erased_pages().is_empty());
    assert!(flash.bytes()[LAYOUT.bootloader_start as usize..].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_reserved_commands_do_nothing() {
    let frames = [
        Frame::build(Command::Test, 0, 0, 0, &[0u8; 64]),
        Frame::build(Command::Exit, 0, 0, 0, &[0u8; 64]),
        Frame::build(Command::None, 0, 0, 0, &[0u8; 64]),
    ];
    let mut loader = held_loader(&frames);
    loader.decide_entry();

    for _ in 0..frames.len() {
        assert_eq!(loader.step(), None);
        assert_eq!(loader.state(), BootState::CommandLoop);
    }
    assert!(loader.flash().memory().erased_pages().is_empty());
}

#[test]
fn test_unknown_command_is_ignored() {
    let mut loader = held_loader(&[]);
    let mut frame = program(1, &[0u8; 64]);
    frame.as_bytes_mut()[0] = 0x77;
    loader.load_frame(&frame);

    assert_eq!(loader.dispatch(), None);
    assert!(loader.flash().memory().erased_pages().is_empty());
}

#[test]
fn test_command_is_cleared_after_dispatch() {
    let mut loader = held_loader(&[]);
    loader.load_frame(&program(1, &[0x12; 64]));

    loader.dispatch();
    assert_eq!(loader.frame().command(), Some(Command::None));
    loader.dispatch();

    assert_eq!(loader.flash().memory().erased_pages(), &[0x40]);
}

#[test]
fn test_eeprom_frame_writes_clamped_length_and_exits() {
    let mut flash = SimFlash::new(&LAYOUT);
    flash.load(LAYOUT.slot_address(), &[0x34, 0x00]);
    let payload: Vec<u8> = (1..=64).collect();
    let frame: Frame<FRAME> = Frame::build(Command::Eeprom, 2, 200, 0, &payload);
    let queue: FrameQueue = [frame.as_bytes().to_vec()].into_iter().collect();
    let mut loader = loader_with(queue, flash, ScriptedPin::constant(false));

    let outcome = loader.run();

    assert_eq!(outcome, BootOutcome::Application(AppEntry::new(0x34, &LAYOUT).unwrap()));
    let (_, _, eeprom, _, led) = loader.into_parts();
    let cells = eeprom.into_inner();
    assert_eq!(cells.writes().len(), 64);
    assert_eq!(&cells.cells()[128..192], &payload[..]);
    assert!(!led.is_lit());
}

#[test]
fn test_eeprom_frame_honours_short_length() {
    let mut loader = held_loader(&[]);
    loader.load_frame(&Frame::build(Command::Eeprom, 0, 3, 0, &[9, 8, 7, 6, 5]));

    loader.dispatch();

    let (_, _, eeprom, _, _) = loader.into_parts();
    assert_eq!(eeprom.into_inner().writes(), &[(0, 9), (1, 8), (2, 7)]);
}

#[test]
fn test_reception_error_ends_session() {
    let mut loader = held_loader(&[]);
    assert_eq!(loader.run(), BootOutcome::FrameError(ReceiveError::Idle));
    assert_eq!(loader.state(), BootState::FrameError);
}

// =============================================================================
// Audio path
// =============================================================================

#[test]
fn test_session_over_decoded_audio() {
    let image = application(0x0010, 150);
    let frames = image_frames(&image);
    let wave = LineEncoder::new(40).encode_frames(frames.iter().map(Frame::as_bytes));

    let clock = SimClock::new();
    let decoder = SignalDecoder::new(
        SimLine::new(wave, clock.clone()),
        SimTimer::new(clock),
        DecoderConfig {
            idle_timeout_ticks: Some(50_000),
            ..DecoderConfig::default()
        },
    );
    let mut loader = loader_with(decoder, SimFlash::new(&LAYOUT), ScriptedPin::constant(false));

    let outcome = loader.run();

    assert_eq!(outcome, BootOutcome::Application(AppEntry::new(0x10, &LAYOUT).unwrap()));
    let flash = loader.flash().memory();
    assert_eq!(&flash.bytes()[2..150], &image[2..]);
    assert_eq!(resolve_reset_target(flash, &LAYOUT), Some(0x0010));
}

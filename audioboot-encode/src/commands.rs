// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations: frame building, rendering and verification.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_16_XMODEM};
use indicatif::{ProgressBar, ProgressStyle};

use audioboot_common::config::{BootConfig, DecoderConfig, RequestPolarity};
use audioboot_common::linecode::{LineEncoder, Waveform};
use audioboot_common::memory::{decode_rjmp, redirect_word, resolve_reset_target, AppEntry};
use audioboot_common::protocol::{self, frame_size, Command};
use audioboot_common::sim::{
    RecordingLed, ScriptedPin, SimClock, SimEeprom, SimFlash, SimLine, SimTimer,
};
use audioboot_common::{
    BootOutcome, Bootloader, EepromWriter, FlashProgrammer, MemoryImage, MemoryLayout,
    SignalDecoder,
};

use crate::cli::{DeviceArgs, SignalArgs};
use crate::image;
use crate::wav;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Simulator ticks per audio sample when replaying a signal.
const VERIFY_OVERSAMPLE: u64 = 16;

const WRITE_CHUNK: usize = 4096;

/// Print the memory layout of the selected device.
pub fn info(device: &DeviceArgs) -> Result<()> {
    let (name, layout) = device.layout()?;

    println!("Device:            {}", name);
    println!("  Flash:           {} bytes", layout.flash_size);
    println!("  Page size:       {} bytes", layout.page_size);
    println!(
        "  Application:     0x0000..0x{:04x} ({} pages)",
        layout.bootloader_start,
        layout.app_page_count()
    );
    println!(
        "  Loader:          0x{:04x}..0x{:04x}",
        layout.bootloader_start, layout.flash_size
    );
    println!("  Entry slot:      0x{:04x}", layout.slot_address());
    println!("  Reset vector:    0x{:04x}", redirect_word(&layout));
    println!("  EEPROM:          {} bytes", layout.eeprom_size);
    println!("  Frame size:      {} bytes", frame_size(layout.page_size as usize));

    Ok(())
}

/// Encode a firmware image as PROG frames plus RUN and render it.
pub fn flash(file: &Path, output: &Path, device: &DeviceArgs, signal: &SignalArgs) -> Result<()> {
    signal.check()?;
    let (name, layout) = device.layout()?;
    let image = image::read_image(file)?;
    let frames = program_frames(&image, &layout)?;

    println!("Firmware: {} ({} bytes)", file.display(), image.len());
    println!("Target:   {} ({} pages)", name, frames.len() - 1);

    render(&frames, output, signal)
}

/// Encode a data file as one EEPROM frame and render it.
pub fn eeprom(
    file: &Path,
    page: u16,
    output: &Path,
    device: &DeviceArgs,
    signal: &SignalArgs,
) -> Result<()> {
    signal.check()?;
    let (name, layout) = device.layout()?;
    let data = image::read_image(file)?;
    let frame = eeprom_frame(&data, page, &layout)?;

    println!("Data:     {} ({} bytes)", file.display(), data.len());
    println!(
        "Target:   {} EEPROM at 0x{:04x}",
        name,
        page as u32 * layout.page_size as u32
    );

    render(&[frame], output, signal)
}

/// Decode a rendered signal with the simulated loader and check it installs
/// `file` correctly.
pub fn verify(signal: &Path, file: &Path, raw: bool, device: &DeviceArgs) -> Result<()> {
    let (_, layout) = device.layout()?;
    let image = image::read_image(file)?;
    let entry = image_entry(&image, &layout)?;

    let bytes = fs::read(signal).with_context(|| format!("Failed to read {}", signal.display()))?;
    let samples = if raw {
        bytes
    } else {
        wav::read_wav(&bytes)
            .with_context(|| format!("Invalid WAV file {}", signal.display()))?
            .samples
    };
    println!("Signal:   {} ({} samples)", signal.display(), samples.len());

    let wave = wav::waveform_from_samples(&samples).scaled(VERIFY_OVERSAMPLE);
    let (outcome, flash) = simulate(wave, &layout)?;

    match outcome {
        BootOutcome::Application(reached) if reached == entry => {}
        BootOutcome::Application(reached) => bail!(
            "Loader would start 0x{:04x}, image expects 0x{:04x}",
            reached.byte_address(),
            entry.byte_address()
        ),
        BootOutcome::FrameError(err) => bail!("Signal did not decode: {}", err),
    }

    compare_flash(&flash, &image, &layout)?;
    if resolve_reset_target(&flash, &layout) != Some(entry.word_address()) {
        bail!("Reset would not reach the application entry");
    }

    println!("Verified: {} bytes, entry 0x{:04x}", image.len(), entry.byte_address());
    Ok(())
}

// --- Frames ---

/// PROG frames for every page of `image`, then a RUN frame.
pub fn program_frames(image: &[u8], layout: &MemoryLayout) -> Result<Vec<Vec<u8>>> {
    if image.len() > layout.bootloader_start as usize {
        bail!(
            "Image of {} bytes reaches into the loader at 0x{:04x}",
            image.len(),
            layout.bootloader_start
        );
    }
    image_entry(image, layout)?;

    let page_size = layout.page_size as usize;
    let mut frames: Vec<Vec<u8>> = image
        .chunks(page_size)
        .enumerate()
        .map(|(i, chunk)| build_frame(Command::Program, i as u16, chunk, page_size))
        .collect();
    frames.push(build_frame(Command::Run, 0, &[], page_size));

    log::info!("{} frames of {} bytes", frames.len(), frame_size(page_size));
    Ok(frames)
}

/// A single EEPROM frame writing `data` at `page * page_size`.
pub fn eeprom_frame(data: &[u8], page: u16, layout: &MemoryLayout) -> Result<Vec<u8>> {
    let page_size = layout.page_size as usize;
    if data.len() > page_size {
        bail!(
            "EEPROM data of {} bytes does not fit one {}-byte frame",
            data.len(),
            page_size
        );
    }
    let start = page as usize * page_size;
    if start + data.len() > layout.eeprom_size as usize {
        bail!(
            "EEPROM write at 0x{:04x} of {} bytes exceeds the {}-byte EEPROM",
            start,
            data.len(),
            layout.eeprom_size
        );
    }
    Ok(build_frame(Command::Eeprom, page, data, page_size))
}

fn build_frame(command: Command, page_index: u16, payload: &[u8], page_size: usize) -> Vec<u8> {
    let mut frame = vec![0u8; frame_size(page_size)];
    protocol::encode_frame_into(&mut frame, command, page_index, payload.len() as u16, 0, payload);
    let checksum = CRC16.checksum(&frame[protocol::DATA_START..]);
    let [low, high] = checksum.to_le_bytes();
    frame[protocol::CHECKSUM_LOW] = low;
    frame[protocol::CHECKSUM_HIGH] = high;
    frame
}

/// Entry point encoded by the image's reset vector.
fn image_entry(image: &[u8], layout: &MemoryLayout) -> Result<AppEntry> {
    let Some(&[low, high]) = image.first_chunk::<2>() else {
        bail!("Image is shorter than its reset vector");
    };
    let vector = u16::from_le_bytes([low, high]);
    let Some(target) = decode_rjmp(vector) else {
        bail!("Reset vector 0x{:04x} is not an rjmp", vector);
    };
    match AppEntry::new(target, layout) {
        Some(entry) => Ok(entry),
        None => bail!(
            "Reset vector jumps to 0x{:04x}, outside the application",
            target as u32 * 2
        ),
    }
}

// --- Rendering ---

fn encoder(signal: &SignalArgs) -> LineEncoder {
    LineEncoder::new(signal.half_bit_samples as u64)
        .with_preamble(signal.preamble_bits)
        .with_gap(signal.gap_bits)
}

fn render(frames: &[Vec<u8>], output: &Path, signal: &SignalArgs) -> Result<()> {
    let wave = encoder(signal).encode_frames(frames.iter().map(Vec::as_slice));
    let samples = wav::render(&wave);
    let data_len = u32::try_from(samples.len()).context("Signal too long for a WAV file")?;

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut out = BufWriter::new(file);
    if !signal.raw {
        wav::write_header(&mut out, signal.sample_rate, data_len)?;
    }

    let pb = ProgressBar::new(samples.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    for chunk in samples.chunks(WRITE_CHUNK) {
        out.write_all(chunk)?;
        pb.inc(chunk.len() as u64);
    }
    out.flush()?;
    pb.finish_and_clear();

    let seconds = samples.len() as f64 / signal.sample_rate as f64;
    let baud = signal.sample_rate as f64 / (2.0 * signal.half_bit_samples as f64);
    println!(
        "Wrote {} ({} frames, {:.1} s at {:.0} bit/s)",
        output.display(),
        frames.len(),
        seconds,
        baud
    );
    Ok(())
}

// --- Verification ---

fn simulate(wave: Waveform, layout: &MemoryLayout) -> Result<(BootOutcome, SimFlash)> {
    match layout.page_size {
        32 => simulate_with::<{ frame_size(32) }>(wave, layout),
        64 => simulate_with::<{ frame_size(64) }>(wave, layout),
        128 => simulate_with::<{ frame_size(128) }>(wave, layout),
        other => bail!("Verification does not support {}-byte pages", other),
    }
}

fn simulate_with<const FRAME: usize>(
    wave: Waveform,
    layout: &MemoryLayout,
) -> Result<(BootOutcome, SimFlash)> {
    let idle = u32::try_from(wave.duration).unwrap_or(u32::MAX).saturating_add(1);
    let clock = SimClock::new();
    let decoder = SignalDecoder::new(
        SimLine::new(wave, clock.clone()),
        SimTimer::new(clock),
        DecoderConfig {
            idle_timeout_ticks: Some(idle),
            ..DecoderConfig::default()
        },
    );

    let mut loader = Bootloader::<_, _, _, _, _, FRAME>::new(
        decoder,
        FlashProgrammer::new(SimFlash::new(layout), *layout),
        EepromWriter::new(SimEeprom::new(layout.eeprom_size), layout.eeprom_size),
        ScriptedPin::constant(false),
        RecordingLed::new(),
        BootConfig {
            dwell_threshold: 1,
            request_polarity: RequestPolarity::ActiveLow,
        },
    )?;
    let outcome = loader.run();
    let (_, flash, _, _, _) = loader.into_parts();
    Ok((outcome, flash.into_inner()))
}

fn compare_flash(flash: &SimFlash, image: &[u8], layout: &MemoryLayout) -> Result<()> {
    if flash.read_word(0) != redirect_word(layout) {
        bail!("Reset vector was not redirected to the loader");
    }
    let installed = &flash.bytes()[..image.len()];
    if let Some(offset) = (2..image.len()).find(|&i| installed[i] != image[i]) {
        bail!(
            "Mismatch at 0x{:04x}: expected 0x{:02x}, got 0x{:02x}",
            offset,
            image[offset],
            installed[offset]
        );
    }
    Ok(())
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware image loading: raw binary or Intel HEX.

use std::path::Path;
use std::str;

use anyhow::{bail, Context, Result};

/// Upper bound on a flattened image: the 16-bit AVR byte address space.
/// Records above it (avr-gcc puts EEPROM data at 0x810000) are not flash.
const MAX_IMAGE_SIZE: usize = 0x1_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    IntelHex,
    Binary,
}

/// Read an image, flattened to a byte array starting at address 0.
pub fn read_image(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let format = guess_format(path, &raw);
    log::info!("Read {} as {:?}", path.display(), format);

    let image = match format {
        ImageFormat::IntelHex => read_ihex(str::from_utf8(&raw)?)
            .with_context(|| format!("Invalid Intel HEX in {}", path.display()))?,
        ImageFormat::Binary => raw,
    };
    if image.is_empty() {
        bail!("{} holds no data", path.display());
    }
    Ok(image)
}

pub fn guess_format(path: &Path, raw: &[u8]) -> ImageFormat {
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if ["hex", "ihex", "ihx", "eep"].contains(&ext.as_str()) {
        return ImageFormat::IntelHex;
    }

    let looks_hex = raw.first() == Some(&b':')
        && raw
            .iter()
            .all(|&c| c.is_ascii_hexdigit() || matches!(c, b':' | b'\n' | b'\r'));
    if looks_hex {
        ImageFormat::IntelHex
    } else {
        ImageFormat::Binary
    }
}

/// Flatten Intel HEX records into one image starting at address 0. Holes
/// are filled with `0xFF`, the erased flash value.
pub fn read_ihex(data: &str) -> Result<Vec<u8>> {
    use ihex::Record;

    let mut base_address = 0u32;
    let mut image: Vec<u8> = Vec::new();

    for record in ihex::Reader::new(data) {
        match record? {
            Record::Data { offset, value } => {
                let start = (base_address + offset as u32) as usize;
                let end = start + value.len();
                if end > MAX_IMAGE_SIZE {
                    bail!(
                        "data record at {:#x} is outside program flash",
                        start
                    );
                }
                if image.len() < end {
                    image.resize(end, 0xFF);
                }
                image[start..end].copy_from_slice(&value);
            }
            Record::ExtendedSegmentAddress(address) => base_address = (address as u32) * 16,
            Record::ExtendedLinearAddress(address) => base_address = (address as u32) << 16,
            Record::EndOfFile
            | Record::StartSegmentAddress { .. }
            | Record::StartLinearAddress(_) => {}
        }
    }
    Ok(image)
}

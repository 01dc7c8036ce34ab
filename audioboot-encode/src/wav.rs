// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! 8-bit mono PCM output, bare or in a RIFF/WAVE container.

use std::io::{self, Write};

use anyhow::{bail, Result};

use audioboot_common::linecode::Waveform;

/// Sample value for a high line.
pub const HIGH: u8 = 0xE0;
/// Sample value for a low line.
pub const LOW: u8 = 0x20;
/// Decision level when reading samples back.
const MIDPOINT: u8 = 0x80;

const RIFF_HEADER_LEN: usize = 44;
const FORMAT_PCM: u16 = 1;

/// One sample per waveform tick.
pub fn render(wave: &Waveform) -> Vec<u8> {
    wave.levels().map(|high| if high { HIGH } else { LOW }).collect()
}

/// Rebuild a waveform from samples, one tick per sample.
pub fn waveform_from_samples(samples: &[u8]) -> Waveform {
    let initial_level = samples.first().is_some_and(|&s| s >= MIDPOINT);
    let mut level = initial_level;
    let mut transitions = Vec::new();
    for (t, &s) in samples.iter().enumerate() {
        let high = s >= MIDPOINT;
        if high != level {
            transitions.push(t as u64);
            level = high;
        }
    }
    Waveform {
        initial_level,
        transitions,
        duration: samples.len() as u64,
    }
}

/// Write the 44-byte canonical WAV header for `data_len` bytes of 8-bit mono.
pub fn write_header(out: &mut impl Write, sample_rate: u32, data_len: u32) -> io::Result<()> {
    let mut header = [0u8; RIFF_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(data_len + 36).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
    header[22..24].copy_from_slice(&1u16.to_le_bytes()); // channels
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&sample_rate.to_le_bytes()); // byte rate
    header[32..34].copy_from_slice(&1u16.to_le_bytes()); // block align
    header[34..36].copy_from_slice(&8u16.to_le_bytes()); // bits per sample
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    out.write_all(&header)
}

/// Samples and rate of an 8-bit mono PCM WAV file.
pub struct WavData {
    pub sample_rate: u32,
    pub samples: Vec<u8>,
}

/// Parse a WAV file, walking its chunks for `fmt ` and `data`.
pub fn read_wav(bytes: &[u8]) -> Result<WavData> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        bail!("not a RIFF/WAVE file");
    }

    let mut sample_rate = None;
    let mut rest = &bytes[12..];
    while rest.len() >= 8 {
        let id = &rest[0..4];
        let len = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let body = &rest[8..];
        if body.len() < len {
            bail!("truncated {} chunk", String::from_utf8_lossy(id));
        }
        let body = &body[..len];

        match id {
            b"fmt " => {
                if len < 16 {
                    bail!("short fmt chunk");
                }
                let format = u16::from_le_bytes([body[0], body[1]]);
                let channels = u16::from_le_bytes([body[2], body[3]]);
                let bits = u16::from_le_bytes([body[14], body[15]]);
                if format != FORMAT_PCM || channels != 1 || bits != 8 {
                    bail!(
                        "unsupported WAV format {} with {} channels at {} bits; need 8-bit mono PCM",
                        format,
                        channels,
                        bits
                    );
                }
                sample_rate = Some(u32::from_le_bytes([body[4], body[5], body[6], body[7]]));
            }
            b"data" => {
                let Some(sample_rate) = sample_rate else {
                    bail!("data chunk before fmt chunk");
                };
                return Ok(WavData {
                    sample_rate,
                    samples: body.to_vec(),
                });
            }
            _ => log::debug!("skipping {} chunk", String::from_utf8_lossy(id)),
        }

        // chunks are padded to an even length
        let advance = 8 + len + (len & 1);
        rest = rest.get(advance..).unwrap_or(&[]);
    }
    bail!("no data chunk")
}

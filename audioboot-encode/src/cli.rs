// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::builder::PossibleValuesParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Deserialize;

use audioboot_common::linecode::{DEFAULT_PREAMBLE_BITS, MIN_PREAMBLE_BITS};
use audioboot_common::MemoryLayout;

use crate::commands;

/// Idle cells between frames. At the default rate this covers a page erase
/// and write on the device before the next preamble ends.
pub const DEFAULT_FRAME_GAP_BITS: u32 = 100;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "audioboot-encode")]
#[command(about = "Render firmware images as audio for the audioboot loader")]
pub struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Target device selection.
#[derive(Args)]
pub struct DeviceArgs {
    /// Built-in device layout
    #[arg(
        short,
        long,
        default_value = "attiny85",
        value_parser = PossibleValuesParser::new(MemoryLayout::DEVICE_NAMES)
    )]
    pub device: String,

    /// YAML file describing a custom layout (overrides --device)
    #[arg(long, value_name = "FILE")]
    pub layout: Option<PathBuf>,
}

/// A layout file: the layout fields plus an optional display name.
#[derive(Deserialize)]
struct LayoutFile {
    name: Option<String>,
    #[serde(flatten)]
    layout: MemoryLayout,
}

impl DeviceArgs {
    /// Resolve and validate the selected layout.
    pub fn layout(&self) -> Result<(String, MemoryLayout)> {
        let (name, layout) = match &self.layout {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let file: LayoutFile = serde_yaml::from_str(&text)
                    .with_context(|| format!("Invalid layout file {}", path.display()))?;
                let name = file.name.unwrap_or_else(|| path.display().to_string());
                (name, file.layout)
            }
            None => match MemoryLayout::by_name(&self.device) {
                Some(layout) => (self.device.clone(), layout),
                None => bail!("Unknown device '{}'", self.device),
            },
        };
        layout
            .validate()
            .with_context(|| format!("Unusable layout for {}", name))?;
        Ok((name, layout))
    }
}

/// Line-code and audio rendering options.
#[derive(Args)]
pub struct SignalArgs {
    /// Audio samples per half bit cell
    #[arg(long, default_value_t = 4)]
    pub half_bit_samples: u32,

    /// Output sample rate in Hz
    #[arg(long, default_value_t = 44_100)]
    pub sample_rate: u32,

    /// Zero cells sent before each frame's start bit
    #[arg(long, default_value_t = DEFAULT_PREAMBLE_BITS)]
    pub preamble_bits: u32,

    /// Idle cells between frames
    #[arg(long, default_value_t = DEFAULT_FRAME_GAP_BITS)]
    pub gap_bits: u32,

    /// Write headerless 8-bit PCM instead of WAV
    #[arg(long)]
    pub raw: bool,
}

impl SignalArgs {
    pub fn check(&self) -> Result<()> {
        if self.half_bit_samples == 0 {
            bail!("--half-bit-samples must be at least 1");
        }
        if self.sample_rate == 0 {
            bail!("--sample-rate must be at least 1");
        }
        if self.preamble_bits < MIN_PREAMBLE_BITS {
            bail!(
                "--preamble-bits {} is too short, the loader needs at least {}",
                self.preamble_bits,
                MIN_PREAMBLE_BITS
            );
        }
        Ok(())
    }
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show the memory layout of a device
    Info {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Encode a firmware image as page frames followed by a run frame
    Flash {
        /// Firmware image (.bin or Intel HEX)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        signal: SignalArgs,
    },

    /// Encode data as a single EEPROM frame
    Eeprom {
        /// Data to store (.bin or Intel HEX)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Destination page; the EEPROM address is page * page size
        #[arg(short, long, default_value_t = 0)]
        page: u16,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        signal: SignalArgs,
    },

    /// Decode an audio file with a simulated loader and compare it to an image
    Verify {
        /// Audio file produced by `flash`
        #[arg(value_name = "SIGNAL")]
        signal: PathBuf,

        /// Firmware image the audio should carry
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Treat the signal as headerless 8-bit PCM
        #[arg(long)]
        raw: bool,

        #[command(flatten)]
        device: DeviceArgs,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Info { device } => commands::info(&device),
        Commands::Flash {
            file,
            output,
            device,
            signal,
        } => commands::flash(&file, &output, &device, &signal),
        Commands::Eeprom {
            file,
            page,
            output,
            device,
            signal,
        } => commands::eeprom(&file, page, &output, &device, &signal),
        Commands::Verify {
            signal,
            file,
            raw,
            device,
        } => commands::verify(&signal, &file, raw, &device),
    }
}

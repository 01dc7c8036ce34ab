// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Renders firmware images as audio for the audioboot loader.
//!
//! Usage:
//!   audioboot-encode info --device attiny85
//!   audioboot-encode flash blink.hex -o blink.wav
//!   audioboot-encode eeprom settings.bin --page 2 -o settings.wav
//!   audioboot-encode verify blink.wav blink.hex

mod cli;
mod commands;
mod image;
mod wav;

use anyhow::Result;
use clap::Parser;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    cli::run(args)
}

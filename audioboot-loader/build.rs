// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Places the loader at the top of flash and its reset redirect at address 0.

use audioboot_common::MemoryLayout;

fn main() {
    let layout = MemoryLayout::ATTINY85;

    println!(
        "cargo:rustc-link-arg=-Wl,--section-start=.text={:#x}",
        layout.bootloader_start
    );
    println!("cargo:rustc-link-arg=-Wl,--section-start=.bootreset=0x0");
    println!("cargo:rerun-if-changed=build.rs");
}

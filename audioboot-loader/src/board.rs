// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! ATtiny85 port B pins, Timer0, EEPROM and the application handoff.

use core::arch::asm;
use core::convert::Infallible;

use audioboot_common::{AppEntry, Eeprom, RequestPolarity, TickTimer};
use avr_device::attiny85::{Peripherals, EEPROM, PORTB, TC0};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};

const TOV0: u8 = 1 << 1;
const CS01: u8 = 1 << 1;
const EEPE: u8 = 1 << 1;

/// Timer0 runs at F_CPU / 8: 0.5 us per tick at 16 MHz.
const NS_PER_TICK: u32 = 500;

#[cfg(not(feature = "mmo"))]
mod pins {
    use audioboot_common::RequestPolarity;

    pub const AUDIO: u8 = 3;
    pub const LED: u8 = 1;
    pub const REQUEST: u8 = 0;
    pub const REQUEST_POLARITY: RequestPolarity = RequestPolarity::ActiveLow;
}

#[cfg(feature = "mmo")]
mod pins {
    use audioboot_common::RequestPolarity;

    pub const AUDIO: u8 = 2;
    pub const LED: u8 = 0;
    pub const REQUEST: u8 = 1;
    pub const REQUEST_POLARITY: RequestPolarity = RequestPolarity::ActiveHigh;
}

pub const REQUEST_POLARITY: RequestPolarity = pins::REQUEST_POLARITY;

pub type AudioPin = Input<{ pins::AUDIO }>;
pub type RequestPin = Input<{ pins::REQUEST }>;
pub type LedPin = Output<{ pins::LED }>;

fn port() -> &'static avr_device::attiny85::portb::RegisterBlock {
    unsafe { &*PORTB::ptr() }
}

// --- Pins ---

/// Port B input on bit `BIT`.
pub struct Input<const BIT: u8>;

impl<const BIT: u8> Input<BIT> {
    fn new(pull_up: bool) -> Self {
        let port = port();
        unsafe {
            port.ddrb.modify(|r, w| w.bits(r.bits() & !(1 << BIT)));
            if pull_up {
                port.portb.modify(|r, w| w.bits(r.bits() | 1 << BIT));
            } else {
                port.portb.modify(|r, w| w.bits(r.bits() & !(1 << BIT)));
            }
        }
        Self
    }
}

impl<const BIT: u8> ErrorType for Input<BIT> {
    type Error = Infallible;
}

impl<const BIT: u8> InputPin for Input<BIT> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(port().pinb.read().bits() & (1 << BIT) != 0)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// Port B push-pull output on bit `BIT`, starting low.
pub struct Output<const BIT: u8>;

impl<const BIT: u8> Output<BIT> {
    fn new() -> Self {
        let port = port();
        unsafe {
            port.portb.modify(|r, w| w.bits(r.bits() & !(1 << BIT)));
            port.ddrb.modify(|r, w| w.bits(r.bits() | 1 << BIT));
        }
        Self
    }
}

impl<const BIT: u8> ErrorType for Output<BIT> {
    type Error = Infallible;
}

impl<const BIT: u8> OutputPin for Output<BIT> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        unsafe { port().portb.modify(|r, w| w.bits(r.bits() & !(1 << BIT))) };
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        unsafe { port().portb.modify(|r, w| w.bits(r.bits() | 1 << BIT)) };
        Ok(())
    }
}

impl<const BIT: u8> StatefulOutputPin for Output<BIT> {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(port().portb.read().bits() & (1 << BIT) != 0)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        self.is_set_high().map(|high| !high)
    }

    fn toggle(&mut self) -> Result<(), Self::Error> {
        // writing a one to PINx flips the output latch
        unsafe { port().pinb.write(|w| w.bits(1 << BIT)) };
        Ok(())
    }
}

// --- Timer0 ---

/// Timer0 in normal mode, widened to 16 bits by polling the overflow flag.
pub struct Timer0 {
    tc0: TC0,
    high: u16,
}

impl Timer0 {
    fn new(tc0: TC0) -> Self {
        unsafe {
            tc0.tccr0a.write(|w| w.bits(0));
            tc0.tccr0b.write(|w| w.bits(CS01));
        }
        let mut timer = Self { tc0, high: 0 };
        timer.restart();
        timer
    }

    fn count(&self) -> u8 {
        self.tc0.tcnt0.read().bits()
    }

    fn take_overflow(&mut self) -> bool {
        if self.tc0.tifr.read().bits() & TOV0 == 0 {
            return false;
        }
        // flags clear by writing a one
        unsafe { self.tc0.tifr.write(|w| w.bits(TOV0)) };
        true
    }
}

impl TickTimer for Timer0 {
    fn restart(&mut self) {
        unsafe { self.tc0.tcnt0.write(|w| w.bits(0)) };
        self.take_overflow();
        self.high = 0;
    }

    fn elapsed(&mut self) -> u16 {
        let mut low = self.count();
        if self.take_overflow() {
            self.high = self.high.saturating_add(0x100);
            low = self.count();
        }
        self.high.saturating_add(low as u16)
    }
}

impl DelayNs for Timer0 {
    fn delay_ns(&mut self, ns: u32) {
        let mut remaining = ns / NS_PER_TICK;
        let mut last = self.count();
        while remaining > 0 {
            let now = self.count();
            remaining = remaining.saturating_sub(now.wrapping_sub(last) as u32);
            last = now;
        }
    }
}

// --- EEPROM ---

/// The on-chip EEPROM in atomic erase-and-write mode.
pub struct EepromCells {
    eeprom: EEPROM,
}

impl Eeprom for EepromCells {
    fn is_busy(&self) -> bool {
        self.eeprom.eecr.read().bits() & EEPE != 0
    }

    fn start_write(&mut self, addr: u16, value: u8) {
        unsafe {
            self.eeprom.eecr.write(|w| w.bits(0));
            self.eeprom.eear.write(|w| w.bits(addr));
            self.eeprom.eedr.write(|w| w.bits(value));
            // EEPE must follow EEMPE within four cycles
            asm!("sbi 0x1C, 2", "sbi 0x1C, 1");
        }
    }
}

// --- Bring-up and handoff ---

pub struct Board {
    pub audio: AudioPin,
    pub request: RequestPin,
    pub led: LedPin,
    pub timer: Timer0,
    pub eeprom: EepromCells,
}

pub fn init() -> Board {
    let dp = unsafe { Peripherals::steal() };

    Board {
        audio: Input::new(false),
        request: Input::new(true),
        led: Output::new(),
        timer: Timer0::new(dp.TC0),
        eeprom: EepromCells { eeprom: dp.EEPROM },
    }
}

/// Put the pins and timer back to their reset state with interrupts off.
pub fn reset_registers() {
    avr_device::interrupt::disable();
    unsafe {
        port().ddrb.write(|w| w.bits(0));
        (*TC0::ptr()).tccr0b.write(|w| w.bits(0));
    }
}

/// Jump to the application's entry word.
pub fn start_application(entry: AppEntry) -> ! {
    reset_registers();
    unsafe {
        asm!("ijmp", in("Z") entry.word_address(), options(noreturn));
    }
}

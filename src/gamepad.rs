// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Super Nintendo controller state, and its translation into our HID report.
//!
//! The controller is a pair of shift registers. After a latch pulse it
//! presents one button per clock on its data line, active low, in a fixed
//! order. Sixteen clocks read out twelve buttons and four bits that are
//! always high on a standard pad.

use bitflags::bitflags;

use crate::config::REPORT_SIZE;

bitflags! {
    /// Buttons held, in shift-out order.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct SnesButtons: u16 {
        const B = 1 << 0;
        const Y = 1 << 1;
        const SELECT = 1 << 2;
        const START = 1 << 3;
        const UP = 1 << 4;
        const DOWN = 1 << 5;
        const LEFT = 1 << 6;
        const RIGHT = 1 << 7;
        const A = 1 << 8;
        const X = 1 << 9;
        const L = 1 << 10;
        const R = 1 << 11;
    }
}

impl SnesButtons {
    /// Builds the button word from data line levels in the order they were
    /// clocked out, `true` meaning the line was high. A low line is a held
    /// button. Only the first sixteen samples count.
    ///
    /// Bits past the twelve named buttons are kept, so two words read from
    /// odd hardware still compare unequal when they differ anywhere.
    pub fn from_samples<I>(levels: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let bits = levels
            .into_iter()
            .take(16)
            .enumerate()
            .filter(|&(_, high)| !high)
            .fold(0u16, |acc, (n, _)| acc | 1 << n);
        Self::from_bits_retain(bits)
    }
}

/// The two-byte input report described by our report descriptor.
///
/// Byte 0 has the X axis in bits 1..0 and Y in bits 3..2, each a 2-bit
/// signed value; the upper nibble is padding. Byte 1 is buttons 1 through 6
/// then Start and Select.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GamepadReport([u8; REPORT_SIZE]);

impl GamepadReport {
    pub const fn from_bytes(bytes: [u8; REPORT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Opposing directions held together resolve toward left and up, which
    /// is what falls out of OR-ing their encodings.
    pub fn from_buttons(buttons: SnesButtons) -> Self {
        const AXES: [(SnesButtons, u8); 4] = [
            (SnesButtons::LEFT, 0x03),
            (SnesButtons::RIGHT, 0x01),
            (SnesButtons::DOWN, 0x04),
            (SnesButtons::UP, 0x0C),
        ];
        const KEYS: [(SnesButtons, u8); 8] = [
            (SnesButtons::B, 0x01),
            (SnesButtons::Y, 0x02),
            (SnesButtons::A, 0x04),
            (SnesButtons::X, 0x08),
            (SnesButtons::L, 0x10),
            (SnesButtons::R, 0x20),
            (SnesButtons::START, 0x40),
            (SnesButtons::SELECT, 0x80),
        ];

        let encode = |table: &[(SnesButtons, u8)]| {
            table
                .iter()
                .filter(|(b, _)| buttons.contains(*b))
                .fold(0u8, |acc, (_, bits)| acc | *bits)
        };
        Self([encode(&AXES), encode(&KEYS)])
    }

    /// Horizontal axis, -1 (left) to 1 (right).
    pub fn x(&self) -> i8 {
        sign_extend2(self.0[0])
    }

    /// Vertical axis, -1 (up) to 1 (down).
    pub fn y(&self) -> i8 {
        sign_extend2(self.0[0] >> 2)
    }

    pub fn buttons(&self) -> u8 {
        self.0[1]
    }

    pub fn bytes(&self) -> [u8; REPORT_SIZE] {
        self.0
    }
}

fn sign_extend2(bits: u8) -> i8 {
    ((bits & 0b11) << 6) as i8 >> 6
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compile-time configuration.
//!
//! Identity, packet sizes and timing all live here so the descriptors, the
//! engines and the firmware agree on them.

// USB identity

/// Vendor ID (Microchip's).
pub const USB_VENDOR_ID: u16 = 0x04D8;
/// Product ID.
pub const USB_PRODUCT_ID: u16 = 0x0001;
/// Device release number, BCD.
pub const USB_DEVICE_RELEASE: u16 = 0x0001;

pub const USB_MANUFACTURER: &str = "Christian Ettinger";
pub const USB_PRODUCT: &str = "Super Nintendo Controller";
pub const USB_SERIAL_NUMBER: &str = "0001";

/// US English, the only language we offer strings in.
pub const USB_LANGUAGE_ID: u16 = 0x0409;

/// Bus power draw in units of 2 mA.
pub const USB_MAX_POWER: u8 = 15;

// Endpoints

/// Largest packet a low-speed control endpoint may move.
pub const EP0_MAX_PACKET: usize = 8;

/// Size of every hardware endpoint buffer. Low-speed caps all of them at 8.
pub const EP_BUFFER_SIZE: usize = 8;

/// Bytes in one HID input report.
pub const REPORT_SIZE: usize = 2;

/// Polling interval advertised for the interrupt IN endpoint, in ms.
pub const REPORT_POLL_INTERVAL_MS: u8 = 10;

// Debug trace

/// Capacity of the trace ring, including the slot that is always left free.
pub const TRACE_BUFFER_SIZE: usize = 64;

/// Written over the newest queued byte when the ring overflows.
pub const TRACE_OVERFLOW_MARKER: u8 = b'X';

/// Baud rate of the trace UART.
pub const TRACE_BAUD: u32 = 115_200;

// SNES controller timing

/// Width of the latch pulse that freezes the controller's shift register.
pub const SNES_LATCH_US: u32 = 12;

/// Half period of the shift clock.
pub const SNES_HALF_CLOCK_US: u32 = 6;

/// Bits clocked out of the controller per poll.
pub const SNES_BITS: usize = 16;

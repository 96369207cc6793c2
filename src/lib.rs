// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Low-speed USB HID game pad, protocol side.
//!
//! This crate holds everything needed to make a Super Nintendo controller
//! show up on a USB host as a HID game pad, _except_ the code that pokes at a
//! particular chip. The pieces, from the bottom up:
//!
//! - [`descriptors`]: the static descriptor bytes the host reads during
//!   enumeration, and the lookup from (type, index) to those bytes.
//! - [`bdt`] and [`sie`]: a model of a buffer-descriptor-table style USB
//!   serial interface engine, and the [`sie::Sie`] trait a board implements
//!   to hand us its registers.
//! - [`control`]: the endpoint 0 control transfer state machine.
//! - [`report`]: the endpoint 1 interrupt IN path that carries button state.
//! - [`device`]: the interrupt-time dispatcher tying the two together, and
//!   the critical-section wrapper the foreground loop talks to.
//! - [`gamepad`]: turning sixteen shift-register samples into a HID report.
//! - [`trace`]: a tiny byte ring for single-character debug output.
//!
//! None of this touches hardware directly, so it all runs under `cargo test`
//! on a workstation. The RP2040 firmware in `main.rs` is the only consumer
//! that does.

#![cfg_attr(not(test), no_std)]

// This must go first so the macros are visible in the other modules.
#[macro_use]
mod fmt;

pub mod bdt;
pub mod config;
pub mod control;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod gamepad;
pub mod report;
pub mod sie;
pub mod trace;
pub mod usb;

#[cfg(test)]
pub(crate) mod mock;

pub use device::{SharedDevice, UsbDevice};
pub use error::ControlError;
pub use gamepad::{GamepadReport, SnesButtons};
pub use sie::{BusEvent, Sie};
pub use trace::{Trace, TraceRing};

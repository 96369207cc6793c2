// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Buffer descriptors.
//!
//! The serial interface engine we're written against moves data through a
//! table of buffer descriptors, one per endpoint and direction. Each has a
//! status byte and a byte count; the data itself lives in a fixed buffer
//! that belongs to the descriptor. Whoever holds the `UOWN` bit owns the
//! descriptor and its buffer. When we set it, the hardware is free to run a
//! transaction; when the hardware clears it, the transaction is done and the
//! status byte has been rewritten to report the token PID.

use bitfield::bitfield;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::config;

bitfield! {
    /// Contents of a BDnSTAT byte.
    ///
    /// While we own the descriptor, bits 5..2 hold the PID of the token that
    /// completed; while the hardware owns it, the same bits are the `dts`,
    /// `dtsen` and `bstall` controls.
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct BdStatus(u8);
    impl Debug;
    /// Descriptor (and buffer) owned by the hardware.
    pub uown, set_uown: 7;
    /// Data toggle to use or expect.
    pub dts, set_dts: 6;
    /// Have the hardware check the data toggle on receive.
    pub dtsen, set_dtsen: 3;
    /// Answer the next token on this endpoint with STALL.
    pub bstall, set_bstall: 2;
    pub u8, pid_bits, set_pid_bits: 5, 2;
}

/// Token PIDs as the hardware writes them back into a completed descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pid {
    Out = 0x1,
    In = 0x9,
    Setup = 0xD,
}

impl BdStatus {
    /// Status handed back by the hardware after a transaction with `pid`.
    pub fn completed(pid: Pid) -> Self {
        let mut s = Self(0);
        s.set_pid_bits(pid as u8);
        s
    }

    /// Decodes the PID field. Only meaningful when `uown` is clear.
    pub fn pid(&self) -> Option<Pid> {
        Pid::from_u8(self.pid_bits())
    }

    /// Status for a data packet synchronized on `toggle`.
    pub fn armed(toggle: Toggle) -> Self {
        let mut s = Self(0);
        s.set_uown(true);
        s.set_dtsen(true);
        s.set_dts(toggle == Toggle::Data1);
        s
    }

    /// Status for a descriptor that stalls whatever the host sends.
    pub fn stalled() -> Self {
        let mut s = Self(0);
        s.set_uown(true);
        s.set_bstall(true);
        s
    }

    /// Toggle carried by the `dts` bit.
    pub fn toggle(&self) -> Toggle {
        if self.dts() {
            Toggle::Data1
        } else {
            Toggle::Data0
        }
    }
}

/// Data toggle, the parity bit that alternates on consecutive packets of an
/// endpoint.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Toggle {
    #[default]
    Data0,
    Data1,
}

impl Toggle {
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Toggle::Data0 => Toggle::Data1,
            Toggle::Data1 => Toggle::Data0,
        }
    }
}

/// One entry of the buffer descriptor table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub status: BdStatus,
    /// Bytes to send, room to receive, or (after a receive) bytes received.
    pub count: u8,
}

impl BufferDescriptor {
    /// Hands EP0 OUT to the hardware to catch the next SETUP. No toggle
    /// check: SETUP is always DATA0, and the hardware accepts it regardless.
    pub fn setup() -> Self {
        let mut status = BdStatus(0);
        status.set_uown(true);
        Self {
            status,
            count: config::EP0_MAX_PACKET as u8,
        }
    }

    /// A packet of `count` bytes on `toggle`, either direction.
    pub fn data(count: usize, toggle: Toggle) -> Self {
        Self {
            status: BdStatus::armed(toggle),
            count: clamp_packet(count),
        }
    }

    /// The empty packet of a status stage, always on DATA1.
    pub fn status_stage() -> Self {
        Self::data(0, Toggle::Data1)
    }

    pub fn stall() -> Self {
        Self {
            status: BdStatus::stalled(),
            count: 0,
        }
    }

    /// Owned by the CPU, nothing armed.
    pub fn idle(count: u8) -> Self {
        Self {
            status: BdStatus(0),
            count,
        }
    }

    pub fn owned_by_hardware(&self) -> bool {
        self.status.uown()
    }
}

fn clamp_packet(count: usize) -> u8 {
    count.min(config::EP_BUFFER_SIZE) as u8
}

/// Which descriptor in the table. We only have endpoints 0 and 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bd {
    Ep0Out,
    Ep0In,
    Ep1Out,
    Ep1In,
}

impl Bd {
    /// Position in the table, which is ordered by endpoint then direction.
    pub const fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bits_match_register_layout() {
        assert_eq!(BdStatus::armed(Toggle::Data1).0, 0x80 | 0x40 | 0x08);
        assert_eq!(BdStatus::armed(Toggle::Data0).0, 0x80 | 0x08);
        assert_eq!(BdStatus::stalled().0, 0x84);
        assert_eq!(BufferDescriptor::setup().status.0, 0x80);
        assert_eq!(BufferDescriptor::setup().count, 8);
    }

    #[test]
    fn pid_lives_in_bits_5_to_2() {
        // SETUP shows up as 0x34 once masked with 0x3C.
        assert_eq!(BdStatus::completed(Pid::Setup).0 & 0x3C, 0x34);
        assert_eq!(BdStatus(0x24).pid(), Some(Pid::In));
        assert_eq!(BdStatus(0x04).pid(), Some(Pid::Out));
        assert_eq!(BdStatus(0x00).pid(), None);
    }

    #[test]
    fn toggle_flips_and_reads_back() {
        assert_eq!(Toggle::Data0.flip(), Toggle::Data1);
        assert_eq!(Toggle::Data1.flip().flip(), Toggle::Data1);
        assert_eq!(BdStatus::armed(Toggle::Data1).toggle(), Toggle::Data1);
    }

    #[test]
    fn data_packets_never_exceed_buffer() {
        assert_eq!(BufferDescriptor::data(34, Toggle::Data1).count, 8);
        assert_eq!(BufferDescriptor::data(3, Toggle::Data0).count, 3);
        assert_eq!(BufferDescriptor::status_stage().count, 0);
        assert!(BufferDescriptor::status_stage().status.dts());
    }
}

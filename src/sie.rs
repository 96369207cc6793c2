// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The boundary between the protocol engines and a USB serial interface
//! engine.
//!
//! A board implements [`Sie`] over its registers. The engines only ever see
//! that trait, which is what lets them run against a simulated host in the
//! tests.

use bitfield::bitfield;
use bitflags::bitflags;

use crate::bdt::{Bd, BufferDescriptor};
use crate::config::EP_BUFFER_SIZE;
use crate::usb::Direction;

bitflags! {
    /// Interrupt causes, laid out like the UIR and UIE registers.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Interrupts: u8 {
        const BUS_RESET = 1 << 0;
        const ERROR = 1 << 1;
        /// Bus activity seen while suspended.
        const ACTIVITY = 1 << 2;
        /// A transaction completed; see `Sie::transaction`.
        const TRANSACTION = 1 << 3;
        /// The bus has been idle long enough to suspend.
        const IDLE = 1 << 4;
        const STALL = 1 << 5;
        const START_OF_FRAME = 1 << 6;
    }
}

impl Interrupts {
    /// What we listen to while the bus is awake. Errors are only ever
    /// drained, so they aren't enabled.
    pub const NORMAL: Self = Self::IDLE
        .union(Self::TRANSACTION)
        .union(Self::BUS_RESET);
}

bitfield! {
    /// The USTAT byte: which endpoint and direction the completed
    /// transaction was on.
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct TransactionStatus(u8);
    impl Debug;
    pub u8, endpoint, set_endpoint: 6, 3;
    pub is_in, set_is_in: 2;
}

impl TransactionStatus {
    pub fn new(endpoint: u8, dir: Direction) -> Self {
        let mut s = Self(0);
        s.set_endpoint(endpoint);
        s.set_is_in(dir == Direction::In);
        s
    }

    pub fn direction(&self) -> Direction {
        if self.is_in() {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// A single thing the bus did, as the dispatcher sees it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    BusReset,
    TransactionComplete(TransactionStatus),
    Error,
    Idle,
    Resume,
}

/// Register-level access to a buffer-descriptor USB engine.
///
/// Arming always goes buffer first, then descriptor: fill `buffer(bd)`, then
/// hand it over with `set_descriptor`. Implementations may rely on that.
pub trait Sie {
    /// Interrupt causes currently flagged, enabled or not.
    fn pending(&self) -> Interrupts;
    fn enabled(&self) -> Interrupts;
    /// Replaces the set of enabled interrupt causes.
    fn enable(&mut self, set: Interrupts);
    /// Acknowledges the given causes. Clearing `TRANSACTION` advances the
    /// transaction status FIFO.
    fn clear(&mut self, set: Interrupts);
    /// Acknowledges all of the individual bus error causes.
    fn clear_errors(&mut self);

    /// Status of the oldest completed transaction.
    fn transaction(&self) -> TransactionStatus;

    fn descriptor(&self, bd: Bd) -> BufferDescriptor;
    fn set_descriptor(&mut self, bd: Bd, desc: BufferDescriptor);
    /// The data buffer belonging to `bd`.
    fn buffer(&mut self, bd: Bd) -> &mut [u8; EP_BUFFER_SIZE];

    /// Moves the device to a new bus address.
    fn set_address(&mut self, address: u8);
    /// Lets the engine process tokens again after a SETUP froze it.
    fn clear_packet_disable(&mut self);

    /// Puts the transceiver into its low-power state.
    fn suspend(&mut self);
    fn resume(&mut self);
    /// Halts the processor until the next interrupt.
    fn sleep(&mut self);
}

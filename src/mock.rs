// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A pretend serial interface engine, with a pretend host attached.
//!
//! `MockSie` behaves like buffer-descriptor hardware as far as the engines
//! can tell. Tests play the host with `setup`, `host_out` and `host_in`,
//! which respect descriptor ownership and stalls and queue up transaction
//! status the way the real FIFO does.

use std::collections::VecDeque;

use crate::bdt::{Bd, BdStatus, BufferDescriptor, Pid, Toggle};
use crate::config::EP_BUFFER_SIZE;
use crate::sie::{Interrupts, Sie, TransactionStatus};
use crate::trace::Trace;
use crate::usb::Direction;

/// What the host got back for a token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Handshake {
    /// OUT accepted.
    Ack,
    /// IN answered with this data on this toggle.
    Data(Vec<u8>, Toggle),
    Nak,
    Stall,
}

#[derive(Debug)]
pub struct MockSie {
    pub bds: [BufferDescriptor; 4],
    pub buffers: [[u8; EP_BUFFER_SIZE]; 4],
    /// UIR
    pub flags: Interrupts,
    /// UIE
    pub mask: Interrupts,
    pub fifo: VecDeque<TransactionStatus>,
    pub address: u8,
    pub address_writes: Vec<u8>,
    pub packet_disabled: bool,
    /// EP0 IN as it stood when token processing last resumed.
    pub ep0_in_on_resume: Option<BufferDescriptor>,
    pub suspended: bool,
    pub sleeps: usize,
    pub error_clears: usize,
}

impl MockSie {
    pub fn new() -> Self {
        Self {
            bds: Default::default(),
            buffers: Default::default(),
            flags: Interrupts::empty(),
            mask: Interrupts::empty(),
            fifo: VecDeque::new(),
            address: 0,
            address_writes: vec![],
            packet_disabled: false,
            ep0_in_on_resume: None,
            suspended: false,
            sleeps: 0,
            error_clears: 0,
        }
    }

    fn complete(&mut self, bd: Bd, pid: Pid, endpoint: u8, dir: Direction) {
        let desc = &mut self.bds[bd.index()];
        let toggle = desc.status.dts();
        desc.status = BdStatus::completed(pid);
        desc.status.set_dts(toggle);
        self.fifo.push_back(TransactionStatus::new(endpoint, dir));
        self.flags |= Interrupts::TRANSACTION;
    }

    /// Host sends a SETUP to endpoint 0. Gets through a stall, but not a
    /// descriptor we haven't handed over.
    pub fn setup(&mut self, packet: [u8; 8]) {
        let out = self.bds[Bd::Ep0Out.index()];
        assert!(out.owned_by_hardware(), "EP0 OUT not armed for SETUP");
        self.buffers[Bd::Ep0Out.index()] = packet;
        self.bds[Bd::Ep0Out.index()].count = 8;
        self.packet_disabled = true;
        self.complete(Bd::Ep0Out, Pid::Setup, 0, Direction::Out);
    }

    /// Host sends an OUT data packet to endpoint 0.
    pub fn host_out(&mut self, data: &[u8]) -> Handshake {
        let out = self.bds[Bd::Ep0Out.index()];
        if !out.owned_by_hardware() || self.packet_disabled {
            return Handshake::Nak;
        }
        if out.status.bstall() {
            return Handshake::Stall;
        }
        assert!(data.len() <= usize::from(out.count), "babble on EP0 OUT");
        self.buffers[Bd::Ep0Out.index()][..data.len()].copy_from_slice(data);
        self.bds[Bd::Ep0Out.index()].count = data.len() as u8;
        self.complete(Bd::Ep0Out, Pid::Out, 0, Direction::Out);
        Handshake::Ack
    }

    /// Host polls an IN endpoint.
    pub fn host_in(&mut self, bd: Bd) -> Handshake {
        let endpoint = match bd {
            Bd::Ep0In => 0,
            Bd::Ep1In => 1,
            Bd::Ep0Out | Bd::Ep1Out => panic!("{:?} is not an IN endpoint", bd),
        };
        let desc = self.bds[bd.index()];
        if !desc.owned_by_hardware() || (endpoint == 0 && self.packet_disabled) {
            return Handshake::Nak;
        }
        if desc.status.bstall() {
            return Handshake::Stall;
        }
        let data = self.buffers[bd.index()][..usize::from(desc.count)].to_vec();
        self.complete(bd, Pid::In, endpoint, Direction::In);
        Handshake::Data(data, desc.status.toggle())
    }

    /// Host drives a bus reset. The hardware drops its address by itself.
    pub fn bus_reset(&mut self) {
        self.address = 0;
        self.flags |= Interrupts::BUS_RESET;
    }

    pub fn raise(&mut self, set: Interrupts) {
        self.flags |= set;
    }
}

impl Sie for MockSie {
    fn pending(&self) -> Interrupts {
        self.flags
    }

    fn enabled(&self) -> Interrupts {
        self.mask
    }

    fn enable(&mut self, set: Interrupts) {
        self.mask = set;
    }

    fn clear(&mut self, set: Interrupts) {
        if set.contains(Interrupts::TRANSACTION) && self.flags.contains(Interrupts::TRANSACTION) {
            self.fifo.pop_front();
        }
        self.flags.remove(set);
        if !self.fifo.is_empty() {
            self.flags |= Interrupts::TRANSACTION;
        }
    }

    fn clear_errors(&mut self) {
        self.error_clears += 1;
    }

    fn transaction(&self) -> TransactionStatus {
        self.fifo.front().copied().unwrap_or_default()
    }

    fn descriptor(&self, bd: Bd) -> BufferDescriptor {
        self.bds[bd.index()]
    }

    fn set_descriptor(&mut self, bd: Bd, desc: BufferDescriptor) {
        self.bds[bd.index()] = desc;
    }

    fn buffer(&mut self, bd: Bd) -> &mut [u8; EP_BUFFER_SIZE] {
        &mut self.buffers[bd.index()]
    }

    fn set_address(&mut self, address: u8) {
        self.address = address;
        self.address_writes.push(address);
    }

    fn clear_packet_disable(&mut self) {
        self.ep0_in_on_resume = Some(self.bds[Bd::Ep0In.index()]);
        self.packet_disabled = false;
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }

    fn resume(&mut self) {
        self.suspended = false;
    }

    fn sleep(&mut self) {
        self.sleeps += 1;
    }
}

/// Collects trace output.
#[derive(Debug, Default)]
pub struct TraceLog(pub Vec<u8>);

impl TraceLog {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl Trace for TraceLog {
    fn debug_write(&mut self, byte: u8) {
        self.0.push(byte);
    }
}

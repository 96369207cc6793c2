// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Endpoint 0 control transfers.
//!
//! A control transfer is a SETUP, then zero or more data packets all going
//! the same way, then a status packet going the other way (or IN, when there
//! was no data). The engine keeps track of where in that sequence we are and,
//! after every completed transaction, re-arms endpoint 0 for whatever the
//! host should do next.

use zerocopy::LayoutVerified;

use crate::bdt::{Bd, BufferDescriptor, Pid, Toggle};
use crate::config::EP0_MAX_PACKET;
use crate::descriptors::{self, Lookup};
use crate::error::ControlError;
use crate::gamepad::GamepadReport;
use crate::sie::Sie;
use crate::trace::Trace;
use crate::usb::{
    DescriptorType, Direction, HidRequest, Request, RequestKind, SetupPacket, StandardRequest,
};

/// Where the bytes of an IN data stage come from.
///
/// `Static` data is copied from the descriptor repository. The other two are
/// device state, read again each time a packet is built, so a GET_REPORT
/// always answers with the report as it is at that moment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Static(&'static [u8]),
    Configuration,
    Report,
}

/// The control transfer in progress, if any.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Transfer {
    /// Nothing going on. Endpoint 0 waits for a SETUP.
    #[default]
    Idle,
    /// Sending data to the host. `offset` counts bytes already handed to the
    /// hardware; `remaining` is how many more we'll send.
    In {
        source: Source,
        offset: usize,
        remaining: usize,
    },
    /// Receiving data from the host. Nothing we support has an OUT data
    /// stage, so in practice `remaining` is always zero and the next thing
    /// to happen is the status stage.
    Out { received: usize, remaining: usize },
}

/// Address and configuration as assigned by the host.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceState {
    /// Address currently programmed into the hardware.
    pub address: u8,
    /// Address from a SET_ADDRESS whose status stage hasn't completed.
    pub pending_address: Option<u8>,
    /// Zero when unconfigured.
    pub configuration: u8,
}

#[derive(Debug, Default)]
pub struct ControlEngine {
    transfer: Transfer,
    /// Toggle for the next data stage packet.
    toggle: Toggle,
    state: DeviceState,
}

impl ControlEngine {
    pub const fn new() -> Self {
        Self {
            transfer: Transfer::Idle,
            toggle: Toggle::Data0,
            state: DeviceState {
                address: 0,
                pending_address: None,
                configuration: 0,
            },
        }
    }

    pub fn transfer(&self) -> Transfer {
        self.transfer
    }

    pub fn toggle(&self) -> Toggle {
        self.toggle
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Forgets everything the host told us. The hardware has already gone
    /// back to address 0 by the time a bus reset reaches us.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Handles one completed endpoint 0 transaction in direction `dir`, then
    /// arms the endpoint for the next one. `report` is the current input
    /// report, in case the host asks for it.
    pub fn transaction_complete(
        &mut self,
        hw: &mut impl Sie,
        trace: &mut impl Trace,
        dir: Direction,
        report: &GamepadReport,
    ) {
        match dir {
            Direction::Out if hw.descriptor(Bd::Ep0Out).status.pid() == Some(Pid::Setup) => {
                // The engine stops taking tokens after every SETUP until we
                // say otherwise, so both endpoints must be in their final
                // state (stall or armed) before `clear_packet_disable`.
                if let Err(e) = self.setup(hw, trace) {
                    warn!("ep0 stall: {}", e);
                    match e {
                        ControlError::UnsupportedRequest { kind, code } => {
                            trace.debug_write(b'U');
                            // Class codes overlap standard ones; set the top
                            // bit to keep them apart.
                            trace.debug_write(match kind {
                                RequestKind::Class => code | 0x80,
                                _ => code,
                            });
                        }
                        ControlError::UnsupportedDescriptor(ty) => {
                            trace.debug_write(b'u');
                            trace.debug_write(ty);
                        }
                        ControlError::MalformedSetup => trace.debug_write(b'U'),
                    }
                    // Both directions stay stalled until the next SETUP,
                    // which the hardware accepts regardless.
                    hw.set_descriptor(Bd::Ep0Out, BufferDescriptor::stall());
                    hw.set_descriptor(Bd::Ep0In, BufferDescriptor::stall());
                    hw.clear_packet_disable();
                    return;
                }
                self.arm(hw, report);
                hw.clear_packet_disable();
                return;
            }
            Direction::Out => {
                trace.debug_write(b'O');
                self.data_out(hw);
            }
            Direction::In => {
                trace.debug_write(b'I');
                self.data_in(hw, trace);
            }
        }
        self.arm(hw, report);
    }

    fn setup(&mut self, hw: &mut impl Sie, trace: &mut impl Trace) -> Result<(), ControlError> {
        trace.debug_write(b'S');
        // A SETUP cancels whatever was going on, and the data stage after it
        // always starts on DATA1.
        self.transfer = Transfer::Idle;
        self.toggle = Toggle::Data1;

        let count = usize::from(hw.descriptor(Bd::Ep0Out).count);
        let raw = *hw.buffer(Bd::Ep0Out);
        let setup = raw
            .get(..count)
            .and_then(LayoutVerified::<_, SetupPacket>::new)
            .ok_or(ControlError::MalformedSetup)?;
        let length = usize::from(setup.length.get());
        let value = setup.value.get();

        debug!(
            "setup {=u8:x} {=u8:x} {=u16:x} len {=usize}",
            setup.request_type,
            setup.request,
            value,
            length
        );

        match setup.decode()? {
            Request::Standard(StandardRequest::GetDescriptor) => {
                let [index, ty] = value.to_le_bytes();
                trace.debug_write(b'D');
                trace.debug_nibbles(setup.length.get() as u8);
                let found =
                    descriptors::lookup(ty, index).ok_or(ControlError::UnsupportedDescriptor(ty))?;
                match (found, ty) {
                    (Lookup::NoSuchString, _) => trace.debug_str(b"su"),
                    (_, t) if t == DescriptorType::String as u8 => {
                        trace.debug_write(b's');
                        trace.debug_write(b'0' + index);
                    }
                    (_, t) if t == DescriptorType::Configuration as u8 => trace.debug_write(b'c'),
                    (_, t) if t == DescriptorType::Report as u8 => trace.debug_write(b'r'),
                    _ => trace.debug_write(b'd'),
                }
                self.begin_in(Source::Static(found.bytes()), found.bytes().len(), length);
            }
            Request::Standard(StandardRequest::SetAddress) => {
                trace.debug_write(b'A');
                self.state.pending_address = Some(value as u8 & 0x7F);
                self.begin_out(0);
            }
            Request::Standard(StandardRequest::SetConfiguration) => {
                trace.debug_str(b"Cs");
                self.state.configuration = value as u8;
                self.begin_out(0);
            }
            Request::Standard(StandardRequest::GetConfiguration) => {
                trace.debug_str(b"Cg");
                self.begin_in(Source::Configuration, 1, length);
            }
            // Only one report exists, so the type and ID in `value` don't
            // matter.
            Request::Hid(HidRequest::GetReport) => {
                trace.debug_write(b'P');
                self.begin_in(Source::Report, crate::config::REPORT_SIZE, length);
            }
            // We send on every change, so the idle rate has nothing to act on.
            Request::Hid(HidRequest::SetIdle) => {
                trace.debug_write(b'L');
                self.begin_out(0);
            }
            Request::Standard(_) | Request::Hid(_) => {
                return Err(ControlError::UnsupportedRequest {
                    kind: setup.kind(),
                    code: setup.request,
                });
            }
        }
        Ok(())
    }

    fn begin_in(&mut self, source: Source, available: usize, requested: usize) {
        self.transfer = Transfer::In {
            source,
            offset: 0,
            remaining: available.min(requested),
        };
    }

    fn begin_out(&mut self, expected: usize) {
        self.transfer = Transfer::Out {
            received: 0,
            remaining: expected,
        };
    }

    /// An OUT that wasn't a SETUP.
    fn data_out(&mut self, hw: &mut impl Sie) {
        match &mut self.transfer {
            // Status stage of an IN transfer. Done.
            Transfer::In { .. } => self.transfer = Transfer::Idle,
            Transfer::Out {
                received,
                remaining,
            } => {
                // There's nowhere to put OUT data; it's counted and dropped.
                let n = usize::from(hw.descriptor(Bd::Ep0Out).count).min(*remaining);
                *received += n;
                *remaining -= n;
                self.toggle = self.toggle.flip();
            }
            Transfer::Idle => (),
        }
    }

    /// The host acknowledged something we sent.
    fn data_in(&mut self, hw: &mut impl Sie, trace: &mut impl Trace) {
        match self.transfer {
            // A data packet went through; the next one (if any) is armed
            // below.
            Transfer::In { .. } => self.toggle = self.toggle.flip(),
            // Status stage of an OUT transfer. Only now is it safe to move to
            // a new address: the status handshake happened at the old one.
            Transfer::Out { .. } => {
                self.transfer = Transfer::Idle;
                if let Some(address) = self.state.pending_address.take() {
                    trace.debug_nibbles(address);
                    debug!("address {=u8}", address);
                    hw.set_address(address);
                    self.state.address = address;
                }
            }
            Transfer::Idle => (),
        }
    }

    /// Sets endpoint 0 up for whatever comes next.
    fn arm(&mut self, hw: &mut impl Sie, report: &GamepadReport) {
        let Self {
            transfer,
            toggle,
            state,
        } = self;
        match transfer {
            Transfer::In {
                source,
                offset,
                remaining,
            } => {
                // This runs even when nothing is left. A host that asked for
                // more than we have has to see a short (maybe empty) packet to
                // know we're done.
                let n = (*remaining).min(EP0_MAX_PACKET);
                let report_bytes = report.bytes();
                let configuration = [state.configuration];
                let bytes: &[u8] = match source {
                    Source::Static(bytes) => bytes,
                    Source::Configuration => &configuration,
                    Source::Report => &report_bytes,
                };
                let chunk = bytes.get(*offset..*offset + n).unwrap_or(&[]);
                hw.buffer(Bd::Ep0In)[..chunk.len()].copy_from_slice(chunk);
                hw.set_descriptor(Bd::Ep0In, BufferDescriptor::data(chunk.len(), *toggle));
                *remaining -= n;
                *offset += n;
                // The host may cut the data stage short and go straight to
                // status at any point.
                hw.set_descriptor(Bd::Ep0Out, BufferDescriptor::status_stage());
            }
            Transfer::Out { remaining, .. } => {
                hw.set_descriptor(Bd::Ep0Out, BufferDescriptor::data(*remaining, *toggle));
                hw.set_descriptor(Bd::Ep0In, BufferDescriptor::status_stage());
            }
            Transfer::Idle => hw.set_descriptor(Bd::Ep0Out, BufferDescriptor::setup()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Handshake, MockSie, TraceLog};
    use zerocopy::AsBytes;

    struct Harness {
        hw: MockSie,
        trace: TraceLog,
        ep0: ControlEngine,
        report: GamepadReport,
    }

    impl Harness {
        fn new() -> Self {
            let mut hw = MockSie::new();
            hw.set_descriptor(Bd::Ep0Out, BufferDescriptor::setup());
            Self {
                hw,
                trace: TraceLog::default(),
                ep0: ControlEngine::new(),
                report: GamepadReport::default(),
            }
        }

        /// Lets the engine see the transaction the mock just completed.
        fn run(&mut self) {
            let status = self.hw.transaction();
            self.hw.clear(crate::sie::Interrupts::TRANSACTION);
            self.ep0
                .transaction_complete(&mut self.hw, &mut self.trace, status.direction(), &self.report);
        }

        fn setup(&mut self, packet: [u8; 8]) {
            self.hw.setup(packet);
            self.run();
        }

        fn read(&mut self) -> Handshake {
            let h = self.hw.host_in(Bd::Ep0In);
            if matches!(h, Handshake::Data(..)) {
                self.run();
            }
            h
        }

        fn write(&mut self, data: &[u8]) -> Handshake {
            let h = self.hw.host_out(data);
            if h == Handshake::Ack {
                self.run();
            }
            h
        }

        /// Runs IN data packets until a short one, then the status stage.
        fn read_all(&mut self) -> Vec<u8> {
            let mut out = vec![];
            loop {
                match self.read() {
                    Handshake::Data(bytes, _) => {
                        let last = bytes.len() < EP0_MAX_PACKET;
                        out.extend(bytes);
                        if last {
                            break;
                        }
                    }
                    other => panic!("data stage ended with {:?}", other),
                }
            }
            assert_eq!(self.write(&[]), Handshake::Ack);
            out
        }
    }

    fn get_descriptor(ty: u8, index: u8, length: u16) -> [u8; 8] {
        let [lo, hi] = length.to_le_bytes();
        [0x80, 0x06, index, ty, 0x00, 0x00, lo, hi]
    }

    #[test]
    fn setup_aborts_transfer_and_resets_toggle() {
        let mut h = Harness::new();
        h.setup(get_descriptor(0x02, 0, 34));
        // Take one packet so the toggle moves on.
        assert!(matches!(h.read(), Handshake::Data(_, Toggle::Data1)));
        assert_eq!(h.ep0.toggle(), Toggle::Data0);

        h.setup(get_descriptor(0x01, 0, 18));
        assert_eq!(h.ep0.toggle(), Toggle::Data1);
        assert!(matches!(
            h.ep0.transfer(),
            Transfer::In { offset: 8, remaining: 10, .. }
        ));
        assert!(matches!(h.read(), Handshake::Data(_, Toggle::Data1)));
    }

    #[test]
    fn descriptor_length_is_clamped_to_request() {
        let mut h = Harness::new();
        h.setup(get_descriptor(0x01, 0, 64));
        assert_eq!(h.read_all(), descriptors::DEVICE_DESCRIPTOR.as_bytes());

        h.setup(get_descriptor(0x02, 0, 9));
        assert_eq!(h.read_all(), &descriptors::CONFIGURATION.as_bytes()[..9]);
        assert_eq!(h.ep0.transfer(), Transfer::Idle);
    }

    #[test]
    fn exact_multiple_ends_with_empty_packet() {
        let mut h = Harness::new();
        // The report descriptor is 60 bytes; ask for 64 and it takes eight
        // packets, the last short.
        h.setup(get_descriptor(0x22, 0, 64));
        let mut packets = vec![];
        while let Handshake::Data(bytes, toggle) = h.read() {
            packets.push((bytes.len(), toggle));
            if packets.len() == 8 {
                break;
            }
        }
        assert_eq!(packets[7], (4, Toggle::Data0));

        // 16 bytes of the 18-byte device descriptor: two full packets and
        // then one more, empty.
        h.setup(get_descriptor(0x01, 0, 16));
        let lens: Vec<_> = (0..3)
            .map(|_| match h.read() {
                Handshake::Data(bytes, _) => bytes.len(),
                other => panic!("{:?}", other),
            })
            .collect();
        assert_eq!(lens, [8, 8, 0]);
    }

    #[test]
    fn missing_string_is_an_empty_answer() {
        let mut h = Harness::new();
        h.setup(get_descriptor(0x03, 9, 255));
        assert_eq!(h.read_all(), Vec::<u8>::new());
        // wLength 255 traces as "??".
        assert!(h.trace.text().starts_with("SD??su"));
    }

    #[test]
    fn unknown_descriptor_stalls_both_directions() {
        let mut h = Harness::new();
        h.setup(get_descriptor(0xFF, 0, 18));
        assert_eq!(h.hw.host_in(Bd::Ep0In), Handshake::Stall);
        assert_eq!(h.hw.host_out(&[]), Handshake::Stall);
        assert!(!h.hw.packet_disabled);
        assert_eq!(h.trace.0.last(), Some(&0xFF));

        // Any SETUP gets through and clears the stall.
        h.setup(get_descriptor(0x01, 0, 8));
        assert!(matches!(h.read(), Handshake::Data(..)));
    }

    #[test]
    fn unsupported_requests_stall() {
        let mut h = Harness::new();
        // GET_STATUS
        h.setup([0x80, 0x00, 0, 0, 0, 0, 2, 0]);
        assert_eq!(h.hw.host_in(Bd::Ep0In), Handshake::Stall);
        assert_eq!(h.trace.text(), "SU\0");

        // SET_REPORT shares its code with SET_CONFIGURATION but mustn't be
        // taken for it.
        h.setup([0x21, 0x09, 0x00, 0x02, 0, 0, 2, 0]);
        assert_eq!(h.hw.host_out(&[1, 2]), Handshake::Stall);
        assert_eq!(h.ep0.state().configuration, 0);
        // The trace marks it as a class request.
        assert!(h.trace.0.ends_with(b"SU\x89"));
    }

    #[test]
    fn stall_is_in_place_before_tokens_resume() {
        let mut h = Harness::new();
        h.setup(get_descriptor(0x01, 0, 18));
        h.read_all();
        // The finished transfer left an empty packet armed on EP0 IN.
        assert!(h.hw.descriptor(Bd::Ep0In).owned_by_hardware());

        // GET_STATUS
        h.setup([0x80, 0x00, 0, 0, 0, 0, 2, 0]);
        assert_eq!(h.hw.ep0_in_on_resume, Some(BufferDescriptor::stall()));
        assert_eq!(h.hw.host_in(Bd::Ep0In), Handshake::Stall);
    }

    #[test]
    fn data_stage_is_armed_before_tokens_resume() {
        let mut h = Harness::new();
        h.setup(get_descriptor(0x01, 0, 18));
        assert_eq!(
            h.hw.ep0_in_on_resume,
            Some(BufferDescriptor::data(EP0_MAX_PACKET, Toggle::Data1))
        );
    }

    #[test]
    fn out_packet_advances_out_transfer() {
        let mut h = Harness::new();
        h.setup([0x00, 0x09, 0x01, 0x00, 0, 0, 0, 0]);
        assert_eq!(h.ep0.toggle(), Toggle::Data1);

        assert_eq!(h.write(&[]), Handshake::Ack);
        assert_eq!(h.ep0.toggle(), Toggle::Data0);
        assert_eq!(
            h.hw.descriptor(Bd::Ep0Out),
            BufferDescriptor::data(0, Toggle::Data0)
        );
        assert_eq!(
            h.ep0.transfer(),
            Transfer::Out {
                received: 0,
                remaining: 0
            }
        );

        // Still waiting for the status stage, which ends it.
        assert_eq!(h.read(), Handshake::Data(vec![], Toggle::Data1));
        assert_eq!(h.ep0.transfer(), Transfer::Idle);
    }

    #[test]
    fn setup_abandons_out_transfer() {
        let mut h = Harness::new();
        h.setup([0x00, 0x09, 0x01, 0x00, 0, 0, 0, 0]);
        assert_eq!(h.write(&[]), Handshake::Ack);
        assert_eq!(h.ep0.toggle(), Toggle::Data0);

        h.setup(get_descriptor(0x01, 0, 18));
        assert_eq!(h.ep0.toggle(), Toggle::Data1);
        assert!(matches!(
            h.ep0.transfer(),
            Transfer::In { offset: 8, remaining: 10, .. }
        ));
        assert_eq!(h.read_all(), descriptors::DEVICE_DESCRIPTOR.as_bytes());
    }

    #[test]
    fn address_changes_after_status_stage() {
        let mut h = Harness::new();
        h.setup([0x00, 0x05, 0x85, 0x00, 0, 0, 0, 0]);
        assert_eq!(h.hw.address, 0);
        assert_eq!(h.ep0.state().pending_address, Some(5));
        // The status handshake still happens at address 0.
        assert_eq!(h.read(), Handshake::Data(vec![], Toggle::Data1));
        assert_eq!(h.hw.address, 5);
        assert_eq!(h.ep0.state().address, 5);
        assert_eq!(h.ep0.state().pending_address, None);
        assert_eq!(h.trace.text(), "SAI05");
        assert_eq!(h.hw.address_writes, [5]);
    }

    #[test]
    fn configuration_round_trip() {
        let mut h = Harness::new();
        h.setup([0x00, 0x09, 0x01, 0x00, 0, 0, 0, 0]);
        assert_eq!(h.ep0.state().configuration, 1);
        assert!(matches!(h.read(), Handshake::Data(ref b, _) if b.is_empty()));

        h.setup([0x80, 0x08, 0, 0, 0, 0, 1, 0]);
        assert_eq!(h.read_all(), [1]);
        assert_eq!(h.trace.text(), "SCsISCgIO");
    }

    #[test]
    fn get_report_reads_current_report() {
        let mut h = Harness::new();
        h.report = GamepadReport::from_bytes([0x0D, 0x41]);
        h.setup([0xA1, 0x01, 0x00, 0x01, 0, 0, 2, 0]);
        assert_eq!(h.read_all(), [0x0D, 0x41]);
    }

    #[test]
    fn set_idle_is_accepted() {
        let mut h = Harness::new();
        h.setup([0x21, 0x0A, 0, 0, 0, 0, 0, 0]);
        assert_eq!(h.read(), Handshake::Data(vec![], Toggle::Data1));
        assert_eq!(h.ep0.transfer(), Transfer::Idle);
        assert_eq!(h.hw.descriptor(Bd::Ep0Out), BufferDescriptor::setup());
    }

    #[test]
    fn early_status_stage_ends_in_transfer() {
        let mut h = Harness::new();
        h.setup(get_descriptor(0x02, 0, 255));
        assert!(matches!(h.read(), Handshake::Data(..)));
        assert_eq!(h.write(&[]), Handshake::Ack);
        assert_eq!(h.ep0.transfer(), Transfer::Idle);
        assert_eq!(h.hw.descriptor(Bd::Ep0Out), BufferDescriptor::setup());
    }

    #[test]
    fn setup_clears_packet_disable() {
        let mut h = Harness::new();
        h.hw.setup(get_descriptor(0x01, 0, 18));
        assert!(h.hw.packet_disabled);
        h.run();
        assert!(!h.hw.packet_disabled);
    }
}

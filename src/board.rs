// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RP2040 glue: the USB controller seen through the buffer descriptor model
//! the protocol engines expect, and a UART for the trace.
//!
//! The RP2040 controller is not a buffer descriptor engine, but it's close.
//! Each endpoint direction has a buffer control register with an AVAILABLE
//! bit that works like UOWN, a DATA0/1 bit, a length and a stall bit. The
//! differences are handled here:
//!
//! - We keep a RAM image of the four descriptors and their buffers, and only
//!   push them into DPRAM when a descriptor is handed to the hardware.
//! - SETUP packets don't go through a buffer at all. They show up in two
//!   dedicated registers plus a status flag, which we present as a completed
//!   EP0 OUT carrying the SETUP PID.
//! - Completions are reported as bits in `buff_status` rather than through a
//!   status FIFO. We hand them out one at a time, lowest bit first.

use snes_usb::bdt::{Bd, BdStatus, BufferDescriptor, Pid};
use snes_usb::config::{EP_BUFFER_SIZE, TRACE_BUFFER_SIZE};
use snes_usb::sie::{Interrupts, Sie, TransactionStatus};
use snes_usb::usb::Direction;
use snes_usb::{Trace, TraceRing};

/// Offset into DPRAM of the buffer EP0 uses in both directions. Fixed by
/// the hardware.
const EP0_BUFFER_OFFSET: usize = 0x100;
/// Offset of the EP1 IN buffer, the first free spot after EP0's.
const EP1_IN_BUFFER_OFFSET: usize = 0x180;

/// Buffer control registers (and `buff_status` bits) come in IN/OUT pairs,
/// IN first.
fn control_index(bd: Bd) -> usize {
    match bd {
        Bd::Ep0In => 0,
        Bd::Ep0Out => 1,
        Bd::Ep1In => 2,
        Bd::Ep1Out => 3,
    }
}

fn buffer_offset(bd: Bd) -> Option<usize> {
    match bd {
        Bd::Ep0In | Bd::Ep0Out => Some(EP0_BUFFER_OFFSET),
        Bd::Ep1In => Some(EP1_IN_BUFFER_OFFSET),
        // Never enabled, so it has no buffer.
        Bd::Ep1Out => None,
    }
}

fn is_in(bd: Bd) -> bool {
    matches!(bd, Bd::Ep0In | Bd::Ep1In)
}

pub struct Rp2040Sie {
    regs: rp2040_pac::USBCTRL_REGS,
    dpram: rp2040_pac::USBCTRL_DPRAM,
    bds: [BufferDescriptor; 4],
    buffers: [[u8; EP_BUFFER_SIZE]; 4],
}

impl Rp2040Sie {
    /// Brings the controller out of reset and up as a device, with EP1 IN
    /// configured for interrupt transfers. Doesn't connect to the bus; call
    /// `connect` once the device is ready to be enumerated.
    pub fn new(
        regs: rp2040_pac::USBCTRL_REGS,
        dpram: rp2040_pac::USBCTRL_DPRAM,
        resets: &rp2040_pac::RESETS,
    ) -> Self {
        resets.reset.modify(|_, w| w.usbctrl().set_bit());
        resets.reset.modify(|_, w| w.usbctrl().clear_bit());
        while !resets.reset_done.read().usbctrl().bit() {}

        // Clear the control portion of DPRAM, which comes up full of junk.
        dpram.setup_packet_low.write(|w| unsafe { w.bits(0) });
        dpram.setup_packet_high.write(|w| unsafe { w.bits(0) });
        for epc in &dpram.ep_control {
            epc.write(|w| unsafe { w.bits(0) });
        }
        for epb in &dpram.ep_buffer_control {
            epb.write(|w| unsafe { w.bits(0) });
        }

        // Onboard PHY, and pretend VBUS is always there since not every
        // board wires up detection.
        regs.usb_muxing.write(|w| w.to_phy().set_bit().softcon().set_bit());
        regs.usb_pwr.write(|w| {
            w.vbus_detect()
                .set_bit()
                .vbus_detect_override_en()
                .set_bit()
        });
        regs.main_ctrl.write(|w| w.controller_en().set_bit().host_ndevice().clear_bit());
        // Flag every EP0 buffer in buff_status, not just every other one.
        regs.sie_ctrl.write(|w| w.ep0_int_1buf().set_bit());

        // EP1 IN, interrupt transfers. ep_control has no entry for EP0, so
        // EP1 IN is its first.
        dpram.ep_control[0].write(|w| unsafe {
            w.enable()
                .set_bit()
                .interrupt_per_buff()
                .set_bit()
                .endpoint_type()
                .bits(0b11)
                .buffer_address()
                .bits(EP1_IN_BUFFER_OFFSET as u16)
        });

        Self {
            regs,
            dpram,
            bds: [BufferDescriptor::default(); 4],
            buffers: [[0; EP_BUFFER_SIZE]; 4],
        }
    }

    /// Enables the D+ pullup. The host notices us from here on.
    pub fn connect(&self) {
        self.regs.sie_ctrl.modify(|_, w| w.pullup_en().set_bit());
    }

    fn dpram_byte(offset: usize) -> *mut u8 {
        let base = rp2040_pac::USBCTRL_DPRAM::ptr() as *mut u8;
        // Safety: only ever called with offsets inside our two buffers, both
        // well within the 4 KiB DPRAM.
        unsafe { base.add(offset) }
    }

    /// A SETUP has arrived and is next in line to be handled.
    fn setup_waiting(&self) -> bool {
        self.regs.buff_status.read().bits() == 0 && self.regs.sie_status.read().setup_rec().bit()
    }

    /// Whether the hardware has finished with a descriptor we handed it.
    fn hardware_done(&self, bd: Bd) -> Option<u8> {
        let mirror = self.bds[bd.index()];
        // Stalls and SETUP waits are never "done" from this side.
        if !mirror.owned_by_hardware() || !mirror.status.dtsen() {
            return None;
        }
        let bc = self.dpram.ep_buffer_control[control_index(bd)].read();
        if bc.available_0().bit() {
            None
        } else {
            Some(bc.length_0().bits() as u8)
        }
    }
}

impl Sie for Rp2040Sie {
    fn pending(&self) -> Interrupts {
        let r = self.regs.intr.read();
        let mut set = Interrupts::empty();
        set.set(Interrupts::BUS_RESET, r.bus_reset().bit());
        set.set(
            Interrupts::TRANSACTION,
            r.setup_req().bit() || r.buff_status().bit(),
        );
        set.set(
            Interrupts::ERROR,
            r.error_crc().bit()
                || r.error_bit_stuff().bit()
                || r.error_rx_overflow().bit()
                || r.error_rx_timeout().bit()
                || r.error_data_seq().bit(),
        );
        set.set(Interrupts::IDLE, r.dev_suspend().bit());
        set.set(Interrupts::ACTIVITY, r.dev_resume_from_host().bit());
        set.set(Interrupts::STALL, r.stall().bit());
        set.set(Interrupts::START_OF_FRAME, r.dev_sof().bit());
        set
    }

    fn enabled(&self) -> Interrupts {
        let r = self.regs.inte.read();
        let mut set = Interrupts::empty();
        set.set(Interrupts::BUS_RESET, r.bus_reset().bit());
        set.set(Interrupts::TRANSACTION, r.buff_status().bit());
        set.set(Interrupts::ERROR, r.error_crc().bit());
        set.set(Interrupts::IDLE, r.dev_suspend().bit());
        set.set(Interrupts::ACTIVITY, r.dev_resume_from_host().bit());
        set.set(Interrupts::STALL, r.stall().bit());
        set.set(Interrupts::START_OF_FRAME, r.dev_sof().bit());
        set
    }

    fn enable(&mut self, set: Interrupts) {
        let err = set.contains(Interrupts::ERROR);
        self.regs.inte.write(|w| {
            w.bus_reset()
                .bit(set.contains(Interrupts::BUS_RESET))
                .setup_req()
                .bit(set.contains(Interrupts::TRANSACTION))
                .buff_status()
                .bit(set.contains(Interrupts::TRANSACTION))
                .error_crc()
                .bit(err)
                .error_bit_stuff()
                .bit(err)
                .error_rx_overflow()
                .bit(err)
                .error_rx_timeout()
                .bit(err)
                .error_data_seq()
                .bit(err)
                .dev_suspend()
                .bit(set.contains(Interrupts::IDLE))
                .dev_resume_from_host()
                .bit(set.contains(Interrupts::ACTIVITY))
                .stall()
                .bit(set.contains(Interrupts::STALL))
                .dev_sof()
                .bit(set.contains(Interrupts::START_OF_FRAME))
        });
    }

    fn clear(&mut self, set: Interrupts) {
        if set.contains(Interrupts::TRANSACTION) {
            // Retire the one completion `transaction` is reporting.
            let bufs = self.regs.buff_status.read().bits();
            if bufs != 0 {
                let lowest = bufs & bufs.wrapping_neg();
                self.regs.buff_status.write(|w| unsafe { w.bits(lowest) });
            } else {
                self.regs.sie_status.write(|w| w.setup_rec().set_bit());
            }
        }
        if set.contains(Interrupts::ERROR) {
            self.clear_errors();
        }
        if set.contains(Interrupts::START_OF_FRAME) {
            // Reading the frame number is what acknowledges SOF.
            let _ = self.regs.sof_rd.read();
        }
        self.regs.sie_status.write(|w| {
            w.bus_reset()
                .bit(set.contains(Interrupts::BUS_RESET))
                .suspended()
                .bit(set.contains(Interrupts::IDLE))
                .resume()
                .bit(set.contains(Interrupts::ACTIVITY))
                .stall_rec()
                .bit(set.contains(Interrupts::STALL))
        });
    }

    fn clear_errors(&mut self) {
        self.regs.sie_status.write(|w| {
            w.crc_error()
                .set_bit()
                .bit_stuff_error()
                .set_bit()
                .rx_overflow()
                .set_bit()
                .rx_timeout()
                .set_bit()
                .data_seq_error()
                .set_bit()
        });
    }

    fn transaction(&self) -> TransactionStatus {
        let bufs = self.regs.buff_status.read().bits();
        if bufs != 0 {
            let bit = bufs.trailing_zeros();
            let dir = if bit & 1 == 0 {
                Direction::In
            } else {
                Direction::Out
            };
            TransactionStatus::new((bit >> 1) as u8, dir)
        } else {
            TransactionStatus::new(0, Direction::Out)
        }
    }

    fn descriptor(&self, bd: Bd) -> BufferDescriptor {
        if bd == Bd::Ep0Out && self.setup_waiting() {
            return BufferDescriptor {
                status: BdStatus::completed(Pid::Setup),
                count: 8,
            };
        }
        match self.hardware_done(bd) {
            Some(count) => BufferDescriptor {
                status: BdStatus::completed(if is_in(bd) { Pid::In } else { Pid::Out }),
                count,
            },
            None => self.bds[bd.index()],
        }
    }

    fn set_descriptor(&mut self, bd: Bd, desc: BufferDescriptor) {
        self.bds[bd.index()] = desc;
        let ctrl = &self.dpram.ep_buffer_control[control_index(bd)];

        if desc.owned_by_hardware() && desc.status.bstall() {
            // EP0 needs the extra arming register or it won't stall at all.
            match bd {
                Bd::Ep0In => self.regs.ep_stall_arm.modify(|_, w| w.ep0_in().set_bit()),
                Bd::Ep0Out => self.regs.ep_stall_arm.modify(|_, w| w.ep0_out().set_bit()),
                Bd::Ep1In | Bd::Ep1Out => (),
            }
            ctrl.write(|w| w.stall().set_bit());
            return;
        }
        // Released back to us, or armed for a SETUP, which lands in its own
        // registers without the buffer.
        if !desc.owned_by_hardware() || !desc.status.dtsen() {
            ctrl.write(|w| unsafe { w.bits(0) });
            return;
        }

        let count = usize::from(desc.count);
        if let (true, Some(offset)) = (is_in(bd), buffer_offset(bd)) {
            for (i, &b) in self.buffers[bd.index()][..count].iter().enumerate() {
                // Safety: the hardware doesn't own this buffer until the
                // AVAILABLE bit goes up below.
                unsafe { Self::dpram_byte(offset + i).write_volatile(b) };
            }
        }
        ctrl.write(|w| unsafe {
            w.pid_0()
                .bit(desc.status.dts())
                .full_0()
                .bit(is_in(bd))
                .available_0()
                .set_bit()
                .length_0()
                .bits(count as u16)
        });
    }

    fn buffer(&mut self, bd: Bd) -> &mut [u8; EP_BUFFER_SIZE] {
        if bd == Bd::Ep0Out && self.setup_waiting() {
            let lo = self.dpram.setup_packet_low.read().bits().to_le_bytes();
            let hi = self.dpram.setup_packet_high.read().bits().to_le_bytes();
            let buf = &mut self.buffers[bd.index()];
            buf[..4].copy_from_slice(&lo);
            buf[4..].copy_from_slice(&hi);
        } else if let (false, Some(len), Some(offset)) =
            (is_in(bd), self.hardware_done(bd), buffer_offset(bd))
        {
            let len = usize::from(len).min(EP_BUFFER_SIZE);
            for (i, b) in self.buffers[bd.index()][..len].iter_mut().enumerate() {
                // Safety: AVAILABLE is clear, so the hardware is done with
                // this buffer.
                *b = unsafe { Self::dpram_byte(offset + i).read_volatile() };
            }
        }
        &mut self.buffers[bd.index()]
    }

    fn set_address(&mut self, address: u8) {
        self.regs.addr_endp.write(|w| unsafe { w.address().bits(address) });
    }

    // The controller carries on after a SETUP without being told.
    fn clear_packet_disable(&mut self) {}

    // The PHY drops into suspend and back out on its own.
    fn suspend(&mut self) {}
    fn resume(&mut self) {}

    // WFI from inside the USB handler would wait on the very interrupt we're
    // in. The foreground loop keeps running instead.
    fn sleep(&mut self) {}
}

/// The trace, sent out of UART0 TX one byte per transmit interrupt.
pub struct UartTrace {
    uart: rp2040_pac::UART0,
    ring: TraceRing<TRACE_BUFFER_SIZE>,
}

impl UartTrace {
    /// Sets UART0 up for 8N1 at `TRACE_BAUD` off a 132 MHz `clk_peri`, with
    /// the FIFOs off so the transmit interrupt fires after every byte.
    pub fn new(uart: rp2040_pac::UART0, resets: &rp2040_pac::RESETS) -> Self {
        resets.reset.modify(|_, w| w.uart0().clear_bit());
        while !resets.reset_done.read().uart0().bit() {}

        // 132 MHz / (16 * 115200) = 71.61; the fraction is in 64ths.
        uart.uartibrd.write(|w| unsafe { w.baud_divint().bits(71) });
        uart.uartfbrd.write(|w| unsafe { w.baud_divfrac().bits(39) });
        // LCR_H has to be written after the divisors for them to latch.
        uart.uartlcr_h.write(|w| unsafe { w.wlen().bits(0b11).fen().clear_bit() });
        uart.uartcr.write(|w| w.uarten().set_bit().txe().set_bit());
        uart.uartimsc.write(|w| w.txim().set_bit());

        Self {
            uart,
            ring: TraceRing::new(),
        }
    }

    fn send(&self, byte: u8) {
        self.uart.uartdr.write(|w| unsafe { w.data().bits(byte) });
    }

    /// UART0 interrupt body.
    pub fn on_interrupt(&mut self) {
        self.uart.uarticr.write(|w| w.txic().set_bit());
        if let Some(next) = self.ring.tx_complete() {
            self.send(next);
        }
    }
}

impl Trace for UartTrace {
    fn debug_write(&mut self, byte: u8) {
        if let Some(first) = self.ring.write(byte) {
            self.send(first);
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device as a whole: interrupt-time dispatch of bus events to the two
//! endpoint engines, and the handle the foreground loop shares with the
//! interrupt handler.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::bdt::{Bd, BufferDescriptor};
use crate::config::{EP_BUFFER_SIZE, REPORT_SIZE};
use crate::control::{ControlEngine, DeviceState};
use crate::gamepad::GamepadReport;
use crate::report::ReportEngine;
use crate::sie::{BusEvent, Interrupts, Sie};
use crate::trace::Trace;

/// A USB game pad on top of some serial interface engine `H`, narrating to
/// `T`.
pub struct UsbDevice<H: Sie, T: Trace> {
    hw: H,
    trace: T,
    control: ControlEngine,
    report: ReportEngine,
}

impl<H: Sie, T: Trace> UsbDevice<H, T> {
    /// Takes over the engine and puts every endpoint in its starting state:
    /// EP0 waiting for a SETUP, everything else idle.
    pub fn new(mut hw: H, trace: T) -> Self {
        hw.enable(Interrupts::NORMAL);
        hw.set_descriptor(Bd::Ep0Out, BufferDescriptor::setup());
        hw.set_descriptor(Bd::Ep0In, BufferDescriptor::idle(0));
        hw.set_descriptor(Bd::Ep1Out, BufferDescriptor::idle(EP_BUFFER_SIZE as u8));
        *hw.buffer(Bd::Ep1In) = [0; EP_BUFFER_SIZE];
        hw.set_descriptor(Bd::Ep1In, BufferDescriptor::idle(REPORT_SIZE as u8));
        Self {
            hw,
            trace,
            control: ControlEngine::new(),
            report: ReportEngine::new(),
        }
    }

    /// Interrupt handler body. Deals with each cause that is both flagged
    /// and enabled, in priority order, then acknowledges everything so that
    /// causes we don't care about can't keep the interrupt asserted.
    ///
    /// At most one completed transaction is handled per call. If the
    /// hardware has more queued, it raises the interrupt again.
    pub fn service(&mut self) {
        if self.active(Interrupts::BUS_RESET) {
            self.handle(BusEvent::BusReset);
            // Whatever was in flight belonged to the session that just
            // ended.
            self.hw.clear(Interrupts::all());
        }
        if self.active(Interrupts::TRANSACTION) {
            let status = self.hw.transaction();
            self.handle(BusEvent::TransactionComplete(status));
        }
        if self.active(Interrupts::ERROR) {
            self.handle(BusEvent::Error);
        }
        if self.active(Interrupts::IDLE) {
            self.handle(BusEvent::Idle);
        }
        if self.active(Interrupts::ACTIVITY) {
            self.handle(BusEvent::Resume);
        }
        self.hw.clear(Interrupts::all());
    }

    fn active(&self, cause: Interrupts) -> bool {
        (self.hw.pending() & self.hw.enabled()).contains(cause)
    }

    /// Performs the one action that goes with `event`. Doesn't acknowledge
    /// anything in the hardware except where the action itself requires it.
    pub fn handle(&mut self, event: BusEvent) {
        match event {
            BusEvent::BusReset => {
                debug!("bus reset");
                self.trace.debug_str(b"R\r\n");
                self.control.reset();
                self.report.reset();
                self.hw.set_address(0);
                self.hw.set_descriptor(Bd::Ep0Out, BufferDescriptor::setup());
            }
            BusEvent::TransactionComplete(status) => match status.endpoint() {
                0 => self.control.transaction_complete(
                    &mut self.hw,
                    &mut self.trace,
                    status.direction(),
                    self.report.report(),
                ),
                1 => self.report.transaction_complete(&mut self.hw, &mut self.trace),
                ep => warn!("transaction on unknown endpoint {=u8}", ep),
            },
            // Nothing to recover. The host retries at its level.
            BusEvent::Error => self.hw.clear_errors(),
            BusEvent::Idle => {
                debug!("suspend");
                self.hw.suspend();
                self.hw.clear(Interrupts::all());
                self.hw.enable(Interrupts::ACTIVITY);
                self.hw.sleep();
            }
            BusEvent::Resume => {
                debug!("resume");
                self.hw.resume();
                self.hw.enable(Interrupts::NORMAL);
            }
        }
    }

    /// The foreground has a new report for the host.
    pub fn report_changed(&mut self, report: GamepadReport) {
        self.report.report_changed(&mut self.hw, report);
    }

    pub fn state(&self) -> DeviceState {
        self.control.state()
    }

    pub fn control(&self) -> &ControlEngine {
        &self.control
    }

    pub fn reports(&self) -> &ReportEngine {
        &self.report
    }

    pub fn hw(&self) -> &H {
        &self.hw
    }

    pub fn hw_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn trace_mut(&mut self) -> &mut T {
        &mut self.trace
    }
}

/// A [`UsbDevice`] that can sit in a `static` and be reached from both the
/// interrupt handler and the foreground loop.
///
/// Every access runs inside a critical section, so the foreground can never
/// see (or leave behind) half an update to the report state, and the
/// interrupt handler can never run in the middle of one.
pub struct SharedDevice<H: Sie, T: Trace> {
    inner: Mutex<RefCell<Option<UsbDevice<H, T>>>>,
}

impl<H: Sie, T: Trace> SharedDevice<H, T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Puts `device` in place, returning whatever was there.
    pub fn install(&self, device: UsbDevice<H, T>) -> Option<UsbDevice<H, T>> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).replace(device))
    }

    /// Call from the USB interrupt. Does nothing before `install`.
    pub fn on_interrupt(&self) {
        self.with(UsbDevice::service);
    }

    /// Hands a new report to the device. Returns `false` if there is no
    /// device yet.
    pub fn report_changed(&self, report: GamepadReport) -> bool {
        self.with(|dev| dev.report_changed(report)).is_some()
    }

    /// Runs `f` on the device inside a critical section.
    pub fn with<R>(&self, f: impl FnOnce(&mut UsbDevice<H, T>) -> R) -> Option<R> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).as_mut().map(f))
    }
}

impl<H: Sie, T: Trace> Default for SharedDevice<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

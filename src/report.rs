// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Endpoint 1, interrupt IN: input reports.
//!
//! There's no queue. The host only ever needs the newest report, so a report
//! that arrives while the previous one is still waiting to be polled just
//! replaces it and goes out as soon as the endpoint frees up.

use crate::bdt::{Bd, BufferDescriptor, Toggle};
use crate::config::REPORT_SIZE;
use crate::gamepad::GamepadReport;
use crate::sie::Sie;
use crate::trace::Trace;

#[derive(Debug, Default)]
pub struct ReportEngine {
    report: GamepadReport,
    /// A report came in while the endpoint was busy.
    pending: bool,
    toggle: Toggle,
}

impl ReportEngine {
    pub const fn new() -> Self {
        Self {
            report: GamepadReport::from_bytes([0; REPORT_SIZE]),
            pending: false,
            toggle: Toggle::Data0,
        }
    }

    /// The latest report, sent or not.
    pub fn report(&self) -> &GamepadReport {
        &self.report
    }

    pub fn pending(&self) -> bool {
        self.pending
    }

    pub fn toggle(&self) -> Toggle {
        self.toggle
    }

    /// Drops any waiting report and restarts the toggle. The report itself
    /// is kept, since the buttons haven't changed just because the bus did.
    pub fn reset(&mut self) {
        self.pending = false;
        self.toggle = Toggle::Data0;
    }

    /// Takes a new report. If the endpoint is free it's armed right away,
    /// otherwise the report waits for the one in flight to go out.
    pub fn report_changed(&mut self, hw: &mut impl Sie, report: GamepadReport) {
        self.report = report;
        if hw.descriptor(Bd::Ep1In).owned_by_hardware() {
            self.pending = true;
        } else {
            self.transmit(hw);
        }
    }

    /// The host picked up the report we armed.
    pub fn transaction_complete(&mut self, hw: &mut impl Sie, trace: &mut impl Trace) {
        if self.pending {
            trace.debug_write(b'_');
            self.transmit(hw);
        } else {
            trace.debug_write(b'-');
        }
    }

    fn transmit(&mut self, hw: &mut impl Sie) {
        let bytes = self.report.bytes();
        hw.buffer(Bd::Ep1In)[..REPORT_SIZE].copy_from_slice(&bytes);
        hw.set_descriptor(Bd::Ep1In, BufferDescriptor::data(REPORT_SIZE, self.toggle));
        self.toggle = self.toggle.flip();
        self.pending = false;
    }
}

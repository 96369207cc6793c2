// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Control transfer errors.
//!
//! None of these are fatal. Every one of them ends the same way: both
//! directions of endpoint 0 get stalled, and the host recovers by sending a
//! fresh SETUP.

use core::fmt;

use crate::usb::RequestKind;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlError {
    /// A request code we don't implement, or a request type (vendor,
    /// reserved) we never implement.
    UnsupportedRequest { kind: RequestKind, code: u8 },
    /// GET_DESCRIPTOR for a descriptor type we don't have.
    UnsupportedDescriptor(u8),
    /// The SETUP buffer could not be read as a setup packet.
    MalformedSetup,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::UnsupportedRequest { kind, code } => {
                write!(f, "unsupported {:?} request {:#04x}", kind, code)
            }
            ControlError::UnsupportedDescriptor(ty) => {
                write!(f, "unsupported descriptor type {:#04x}", ty)
            }
            ControlError::MalformedSetup => f.write_str("malformed setup packet"),
        }
    }
}

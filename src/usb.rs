// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! USB structure and constant definitions.
//!
//! Only the parts of chapter 9 (and the HID class spec) that this device
//! actually speaks are here.

use byteorder::LittleEndian;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use zerocopy::{AsBytes, FromBytes, Unaligned, U16};

use crate::error::ControlError;

/// USB deals in two different transfer directions, called OUT (host-to-device)
/// and IN (device-to-host). In the vast majority of cases, OUT is represented
/// by a 0 bit, and IN by an `0x80` bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Out = 0,
    In = 0x80,
}

impl Direction {
    pub const fn endpoint(self, num: u8) -> u8 {
        num | self as u8
    }
}

/// Layout of an 8-byte USB SETUP packet.
#[repr(C)]
#[derive(Debug, AsBytes, FromBytes, Unaligned)]
pub struct SetupPacket {
    /// Bit 7 is the data stage direction, bits 6..5 the request kind (see
    /// `RequestKind`), bits 4..0 the recipient.
    pub request_type: u8,
    /// Request code, interpreted according to the request kind.
    pub request: u8,
    /// A simple argument of up to 16 bits, specific to the request.
    pub value: U16<LittleEndian>,
    /// Interface or endpoint the request is aimed at. We have one of each and
    /// never look at it.
    pub index: U16<LittleEndian>,
    /// If data will be transferred after this request (in the direction given
    /// by `request_type`), this gives the number of bytes (OUT) or maximum
    /// number of bytes (IN).
    pub length: U16<LittleEndian>,
}

impl SetupPacket {
    pub fn kind(&self) -> RequestKind {
        RequestKind::from_request_type(self.request_type)
    }

    /// Sorts the request code into the standard or HID request space, so
    /// that the two sets of codes can never be mistaken for one another.
    pub fn decode(&self) -> Result<Request, ControlError> {
        let kind = self.kind();
        let unsupported = ControlError::UnsupportedRequest {
            kind,
            code: self.request,
        };
        match kind {
            RequestKind::Standard => StandardRequest::from_u8(self.request)
                .map(Request::Standard)
                .ok_or(unsupported),
            RequestKind::Class => HidRequest::from_u8(self.request)
                .map(Request::Hid)
                .ok_or(unsupported),
            RequestKind::Vendor | RequestKind::Reserved => Err(unsupported),
        }
    }
}

/// Bits 6..5 of `bmRequestType`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

impl RequestKind {
    pub const fn from_request_type(request_type: u8) -> Self {
        match (request_type >> 5) & 0b11 {
            0 => Self::Standard,
            1 => Self::Class,
            2 => Self::Vendor,
            _ => Self::Reserved,
        }
    }
}

/// A request code that has been placed in its proper space.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    Standard(StandardRequest),
    Hid(HidRequest),
}

/// Chapter 9 request codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StandardRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    /// Notifies the device that it's being moved to a different address on the
    /// bus. Always an OUT.
    SetAddress = 0x05,
    /// Asks the device to send a certain descriptor back to the host. Always
    /// used on an IN request.
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    /// Configures a device by choosing one of the options listed in its
    /// descriptors. Always an OUT.
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}

/// HID class request codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HidRequest {
    GetReport = 0x01,
    GetIdle = 0x02,
    GetProtocol = 0x03,
    SetReport = 0x09,
    SetIdle = 0x0A,
    SetProtocol = 0x0B,
}

/// Types of USB descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, AsBytes)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DescriptorType {
    Device = 0x01,
    Configuration = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
    Hid = 0x21,
    Report = 0x22,
}

/// Types of transfer that can be indicated by the `attributes` field on
/// `EndpointDescriptor`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, AsBytes)]
#[repr(u8)]
pub enum TransferType {
    Interrupt = 3,
}

/// Describes a device. This is the most broad description in USB and is
/// typically the first thing the host asks for.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct DeviceDescriptor {
    /// Length of this structure, must be 18.
    pub length: u8,
    /// Type of this descriptor, must be `Device`.
    pub descriptor_type: DescriptorType,
    /// Version of the USB protocol, in binary-coded decimal.
    pub bcd_usb: U16<LittleEndian>,
    /// Class of device, giving a broad functional area. Zero defers to the
    /// interface.
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    /// Maximum packet size on endpoint 0.
    pub max_packet_size0: u8,
    pub vendor: U16<LittleEndian>,
    pub product: U16<LittleEndian>,
    /// Device version number, as BCD again.
    pub bcd_device: U16<LittleEndian>,
    /// Indices into the string descriptor table.
    pub manufacturer_s: u8,
    pub product_s: u8,
    pub serial_s: u8,
    pub num_configurations: u8,
}

/// Description of a single available device configuration.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct ConfigurationDescriptor {
    /// Length of this structure, must be 9.
    pub length: u8,
    /// Type of this descriptor, must be `Configuration`.
    pub descriptor_type: DescriptorType,
    /// Total length of all descriptors in this configuration, concatenated.
    pub total_length: U16<LittleEndian>,
    pub num_interfaces: u8,
    /// Number to use when requesting this configuration via a
    /// `SetConfiguration` request.
    pub configuration_value: u8,
    pub configuration_s: u8,
    /// Self-powered and remote-wakeup bits.
    pub attributes: u8,
    /// Maximum device power consumption in units of 2mA.
    pub max_power: u8,
}

/// Description of an interface within a configuration.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct InterfaceDescriptor {
    /// Length of this structure, must be 9.
    pub length: u8,
    /// Type of this descriptor, must be `Interface`.
    pub descriptor_type: DescriptorType,
    pub interface_number: u8,
    pub alternate_setting: u8,
    /// Number of endpoint descriptors in this interface, not counting EP0.
    pub num_endpoints: u8,
    /// Interface class code; 3 is HID.
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub interface_s: u8,
}

/// HID class descriptor, sitting between the interface and its endpoints.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct HidDescriptor {
    /// Length of this structure, 9 with a single subordinate descriptor.
    pub length: u8,
    /// Type of this descriptor, must be `Hid`.
    pub descriptor_type: DescriptorType,
    /// HID spec release, BCD.
    pub bcd_hid: U16<LittleEndian>,
    pub country_code: u8,
    pub num_descriptors: u8,
    /// Type of the subordinate descriptor, `Report` here.
    pub report_type: DescriptorType,
    pub report_length: U16<LittleEndian>,
}

/// Describes an endpoint within an interface.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct EndpointDescriptor {
    /// Length of this struct, must be 7.
    pub length: u8,
    /// Type of this descriptor, must be `Endpoint`.
    pub descriptor_type: DescriptorType,
    /// Address of this endpoint, where the bottom 4 bits give the endpoint
    /// number (0..15) and the top bit distinguishes IN (1) from OUT (0).
    pub endpoint_address: u8,
    /// Transfer type in the bottom 2 bits, from `TransferType`.
    pub attributes: TransferType,
    pub max_packet_size: U16<LittleEndian>,
    /// Polling interval in milliseconds.
    pub interval: u8,
}

/// Builds a little-endian `U16` in a `const` context.
pub const fn le16(x: u16) -> U16<LittleEndian> {
    U16::from_bytes(x.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::LayoutVerified;

    fn parse(bytes: &[u8; 8]) -> &SetupPacket {
        LayoutVerified::<_, SetupPacket>::new(&bytes[..])
            .unwrap()
            .into_ref()
    }

    #[test]
    fn endpoint_addresses() {
        assert_eq!(Direction::In.endpoint(1), 0x81);
        assert_eq!(Direction::Out.endpoint(0), 0x00);
    }

    #[test]
    fn setup_fields_are_little_endian() {
        let setup = parse(&[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00]);
        assert_eq!(setup.value.get(), 0x0100);
        assert_eq!(setup.length.get(), 64);
        assert_eq!(
            setup.decode(),
            Ok(Request::Standard(StandardRequest::GetDescriptor))
        );
    }

    #[test]
    fn class_and_standard_codes_do_not_collide() {
        // 0x09 is SET_CONFIGURATION as a standard request, SET_REPORT as a
        // class request.
        let standard = parse(&[0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let class = parse(&[0x21, 0x09, 0x00, 0x02, 0x00, 0x00, 0x02, 0x00]);
        assert_eq!(
            standard.decode(),
            Ok(Request::Standard(StandardRequest::SetConfiguration))
        );
        assert_eq!(class.decode(), Ok(Request::Hid(HidRequest::SetReport)));
    }

    #[test]
    fn vendor_requests_are_unsupported() {
        let vendor = parse(&[0xC0, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]);
        assert_eq!(
            vendor.decode(),
            Err(ControlError::UnsupportedRequest {
                kind: RequestKind::Vendor,
                code: 0x06,
            })
        );
    }

    #[test]
    fn unknown_codes_are_unsupported() {
        let class = parse(&[0xA1, 0x42, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(class.decode().is_err());
        let standard = parse(&[0x80, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(standard.decode().is_err());
    }
}

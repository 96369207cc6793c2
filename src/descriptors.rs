// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Descriptor repository.
//!
//! Everything the host can read with GET_DESCRIPTOR, as static bytes that
//! never change for the life of the program.

use core::mem::size_of;

use num_traits::FromPrimitive;
use zerocopy::AsBytes;

use crate::config;
use crate::usb::{
    le16, ConfigurationDescriptor, DescriptorType, DeviceDescriptor, Direction,
    EndpointDescriptor, HidDescriptor, InterfaceDescriptor, TransferType,
};

/// The configuration descriptor and everything nested under it, in the order
/// the host expects to receive them.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct ConfigurationBundle {
    pub configuration: ConfigurationDescriptor,
    pub interface: InterfaceDescriptor,
    pub hid: HidDescriptor,
    pub endpoint: EndpointDescriptor,
}

/// Address of the interrupt IN endpoint carrying reports.
pub const REPORT_ENDPOINT: u8 = Direction::In.endpoint(1);

pub static DEVICE_DESCRIPTOR: DeviceDescriptor = DeviceDescriptor {
    length: size_of::<DeviceDescriptor>() as u8,
    descriptor_type: DescriptorType::Device,
    bcd_usb: le16(0x0200),
    device_class: 0,
    device_subclass: 0,
    device_protocol: 0,
    max_packet_size0: config::EP0_MAX_PACKET as u8,
    vendor: le16(config::USB_VENDOR_ID),
    product: le16(config::USB_PRODUCT_ID),
    bcd_device: le16(config::USB_DEVICE_RELEASE),
    manufacturer_s: 1,
    product_s: 2,
    serial_s: 3,
    num_configurations: 1,
};

pub static CONFIGURATION: ConfigurationBundle = ConfigurationBundle {
    configuration: ConfigurationDescriptor {
        length: size_of::<ConfigurationDescriptor>() as u8,
        descriptor_type: DescriptorType::Configuration,
        total_length: le16(size_of::<ConfigurationBundle>() as u16),
        num_interfaces: 1,
        configuration_value: 1,
        configuration_s: 0,
        attributes: 0,
        max_power: config::USB_MAX_POWER,
    },
    interface: InterfaceDescriptor {
        length: size_of::<InterfaceDescriptor>() as u8,
        descriptor_type: DescriptorType::Interface,
        interface_number: 0,
        alternate_setting: 0,
        num_endpoints: 1,
        interface_class: 0x03,
        interface_subclass: 0,
        interface_protocol: 0,
        interface_s: 0,
    },
    hid: HidDescriptor {
        length: size_of::<HidDescriptor>() as u8,
        descriptor_type: DescriptorType::Hid,
        bcd_hid: le16(0x0110),
        country_code: 0,
        num_descriptors: 1,
        report_type: DescriptorType::Report,
        report_length: le16(REPORT_DESCRIPTOR.len() as u16),
    },
    endpoint: EndpointDescriptor {
        length: size_of::<EndpointDescriptor>() as u8,
        descriptor_type: DescriptorType::Endpoint,
        endpoint_address: REPORT_ENDPOINT,
        attributes: TransferType::Interrupt,
        max_packet_size: le16(config::EP_BUFFER_SIZE as u16),
        interval: config::REPORT_POLL_INTERVAL_MS,
    },
};

/// A game pad with a 2-bit X/Y pointer, four bits of padding, six buttons,
/// and Start/Select.
pub static REPORT_DESCRIPTOR: [u8; 60] = [
    0x05, 0x01, // USAGE_PAGE (Generic Desktop)
    0x09, 0x05, // USAGE (Game Pad)
    0xa1, 0x01, //   COLLECTION (Application)
    0x09, 0x01, //   USAGE (Pointer)
    0xa1, 0x00, //   COLLECTION (Physical)
    0x09, 0x30, //     USAGE (X)
    0x09, 0x31, //     USAGE (Y)
    0x15, 0xff, //     LOGICAL_MINIMUM (-1)
    0x25, 0x01, //     LOGICAL_MAXIMUM (1)
    0x75, 0x02, //     REPORT_SIZE (2)
    0x95, 0x02, //     REPORT_COUNT (2)
    0x81, 0x02, //     INPUT (Data,Var,Abs)
    0xc0, //         END_COLLECTION
    0x75, 0x01, //   REPORT_SIZE (1)
    0x95, 0x04, //   REPORT_COUNT (4)
    0x81, 0x03, //   INPUT (Cnst,Var,Abs)
    0x05, 0x09, //   USAGE_PAGE (Button)
    0x19, 0x01, //   USAGE_MINIMUM (Button 1)
    0x29, 0x06, //   USAGE_MAXIMUM (Button 6)
    0x15, 0x00, //   LOGICAL_MINIMUM (0)
    0x25, 0x01, //   LOGICAL_MAXIMUM (1)
    0x75, 0x01, //   REPORT_SIZE (1)
    0x95, 0x06, //   REPORT_COUNT (6)
    0x81, 0x02, //   INPUT (Data,Var,Abs)
    0x05, 0x01, //   USAGE_PAGE (Generic Desktop)
    0x09, 0x3d, //   USAGE (Start)
    0x09, 0x3e, //   USAGE (Select)
    0x75, 0x01, //   REPORT_SIZE (1)
    0x95, 0x02, //   REPORT_COUNT (2)
    0x81, 0x02, //   INPUT (Data,Var,Abs)
    0xc0, //       END_COLLECTION
];

const LANG_ID: [u8; 2] = config::USB_LANGUAGE_ID.to_le_bytes();

pub static LANGUAGE_DESCRIPTOR: [u8; 4] = [4, DescriptorType::String as u8, LANG_ID[0], LANG_ID[1]];

pub static MANUFACTURER_DESCRIPTOR: [u8; string_len(config::USB_MANUFACTURER)] =
    string_descriptor(config::USB_MANUFACTURER);
pub static PRODUCT_DESCRIPTOR: [u8; string_len(config::USB_PRODUCT)] =
    string_descriptor(config::USB_PRODUCT);
pub static SERIAL_DESCRIPTOR: [u8; string_len(config::USB_SERIAL_NUMBER)] =
    string_descriptor(config::USB_SERIAL_NUMBER);

/// String descriptors by index. Index 0 is the language table, the rest line
/// up with the `*_s` fields of the device descriptor.
pub static STRINGS: [&[u8]; 4] = [
    &LANGUAGE_DESCRIPTOR,
    &MANUFACTURER_DESCRIPTOR,
    &PRODUCT_DESCRIPTOR,
    &SERIAL_DESCRIPTOR,
];

/// Size of the string descriptor for an ASCII string: a two byte header,
/// then two bytes per character.
pub const fn string_len(s: &str) -> usize {
    2 + 2 * s.len()
}

/// Widens an ASCII string to UTF-16LE and puts the descriptor header on it.
pub const fn string_descriptor<const N: usize>(s: &str) -> [u8; N] {
    let bytes = s.as_bytes();
    assert!(N == string_len(s) && N <= u8::MAX as usize);
    let mut out = [0; N];
    out[0] = N as u8;
    out[1] = DescriptorType::String as u8;
    let mut i = 0;
    while i < bytes.len() {
        out[2 + 2 * i] = bytes[i];
        i += 1;
    }
    out
}

/// What GET_DESCRIPTOR found.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// The descriptor exists; these are all of its bytes.
    Found(&'static [u8]),
    /// A string index past the end of the table. Answered with zero bytes
    /// rather than a stall.
    NoSuchString,
}

impl Lookup {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Lookup::Found(bytes) => bytes,
            Lookup::NoSuchString => &[],
        }
    }
}

/// Finds the descriptor for a GET_DESCRIPTOR request. `None` means the type
/// isn't one we serve, which the caller turns into a stall.
pub fn lookup(descriptor_type: u8, index: u8) -> Option<Lookup> {
    match DescriptorType::from_u8(descriptor_type)? {
        DescriptorType::Device => Some(Lookup::Found(DEVICE_DESCRIPTOR.as_bytes())),
        DescriptorType::Configuration => Some(Lookup::Found(CONFIGURATION.as_bytes())),
        DescriptorType::Report => Some(Lookup::Found(&REPORT_DESCRIPTOR)),
        DescriptorType::String => Some(
            STRINGS
                .get(usize::from(index))
                .map_or(Lookup::NoSuchString, |s| Lookup::Found(*s)),
        ),
        DescriptorType::Interface | DescriptorType::Endpoint | DescriptorType::Hid => None,
    }
}

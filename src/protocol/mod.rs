// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Wire layouts of the driver buffers. All integers are little endian.
//!
//! Drivers implementing [`DeviceIo`](crate::driver::DeviceIo) use the same types to produce
//! their responses.

use crate::api::MAX_NAME_SIZE;
use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};

bitflags! {
    /// Presence and state flags of a [`DeviceRecord`].
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceFlags: u32 {
        const ADDRESS = 0x01;
        const COD = 0x02;
        const NAME = 0x04;
        const PAIRED = 0x08;
        const PERSONAL = 0x10;
        const CONNECTED = 0x20;
    }
}

bitflags! {
    /// Flags of a local radio, also used as the flag identifier of a set-flag request.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct RadioFlags: u32 {
        const DISCOVERABLE = 0x1;
        const CONNECTABLE = 0x2;
    }
}

/// A fixed size record with a little-endian layout.
pub trait WireRecord: Sized {
    const SIZE: usize;

    fn encode(&self, buf: &mut BytesMut);

    /// Reads exactly `SIZE` bytes. Callers guarantee `buf.remaining() >= SIZE`.
    fn decode(buf: &mut &[u8]) -> Self;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf);
        buf.to_vec()
    }

    fn from_bytes(mut bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self::decode(&mut bytes))
    }
}

/// A device as the driver describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub flags: DeviceFlags,
    pub address: u64,
    pub class_of_device: u32,
    /// NUL padded, not necessarily NUL terminated.
    pub name: [u8; MAX_NAME_SIZE],
}

impl Default for DeviceRecord {
    fn default() -> Self {
        DeviceRecord {
            flags: DeviceFlags::empty(),
            address: 0,
            class_of_device: 0,
            name: [0; MAX_NAME_SIZE],
        }
    }
}

impl DeviceRecord {
    /// Stores `name`, truncated to the record's capacity.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; MAX_NAME_SIZE];
        let len = name.len().min(MAX_NAME_SIZE);
        self.name[..len].copy_from_slice(&name.as_bytes()[..len]);
    }

    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_SIZE);
        &self.name[..end]
    }
}

impl WireRecord for DeviceRecord {
    const SIZE: usize = 4 + 8 + 4 + MAX_NAME_SIZE;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.flags.bits());
        buf.put_u64_le(self.address);
        buf.put_u32_le(self.class_of_device);
        buf.put_slice(&self.name);
    }

    fn decode(buf: &mut &[u8]) -> Self {
        let flags = DeviceFlags::from_bits_retain(buf.get_u32_le());
        let address = buf.get_u64_le();
        let class_of_device = buf.get_u32_le();
        let mut name = [0; MAX_NAME_SIZE];
        buf.copy_to_slice(&mut name);
        DeviceRecord {
            flags,
            address,
            class_of_device,
            name,
        }
    }
}

/// Size of the element count that heads every list response.
pub const LIST_HEADER_SIZE: usize = 4;

/// Buffer size of a list response holding `count` elements, `None` on overflow.
pub fn list_size<T: WireRecord>(count: usize) -> Option<usize> {
    count
        .checked_mul(T::SIZE)
        .and_then(|size| size.checked_add(LIST_HEADER_SIZE))
}

/// Element count reported in a list response header.
pub fn list_count(mut buf: &[u8]) -> u32 {
    if buf.len() < LIST_HEADER_SIZE {
        return 0;
    }
    buf.get_u32_le()
}

/// Decodes the first `count` elements of a list response.
pub fn decode_list<T: WireRecord>(buf: &[u8], count: usize) -> Vec<T> {
    let mut body = buf.get(LIST_HEADER_SIZE..).unwrap_or_default();
    let available = body.len() / T::SIZE;
    (0..count.min(available)).map(|_| T::decode(&mut body)).collect()
}

/// Writes a list response for `elements` into `output`, as much as fits. The header always
/// carries the full element count. Returns the bytes written and whether everything fit.
pub fn encode_list<T: WireRecord>(elements: &[T], output: &mut [u8]) -> (usize, bool) {
    let mut buf = BytesMut::with_capacity(LIST_HEADER_SIZE + elements.len() * T::SIZE);
    buf.put_u32_le(elements.len() as u32);
    for element in elements {
        element.encode(&mut buf);
    }
    let fits = buf.len() <= output.len();
    let fitting_elements = output.len().saturating_sub(LIST_HEADER_SIZE) / T::SIZE;
    let written = if fits {
        buf.len()
    } else {
        (LIST_HEADER_SIZE + fitting_elements.min(elements.len()) * T::SIZE).min(output.len())
    };
    output[..written].copy_from_slice(&buf[..written]);
    (written, fits)
}

/// Response of a local-radio-info request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalRadioInfo {
    pub local: DeviceRecord,
    pub flags: RadioFlags,
    pub hci_revision: u16,
    pub hci_version: u8,
    pub lmp_features: u64,
    pub manufacturer: u16,
    pub lmp_subversion: u16,
    pub lmp_version: u8,
}

impl WireRecord for LocalRadioInfo {
    const SIZE: usize = DeviceRecord::SIZE + 4 + 2 + 1 + 8 + 2 + 2 + 1;

    fn encode(&self, buf: &mut BytesMut) {
        self.local.encode(buf);
        buf.put_u32_le(self.flags.bits());
        buf.put_u16_le(self.hci_revision);
        buf.put_u8(self.hci_version);
        buf.put_u64_le(self.lmp_features);
        buf.put_u16_le(self.manufacturer);
        buf.put_u16_le(self.lmp_subversion);
        buf.put_u8(self.lmp_version);
    }

    fn decode(buf: &mut &[u8]) -> Self {
        LocalRadioInfo {
            local: DeviceRecord::decode(buf),
            flags: RadioFlags::from_bits_retain(buf.get_u32_le()),
            hci_revision: buf.get_u16_le(),
            hci_version: buf.get_u8(),
            lmp_features: buf.get_u64_le(),
            manufacturer: buf.get_u16_le(),
            lmp_subversion: buf.get_u16_le(),
            lmp_version: buf.get_u8(),
        }
    }
}

/// Input of a set-flag request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetFlagParams {
    pub flag: RadioFlags,
    pub enable: bool,
}

impl WireRecord for SetFlagParams {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.flag.bits());
        buf.put_u32_le(self.enable as u32);
    }

    fn decode(buf: &mut &[u8]) -> Self {
        SetFlagParams {
            flag: RadioFlags::from_bits_retain(buf.get_u32_le()),
            enable: buf.get_u32_le() != 0,
        }
    }
}

const AUTH_RESPONSE_NEGATIVE: u32 = 0x1;
const AUTH_RESPONSE_AUTHENTICATED: u32 = 0x2;

/// Input and output of a send-auth-response request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthResponseParams {
    pub address: u64,
    pub method: u32,
    pub numeric_value: u32,
    pub negative: bool,
    /// Output only: whether the driver accepted the response.
    pub authenticated: bool,
}

impl WireRecord for AuthResponseParams {
    const SIZE: usize = 8 + 4 + 4 + 4;

    fn encode(&self, buf: &mut BytesMut) {
        let mut flags = 0;
        if self.negative {
            flags |= AUTH_RESPONSE_NEGATIVE;
        }
        if self.authenticated {
            flags |= AUTH_RESPONSE_AUTHENTICATED;
        }
        buf.put_u64_le(self.address);
        buf.put_u32_le(self.method);
        buf.put_u32_le(self.numeric_value);
        buf.put_u32_le(flags);
    }

    fn decode(buf: &mut &[u8]) -> Self {
        let address = buf.get_u64_le();
        let method = buf.get_u32_le();
        let numeric_value = buf.get_u32_le();
        let flags = buf.get_u32_le();
        AuthResponseParams {
            address,
            method,
            numeric_value,
            negative: flags & AUTH_RESPONSE_NEGATIVE != 0,
            authenticated: flags & AUTH_RESPONSE_AUTHENTICATED != 0,
        }
    }
}

/// Payload of an authentication request event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequestEvent {
    pub device: DeviceRecord,
    pub method: u32,
    pub numeric_value: u32,
}

impl WireRecord for AuthRequestEvent {
    const SIZE: usize = DeviceRecord::SIZE + 4 + 4;

    fn encode(&self, buf: &mut BytesMut) {
        self.device.encode(buf);
        buf.put_u32_le(self.method);
        buf.put_u32_le(self.numeric_value);
    }

    fn decode(buf: &mut &[u8]) -> Self {
        AuthRequestEvent {
            device: DeviceRecord::decode(buf),
            method: buf.get_u32_le(),
            numeric_value: buf.get_u32_le(),
        }
    }
}

/// Input of remove-device and start-authentication requests.
pub fn encode_address(address: u64) -> Vec<u8> {
    address.to_le_bytes().to_vec()
}

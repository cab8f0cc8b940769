// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The `api` module contains the caller-facing data types of bthplug: device and radio
//! records, search parameters, and the records exchanged during authentication.

pub(crate) mod bdaddr;

pub use self::bdaddr::{BDAddr, ParseBDAddrError};

use crate::radio::Radio;
use chrono::NaiveDateTime;
#[cfg(feature = "serde")]
use serde_cr::{Deserialize, Serialize};

/// Maximum length in bytes of a device or radio name.
pub const MAX_NAME_SIZE: usize = 248;

/// Largest accepted inquiry timeout multiplier.
pub const MAX_INQUIRY_TIMEOUT_MULTIPLIER: u8 = 48;

/// The class of device bitfield reported for local radios and remote devices.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassOfDevice(pub u32);

impl ClassOfDevice {
    /// Major service classes (bits 13 to 23).
    pub fn services(&self) -> u16 {
        ((self.0 & 0x00ff_e000) >> 13) as u16
    }

    /// Major device class (bits 8 to 12).
    pub fn major(&self) -> u8 {
        ((self.0 & 0x1f00) >> 8) as u8
    }

    /// Minor device class (bits 2 to 7).
    pub fn minor(&self) -> u8 {
        ((self.0 & 0xfc) >> 2) as u8
    }
}

impl From<u32> for ClassOfDevice {
    fn from(value: u32) -> Self {
        ClassOfDevice(value)
    }
}

/// A remote device as reported by a local radio.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Zero when the driver did not report an address.
    pub address: BDAddr,
    pub class_of_device: ClassOfDevice,
    pub connected: bool,
    /// The device is known to the radio ("personal") rather than just seen.
    pub remembered: bool,
    /// The device is paired.
    pub authenticated: bool,
    /// Unset unless the operation that produced the record stamps it.
    pub last_seen: Option<NaiveDateTime>,
    pub last_used: Option<NaiveDateTime>,
    pub name: String,
}

/// Information about a local radio.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RadioInfo {
    pub address: BDAddr,
    pub name: String,
    pub class_of_device: ClassOfDevice,
    pub lmp_subversion: u16,
    pub manufacturer: u16,
}

/// Which devices a [`DeviceFind`](crate::device::DeviceFind) returns and how they are found.
///
/// Devices are returned if they match any of the requested categories.
#[derive(Debug, Clone)]
pub struct DeviceSearchParams {
    /// Declared structure size, checked against [`DeviceSearchParams::SIZE`]. Set by
    /// [`Default`]; anything else is rejected as a revision mismatch.
    pub size: u32,
    pub return_authenticated: bool,
    pub return_remembered: bool,
    pub return_unknown: bool,
    pub return_connected: bool,
    pub issue_inquiry: bool,
    /// Inquiry duration in units of 1.28 seconds, at most
    /// [`MAX_INQUIRY_TIMEOUT_MULTIPLIER`].
    pub timeout_multiplier: u8,
    /// The radio to search on. `None` lists devices of every local radio, which is only
    /// possible without an inquiry.
    pub radio: Option<Radio>,
}

impl DeviceSearchParams {
    pub const SIZE: u32 = 40;
}

impl Default for DeviceSearchParams {
    fn default() -> Self {
        DeviceSearchParams {
            size: Self::SIZE,
            return_authenticated: false,
            return_remembered: false,
            return_unknown: false,
            return_connected: false,
            issue_inquiry: false,
            timeout_multiplier: 0,
            radio: None,
        }
    }
}

/// The pairing method of an authentication request or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthenticationMethod {
    Legacy,
    OutOfBand,
    NumericComparison,
    PasskeyNotification,
    Passkey,
    /// A value the driver or caller used that is not a known method.
    Unknown(u32),
}

impl AuthenticationMethod {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => AuthenticationMethod::Legacy,
            2 => AuthenticationMethod::OutOfBand,
            3 => AuthenticationMethod::NumericComparison,
            4 => AuthenticationMethod::PasskeyNotification,
            5 => AuthenticationMethod::Passkey,
            x => AuthenticationMethod::Unknown(x),
        }
    }

    pub fn raw(&self) -> u32 {
        match *self {
            AuthenticationMethod::Legacy => 1,
            AuthenticationMethod::OutOfBand => 2,
            AuthenticationMethod::NumericComparison => 3,
            AuthenticationMethod::PasskeyNotification => 4,
            AuthenticationMethod::Passkey => 5,
            AuthenticationMethod::Unknown(x) => x,
        }
    }
}

/// IO capability of the remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoCapability {
    DisplayOnly,
    DisplayYesNo,
    KeyboardOnly,
    NoInputNoOutput,
    Undefined,
}

/// Man-in-the-middle protection and bonding requirements of an authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthenticationRequirements {
    MitmProtectionNotRequired,
    MitmProtectionRequired,
    MitmProtectionNotRequiredBonding,
    MitmProtectionRequiredBonding,
    MitmProtectionNotRequiredGeneralBonding,
    MitmProtectionRequiredGeneralBonding,
    MitmProtectionNotDefined,
}

/// Passed to authentication callbacks for every matching authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationCallbackParams {
    /// The requesting device. `last_seen` and `last_used` carry the local time at which the
    /// callback ran.
    pub device_info: DeviceInfo,
    pub method: AuthenticationMethod,
    pub io_capability: IoCapability,
    pub requirements: AuthenticationRequirements,
    /// The numeric comparison value or passkey, depending on `method`.
    pub numeric_value: u32,
}

/// The answer to an authentication request, sent with
/// [`Manager::send_authentication_response`](crate::Manager::send_authentication_response).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResponse {
    pub remote_address: BDAddr,
    pub method: AuthenticationMethod,
    /// The numeric comparison value being confirmed.
    pub numeric_value: u32,
    /// Reject the pairing instead of confirming it.
    pub negative: bool,
}

// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Bluetooth device address, as exchanged with the driver and shown to callers.

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

/// A 48 bit Bluetooth device address.
///
/// `address[0]` is the most significant byte, which is also the first group of the textual
/// form. The driver carries addresses as the low 48 bits of a `u64`; the [`From`] conversions
/// translate between both.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct BDAddr {
    address: [u8; 6],
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ParseBDAddrError {
    #[error("Bluetooth address has to be 6 bytes long")]
    IncorrectByteCount,
    #[error("Invalid digit in address: {0}")]
    InvalidDigit(#[from] std::num::ParseIntError),
}

impl BDAddr {
    /// The all-zero address, which never names a real device.
    pub const ZERO: BDAddr = BDAddr { address: [0; 6] };

    pub const fn new(address: [u8; 6]) -> Self {
        Self { address }
    }

    pub fn into_inner(self) -> [u8; 6] {
        self.address
    }

    pub fn is_zero(&self) -> bool {
        self.address == [0; 6]
    }

    fn parse_groups(s: &str) -> Result<Self, ParseBDAddrError> {
        let mut address = [0u8; 6];
        let mut groups = s.split(':');
        for byte in address.iter_mut() {
            let group = groups.next().ok_or(ParseBDAddrError::IncorrectByteCount)?;
            *byte = u8::from_str_radix(group, 16)?;
        }
        match groups.next() {
            Some(_) => Err(ParseBDAddrError::IncorrectByteCount),
            None => Ok(Self { address }),
        }
    }

    fn parse_packed(s: &str) -> Result<Self, ParseBDAddrError> {
        if s.len() != 12 || !s.is_ascii() {
            return Err(ParseBDAddrError::IncorrectByteCount);
        }
        let mut address = [0u8; 6];
        for (i, byte) in address.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)?;
        }
        Ok(Self { address })
    }

    /// Address without delimiters, lower case, as used in device paths.
    pub fn to_string_no_delim(&self) -> String {
        self.address.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl Display for BDAddr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let a = &self.address;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

impl Debug for BDAddr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

impl FromStr for BDAddr {
    type Err = ParseBDAddrError;

    /// Accepts `aa:bb:cc:dd:ee:ff` or `aabbccddeeff`, any hex digit case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            Self::parse_groups(s)
        } else {
            Self::parse_packed(s)
        }
    }
}

impl From<[u8; 6]> for BDAddr {
    fn from(address: [u8; 6]) -> Self {
        Self { address }
    }
}

impl From<u64> for BDAddr {
    /// Takes the low 48 bits; anything above is not part of an address.
    fn from(int: u64) -> Self {
        let mut address = [0; 6];
        address.copy_from_slice(&int.to_be_bytes()[2..]);
        Self { address }
    }
}

impl From<BDAddr> for u64 {
    fn from(addr: BDAddr) -> Self {
        let mut bytes = [0; 8];
        bytes[2..].copy_from_slice(&addr.address);
        u64::from_be_bytes(bytes)
    }
}

#[cfg(feature = "serde")]
pub(crate) mod serde {
    //! `BDAddr` is (de-)serialized in its colon-delimited textual form by default.

    use super::BDAddr;
    use serde_cr::{de, Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for BDAddr {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.to_string())
        }
    }

    impl<'de> Deserialize<'de> for BDAddr {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = <&str>::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        }
    }

    /// (De-)serializes a `BDAddr` as the `u64` the driver uses.
    pub mod bth_addr {
        use super::*;

        pub fn serialize<S: Serializer>(addr: &BDAddr, serializer: S) -> Result<S::Ok, S::Error> {
            u64::from(*addr).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BDAddr, D::Error> {
            Ok(u64::deserialize(deserializer)?.into())
        }
    }
}

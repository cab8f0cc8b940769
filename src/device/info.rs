// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Translation of driver records into caller-facing records.

use crate::api::{BDAddr, ClassOfDevice, DeviceInfo, RadioInfo};
use crate::protocol::{DeviceFlags, DeviceRecord, LocalRadioInfo};
use chrono::{Local, NaiveDateTime, Utc};

fn decode_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Fields whose presence flag is not set are left at their defaults; timestamps are never set.
pub(crate) fn device_info_from_record(record: &DeviceRecord) -> DeviceInfo {
    let flags = record.flags;
    DeviceInfo {
        address: if flags.contains(DeviceFlags::ADDRESS) {
            BDAddr::from(record.address)
        } else {
            BDAddr::ZERO
        },
        class_of_device: if flags.contains(DeviceFlags::COD) {
            ClassOfDevice(record.class_of_device)
        } else {
            ClassOfDevice::default()
        },
        connected: flags.contains(DeviceFlags::CONNECTED),
        remembered: flags.contains(DeviceFlags::PERSONAL),
        authenticated: flags.contains(DeviceFlags::PAIRED),
        last_seen: None,
        last_used: None,
        name: if flags.contains(DeviceFlags::NAME) {
            decode_name(record.name_bytes())
        } else {
            String::new()
        },
    }
}

pub(crate) fn radio_info_from_local(info: &LocalRadioInfo) -> RadioInfo {
    RadioInfo {
        address: BDAddr::from(info.local.address),
        name: decode_name(info.local.name_bytes()),
        class_of_device: ClassOfDevice(info.local.class_of_device),
        lmp_subversion: info.lmp_subversion,
        manufacturer: info.manufacturer,
    }
}

/// Current UTC time, used for device enumeration timestamps.
pub(crate) fn now_utc() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Current local time, used for authentication callback timestamps.
pub(crate) fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::device;

    #[test]
    fn flags_select_fields() {
        let mut record = device(
            0x0011_2233_4455,
            DeviceFlags::PAIRED | DeviceFlags::CONNECTED,
            "speaker",
        );
        record.class_of_device = 0x24_0414;
        record.flags |= DeviceFlags::COD;
        let info = device_info_from_record(&record);
        assert_eq!(info.address, BDAddr::from(0x0011_2233_4455));
        assert_eq!(info.class_of_device, ClassOfDevice(0x24_0414));
        assert!(info.authenticated);
        assert!(info.connected);
        assert!(!info.remembered);
        assert_eq!(info.name, "speaker");
        assert_eq!(info.last_seen, None);
        assert_eq!(info.last_used, None);

        record.flags = DeviceFlags::PERSONAL;
        let info = device_info_from_record(&record);
        assert!(info.address.is_zero());
        assert_eq!(info.class_of_device, ClassOfDevice::default());
        assert!(info.remembered);
        assert!(info.name.is_empty());
    }

    #[test]
    fn invalid_utf8_names_are_replaced() {
        let mut record = device(1, DeviceFlags::empty(), "");
        record.name[..3].copy_from_slice(&[b'a', 0xff, b'b']);
        assert_eq!(device_info_from_record(&record).name, "a\u{fffd}b");
    }
}

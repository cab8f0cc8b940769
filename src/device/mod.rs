// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Remote device enumeration, optionally preceded by an inquiry.

pub(crate) mod info;

use self::info::{device_info_from_record, now_utc};
use crate::api::{DeviceInfo, DeviceSearchParams, MAX_INQUIRY_TIMEOUT_MULTIPLIER};
use crate::protocol::{DeviceFlags, DeviceRecord};
use crate::radio::Radio;
use crate::{Config, Error, Manager, Result};
use log::{debug, error, warn};
use std::fmt::{self, Debug, Formatter};
use std::thread;
use std::time::Duration;

/// A cursor over the devices matching a [`DeviceSearchParams`], created by
/// [`Manager::find_first_device`](crate::Manager::find_first_device).
///
/// The device list is fetched once when the cursor is created; advancing only filters that
/// snapshot. After [`close`](DeviceFind::close) every call fails with [`Error::InvalidHandle`].
pub struct DeviceFind {
    params: DeviceSearchParams,
    devices: Option<Vec<DeviceRecord>>,
    index: usize,
}

impl Debug for DeviceFind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("DeviceFind")
            .field("index", &self.index)
            .field("devices", &self.devices.as_ref().map(Vec::len))
            .finish()
    }
}

impl DeviceFind {
    /// The next matching device, or [`Error::NoMoreItems`] once the snapshot is exhausted.
    pub fn next_device(&mut self) -> Result<DeviceInfo> {
        let devices = self.devices.as_ref().ok_or(Error::InvalidHandle)?;
        while let Some(record) = devices.get(self.index) {
            self.index += 1;
            if !matches_search(&self.params, record.flags) {
                continue;
            }
            let mut info = device_info_from_record(record);
            if stamps_last_seen(&self.params, &info) {
                info.last_seen = Some(now_utc());
            }
            return Ok(info);
        }
        Err(Error::NoMoreItems)
    }

    /// Releases the snapshot. Fails with [`Error::InvalidHandle`] if already closed.
    pub fn close(&mut self) -> Result<()> {
        self.devices.take().map(drop).ok_or(Error::InvalidHandle)
    }
}

impl Iterator for DeviceFind {
    type Item = DeviceInfo;

    fn next(&mut self) -> Option<DeviceInfo> {
        self.next_device().ok()
    }
}

/// A device matches if any requested category applies to it.
fn matches_search(params: &DeviceSearchParams, flags: DeviceFlags) -> bool {
    (params.return_authenticated && flags.contains(DeviceFlags::PAIRED))
        || (params.return_remembered && flags.contains(DeviceFlags::PERSONAL))
        || (params.return_unknown && !flags.contains(DeviceFlags::PERSONAL))
        || (params.return_connected && flags.contains(DeviceFlags::CONNECTED))
}

// Only devices just found by an inquiry and connected devices get a last-seen time; every
// other match keeps its timestamps unset.
fn stamps_last_seen(params: &DeviceSearchParams, info: &DeviceInfo) -> bool {
    (params.issue_inquiry && params.return_unknown && !info.remembered)
        || (params.return_connected && info.connected)
}

/// Checks `params` and returns how long a requested inquiry runs.
fn validate(params: &DeviceSearchParams, config: &Config) -> Result<Duration> {
    if params.size != DeviceSearchParams::SIZE {
        return Err(Error::RevisionMismatch {
            expected: DeviceSearchParams::SIZE,
            actual: params.size,
        });
    }
    if params.issue_inquiry && params.timeout_multiplier > MAX_INQUIRY_TIMEOUT_MULTIPLIER {
        return Err(Error::InvalidParameter(format!(
            "inquiry timeout multiplier {} exceeds {}",
            params.timeout_multiplier, MAX_INQUIRY_TIMEOUT_MULTIPLIER
        )));
    }
    if params.issue_inquiry && params.radio.is_none() {
        warn!("Inquiry without a radio is not supported");
        return Err(Error::NotImplemented(
            "inquiry on all local radios".into(),
        ));
    }
    if !params.issue_inquiry {
        return Ok(Duration::ZERO);
    }
    config
        .inquiry_duration(params.timeout_multiplier)
        .ok_or_else(|| {
            Error::InvalidParameter(format!(
                "inquiry of {} units of {:?} is too long",
                params.timeout_multiplier, config.inquiry_unit
            ))
        })
}

/// Runs an inquiry for `duration`. Failing to start aborts; failing to stop is only logged.
fn inquire(radio: &Radio, duration: Duration) -> Result<()> {
    radio.start_discovery()?;
    debug!("{:?}: inquiry running for {:?}", radio, duration);
    thread::sleep(duration);
    if let Err(e) = radio.stop_discovery() {
        error!("{:?}: failed to stop inquiry: {}", radio, e);
    }
    Ok(())
}

/// Device lists of every local radio, concatenated. Radios whose listing fails are skipped and
/// an enumeration failure ends the walk; the last failure is reported only if no radio could
/// be listed.
fn all_radio_devices(manager: &Manager) -> Result<Vec<DeviceRecord>> {
    let mut devices = Vec::new();
    let mut listed = false;
    let mut last_error = Error::NoMoreItems;
    for radio in manager.local_radios()? {
        let radio = match radio {
            Ok(radio) => radio,
            Err(e) => {
                debug!("Radio enumeration stopped: {}", e);
                last_error = e;
                break;
            }
        };
        match radio.devices() {
            Ok(mut list) => {
                listed = true;
                devices.append(&mut list);
            }
            Err(Error::NoMoreItems) => listed = true,
            Err(e) => {
                debug!("{:?}: cannot list devices: {}", radio, e);
                last_error = e;
            }
        }
    }
    match (listed, devices.is_empty()) {
        (false, _) => Err(last_error),
        (true, true) => Err(Error::NoMoreItems),
        (true, false) => Ok(devices),
    }
}

pub(crate) fn find_first(
    manager: &Manager,
    params: &DeviceSearchParams,
) -> Result<(DeviceFind, DeviceInfo)> {
    let inquiry = validate(params, manager.config())?;
    let devices = match &params.radio {
        Some(radio) => {
            if params.issue_inquiry {
                inquire(radio, inquiry)?;
            }
            radio.devices()?
        }
        None => all_radio_devices(manager)?,
    };
    debug!("Searching {} devices", devices.len());
    let mut find = DeviceFind {
        params: params.clone(),
        devices: Some(devices),
        index: 0,
    };
    let first = find.next_device()?;
    Ok((find, first))
}

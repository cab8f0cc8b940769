// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Local radios: enumeration and the operations that apply to a single radio.

use crate::api::{BDAddr, DeviceInfo, RadioInfo};
use crate::common::control;
use crate::device::info::{device_info_from_record, radio_info_from_local};
use crate::driver::{
    ControlCode, DeviceHandle, Driver, InterfaceSet, BTHPORT_INTERFACE_CLASS,
};
use crate::protocol::{self, DeviceRecord, LocalRadioInfo, RadioFlags, SetFlagParams, WireRecord};
use crate::{Error, Result};
use log::{debug, trace};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// An opened local radio. Clones share the same device handle, which is closed when the last
/// clone is dropped.
#[derive(Clone)]
pub struct Radio {
    handle: DeviceHandle,
    path: Arc<str>,
    max_list_attempts: usize,
}

impl Debug for Radio {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Radio").field("path", &self.path).finish()
    }
}

impl Radio {
    pub(crate) fn new(handle: DeviceHandle, path: &str, max_list_attempts: usize) -> Self {
        Radio {
            handle,
            path: path.into(),
            max_list_attempts,
        }
    }

    /// The device path the radio was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    fn local_info(&self) -> Result<LocalRadioInfo> {
        control::query(&*self.handle, ControlCode::GetLocalRadioInfo, &[])
    }

    /// Address, name and hardware details of the radio.
    pub fn info(&self) -> Result<RadioInfo> {
        Ok(radio_info_from_local(&self.local_info()?))
    }

    /// Whether the radio accepts incoming connections.
    pub fn is_connectable(&self) -> Result<bool> {
        Ok(self.local_info()?.flags.contains(RadioFlags::CONNECTABLE))
    }

    /// Whether the radio answers inquiries.
    pub fn is_discoverable(&self) -> Result<bool> {
        Ok(self.local_info()?.flags.contains(RadioFlags::DISCOVERABLE))
    }

    /// Enables or disables incoming connections. A discoverable radio cannot be made
    /// non-connectable; disable discovery first.
    pub fn set_connectable(&self, enable: bool) -> Result<()> {
        if !enable && self.is_discoverable()? {
            return Err(Error::InvalidState(
                "a discoverable radio must stay connectable".into(),
            ));
        }
        self.set_flag(RadioFlags::CONNECTABLE, enable)
    }

    /// Enables or disables discoverability. Only a connectable radio can be made discoverable.
    pub fn set_discoverable(&self, enable: bool) -> Result<()> {
        if enable && !self.is_connectable()? {
            return Err(Error::InvalidState(
                "only a connectable radio can be discoverable".into(),
            ));
        }
        self.set_flag(RadioFlags::DISCOVERABLE, enable)
    }

    fn set_flag(&self, flag: RadioFlags, enable: bool) -> Result<()> {
        let params = SetFlagParams { flag, enable };
        control::send(
            &*self.handle,
            ControlCode::SetLocalFlag,
            &params.to_bytes(),
            &mut [],
        )?;
        debug!("{:?}: set {:?} to {}", self, flag, enable);
        Ok(())
    }

    /// The device list currently known to the radio. Never empty: an empty list is
    /// [`Error::NoMoreItems`].
    pub(crate) fn devices(&self) -> Result<Vec<DeviceRecord>> {
        control::query_list(&*self.handle, ControlCode::GetDeviceList, self.max_list_attempts)
    }

    /// The remote device with `address`, as the radio knows it.
    pub fn device_info(&self, address: BDAddr) -> Result<DeviceInfo> {
        let devices = match self.devices() {
            Err(Error::NoMoreItems) => return Err(Error::DeviceNotFound),
            other => other?,
        };
        devices
            .iter()
            .find(|record| BDAddr::from(record.address) == address)
            .map(device_info_from_record)
            .ok_or(Error::DeviceNotFound)
    }

    pub(crate) fn start_discovery(&self) -> Result<()> {
        control::send(&*self.handle, ControlCode::StartDiscovery, &[], &mut [])?;
        Ok(())
    }

    pub(crate) fn stop_discovery(&self) -> Result<()> {
        control::send(&*self.handle, ControlCode::StopDiscovery, &[], &mut [])?;
        Ok(())
    }

    pub(crate) fn remove_device(&self, address: BDAddr) -> Result<()> {
        let input = protocol::encode_address(address.into());
        control::send(&*self.handle, ControlCode::RemoveDevice, &input, &mut [])?;
        Ok(())
    }

    /// Starts pairing with `address` and blocks until the driver completes the request.
    pub(crate) fn authenticate(&self, address: BDAddr) -> Result<()> {
        trace!("{:?}: authenticating {}", self, address);
        let pending = self.handle.control_overlapped(
            ControlCode::StartAuthentication,
            protocol::encode_address(address.into()),
            0,
        );
        futures::executor::block_on(pending)?;
        Ok(())
    }
}

/// A cursor over the local radios, created by
/// [`Manager::find_first_radio`](crate::Manager::find_first_radio).
///
/// Interfaces that cannot be resolved to a path, or whose path cannot be opened, are skipped.
/// After [`close`](RadioFind::close) every call fails with [`Error::InvalidHandle`].
pub struct RadioFind {
    driver: Arc<dyn Driver>,
    interfaces: Option<Box<dyn InterfaceSet>>,
    index: u32,
    max_list_attempts: usize,
    failed: bool,
}

impl Debug for RadioFind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("RadioFind")
            .field("index", &self.index)
            .field("open", &self.interfaces.is_some())
            .finish()
    }
}

impl RadioFind {
    pub(crate) fn open(driver: Arc<dyn Driver>, max_list_attempts: usize) -> Result<Self> {
        let interfaces = driver.interfaces(BTHPORT_INTERFACE_CLASS)?;
        Ok(RadioFind {
            driver,
            interfaces: Some(interfaces),
            index: 0,
            max_list_attempts,
            failed: false,
        })
    }

    /// Opens the next radio, or fails with [`Error::NoMoreItems`] once all were returned.
    pub fn next_radio(&mut self) -> Result<Radio> {
        let interfaces = self.interfaces.as_mut().ok_or(Error::InvalidHandle)?;
        loop {
            let index = self.index;
            self.index += 1;
            let interface = interfaces.interface(index)?.ok_or(Error::NoMoreItems)?;
            let path = match interfaces.device_path(&interface) {
                Ok(path) => path,
                Err(e) => {
                    debug!("Skipping radio interface {}: {}", interface.instance_id, e);
                    continue;
                }
            };
            match self.driver.open(&path) {
                Ok(handle) => return Ok(Radio::new(handle, &path, self.max_list_attempts)),
                Err(e) => debug!("Skipping radio {}: {}", path, e),
            }
        }
    }

    /// Releases the enumeration. Fails with [`Error::InvalidHandle`] if already closed.
    pub fn close(&mut self) -> Result<()> {
        self.interfaces.take().map(drop).ok_or(Error::InvalidHandle)
    }
}

impl Iterator for RadioFind {
    type Item = Result<Radio>;

    /// Ends at the last radio, after the first error, or once closed.
    fn next(&mut self) -> Option<Result<Radio>> {
        if self.failed {
            return None;
        }
        match self.next_radio() {
            Ok(radio) => Some(Ok(radio)),
            Err(Error::NoMoreItems) | Err(Error::InvalidHandle) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

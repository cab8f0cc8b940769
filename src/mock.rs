// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! In-memory driver and worker pools for unit tests.

use crate::common::worker::{Job, Rejected, WorkerPool};
use crate::config::DEFAULT_AUTH_CHANNEL_PATH;
use crate::driver::{
    ControlCode, DeviceHandle, DeviceIo, Driver, DriverError, Interface, InterfaceSet,
    Notification, NotificationCallback, NotificationToken, AUTHENTICATION_REQUEST_EVENT,
    BTHPORT_INTERFACE_CLASS,
};
use crate::protocol::{
    self, AuthRequestEvent, AuthResponseParams, DeviceFlags, DeviceRecord, LocalRadioInfo,
    RadioFlags, SetFlagParams, WireRecord,
};
use crate::{Config, Manager};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub(crate) const MANUFACTURER: u16 = 0x000f;
const LMP_SUBVERSION: u16 = 0x2209;
const INVALID_PARAMETER: DriverError = DriverError::Status(0x57);

/// A device record with its address and name marked present.
pub(crate) fn device(address: u64, flags: DeviceFlags, name: &str) -> DeviceRecord {
    let mut record = DeviceRecord {
        flags: flags | DeviceFlags::ADDRESS | DeviceFlags::NAME,
        address,
        ..DeviceRecord::default()
    };
    record.set_name(name);
    record
}

pub(crate) fn auth_request(address: u64, method: u32, numeric_value: u32) -> AuthRequestEvent {
    AuthRequestEvent {
        device: device(address, DeviceFlags::empty(), ""),
        method,
        numeric_value,
    }
}

fn write_record<T: WireRecord>(record: &T, output: &mut [u8]) -> Result<usize, DriverError> {
    let bytes = record.to_bytes();
    if output.len() < bytes.len() {
        return Err(DriverError::BufferTooSmall);
    }
    output[..bytes.len()].copy_from_slice(&bytes);
    Ok(bytes.len())
}

fn read_address(input: &[u8]) -> Result<u64, DriverError> {
    let bytes: [u8; 8] = input.try_into().map_err(|_| INVALID_PARAMETER)?;
    Ok(u64::from_le_bytes(bytes))
}

#[derive(Default)]
struct RadioState {
    name: String,
    flags: RadioFlags,
    devices: Vec<DeviceRecord>,
    requests: Vec<ControlCode>,
    failures: HashMap<ControlCode, DriverError>,
    accept_auth: bool,
    auth_responses: Vec<AuthResponseParams>,
    removed: Vec<u64>,
    authenticated: Vec<u64>,
}

/// A scripted radio that records every control request it receives.
pub(crate) struct FakeRadio {
    address: u64,
    state: Mutex<RadioState>,
}

impl Debug for FakeRadio {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "FakeRadio({:#014x})", self.address)
    }
}

impl FakeRadio {
    pub(crate) fn new(address: u64) -> Arc<Self> {
        Arc::new(FakeRadio {
            address,
            state: Mutex::new(RadioState::default()),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RadioState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn requests(&self) -> Vec<ControlCode> {
        self.state().requests.clone()
    }

    pub(crate) fn clear_requests(&self) {
        self.state().requests.clear();
    }

    /// Makes every `code` request fail with `error`.
    pub(crate) fn fail(&self, code: ControlCode, error: DriverError) {
        self.state().failures.insert(code, error);
    }

    pub(crate) fn set_name(&self, name: &str) {
        self.state().name = name.to_string();
    }

    pub(crate) fn set_devices(&self, devices: Vec<DeviceRecord>) {
        self.state().devices = devices;
    }

    pub(crate) fn flags(&self) -> RadioFlags {
        self.state().flags
    }

    pub(crate) fn set_flags(&self, flags: RadioFlags) {
        self.state().flags = flags;
    }

    /// Whether authentication responses are reported as authenticated.
    pub(crate) fn accept_auth(&self, accept: bool) {
        self.state().accept_auth = accept;
    }

    pub(crate) fn auth_responses(&self) -> Vec<AuthResponseParams> {
        self.state().auth_responses.clone()
    }

    pub(crate) fn removed(&self) -> Vec<u64> {
        self.state().removed.clone()
    }

    pub(crate) fn authenticated(&self) -> Vec<u64> {
        self.state().authenticated.clone()
    }
}

impl DeviceIo for FakeRadio {
    fn control(
        &self,
        code: ControlCode,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, DriverError> {
        let mut state = self.state();
        state.requests.push(code);
        if let Some(error) = state.failures.get(&code) {
            return Err(error.clone());
        }
        match code {
            ControlCode::GetLocalRadioInfo => {
                let mut local = device(self.address, DeviceFlags::COD, &state.name);
                local.class_of_device = 0x00_010c;
                let info = LocalRadioInfo {
                    local,
                    flags: state.flags,
                    manufacturer: MANUFACTURER,
                    lmp_subversion: LMP_SUBVERSION,
                    ..LocalRadioInfo::default()
                };
                write_record(&info, output)
            }
            ControlCode::GetDeviceList => match protocol::encode_list(&state.devices, output) {
                (written, true) => Ok(written),
                (_, false) => Err(DriverError::BufferTooSmall),
            },
            ControlCode::StartDiscovery | ControlCode::StopDiscovery => Ok(0),
            ControlCode::SetLocalFlag => {
                let params = SetFlagParams::from_bytes(input).ok_or(INVALID_PARAMETER)?;
                state.flags.set(params.flag, params.enable);
                Ok(0)
            }
            ControlCode::SendAuthResponse => {
                let mut params = AuthResponseParams::from_bytes(input).ok_or(INVALID_PARAMETER)?;
                params.authenticated = state.accept_auth && !params.negative;
                state.auth_responses.push(params);
                write_record(&params, output)
            }
            ControlCode::RemoveDevice => {
                let address = read_address(input)?;
                let known = state.devices.len();
                state.devices.retain(|d| d.address != address);
                if state.devices.len() == known {
                    return Err(DriverError::NoDevice);
                }
                state.removed.push(address);
                Ok(0)
            }
            ControlCode::StartAuthentication => {
                let address = read_address(input)?;
                state.authenticated.push(address);
                Ok(0)
            }
            ControlCode::RegisterAuthNotifications => Err(DriverError::NotSupported),
        }
    }
}

/// The driver's authentication channel.
#[derive(Debug, Default)]
struct AuthChannel {
    registrations: AtomicUsize,
    failure: Mutex<Option<DriverError>>,
}

impl DeviceIo for AuthChannel {
    fn control(
        &self,
        code: ControlCode,
        _input: &[u8],
        _output: &mut [u8],
    ) -> Result<usize, DriverError> {
        if code != ControlCode::RegisterAuthNotifications {
            return Err(DriverError::NotSupported);
        }
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

/// One entry of the fake device topology.
pub(crate) enum Slot {
    Radio(Arc<FakeRadio>),
    /// An interface whose device path cannot be resolved.
    Unresolvable,
    /// An interface whose device path cannot be opened.
    Unopenable,
    /// The enumeration itself fails at this index.
    Broken(DriverError),
}

#[derive(Clone)]
enum SlotKind {
    Resolvable,
    Unresolvable,
    Broken(DriverError),
}

fn radio_path(index: usize) -> String {
    format!(r"\\?\BTHPORT#RADIO#{}", index)
}

struct FakeInterfaces {
    slots: Vec<SlotKind>,
}

impl InterfaceSet for FakeInterfaces {
    fn interface(&mut self, index: u32) -> Result<Option<Interface>, DriverError> {
        match self.slots.get(index as usize) {
            None => Ok(None),
            Some(SlotKind::Broken(error)) => Err(error.clone()),
            Some(_) => Ok(Some(Interface {
                class: BTHPORT_INTERFACE_CLASS,
                index,
                instance_id: format!(r"USB\VID_0A12&PID_0001\{}", index),
            })),
        }
    }

    fn device_path(&mut self, interface: &Interface) -> Result<String, DriverError> {
        match self.slots.get(interface.index as usize) {
            Some(SlotKind::Resolvable) => Ok(radio_path(interface.index as usize)),
            _ => Err(DriverError::NoDevice),
        }
    }
}

#[derive(Default)]
struct Hub {
    next_token: u64,
    subscriptions: BTreeMap<u64, NotificationCallback>,
    subscribed: usize,
    unsubscribed: usize,
}

/// An in-memory [`Driver`] over a fixed list of radios and an authentication channel.
pub(crate) struct FakeDriver {
    slots: Vec<Slot>,
    auth_channel: Arc<AuthChannel>,
    hub: Mutex<Hub>,
}

impl Debug for FakeDriver {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("FakeDriver")
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl FakeDriver {
    pub(crate) fn new(slots: Vec<Slot>) -> Arc<Self> {
        Arc::new(FakeDriver {
            slots,
            auth_channel: Arc::new(AuthChannel::default()),
            hub: Mutex::new(Hub::default()),
        })
    }

    /// Makes the register-for-notifications request on the auth channel fail.
    pub(crate) fn fail_auth_channel(&self, error: DriverError) {
        *self.auth_channel.failure.lock().unwrap() = Some(error);
    }

    pub(crate) fn auth_channel_registrations(&self) -> usize {
        self.auth_channel.registrations.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribe_count(&self) -> usize {
        self.hub.lock().unwrap().subscribed
    }

    pub(crate) fn unsubscribe_count(&self) -> usize {
        self.hub.lock().unwrap().unsubscribed
    }

    pub(crate) fn active_subscriptions(&self) -> usize {
        self.hub.lock().unwrap().subscriptions.len()
    }

    /// Raises an authentication request event, delivered synchronously on this thread.
    pub(crate) fn notify(&self, request: &AuthRequestEvent) {
        let data = request.to_bytes();
        self.notify_raw(Notification::CustomEvent {
            event: AUTHENTICATION_REQUEST_EVENT,
            data: &data,
        });
    }

    pub(crate) fn notify_raw(&self, notification: Notification<'_>) {
        let callbacks: Vec<NotificationCallback> =
            self.hub.lock().unwrap().subscriptions.values().cloned().collect();
        for callback in callbacks {
            callback(notification);
        }
    }
}

impl Driver for FakeDriver {
    fn interfaces(&self, class: Uuid) -> Result<Box<dyn InterfaceSet>, DriverError> {
        let slots = if class == BTHPORT_INTERFACE_CLASS {
            self.slots
                .iter()
                .map(|slot| match slot {
                    Slot::Radio(_) | Slot::Unopenable => SlotKind::Resolvable,
                    Slot::Unresolvable => SlotKind::Unresolvable,
                    Slot::Broken(error) => SlotKind::Broken(error.clone()),
                })
                .collect()
        } else {
            vec![]
        };
        Ok(Box::new(FakeInterfaces { slots }))
    }

    fn open(&self, path: &str) -> Result<DeviceHandle, DriverError> {
        if path == DEFAULT_AUTH_CHANNEL_PATH {
            return Ok(self.auth_channel.clone());
        }
        let slot = (0..self.slots.len())
            .find(|&index| radio_path(index) == path)
            .map(|index| &self.slots[index]);
        match slot {
            Some(Slot::Radio(radio)) => Ok(radio.clone()),
            Some(Slot::Unopenable) => Err(DriverError::AccessDenied),
            _ => Err(DriverError::NoDevice),
        }
    }

    fn register_notification(
        &self,
        _target: &DeviceHandle,
        callback: NotificationCallback,
    ) -> Result<NotificationToken, DriverError> {
        let mut hub = self.hub.lock().unwrap();
        hub.next_token += 1;
        hub.subscribed += 1;
        let token = hub.next_token;
        hub.subscriptions.insert(token, callback);
        Ok(NotificationToken(token))
    }

    fn unregister_notification(&self, token: NotificationToken) -> Result<(), DriverError> {
        let mut hub = self.hub.lock().unwrap();
        hub.unsubscribed += 1;
        hub.subscriptions
            .remove(&token.0)
            .map(drop)
            .ok_or(INVALID_PARAMETER)
    }
}

/// Runs jobs on the submitting thread.
#[derive(Debug, Default)]
pub(crate) struct InlinePool {
    submitted: AtomicUsize,
}

impl InlinePool {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(InlinePool::default())
    }

    pub(crate) fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

impl WorkerPool for InlinePool {
    fn submit(&self, job: Job) -> Result<(), Rejected> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        job();
        Ok(())
    }
}

/// Rejects the first submissions, then runs jobs inline.
#[derive(Debug)]
pub(crate) struct RejectingPool {
    remaining: AtomicUsize,
    rejected: AtomicUsize,
}

impl RejectingPool {
    pub(crate) fn new(reject: usize) -> Arc<Self> {
        Arc::new(RejectingPool {
            remaining: AtomicUsize::new(reject),
            rejected: AtomicUsize::new(0),
        })
    }

    pub(crate) fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }
}

impl WorkerPool for RejectingPool {
    fn submit(&self, job: Job) -> Result<(), Rejected> {
        let reject = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if reject {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(Rejected("queue full".into()));
        }
        job();
        Ok(())
    }
}

/// A manager over `slots` with inline callbacks and a one millisecond inquiry unit.
pub(crate) fn manager(slots: Vec<Slot>) -> (Manager, Arc<FakeDriver>) {
    manager_with_config(
        slots,
        Config::default().with_inquiry_unit(Duration::from_millis(1)),
    )
}

pub(crate) fn manager_with_config(slots: Vec<Slot>, config: Config) -> (Manager, Arc<FakeDriver>) {
    let driver = FakeDriver::new(slots);
    let manager = Manager::with_worker_pool(driver.clone(), config, InlinePool::new());
    (manager, driver)
}

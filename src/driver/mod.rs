// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Contracts of the collaborators bthplug is built on.
//!
//! A [`Driver`] gives access to the operating system side of the Bluetooth stack: it enumerates
//! device interfaces of a class, opens device paths into [`DeviceHandle`]s, and delivers custom
//! device events through registered notification callbacks. A [`DeviceIo`] is an opened device:
//! a radio, or the driver's authentication channel. All buffers exchanged through
//! [`DeviceIo::control`] use the little-endian layouts of the `protocol` module.

use futures::future::{self, BoxFuture};
use std::fmt::Debug;
use std::sync::Arc;
use uuid::{uuid, Uuid};

/// Interface class under which local Bluetooth radios are published.
pub const BTHPORT_INTERFACE_CLASS: Uuid = uuid!("0850302a-b344-4fda-9be9-90576b8d46f0");

/// Custom event tag of authentication requests on the authentication channel.
pub const AUTHENTICATION_REQUEST_EVENT: Uuid = uuid!("ca67235f-f621-4224-85c0-8e4eb2a4c3ae");

/// Status of a failed control request or driver call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// The output buffer cannot hold the full response. For listing requests the driver
    /// still writes the element count into the response header.
    #[error("Output buffer too small")]
    BufferTooSmall,

    #[error("No such device")]
    NoDevice,

    #[error("Access denied")]
    AccessDenied,

    #[error("Operation not supported by the driver")]
    NotSupported,

    #[error("Driver status {0:#010x}")]
    Status(u32),
}

/// Requests understood by radios and the authentication channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCode {
    GetLocalRadioInfo,
    GetDeviceList,
    StartDiscovery,
    StopDiscovery,
    SetLocalFlag,
    RegisterAuthNotifications,
    SendAuthResponse,
    StartAuthentication,
    RemoveDevice,
}

/// An opened device.
pub trait DeviceIo: Debug + Send + Sync {
    /// Issues a control request and waits for it. Returns the number of bytes written to
    /// `output`. On [`DriverError::BufferTooSmall`] the driver may still have written a
    /// partial response.
    fn control(
        &self,
        code: ControlCode,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, DriverError>;

    /// Issues a control request with overlapped completion. The returned future resolves
    /// to the response bytes once the driver completes the request.
    ///
    /// Drivers without overlapped support complete synchronously.
    fn control_overlapped(
        &self,
        code: ControlCode,
        input: Vec<u8>,
        output_len: usize,
    ) -> BoxFuture<'static, Result<Vec<u8>, DriverError>> {
        let mut output = vec![0; output_len];
        let result = self.control(code, &input, &mut output).map(|written| {
            output.truncate(written);
            output
        });
        Box::pin(future::ready(result))
    }
}

/// An opened device. Dropping the last clone closes it.
pub type DeviceHandle = Arc<dyn DeviceIo>;

/// One device interface yielded by an [`InterfaceSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub class: Uuid,
    pub index: u32,
    /// Driver specific identifier, resolved into a path by
    /// [`InterfaceSet::device_path`].
    pub instance_id: String,
}

/// A topology enumeration over the interfaces of one class. Dropping it releases the
/// enumeration.
pub trait InterfaceSet: Send {
    /// The interface at `index`, or `None` once the enumeration has no more interfaces.
    fn interface(&mut self, index: u32) -> Result<Option<Interface>, DriverError>;

    /// Resolves an interface to an openable device path.
    fn device_path(&mut self, interface: &Interface) -> Result<String, DriverError>;
}

/// An event delivered to a notification callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification<'a> {
    /// A custom event raised by the driver on the target device.
    CustomEvent { event: Uuid, data: &'a [u8] },
    QueryRemove,
    Removed,
    Other(u32),
}

/// Called by the notification facility, on a thread it owns.
pub type NotificationCallback = Arc<dyn Fn(Notification<'_>) + Send + Sync>;

/// Identifies a notification registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationToken(pub u64);

/// The operating system side of the Bluetooth stack.
pub trait Driver: Debug + Send + Sync {
    /// Starts a topology enumeration of the present interfaces of `class`.
    fn interfaces(&self, class: Uuid) -> Result<Box<dyn InterfaceSet>, DriverError>;

    /// Opens an existing device for shared read/write access.
    fn open(&self, path: &str) -> Result<DeviceHandle, DriverError>;

    /// Subscribes `callback` to events raised on `target`.
    fn register_notification(
        &self,
        target: &DeviceHandle,
        callback: NotificationCallback,
    ) -> Result<NotificationToken, DriverError>;

    /// Cancels a subscription. Callbacks already running may still complete; implementations
    /// must not wait for them, since this may be called while a callback holds a lock.
    fn unregister_notification(&self, token: NotificationToken) -> Result<(), DriverError>;
}

// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! bthplug is a library for local Bluetooth radio and remote device discovery, radio property
//! control and authentication (pairing) event dispatch.
//!
//! The library sits on top of a host-controller driver that it reaches through the contracts in
//! the [`driver`] module: a device topology enumerator, a control request channel on opened
//! device handles, and a notification facility for custom device events. Everything starts from
//! a [`Manager`], which owns the driver, the [`Config`], the worker pool used to run
//! authentication callbacks, and the registry of authentication listeners.
//!
//! # Usage
//!
//! ```no_run
//! # use std::sync::Arc;
//! # fn run(driver: Arc<dyn bthplug::driver::Driver>) -> bthplug::Result<()> {
//! use bthplug::api::DeviceSearchParams;
//! use bthplug::Manager;
//!
//! let manager = Manager::new(driver)?;
//! let (mut radios, radio) = manager.find_first_radio()?;
//! println!("radio {}", radio.info()?.address);
//! radios.close()?;
//!
//! let params = DeviceSearchParams {
//!     return_connected: true,
//!     radio: Some(radio),
//!     ..DeviceSearchParams::default()
//! };
//! let (devices, first) = manager.find_first_device(&params)?;
//! for device in std::iter::once(first).chain(devices) {
//!     println!("{} {}", device.address, device.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
mod common;
pub mod config;
pub mod device;
pub mod driver;
mod manager;
#[cfg(test)]
mod mock;
pub mod protocol;
pub mod radio;
#[cfg(feature = "serde")]
pub mod serde;

use std::result;

pub use common::worker::{Job, Rejected, RuntimePool, WorkerPool};
pub use config::Config;
pub use manager::Manager;

/// The main error type returned by most methods in bthplug.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Structure revision mismatch: expected size {expected}, got {actual}")]
    RevisionMismatch { expected: u32, actual: u32 },

    #[error("Invalid handle")]
    InvalidHandle,

    #[error("Out of memory")]
    OutOfMemory,

    #[error("No more items")]
    NoMoreItems,

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Device not found")]
    DeviceNotFound,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Radio state does not allow this change: {0}")]
    InvalidState(String),

    #[error("Invalid Bluetooth address: {0}")]
    InvalidBDAddr(#[from] api::ParseBDAddrError),

    #[error("Driver error: {0}")]
    Driver(#[from] driver::DriverError),

    #[error("{0}")]
    Other(String),
}

/// Convenience type for a result using the bthplug [`Error`] type.
pub type Result<T> = result::Result<T, Error>;

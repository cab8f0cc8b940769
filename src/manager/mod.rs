// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use crate::api::{
    AuthenticationCallbackParams, AuthenticationRequirements, AuthenticationResponse, BDAddr,
    DeviceInfo, DeviceSearchParams,
};
use crate::auth::{self, AuthRegistration, AuthRegistry};
use crate::common::worker::{RuntimePool, WorkerPool};
use crate::device::{self, DeviceFind};
use crate::driver::Driver;
use crate::radio::{Radio, RadioFind};
use crate::{Config, Error, Result};
use log::{debug, trace};
use static_assertions::assert_impl_all;
use std::sync::Arc;

/// The entry point of bthplug: owns the driver, the configuration, the worker pool running
/// authentication callbacks and the registry of authentication listeners.
///
/// Operations taking an `Option<&Radio>` apply to that radio, or with `None` try every local
/// radio in turn until one succeeds.
#[derive(Clone, Debug)]
pub struct Manager {
    driver: Arc<dyn Driver>,
    config: Arc<Config>,
    auth: Arc<AuthRegistry>,
}

assert_impl_all!(Manager: Send, Sync, Clone);
assert_impl_all!(Radio: Send, Sync, Clone);
assert_impl_all!(RadioFind: Send);
assert_impl_all!(DeviceFind: Send, Sync);
assert_impl_all!(BDAddr: Send, Sync, Copy);
assert_impl_all!(DeviceInfo: Send, Sync);

impl Manager {
    /// A manager with the default [`Config`].
    pub fn new(driver: Arc<dyn Driver>) -> Result<Self> {
        Self::with_config(driver, Config::default())
    }

    /// A manager whose authentication callbacks run on a [`RuntimePool`] sized from `config`.
    pub fn with_config(driver: Arc<dyn Driver>, config: Config) -> Result<Self> {
        let pool = RuntimePool::new(config.auth_workers, config.auth_queue_depth)?;
        Ok(Self::with_worker_pool(driver, config, Arc::new(pool)))
    }

    pub fn with_worker_pool(
        driver: Arc<dyn Driver>,
        config: Config,
        pool: Arc<dyn WorkerPool>,
    ) -> Self {
        let auth = AuthRegistry::new(driver.clone(), pool, &config.auth_channel_path);
        Manager {
            driver,
            config: Arc::new(config),
            auth: Arc::new(auth),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The registry of authentication listeners shared by all clones of this manager.
    pub fn auth_registry(&self) -> &AuthRegistry {
        &self.auth
    }

    pub(crate) fn local_radios(&self) -> Result<RadioFind> {
        RadioFind::open(self.driver.clone(), self.config.max_list_attempts)
    }

    /// Starts enumerating local radios, returning the cursor together with the first radio.
    /// Fails with [`Error::NoMoreItems`] if there is no radio.
    pub fn find_first_radio(&self) -> Result<(RadioFind, Radio)> {
        let mut radios = self.local_radios()?;
        let radio = radios.next_radio()?;
        debug!("Found first radio {:?}", radio);
        Ok((radios, radio))
    }

    /// Applies `op` to each local radio until it succeeds on one. Reports the last failure if it
    /// succeeds on none, or [`Error::NoMoreItems`] if there are no radios.
    fn on_first_radio<T>(&self, mut op: impl FnMut(&Radio) -> Result<T>) -> Result<T> {
        let mut last_error = Error::NoMoreItems;
        for radio in self.local_radios()? {
            let radio = radio?;
            match op(&radio) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!("{:?}: {}", radio, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn any_radio(&self, radio: Option<&Radio>, get: fn(&Radio) -> Result<bool>) -> bool {
        let result = match radio {
            Some(radio) => get(radio),
            None => self.on_first_radio(|radio| match get(radio) {
                Ok(true) => Ok(true),
                Ok(false) => Err(Error::NoMoreItems),
                Err(e) => Err(e),
            }),
        };
        result.unwrap_or_else(|e| {
            trace!("Radio property query: {}", e);
            false
        })
    }

    /// Whether `radio`, or with `None` any local radio, accepts incoming connections.
    /// Radios that cannot be queried count as not connectable.
    pub fn is_connectable(&self, radio: Option<&Radio>) -> bool {
        self.any_radio(radio, Radio::is_connectable)
    }

    /// Whether `radio`, or with `None` any local radio, is discoverable.
    pub fn is_discoverable(&self, radio: Option<&Radio>) -> bool {
        self.any_radio(radio, Radio::is_discoverable)
    }

    /// See [`Radio::set_connectable`].
    pub fn enable_incoming_connections(&self, radio: Option<&Radio>, enable: bool) -> Result<()> {
        match radio {
            Some(radio) => radio.set_connectable(enable),
            None => self.on_first_radio(|radio| radio.set_connectable(enable)),
        }
    }

    /// See [`Radio::set_discoverable`].
    pub fn enable_discovery(&self, radio: Option<&Radio>, enable: bool) -> Result<()> {
        match radio {
            Some(radio) => radio.set_discoverable(enable),
            None => self.on_first_radio(|radio| radio.set_discoverable(enable)),
        }
    }

    /// Starts a device search, returning the cursor together with the first matching device.
    ///
    /// With `params.issue_inquiry` the call blocks for the inquiry, `timeout_multiplier` units
    /// of [`Config::inquiry_unit`]. Inquiry needs an explicit radio. Without a radio and without
    /// inquiry, the devices known to all local radios are searched.
    pub fn find_first_device(
        &self,
        params: &DeviceSearchParams,
    ) -> Result<(DeviceFind, DeviceInfo)> {
        device::find_first(self, params)
    }

    /// Registers `callback` for authentication requests from `device`, or from every device
    /// with `None`. The listener stays registered until the returned registration is
    /// unregistered or dropped.
    pub fn register_authentication<F>(
        &self,
        device: Option<BDAddr>,
        callback: F,
    ) -> Result<AuthRegistration>
    where
        F: Fn(&AuthenticationCallbackParams) + Send + Sync + 'static,
    {
        self.auth.register(device, Arc::new(callback))
    }

    /// Answers an authentication request. Only numeric comparison is supported. Fails with
    /// [`Error::NotAuthenticated`] if the driver did not accept the response.
    pub fn send_authentication_response(
        &self,
        radio: Option<&Radio>,
        response: &AuthenticationResponse,
    ) -> Result<()> {
        auth::validate_response_method(response.method)?;
        match radio {
            Some(radio) => self.auth.send_response(radio, response),
            None => self.on_first_radio(|radio| self.auth.send_response(radio, response)),
        }
    }

    /// Removes a remembered device from every local radio that knows it. Fails with
    /// [`Error::DeviceNotFound`] if no radio removed it. An enumeration failure after a
    /// successful removal ends the walk without failing the call.
    pub fn remove_device(&self, address: BDAddr) -> Result<()> {
        if address.is_zero() {
            return Err(Error::DeviceNotFound);
        }
        let mut removed = false;
        for radio in self.local_radios()? {
            let radio = match radio {
                Ok(radio) => radio,
                Err(e) if removed => {
                    debug!("Radio enumeration stopped after removing {}: {}", address, e);
                    break;
                }
                Err(e) => return Err(e),
            };
            match radio.remove_device(address) {
                Ok(()) => {
                    debug!("{:?}: removed {}", radio, address);
                    removed = true;
                }
                Err(e) => trace!("{:?}: cannot remove {}: {}", radio, address, e),
            }
        }
        if removed {
            Ok(())
        } else {
            Err(Error::DeviceNotFound)
        }
    }

    /// Starts pairing with `address` and blocks until the driver completed the request.
    /// Pairing results are reported to authentication listeners.
    pub fn authenticate_device(
        &self,
        radio: Option<&Radio>,
        address: BDAddr,
        requirements: AuthenticationRequirements,
    ) -> Result<()> {
        if address.is_zero() {
            return Err(Error::InvalidParameter(
                "cannot authenticate the zero address".into(),
            ));
        }
        trace!("Authenticating {} with {:?}", address, requirements);
        match radio {
            Some(radio) => radio.authenticate(address),
            None => self.on_first_radio(|radio| radio.authenticate(address)),
        }
    }
}

// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Authentication (pairing) requests raised by the driver, and the responses sent back to it.
//!
//! The [`AuthRegistry`] owned by a [`Manager`](crate::Manager) holds every registered listener.
//! While at least one listener is registered the registry is subscribed to the driver's
//! authentication channel; every authentication request event is handed to each listener whose
//! filter matches, on a thread of the manager's [`WorkerPool`].

use crate::api::{
    AuthenticationCallbackParams, AuthenticationMethod, AuthenticationRequirements,
    AuthenticationResponse, BDAddr, IoCapability,
};
use crate::common::control;
use crate::common::worker::WorkerPool;
use crate::device::info::{device_info_from_record, now_local};
use crate::driver::{
    ControlCode, DeviceHandle, Driver, Notification, NotificationToken,
    AUTHENTICATION_REQUEST_EVENT,
};
use crate::protocol::{AuthRequestEvent, AuthResponseParams, WireRecord};
use crate::radio::Radio;
use crate::{Error, Result};
use log::{debug, error, trace, warn};
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Called once per matching authentication request, on a worker thread.
pub type AuthenticationCallback = Arc<dyn Fn(&AuthenticationCallbackParams) + Send + Sync>;

struct Listener {
    id: u64,
    /// `None` matches every device.
    filter: Option<BDAddr>,
    callback: AuthenticationCallback,
}

impl Listener {
    fn matches(&self, address: BDAddr) -> bool {
        self.filter.map_or(true, |filter| filter == address)
    }
}

struct Subscription {
    // Kept open for as long as the subscription lives.
    channel: DeviceHandle,
    token: NotificationToken,
}

#[derive(Default)]
struct Listeners {
    entries: Vec<Listener>,
    subscription: Option<Subscription>,
}

/// The listener registry. Mutations hold the lock exclusively, dispatch holds it shared.
pub struct AuthRegistry {
    driver: Arc<dyn Driver>,
    pool: Arc<dyn WorkerPool>,
    channel_path: String,
    state: RwLock<Listeners>,
    next_id: AtomicU64,
}

impl Debug for AuthRegistry {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut s = f.debug_struct("AuthRegistry");
        s.field("channel_path", &self.channel_path);
        if let Ok(state) = self.state.try_read() {
            s.field("listeners", &state.entries.len())
                .field("active", &state.subscription.is_some());
        }
        s.finish()
    }
}

impl AuthRegistry {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        pool: Arc<dyn WorkerPool>,
        channel_path: &str,
    ) -> Self {
        AuthRegistry {
            driver,
            pool,
            channel_path: channel_path.to_string(),
            state: RwLock::new(Listeners::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Listeners> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Listeners> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the registry is subscribed to the authentication channel.
    pub fn is_active(&self) -> bool {
        self.read().subscription.is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.read().entries.len()
    }

    /// Adds a listener, subscribing to the authentication channel if it is the first one.
    /// If subscribing fails nothing is registered and the registry stays inactive.
    pub(crate) fn register(
        self: &Arc<Self>,
        filter: Option<BDAddr>,
        callback: AuthenticationCallback,
    ) -> Result<AuthRegistration> {
        let mut state = self.write();
        state.entries.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        if state.subscription.is_none() {
            state.subscription = Some(self.subscribe()?);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        state.entries.push(Listener {
            id,
            filter,
            callback,
        });
        debug!(
            "Registered authentication listener {} for {}",
            id,
            filter.map_or_else(|| "all devices".to_string(), |a| a.to_string())
        );
        Ok(AuthRegistration {
            registry: Arc::downgrade(self),
            id,
            registered: true,
        })
    }

    fn subscribe(self: &Arc<Self>) -> Result<Subscription> {
        let channel = self.driver.open(&self.channel_path)?;
        let registry = Arc::downgrade(self);
        let token = self.driver.register_notification(
            &channel,
            Arc::new(move |notification: Notification<'_>| {
                if let Some(registry) = registry.upgrade() {
                    registry.on_notification(notification);
                }
            }),
        )?;
        if let Err(e) = control::send(
            &*channel,
            ControlCode::RegisterAuthNotifications,
            &[],
            &mut [],
        ) {
            self.release(token);
            return Err(e);
        }
        debug!("Subscribed to authentication channel {}", self.channel_path);
        Ok(Subscription { channel, token })
    }

    fn release(&self, token: NotificationToken) {
        if let Err(e) = self.driver.unregister_notification(token) {
            error!("Cannot unsubscribe from authentication channel: {}", e);
        }
    }

    fn unregister(&self, id: u64) -> Result<()> {
        let mut state = self.write();
        let position = state
            .entries
            .iter()
            .position(|listener| listener.id == id)
            .ok_or(Error::InvalidHandle)?;
        state.entries.remove(position);
        debug!("Unregistered authentication listener {}", id);
        if state.entries.is_empty() {
            if let Some(subscription) = state.subscription.take() {
                self.release(subscription.token);
                debug!(
                    "Unsubscribed from authentication channel {:?}",
                    subscription.channel
                );
            }
        }
        Ok(())
    }

    fn on_notification(&self, notification: Notification<'_>) {
        match notification {
            Notification::CustomEvent { event, data } if event == AUTHENTICATION_REQUEST_EVENT => {
                match AuthRequestEvent::from_bytes(data) {
                    Some(request) => self.dispatch(request),
                    None => warn!(
                        "Authentication request of {} bytes is too short",
                        data.len()
                    ),
                }
            }
            Notification::CustomEvent { event, .. } => {
                warn!("Ignoring unexpected custom event {}", event)
            }
            other => warn!("Ignoring unexpected notification {:?}", other),
        }
    }

    /// Hands `request` to every matching listener. A listener whose job is rejected by the
    /// pool misses this request; the others still get it.
    fn dispatch(&self, request: AuthRequestEvent) {
        let address = BDAddr::from(request.device.address);
        let request = Arc::new(request);
        let state = self.read();
        trace!(
            "Authentication request from {} for {} listeners",
            address,
            state.entries.len()
        );
        for listener in state.entries.iter().filter(|l| l.matches(address)) {
            let callback = listener.callback.clone();
            let request = request.clone();
            let job = Box::new(move || run_callback(&*callback, &request));
            if let Err(e) = self.pool.submit(job) {
                error!(
                    "Cannot dispatch authentication request from {} to listener {}: {}",
                    address, listener.id, e
                );
            }
        }
    }

    /// Sends `response` through `radio`. The method must already have been checked with
    /// [`validate_response_method`].
    pub(crate) fn send_response(
        &self,
        radio: &Radio,
        response: &AuthenticationResponse,
    ) -> Result<()> {
        // Held until the driver answered, so the registry cannot go inactive meanwhile.
        let state = self.read();
        if state.entries.is_empty() {
            return Err(Error::InvalidParameter(
                "no authentication listener is registered".into(),
            ));
        }
        let params = AuthResponseParams {
            address: response.remote_address.into(),
            method: response.method.raw(),
            numeric_value: response.numeric_value,
            negative: response.negative,
            authenticated: false,
        };
        let reply: AuthResponseParams = control::query(
            &**radio.handle(),
            ControlCode::SendAuthResponse,
            &params.to_bytes(),
        )?;
        drop(state);
        if reply.authenticated {
            debug!("{:?}: {} authenticated", radio, response.remote_address);
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }
}

impl Drop for AuthRegistry {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
        if let Some(subscription) = state.subscription.take() {
            self.release(subscription.token);
        }
    }
}

/// Only numeric comparison responses can be sent.
pub(crate) fn validate_response_method(method: AuthenticationMethod) -> Result<()> {
    match method {
        AuthenticationMethod::NumericComparison => Ok(()),
        AuthenticationMethod::Unknown(raw) => Err(Error::InvalidParameter(format!(
            "unknown authentication method {}",
            raw
        ))),
        other => {
            warn!("Authentication responses for {:?} are not supported", other);
            Err(Error::NotImplemented(format!(
                "{:?} authentication responses",
                other
            )))
        }
    }
}

fn run_callback(
    callback: &(dyn Fn(&AuthenticationCallbackParams) + Send + Sync),
    request: &AuthRequestEvent,
) {
    let mut device_info = device_info_from_record(&request.device);
    let now = now_local();
    device_info.last_seen = Some(now);
    device_info.last_used = Some(now);
    let params = AuthenticationCallbackParams {
        device_info,
        method: AuthenticationMethod::from_raw(request.method),
        io_capability: IoCapability::Undefined,
        requirements: AuthenticationRequirements::MitmProtectionNotDefined,
        numeric_value: request.numeric_value,
    };
    callback(&params);
}

/// A registered authentication listener, returned by
/// [`Manager::register_authentication`](crate::Manager::register_authentication).
///
/// Dropping the registration unregisters the listener.
#[must_use = "dropping the registration unregisters the listener"]
pub struct AuthRegistration {
    registry: Weak<AuthRegistry>,
    id: u64,
    registered: bool,
}

impl Debug for AuthRegistration {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("AuthRegistration")
            .field("id", &self.id)
            .finish()
    }
}

impl AuthRegistration {
    /// Removes the listener. Once the last listener is gone the registry unsubscribes from the
    /// authentication channel. Callbacks already dispatched still run.
    pub fn unregister(mut self) -> Result<()> {
        self.registered = false;
        self.registry
            .upgrade()
            .ok_or(Error::InvalidHandle)?
            .unregister(self.id)
    }
}

impl Drop for AuthRegistration {
    fn drop(&mut self) {
        if !self.registered {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            if let Err(e) = registry.unregister(self.id) {
                debug!("Listener {} was already unregistered: {}", self.id, e);
            }
        }
    }
}

// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Tunables of a [`Manager`](crate::Manager).

use std::time::Duration;

/// Default path of the driver's authentication channel.
pub const DEFAULT_AUTH_CHANNEL_PATH: &str = r"\\?\ROOT#BTHAUTH#0000";

/// Settings of a [`Manager`](crate::Manager). Start from [`Config::default`] and adjust with
/// the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Duration of one inquiry timeout unit.
    pub inquiry_unit: Duration,
    /// How many requests a listing may take before the driver is considered misbehaving.
    pub max_list_attempts: usize,
    /// Authentication callbacks running at the same time.
    pub auth_workers: usize,
    /// Authentication callbacks accepted but not yet finished. Events beyond that are dropped
    /// for the listeners they could not be queued for.
    pub auth_queue_depth: usize,
    pub auth_channel_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            inquiry_unit: Duration::from_millis(1280),
            max_list_attempts: 4,
            auth_workers: 4,
            auth_queue_depth: 64,
            auth_channel_path: DEFAULT_AUTH_CHANNEL_PATH.to_string(),
        }
    }
}

impl Config {
    pub fn with_inquiry_unit(mut self, unit: Duration) -> Self {
        self.inquiry_unit = unit;
        self
    }

    pub fn with_max_list_attempts(mut self, attempts: usize) -> Self {
        self.max_list_attempts = attempts;
        self
    }

    pub fn with_auth_workers(mut self, workers: usize) -> Self {
        self.auth_workers = workers;
        self
    }

    pub fn with_auth_queue_depth(mut self, depth: usize) -> Self {
        self.auth_queue_depth = depth;
        self
    }

    pub fn with_auth_channel_path(mut self, path: impl Into<String>) -> Self {
        self.auth_channel_path = path.into();
        self
    }

    /// Time an inquiry of `multiplier` units blocks for, or `None` if it does not fit a
    /// [`Duration`].
    pub(crate) fn inquiry_duration(&self, multiplier: u8) -> Option<Duration> {
        self.inquiry_unit.checked_mul(u32::from(multiplier))
    }
}

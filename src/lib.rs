// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A thin, safe binding to libdevmapper.
//!
//! # Overview
//!
//! Linux's devicemapper allows the creation of block devices whose
//! storage is mapped to other block devices in useful ways. This crate
//! exposes libdevmapper's control surface directly rather than wrapping
//! it in higher-level device abstractions: a [`DmTask`] is built up
//! with setters, run, and read back through typed accessors, matching
//! the shape of the underlying `dm_task_*` API. Statistics regions are
//! handled through [`DmStats`], udev transaction cookies through
//! [`udev::DmCookie`], and the library's process-wide knobs through the
//! [`config`] module.
//!
//! # Shared state
//!
//! libdevmapper keeps per-process global state: the device directory,
//! sysfs location, uuid prefix, name-mangling mode, and the udev
//! synchronization toggles. Everything in [`config`] and the
//! module-level functions in [`udev`] mutate that state for every user
//! of the library in the process. Handles themselves are not safe to
//! share between threads and do not implement `Send` or `Sync`.

#![warn(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[macro_use]
mod id_macros;

/// Process-wide libdevmapper configuration, versions, and node control.
pub mod config;
mod device;
mod deviceinfo;
mod errors;
/// Device I/O statistics handles and driver capability probes.
pub mod stats;
mod task;
#[cfg(test)]
mod testing;
mod timestamp;
mod types;
/// Udev cookies and udev synchronization support.
pub mod udev;
mod util;

pub use crate::{
    config::{NameMangling, DM_MAX_UUID_PREFIX_LEN},
    device::Device,
    deviceinfo::DeviceInfo,
    errors::{DmError, DmResult},
    stats::{DmStats, StatsCounter, StatsRegion, STATS_REGIONS_ALL},
    task::{AddNodeMode, DmTask, TaskType, TASK_TYPES},
    timestamp::DmTimestamp,
    types::{DevId, DmName, DmNameBuf, DmUuid, DmUuidBuf, DM_NAME_LEN, DM_UUID_LEN},
    udev::{DmCookie, DmUdevFlags},
};

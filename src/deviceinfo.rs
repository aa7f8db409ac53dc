// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use libdm_sys as dmi;

use crate::device::Device;

/// Contains information about the device.
///
/// An immutable snapshot of `struct dm_info`, taken after a successful
/// run of an info-bearing task.
#[derive(Clone, Copy, Debug)]
pub struct DeviceInfo {
    exists: bool,
    suspended: bool,
    live_table: bool,
    inactive_table: bool,
    open_count: i32,
    event_nr: u32,
    dev: Device,
    read_only: bool,
    target_count: i32,
    deferred_remove: bool,
    internal_suspend: bool,
}

impl From<dmi::dm_info> for DeviceInfo {
    fn from(info: dmi::dm_info) -> DeviceInfo {
        DeviceInfo {
            exists: info.exists != 0,
            suspended: info.suspended != 0,
            live_table: info.live_table != 0,
            inactive_table: info.inactive_table != 0,
            open_count: info.open_count,
            event_nr: info.event_nr,
            dev: Device {
                major: info.major,
                minor: info.minor,
            },
            read_only: info.read_only != 0,
            target_count: info.target_count,
            deferred_remove: info.deferred_remove != 0,
            internal_suspend: info.internal_suspend != 0,
        }
    }
}

impl DeviceInfo {
    /// Whether the device exists in the kernel's tables.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Whether the device is suspended.
    pub fn suspended(&self) -> bool {
        self.suspended
    }

    /// Whether the device has a live (active) table.
    pub fn live_table_present(&self) -> bool {
        self.live_table
    }

    /// Whether the device has a loaded but inactive table.
    pub fn inactive_table_present(&self) -> bool {
        self.inactive_table
    }

    /// The number of times the device is currently open.
    pub fn open_count(&self) -> i32 {
        self.open_count
    }

    /// The last event number for the device.
    pub fn event_nr(&self) -> u32 {
        self.event_nr
    }

    /// The device's major and minor device numbers, as a Device.
    pub fn device(&self) -> Device {
        self.dev
    }

    /// Whether the device is read-only.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// The number of targets in the device's live table.
    pub fn target_count(&self) -> i32 {
        self.target_count
    }

    /// Whether the device is scheduled for deferred removal.
    pub fn deferred_remove(&self) -> bool {
        self.deferred_remove
    }

    /// Whether the device is suspended internally.
    pub fn internal_suspend(&self) -> bool {
        self.internal_suspend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Verify field-by-field conversion from the C struct.
    fn test_from_dm_info() {
        let raw = dmi::dm_info {
            exists: 1,
            live_table: 1,
            open_count: 2,
            event_nr: 7,
            major: 253,
            minor: 4,
            target_count: 1,
            ..Default::default()
        };

        let info = DeviceInfo::from(raw);
        assert!(info.exists());
        assert!(!info.suspended());
        assert!(info.live_table_present());
        assert!(!info.inactive_table_present());
        assert_eq!(info.open_count(), 2);
        assert_eq!(info.event_nr(), 7);
        assert_eq!(info.device(), Device { major: 253, minor: 4 });
        assert!(!info.read_only());
        assert_eq!(info.target_count(), 1);
    }
}

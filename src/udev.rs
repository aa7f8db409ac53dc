// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Udev cookie handling and process-wide udev synchronization toggles.

use bitflags::bitflags;
use libdm_sys as dmi;
use log::trace;
use nix::libc::c_int;

use crate::errors::{native, DmError, DmResult};

bitflags! {
    /// Flags used by devicemapper's udev cookie mechanism, see:
    /// https://sourceware.org/git/?p=lvm2.git;a=blob;f=libdm/libdevmapper.h#l3627
    /// for complete information about the meaning of the flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DmUdevFlags: u32 {
        /// Disables basic device-mapper udev rules that create symlinks in /dev/<DM_DIR>
        /// directory.
        const DM_UDEV_DISABLE_DM_RULES_FLAG = dmi::DM_UDEV_DISABLE_DM_RULES_FLAG;
        /// Disable subsystem udev rules, but allow general DM udev rules to run.
        const DM_UDEV_DISABLE_SUBSYSTEM_RULES_FLAG = dmi::DM_UDEV_DISABLE_SUBSYSTEM_RULES_FLAG;
        /// Disable dm udev rules which create symlinks in /dev/disk/* directory.
        const DM_UDEV_DISABLE_DISK_RULES_FLAG = dmi::DM_UDEV_DISABLE_DISK_RULES_FLAG;
        /// Disable all rules that are not general dm nor subsystem related.
        const DM_UDEV_DISABLE_OTHER_RULES_FLAG = dmi::DM_UDEV_DISABLE_OTHER_RULES_FLAG;
        /// Instruct udev rules to give lower priority to the device.
        const DM_UDEV_LOW_PRIORITY_FLAG = dmi::DM_UDEV_LOW_PRIORITY_FLAG;
        /// Disable libdevmapper's node management.
        const DM_UDEV_DISABLE_LIBRARY_FALLBACK = dmi::DM_UDEV_DISABLE_LIBRARY_FALLBACK;
        /// Automatically appended to all IOCTL calls issues by libdevmapper for generating
        /// udev uevents.
        const DM_UDEV_PRIMARY_SOURCE_FLAG = dmi::DM_UDEV_PRIMARY_SOURCE_FLAG;
    }
}

/// A udev transaction cookie.
///
/// The 32-bit cookie value is split by libdevmapper into a 16-bit prefix
/// (the high bits, carrying udev flags and the cookie magic) and a 16-bit
/// base (the low bits, identifying the notification semaphore). The local
/// `ready` flag records whether the transaction the cookie tracks has
/// completed; it moves from false to true exactly once.
#[derive(Debug)]
pub struct DmCookie {
    value: u32,
    ready: bool,
}

impl DmCookie {
    /// Wrap an existing cookie value.
    pub fn new(value: u32) -> DmCookie {
        DmCookie {
            value,
            ready: false,
        }
    }

    /// Allocate a fresh cookie, including its notification semaphore,
    /// from libdevmapper.
    pub fn create() -> DmResult<DmCookie> {
        let mut value = 0u32;
        if unsafe { dmi::dm_udev_create_cookie(&mut value) } == 0 {
            return Err(native("dm_udev_create_cookie"));
        }
        Ok(DmCookie::new(value))
    }

    /// The full 32-bit cookie value.
    pub fn value(&self) -> u32 {
        self.value
    }

    /// The low 16 bits of the cookie value.
    pub fn base(&self) -> u16 {
        (self.value & !dmi::DM_UDEV_FLAGS_MASK) as u16
    }

    /// The high 16 bits of the cookie value.
    pub fn prefix(&self) -> u16 {
        ((self.value & dmi::DM_UDEV_FLAGS_MASK) >> dmi::DM_UDEV_FLAGS_SHIFT) as u16
    }

    /// Whether the transaction tracked by this cookie has completed.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Replace the full cookie value. The ready flag is cleared, since
    /// the new value refers to a new transaction.
    pub fn set_value(&mut self, value: u32) {
        self.value = value;
        self.ready = false;
    }

    /// Replace the low 16 bits of the cookie value.
    pub fn set_base(&mut self, base: u32) -> DmResult<()> {
        if base > 0xffff {
            return Err(DmError::InvalidArgument(
                "cookie base value out of range".into(),
            ));
        }
        self.value = (self.value & dmi::DM_UDEV_FLAGS_MASK) | base;
        Ok(())
    }

    /// Replace the high 16 bits of the cookie value.
    pub fn set_prefix(&mut self, prefix: u32) -> DmResult<()> {
        if prefix > 0xffff {
            return Err(DmError::InvalidArgument(
                "cookie prefix value out of range".into(),
            ));
        }
        self.value =
            (self.value & !dmi::DM_UDEV_FLAGS_MASK) | (prefix << dmi::DM_UDEV_FLAGS_SHIFT);
        Ok(())
    }

    /// Decrement the use count of the cookie's notification semaphore,
    /// marking this side of the transaction complete.
    pub fn complete(&self) -> DmResult<()> {
        if unsafe { dmi::dm_udev_complete(self.value) } == 0 {
            return Err(native("dm_udev_complete"));
        }
        Ok(())
    }

    /// Wait for the udev transaction tracked by this cookie to finish.
    ///
    /// With `immediate`, polls the transaction state once instead of
    /// blocking; returns whether the transaction has completed. A wait on
    /// an already completed cookie is rejected, since the underlying
    /// semaphore is destroyed when the wait finishes.
    pub fn wait(&mut self, immediate: bool) -> DmResult<bool> {
        if self.ready {
            return Err(DmError::InvalidState(
                "cannot wait on a completed cookie".into(),
            ));
        }

        trace!("waiting on udev cookie {:#x}", self.value);
        if immediate {
            let mut ready: c_int = 0;
            if unsafe { dmi::dm_udev_wait_immediate(self.value, &mut ready) } == 0 {
                return Err(native("dm_udev_wait_immediate"));
            }
            if ready != 0 {
                self.ready = true;
            }
        } else {
            if unsafe { dmi::dm_udev_wait(self.value) } == 0 {
                return Err(native("dm_udev_wait"));
            }
            self.ready = true;
        }
        Ok(self.ready)
    }
}

/// Enable or disable udev synchronization for the whole process.
pub fn set_sync_support(enable: bool) {
    unsafe { dmi::dm_udev_set_sync_support(c_int::from(enable)) };
}

/// Whether udev synchronization is enabled for the process.
pub fn sync_support() -> bool {
    unsafe { dmi::dm_udev_get_sync_support() != 0 }
}

/// Enable or disable udev checking for the whole process.
pub fn set_checking(enable: bool) {
    unsafe { dmi::dm_udev_set_checking(c_int::from(enable)) };
}

/// Whether udev checking is enabled for the process.
pub fn checking() -> bool {
    unsafe { dmi::dm_udev_get_checking() != 0 }
}

/// Whether the kernel driver supports udev cookies at all.
pub fn cookie_supported() -> bool {
    unsafe { dmi::dm_cookie_supported() != 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// A fresh cookie is not ready, and its value splits into prefix and
    /// base halves.
    fn test_cookie_value_split() {
        let mut cookie = DmCookie::new(0);
        assert!(!cookie.is_ready());
        assert_eq!(cookie.value(), 0);

        cookie.set_base(0xbeef).unwrap();
        cookie.set_prefix(0xdead).unwrap();
        assert_eq!(cookie.value(), 0xdead_beef);
        assert_eq!(cookie.base(), 0xbeef);
        assert_eq!(cookie.prefix(), 0xdead);
    }

    #[test]
    /// Base and prefix must fit in 16 bits.
    fn test_cookie_value_range() {
        let mut cookie = DmCookie::new(0);
        assert_matches!(
            cookie.set_base(0x1_0000),
            Err(DmError::InvalidArgument(_))
        );
        assert_matches!(
            cookie.set_prefix(0x1_0000),
            Err(DmError::InvalidArgument(_))
        );
    }

    #[test]
    /// With udev sync disabled a wait completes immediately; a second
    /// wait on the completed cookie is an ordering error.
    fn test_cookie_wait_lifecycle_sync_disabled() {
        set_sync_support(false);
        assert!(!sync_support());

        let mut cookie = DmCookie::new(0);
        assert!(!cookie.is_ready());
        assert_matches!(cookie.wait(false), Ok(true));
        assert!(cookie.is_ready());
        assert_matches!(cookie.wait(false), Err(DmError::InvalidState(_)));
        assert_matches!(cookie.wait(true), Err(DmError::InvalidState(_)));
    }
}

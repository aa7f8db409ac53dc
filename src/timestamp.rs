// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{cmp::Ordering, ptr::NonNull};

use libdm_sys as dmi;

use crate::errors::{native, DmResult};

/// A nanosecond-resolution timestamp owned by libdevmapper.
///
/// Used with `DmTask::set_record_timestamp` to time ioctls, or standalone
/// via `DmTimestamp::now`.
#[derive(Debug)]
pub struct DmTimestamp {
    ts: NonNull<dmi::dm_timestamp>,
}

impl DmTimestamp {
    /// Allocate a zeroed timestamp.
    pub fn new() -> DmResult<DmTimestamp> {
        let ts = NonNull::new(unsafe { dmi::dm_timestamp_alloc() })
            .ok_or_else(|| native("dm_timestamp_alloc"))?;
        Ok(DmTimestamp { ts })
    }

    /// Allocate a timestamp holding the current time.
    pub fn now() -> DmResult<DmTimestamp> {
        let mut ts = DmTimestamp::new()?;
        ts.update()?;
        Ok(ts)
    }

    /// Store the current time in this timestamp.
    pub fn update(&mut self) -> DmResult<()> {
        if unsafe { dmi::dm_timestamp_get(self.ts.as_ptr()) } == 0 {
            return Err(native("dm_timestamp_get"));
        }
        Ok(())
    }

    /// Copy the value out of a borrowed native timestamp.
    ///
    /// # Safety
    /// `src` must point to a valid `dm_timestamp`.
    pub(crate) unsafe fn copy_from(src: *mut dmi::dm_timestamp) -> DmResult<DmTimestamp> {
        let ts = DmTimestamp::new()?;
        dmi::dm_timestamp_copy(ts.ts.as_ptr(), src);
        Ok(ts)
    }

    /// Compare with another timestamp.
    pub fn compare(&self, other: &DmTimestamp) -> Ordering {
        let cmp = unsafe { dmi::dm_timestamp_compare(self.ts.as_ptr(), other.ts.as_ptr()) };
        cmp.cmp(&0)
    }

    /// The absolute difference from another timestamp, in nanoseconds.
    pub fn delta(&self, other: &DmTimestamp) -> u64 {
        unsafe { dmi::dm_timestamp_delta(self.ts.as_ptr(), other.ts.as_ptr()) }
    }
}

impl Drop for DmTimestamp {
    fn drop(&mut self) {
        unsafe { dmi::dm_timestamp_destroy(self.ts.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Later timestamps compare greater and a delta can be taken both ways.
    fn test_timestamp_ordering() {
        let earlier = DmTimestamp::now().unwrap();
        let later = DmTimestamp::now().unwrap();

        assert_ne!(earlier.compare(&later), Ordering::Greater);
        assert_eq!(earlier.delta(&later), later.delta(&earlier));
        assert_eq!(earlier.compare(&earlier), Ordering::Equal);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The stats handle wrapper over libdevmapper's dmstats sub-API.

use std::ptr::{self, NonNull};

use libdm_sys as dmi;
use nix::libc::{c_int, c_uint};

use crate::{
    device::Device,
    errors::{native, DmError, DmResult},
    types::{DmName, DmUuid},
    util::to_cstring,
};

/// Region id addressing every region of a stats handle at once.
pub const STATS_REGIONS_ALL: u64 = u64::MAX;

/// Per-area statistics counters maintained by the kernel.
///
/// Discriminants follow the fixed counter order of the dmstats ABI.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u32)]
pub enum StatsCounter {
    /// Reads completed.
    ReadsCount = 0,
    /// Reads merged.
    ReadsMergedCount = 1,
    /// Sectors read.
    ReadSectorsCount = 2,
    /// Nanoseconds spent reading.
    ReadNsecs = 3,
    /// Writes completed.
    WritesCount = 4,
    /// Writes merged.
    WritesMergedCount = 5,
    /// Sectors written.
    WriteSectorsCount = 6,
    /// Nanoseconds spent writing.
    WriteNsecs = 7,
    /// I/Os currently in flight.
    IoInProgressCount = 8,
    /// Nanoseconds spent doing I/O.
    IoNsecs = 9,
    /// Weighted nanoseconds spent doing I/O.
    WeightedIoNsecs = 10,
    /// Total nanoseconds spent on completed reads.
    TotalReadNsecs = 11,
    /// Total nanoseconds spent on completed writes.
    TotalWriteNsecs = 12,
}

/// A handle onto the kernel's I/O statistics for one device.
///
/// The handle is bound to at most one of a device name, a devicemapper
/// uuid, or a major/minor pair. Region and area data become available
/// after `list` (metadata only) or `populate` (full counters); counter
/// reads are refused until the addressed region has been populated.
#[derive(Debug)]
pub struct DmStats {
    dms: NonNull<dmi::dm_stats>,
    // The region whose counters the last populate() materialized:
    // None before any populate, STATS_REGIONS_ALL for a full populate.
    // dm_stats_get_counter dereferences the per-region counter buffer
    // without a NULL check, so reads outside this state are refused.
    populated: Option<u64>,
}

impl DmStats {
    /// Create an unbound handle with the given program id filter.
    pub fn new(program_id: &str) -> DmResult<DmStats> {
        let id = to_cstring(program_id)?;
        let dms = NonNull::new(unsafe { dmi::dm_stats_create(id.as_ptr()) })
            .ok_or_else(|| native("dm_stats_create"))?;
        Ok(DmStats {
            dms,
            populated: None,
        })
    }

    /// Create a handle bound to at most one of a name, a uuid, or a
    /// device number. Supplying more than one binding is an error.
    pub fn with_binding(
        program_id: &str,
        name: Option<&DmName>,
        uuid: Option<&DmUuid>,
        devno: Option<Device>,
    ) -> DmResult<DmStats> {
        let bindings = [name.is_some(), uuid.is_some(), devno.is_some()]
            .iter()
            .filter(|supplied| **supplied)
            .count();
        if bindings > 1 {
            return Err(DmError::InvalidArgument(
                "at most one of name, uuid, and devno may be supplied".into(),
            ));
        }

        let mut stats = DmStats::new(program_id)?;
        if let Some(name) = name {
            stats.bind_name(name)?;
        }
        if let Some(uuid) = uuid {
            stats.bind_uuid(uuid)?;
        }
        if let Some(devno) = devno {
            stats.bind_devno(devno)?;
        }
        Ok(stats)
    }

    /// Bind the handle to the device with the given name, replacing any
    /// existing binding.
    pub fn bind_name(&mut self, name: &DmName) -> DmResult<()> {
        let name = to_cstring(&name.to_string())?;
        if unsafe { dmi::dm_stats_bind_name(self.dms.as_ptr(), name.as_ptr()) } == 0 {
            return Err(native("dm_stats_bind_name"));
        }
        self.populated = None;
        Ok(())
    }

    /// Bind the handle to the device with the given uuid, replacing any
    /// existing binding.
    pub fn bind_uuid(&mut self, uuid: &DmUuid) -> DmResult<()> {
        let uuid = to_cstring(&uuid.to_string())?;
        if unsafe { dmi::dm_stats_bind_uuid(self.dms.as_ptr(), uuid.as_ptr()) } == 0 {
            return Err(native("dm_stats_bind_uuid"));
        }
        self.populated = None;
        Ok(())
    }

    /// Bind the handle to the device with the given device numbers,
    /// replacing any existing binding.
    pub fn bind_devno(&mut self, devno: Device) -> DmResult<()> {
        if unsafe {
            dmi::dm_stats_bind_devno(self.dms.as_ptr(), devno.major as c_int, devno.minor as c_int)
        } == 0
        {
            return Err(native("dm_stats_bind_devno"));
        }
        self.populated = None;
        Ok(())
    }

    /// Fetch region and area metadata for the bound device, without the
    /// counter values themselves. An explicit `program_id` overrides the
    /// handle's filter for this call.
    pub fn list(&mut self, program_id: Option<&str>) -> DmResult<()> {
        let id = program_id.map(to_cstring).transpose()?;
        let id_ptr = id.as_ref().map_or(ptr::null(), |id| id.as_ptr());
        if unsafe { dmi::dm_stats_list(self.dms.as_ptr(), id_ptr) } == 0 {
            return Err(native("dm_stats_list"));
        }
        // Relisting rebuilds region metadata without counter buffers.
        self.populated = None;
        Ok(())
    }

    /// Fetch full counter data for one region, or for all regions if
    /// `region_id` is None. Populating a single region requires a prior
    /// `list`.
    pub fn populate(&mut self, program_id: Option<&str>, region_id: Option<u64>) -> DmResult<()> {
        let id = program_id.map(to_cstring).transpose()?;
        let id_ptr = id.as_ref().map_or(ptr::null(), |id| id.as_ptr());
        let region_id = region_id.unwrap_or(STATS_REGIONS_ALL);
        if unsafe { dmi::dm_stats_populate(self.dms.as_ptr(), id_ptr, region_id) } == 0 {
            return Err(native("dm_stats_populate"));
        }
        self.populated = Some(region_id);
        Ok(())
    }

    /// Zero the counters of one region.
    pub fn clear_region(&mut self, region_id: u64) -> DmResult<()> {
        if unsafe { dmi::dm_stats_clear_region(self.dms.as_ptr(), region_id) } == 0 {
            return Err(native("dm_stats_clear_region"));
        }
        Ok(())
    }

    /// Delete one region from the bound device.
    pub fn delete_region(&mut self, region_id: u64) -> DmResult<()> {
        if unsafe { dmi::dm_stats_delete_region(self.dms.as_ptr(), region_id) } == 0 {
            return Err(native("dm_stats_delete_region"));
        }
        Ok(())
    }

    /// The number of regions the handle currently knows. Zero before
    /// `list`/`populate` and on an unbound handle.
    pub fn nr_regions(&self) -> u64 {
        unsafe { dmi::dm_stats_get_nr_regions(self.dms.as_ptr()) }
    }

    /// The total number of areas across all regions.
    pub fn nr_areas(&self) -> u64 {
        unsafe { dmi::dm_stats_get_nr_areas(self.dms.as_ptr()) }
    }

    /// The number of region groups.
    pub fn nr_groups(&self) -> u64 {
        unsafe { dmi::dm_stats_get_nr_groups(self.dms.as_ptr()) }
    }

    /// Whether the handle holds a region with the given id.
    pub fn region_present(&self, region_id: u64) -> bool {
        unsafe { dmi::dm_stats_region_present(self.dms.as_ptr(), region_id) != 0 }
    }

    /// Whether the handle holds a group with the given id.
    pub fn group_present(&self, group_id: u64) -> bool {
        unsafe { dmi::dm_stats_group_present(self.dms.as_ptr(), group_id) != 0 }
    }

    /// The number of areas in one region; zero if the handle holds no
    /// area data at all.
    pub fn region_nr_areas(&self, region_id: u64) -> u64 {
        // dm_stats_get_region_nr_areas reads region state that does not
        // exist before a list; guard on the handle-wide area count.
        if self.nr_areas() == 0 {
            return 0;
        }
        unsafe { dmi::dm_stats_get_region_nr_areas(self.dms.as_ptr(), region_id) }
    }

    /// A view of one region, if present.
    pub fn region(&self, region_id: u64) -> Option<StatsRegion<'_>> {
        self.region_present(region_id).then_some(StatsRegion {
            stats: self,
            region_id,
        })
    }

    /// Read one counter for one area of a populated region. A region
    /// that has only been listed carries no counter buffers yet and
    /// reports `NoData`, as does an area beyond the region's area count.
    pub fn counter(&self, region_id: u64, area_id: u64, counter: StatsCounter) -> DmResult<u64> {
        match self.populated {
            Some(STATS_REGIONS_ALL) => (),
            Some(populated) if populated == region_id => (),
            Some(_) | None => {
                return Err(DmError::NoData(format!(
                    "no counter data: region {region_id} has not been populated"
                )))
            }
        }
        if !self.region_present(region_id) {
            return Err(DmError::NoData(format!(
                "no counter data: region {region_id} is not present"
            )));
        }
        if area_id >= self.region_nr_areas(region_id) {
            return Err(DmError::NoData(format!(
                "no counter data: area {area_id} is out of range for region {region_id}"
            )));
        }
        Ok(unsafe {
            dmi::dm_stats_get_counter(self.dms.as_ptr(), counter as c_uint, region_id, area_id)
        })
    }

    /// Set the sampling interval used for rate conversions, in seconds.
    pub fn set_sampling_interval(&mut self, interval: f64) -> DmResult<()> {
        if !interval.is_finite() || interval < 0.0 {
            return Err(DmError::InvalidArgument(format!(
                "sampling interval {interval} is not a non-negative duration"
            )));
        }
        // Stored by libdevmapper with nanosecond precision.
        let interval_ns = (interval * 1e9) as u64;
        unsafe { dmi::dm_stats_set_sampling_interval_ns(self.dms.as_ptr(), interval_ns) };
        Ok(())
    }

    /// The sampling interval, in seconds.
    pub fn sampling_interval(&self) -> f64 {
        let interval_ns = unsafe { dmi::dm_stats_get_sampling_interval_ns(self.dms.as_ptr()) };
        interval_ns as f64 / 1e9
    }

    /// Change the handle's program id filter. An empty id matches all
    /// programs and must be requested explicitly.
    pub fn set_program_id(&mut self, program_id: &str, allow_empty: bool) -> DmResult<()> {
        if program_id.is_empty() && !allow_empty {
            return Err(DmError::InvalidArgument(
                "empty program id requires allow_empty".into(),
            ));
        }
        let id = to_cstring(program_id)?;
        if unsafe {
            dmi::dm_stats_set_program_id(self.dms.as_ptr(), c_int::from(allow_empty), id.as_ptr())
        } == 0
        {
            return Err(native("dm_stats_set_program_id"));
        }
        Ok(())
    }
}

impl Drop for DmStats {
    fn drop(&mut self) {
        unsafe { dmi::dm_stats_destroy(self.dms.as_ptr()) };
    }
}

/// A view of one region of a stats handle.
#[derive(Debug)]
pub struct StatsRegion<'a> {
    stats: &'a DmStats,
    region_id: u64,
}

impl StatsRegion<'_> {
    /// The region's id.
    pub fn region_id(&self) -> u64 {
        self.region_id
    }

    /// The number of areas the region is divided into.
    pub fn nr_areas(&self) -> u64 {
        self.stats.region_nr_areas(self.region_id)
    }

    /// Read one counter for one area of the region.
    pub fn counter(&self, area_id: u64, counter: StatsCounter) -> DmResult<u64> {
        self.stats.counter(self.region_id, area_id, counter)
    }
}

/// Whether the running driver supports precise timestamps.
pub fn driver_supports_precise() -> bool {
    unsafe { dmi::dm_stats_driver_supports_precise() != 0 }
}

/// Whether the running driver supports latency histograms.
pub fn driver_supports_histogram() -> bool {
    unsafe { dmi::dm_stats_driver_supports_histogram() != 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// An empty, unlisted handle reports zeros and absent regions
    /// instead of erroring.
    fn test_empty_handle_accessors() {
        let stats = DmStats::new("libdm-test").unwrap();
        assert_eq!(stats.nr_regions(), 0);
        assert_eq!(stats.nr_areas(), 0);
        assert_eq!(stats.nr_groups(), 0);
        assert!(!stats.region_present(0));
        assert!(!stats.group_present(0));
        assert_eq!(stats.region_nr_areas(0), 0);
        assert!(stats.region(0).is_none());
        assert_matches!(
            stats.counter(0, 0, StatsCounter::ReadsCount),
            Err(DmError::NoData(_))
        );
    }

    #[test]
    /// Supplying more than one binding at construction is rejected
    /// before any native call.
    fn test_exclusive_bindings() {
        let name = DmName::new("statsdev").unwrap();
        let uuid = DmUuid::new("LVM-statsdev").unwrap();
        let devno = Device { major: 253, minor: 0 };

        assert_matches!(
            DmStats::with_binding("libdm-test", Some(name), Some(uuid), None),
            Err(DmError::InvalidArgument(_))
        );
        assert_matches!(
            DmStats::with_binding("libdm-test", Some(name), None, Some(devno)),
            Err(DmError::InvalidArgument(_))
        );
        assert_matches!(
            DmStats::with_binding("libdm-test", Some(name), Some(uuid), Some(devno)),
            Err(DmError::InvalidArgument(_))
        );
        assert_matches!(
            DmStats::with_binding("libdm-test", Some(name), None, None),
            Ok(_)
        );
        assert_matches!(DmStats::with_binding("libdm-test", None, None, None), Ok(_));
    }

    #[test]
    /// Counter reads are refused until populate() has materialized the
    /// counter buffers; binding a device is not enough.
    fn test_counter_requires_populate() {
        let mut stats = DmStats::new("libdm-test").unwrap();
        stats
            .bind_devno(Device { major: 253, minor: 0 })
            .unwrap();
        assert_matches!(
            stats.counter(0, 0, StatsCounter::ReadsCount),
            Err(DmError::NoData(_))
        );
    }

    #[test]
    /// The sampling interval round-trips through its nanosecond store.
    fn test_sampling_interval_round_trip() {
        let mut stats = DmStats::new("libdm-test").unwrap();
        assert_eq!(stats.sampling_interval(), 0.0);
        stats.set_sampling_interval(1.5).unwrap();
        assert!((stats.sampling_interval() - 1.5).abs() < 1e-9);
        assert_matches!(
            stats.set_sampling_interval(-1.0),
            Err(DmError::InvalidArgument(_))
        );
    }

    #[test]
    /// An empty program id needs the explicit allow_empty escape hatch.
    fn test_program_id_requires_nonempty() {
        let mut stats = DmStats::new("libdm-test").unwrap();
        assert_matches!(
            stats.set_program_id("", false),
            Err(DmError::InvalidArgument(_))
        );
        assert_matches!(stats.set_program_id("", true), Ok(_));
        assert_matches!(stats.set_program_id("libdm-test2", false), Ok(_));
    }
}

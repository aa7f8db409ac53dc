// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Process-wide libdevmapper configuration.
//!
//! Everything in this module proxies global state inside libdevmapper:
//! the values are initialized to the library's defaults on first use,
//! mutated by the setters, and shared by every caller in the process.
//! There is no per-instance scoping and no teardown beyond
//! [`lib_release`].

use std::path::Path;

use libdm_sys as dmi;
use nix::libc::{c_int, c_uint};
use semver::Version;

use crate::{
    errors::{native, DmError, DmResult},
    task::{DmTask, TaskType},
    types::DmName,
    util::{str_from_byte_slice, string_from_ptr, to_cstring},
};

/// The maximum number of characters in a uuid prefix. Not exported by
/// libdevmapper's public header; taken from libdm-common.c.
pub const DM_MAX_UUID_PREFIX_LEN: usize = 15;

/// String-encoding policy for device names and uuids containing
/// characters that are unsafe in udev events.
///
/// Discriminants follow `dm_string_mangling_t`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum NameMangling {
    /// Pass names through unchanged.
    None = 0,
    /// Mangle names only if they are not mangled already. The library
    /// default.
    Auto = 1,
    /// Mangle all unsafe characters as hex pairs.
    Hex = 2,
}

/// Set the directory in which device nodes are created.
/// The path must be absolute.
pub fn set_dev_dir(dir: &Path) -> DmResult<()> {
    if !dir.is_absolute() {
        return Err(DmError::InvalidArgument(format!(
            "dev dir {} is not an absolute path",
            dir.display()
        )));
    }
    let dir = to_cstring(dir.to_str().ok_or_else(|| {
        DmError::InvalidArgument(format!("dev dir {} is not valid UTF-8", dir.display()))
    })?)?;
    if unsafe { dmi::dm_set_dev_dir(dir.as_ptr()) } == 0 {
        return Err(native("dm_set_dev_dir"));
    }
    Ok(())
}

/// The directory in which device nodes are created, including the
/// device-mapper subdirectory. Defaults to "/dev/mapper".
pub fn dev_dir() -> DmResult<String> {
    unsafe { string_from_ptr(dmi::dm_dir()) }.ok_or_else(|| native("dm_dir"))
}

/// Set the directory where sysfs is mounted. The path must be absolute.
pub fn set_sysfs_dir(dir: &Path) -> DmResult<()> {
    if !dir.is_absolute() {
        return Err(DmError::InvalidArgument(format!(
            "sysfs dir {} is not an absolute path",
            dir.display()
        )));
    }
    let dir = to_cstring(dir.to_str().ok_or_else(|| {
        DmError::InvalidArgument(format!("sysfs dir {} is not valid UTF-8", dir.display()))
    })?)?;
    if unsafe { dmi::dm_set_sysfs_dir(dir.as_ptr()) } == 0 {
        return Err(native("dm_set_sysfs_dir"));
    }
    Ok(())
}

/// The directory where sysfs is mounted. Defaults to "/sys/".
pub fn sysfs_dir() -> DmResult<String> {
    unsafe { string_from_ptr(dmi::dm_sysfs_dir()) }.ok_or_else(|| native("dm_sysfs_dir"))
}

/// Set the prefix prepended to generated uuids. At most
/// [`DM_MAX_UUID_PREFIX_LEN`] characters.
pub fn set_uuid_prefix(prefix: &str) -> DmResult<()> {
    if prefix.is_empty() {
        return Err(DmError::InvalidArgument("uuid prefix is empty".into()));
    }
    if prefix.len() > DM_MAX_UUID_PREFIX_LEN {
        return Err(DmError::InvalidArgument(format!(
            "uuid prefix {prefix} exceeds maximum length {DM_MAX_UUID_PREFIX_LEN}"
        )));
    }
    let prefix = to_cstring(prefix)?;
    if unsafe { dmi::dm_set_uuid_prefix(prefix.as_ptr()) } == 0 {
        return Err(native("dm_set_uuid_prefix"));
    }
    Ok(())
}

/// The prefix prepended to generated uuids. Defaults to "LVM-".
pub fn uuid_prefix() -> DmResult<String> {
    unsafe { string_from_ptr(dmi::dm_uuid_prefix()) }.ok_or_else(|| native("dm_uuid_prefix"))
}

/// Set the process-wide name-mangling mode.
pub fn set_name_mangling_mode(mode: NameMangling) -> DmResult<()> {
    if unsafe { dmi::dm_set_name_mangling_mode(mode as c_uint) } == 0 {
        return Err(native("dm_set_name_mangling_mode"));
    }
    Ok(())
}

/// The process-wide name-mangling mode. Defaults to
/// [`NameMangling::Auto`].
pub fn name_mangling_mode() -> NameMangling {
    match unsafe { dmi::dm_get_name_mangling_mode() } {
        0 => NameMangling::None,
        2 => NameMangling::Hex,
        _ => NameMangling::Auto,
    }
}

/// Keep the control device open between ioctls instead of reopening it
/// for every task run.
pub fn hold_control_dev(hold_open: bool) {
    unsafe { dmi::dm_hold_control_dev(c_int::from(hold_open)) };
}

/// Release the library's resources: the control device file descriptor
/// and any cached state. Further calls reinitialize lazily.
pub fn lib_release() {
    unsafe { dmi::dm_lib_release() };
}

/// The version of libdevmapper itself, as reported by the library.
pub fn library_version() -> DmResult<String> {
    let mut buf = [0u8; 64];
    if unsafe {
        dmi::dm_get_library_version(buf.as_mut_ptr() as *mut nix::libc::c_char, buf.len())
    } == 0
    {
        return Err(native("dm_get_library_version"));
    }
    Ok(str_from_byte_slice(&buf).unwrap_or("").to_string())
}

/// The version of the kernel device-mapper driver.
pub fn driver_version() -> DmResult<Version> {
    let mut task = DmTask::new(TaskType::Version)?;
    task.run()?;
    let version = task.driver_version()?;
    Version::parse(&version).map_err(|_| {
        DmError::InvalidArgument(format!("could not parse driver version {version}"))
    })
}

/// Whether the given major number belongs to device-mapper.
pub fn is_dm_major(major: u32) -> bool {
    unsafe { dmi::dm_is_dm_major(major) != 0 }
}

/// Create device nodes for the named device, or for all devices if no
/// name is given.
pub fn mknodes(name: Option<&DmName>) -> DmResult<()> {
    let name = name.map(|name| to_cstring(&name.to_string())).transpose()?;
    let name_ptr = name.as_ref().map_or(std::ptr::null(), |name| name.as_ptr());
    if unsafe { dmi::dm_mknodes(name_ptr) } == 0 {
        return Err(native("dm_mknodes"));
    }
    Ok(())
}

/// Update device nodes to match the state of the devices in the kernel.
pub fn update_nodes() {
    unsafe { dmi::dm_task_update_nodes() };
}

/// Whether target messages support precise timestamps.
pub fn message_supports_precise_timestamps() -> bool {
    unsafe { dmi::dm_message_supports_precise_timestamps() != 0 }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    /// Defaults match the library's documented values, and each setter
    /// round-trips through its getter. One test keeps the mutations of
    /// shared process state ordered.
    fn test_round_trip_with_defaults() {
        assert_eq!(dev_dir().unwrap(), "/dev/mapper");
        assert_eq!(sysfs_dir().unwrap(), "/sys/");
        assert_eq!(uuid_prefix().unwrap(), "LVM-");
        assert_eq!(name_mangling_mode(), NameMangling::Auto);

        set_sysfs_dir(&PathBuf::from("/other/sys/")).unwrap();
        assert_eq!(sysfs_dir().unwrap(), "/other/sys/");
        set_sysfs_dir(&PathBuf::from("/sys/")).unwrap();

        set_uuid_prefix("DMPY-").unwrap();
        assert_eq!(uuid_prefix().unwrap(), "DMPY-");
        set_uuid_prefix("LVM-").unwrap();

        set_name_mangling_mode(NameMangling::Hex).unwrap();
        assert_eq!(name_mangling_mode(), NameMangling::Hex);
        set_name_mangling_mode(NameMangling::Auto).unwrap();
    }

    #[test]
    /// Relative paths are rejected before reaching libdevmapper.
    fn test_relative_dirs_rejected() {
        assert_matches!(
            set_dev_dir(&PathBuf::from("dev/mapper")),
            Err(DmError::InvalidArgument(_))
        );
        assert_matches!(
            set_sysfs_dir(&PathBuf::from("sys/")),
            Err(DmError::InvalidArgument(_))
        );
    }

    #[test]
    /// The uuid prefix length bound is enforced locally.
    fn test_uuid_prefix_limits() {
        assert_matches!(set_uuid_prefix(""), Err(DmError::InvalidArgument(_)));
        assert_matches!(
            set_uuid_prefix(&"p".repeat(DM_MAX_UUID_PREFIX_LEN + 1)),
            Err(DmError::InvalidArgument(_))
        );
    }

    #[test]
    /// The library reports a version string.
    fn test_library_version() {
        assert!(!library_version().unwrap().is_empty());
    }

    #[test]
    /// The driver version parses as a semantic version.
    fn sudo_test_driver_version() {
        assert!(driver_version().unwrap().major >= 4);
    }

    #[test]
    /// Zero is never the device-mapper major number.
    fn sudo_test_is_dm_major() {
        assert!(!is_dm_major(0));
    }
}

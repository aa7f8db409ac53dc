// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The task wrapper: one `DmTask` per device-mapper control operation.

use std::ptr::{self, NonNull};

use bitflags::bitflags;
use libdm_sys as dmi;
use log::debug;
use nix::errno::Errno;
use nix::libc::{c_int, c_void, free};

use crate::{
    device::Device,
    deviceinfo::DeviceInfo,
    errors::{native, DmError, DmResult},
    timestamp::DmTimestamp,
    types::{DevId, DmName, DmNameBuf, DmUuid},
    udev::{DmCookie, DmUdevFlags},
    util::{string_from_ptr, to_cstring},
};

/// Device-mapper task types, one per control operation understood by
/// the driver.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TaskType {
    /// Create a new device.
    Create,
    /// Load a table into a device's inactive slot.
    Reload,
    /// Remove a device.
    Remove,
    /// Remove all devices.
    RemoveAll,
    /// Suspend a device.
    Suspend,
    /// Resume a suspended device, swapping in its inactive table.
    Resume,
    /// Query device information.
    Info,
    /// Query the devices a device depends on.
    Deps,
    /// Rename a device, or change its uuid.
    Rename,
    /// Query the driver version.
    Version,
    /// Query the status of each target in a device's table.
    Status,
    /// Query a device's table.
    Table,
    /// Wait for an event on a device.
    Waitevent,
    /// List all devices.
    List,
    /// Clear a device's inactive table slot.
    Clear,
    /// Create device nodes for a device.
    Mknodes,
    /// List the version of each loaded target type.
    ListVersions,
    /// Send a message to a target.
    TargetMsg,
    /// Set a device's geometry.
    SetGeometry,
}

/// All recognized task types, in operation-code order.
pub const TASK_TYPES: [TaskType; 19] = [
    TaskType::Create,
    TaskType::Reload,
    TaskType::Remove,
    TaskType::RemoveAll,
    TaskType::Suspend,
    TaskType::Resume,
    TaskType::Info,
    TaskType::Deps,
    TaskType::Rename,
    TaskType::Version,
    TaskType::Status,
    TaskType::Table,
    TaskType::Waitevent,
    TaskType::List,
    TaskType::Clear,
    TaskType::Mknodes,
    TaskType::ListVersions,
    TaskType::TargetMsg,
    TaskType::SetGeometry,
];

impl TaskType {
    fn to_raw(self) -> c_int {
        (match self {
            TaskType::Create => dmi::DM_DEVICE_CREATE,
            TaskType::Reload => dmi::DM_DEVICE_RELOAD,
            TaskType::Remove => dmi::DM_DEVICE_REMOVE,
            TaskType::RemoveAll => dmi::DM_DEVICE_REMOVE_ALL,
            TaskType::Suspend => dmi::DM_DEVICE_SUSPEND,
            TaskType::Resume => dmi::DM_DEVICE_RESUME,
            TaskType::Info => dmi::DM_DEVICE_INFO,
            TaskType::Deps => dmi::DM_DEVICE_DEPS,
            TaskType::Rename => dmi::DM_DEVICE_RENAME,
            TaskType::Version => dmi::DM_DEVICE_VERSION,
            TaskType::Status => dmi::DM_DEVICE_STATUS,
            TaskType::Table => dmi::DM_DEVICE_TABLE,
            TaskType::Waitevent => dmi::DM_DEVICE_WAITEVENT,
            TaskType::List => dmi::DM_DEVICE_LIST,
            TaskType::Clear => dmi::DM_DEVICE_CLEAR,
            TaskType::Mknodes => dmi::DM_DEVICE_MKNODES,
            TaskType::ListVersions => dmi::DM_DEVICE_LIST_VERSIONS,
            TaskType::TargetMsg => dmi::DM_DEVICE_TARGET_MSG,
            TaskType::SetGeometry => dmi::DM_DEVICE_SET_GEOMETRY,
        }) as c_int
    }

    /// The result kinds a successful run of this task type fills in.
    ///
    /// `struct dm_task` is opaque, so which response fields are valid
    /// after an ioctl has to be tracked here, per task type.
    fn result_data(self) -> TaskData {
        match self {
            TaskType::RemoveAll | TaskType::Version | TaskType::Mknodes => TaskData::empty(),
            TaskType::Info => TaskData::IDENTITY | TaskData::INFO,
            TaskType::Deps => TaskData::IDENTITY | TaskData::DEPS,
            TaskType::Table => TaskData::IDENTITY | TaskData::TABLE,
            TaskType::Status => TaskData::IDENTITY | TaskData::STATUS,
            TaskType::TargetMsg => TaskData::IDENTITY | TaskData::MESSAGE,
            TaskType::List => TaskData::NAME_LIST,
            TaskType::ListVersions => TaskData::TARGET_VERSIONS,
            _ => TaskData::IDENTITY,
        }
    }
}

impl TryFrom<u32> for TaskType {
    type Error = DmError;

    fn try_from(code: u32) -> DmResult<TaskType> {
        let task_type = match code {
            dmi::DM_DEVICE_CREATE => TaskType::Create,
            dmi::DM_DEVICE_RELOAD => TaskType::Reload,
            dmi::DM_DEVICE_REMOVE => TaskType::Remove,
            dmi::DM_DEVICE_REMOVE_ALL => TaskType::RemoveAll,
            dmi::DM_DEVICE_SUSPEND => TaskType::Suspend,
            dmi::DM_DEVICE_RESUME => TaskType::Resume,
            dmi::DM_DEVICE_INFO => TaskType::Info,
            dmi::DM_DEVICE_DEPS => TaskType::Deps,
            dmi::DM_DEVICE_RENAME => TaskType::Rename,
            dmi::DM_DEVICE_VERSION => TaskType::Version,
            dmi::DM_DEVICE_STATUS => TaskType::Status,
            dmi::DM_DEVICE_TABLE => TaskType::Table,
            dmi::DM_DEVICE_WAITEVENT => TaskType::Waitevent,
            dmi::DM_DEVICE_LIST => TaskType::List,
            dmi::DM_DEVICE_CLEAR => TaskType::Clear,
            dmi::DM_DEVICE_MKNODES => TaskType::Mknodes,
            dmi::DM_DEVICE_LIST_VERSIONS => TaskType::ListVersions,
            dmi::DM_DEVICE_TARGET_MSG => TaskType::TargetMsg,
            dmi::DM_DEVICE_SET_GEOMETRY => TaskType::SetGeometry,
            _ => {
                return Err(DmError::InvalidArgument(format!(
                    "value {code} is not a recognized task type"
                )))
            }
        };
        Ok(task_type)
    }
}

/// When libdevmapper adds a device node for a resumed or created device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum AddNodeMode {
    /// Add the node when the device is resumed.
    OnResume = 0,
    /// Add the node as soon as the device is created.
    OnCreate = 1,
}

bitflags! {
    // Which response fields a task currently holds. Tracked locally so
    // that accessors can fail cleanly instead of reading a NULL result
    // buffer inside libdevmapper.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    struct TaskData: u32 {
        const INFO = 0x10;
        const NAME = 0x20;
        const UUID = 0x40;
        const DEPS = 0x80;
        const NAME_LIST = 0x100;
        const MESSAGE = 0x400;
        const TABLE = 0x800;
        const STATUS = 0x1000;
        const TARGET_VERSIONS = 0x2000;
        const IDENTITY = Self::NAME.bits() | Self::UUID.bits();
    }
}

/// One device-mapper control operation under construction or completed.
///
/// A task is created with a type, loaded with parameters through the
/// setters, and submitted to the driver exactly once with [`DmTask::run`].
/// Result accessors are only usable once a run has succeeded, and only
/// for the result kinds the task type produces.
#[derive(Debug)]
pub struct DmTask {
    dmt: NonNull<dmi::dm_task>,
    task_type: TaskType,
    data: TaskData,
    did_run: bool,
    did_error: bool,
    have_timestamp: bool,
}

impl DmTask {
    /// Create a new task of the given type.
    pub fn new(task_type: TaskType) -> DmResult<DmTask> {
        let dmt = NonNull::new(unsafe { dmi::dm_task_create(task_type.to_raw()) })
            .ok_or_else(|| native("dm_task_create"))?;
        let task = DmTask {
            dmt,
            task_type,
            data: TaskData::empty(),
            did_run: false,
            did_error: false,
            have_timestamp: false,
        };
        if unsafe { dmi::dm_task_enable_checks(task.dmt.as_ptr()) } == 0 {
            return Err(native("dm_task_enable_checks"));
        }
        Ok(task)
    }

    /// The task type this task was created with.
    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    fn check(&self, rc: c_int, op: &'static str) -> DmResult<()> {
        if rc == 0 {
            Err(native(op))
        } else {
            Ok(())
        }
    }

    /// Set the name of the device the task operates on.
    pub fn set_name(&mut self, name: &DmName) -> DmResult<()> {
        let name = to_cstring(&name.to_string())?;
        self.check(
            unsafe { dmi::dm_task_set_name(self.dmt.as_ptr(), name.as_ptr()) },
            "dm_task_set_name",
        )
    }

    /// Set the uuid of the device the task operates on.
    pub fn set_uuid(&mut self, uuid: &DmUuid) -> DmResult<()> {
        let uuid = to_cstring(&uuid.to_string())?;
        self.check(
            unsafe { dmi::dm_task_set_uuid(self.dmt.as_ptr(), uuid.as_ptr()) },
            "dm_task_set_uuid",
        )
    }

    /// Identify the device the task operates on by name or by uuid.
    pub fn set_dev_id(&mut self, id: &DevId<'_>) -> DmResult<()> {
        match id {
            DevId::Name(name) => self.set_name(name),
            DevId::Uuid(uuid) => self.set_uuid(uuid),
        }
    }

    /// Set the new name for a rename task.
    pub fn set_newname(&mut self, newname: &DmName) -> DmResult<()> {
        let newname = to_cstring(&newname.to_string())?;
        self.check(
            unsafe { dmi::dm_task_set_newname(self.dmt.as_ptr(), newname.as_ptr()) },
            "dm_task_set_newname",
        )
    }

    /// Set the new uuid for a rename task. Valid only for a device that
    /// does not yet have a uuid.
    pub fn set_newuuid(&mut self, newuuid: &DmUuid) -> DmResult<()> {
        let newuuid = to_cstring(&newuuid.to_string())?;
        self.check(
            unsafe { dmi::dm_task_set_newuuid(self.dmt.as_ptr(), newuuid.as_ptr()) },
            "dm_task_set_newuuid",
        )
    }

    // libdevmapper takes device numbers as int; values past i32::MAX
    // would wrap negative on the way through.
    fn devno_to_c_int(what: &str, value: u32) -> DmResult<c_int> {
        c_int::try_from(value)
            .map_err(|_| DmError::InvalidArgument(format!("{what} number {value} is out of range")))
    }

    /// Set the major number of the device the task operates on.
    pub fn set_major(&mut self, major: u32) -> DmResult<()> {
        let major = DmTask::devno_to_c_int("major", major)?;
        self.check(
            unsafe { dmi::dm_task_set_major(self.dmt.as_ptr(), major) },
            "dm_task_set_major",
        )
    }

    /// Set the minor number of the device the task operates on.
    pub fn set_minor(&mut self, minor: u32) -> DmResult<()> {
        let minor = DmTask::devno_to_c_int("minor", minor)?;
        self.check(
            unsafe { dmi::dm_task_set_minor(self.dmt.as_ptr(), minor) },
            "dm_task_set_minor",
        )
    }

    /// Set both device numbers at once. With `allow_default_major_fallback`
    /// the library may fall back to the configured default major number.
    pub fn set_major_minor(
        &mut self,
        device: Device,
        allow_default_major_fallback: bool,
    ) -> DmResult<()> {
        let major = DmTask::devno_to_c_int("major", device.major)?;
        let minor = DmTask::devno_to_c_int("minor", device.minor)?;
        self.check(
            unsafe {
                dmi::dm_task_set_major_minor(
                    self.dmt.as_ptr(),
                    major,
                    minor,
                    c_int::from(allow_default_major_fallback),
                )
            },
            "dm_task_set_major_minor",
        )
    }

    /// Set the owner of device nodes created for the device.
    pub fn set_uid(&mut self, uid: u32) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_set_uid(self.dmt.as_ptr(), uid) },
            "dm_task_set_uid",
        )
    }

    /// Set the group of device nodes created for the device.
    pub fn set_gid(&mut self, gid: u32) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_set_gid(self.dmt.as_ptr(), gid) },
            "dm_task_set_gid",
        )
    }

    /// Set the mode of device nodes created for the device.
    pub fn set_mode(&mut self, mode: u32) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_set_mode(self.dmt.as_ptr(), mode) },
            "dm_task_set_mode",
        )
    }

    /// Attach a udev cookie to the task. The cookie's semaphore is
    /// created or reused by libdevmapper; the updated value is written
    /// back into `cookie`.
    pub fn set_cookie(&mut self, cookie: &mut DmCookie, flags: DmUdevFlags) -> DmResult<()> {
        let mut value = cookie.value();
        self.check(
            unsafe { dmi::dm_task_set_cookie(self.dmt.as_ptr(), &mut value, flags.bits() as u16) },
            "dm_task_set_cookie",
        )?;
        cookie.set_value(value);
        Ok(())
    }

    /// Set the event number a waitevent task waits past.
    pub fn set_event_nr(&mut self, event_nr: u32) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_set_event_nr(self.dmt.as_ptr(), event_nr) },
            "dm_task_set_event_nr",
        )
    }

    /// Set the device geometry for a set-geometry task. All four values
    /// are decimal strings, as the driver expects.
    pub fn set_geometry(
        &mut self,
        cylinders: &str,
        heads: &str,
        sectors: &str,
        start: &str,
    ) -> DmResult<()> {
        let cylinders = to_cstring(cylinders)?;
        let heads = to_cstring(heads)?;
        let sectors = to_cstring(sectors)?;
        let start = to_cstring(start)?;
        self.check(
            unsafe {
                dmi::dm_task_set_geometry(
                    self.dmt.as_ptr(),
                    cylinders.as_ptr(),
                    heads.as_ptr(),
                    sectors.as_ptr(),
                    start.as_ptr(),
                )
            },
            "dm_task_set_geometry",
        )
    }

    /// Set the message text for a target-message task.
    pub fn set_message(&mut self, message: &str) -> DmResult<()> {
        let message = to_cstring(message)?;
        self.check(
            unsafe { dmi::dm_task_set_message(self.dmt.as_ptr(), message.as_ptr()) },
            "dm_task_set_message",
        )
    }

    /// Set the sector a target-message task addresses.
    pub fn set_sector(&mut self, sector: u64) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_set_sector(self.dmt.as_ptr(), sector) },
            "dm_task_set_sector",
        )
    }

    /// Mark the device read-only.
    pub fn set_ro(&mut self) {
        unsafe { dmi::dm_task_set_ro(self.dmt.as_ptr()) };
    }

    /// Set the read-ahead value applied when the device is resumed.
    pub fn set_read_ahead(&mut self, read_ahead: u32, read_ahead_flags: u32) -> DmResult<()> {
        self.check(
            unsafe {
                dmi::dm_task_set_read_ahead(self.dmt.as_ptr(), read_ahead, read_ahead_flags)
            },
            "dm_task_set_read_ahead",
        )
    }

    /// Control when libdevmapper adds the device node for the device.
    pub fn set_add_node(&mut self, add_node: AddNodeMode) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_set_add_node(self.dmt.as_ptr(), add_node as u32) },
            "dm_task_set_add_node",
        )
    }

    /// Suspend without flushing queued I/O.
    pub fn no_flush(&mut self) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_no_flush(self.dmt.as_ptr()) },
            "dm_task_no_flush",
        )
    }

    /// Do not collect the device's open count.
    pub fn no_open_count(&mut self) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_no_open_count(self.dmt.as_ptr()) },
            "dm_task_no_open_count",
        )
    }

    /// Avoid freezing the filesystem when suspending.
    pub fn skip_lockfs(&mut self) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_skip_lockfs(self.dmt.as_ptr()) },
            "dm_task_skip_lockfs",
        )
    }

    /// Query the inactive table slot instead of the live one.
    pub fn query_inactive_table(&mut self) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_query_inactive_table(self.dmt.as_ptr()) },
            "dm_task_query_inactive_table",
        )
    }

    /// Skip the reload if the new table matches the loaded one.
    pub fn suppress_identical_reload(&mut self) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_suppress_identical_reload(self.dmt.as_ptr()) },
            "dm_task_suppress_identical_reload",
        )
    }

    /// Wipe all ioctl buffers after use. Use when tables carry key
    /// material.
    pub fn secure_data(&mut self) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_secure_data(self.dmt.as_ptr()) },
            "dm_task_secure_data",
        )
    }

    /// Retry the remove if the device is briefly busy.
    pub fn retry_remove(&mut self) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_retry_remove(self.dmt.as_ptr()) },
            "dm_task_retry_remove",
        )
    }

    /// Schedule the remove for when the device is closed instead of
    /// failing while it is open.
    pub fn deferred_remove(&mut self) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_deferred_remove(self.dmt.as_ptr()) },
            "dm_task_deferred_remove",
        )
    }

    /// Record a timestamp immediately after the ioctl returns.
    pub fn set_record_timestamp(&mut self) -> DmResult<()> {
        self.check(
            unsafe { dmi::dm_task_set_record_timestamp(self.dmt.as_ptr()) },
            "dm_task_set_record_timestamp",
        )?;
        self.have_timestamp = true;
        Ok(())
    }

    /// Append a target row to the table a reload task loads. `start` and
    /// `size` are in 512-byte sectors.
    pub fn add_target(
        &mut self,
        start: u64,
        size: u64,
        target_type: &str,
        params: &str,
    ) -> DmResult<()> {
        let target_type = to_cstring(target_type)?;
        let params = to_cstring(params)?;
        self.check(
            unsafe {
                dmi::dm_task_add_target(
                    self.dmt.as_ptr(),
                    start,
                    size,
                    target_type.as_ptr(),
                    params.as_ptr(),
                )
            },
            "dm_task_add_target",
        )
    }

    /// Submit the task to the driver. Each task may be run at most once.
    pub fn run(&mut self) -> DmResult<()> {
        if self.did_run {
            return Err(DmError::InvalidState("task has already been run".into()));
        }
        // A run that fails still consumes the task.
        self.did_run = true;

        if unsafe { dmi::dm_task_run(self.dmt.as_ptr()) } == 0 {
            self.did_error = true;
            let errno = Errno::from_raw(unsafe { dmi::dm_task_get_errno(self.dmt.as_ptr()) });
            debug!("dm_task_run failed for {:?} task: {}", self.task_type, errno);
            return Err(DmError::Native("dm_task_run", errno));
        }

        self.data = self.task_type.result_data();
        Ok(())
    }

    fn check_run(&self, what: &str) -> DmResult<()> {
        if !self.did_run {
            return Err(DmError::NoData(format!(
                "no {what}: {:?} task has not been run",
                self.task_type
            )));
        }
        Ok(())
    }

    fn check_data(&self, kind: TaskData, what: &str) -> DmResult<()> {
        self.check_run(what)?;
        if !self.data.intersects(kind) {
            return Err(DmError::NoData(format!(
                "no {what}: not provided by {:?} tasks",
                self.task_type
            )));
        }
        Ok(())
    }

    /// The errno captured by the run; 0 if the run succeeded.
    pub fn errno(&self) -> DmResult<i32> {
        self.check_run("errno")?;
        if !self.did_error {
            return Ok(0);
        }
        Ok(unsafe { dmi::dm_task_get_errno(self.dmt.as_ptr()) })
    }

    /// The device name returned by the driver.
    pub fn name(&self) -> DmResult<DmNameBuf> {
        self.check_data(TaskData::NAME, "device name")?;
        let name = unsafe { string_from_ptr(dmi::dm_task_get_name(self.dmt.as_ptr())) }
            .ok_or_else(|| native("dm_task_get_name"))?;
        DmNameBuf::new(name)
    }

    // The mangled/unmangled name and uuid variants return freshly
    // allocated copies that the binding must release.
    fn owned_c_string(
        &self,
        kind: TaskData,
        what: &str,
        getter: unsafe extern "C" fn(*const dmi::dm_task) -> *mut nix::libc::c_char,
        op: &'static str,
    ) -> DmResult<String> {
        self.check_data(kind, what)?;
        let ptr = unsafe { getter(self.dmt.as_ptr()) };
        let value = unsafe { string_from_ptr(ptr) }.ok_or_else(|| native(op))?;
        unsafe { free(ptr as *mut c_void) };
        Ok(value)
    }

    /// The device name, mangled per the current name-mangling mode.
    pub fn name_mangled(&self) -> DmResult<String> {
        self.owned_c_string(
            TaskData::NAME,
            "device name",
            dmi::dm_task_get_name_mangled,
            "dm_task_get_name_mangled",
        )
    }

    /// The device name with any mangling undone.
    pub fn name_unmangled(&self) -> DmResult<String> {
        self.owned_c_string(
            TaskData::NAME,
            "device name",
            dmi::dm_task_get_name_unmangled,
            "dm_task_get_name_unmangled",
        )
    }

    /// The device uuid returned by the driver. Empty if the device has
    /// no uuid.
    pub fn uuid(&self) -> DmResult<String> {
        self.check_data(TaskData::UUID, "device uuid")?;
        unsafe { string_from_ptr(dmi::dm_task_get_uuid(self.dmt.as_ptr())) }
            .ok_or_else(|| native("dm_task_get_uuid"))
    }

    /// The device uuid, mangled per the current name-mangling mode.
    pub fn uuid_mangled(&self) -> DmResult<String> {
        self.owned_c_string(
            TaskData::UUID,
            "device uuid",
            dmi::dm_task_get_uuid_mangled,
            "dm_task_get_uuid_mangled",
        )
    }

    /// The device uuid with any mangling undone.
    pub fn uuid_unmangled(&self) -> DmResult<String> {
        self.owned_c_string(
            TaskData::UUID,
            "device uuid",
            dmi::dm_task_get_uuid_unmangled,
            "dm_task_get_uuid_unmangled",
        )
    }

    /// The device information snapshot returned by an info-bearing task.
    pub fn info(&self) -> DmResult<DeviceInfo> {
        self.check_data(TaskData::INFO, "device info")?;
        let mut info = dmi::dm_info::default();
        self.check(
            unsafe {
                dmi::dm_task_get_info_with_deferred_remove(self.dmt.as_ptr(), &mut info)
            },
            "dm_task_get_info",
        )?;
        Ok(DeviceInfo::from(info))
    }

    /// The devices the queried device depends on.
    pub fn deps(&self) -> DmResult<Vec<Device>> {
        self.check_data(TaskData::DEPS, "device dependencies")?;
        let deps = unsafe { dmi::dm_task_get_deps(self.dmt.as_ptr()).as_ref() }
            .ok_or_else(|| native("dm_task_get_deps"))?;

        // Dependency entries use the kernel's "huge" kdev_t encoding.
        Ok(unsafe { deps.device.as_slice(deps.count as usize) }
            .iter()
            .map(|dev| Device::from_kdev_t(*dev as u32))
            .collect())
    }

    /// The device list returned by a list task: name and device number
    /// for every device-mapper device on the system.
    pub fn names(&self) -> DmResult<Vec<(DmNameBuf, Device)>> {
        self.check_data(TaskData::NAME_LIST, "name list")?;
        let names = unsafe { dmi::dm_task_get_names(self.dmt.as_ptr()) };
        if names.is_null() {
            return Err(native("dm_task_get_names"));
        }

        let mut devices = Vec::new();
        let mut current = names as *const u8;
        loop {
            let hdr = unsafe { &*(current as *const dmi::dm_names) };
            // A single entry with dev 0 marks an empty list.
            if hdr.dev == 0 {
                break;
            }
            let name = unsafe { string_from_ptr(hdr.name.as_ptr()) }
                .ok_or_else(|| native("dm_task_get_names"))?;
            devices.push((DmNameBuf::new(name)?, Device::from_kdev_t(hdr.dev as u32)));
            if hdr.next == 0 {
                break;
            }
            current = unsafe { current.add(hdr.next as usize) };
        }
        Ok(devices)
    }

    /// The target versions returned by a list-versions task, as
    /// (target name, (major, minor, patchlevel)).
    pub fn versions(&self) -> DmResult<Vec<(String, (u32, u32, u32))>> {
        self.check_data(TaskData::TARGET_VERSIONS, "target versions")?;
        let versions = unsafe { dmi::dm_task_get_versions(self.dmt.as_ptr()) };
        if versions.is_null() {
            return Err(native("dm_task_get_versions"));
        }

        let mut targets = Vec::new();
        let mut current = versions as *const u8;
        loop {
            let tver = unsafe { &*(current as *const dmi::dm_versions) };
            let name = unsafe { string_from_ptr(tver.name.as_ptr()) }
                .ok_or_else(|| native("dm_task_get_versions"))?;
            targets.push((
                name,
                (tver.version[0], tver.version[1], tver.version[2]),
            ));
            if tver.next == 0 {
                break;
            }
            current = unsafe { current.add(tver.next as usize) };
        }
        Ok(targets)
    }

    /// The target rows returned by a table or status task, as
    /// (start, length, target type, params). For a table task the
    /// params are the loaded table line; for a status task, the
    /// target's status line. An empty table yields an empty list.
    pub fn targets(&self) -> DmResult<Vec<(u64, u64, String, String)>> {
        self.check_data(TaskData::TABLE | TaskData::STATUS, "target list")?;

        let mut targets = Vec::new();
        let mut next: *mut c_void = ptr::null_mut();
        loop {
            let mut start = 0u64;
            let mut length = 0u64;
            let mut target_type: *mut nix::libc::c_char = ptr::null_mut();
            let mut params: *mut nix::libc::c_char = ptr::null_mut();
            next = unsafe {
                dmi::dm_get_next_target(
                    self.dmt.as_ptr(),
                    next,
                    &mut start,
                    &mut length,
                    &mut target_type,
                    &mut params,
                )
            };
            // target_type is NULL when the table holds no targets.
            if let Some(target_type) = unsafe { string_from_ptr(target_type) } {
                let params = unsafe { string_from_ptr(params) }.unwrap_or_default();
                targets.push((start, length, target_type, params));
            }
            if next.is_null() {
                break;
            }
        }
        Ok(targets)
    }

    /// The response generated by a target-message task, if any.
    pub fn message_response(&self) -> DmResult<String> {
        self.check_data(TaskData::MESSAGE, "message response")?;
        unsafe { string_from_ptr(dmi::dm_task_get_message_response(self.dmt.as_ptr())) }
            .ok_or_else(|| native("dm_task_get_message_response"))
    }

    /// The driver version string. Available after any successful run.
    pub fn driver_version(&self) -> DmResult<String> {
        self.check_run("driver version")?;
        let mut buf = [0u8; 64];
        self.check(
            unsafe {
                dmi::dm_task_get_driver_version(
                    self.dmt.as_ptr(),
                    buf.as_mut_ptr() as *mut nix::libc::c_char,
                    buf.len(),
                )
            },
            "dm_task_get_driver_version",
        )?;
        Ok(crate::util::str_from_byte_slice(&buf)
            .unwrap_or("")
            .to_string())
    }

    /// The time at which the ioctl returned. Requires
    /// `set_record_timestamp` to have been called before the run.
    pub fn ioctl_timestamp(&self) -> DmResult<DmTimestamp> {
        self.check_run("ioctl timestamp")?;
        if !self.have_timestamp {
            return Err(DmError::NoData(
                "no ioctl timestamp: timestamping was not enabled".into(),
            ));
        }
        let ts = unsafe { dmi::dm_task_get_ioctl_timestamp(self.dmt.as_ptr()) };
        if ts.is_null() {
            return Err(native("dm_task_get_ioctl_timestamp"));
        }
        // The returned timestamp lives in the ioctl buffer; copy it out.
        unsafe { DmTimestamp::copy_from(ts) }
    }
}

impl Drop for DmTask {
    fn drop(&mut self) {
        unsafe { dmi::dm_task_destroy(self.dmt.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{init_logger, test_name, test_uuid};

    use super::*;

    #[test]
    /// Construction succeeds for every recognized task type.
    fn test_all_task_types_construct() {
        for task_type in TASK_TYPES {
            assert_matches!(DmTask::new(task_type), Ok(_));
        }
    }

    #[test]
    /// Numeric conversion accepts every operation code and rejects
    /// unrecognized values.
    fn test_task_type_from_code() {
        for (code, task_type) in TASK_TYPES.iter().enumerate() {
            assert_eq!(TaskType::try_from(code as u32).unwrap(), *task_type);
        }
        assert_matches!(
            TaskType::try_from(TASK_TYPES.len() as u32),
            Err(DmError::InvalidArgument(_))
        );
    }

    #[test]
    /// Every result accessor fails before run() is called.
    fn test_accessors_before_run() {
        let task = DmTask::new(TaskType::Info).unwrap();
        assert_matches!(task.errno(), Err(DmError::NoData(_)));
        assert_matches!(task.name(), Err(DmError::NoData(_)));
        assert_matches!(task.name_mangled(), Err(DmError::NoData(_)));
        assert_matches!(task.uuid(), Err(DmError::NoData(_)));
        assert_matches!(task.info(), Err(DmError::NoData(_)));
        assert_matches!(task.deps(), Err(DmError::NoData(_)));
        assert_matches!(task.names(), Err(DmError::NoData(_)));
        assert_matches!(task.versions(), Err(DmError::NoData(_)));
        assert_matches!(task.targets(), Err(DmError::NoData(_)));
        assert_matches!(task.message_response(), Err(DmError::NoData(_)));
        assert_matches!(task.driver_version(), Err(DmError::NoData(_)));
        assert_matches!(task.ioctl_timestamp(), Err(DmError::NoData(_)));
    }

    #[test]
    /// A task type that produces no deps data reports NoData for deps
    /// even after a successful run.
    fn sudo_test_wrong_kind_after_run() {
        init_logger();
        let mut task = DmTask::new(TaskType::Version).unwrap();
        task.run().unwrap();
        assert_matches!(task.deps(), Err(DmError::NoData(_)));
        assert_matches!(task.names(), Err(DmError::NoData(_)));
        assert_matches!(task.targets(), Err(DmError::NoData(_)));
    }

    #[test]
    /// Device numbers that do not fit the native int are rejected
    /// before reaching libdevmapper.
    fn test_device_number_range() {
        let mut task = DmTask::new(TaskType::Info).unwrap();
        assert_matches!(task.set_major(u32::MAX), Err(DmError::InvalidArgument(_)));
        assert_matches!(task.set_minor(u32::MAX), Err(DmError::InvalidArgument(_)));
        assert_matches!(
            task.set_major_minor(
                Device {
                    major: u32::MAX,
                    minor: 0
                },
                false
            ),
            Err(DmError::InvalidArgument(_))
        );
        assert_matches!(task.set_major(253), Ok(()));
        assert_matches!(task.set_minor(0), Ok(()));
    }

    #[test]
    /// A version task runs successfully and yields a driver version;
    /// errno reports 0 for the successful run.
    fn sudo_test_version_run() {
        init_logger();
        let mut task = DmTask::new(TaskType::Version).unwrap();
        task.run().unwrap();
        assert_eq!(task.errno().unwrap(), 0);
        assert!(!task.driver_version().unwrap().is_empty());
    }

    #[test]
    /// A second run on the same task is rejected locally.
    fn sudo_test_run_twice() {
        init_logger();
        let mut task = DmTask::new(TaskType::Version).unwrap();
        task.run().unwrap();
        assert_matches!(task.run(), Err(DmError::InvalidState(_)));
    }

    #[test]
    /// Running an info task against a device that does not exist fails
    /// with a native error, and errno records the failure.
    fn sudo_test_info_nonexistent() {
        init_logger();
        let name = test_name("no-such-device").expect("is valid DM name");
        let mut task = DmTask::new(TaskType::Info).unwrap();
        task.set_name(&name).unwrap();
        assert_matches!(task.run(), Err(DmError::Native("dm_task_run", _)));
        assert_ne!(task.errno().unwrap(), 0);
    }

    #[test]
    /// Querying by uuid misses a nonexistent device the same way as
    /// querying by name.
    fn sudo_test_info_nonexistent_uuid() {
        init_logger();
        let uuid = test_uuid("no-such-uuid").expect("is valid DM uuid");
        let mut task = DmTask::new(TaskType::Info).unwrap();
        task.set_uuid(&uuid).unwrap();
        assert_matches!(task.run(), Err(DmError::Native("dm_task_run", _)));
    }

    #[test]
    /// The target version list of a running kernel is never empty.
    fn sudo_test_list_versions() {
        init_logger();
        let mut task = DmTask::new(TaskType::ListVersions).unwrap();
        task.run().unwrap();
        assert!(!task.versions().unwrap().is_empty());
    }

    #[test]
    /// Timestamps recorded for two consecutive runs are ordered.
    fn sudo_test_ioctl_timestamp() {
        init_logger();
        let mut task = DmTask::new(TaskType::Version).unwrap();
        task.set_record_timestamp().unwrap();
        task.run().unwrap();
        let ts = task.ioctl_timestamp().unwrap();
        let now = crate::timestamp::DmTimestamp::now().unwrap();
        assert_ne!(ts.compare(&now), std::cmp::Ordering::Greater);
    }
}

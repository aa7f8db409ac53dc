// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*! Definition of the error class for all binding operations !*/

use std::fmt;

use nix::errno::Errno;

/// Error for libdevmapper binding operations
#[derive(Clone, Debug)]
pub enum DmError {
    /// This is a generic error that can be returned when a method
    /// receives an invalid argument. Ideally, the argument should be
    /// invalid in itself, i.e., it should not be made invalid by some
    /// part of the program state or the environment. Raised before any
    /// call into libdevmapper is made.
    InvalidArgument(String),

    /// A libdevmapper entry point reported failure. Carries the name of
    /// the entry point and the errno observed at the time of failure.
    Native(&'static str, Errno),

    /// A result accessor was called on a task that has not yet run
    /// successfully, or whose task type never produces that result kind.
    NoData(String),

    /// An operation was invoked out of order, such as running a task a
    /// second time or waiting on an already completed udev cookie.
    InvalidState(String),
}

impl fmt::Display for DmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DmError::InvalidArgument(err) => write!(f, "invalid argument: {err}"),
            DmError::Native(op, errno) => write!(f, "{op} failed: {errno}"),
            DmError::NoData(err) => write!(f, "no data available: {err}"),
            DmError::InvalidState(err) => write!(f, "operation out of order: {err}"),
        }
    }
}

impl std::error::Error for DmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DmError::Native(_, errno) => Some(errno),
            _ => None,
        }
    }
}

/// Construct a `Native` error for the named entry point from the errno
/// current at the point of failure.
pub(crate) fn native(op: &'static str) -> DmError {
    DmError::Native(op, Errno::last())
}

/// Return type for binding operations
pub type DmResult<T> = Result<T, DmError>;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    ffi::{CStr, CString},
    str,
};

use nix::libc::c_char;

use crate::errors::{DmError, DmResult};

/// Convert a `&str` to a `CString` suitable for passing into
/// libdevmapper. Fails if the value contains an interior NUL byte.
pub(crate) fn to_cstring(value: &str) -> DmResult<CString> {
    CString::new(value)
        .map_err(|_| DmError::InvalidArgument(format!("value {value} contains a NUL byte")))
}

/// Return an owned String read from a C string pointer, or None if the
/// pointer is NULL.
///
/// # Safety
/// `ptr` must be NULL or point to a NUL-terminated C string.
pub(crate) unsafe fn string_from_ptr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// Return a &str parsed from the byte slice up to the first \0, or None
pub(crate) fn str_from_byte_slice(slc: &[u8]) -> Option<&str> {
    slc.iter()
        .position(|c| *c == b'\0')
        .and_then(|i| str::from_utf8(&slc[..i]).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Interior NUL bytes can not cross the FFI boundary.
    fn test_to_cstring_rejects_nul() {
        assert_matches!(to_cstring("a\0b"), Err(DmError::InvalidArgument(_)));
        assert_matches!(to_cstring("ab"), Ok(_));
    }

    #[test]
    /// Parsing stops at the first NUL; an unterminated slice yields None.
    fn test_str_from_byte_slice() {
        assert_eq!(str_from_byte_slice(b"abc\0def"), Some("abc"));
        assert_eq!(str_from_byte_slice(b"abc"), None);
        assert_eq!(str_from_byte_slice(b"\0"), Some(""));
    }
}

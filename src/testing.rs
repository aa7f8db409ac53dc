// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::{
    errors::DmResult,
    types::{DmNameBuf, DmUuidBuf},
};

/// String that is to be concatenated with test supplied name, so that
/// leftover devices can easily be identified and removed.
static DM_TEST_ID: &str = "_libdm-rs_test_delme";

/// Generate the test name given the test supplied name.
pub fn test_name(name: &str) -> DmResult<DmNameBuf> {
    DmNameBuf::new(format!("{name}{DM_TEST_ID}"))
}

/// Generate the test uuid given the test supplied name.
pub fn test_uuid(name: &str) -> DmResult<DmUuidBuf> {
    DmUuidBuf::new(format!("{name}{DM_TEST_ID}"))
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

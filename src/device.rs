// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{fmt, str::FromStr};

use crate::errors::{DmError, DmResult};

/// A struct containing the device's major and minor numbers
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Device {
    /// Device major number
    pub major: u32,
    /// Device minor number
    pub minor: u32,
}

/// Display format is the device number in "<major>:<minor>" format
impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

impl FromStr for Device {
    type Err = DmError;

    fn from_str(s: &str) -> DmResult<Device> {
        let vals = s.split(':').collect::<Vec<_>>();
        if vals.len() != 2 {
            let err_msg = format!("value \"{s}\" split into wrong number of fields");
            return Err(DmError::InvalidArgument(err_msg));
        }
        let major = vals[0].parse::<u32>().map_err(|_| {
            DmError::InvalidArgument(format!(
                "could not parse \"{}\" to obtain major number",
                vals[0]
            ))
        })?;
        let minor = vals[1].parse::<u32>().map_err(|_| {
            DmError::InvalidArgument(format!(
                "could not parse \"{}\" to obtain minor number",
                vals[1]
            ))
        })?;
        Ok(Device { major, minor })
    }
}

/// The Linux kernel's kdev_t encodes major/minor values as mmmM MMmm.
impl Device {
    /// Make a Device from a kdev_t.
    pub fn from_kdev_t(val: u32) -> Device {
        Device {
            major: (val & 0xf_ff00) >> 8,
            minor: (val & 0xff) | ((val >> 12) & 0xf_ff00),
        }
    }

    /// Convert to a kdev_t. Return None if values are not expressible as a
    /// kdev_t.
    pub fn to_kdev_t(self) -> Option<u32> {
        if self.major > 0xfff || self.minor > 0xf_ffff {
            return None;
        }

        Some((self.minor & 0xff) | (self.major << 8) | ((self.minor & !0xff) << 12))
    }
}

impl serde::Serialize for Device {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Device {
    fn deserialize<D>(deserializer: D) -> Result<Device, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let value: String = serde::Deserialize::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    /// Verify conversion is correct both ways
    fn test_kdev_t_conversion() {
        let test_devt_1: u32 = 0x1234_5678;

        let dev1 = Device::from_kdev_t(test_devt_1);
        // Default kernel kdev_t "huge" encoding is mmmM MMmm.
        assert_eq!(dev1.major, 0x456);
        assert_eq!(dev1.minor, 0x1_2378);

        let test_devt_2: u32 = dev1.to_kdev_t().unwrap();
        assert_eq!(test_devt_1, test_devt_2);

        // a Device inexpressible as a kdev_t
        let dev2 = Device {
            major: 0x1000,
            minor: 0,
        };
        assert_eq!(dev2.to_kdev_t(), None);
    }

    #[test]
    /// Verify FromStr parsing and its failure modes
    fn test_from_str() {
        assert_eq!(
            "253:0".parse::<Device>().unwrap(),
            Device { major: 253, minor: 0 }
        );
        assert_matches!(
            "253".parse::<Device>(),
            Err(DmError::InvalidArgument(_))
        );
        assert_matches!(
            "a:0".parse::<Device>(),
            Err(DmError::InvalidArgument(_))
        );
    }
}

//! AER health summaries
//!
//! Summaries are per-device facts: a child's errors never change its
//! parent's summary.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::device::{DeviceMap, PciDevice};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Summary {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERR")]
    Err,
}

impl Summary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Summary::Ok => "OK",
            Summary::Err => "ERR",
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True iff any counter in any of the three categories is nonzero.
pub fn has_errors(device: &PciDevice) -> bool {
    device
        .errors
        .categories()
        .iter()
        .any(|(_, counters)| counters.values().any(|&count| count > 0))
}

pub fn device_summary(device: &PciDevice) -> Summary {
    if has_errors(device) {
        Summary::Err
    } else {
        Summary::Ok
    }
}

/// `ERR` if any scanned device has errors.
pub fn all_summary(devices: &DeviceMap) -> Summary {
    if devices.values().any(has_errors) {
        Summary::Err
    } else {
        Summary::Ok
    }
}

/// Addresses of the devices reporting errors, sorted.
pub fn failing_devices(devices: &DeviceMap) -> Vec<&str> {
    devices
        .values()
        .filter(|d| has_errors(d))
        .map(|d| d.address.as_str())
        .collect()
}

/// Every counter name seen in any category of any device, sorted.
pub fn counter_names(devices: &DeviceMap) -> BTreeSet<String> {
    devices
        .values()
        .flat_map(|d| d.errors.categories())
        .flat_map(|(_, counters)| counters.keys().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(address: &str) -> PciDevice {
        PciDevice::new(address)
    }

    #[test]
    fn test_zero_counts_are_ok() {
        let mut dev = device("0000:00:00.0");
        dev.errors.correctable.insert("RxErr".to_string(), 0);
        dev.errors.fatal.insert("DLP".to_string(), 0);
        assert!(!has_errors(&dev));
        assert_eq!(device_summary(&dev), Summary::Ok);
    }

    #[test]
    fn test_any_category_flags_error() {
        for category in 0..3 {
            let mut dev = device("0000:00:00.0");
            let counters = match category {
                0 => &mut dev.errors.correctable,
                1 => &mut dev.errors.nonfatal,
                _ => &mut dev.errors.fatal,
            };
            counters.insert("X".to_string(), 1);
            assert_eq!(device_summary(&dev), Summary::Err);
        }
    }

    #[test]
    fn test_all_summary() {
        let mut devices = DeviceMap::new();
        assert_eq!(all_summary(&devices), Summary::Ok);

        devices.insert("0000:00:00.0".to_string(), device("0000:00:00.0"));
        assert_eq!(all_summary(&devices), Summary::Ok);

        let mut bad = device("0000:01:00.0");
        bad.errors.nonfatal.insert("CmpltTO".to_string(), 3);
        devices.insert(bad.address.clone(), bad);
        assert_eq!(all_summary(&devices), Summary::Err);
        assert_eq!(failing_devices(&devices), vec!["0000:01:00.0"]);
        assert_eq!(device_summary(&devices["0000:00:00.0"]), Summary::Ok);
    }

    #[test]
    fn test_counter_names_union() {
        let mut a = device("0000:00:00.0");
        a.errors.correctable.insert("RxErr".to_string(), 0);
        let mut b = device("0000:01:00.0");
        b.errors.fatal.insert("DLP".to_string(), 1);
        b.errors.correctable.insert("RxErr".to_string(), 2);

        let devices: DeviceMap = vec![a, b].into_iter().map(|d| (d.address.clone(), d)).collect();
        let names: Vec<_> = counter_names(&devices).into_iter().collect();
        assert_eq!(names, vec!["DLP".to_string(), "RxErr".to_string()]);
    }

    #[test]
    fn test_summary_serializes() {
        assert_eq!(serde_json::to_string(&Summary::Err).unwrap(), "\"ERR\"");
        assert_eq!(Summary::Ok.to_string(), "OK");
    }
}

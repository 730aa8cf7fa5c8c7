//! Device scanner
//!
//! Builds one `PciDevice` per immediate subdirectory of the scan root. Only
//! failing to list the root is fatal; everything below it degrades.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::device::{DeviceMap, FeatureKind, PciDevice, CLASS_BRIDGE};
use crate::sysfs;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to list device directory {path}: {source}")]
    ListRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Scan every device directory under `root`.
pub fn scan_all(root: &Path) -> Result<DeviceMap> {
    let entries = std::fs::read_dir(root).map_err(|e| ScanError::ListRoot {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut devices = DeviceMap::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("{}: skipping unreadable entry: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                log::warn!("skipping non UTF-8 device directory {:?}", name);
                continue;
            }
        };

        let device = scan_device(&path, &name);
        devices.insert(name, device);
    }

    log::debug!("scanned {} devices under {}", devices.len(), root.display());
    Ok(devices)
}

/// Build the record for a single device directory.
pub fn scan_device(dir: &Path, address: &str) -> PciDevice {
    let mut device = PciDevice::new(address);
    device.vendor = sysfs::read_hex_u16(&dir.join(sysfs::VENDOR_FILE));
    device.device = sysfs::read_hex_u16(&dir.join(sysfs::DEVICE_FILE));
    device.class = sysfs::read_class(&dir.join(sysfs::CLASS_FILE));

    device.errors.correctable = sysfs::read_counters(&dir.join(sysfs::AER_CORRECTABLE_FILE));
    device.errors.nonfatal = sysfs::read_counters(&dir.join(sysfs::AER_NONFATAL_FILE));
    device.errors.fatal = sysfs::read_counters(&dir.join(sysfs::AER_FATAL_FILE));

    if device.base_class() == CLASS_BRIDGE {
        if let Some(config) = sysfs::read_config(&dir.join(sysfs::CONFIG_FILE)) {
            if let Err(e) = device.add_feature(FeatureKind::Bridge, &config) {
                log::warn!("{}: treating as non-bridge: {}", address, e);
            }
        }
    }

    device
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, file: &str, content: &[u8]) {
        fs::write(dir.join(file), content).unwrap();
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan_all(&dir.path().join("nope"));
        assert!(matches!(result, Err(ScanError::ListRoot { .. })));
    }

    #[test]
    fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_all(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_scan_device_fields() {
        let root = tempfile::tempdir().unwrap();
        let dev = root.path().join("0001:02:00.0");
        fs::create_dir(&dev).unwrap();
        write(&dev, sysfs::VENDOR_FILE, b"0x8086\n");
        write(&dev, sysfs::DEVICE_FILE, b"1234\n");
        write(&dev, sysfs::CLASS_FILE, b"0x010802\n");
        write(&dev, sysfs::AER_CORRECTABLE_FILE, b"RxErr 1\nTOTAL_ERR_COR 1\n");
        // stray files next to device directories are ignored
        write(root.path(), "README", b"not a device");

        let devices = scan_all(root.path()).unwrap();
        assert_eq!(devices.len(), 1);
        let d = &devices["0001:02:00.0"];
        assert_eq!((d.domain, d.bus), (1, 2));
        assert_eq!((d.vendor, d.device, d.class), (0x8086, 0x1234, 0x010802));
        assert_eq!(d.errors.correctable.len(), 1);
        assert!(d.errors.fatal.is_empty());
        assert!(!d.is_bridge());
    }

    #[test]
    fn test_bridge_needs_class_and_config() {
        let root = tempfile::tempdir().unwrap();
        let mut config = vec![0u8; 64];
        config[0x18] = 0;
        config[0x19] = 1;
        config[0x1a] = 3;

        let bridge = root.path().join("0000:00:01.0");
        fs::create_dir(&bridge).unwrap();
        write(&bridge, sysfs::CLASS_FILE, b"0x060400");
        write(&bridge, sysfs::CONFIG_FILE, &config);

        // same config bytes, but not a bridge class
        let nic = root.path().join("0000:00:02.0");
        fs::create_dir(&nic).unwrap();
        write(&nic, sysfs::CLASS_FILE, b"0x020000");
        write(&nic, sysfs::CONFIG_FILE, &config);

        let short = root.path().join("0000:00:03.0");
        fs::create_dir(&short).unwrap();
        write(&short, sysfs::CLASS_FILE, b"0x060400");
        write(&short, sysfs::CONFIG_FILE, &config[..0x10]);

        let devices = scan_all(root.path()).unwrap();
        assert_eq!(devices["0000:00:01.0"].bridge().map(|b| b.subordinate), Some(3));
        assert!(!devices["0000:00:02.0"].is_bridge());
        assert!(!devices["0000:00:03.0"].is_bridge());
    }

    #[test]
    fn test_malformed_directory_name_kept() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("weird")).unwrap();
        let devices = scan_all(root.path()).unwrap();
        let d = &devices["weird"];
        assert_eq!((d.domain, d.bus), (0, 0));
    }
}

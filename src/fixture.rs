//! Synthetic sysfs device trees
//!
//! Writes the same per-device layout the kernel exposes under
//! `/sys/bus/pci/devices`, so scans can be exercised without hardware.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::device::feature::{PRIMARY_BUS_OFFSET, SECONDARY_BUS_OFFSET, SUBORDINATE_BUS_OFFSET};
use crate::device::parse_address;
use crate::sysfs;

const CONFIG_SPACE_SIZE: usize = 256;
const HEADER_TYPE_OFFSET: usize = 0x0e;
const HEADER_TYPE_BRIDGE: u8 = 0x01;

const CLASS_PCI_BRIDGE: u32 = 0x060400;
const CLASS_ETHERNET: u32 = 0x020000;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn write_file(path: PathBuf, content: &[u8]) -> Result<(), FixtureError> {
    fs::write(&path, content).map_err(|source| FixtureError::Io { path, source })
}

/// One device directory to be written.
#[derive(Clone, Debug)]
pub struct FixtureDevice {
    pub address: String,
    pub vendor: u16,
    pub device: u16,
    pub class: u32,
    /// `(secondary, subordinate)` for bridges
    pub bus_range: Option<(u8, u8)>,
    pub correctable: Vec<(String, u64)>,
    pub nonfatal: Vec<(String, u64)>,
    pub fatal: Vec<(String, u64)>,
}

impl FixtureDevice {
    pub fn endpoint(address: &str) -> Self {
        Self {
            address: address.to_string(),
            vendor: 0x8086,
            device: 0x1533,
            class: CLASS_ETHERNET,
            bus_range: None,
            correctable: Vec::new(),
            nonfatal: Vec::new(),
            fatal: Vec::new(),
        }
    }

    pub fn bridge(address: &str, secondary: u8, subordinate: u8) -> Self {
        Self {
            device: 0x1901,
            class: CLASS_PCI_BRIDGE,
            bus_range: Some((secondary, subordinate)),
            ..Self::endpoint(address)
        }
    }

    pub fn ids(mut self, vendor: u16, device: u16) -> Self {
        self.vendor = vendor;
        self.device = device;
        self
    }

    pub fn class(mut self, class: u32) -> Self {
        self.class = class;
        self
    }

    pub fn correctable(mut self, name: &str, count: u64) -> Self {
        self.correctable.push((name.to_string(), count));
        self
    }

    pub fn nonfatal(mut self, name: &str, count: u64) -> Self {
        self.nonfatal.push((name.to_string(), count));
        self
    }

    pub fn fatal(mut self, name: &str, count: u64) -> Self {
        self.fatal.push((name.to_string(), count));
        self
    }

    /// Raw type 0 or type 1 config header.
    pub fn config_space(&self) -> Vec<u8> {
        let mut config = vec![0u8; CONFIG_SPACE_SIZE];
        config[0..2].copy_from_slice(&self.vendor.to_le_bytes());
        config[2..4].copy_from_slice(&self.device.to_le_bytes());
        config[0x09..0x0c].copy_from_slice(&self.class.to_le_bytes()[..3]);
        if let Some((secondary, subordinate)) = self.bus_range {
            let (_, bus) = parse_address(&self.address);
            config[HEADER_TYPE_OFFSET] = HEADER_TYPE_BRIDGE;
            config[PRIMARY_BUS_OFFSET] = bus;
            config[SECONDARY_BUS_OFFSET] = secondary;
            config[SUBORDINATE_BUS_OFFSET] = subordinate;
        }
        config
    }

    fn has_aer(&self) -> bool {
        !(self.correctable.is_empty() && self.nonfatal.is_empty() && self.fatal.is_empty())
    }

    pub fn write(&self, root: &Path) -> Result<(), FixtureError> {
        let dir = root.join(&self.address);
        fs::create_dir_all(&dir).map_err(|source| FixtureError::Io {
            path: dir.clone(),
            source,
        })?;

        write_file(dir.join(sysfs::VENDOR_FILE), format!("0x{:04x}\n", self.vendor).as_bytes())?;
        write_file(dir.join(sysfs::DEVICE_FILE), format!("0x{:04x}\n", self.device).as_bytes())?;
        write_file(dir.join(sysfs::CLASS_FILE), format!("0x{:06x}\n", self.class).as_bytes())?;
        write_file(dir.join(sysfs::CONFIG_FILE), &self.config_space())?;

        if self.has_aer() {
            let files = [
                (sysfs::AER_CORRECTABLE_FILE, "TOTAL_ERR_COR", &self.correctable),
                (sysfs::AER_NONFATAL_FILE, "TOTAL_ERR_NONFATAL", &self.nonfatal),
                (sysfs::AER_FATAL_FILE, "TOTAL_ERR_FATAL", &self.fatal),
            ];
            for (file, total_name, counters) in files {
                let mut body = String::new();
                for (name, count) in counters {
                    body.push_str(&format!("{} {}\n", name, count));
                }
                let total: u64 = counters.iter().map(|(_, count)| count).sum();
                body.push_str(&format!("{} {}\n", total_name, total));
                write_file(dir.join(file), body.as_bytes())?;
            }
        }
        Ok(())
    }
}

/// Write every device under `root`, creating it if needed.
pub fn write_fixture(root: &Path, devices: &[FixtureDevice]) -> Result<(), FixtureError> {
    fs::create_dir_all(root).map_err(|source| FixtureError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    for device in devices {
        device.write(root)?;
    }
    log::debug!("wrote {} fixture devices to {}", devices.len(), root.display());
    Ok(())
}

/// Two domains: a three-level bridge chain with a failing leaf in domain 0
/// and two sibling root ports in domain 1.
pub fn demo() -> Vec<FixtureDevice> {
    vec![
        FixtureDevice::endpoint("0000:00:00.0").ids(0x8086, 0x3e30).class(0x050000),
        FixtureDevice::bridge("0000:00:01.0", 0x01, 0x03),
        FixtureDevice::bridge("0000:01:00.0", 0x02, 0x03).ids(0x1000, 0xc010),
        FixtureDevice::bridge("0000:02:00.0", 0x03, 0x03).ids(0x1000, 0xc010),
        FixtureDevice::endpoint("0000:03:00.0")
            .ids(0x15b3, 0x1017)
            .correctable("RxErr", 0)
            .correctable("BadTLP", 3)
            .nonfatal("CmpltTO", 1),
        FixtureDevice::endpoint("0000:00:1f.0").ids(0x8086, 0xa323).class(0x0c0500),
        FixtureDevice::bridge("0001:00:1c.0", 0x10, 0x12),
        FixtureDevice::endpoint("0001:10:00.0").ids(0x144d, 0xa808).class(0x010802),
        FixtureDevice::bridge("0001:00:1d.0", 0x20, 0x21),
        FixtureDevice::endpoint("0001:20:00.0")
            .ids(0x144d, 0xa808)
            .class(0x010802)
            .correctable("RxErr", 0),
    ]
}

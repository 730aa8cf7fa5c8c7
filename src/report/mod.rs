//! Renderers for a finished scan
//!
//! Pure consumers of the device map and topology: JSON keyed by address,
//! an indented per-domain tree, and a flat table with one column per
//! counter name observed anywhere in the scan.

pub mod table;
pub mod tree;

use std::collections::BTreeMap;
use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::aer::{self, Summary};
use crate::device::{DeviceMap, ErrorCounts, PciDevice};

pub use table::render_table;
pub use tree::render_tree;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Per-device JSON entry.
#[derive(Serialize, Debug)]
pub struct DeviceReport<'a> {
    pub summary: Summary,
    pub parent: Option<&'a str>,
    pub children: &'a [String],
    pub vendor: String,
    pub device: String,
    pub class: String,
    pub errors: &'a ErrorCounts,
}

impl<'a> DeviceReport<'a> {
    pub fn new(device: &'a PciDevice) -> Self {
        Self {
            summary: aer::device_summary(device),
            parent: device.parent.as_deref(),
            children: &device.children,
            vendor: format!("0x{:04x}", device.vendor),
            device: format!("0x{:04x}", device.device),
            class: device.class_code(),
            errors: &device.errors,
        }
    }
}

/// Top-level JSON document: one key per address plus `all_summary`.
#[derive(Serialize, Debug)]
pub struct ScanReport<'a> {
    #[serde(flatten)]
    pub devices: BTreeMap<&'a str, DeviceReport<'a>>,
    pub all_summary: Summary,
}

impl<'a> ScanReport<'a> {
    pub fn new(devices: &'a DeviceMap) -> Self {
        Self {
            devices: devices
                .iter()
                .map(|(address, device)| (address.as_str(), DeviceReport::new(device)))
                .collect(),
            all_summary: aer::all_summary(devices),
        }
    }
}

pub fn to_json(devices: &DeviceMap) -> Result<serde_json::Value, ReportError> {
    Ok(serde_json::to_value(ScanReport::new(devices))?)
}

pub fn write_json<W: io::Write>(devices: &DeviceMap, mut out: W) -> Result<(), ReportError> {
    serde_json::to_writer_pretty(&mut out, &ScanReport::new(devices))?;
    writeln!(out)?;
    Ok(())
}

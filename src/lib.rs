// pcitree - PCI topology and AER health from sysfs

pub mod aer;
pub mod config;
pub mod device;
pub mod fixture;
pub mod report;
pub mod scan;
pub mod sysfs;
pub mod topology;

use std::path::Path;

pub use aer::Summary;
pub use config::{OutputFormat, ScanConfig};
pub use device::{DeviceMap, PciDevice};
pub use scan::ScanError;
pub use topology::Topology;

/// Result of one full pass: devices with parent/children filled in, and the
/// per-domain roots.
#[derive(Debug)]
pub struct Scan {
    pub devices: DeviceMap,
    pub topology: Topology,
}

impl Scan {
    pub fn all_summary(&self) -> Summary {
        aer::all_summary(&self.devices)
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, report::ReportError> {
        match format {
            OutputFormat::Json => {
                let mut out = Vec::new();
                report::write_json(&self.devices, &mut out)?;
                Ok(String::from_utf8_lossy(&out).into_owned())
            }
            OutputFormat::Tree => Ok(report::render_tree(&self.devices, &self.topology)),
            OutputFormat::Table => Ok(report::render_table(&self.devices)),
        }
    }
}

/// Scan `root` and build the hierarchy. Each call starts from nothing.
pub fn run_scan(root: &Path) -> Result<Scan, ScanError> {
    let mut devices = scan::scan_all(root)?;
    let topology = topology::build_tree(&mut devices);
    Ok(Scan { devices, topology })
}

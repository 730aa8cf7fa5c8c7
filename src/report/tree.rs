use std::fmt::Write;

use crate::aer;
use crate::device::{DeviceMap, PciDevice};
use crate::topology::Topology;

fn node_line(device: &PciDevice) -> String {
    let mut line = format!(
        "{} [{}] {:04x}:{:04x}",
        device.address,
        aer::device_summary(device),
        device.vendor,
        device.device
    );
    if let Some(info) = device.bridge() {
        let _ = write!(line, " bus {:02x}-{:02x}", info.secondary, info.subordinate);
    }
    line
}

/// One block per domain, children indented under their bridge.
pub fn render_tree(devices: &DeviceMap, topology: &Topology) -> String {
    let mut out = String::new();
    let mut domain = None;

    topology.walk(devices, |device, path| {
        if path.len() == 1 && domain != Some(device.domain) {
            if domain.is_some() {
                out.push('\n');
            }
            let _ = writeln!(out, "Domain {:04x}", device.domain);
            domain = Some(device.domain);
        }

        let (last, ancestors) = match path.split_last() {
            Some(split) => split,
            None => return,
        };
        for &ancestor_last in ancestors {
            out.push_str(if ancestor_last { "    " } else { "│   " });
        }
        out.push_str(if *last { "└── " } else { "├── " });
        out.push_str(&node_line(device));
        out.push('\n');
    });

    let _ = writeln!(out, "\nOverall: {}", aer::all_summary(devices));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FeatureKind;
    use crate::topology::build_tree;

    #[test]
    fn test_render_tree() {
        let mut bridge = PciDevice::new("0000:00:01.0");
        bridge.vendor = 0x8086;
        bridge.device = 0x1901;
        let mut config = vec![0u8; 0x20];
        config[0x19] = 1;
        config[0x1a] = 1;
        bridge.add_feature(FeatureKind::Bridge, &config).unwrap();

        let mut gpu = PciDevice::new("0000:01:00.0");
        gpu.vendor = 0x10de;
        gpu.device = 0x1b80;
        gpu.errors.fatal.insert("DLP".to_string(), 1);

        let other = PciDevice::new("0001:00:00.0");

        let mut devices: DeviceMap = vec![bridge, gpu, other]
            .into_iter()
            .map(|d| (d.address.clone(), d))
            .collect();
        let topology = build_tree(&mut devices);

        let expected = "\
Domain 0000
└── 0000:00:01.0 [OK] 8086:1901 bus 01-01
    └── 0000:01:00.0 [ERR] 10de:1b80

Domain 0001
└── 0001:00:00.0 [OK] 0000:0000

Overall: ERR
";
        assert_eq!(render_tree(&devices, &topology), expected);
    }
}

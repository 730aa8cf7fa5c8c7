use crate::aer;
use crate::device::DeviceMap;

const FIXED_COLUMNS: [&str; 7] = ["ADDRESS", "VENDOR", "DEVICE", "CLASS", "PARENT", "CHILD", "SUMMARY"];

/// Flat table, one row per device. Counter columns are the union of every
/// counter name in the scan, summed across severities.
pub fn render_table(devices: &DeviceMap) -> String {
    let counters = aer::counter_names(devices);

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(devices.len() + 1);
    rows.push(
        FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(counters.iter().cloned())
            .collect(),
    );

    for device in devices.values() {
        let mut row = vec![
            device.address.clone(),
            format!("{:04x}", device.vendor),
            format!("{:04x}", device.device),
            format!("{:06x}", device.class),
            device.parent.clone().unwrap_or_else(|| "-".to_string()),
            device.children.first().cloned().unwrap_or_else(|| "-".to_string()),
            aer::device_summary(device).to_string(),
        ];
        row.extend(counters.iter().map(|name| device.errors.count(name).to_string()));
        rows.push(row);
    }

    let columns = rows[0].len();
    let widths: Vec<usize> = (0..columns)
        .map(|i| rows.iter().map(|r| r[i].chars().count()).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    for row in &rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

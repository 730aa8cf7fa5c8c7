//! Per-device attribute files
//!
//! Reads the small files a sysfs PCI device directory exposes. Every reader
//! degrades to a default value instead of failing: one unreadable attribute
//! must never stop a scan over partially-populated hardware.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const VENDOR_FILE: &str = "vendor";
pub const DEVICE_FILE: &str = "device";
pub const CLASS_FILE: &str = "class";
pub const CONFIG_FILE: &str = "config";
pub const AER_CORRECTABLE_FILE: &str = "aer_dev_correctable";
pub const AER_NONFATAL_FILE: &str = "aer_dev_nonfatal";
pub const AER_FATAL_FILE: &str = "aer_dev_fatal";

/// Summary rows in the AER counter files, skipped to avoid double counting.
const TOTAL_PREFIX: &str = "TOTAL_ERR_";

/// Parse a hex attribute string, tolerating a BOM, surrounding whitespace and
/// an optional `0x`/`0X` prefix.
pub fn parse_hex(raw: &str) -> Option<u32> {
    let s = raw.trim_start_matches('\u{feff}').trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    u32::from_str_radix(s, 16).ok()
}

fn read_hex(path: &Path) -> Option<u32> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::debug!("{}: unreadable, using default: {}", path.display(), e);
            return None;
        }
    };
    let value = parse_hex(&content);
    if value.is_none() {
        log::debug!("{}: not a hex value: {:?}", path.display(), content.trim());
    }
    value
}

/// Read a 16-bit hex id (`vendor`, `device`). Returns `0x0000` on any failure.
pub fn read_hex_u16(path: &Path) -> u16 {
    read_hex(path)
        .and_then(|v| u16::try_from(v).ok())
        .unwrap_or(0)
}

/// Read the 24-bit class code. Returns 0 on any failure.
pub fn read_class(path: &Path) -> u32 {
    read_hex(path).map(|v| v & 0x00ff_ffff).unwrap_or(0)
}

/// Read the raw configuration-space dump, if present.
pub fn read_config(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::debug!("{}: no config space: {}", path.display(), e);
            None
        }
    }
}

/// Parse the body of an AER counter file.
///
/// Each line is `<NAME> <count>`. `TOTAL_ERR_*` rows and lines whose count is
/// not a non-negative integer are dropped.
pub fn parse_counters(content: &str) -> BTreeMap<String, u64> {
    let mut counters = BTreeMap::new();
    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let (name, count) = match (fields.next(), fields.next()) {
            (Some(name), Some(count)) => (name, count),
            _ => continue,
        };
        if name.starts_with(TOTAL_PREFIX) {
            continue;
        }
        if let Ok(count) = count.parse::<u64>() {
            counters.insert(name.to_string(), count);
        }
    }
    counters
}

/// Read an AER counter file. A missing file is an empty mapping.
pub fn read_counters(path: &Path) -> BTreeMap<String, u64> {
    match fs::read_to_string(path) {
        Ok(content) => parse_counters(&content),
        Err(e) => {
            log::debug!("{}: no counters: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}

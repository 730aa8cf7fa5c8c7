//! In-memory device records
//!
//! One `PciDevice` per scanned directory, keyed by address in a `DeviceMap`.
//! The map is the arena: parent and children are stored as address keys
//! into it, written only by the topology builder.

pub mod feature;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

pub use feature::{BridgeInfo, DeviceFeature, FeatureError, FeatureKind};

/// All devices of one scan, keyed by address string.
pub type DeviceMap = BTreeMap<String, PciDevice>;

/// Base class code of bridge devices.
pub const CLASS_BRIDGE: u8 = 0x06;

/// A well-formed `DDDD:BB:DD.F` address.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl FromStr for PciAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || format!("invalid PCI address: {}", s);

        let mut parts = s.split(':');
        let (domain, bus, slot) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(d), Some(b), Some(slot), None) => (d, b, slot),
            _ => return Err(bad()),
        };
        let (device, function) = slot.split_once('.').ok_or_else(bad)?;

        let domain = u16::from_str_radix(domain, 16).map_err(|_| bad())?;
        let bus = u8::from_str_radix(bus, 16).map_err(|_| bad())?;
        let device = u8::from_str_radix(device, 16).map_err(|_| bad())?;
        let function = u8::from_str_radix(function, 16).map_err(|_| bad())?;
        if device > 0x1f || function > 0x7 {
            return Err(bad());
        }

        Ok(Self { domain, bus, device, function })
    }
}

/// Extract domain and bus from a directory name, falling back to zero for
/// any part that does not parse.
pub fn parse_address(name: &str) -> (u16, u8) {
    if let Ok(address) = name.parse::<PciAddress>() {
        return (address.domain, address.bus);
    }
    let mut parts = name.split(':');
    let domain = parts.next().and_then(|d| u16::from_str_radix(d, 16).ok());
    let bus = parts.next().and_then(|b| u8::from_str_radix(b, 16).ok());
    if domain.is_none() || bus.is_none() {
        log::warn!("{}: malformed PCI address, defaulting domain/bus to 0", name);
    }
    (domain.unwrap_or(0), bus.unwrap_or(0))
}

/// AER counters, one mapping per severity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ErrorCounts {
    pub correctable: BTreeMap<String, u64>,
    pub nonfatal: BTreeMap<String, u64>,
    pub fatal: BTreeMap<String, u64>,
}

impl ErrorCounts {
    /// The three mappings with their category names.
    pub fn categories(&self) -> [(&'static str, &BTreeMap<String, u64>); 3] {
        [
            ("correctable", &self.correctable),
            ("nonfatal", &self.nonfatal),
            ("fatal", &self.fatal),
        ]
    }

    /// Sum of a counter name over all three categories.
    pub fn count(&self, name: &str) -> u64 {
        self.categories()
            .iter()
            .filter_map(|(_, map)| map.get(name))
            .sum()
    }
}

#[derive(Clone, Debug)]
pub struct PciDevice {
    pub address: String,
    pub domain: u16,
    pub bus: u8,
    pub vendor: u16,
    pub device: u16,
    /// 24-bit base class / subclass / prog-if.
    pub class: u32,
    pub errors: ErrorCounts,
    pub parent: Option<String>,
    pub children: Vec<String>,
    features: Vec<DeviceFeature>,
}

impl PciDevice {
    pub fn new(address: &str) -> Self {
        let (domain, bus) = parse_address(address);
        Self {
            address: address.to_string(),
            domain,
            bus,
            vendor: 0,
            device: 0,
            class: 0,
            errors: ErrorCounts::default(),
            parent: None,
            children: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn base_class(&self) -> u8 {
        (self.class >> 16) as u8
    }

    /// Class code as `0xBBSSPP`.
    pub fn class_code(&self) -> String {
        format!("0x{:06x}", self.class)
    }

    /// Parse `kind` from raw config bytes and attach it. On failure nothing
    /// is attached.
    pub fn add_feature(&mut self, kind: FeatureKind, config: &[u8]) -> Result<(), FeatureError> {
        let feature = kind.parse(config)?;
        self.features.push(feature);
        Ok(())
    }

    pub fn feature(&self, kind: FeatureKind) -> Option<&DeviceFeature> {
        self.features.iter().find(|f| f.kind() == kind)
    }

    pub fn feature_by_name(&self, name: &str) -> Option<&DeviceFeature> {
        self.features.iter().find(|f| f.name() == name)
    }

    pub fn features(&self) -> &[DeviceFeature] {
        &self.features
    }

    pub fn is_bridge(&self) -> bool {
        self.feature(FeatureKind::Bridge).is_some()
    }

    pub fn bridge(&self) -> Option<&BridgeInfo> {
        match self.feature(FeatureKind::Bridge)? {
            DeviceFeature::Bridge(info) => Some(info),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::feature::SUBORDINATE_BUS_OFFSET;

    #[test]
    fn test_address_round_trip() {
        let addr: PciAddress = "0000:3a:1f.7".parse().unwrap();
        assert_eq!(addr, PciAddress { domain: 0, bus: 0x3a, device: 0x1f, function: 7 });
        assert_eq!(addr.to_string(), "0000:3a:1f.7");
    }

    #[test]
    fn test_address_rejects_malformed() {
        assert!("0000:3a:1f".parse::<PciAddress>().is_err());
        assert!("0000:3a:20.0".parse::<PciAddress>().is_err());
        assert!("0000:3a:00.8".parse::<PciAddress>().is_err());
        assert!("zzzz:00:00.0".parse::<PciAddress>().is_err());
        assert!("0000:00:00.0:1".parse::<PciAddress>().is_err());
    }

    #[test]
    fn test_parse_address_fallback() {
        assert_eq!(parse_address("0001:3a:00.0"), (1, 0x3a));
        assert_eq!(parse_address("bogus"), (0, 0));
        assert_eq!(parse_address("0002:zz:00.0"), (2, 0));
        assert_eq!(parse_address("10000:01:00.0"), (0, 1));
    }

    #[test]
    fn test_add_feature() {
        let mut dev = PciDevice::new("0000:00:01.0");
        assert!(!dev.is_bridge());

        let short = vec![0u8; SUBORDINATE_BUS_OFFSET];
        assert!(dev.add_feature(FeatureKind::Bridge, &short).is_err());
        assert!(!dev.is_bridge());
        assert!(dev.features().is_empty());

        let mut config = vec![0u8; 64];
        config[0x19] = 1;
        config[0x1a] = 4;
        dev.add_feature(FeatureKind::Bridge, &config).unwrap();
        assert!(dev.is_bridge());
        assert!(dev.feature_by_name("Bridge").is_some());
        assert!(dev.feature_by_name("SR-IOV").is_none());
        assert_eq!(dev.bridge().map(|b| (b.secondary, b.subordinate)), Some((1, 4)));
    }

    #[test]
    fn test_class_fields() {
        let mut dev = PciDevice::new("0000:00:01.0");
        dev.class = 0x060400;
        assert_eq!(dev.base_class(), CLASS_BRIDGE);
        assert_eq!(dev.class_code(), "0x060400");
    }

    #[test]
    fn test_error_count_across_categories() {
        let mut errors = ErrorCounts::default();
        errors.correctable.insert("RCVR".to_string(), 2);
        errors.fatal.insert("RCVR".to_string(), 1);
        assert_eq!(errors.count("RCVR"), 3);
        assert_eq!(errors.count("BadTLP"), 0);
    }
}

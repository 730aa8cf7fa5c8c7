//! Optional device features parsed from configuration space
//!
//! A feature is a typed record decoded from fixed offsets of the raw config
//! header. Adding a feature kind means adding a `FeatureKind` variant, its
//! payload type and a parse arm; nothing else in the crate switches on kind.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Offsets of the bus-number fields in a PCI-to-PCI bridge (type 1) header.
pub const PRIMARY_BUS_OFFSET: usize = 0x18;
pub const SECONDARY_BUS_OFFSET: usize = 0x19;
pub const SUBORDINATE_BUS_OFFSET: usize = 0x1a;

#[derive(Error, Debug, PartialEq)]
pub enum FeatureError {
    #[error("{feature}: config space too short ({actual} bytes, need {needed})")]
    ConfigTooShort {
        feature: &'static str,
        needed: usize,
        actual: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Bridge,
}

impl FeatureKind {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::Bridge => "Bridge",
        }
    }

    pub fn parse(&self, config: &[u8]) -> Result<DeviceFeature, FeatureError> {
        match self {
            FeatureKind::Bridge => BridgeInfo::parse(config).map(DeviceFeature::Bridge),
        }
    }
}

/// Downstream bus numbers advertised by a PCI-to-PCI bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BridgeInfo {
    pub primary: u8,
    pub secondary: u8,
    pub subordinate: u8,
}

impl BridgeInfo {
    pub fn parse(config: &[u8]) -> Result<Self, FeatureError> {
        let needed = SUBORDINATE_BUS_OFFSET + 1;
        if config.len() < needed {
            return Err(FeatureError::ConfigTooShort {
                feature: FeatureKind::Bridge.name(),
                needed,
                actual: config.len(),
            });
        }
        Ok(Self {
            primary: config[PRIMARY_BUS_OFFSET],
            secondary: config[SECONDARY_BUS_OFFSET],
            subordinate: config[SUBORDINATE_BUS_OFFSET],
        })
    }

    /// Whether `bus` lies in the inclusive `[secondary, subordinate]` range.
    pub fn forwards(&self, bus: u8) -> bool {
        bus >= self.secondary && bus <= self.subordinate
    }

    /// Width of the downstream range. An inverted range (subordinate below
    /// secondary) forwards nothing, so its width is never consulted.
    pub fn width(&self) -> u8 {
        self.subordinate.saturating_sub(self.secondary)
    }
}

impl fmt::Display for BridgeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "primary {:02x}, secondary {:02x}, subordinate {:02x}",
            self.primary, self.secondary, self.subordinate
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceFeature {
    Bridge(BridgeInfo),
}

impl DeviceFeature {
    pub fn kind(&self) -> FeatureKind {
        match self {
            DeviceFeature::Bridge(_) => FeatureKind::Bridge,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Human-readable one-liner for listings.
    pub fn describe(&self) -> String {
        match self {
            DeviceFeature::Bridge(info) => format!("PCI-to-PCI bridge ({})", info),
        }
    }
}

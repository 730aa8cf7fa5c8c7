//! Scan configuration

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where Linux exposes one directory per PCI function.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/bus/pci/devices";

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Tree,
    Table,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Json => "json",
            OutputFormat::Tree => "tree",
            OutputFormat::Table => "table",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "tree" => Ok(OutputFormat::Tree),
            "table" => Ok(OutputFormat::Table),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScanConfig {
    /// Directory holding one subdirectory per device
    pub root: PathBuf,

    /// How the finished scan is rendered
    pub format: OutputFormat,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            format: OutputFormat::Tree,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.root, PathBuf::from("/sys/bus/pci/devices"));
        assert_eq!(config.format, OutputFormat::Tree);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table));
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Tree.to_string(), "tree");
    }
}

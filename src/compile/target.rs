//! @ai:module:intent Fixed device capability table mapping GPU names to architecture codes
//! @ai:module:layer domain
//! @ai:module:public_api GpuTarget, SUPPORTED_DEVICES
//! @ai:module:stateless true

use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Device name -> compute capability, in the order they are listed to users.
pub const SUPPORTED_DEVICES: &[(GpuTarget, &str, &str)] = &[
    (GpuTarget::T4, "T4", "75"),
    (GpuTarget::H100, "H100", "90"),
    (GpuTarget::A100_80GB, "A100-80GB", "80"),
    (GpuTarget::A10G, "A10G", "86"),
    (GpuTarget::L40S, "L40S", "89"),
    (GpuTarget::L4, "L4", "89"),
];

/// @ai:intent A supported compilation target
/// @ai:effects pure
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpuTarget {
    T4,
    H100,
    #[serde(rename = "A100-80GB")]
    A100_80GB,
    A10G,
    L40S,
    L4,
}

impl GpuTarget {
    /// @ai:intent Resolve a device name, failing fast on anything outside the table
    /// @ai:pre name matches a table entry exactly (case-sensitive)
    /// @ai:effects pure
    pub fn from_name(name: &str) -> Result<Self, CompileError> {
        SUPPORTED_DEVICES
            .iter()
            .find(|(_, device, _)| *device == name)
            .map(|(target, _, _)| *target)
            .ok_or_else(|| CompileError::UnsupportedDevice(name.to_string()))
    }

    /// @ai:intent Device name as it appears in submissions
    /// @ai:effects pure
    pub fn name(&self) -> &'static str {
        match self {
            GpuTarget::T4 => "T4",
            GpuTarget::H100 => "H100",
            GpuTarget::A100_80GB => "A100-80GB",
            GpuTarget::A10G => "A10G",
            GpuTarget::L40S => "L40S",
            GpuTarget::L4 => "L4",
        }
    }

    /// @ai:intent Numeric architecture code passed to the compiler (e.g. "75")
    /// @ai:effects pure
    pub fn arch_code(&self) -> &'static str {
        match self {
            GpuTarget::T4 => "75",
            GpuTarget::H100 => "90",
            GpuTarget::A100_80GB => "80",
            GpuTarget::A10G => "86",
            GpuTarget::L40S | GpuTarget::L4 => "89",
        }
    }
}

impl FromStr for GpuTarget {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl std::fmt::Display for GpuTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_devices_resolve_to_arch_codes() {
        assert_eq!(GpuTarget::from_name("T4").unwrap().arch_code(), "75");
        assert_eq!(GpuTarget::from_name("H100").unwrap().arch_code(), "90");
        assert_eq!(GpuTarget::from_name("A100-80GB").unwrap().arch_code(), "80");
        assert_eq!(GpuTarget::from_name("A10G").unwrap().arch_code(), "86");
        assert_eq!(GpuTarget::from_name("L40S").unwrap().arch_code(), "89");
        assert_eq!(GpuTarget::from_name("L4").unwrap().arch_code(), "89");
    }

    #[test]
    fn test_unsupported_device_fails_fast() {
        let err = GpuTarget::from_name("V100").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedDevice(ref name) if name == "V100"));

        // lookups are exact
        assert!(GpuTarget::from_name("t4").is_err());
    }

    #[test]
    fn test_table_agrees_with_variants() {
        for (target, name, arch) in SUPPORTED_DEVICES {
            assert_eq!(target.name(), *name);
            assert_eq!(target.arch_code(), *arch);
            assert_eq!(name.parse::<GpuTarget>().unwrap(), *target);
        }
    }
}

//! @ai:module:intent Device collaborator boundary: buffers, synchronization, timers, warm-up
//! @ai:module:layer domain
//! @ai:module:public_api Device, DeviceBuffer, DeviceTimer, ElementType, prepare_device, HostDevice

pub mod host;

pub use host::{HostBuffer, HostDevice};

use crate::error::DeviceError;
use serde::{Deserialize, Serialize};
use std::ffi::c_void;
use std::time::Duration;

/// @ai:intent Element type of a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Float32,
    Float16,
    BFloat16,
}

impl ElementType {
    /// @ai:intent Size of one element in bytes
    /// @ai:effects pure
    pub fn size_bytes(&self) -> usize {
        match self {
            ElementType::Float32 => 4,
            ElementType::Float16 | ElementType::BFloat16 => 2,
        }
    }

    /// @ai:intent Name used in problem definitions ("float32", ...)
    /// @ai:effects pure
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Float32 => "float32",
            ElementType::Float16 => "float16",
            ElementType::BFloat16 => "bfloat16",
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// @ai:intent A numeric buffer owned by a device; only its raw address crosses into kernels
pub trait DeviceBuffer: Send {
    /// @ai:intent Raw address handed to the entry point
    fn as_ptr(&self) -> *mut c_void;

    fn element_type(&self) -> ElementType;

    /// @ai:intent Number of elements
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// @ai:intent Device-native start/stop timer
pub trait DeviceTimer {
    /// @ai:intent Record the start mark on the device
    fn start(&mut self) -> Result<(), DeviceError>;

    /// @ai:intent Record the stop mark on the device
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// @ai:intent Device time between the marks
    /// @ai:pre the device has been synchronized after `stop`
    fn elapsed(&self) -> Result<Duration, DeviceError>;
}

/// @ai:intent A single-owner compute device for the duration of one run
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    /// @ai:intent Allocate a zeroed buffer of `len` elements
    fn allocate(&self, element_type: ElementType, len: usize) -> Result<Box<dyn DeviceBuffer>, DeviceError>;

    /// @ai:intent Block until all queued device work has completed
    fn synchronize(&self) -> Result<(), DeviceError>;

    /// @ai:intent Create a timer whose marks are recorded on the device
    fn timer(&self) -> Result<Box<dyn DeviceTimer>, DeviceError>;

    /// @ai:intent Release cached device memory
    fn clear_cache(&self) -> Result<(), DeviceError>;

    /// @ai:intent Run a moderate workload to bring clocks and temperature to a steady state
    fn warm_up(&self) -> Result<(), DeviceError>;
}

/// @ai:intent Put a device into a consistent state before a benchmark run
///            (clear, warm up, synchronize, clear, settle)
/// @ai:effects device, time
pub fn prepare_device(device: &dyn Device, settle: Duration) -> Result<(), DeviceError> {
    tracing::debug!("Preparing device {}", device.name());

    device.clear_cache()?;
    device.warm_up()?;
    device.synchronize()?;
    device.clear_cache()?;

    if !settle.is_zero() {
        std::thread::sleep(settle);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes() {
        assert_eq!(ElementType::Float32.size_bytes(), 4);
        assert_eq!(ElementType::Float16.size_bytes(), 2);
        assert_eq!(ElementType::BFloat16.size_bytes(), 2);
    }

    #[test]
    fn test_element_type_names_match_serde() {
        for ty in [ElementType::Float32, ElementType::Float16, ElementType::BFloat16] {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
        }
    }

    #[test]
    fn test_prepare_device_runs_warmup() {
        let device = HostDevice::new();
        prepare_device(&device, Duration::ZERO).unwrap();
        assert_eq!(device.warmups(), 1);
    }
}

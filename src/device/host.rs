//! @ai:module:intent Host-memory reference device used for dry runs and tests
//! @ai:module:layer infrastructure
//! @ai:module:public_api HostDevice, HostBuffer
//! @ai:module:stateless false

use crate::device::{Device, DeviceBuffer, DeviceTimer, ElementType};
use crate::error::DeviceError;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Side length of the square matrices multiplied during warm-up.
const WARMUP_DIM: usize = 64;
const WARMUP_ROUNDS: usize = 10;

/// @ai:intent Zeroed, 8-byte aligned host allocation
pub struct HostBuffer {
    // keeps the allocation alive; all access goes through `ptr`
    _storage: Vec<u64>,
    ptr: *mut u64,
    element_type: ElementType,
    len: usize,
}

// The buffer exclusively owns its allocation.
unsafe impl Send for HostBuffer {}

impl HostBuffer {
    /// @ai:intent Allocate `len` zeroed elements
    /// @ai:effects alloc
    pub fn zeroed(element_type: ElementType, len: usize) -> Self {
        let bytes = element_type.size_bytes() * len;
        let mut storage = vec![0u64; bytes.div_ceil(8).max(1)];
        let ptr = storage.as_mut_ptr();

        Self {
            _storage: storage,
            ptr,
            element_type,
            len,
        }
    }

    /// @ai:intent Allocate a float32 buffer holding `values`
    /// @ai:effects alloc
    pub fn from_f32(values: &[f32]) -> Self {
        let buffer = Self::zeroed(ElementType::Float32, values.len());
        // Safety: the allocation holds at least values.len() f32s and is 8-byte aligned
        unsafe {
            std::ptr::copy_nonoverlapping(values.as_ptr(), buffer.ptr as *mut f32, values.len());
        }
        buffer
    }

    /// @ai:intent Copy out float32 contents; None for other element types
    /// @ai:effects pure
    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        if self.element_type != ElementType::Float32 {
            return None;
        }
        // Safety: see from_f32
        let values = unsafe { std::slice::from_raw_parts(self.ptr as *const f32, self.len) };
        Some(values.to_vec())
    }
}

impl DeviceBuffer for HostBuffer {
    fn as_ptr(&self) -> *mut c_void {
        self.ptr as *mut c_void
    }

    fn element_type(&self) -> ElementType {
        self.element_type
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// @ai:intent Wall-clock timer; host calls are synchronous so no device events are needed
#[derive(Default)]
pub struct HostTimer {
    started: Option<Instant>,
    stopped: Option<Instant>,
}

impl DeviceTimer for HostTimer {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.started = Some(Instant::now());
        self.stopped = None;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.stopped = Some(Instant::now());
        Ok(())
    }

    fn elapsed(&self) -> Result<Duration, DeviceError> {
        match (self.started, self.stopped) {
            (Some(start), Some(stop)) => Ok(stop.duration_since(start)),
            _ => Err(DeviceError::Timer("timer was not started and stopped".to_string())),
        }
    }
}

/// @ai:intent Device backed by host memory and the host clock
pub struct HostDevice {
    warmups: AtomicUsize,
}

impl HostDevice {
    /// @ai:intent Create a host device
    /// @ai:effects pure
    pub fn new() -> Self {
        Self {
            warmups: AtomicUsize::new(0),
        }
    }

    /// @ai:intent Number of completed warm-ups
    /// @ai:effects pure
    pub fn warmups(&self) -> usize {
        self.warmups.load(Ordering::SeqCst)
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for HostDevice {
    fn name(&self) -> &str {
        "host"
    }

    fn allocate(&self, element_type: ElementType, len: usize) -> Result<Box<dyn DeviceBuffer>, DeviceError> {
        Ok(Box::new(HostBuffer::zeroed(element_type, len)))
    }

    fn synchronize(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn timer(&self) -> Result<Box<dyn DeviceTimer>, DeviceError> {
        Ok(Box::new(HostTimer::default()))
    }

    fn clear_cache(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn warm_up(&self) -> Result<(), DeviceError> {
        let a: Vec<f32> = (0..WARMUP_DIM * WARMUP_DIM).map(|i| (i % 7) as f32).collect();
        let mut c = vec![0f32; WARMUP_DIM * WARMUP_DIM];

        for _ in 0..WARMUP_ROUNDS {
            for i in 0..WARMUP_DIM {
                for j in 0..WARMUP_DIM {
                    c[i * WARMUP_DIM + j] = (0..WARMUP_DIM)
                        .map(|k| a[i * WARMUP_DIM + k] * a[j * WARMUP_DIM + k])
                        .sum();
                }
            }
        }
        std::hint::black_box(&c);

        self.warmups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_are_zeroed_and_sized() {
        let device = HostDevice::new();
        let buffer = device.allocate(ElementType::Float16, 3).unwrap();

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.element_type(), ElementType::Float16);
        assert!(!buffer.as_ptr().is_null());
        assert_eq!(buffer.as_ptr() as usize % 8, 0);
    }

    #[test]
    fn test_f32_round_trip_through_raw_pointer() {
        let buffer = HostBuffer::from_f32(&[1.0, 2.5, -3.0]);

        unsafe { *(buffer.as_ptr() as *mut f32).add(1) = 7.0 };

        assert_eq!(buffer.to_f32_vec().unwrap(), vec![1.0, 7.0, -3.0]);
        assert!(HostBuffer::zeroed(ElementType::BFloat16, 2).to_f32_vec().is_none());
    }

    #[test]
    fn test_timer_requires_both_marks() {
        let mut timer = HostTimer::default();
        assert!(timer.elapsed().is_err());

        timer.start().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        timer.stop().unwrap();

        assert!(timer.elapsed().unwrap() >= Duration::from_millis(5));
    }
}

pub mod cpu;

use crate::{device::Device, dtype::DType};
pub use cpu::CpuBuffer;

/// Device-tagged storage behind a tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    CPU(CpuBuffer),
}

impl Buffer {
    pub fn len(&self) -> usize {
        match self {
            Buffer::CPU(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Buffer::CPU(b) => b.dtype(),
        }
    }

    pub fn device(&self) -> Device {
        match self {
            Buffer::CPU(_) => Device::CPU,
        }
    }

    pub fn as_cpu(&self) -> &CpuBuffer {
        match self {
            Buffer::CPU(b) => b,
        }
    }

    pub fn into_cpu(self) -> CpuBuffer {
        match self {
            Buffer::CPU(b) => b,
        }
    }
}

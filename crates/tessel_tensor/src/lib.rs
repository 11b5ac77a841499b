mod creation;
pub mod nn;
mod ops;

use std::{borrow::Cow, fmt, sync::Arc};
use tessel_core::{
    buffer::{cpu::CpuBuffer, Buffer},
    device::Device,
    dtype::DType,
    error::{Error, Result},
    layout::Layout,
};

pub use nn::{BatchNormHandle, ConvHandle, PoolingHandle};

/// Dense, contiguous, immutable numeric buffer with a shape. Clones share storage.
#[derive(Clone)]
pub struct RawTensor {
    buffer: Arc<Buffer>,
    layout: Layout,
}

impl RawTensor {
    pub(crate) fn from_parts(buffer: CpuBuffer, shape: &[usize]) -> Result<Self> {
        let layout = Layout::from_shape(shape);
        if buffer.len() != layout.size() {
            return Err(Error::shape(format!(
                "buffer holds {} elements but shape {:?} needs {}",
                buffer.len(),
                shape,
                layout.size()
            )));
        }
        Ok(Self {
            buffer: Arc::new(Buffer::CPU(buffer)),
            layout,
        })
    }

    /// Wraps a freshly computed `f32` payload; callers guarantee the length.
    pub(crate) fn from_f32(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        Self::from_parts(CpuBuffer::F32(data), shape)
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    pub fn strides(&self) -> &[usize] {
        self.layout.strides()
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    pub fn dim_size(&self, dim: usize) -> Option<usize> {
        self.layout.dim_size(dim)
    }

    pub fn device(&self) -> Device {
        self.buffer.device()
    }

    pub fn dtype(&self) -> DType {
        self.buffer.dtype()
    }

    /// Payload viewed as `f32`, converting non-float buffers on the fly.
    pub(crate) fn values(&self) -> Cow<'_, [f32]> {
        match self.buffer.as_cpu() {
            CpuBuffer::F32(v) => Cow::Borrowed(v.as_slice()),
            other => Cow::Owned(other.to_f32_vec()),
        }
    }

    pub(crate) fn bools(&self) -> Cow<'_, [bool]> {
        match self.buffer.as_cpu() {
            CpuBuffer::BOOL(v) => Cow::Borrowed(v.as_slice()),
            other => Cow::Owned(other.to_bool_vec()),
        }
    }
}

impl fmt::Debug for RawTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTensor")
            .field("shape", &self.shape())
            .field("dtype", &self.dtype())
            .field("device", &self.device())
            .finish()
    }
}

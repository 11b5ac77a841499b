use crate::RawTensor;
use rand::{
    distributions::{Distribution, Uniform},
    Rng,
};
use rand_distr::Normal;
use std::sync::Arc;
use tessel_core::{
    buffer::{cpu::CpuBuffer, Buffer},
    device::{get_default_device, Device},
    dtype::{get_default_dtype, DType, Element},
    error::{Error, Result},
    layout::Layout,
};

impl RawTensor {
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        Self::from_parts(CpuBuffer::from_vec(data), shape)
    }

    pub fn scalar(value: f32) -> Self {
        Self::full(&[], value)
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// A tensor of the default dtype filled with `value`.
    pub fn full(shape: &[usize], value: f32) -> Self {
        let size: usize = shape.iter().product();
        let buffer = match get_default_dtype() {
            DType::F32 => CpuBuffer::F32(vec![value; size]),
            DType::I32 => CpuBuffer::I32(vec![value as i32; size]),
            DType::BOOL => CpuBuffer::BOOL(vec![value != 0.0; size]),
        };
        Self {
            buffer: Arc::new(Buffer::CPU(buffer)),
            layout: Layout::from_shape(shape),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.shape())
    }

    pub fn ones_like(&self) -> Self {
        Self::ones(self.shape())
    }

    pub fn randn(shape: &[usize]) -> Result<Self> {
        Self::gaussian(shape, 0.0, 1.0)
    }

    pub fn gaussian(shape: &[usize], mean: f32, std: f32) -> Result<Self> {
        let normal = Normal::new(mean, std).map_err(|e| Error::InvalidArgument(format!("normal distribution: {}", e)))?;
        let mut rng = rand::thread_rng();
        let size: usize = shape.iter().product();
        let data: Vec<f32> = (0..size).map(|_| normal.sample(&mut rng)).collect();
        Self::from_f32(data, shape)
    }

    pub fn uniform(shape: &[usize], low: f32, high: f32) -> Result<Self> {
        if low >= high {
            return Err(Error::InvalidArgument(format!("uniform range [{}, {}) is empty", low, high)));
        }
        let dist = Uniform::new(low, high);
        let mut rng = rand::thread_rng();
        let size: usize = shape.iter().product();
        let data: Vec<f32> = (0..size).map(|_| dist.sample(&mut rng)).collect();
        Self::from_f32(data, shape)
    }

    /// `1.0` with probability `keep`, else `0.0`.
    pub fn bernoulli(shape: &[usize], keep: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&keep) {
            return Err(Error::InvalidArgument(format!("keep probability {} outside [0, 1]", keep)));
        }
        let mut rng = rand::thread_rng();
        let size: usize = shape.iter().product();
        let data: Vec<f32> = (0..size).map(|_| if rng.gen::<f32>() < keep { 1.0 } else { 0.0 }).collect();
        Self::from_f32(data, shape)
    }

    pub fn to_device(&self, device: Device) -> Result<Self> {
        match device {
            Device::CPU => Ok(self.clone()),
        }
    }

    /// Moves to the thread's default device.
    pub fn to_default_device(&self) -> Result<Self> {
        self.to_device(get_default_device())
    }

    pub fn to_dtype(&self, dtype: DType) -> Result<Self> {
        if dtype == self.dtype() {
            return Ok(self.clone());
        }
        Self::from_parts(self.buffer.as_cpu().cast(dtype), self.shape())
    }

    pub fn to_vec_f32(&self) -> Vec<f32> {
        self.buffer.as_cpu().to_f32_vec()
    }

    pub fn to_vec_i32(&self) -> Vec<i32> {
        self.buffer.as_cpu().to_i32_vec()
    }

    pub fn to_vec_bool(&self) -> Vec<bool> {
        self.buffer.as_cpu().to_bool_vec()
    }

    /// The single element of a one-element tensor.
    pub fn item(&self) -> Result<f32> {
        if self.size() != 1 {
            return Err(Error::shape(format!("item() needs exactly one element, got shape {:?}", self.shape())));
        }
        Ok(self.values()[0])
    }
}

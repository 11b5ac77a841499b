#![allow(non_upper_case_globals)]

use crate::buffer::cpu::CpuBuffer;

pub const float32: DType = DType::F32;
pub const int32: DType = DType::I32;
pub const bool: DType = DType::BOOL;

/// Element types the native buffers can hold. 64-bit integers from the outside
/// world are narrowed to `I32` on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    I32,
    BOOL,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::I32 => "i32",
            Self::BOOL => "bool",
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::I32 => 4,
            Self::BOOL => 1,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Self::I32)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::BOOL)
    }
}

/// Host element types that map one-to-one onto a [`DType`].
pub trait Element: Copy + Send + Sync + PartialEq + std::fmt::Debug + 'static {
    const DTYPE: DType;

    fn into_buffer(data: Vec<Self>) -> CpuBuffer;
    fn from_f32(v: f32) -> Self;
    fn to_f32(self) -> f32;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    fn into_buffer(data: Vec<Self>) -> CpuBuffer {
        CpuBuffer::F32(data)
    }
    fn from_f32(v: f32) -> Self {
        v
    }
    fn to_f32(self) -> f32 {
        self
    }
}

impl Element for i32 {
    const DTYPE: DType = DType::I32;

    fn into_buffer(data: Vec<Self>) -> CpuBuffer {
        CpuBuffer::I32(data)
    }
    fn from_f32(v: f32) -> Self {
        v as i32
    }
    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl Element for bool {
    const DTYPE: DType = DType::BOOL;

    fn into_buffer(data: Vec<Self>) -> CpuBuffer {
        CpuBuffer::BOOL(data)
    }
    fn from_f32(v: f32) -> Self {
        v != 0.0
    }
    fn to_f32(self) -> f32 {
        if self {
            1.0
        } else {
            0.0
        }
    }
}

thread_local! {
    static DEFAULT_DTYPE: std::cell::Cell<DType> = const { std::cell::Cell::new(DType::F32) };
}

pub fn get_default_dtype() -> DType {
    DEFAULT_DTYPE.with(|d| d.get())
}

pub fn set_default_dtype(dtype: DType) {
    DEFAULT_DTYPE.with(|d| d.set(dtype));
}

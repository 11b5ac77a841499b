use crate::{
    dtype::{DType, Element},
    error::{Error, Result},
};

#[derive(Debug, Clone, PartialEq)]
pub enum CpuBuffer {
    F32(Vec<f32>),
    I32(Vec<i32>),
    BOOL(Vec<bool>),
}

impl CpuBuffer {
    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        T::into_buffer(data)
    }

    pub fn zeros(len: usize, dtype: DType) -> Self {
        match dtype {
            DType::F32 => Self::F32(vec![0.0; len]),
            DType::I32 => Self::I32(vec![0; len]),
            DType::BOOL => Self::BOOL(vec![false; len]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::BOOL(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::I32(_) => DType::I32,
            Self::BOOL(_) => DType::BOOL,
        }
    }

    /// Borrows the payload as `f32` without conversion.
    pub fn as_f32(&self) -> Result<&[f32]> {
        match self {
            Self::F32(v) => Ok(v),
            other => Err(Error::DTypeMismatch {
                expected: DType::F32,
                got: other.dtype(),
            }),
        }
    }

    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            Self::F32(v) => v.clone(),
            Self::I32(v) => v.iter().map(|&x| x as f32).collect(),
            Self::BOOL(v) => v.iter().map(|&x| x.to_f32()).collect(),
        }
    }

    pub fn to_i32_vec(&self) -> Vec<i32> {
        match self {
            Self::F32(v) => v.iter().map(|&x| x as i32).collect(),
            Self::I32(v) => v.clone(),
            Self::BOOL(v) => v.iter().map(|&x| x as i32).collect(),
        }
    }

    pub fn to_bool_vec(&self) -> Vec<bool> {
        match self {
            Self::F32(v) => v.iter().map(|&x| x != 0.0).collect(),
            Self::I32(v) => v.iter().map(|&x| x != 0).collect(),
            Self::BOOL(v) => v.clone(),
        }
    }

    pub fn cast(&self, dtype: DType) -> Self {
        match dtype {
            DType::F32 => Self::F32(self.to_f32_vec()),
            DType::I32 => Self::I32(self.to_i32_vec()),
            DType::BOOL => Self::BOOL(self.to_bool_vec()),
        }
    }
}

use crate::{device::Device, dtype::DType};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    DTypeMismatch {
        expected: DType,
        got: DType,
    },
    DeviceMismatch {
        expected: Device,
        got: Device,
    },
    UnsupportedDType(DType),
    InvalidArgument(String),
    IncompatibleShape(String),
    InvalidShape {
        message: String,
    },
    DimensionOutOfBounds {
        dim: isize,
        ndim: usize,
    },
    NotSupported(String),
    NotImplemented(String),
    Runtime(String),
    // document codec
    Serialization(String),
    Io(std::io::Error),
    //
    Internal {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DTypeMismatch { expected, got } => {
                write!(f, "DType mismatch: expected {:?}, got {:?}", expected, got)
            }
            Self::DeviceMismatch { expected, got } => {
                write!(f, "Device mismatch: expected {}, got {}", expected.name(), got.name())
            }
            Self::UnsupportedDType(dtype) => write!(f, "Unsupported data type: {}", dtype.as_str()),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Self::IncompatibleShape(msg) => write!(f, "Incompatible shape: {}", msg),
            Self::InvalidShape { message } => write!(f, "Invalid shape: {}", message),
            Self::DimensionOutOfBounds { dim, ndim } => {
                write!(
                    f,
                    "Dimension out of bounds: dimension {} is not valid for tensor with {} dimensions",
                    dim, ndim
                )
            }
            Self::NotSupported(msg) => write!(f, "Not supported: {}", msg),
            Self::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Self::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl Error {
    pub fn shape(message: impl Into<String>) -> Self {
        Self::InvalidShape { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

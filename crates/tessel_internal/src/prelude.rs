pub use crate::autograd::{backward, gradients, ops, Mode, Operation, Seed, Tensor};
pub use crate::core::{
    device::{get_default_device, set_default_device, Device},
    dtype::*,
    error::{Error, Result},
};
pub use crate::tensor::RawTensor;

#[cfg(feature = "onnx")]
pub use crate::onnx::{prepare, to_onnx, Backend, GraphRep, ModelProto, RunOptions, RunOutput};

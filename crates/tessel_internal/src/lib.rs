pub mod prelude;

pub use tessel_autograd as autograd;
pub use tessel_core as core;
#[cfg(feature = "onnx")]
pub use tessel_onnx as onnx;
pub use tessel_tensor as tensor;

pub use tessel_core::dtype::{bool, float32, int32};

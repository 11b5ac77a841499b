mod backward;
mod dependency;
mod mode;
mod operation;
pub mod ops;
mod tensor;

pub use backward::{backward, gradients, Backward, Seed};
pub use dependency::{infer_dependency, Dependency};
pub use mode::Mode;
pub use operation::{call, MathFn, OpId, OpNode, OpType, Operation, SrcBinding};
pub use tensor::{Tensor, TensorId};

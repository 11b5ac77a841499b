//! Exchange of operator graphs as ONNX models.

pub mod backend;
mod builder;
pub mod checker;
pub mod frontend;
pub mod names;
pub mod optimizer;
pub mod padding;
pub mod proto;
mod wire;

pub use backend::{prepare, run_node, Backend, GraphRep, PreparedOp, RunOptions, RunOutput, KNOWN_OPSET_VERSION};
pub use builder::{ForwardFn, Handle};
pub use checker::{check_graph, check_model};
pub use frontend::{to_onnx, to_onnx_graph};
pub use optimizer::optimize;
pub use proto::{
    AttributeProto, AttributeValue, ElemType, GraphProto, ModelProto, NodeProto, OperatorSetId, TensorProto,
    ValueInfoProto, IR_VERSION, OPSET_VERSION,
};

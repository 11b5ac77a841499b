use crate::operation::{OpType, Operation};
use tessel_tensor::RawTensor;

/// Producer of a leaf tensor. Never scheduled; holds the leaf payload so the
/// exporter can emit it as a constant.
pub struct Dummy {
    data: RawTensor,
}

impl Dummy {
    pub fn new(data: RawTensor) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &RawTensor {
        &self.data
    }
}

impl Operation for Dummy {
    fn op_type(&self) -> OpType {
        OpType::Dummy
    }
}

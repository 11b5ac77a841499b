use crate::{backward::gradients, operation::OpNode};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tessel_core::{
    device::Device,
    dtype::{DType, Element},
    error::Result,
};
use tessel_tensor::RawTensor;

/// Identity of a tensor value. Clones of a [`Tensor`] share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(u64);

impl TensorId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A raw buffer plus the graph metadata linking it to the operation that
/// produced it.
#[derive(Clone)]
pub struct Tensor {
    id: TensorId,
    data: RawTensor,
    creator: Arc<OpNode>,
    requires_grad: bool,
    stores_grad: bool,
    name: Option<String>,
}

impl Tensor {
    /// A leaf that neither requires nor stores gradients.
    pub fn new(data: RawTensor) -> Self {
        let id = TensorId::next();
        let creator = Arc::new(OpNode::dummy(id, data.clone()));
        Self {
            id,
            data,
            creator,
            requires_grad: false,
            stores_grad: false,
            name: None,
        }
    }

    /// A trainable leaf: requires and stores gradients.
    pub fn parameter(data: RawTensor) -> Self {
        Self::new(data).with_requires_grad(true).with_stores_grad(true)
    }

    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        Ok(Self::new(RawTensor::from_vec(data, shape)?))
    }

    pub fn scalar(value: f32) -> Self {
        Self::new(RawTensor::scalar(value))
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(RawTensor::zeros(shape))
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::new(RawTensor::ones(shape))
    }

    pub fn randn(shape: &[usize]) -> Result<Self> {
        Ok(Self::new(RawTensor::randn(shape)?))
    }

    pub(crate) fn from_node(id: TensorId, data: RawTensor, creator: Arc<OpNode>, requires_grad: bool) -> Self {
        Self {
            id,
            data,
            creator,
            requires_grad,
            stores_grad: false,
            name: None,
        }
    }

    pub fn with_requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    pub fn with_stores_grad(mut self, stores_grad: bool) -> Self {
        self.stores_grad = stores_grad;
        self
    }

    /// Names the tensor. A leaf's placeholder producer is renamed in place,
    /// so operations that already consumed the leaf export it under the new
    /// name too. Clones of a leaf share its placeholder.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.is_leaf() {
            self.creator.rename(name.clone());
        }
        self.name = Some(name);
        self
    }

    // graph

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn creator(&self) -> &Arc<OpNode> {
        &self.creator
    }

    pub fn is_leaf(&self) -> bool {
        self.creator.is_dummy()
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn stores_grad(&self) -> bool {
        self.stores_grad
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name of this value inside its producer's outputs.
    pub fn output_name(&self) -> String {
        self.creator.output_name(self.creator.y_index(self.id).unwrap_or(0))
    }

    // data

    pub fn data(&self) -> &RawTensor {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn size(&self) -> usize {
        self.data.size()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn device(&self) -> Device {
        self.data.device()
    }

    pub fn to_vec_f32(&self) -> Vec<f32> {
        self.data.to_vec_f32()
    }

    pub fn item(&self) -> Result<f32> {
        self.data.item()
    }

    /// Same data as a fresh leaf, cut off from the graph.
    pub fn detach(&self) -> Tensor {
        Tensor::new(self.data.clone())
    }

    /// Gradients of this one-element tensor w.r.t. every tensor on its path
    /// that stores gradients, seeded with `1.0`.
    pub fn backward(&self) -> Result<HashMap<TensorId, Tensor>> {
        gradients(self, None)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.id)
            .field("shape", &self.shape())
            .field("dtype", &self.dtype())
            .field("creator", &self.creator.name())
            .field("requires_grad", &self.requires_grad)
            .field("stores_grad", &self.stores_grad)
            .finish()
    }
}

use crate::{mode::Mode, ops::constant::Dummy, tensor::Tensor, tensor::TensorId};
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};
use tessel_core::error::{Error, Result};
use tessel_tensor::RawTensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u64);

impl OpId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Parameterless elementwise functions sharing one operator implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFn {
    Sigmoid,
    Tanh,
    Exp,
    Log,
    Sqrt,
    Negative,
    Reciprocal,
    Sign,
    Abs,
    SoftPlus,
    SoftSign,
    Identity,
    Cos,
    Cosh,
    Sin,
    Sinh,
    Tan,
    Acos,
    Acosh,
    Asin,
    Asinh,
    Atan,
    Atanh,
}

impl MathFn {
    pub fn name(&self) -> &'static str {
        match self {
            MathFn::Sigmoid => "Sigmoid",
            MathFn::Tanh => "Tanh",
            MathFn::Exp => "Exp",
            MathFn::Log => "Log",
            MathFn::Sqrt => "Sqrt",
            MathFn::Negative => "Negative",
            MathFn::Reciprocal => "Reciprocal",
            MathFn::Sign => "Sign",
            MathFn::Abs => "Abs",
            MathFn::SoftPlus => "SoftPlus",
            MathFn::SoftSign => "SoftSign",
            MathFn::Identity => "Identity",
            MathFn::Cos => "cos",
            MathFn::Cosh => "cosh",
            MathFn::Sin => "sin",
            MathFn::Sinh => "sinh",
            MathFn::Tan => "tan",
            MathFn::Acos => "acos",
            MathFn::Acosh => "acosh",
            MathFn::Asin => "asin",
            MathFn::Asinh => "asinh",
            MathFn::Atan => "atan",
            MathFn::Atanh => "atanh",
        }
    }
}

/// Closed set of operator kinds. `name()` is the internal type name used in
/// node names and by the interchange rename tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Dummy,
    // activation
    ReLU,
    LeakyRelu,
    Elu,
    SeLU,
    HardSigmoid,
    PRelu,
    SoftMax,
    Clip,
    Math(MathFn),
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Max,
    Min,
    AddBias,
    Sum,
    Mean,
    Matmul,
    Gemm,
    // logical
    Equal,
    Less,
    Greater,
    And,
    Or,
    Xor,
    Not,
    // shape
    Reshape,
    Flatten,
    Transpose,
    Concat,
    Shape,
    ConstantOfShape,
    // reduction
    ReduceSum,
    ReduceMean,
    // nn
    Conv2d,
    Pooling2d,
    GlobalAveragePool,
    BatchNorm2d,
    Dropout,
    // loss
    SoftMaxCrossEntropy,
    NLL,
    MeanSquareError,
}

impl OpType {
    pub fn name(&self) -> &'static str {
        match self {
            OpType::Dummy => "Dummy",
            OpType::ReLU => "ReLU",
            OpType::LeakyRelu => "LeakyRelu",
            OpType::Elu => "Elu",
            OpType::SeLU => "SeLU",
            OpType::HardSigmoid => "HardSigmoid",
            OpType::PRelu => "PRelu",
            OpType::SoftMax => "SoftMax",
            OpType::Clip => "Clip",
            OpType::Math(f) => f.name(),
            OpType::Add => "Add",
            OpType::Sub => "Sub",
            OpType::Mul => "Mul",
            OpType::Div => "Div",
            OpType::Pow => "Pow",
            OpType::Max => "Max",
            OpType::Min => "Min",
            OpType::AddBias => "AddBias",
            OpType::Sum => "Sum",
            OpType::Mean => "Mean",
            OpType::Matmul => "Matmul",
            OpType::Gemm => "Gemm",
            OpType::Equal => "Equal",
            OpType::Less => "Less",
            OpType::Greater => "Greater",
            OpType::And => "And",
            OpType::Or => "Or",
            OpType::Xor => "Xor",
            OpType::Not => "Not",
            OpType::Reshape => "Reshape",
            OpType::Flatten => "Flatten",
            OpType::Transpose => "Transpose",
            OpType::Concat => "Concat",
            OpType::Shape => "Shape",
            OpType::ConstantOfShape => "ConstantOfShape",
            OpType::ReduceSum => "ReduceSum",
            OpType::ReduceMean => "ReduceMean",
            OpType::Conv2d => "Conv2d",
            OpType::Pooling2d => "Pooling2d",
            OpType::GlobalAveragePool => "GlobalAveragePool",
            OpType::BatchNorm2d => "BatchNorm2d",
            OpType::Dropout => "Dropout",
            OpType::SoftMaxCrossEntropy => "SoftMaxCrossEntropy",
            OpType::NLL => "NLL",
            OpType::MeanSquareError => "MeanSquareError",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A differentiable computation over raw buffers. Operators cache whatever
/// their backward pass needs during `forward`.
pub trait Operation: AsAny + Send + Sync {
    fn op_type(&self) -> OpType;

    fn forward(&mut self, _xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        Err(Error::NotImplemented(format!("{}::forward", self.op_type())))
    }

    /// One entry per forward input; `None` where no gradient applies.
    fn backward(&self, _dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        Err(Error::NotImplemented(format!("{}::backward", self.op_type())))
    }
}

/// How an operation reached one of its inputs.
#[derive(Clone)]
pub struct SrcBinding {
    pub creator: Arc<OpNode>,
    pub input_id: TensorId,
    /// The input itself, kept only when it stores gradients.
    pub retained: Option<Tensor>,
    pub stores_grad: bool,
}

/// A recorded application of an [`Operation`].
pub struct OpNode {
    id: OpId,
    /// Placeholders can be renamed after consumers have bound them.
    name: RwLock<String>,
    requires_grad: bool,
    src: Vec<SrcBinding>,
    y_ids: Vec<TensorId>,
    y_id2idx: HashMap<TensorId, usize>,
    y_shapes: Vec<Vec<usize>>,
    op: Box<dyn Operation>,
}

impl OpNode {
    fn new(op: Box<dyn Operation>, requires_grad: bool, src: Vec<SrcBinding>, ys: &[(TensorId, Vec<usize>)]) -> Self {
        let id = OpId::next();
        let name = format!("{}#{}", op.op_type(), id.0);
        Self {
            id,
            name: RwLock::new(name),
            requires_grad,
            src,
            y_ids: ys.iter().map(|(y, _)| *y).collect(),
            y_id2idx: ys.iter().enumerate().map(|(i, (y, _))| (*y, i)).collect(),
            y_shapes: ys.iter().map(|(_, s)| s.clone()).collect(),
            op,
        }
    }

    /// Placeholder producer of a leaf tensor.
    pub(crate) fn dummy(y: TensorId, data: RawTensor) -> Self {
        let shape = data.shape().to_vec();
        Self::new(Box::new(Dummy::new(data)), false, Vec::new(), &[(y, shape)])
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn name(&self) -> String {
        match self.name.read() {
            Ok(name) => name.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Renames a placeholder. Every binding that refers to it sees the new name.
    pub(crate) fn rename(&self, name: String) {
        match self.name.write() {
            Ok(mut slot) => *slot = name,
            Err(poisoned) => *poisoned.into_inner() = name,
        }
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn src(&self) -> &[SrcBinding] {
        &self.src
    }

    pub fn y_ids(&self) -> &[TensorId] {
        &self.y_ids
    }

    pub fn y_index(&self, y: TensorId) -> Option<usize> {
        self.y_id2idx.get(&y).copied()
    }

    pub fn y_shapes(&self) -> &[Vec<usize>] {
        &self.y_shapes
    }

    pub fn num_outputs(&self) -> usize {
        self.y_ids.len()
    }

    pub fn op(&self) -> &dyn Operation {
        self.op.as_ref()
    }

    pub fn op_type(&self) -> OpType {
        self.op.op_type()
    }

    pub fn is_dummy(&self) -> bool {
        self.op_type() == OpType::Dummy
    }

    pub fn downcast<T: Operation + 'static>(&self) -> Option<&T> {
        self.op().as_any().downcast_ref::<T>()
    }

    /// Name of the `idx`-th output; a placeholder's single output is the node name.
    pub fn output_name(&self, idx: usize) -> String {
        if self.is_dummy() {
            self.name()
        } else {
            format!("{}:{}", self.name(), idx)
        }
    }

    pub(crate) fn run_backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dxs = self.op.backward(dys)?;
        if dxs.len() != self.src.len() {
            return Err(Error::Runtime(format!(
                "{} returned {} gradients for {} inputs",
                self.name(),
                dxs.len(),
                self.src.len()
            )));
        }
        Ok(dxs)
    }
}

impl fmt::Debug for OpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpNode")
            .field("name", &self.name())
            .field("requires_grad", &self.requires_grad)
            .field("inputs", &self.src.len())
            .field("outputs", &self.y_ids.len())
            .finish()
    }
}

/// Runs `op` on `inputs` and records the node linking outputs to inputs.
pub fn call<O: Operation + 'static>(mut op: O, inputs: &[&Tensor], mode: Mode) -> Result<Vec<Tensor>> {
    let first = inputs
        .first()
        .ok_or_else(|| Error::InvalidArgument(format!("{} called without inputs", op.op_type())))?;
    let device = first.device();
    let xs = inputs
        .iter()
        .map(|x| x.data().to_device(device))
        .collect::<Result<Vec<_>>>()?;

    let ys = op.forward(&xs, mode)?;

    let requires_grad = inputs.iter().any(|x| x.requires_grad());
    let src = inputs
        .iter()
        .map(|x| SrcBinding {
            creator: Arc::clone(x.creator()),
            input_id: x.id(),
            retained: if x.stores_grad() { Some((*x).clone()) } else { None },
            stores_grad: x.stores_grad(),
        })
        .collect();
    let outputs: Vec<(TensorId, RawTensor)> = ys.into_iter().map(|y| (TensorId::next(), y)).collect();
    let ys_meta: Vec<(TensorId, Vec<usize>)> = outputs.iter().map(|(id, y)| (*id, y.shape().to_vec())).collect();

    let node = Arc::new(OpNode::new(Box::new(op), requires_grad, src, &ys_meta));
    Ok(outputs
        .into_iter()
        .map(|(id, y)| Tensor::from_node(id, y, Arc::clone(&node), requires_grad))
        .collect())
}

//! Per-op-type construction rules used by the importer. Each rule reads the
//! node's attributes once and returns a forward closure that instantiates a
//! fresh operator per call.

use crate::{
    names::from_onnx_name,
    padding::{get_padding_shape, split_pads, AutoPad},
    proto::NodeProto,
};
use tessel_autograd::{
    call,
    ops::{
        AddBias, BatchNorm2d, Binary, BinaryFn, Clip, Concat, ConstantOfShape, Conv2d, Dropout, Elu, Flatten, Gemm,
        GlobalAveragePool, HardSigmoid, LeakyRelu, Logical, LogicalFn, Matmul, Mean, MeanSquareError, Not, PRelu,
        Pooling2d, ReduceMean, ReduceSum, Reshape, SeLU, Shape, SoftMax, SoftMaxCrossEntropy, Sum, Transpose,
        UnaryMath, ReLU, NLL,
    },
    MathFn, Mode, Operation, Tensor,
};
use tessel_core::{
    dtype::DType,
    error::{Error, Result},
};
use tessel_tensor::{BatchNormHandle, ConvHandle, PoolingHandle};

pub type ForwardFn = Box<dyn Fn(&[Tensor], Mode) -> Result<Vec<Tensor>> + Send + Sync>;

/// Native state reconstructed from a node's attributes.
#[derive(Debug, Clone)]
pub enum Handle {
    Conv(ConvHandle),
    Pooling(PoolingHandle),
    BatchNorm(BatchNormHandle),
}

pub(crate) struct Built {
    pub handle: Option<Handle>,
    /// Inputs folded into the operator at build time.
    pub consumed: Vec<String>,
    pub forward: ForwardFn,
}

impl Built {
    fn plain(forward: ForwardFn) -> Self {
        Self {
            handle: None,
            consumed: Vec::new(),
            forward,
        }
    }
}

const MATH_FNS: [MathFn; 23] = [
    MathFn::Sigmoid,
    MathFn::Tanh,
    MathFn::Exp,
    MathFn::Log,
    MathFn::Sqrt,
    MathFn::Negative,
    MathFn::Reciprocal,
    MathFn::Sign,
    MathFn::Abs,
    MathFn::SoftPlus,
    MathFn::SoftSign,
    MathFn::Identity,
    MathFn::Cos,
    MathFn::Cosh,
    MathFn::Sin,
    MathFn::Sinh,
    MathFn::Tan,
    MathFn::Acos,
    MathFn::Acosh,
    MathFn::Asin,
    MathFn::Asinh,
    MathFn::Atan,
    MathFn::Atanh,
];

fn run<O: Operation + 'static>(op: O, xs: &[Tensor], mode: Mode) -> Result<Vec<Tensor>> {
    let refs: Vec<&Tensor> = xs.iter().collect();
    call(op, &refs, mode)
}

fn stateless<O, F>(make: F) -> ForwardFn
where
    O: Operation + 'static,
    F: Fn() -> O + Send + Sync + 'static,
{
    Box::new(move |xs: &[Tensor], mode: Mode| run(make(), xs, mode))
}

/// Left fold of a binary operator over any number of inputs.
fn variadic(func: BinaryFn) -> ForwardFn {
    Box::new(move |xs: &[Tensor], mode: Mode| -> Result<Vec<Tensor>> {
        let (first, rest) = xs
            .split_first()
            .ok_or_else(|| Error::InvalidArgument(format!("{:?} called without inputs", func)))?;
        let mut acc = first.clone();
        for x in rest {
            acc = run(Binary::new(func), &[acc, x.clone()], mode)?.remove(0);
        }
        Ok(vec![acc])
    })
}

/// Node inputs aligned with `node.input`; omitted optional inputs are `None`.
pub(crate) struct Inputs<'a> {
    node: &'a NodeProto,
    values: &'a [Option<Tensor>],
}

impl<'a> Inputs<'a> {
    pub fn new(node: &'a NodeProto, values: &'a [Option<Tensor>]) -> Self {
        Self { node, values }
    }

    fn get(&self, idx: usize) -> Result<&'a Tensor> {
        self.optional(idx).ok_or_else(|| {
            Error::InvalidArgument(format!("{} ({}) is missing input {}", self.node.name, self.node.op_type, idx))
        })
    }

    fn optional(&self, idx: usize) -> Option<&'a Tensor> {
        self.values.get(idx).and_then(|v| v.as_ref())
    }

    fn name(&self, idx: usize) -> Option<String> {
        self.node.input.get(idx).filter(|n| !n.is_empty()).cloned()
    }
}

fn bad_attr(node: &NodeProto, name: &str) -> Error {
    Error::InvalidArgument(format!("attribute {} of {} has the wrong type", name, node.name))
}

fn float_attr(node: &NodeProto, name: &str, default: f32) -> Result<f32> {
    match node.attr(name) {
        Some(v) => v.as_float().ok_or_else(|| bad_attr(node, name)),
        None => Ok(default),
    }
}

fn int_attr(node: &NodeProto, name: &str, default: i64) -> Result<i64> {
    match node.attr(name) {
        Some(v) => v.as_int().ok_or_else(|| bad_attr(node, name)),
        None => Ok(default),
    }
}

fn ints_attr(node: &NodeProto, name: &str) -> Result<Option<Vec<i64>>> {
    node.attr(name)
        .map(|v| v.as_ints().map(<[i64]>::to_vec).ok_or_else(|| bad_attr(node, name)))
        .transpose()
}

fn to_usize(node: &NodeProto, name: &str, values: &[i64]) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|&v| usize::try_from(v).map_err(|_| Error::InvalidArgument(format!("{} of {} must be non-negative", name, node.name))))
        .collect()
}

/// Builds the construction rule for `node`. Unknown op types are rejected.
pub(crate) fn build(node: &NodeProto, values: &[Option<Tensor>]) -> Result<Built> {
    let inputs = Inputs::new(node, values);
    let internal = from_onnx_name(&node.op_type);
    match internal {
        "Dummy" => constant(node),
        "Conv2d" => conv(node, &inputs),
        "Pooling2d" => pooling(node, &inputs),
        "BatchNorm2d" => batchnorm(node, &inputs),
        "Reshape" => reshape(&inputs),
        "Clip" => clip(node, &inputs),
        other => simple(node, other).map(Built::plain),
    }
}

fn simple(node: &NodeProto, internal: &str) -> Result<ForwardFn> {
    let forward = match internal {
        "ReLU" => stateless(ReLU::default),
        "PRelu" => stateless(PRelu::default),
        "LeakyRelu" => {
            let alpha = float_attr(node, "alpha", 0.01)?;
            stateless(move || LeakyRelu::new(alpha))
        }
        "Elu" => {
            let alpha = float_attr(node, "alpha", 1.0)?;
            stateless(move || Elu::new(alpha))
        }
        "SeLU" => {
            let alpha = float_attr(node, "alpha", 1.67326)?;
            let gamma = float_attr(node, "gamma", 1.0507)?;
            stateless(move || SeLU::new(alpha, gamma))
        }
        "HardSigmoid" => {
            let alpha = float_attr(node, "alpha", 0.2)?;
            let beta = float_attr(node, "beta", 0.5)?;
            stateless(move || HardSigmoid::new(alpha, beta))
        }
        "SoftMax" => {
            let axis = int_attr(node, "axis", 1)? as isize;
            stateless(move || SoftMax::new(axis))
        }
        "Add" => stateless(|| Binary::new(BinaryFn::Add)),
        "Sub" => stateless(|| Binary::new(BinaryFn::Sub)),
        "Mul" => stateless(|| Binary::new(BinaryFn::Mul)),
        "Div" => stateless(|| Binary::new(BinaryFn::Div)),
        "Pow" => stateless(|| Binary::new(BinaryFn::Pow)),
        "Max" => variadic(BinaryFn::Max),
        "Min" => variadic(BinaryFn::Min),
        "AddBias" => {
            let axis = int_attr(node, "axis", 0)? as usize;
            stateless(move || AddBias::new(axis))
        }
        "Sum" => stateless(Sum::default),
        "Mean" => stateless(Mean::default),
        "Matmul" => stateless(Matmul::default),
        "Gemm" => {
            let alpha = float_attr(node, "alpha", 1.0)?;
            let beta = float_attr(node, "beta", 1.0)?;
            let trans_a = int_attr(node, "transA", 0)? != 0;
            let trans_b = int_attr(node, "transB", 0)? != 0;
            stateless(move || Gemm::new(alpha, beta, trans_a, trans_b))
        }
        "Equal" => stateless(|| Logical::new(LogicalFn::Equal)),
        "Less" => stateless(|| Logical::new(LogicalFn::Less)),
        "Greater" => stateless(|| Logical::new(LogicalFn::Greater)),
        "And" => stateless(|| Logical::new(LogicalFn::And)),
        "Or" => stateless(|| Logical::new(LogicalFn::Or)),
        "Xor" => stateless(|| Logical::new(LogicalFn::Xor)),
        "Not" => stateless(|| Not),
        "Flatten" => {
            let axis = int_attr(node, "axis", 1)? as isize;
            stateless(move || Flatten::new(axis))
        }
        "Transpose" => {
            let perm = ints_attr(node, "perm")?.map(|p| to_usize(node, "perm", &p)).transpose()?;
            stateless(move || Transpose::new(perm.clone()))
        }
        "Concat" => {
            let axis = node
                .attr("axis")
                .and_then(|v| v.as_int())
                .ok_or_else(|| Error::InvalidArgument(format!("Concat node {} needs an axis", node.name)))?;
            stateless(move || Concat::new(axis as isize))
        }
        "Shape" => stateless(|| Shape),
        "ConstantOfShape" => {
            let value = match node.attr("value") {
                Some(v) => v
                    .as_tensor()
                    .and_then(|t| t.first_f32())
                    .or_else(|| v.as_float())
                    .ok_or_else(|| bad_attr(node, "value"))?,
                None => 0.0,
            };
            stateless(move || ConstantOfShape::new(value))
        }
        "ReduceSum" | "ReduceMean" => {
            let axes: Option<Vec<isize>> = ints_attr(node, "axes")?.map(|a| a.into_iter().map(|v| v as isize).collect());
            let keepdims = int_attr(node, "keepdims", 1)? != 0;
            if internal == "ReduceSum" {
                stateless(move || ReduceSum::new(axes.clone(), keepdims))
            } else {
                stateless(move || ReduceMean::new(axes.clone(), keepdims))
            }
        }
        "GlobalAveragePool" => stateless(GlobalAveragePool::default),
        "Dropout" => {
            let ratio = float_attr(node, "ratio", 0.0)?;
            stateless(move || Dropout::new(ratio))
        }
        "SoftMaxCrossEntropy" => stateless(SoftMaxCrossEntropy::default),
        "NLL" => stateless(NLL::default),
        "MeanSquareError" => stateless(MeanSquareError::default),
        other => match MATH_FNS.iter().find(|f| f.name() == other) {
            Some(&func) => stateless(move || UnaryMath::new(func)),
            None => {
                return Err(Error::NotSupported(format!(
                    "operator {} (node {})",
                    node.op_type, node.name
                )))
            }
        },
    };
    Ok(forward)
}

fn constant(node: &NodeProto) -> Result<Built> {
    let value = node
        .attr("value")
        .and_then(|v| v.as_tensor())
        .ok_or_else(|| Error::InvalidArgument(format!("Constant node {} has no tensor value", node.name)))?;
    let tensor = Tensor::new(value.to_raw()?);
    Ok(Built::plain(Box::new(move |_: &[Tensor], _: Mode| -> Result<Vec<Tensor>> { Ok(vec![tensor.clone()]) })))
}

fn reshape(inputs: &Inputs) -> Result<Built> {
    let shape: Vec<i64> = inputs.get(1)?.data().to_vec_i32().into_iter().map(i64::from).collect();
    Ok(Built {
        handle: None,
        consumed: inputs.name(1).into_iter().collect(),
        forward: stateless(move || Reshape::new(shape.clone())),
    })
}

/// Bounds come from inputs 1 and 2, or from attributes in older documents.
fn clip(node: &NodeProto, inputs: &Inputs) -> Result<Built> {
    let bound = |idx: usize, attr: &str| -> Result<Option<f32>> {
        if let Some(t) = inputs.optional(idx) {
            return Ok(t.to_vec_f32().first().copied());
        }
        node.attr(attr).map(|v| v.as_float().ok_or_else(|| bad_attr(node, attr))).transpose()
    };
    let (min, max) = (bound(1, "min")?, bound(2, "max")?);
    Ok(Built {
        handle: None,
        consumed: [1, 2].into_iter().filter_map(|i| inputs.name(i)).collect(),
        forward: stateless(move || Clip::new(min, max)),
    })
}

struct Window {
    kernel: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
    odd: [usize; 4],
}

/// Kernel, stride and padding of a conv/pool node, with 1-D windows lifted
/// to height 1.
fn window(node: &NodeProto, x: &Tensor) -> Result<Window> {
    let kernel = ints_attr(node, "kernel_shape")?
        .ok_or_else(|| Error::InvalidArgument(format!("{} needs kernel_shape", node.name)))?;
    let kernel = to_usize(node, "kernel_shape", &kernel)?;
    let dims = kernel.len();
    let lift = |v: &[usize]| -> [usize; 2] {
        match *v {
            [w] => [1, w],
            [h, w, ..] => [h, w],
            [] => [1, 1],
        }
    };

    let stride = match ints_attr(node, "strides")? {
        Some(s) => to_usize(node, "strides", &s)?,
        None => vec![1; dims],
    };
    let pads = match ints_attr(node, "pads")? {
        Some(p) => to_usize(node, "pads", &p)?,
        None => vec![0; dims * 2],
    };
    let explicit: [usize; 4] = match *pads.as_slice() {
        [b, e] => [0, b, 0, e],
        [hb, wb, he, we] => [hb, wb, he, we],
        _ => return Err(Error::InvalidArgument(format!("{} has {} pads for a {}-D window", node.name, pads.len(), dims))),
    };

    let (kernel, stride) = (lift(&kernel), lift(&stride));
    let auto_pad = match node.attr("auto_pad") {
        Some(v) => AutoPad::parse(v.as_str().ok_or_else(|| bad_attr(node, "auto_pad"))?)?,
        None => AutoPad::NotSet,
    };
    let (padding, odd) = if auto_pad == AutoPad::NotSet {
        split_pads(&explicit)
    } else {
        get_padding_shape(auto_pad, lift(x.shape().get(2..).unwrap_or(&[])), kernel, stride)?
    };
    Ok(Window {
        kernel,
        stride,
        padding,
        odd,
    })
}

fn conv(node: &NodeProto, inputs: &Inputs) -> Result<Built> {
    let (x, w) = (inputs.get(0)?, inputs.get(1)?);
    let kernel_dims = ints_attr(node, "kernel_shape")?.map_or(0, |k| k.len());
    if kernel_dims > 2 {
        return Err(Error::NotSupported(format!("{}-D convolution ({})", kernel_dims, node.name)));
    }
    if let Some(dilations) = ints_attr(node, "dilations")? {
        if dilations.iter().any(|&d| d != 1) {
            return Err(Error::NotSupported(format!("dilation {:?} ({})", dilations, node.name)));
        }
    }
    let group = usize::try_from(int_attr(node, "group", 1)?)
        .ok()
        .filter(|&g| g > 0)
        .ok_or_else(|| bad_attr(node, "group"))?;
    let window = window(node, x)?;

    let (in_channels, out_channels) = match (x.shape().get(1), w.shape()) {
        (Some(&c), [o, per_group, ..]) if per_group * group == c => (c, *o),
        _ => {
            return Err(Error::shape(format!(
                "{}: weight {:?} does not match input {:?} with group {}",
                node.name,
                w.shape(),
                x.shape(),
                group
            )))
        }
    };
    let bias = inputs.optional(2).is_some();
    let handle = ConvHandle::new(
        x.data(),
        window.kernel,
        window.stride,
        window.padding,
        in_channels,
        out_channels,
        bias,
        group,
    )?;
    let odd = window.odd;
    let forward_handle = handle.clone();
    Ok(Built {
        handle: Some(Handle::Conv(handle)),
        consumed: Vec::new(),
        forward: stateless(move || Conv2d::new(forward_handle.clone(), odd)),
    })
}

fn pooling(node: &NodeProto, inputs: &Inputs) -> Result<Built> {
    let x = inputs.get(0)?;
    if node.has_attr("count_include_pad") || node.has_attr("ceil_mode") {
        return Err(Error::NotSupported(format!("count_include_pad or ceil_mode ({})", node.name)));
    }
    let kernel_dims = ints_attr(node, "kernel_shape")?.map_or(0, |k| k.len());
    if kernel_dims != 2 {
        return Err(Error::NotSupported(format!("{}-D pooling ({})", kernel_dims, node.name)));
    }
    let window = window(node, x)?;
    let handle = PoolingHandle::new(window.kernel, window.stride, window.padding, node.op_type == "MaxPool")?;
    let odd = window.odd;
    let forward_handle = handle.clone();
    Ok(Built {
        handle: Some(Handle::Pooling(handle)),
        consumed: Vec::new(),
        forward: stateless(move || Pooling2d::new(forward_handle.clone(), odd)),
    })
}

/// Inputs are `x, scale, bias, mean, var`; the running statistics move into
/// the handle.
fn batchnorm(node: &NodeProto, inputs: &Inputs) -> Result<Built> {
    let momentum = float_attr(node, "momentum", 0.9)?;
    let epsilon = float_attr(node, "epsilon", 1e-5)?;
    let mean = inputs.get(3)?.data().to_dtype(DType::F32)?;
    let var = inputs.get(4)?.data().to_dtype(DType::F32)?;
    let handle = BatchNormHandle::new(momentum, epsilon, mean, var)?;
    let forward_handle = handle.clone();
    Ok(Built {
        handle: Some(Handle::BatchNorm(handle)),
        consumed: [3, 4].into_iter().filter_map(|i| inputs.name(i)).collect(),
        forward: stateless(move || BatchNorm2d::new(forward_handle.clone())),
    })
}

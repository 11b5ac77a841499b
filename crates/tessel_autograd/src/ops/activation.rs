use super::{apply, cached, expect_grads, expect_inputs};
use crate::{
    mode::Mode,
    operation::{MathFn, OpType, Operation},
    tensor::Tensor,
};
use tessel_core::error::Result;
use tessel_tensor::RawTensor;

#[derive(Default)]
pub struct ReLU {
    mask: Option<RawTensor>,
}

impl Operation for ReLU {
    fn op_type(&self) -> OpType {
        OpType::ReLU
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "ReLU")?[0];
        self.mask = Some(x.gt_mask(0.0)?);
        Ok(vec![x.relu()?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "ReLU")?;
        Ok(vec![Some(dy.mul(cached(&self.mask, "ReLU")?)?)])
    }
}

pub struct LeakyRelu {
    pub alpha: f32,
    x: Option<RawTensor>,
}

impl LeakyRelu {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, x: None }
    }
}

impl Operation for LeakyRelu {
    fn op_type(&self) -> OpType {
        OpType::LeakyRelu
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "LeakyRelu")?[0];
        self.x = Some(x.clone());
        Ok(vec![x.leaky_relu(self.alpha)?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "LeakyRelu")?;
        let alpha = self.alpha;
        let slope = cached(&self.x, "LeakyRelu")?.map(move |v| if v > 0.0 { 1.0 } else { alpha })?;
        Ok(vec![Some(dy.mul(&slope)?)])
    }
}

pub struct Elu {
    pub alpha: f32,
    x: Option<RawTensor>,
}

impl Elu {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, x: None }
    }
}

impl Operation for Elu {
    fn op_type(&self) -> OpType {
        OpType::Elu
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "Elu")?[0];
        self.x = Some(x.clone());
        Ok(vec![x.elu(self.alpha)?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Elu")?;
        let alpha = self.alpha;
        let slope = cached(&self.x, "Elu")?.map(move |v| if v > 0.0 { 1.0 } else { alpha * v.exp() })?;
        Ok(vec![Some(dy.mul(&slope)?)])
    }
}

/// `gamma * (x > 0 ? x : alpha * (exp(x) - 1))`.
pub struct SeLU {
    pub alpha: f32,
    pub gamma: f32,
    x: Option<RawTensor>,
}

impl SeLU {
    pub fn new(alpha: f32, gamma: f32) -> Self {
        Self { alpha, gamma, x: None }
    }
}

impl Operation for SeLU {
    fn op_type(&self) -> OpType {
        OpType::SeLU
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "SeLU")?[0];
        self.x = Some(x.clone());
        let (alpha, gamma) = (self.alpha, self.gamma);
        Ok(vec![x.map(move |v| if v > 0.0 { gamma * v } else { gamma * alpha * (v.exp() - 1.0) })?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "SeLU")?;
        let (alpha, gamma) = (self.alpha, self.gamma);
        let slope = cached(&self.x, "SeLU")?.map(move |v| if v > 0.0 { gamma } else { gamma * alpha * v.exp() })?;
        Ok(vec![Some(dy.mul(&slope)?)])
    }
}

/// `clip(alpha * x + gamma, 0, 1)`. `gamma` is exported as the `beta` attribute.
pub struct HardSigmoid {
    pub alpha: f32,
    pub gamma: f32,
    x: Option<RawTensor>,
}

impl HardSigmoid {
    pub fn new(alpha: f32, gamma: f32) -> Self {
        Self { alpha, gamma, x: None }
    }
}

impl Operation for HardSigmoid {
    fn op_type(&self) -> OpType {
        OpType::HardSigmoid
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "HardSigmoid")?[0];
        self.x = Some(x.clone());
        Ok(vec![x.mul_scalar(self.alpha)?.add_scalar(self.gamma)?.clip(0.0, 1.0)?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "HardSigmoid")?;
        let (alpha, gamma) = (self.alpha, self.gamma);
        let slope = cached(&self.x, "HardSigmoid")?.map(move |v| {
            let z = alpha * v + gamma;
            if z > 0.0 && z < 1.0 {
                alpha
            } else {
                0.0
            }
        })?;
        Ok(vec![Some(dy.mul(&slope)?)])
    }
}

/// Leaky ReLU with a learned, broadcastable slope.
#[derive(Default)]
pub struct PRelu {
    cache: Option<(RawTensor, RawTensor)>,
}

impl Operation for PRelu {
    fn op_type(&self) -> OpType {
        OpType::PRelu
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let xs = expect_inputs(xs, 2, "PRelu")?;
        let (x, slope) = (&xs[0], &xs[1]);
        let pos = x.gt_mask(0.0)?;
        let neg = pos.map(|m| 1.0 - m)?;
        let y = x.mul(&pos)?.add(&x.mul(&neg)?.mul(slope)?)?;
        self.cache = Some((x.clone(), slope.clone()));
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "PRelu")?;
        let (x, slope) = cached(&self.cache, "PRelu")?;
        let pos = x.gt_mask(0.0)?;
        let neg = pos.map(|m| 1.0 - m)?;
        let dx = dy.mul(&pos.add(&neg.mul(slope)?)?)?;
        let dslope = dy.mul(&x.mul(&neg)?)?.reduce_to_shape(slope.shape())?;
        Ok(vec![Some(dx), Some(dslope)])
    }
}

pub struct SoftMax {
    pub axis: isize,
    y: Option<RawTensor>,
}

impl SoftMax {
    pub fn new(axis: isize) -> Self {
        Self { axis, y: None }
    }
}

impl Operation for SoftMax {
    fn op_type(&self) -> OpType {
        OpType::SoftMax
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "SoftMax")?[0];
        let y = x.softmax_forward(self.axis)?;
        self.y = Some(y.clone());
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "SoftMax")?;
        Ok(vec![Some(cached(&self.y, "SoftMax")?.softmax_backward(dy, self.axis)?)])
    }
}

/// Elementwise clamp; a missing bound leaves that side open.
pub struct Clip {
    pub min: Option<f32>,
    pub max: Option<f32>,
    mask: Option<RawTensor>,
}

impl Clip {
    pub fn new(min: Option<f32>, max: Option<f32>) -> Self {
        Self { min, max, mask: None }
    }
}

impl Operation for Clip {
    fn op_type(&self) -> OpType {
        OpType::Clip
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "Clip")?[0];
        let min = self.min.unwrap_or(f32::NEG_INFINITY);
        let max = self.max.unwrap_or(f32::INFINITY);
        self.mask = Some(x.in_range_mask(min, max)?);
        Ok(vec![x.clip(min, max)?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Clip")?;
        Ok(vec![Some(dy.mul(cached(&self.mask, "Clip")?)?)])
    }
}

/// Parameterless elementwise function.
pub struct UnaryMath {
    pub func: MathFn,
    cache: Option<(RawTensor, RawTensor)>,
}

impl UnaryMath {
    pub fn new(func: MathFn) -> Self {
        Self { func, cache: None }
    }

    fn eval(&self, x: &RawTensor) -> Result<RawTensor> {
        match self.func {
            MathFn::Sigmoid => x.sigmoid(),
            MathFn::Tanh => x.tanh(),
            MathFn::Exp => x.exp(),
            MathFn::Log => x.log(),
            MathFn::Sqrt => x.sqrt(),
            MathFn::Negative => x.neg(),
            MathFn::Reciprocal => x.recip(),
            MathFn::Sign => x.sign(),
            MathFn::Abs => x.abs(),
            MathFn::SoftPlus => x.softplus(),
            MathFn::SoftSign => x.softsign(),
            MathFn::Identity => Ok(x.clone()),
            MathFn::Cos => x.cos(),
            MathFn::Cosh => x.cosh(),
            MathFn::Sin => x.sin(),
            MathFn::Sinh => x.sinh(),
            MathFn::Tan => x.tan(),
            MathFn::Acos => x.acos(),
            MathFn::Acosh => x.acosh(),
            MathFn::Asin => x.asin(),
            MathFn::Asinh => x.asinh(),
            MathFn::Atan => x.atan(),
            MathFn::Atanh => x.atanh(),
        }
    }

    /// `dy/dx` given input `x` and output `y`.
    fn derivative(&self, x: &RawTensor, y: &RawTensor) -> Result<RawTensor> {
        match self.func {
            MathFn::Sigmoid => y.map(|s| s * (1.0 - s)),
            MathFn::Tanh => y.map(|t| 1.0 - t * t),
            MathFn::Exp => Ok(y.clone()),
            MathFn::Log => x.recip(),
            MathFn::Sqrt => y.map(|s| 0.5 / s),
            MathFn::Negative => x.map(|_| -1.0),
            MathFn::Reciprocal => x.map(|v| -1.0 / (v * v)),
            MathFn::Sign => x.map(|_| 0.0),
            MathFn::Abs => x.sign(),
            MathFn::SoftPlus => x.sigmoid(),
            MathFn::SoftSign => x.map(|v| 1.0 / ((1.0 + v.abs()) * (1.0 + v.abs()))),
            MathFn::Identity => x.map(|_| 1.0),
            MathFn::Cos => x.map(|v| -v.sin()),
            MathFn::Cosh => x.sinh(),
            MathFn::Sin => x.cos(),
            MathFn::Sinh => x.cosh(),
            MathFn::Tan => y.map(|t| 1.0 + t * t),
            MathFn::Acos => x.map(|v| -1.0 / (1.0 - v * v).sqrt()),
            MathFn::Acosh => x.map(|v| 1.0 / (v * v - 1.0).sqrt()),
            MathFn::Asin => x.map(|v| 1.0 / (1.0 - v * v).sqrt()),
            MathFn::Asinh => x.map(|v| 1.0 / (v * v + 1.0).sqrt()),
            MathFn::Atan => x.map(|v| 1.0 / (1.0 + v * v)),
            MathFn::Atanh => x.map(|v| 1.0 / (1.0 - v * v)),
        }
    }
}

impl Operation for UnaryMath {
    fn op_type(&self) -> OpType {
        OpType::Math(self.func)
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, self.func.name())?[0];
        let y = self.eval(x)?;
        self.cache = Some((x.clone(), y.clone()));
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, self.func.name())?;
        let (x, y) = cached(&self.cache, self.func.name())?;
        Ok(vec![Some(dy.mul(&self.derivative(x, y)?)?)])
    }
}

// functional

pub fn relu(x: &Tensor) -> Result<Tensor> {
    apply(ReLU::default(), &[x], Mode::Train)
}

pub fn leaky_relu(x: &Tensor, alpha: f32) -> Result<Tensor> {
    apply(LeakyRelu::new(alpha), &[x], Mode::Train)
}

pub fn elu(x: &Tensor, alpha: f32) -> Result<Tensor> {
    apply(Elu::new(alpha), &[x], Mode::Train)
}

pub fn selu(x: &Tensor, alpha: f32, gamma: f32) -> Result<Tensor> {
    apply(SeLU::new(alpha, gamma), &[x], Mode::Train)
}

pub fn hard_sigmoid(x: &Tensor, alpha: f32, gamma: f32) -> Result<Tensor> {
    apply(HardSigmoid::new(alpha, gamma), &[x], Mode::Train)
}

pub fn prelu(x: &Tensor, slope: &Tensor) -> Result<Tensor> {
    apply(PRelu::default(), &[x, slope], Mode::Train)
}

pub fn softmax(x: &Tensor, axis: isize) -> Result<Tensor> {
    apply(SoftMax::new(axis), &[x], Mode::Train)
}

pub fn clip(x: &Tensor, min: Option<f32>, max: Option<f32>) -> Result<Tensor> {
    apply(Clip::new(min, max), &[x], Mode::Train)
}

pub fn unary_math(x: &Tensor, func: MathFn) -> Result<Tensor> {
    apply(UnaryMath::new(func), &[x], Mode::Train)
}

macro_rules! math_fns {
    ($($name:ident => $func:ident),* $(,)?) => {
        $(
            pub fn $name(x: &Tensor) -> Result<Tensor> {
                unary_math(x, MathFn::$func)
            }
        )*
    };
}

math_fns!(
    sigmoid => Sigmoid,
    tanh => Tanh,
    exp => Exp,
    log => Log,
    sqrt => Sqrt,
    negative => Negative,
    reciprocal => Reciprocal,
    sign => Sign,
    abs => Abs,
    softplus => SoftPlus,
    softsign => SoftSign,
    identity => Identity,
    cos => Cos,
    cosh => Cosh,
    sin => Sin,
    sinh => Sinh,
    tan => Tan,
    acos => Acos,
    acosh => Acosh,
    asin => Asin,
    asinh => Asinh,
    atan => Atan,
    atanh => Atanh,
);

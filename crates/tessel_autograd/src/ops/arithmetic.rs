use super::{apply, cached, expect_grads, expect_inputs};
use crate::{
    mode::Mode,
    operation::{OpType, Operation},
    tensor::Tensor,
};
use tessel_core::{
    dtype::DType,
    error::{Error, Result},
};
use tessel_tensor::RawTensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryFn {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Max,
    Min,
}

/// Broadcasting elementwise binary arithmetic. Gradients are summed back to
/// each operand's shape.
pub struct Binary {
    pub func: BinaryFn,
    cache: Option<(RawTensor, RawTensor, RawTensor)>,
}

impl Binary {
    pub fn new(func: BinaryFn) -> Self {
        Self { func, cache: None }
    }
}

impl Operation for Binary {
    fn op_type(&self) -> OpType {
        match self.func {
            BinaryFn::Add => OpType::Add,
            BinaryFn::Sub => OpType::Sub,
            BinaryFn::Mul => OpType::Mul,
            BinaryFn::Div => OpType::Div,
            BinaryFn::Pow => OpType::Pow,
            BinaryFn::Max => OpType::Max,
            BinaryFn::Min => OpType::Min,
        }
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let xs = expect_inputs(xs, 2, self.op_type().name())?;
        let (a, b) = (&xs[0], &xs[1]);
        let y = match self.func {
            BinaryFn::Add => a.add(b)?,
            BinaryFn::Sub => a.sub(b)?,
            BinaryFn::Mul => a.mul(b)?,
            BinaryFn::Div => a.div(b)?,
            BinaryFn::Pow => a.pow(b)?,
            BinaryFn::Max => a.maximum(b)?,
            BinaryFn::Min => a.minimum(b)?,
        };
        self.cache = Some((a.clone(), b.clone(), y.clone()));
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let name = self.op_type().name();
        let dy = expect_grads(dys, name)?;
        let (a, b, y) = cached(&self.cache, name)?;
        let (da, db) = match self.func {
            BinaryFn::Add => (dy.clone(), dy.clone()),
            BinaryFn::Sub => (dy.clone(), dy.neg()?),
            BinaryFn::Mul => (dy.mul(b)?, dy.mul(a)?),
            BinaryFn::Div => (dy.div(b)?, dy.mul(&a.div(&b.square()?)?.neg()?)?),
            BinaryFn::Pow => {
                let da = dy.mul(&b.mul(&a.pow(&b.add_scalar(-1.0)?)?)?)?;
                let db = dy.mul(&y.mul(&a.log()?)?)?;
                (da, db)
            }
            BinaryFn::Max | BinaryFn::Min => {
                let a_wins = if self.func == BinaryFn::Max {
                    a.greater(b)?.logical_or(&a.equal(b)?)?
                } else {
                    a.less(b)?.logical_or(&a.equal(b)?)?
                };
                let a_mask = a_wins.to_dtype(DType::F32)?;
                let b_mask = a_mask.map(|m| 1.0 - m)?;
                (dy.mul(&a_mask)?, dy.mul(&b_mask)?)
            }
        };
        Ok(vec![Some(da.reduce_to_shape(a.shape())?), Some(db.reduce_to_shape(b.shape())?)])
    }
}

/// Adds a bias vector to every row (`axis == 0`) or every column (`axis == 1`)
/// of a matrix.
pub struct AddBias {
    pub axis: usize,
    bias_shape: Option<Vec<usize>>,
}

impl AddBias {
    pub fn new(axis: usize) -> Self {
        Self { axis, bias_shape: None }
    }
}

impl Operation for AddBias {
    fn op_type(&self) -> OpType {
        OpType::AddBias
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let xs = expect_inputs(xs, 2, "AddBias")?;
        let (x, b) = (&xs[0], &xs[1]);
        let &[rows, cols] = x.shape() else {
            return Err(Error::shape(format!("AddBias expects a matrix, got {:?}", x.shape())));
        };
        let b2 = match self.axis {
            0 => b.reshape(&[1, cols])?,
            1 => b.reshape(&[rows, 1])?,
            axis => return Err(Error::InvalidArgument(format!("AddBias axis must be 0 or 1, got {}", axis))),
        };
        self.bias_shape = Some(b.shape().to_vec());
        Ok(vec![x.add(&b2)?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "AddBias")?;
        let db = dy.sum(&[self.axis], false)?.reshape(cached(&self.bias_shape, "AddBias")?)?;
        Ok(vec![Some(dy.clone()), Some(db)])
    }
}

/// Variadic broadcasting sum.
#[derive(Default)]
pub struct Sum {
    shapes: Vec<Vec<usize>>,
}

impl Operation for Sum {
    fn op_type(&self) -> OpType {
        OpType::Sum
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        self.shapes = xs.iter().map(|x| x.shape().to_vec()).collect();
        Ok(vec![sum_all(xs)?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Sum")?;
        self.shapes.iter().map(|s| Ok(Some(dy.reduce_to_shape(s)?))).collect()
    }
}

/// Variadic broadcasting mean.
#[derive(Default)]
pub struct Mean {
    shapes: Vec<Vec<usize>>,
}

impl Operation for Mean {
    fn op_type(&self) -> OpType {
        OpType::Mean
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        self.shapes = xs.iter().map(|x| x.shape().to_vec()).collect();
        Ok(vec![sum_all(xs)?.mul_scalar(1.0 / xs.len() as f32)?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Mean")?.mul_scalar(1.0 / self.shapes.len().max(1) as f32)?;
        self.shapes.iter().map(|s| Ok(Some(dy.reduce_to_shape(s)?))).collect()
    }
}

fn sum_all(xs: &[RawTensor]) -> Result<RawTensor> {
    let (first, rest) = xs
        .split_first()
        .ok_or_else(|| Error::InvalidArgument("Sum of no inputs".to_string()))?;
    rest.iter().try_fold(first.clone(), |acc, x| acc.add(x))
}

/// 2-D matrix product.
#[derive(Default)]
pub struct Matmul {
    cache: Option<(RawTensor, RawTensor)>,
}

impl Operation for Matmul {
    fn op_type(&self) -> OpType {
        OpType::Matmul
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let xs = expect_inputs(xs, 2, "Matmul")?;
        let (x, w) = (&xs[0], &xs[1]);
        let y = x.matmul(w)?;
        self.cache = Some((x.clone(), w.clone()));
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Matmul")?;
        let (x, w) = cached(&self.cache, "Matmul")?;
        Ok(vec![Some(dy.matmul(&w.t()?)?), Some(x.t()?.matmul(dy)?)])
    }
}

/// `alpha * op(A) op(B) + beta * C`, `C` optional and broadcast.
pub struct Gemm {
    pub alpha: f32,
    pub beta: f32,
    pub trans_a: bool,
    pub trans_b: bool,
    cache: Option<(RawTensor, RawTensor, Option<Vec<usize>>)>,
}

impl Gemm {
    pub fn new(alpha: f32, beta: f32, trans_a: bool, trans_b: bool) -> Self {
        Self {
            alpha,
            beta,
            trans_a,
            trans_b,
            cache: None,
        }
    }
}

impl Operation for Gemm {
    fn op_type(&self) -> OpType {
        OpType::Gemm
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        if xs.len() != 2 && xs.len() != 3 {
            return Err(Error::InvalidArgument(format!("Gemm expects 2 or 3 inputs, got {}", xs.len())));
        }
        let a = if self.trans_a { xs[0].t()? } else { xs[0].clone() };
        let b = if self.trans_b { xs[1].t()? } else { xs[1].clone() };
        let mut y = a.matmul(&b)?.mul_scalar(self.alpha)?;
        let c_shape = match xs.get(2) {
            Some(c) => {
                y = y.add(&c.mul_scalar(self.beta)?)?;
                Some(c.shape().to_vec())
            }
            None => None,
        };
        self.cache = Some((a, b, c_shape));
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Gemm")?;
        let (a, b, c_shape) = cached(&self.cache, "Gemm")?;
        let da = dy.matmul(&b.t()?)?.mul_scalar(self.alpha)?;
        let db = a.t()?.matmul(dy)?.mul_scalar(self.alpha)?;
        let da = if self.trans_a { da.t()? } else { da };
        let db = if self.trans_b { db.t()? } else { db };
        let mut dxs = vec![Some(da), Some(db)];
        if let Some(shape) = c_shape {
            dxs.push(Some(dy.mul_scalar(self.beta)?.reduce_to_shape(shape)?));
        }
        Ok(dxs)
    }
}

// functional

macro_rules! binary_fns {
    ($($name:ident => $func:ident),* $(,)?) => {
        $(
            pub fn $name(a: &Tensor, b: &Tensor) -> Result<Tensor> {
                apply(Binary::new(BinaryFn::$func), &[a, b], Mode::Train)
            }
        )*
    };
}

binary_fns!(
    add => Add,
    sub => Sub,
    mul => Mul,
    div => Div,
    pow => Pow,
    max => Max,
    min => Min,
);

pub fn add_bias(x: &Tensor, b: &Tensor, axis: usize) -> Result<Tensor> {
    apply(AddBias::new(axis), &[x, b], Mode::Train)
}

pub fn sum(xs: &[&Tensor]) -> Result<Tensor> {
    apply(Sum::default(), xs, Mode::Train)
}

pub fn mean(xs: &[&Tensor]) -> Result<Tensor> {
    apply(Mean::default(), xs, Mode::Train)
}

pub fn matmul(x: &Tensor, w: &Tensor) -> Result<Tensor> {
    apply(Matmul::default(), &[x, w], Mode::Train)
}

#[allow(clippy::too_many_arguments)]
pub fn gemm(a: &Tensor, b: &Tensor, c: Option<&Tensor>, alpha: f32, beta: f32, trans_a: bool, trans_b: bool) -> Result<Tensor> {
    let op = Gemm::new(alpha, beta, trans_a, trans_b);
    match c {
        Some(c) => apply(op, &[a, b, c], Mode::Train),
        None => apply(op, &[a, b], Mode::Train),
    }
}

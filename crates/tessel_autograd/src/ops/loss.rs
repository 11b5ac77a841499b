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

/// Targets as a dense `[n, c]` distribution: passed through when already
/// shaped like `x`, expanded from class indices when 1-D.
fn dense_targets(x: &RawTensor, t: &RawTensor) -> Result<RawTensor> {
    let &[n, c] = x.shape() else {
        return Err(Error::shape(format!("loss expects [batch, classes] input, got {:?}", x.shape())));
    };
    if t.shape() == x.shape() {
        return t.to_dtype(DType::F32);
    }
    if t.shape() != [n] {
        return Err(Error::shape(format!(
            "targets must be {:?} or [{}], got {:?}",
            x.shape(),
            n,
            t.shape()
        )));
    }
    let mut dense = vec![0.0f32; n * c];
    for (row, label) in t.to_vec_i32().into_iter().enumerate() {
        let label = usize::try_from(label)
            .ok()
            .filter(|&l| l < c)
            .ok_or_else(|| Error::InvalidArgument(format!("label {} out of range for {} classes", label, c)))?;
        dense[row * c + label] = 1.0;
    }
    RawTensor::from_vec(dense, &[n, c])
}

fn batch_size(x: &RawTensor) -> f32 {
    x.dim_size(0).unwrap_or(1).max(1) as f32
}

/// Softmax over the last axis followed by cross entropy, averaged over the batch.
#[derive(Default)]
pub struct SoftMaxCrossEntropy {
    cache: Option<(RawTensor, RawTensor)>,
}

impl Operation for SoftMaxCrossEntropy {
    fn op_type(&self) -> OpType {
        OpType::SoftMaxCrossEntropy
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let xs = expect_inputs(xs, 2, "SoftMaxCrossEntropy")?;
        let (x, t) = (&xs[0], &xs[1]);
        let t = dense_targets(x, t)?;
        let p = x.softmax_forward(-1)?;
        let loss = t.mul(&p.clip(f32::MIN_POSITIVE, 1.0)?.log()?)?.sum_all()?.item()? / -batch_size(x);
        self.cache = Some((p, t));
        Ok(vec![RawTensor::from_vec(vec![loss], &[1])?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "SoftMaxCrossEntropy")?.item()?;
        let (p, t) = cached(&self.cache, "SoftMaxCrossEntropy")?;
        let dx = p.sub(t)?.mul_scalar(dy / batch_size(p))?;
        Ok(vec![Some(dx), None])
    }
}

/// Negative log likelihood of probabilities, averaged over the batch.
#[derive(Default)]
pub struct NLL {
    cache: Option<(RawTensor, RawTensor)>,
}

impl Operation for NLL {
    fn op_type(&self) -> OpType {
        OpType::NLL
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let xs = expect_inputs(xs, 2, "NLL")?;
        let (x, t) = (&xs[0], &xs[1]);
        let t = dense_targets(x, t)?;
        let loss = t.mul(&x.log()?)?.sum_all()?.item()? / -batch_size(x);
        self.cache = Some((x.clone(), t));
        Ok(vec![RawTensor::from_vec(vec![loss], &[1])?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "NLL")?.item()?;
        let (x, t) = cached(&self.cache, "NLL")?;
        let dx = t.div(x)?.mul_scalar(-dy / batch_size(x))?;
        Ok(vec![Some(dx), None])
    }
}

/// `sum((x - t)^2) / (2 N)` with `N` the element count.
#[derive(Default)]
pub struct MeanSquareError {
    err: Option<RawTensor>,
}

impl Operation for MeanSquareError {
    fn op_type(&self) -> OpType {
        OpType::MeanSquareError
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let xs = expect_inputs(xs, 2, "MeanSquareError")?;
        let (x, t) = (&xs[0], &xs[1]);
        if x.shape() != t.shape() {
            return Err(Error::IncompatibleShape(format!(
                "MeanSquareError of {:?} against {:?}",
                x.shape(),
                t.shape()
            )));
        }
        let err = x.sub(t)?;
        let n = err.size().max(1) as f32;
        let loss = err.square()?.sum_all()?.item()? / n / 2.0;
        self.err = Some(err);
        Ok(vec![RawTensor::from_vec(vec![loss], &[1])?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "MeanSquareError")?.item()?;
        let err = cached(&self.err, "MeanSquareError")?;
        let dx = err.mul_scalar(dy / err.size().max(1) as f32)?;
        let dt = dx.neg()?;
        Ok(vec![Some(dx), Some(dt)])
    }
}

pub fn softmax_cross_entropy(x: &Tensor, t: &Tensor) -> Result<Tensor> {
    apply(SoftMaxCrossEntropy::default(), &[x, t], Mode::Train)
}

pub fn nll(x: &Tensor, t: &Tensor) -> Result<Tensor> {
    apply(NLL::default(), &[x, t], Mode::Train)
}

pub fn mse_loss(x: &Tensor, t: &Tensor) -> Result<Tensor> {
    apply(MeanSquareError::default(), &[x, t], Mode::Train)
}

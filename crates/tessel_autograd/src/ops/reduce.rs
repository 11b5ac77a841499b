use super::{apply, cached, expect_grads, expect_inputs};
use crate::{
    mode::Mode,
    operation::{OpType, Operation},
    tensor::Tensor,
};
use tessel_core::error::Result;
use tessel_tensor::RawTensor;

struct ReduceCache {
    in_shape: Vec<usize>,
    kept_shape: Vec<usize>,
    count: usize,
}

fn reduce_forward(x: &RawTensor, axes: &Option<Vec<isize>>, keepdims: bool, mean: bool) -> Result<(RawTensor, ReduceCache)> {
    let axes = match axes {
        Some(a) => x.normalize_axes(a)?,
        None => (0..x.ndim()).collect(),
    };
    let kept_shape: Vec<usize> = x
        .shape()
        .iter()
        .enumerate()
        .map(|(d, &s)| if axes.contains(&d) { 1 } else { s })
        .collect();
    let count = axes.iter().map(|&a| x.shape()[a]).product();
    let y = if mean { x.mean(&axes, keepdims)? } else { x.sum(&axes, keepdims)? };
    Ok((
        y,
        ReduceCache {
            in_shape: x.shape().to_vec(),
            kept_shape,
            count,
        },
    ))
}

fn reduce_backward(dy: &RawTensor, cache: &ReduceCache, mean: bool) -> Result<RawTensor> {
    let dx = dy.reshape(&cache.kept_shape)?.broadcast_to(&cache.in_shape)?;
    if mean {
        dx.mul_scalar(1.0 / cache.count.max(1) as f32)
    } else {
        Ok(dx)
    }
}

/// Sum over `axes` (all when `None`).
pub struct ReduceSum {
    pub axes: Option<Vec<isize>>,
    pub keepdims: bool,
    cache: Option<ReduceCache>,
}

impl ReduceSum {
    pub fn new(axes: Option<Vec<isize>>, keepdims: bool) -> Self {
        Self { axes, keepdims, cache: None }
    }
}

impl Operation for ReduceSum {
    fn op_type(&self) -> OpType {
        OpType::ReduceSum
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "ReduceSum")?[0];
        let (y, cache) = reduce_forward(x, &self.axes, self.keepdims, false)?;
        self.cache = Some(cache);
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "ReduceSum")?;
        Ok(vec![Some(reduce_backward(dy, cached(&self.cache, "ReduceSum")?, false)?)])
    }
}

/// Mean over `axes` (all when `None`).
pub struct ReduceMean {
    pub axes: Option<Vec<isize>>,
    pub keepdims: bool,
    cache: Option<ReduceCache>,
}

impl ReduceMean {
    pub fn new(axes: Option<Vec<isize>>, keepdims: bool) -> Self {
        Self { axes, keepdims, cache: None }
    }
}

impl Operation for ReduceMean {
    fn op_type(&self) -> OpType {
        OpType::ReduceMean
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "ReduceMean")?[0];
        let (y, cache) = reduce_forward(x, &self.axes, self.keepdims, true)?;
        self.cache = Some(cache);
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "ReduceMean")?;
        Ok(vec![Some(reduce_backward(dy, cached(&self.cache, "ReduceMean")?, true)?)])
    }
}

pub fn reduce_sum(x: &Tensor, axes: Option<&[isize]>, keepdims: bool) -> Result<Tensor> {
    apply(ReduceSum::new(axes.map(|a| a.to_vec()), keepdims), &[x], Mode::Train)
}

pub fn reduce_mean(x: &Tensor, axes: Option<&[isize]>, keepdims: bool) -> Result<Tensor> {
    apply(ReduceMean::new(axes.map(|a| a.to_vec()), keepdims), &[x], Mode::Train)
}

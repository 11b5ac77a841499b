use super::{apply, cached, expect_grads, expect_inputs};
use crate::{
    mode::Mode,
    operation::{OpType, Operation},
    tensor::Tensor,
};
use tessel_core::error::{Error, Result};
use tessel_tensor::{
    nn::{BatchNormCache, ConvCache, PoolingCache},
    BatchNormHandle, ConvHandle, PoolingHandle, RawTensor,
};

/// Views `[n, c, l]` as `[n, c, 1, l]`; 4-D passes through.
fn as_4d(x: &RawTensor) -> Result<RawTensor> {
    match *x.shape() {
        [n, c, l] => x.reshape(&[n, c, 1, l]),
        [_, _, _, _] => Ok(x.clone()),
        _ => Err(Error::shape(format!("expected a 3-D or 4-D input, got {:?}", x.shape()))),
    }
}

/// Output of a 4-D kernel, reshaped back to 3-D when the input was 1-D.
fn restore_rank(y: RawTensor, rank: usize) -> Result<RawTensor> {
    if rank == 3 {
        if let &[n, c, _, l] = y.shape() {
            return y.reshape(&[n, c, l]);
        }
    }
    Ok(y)
}

fn has_odd_padding(odd: &[usize; 4]) -> bool {
    odd.iter().any(|&p| p != 0)
}

struct ConvState {
    cache: ConvCache,
    weight: RawTensor,
    x_shape: Vec<usize>,
    w_shape: Vec<usize>,
    has_bias: bool,
}

/// 2-D convolution over NCHW input (1-D input is treated as height 1).
/// `odd_padding` (`[top, left, bottom, right]`) is applied on top of the
/// handle's symmetric padding.
pub struct Conv2d {
    pub handle: ConvHandle,
    pub odd_padding: [usize; 4],
    state: Option<ConvState>,
}

impl Conv2d {
    pub fn new(handle: ConvHandle, odd_padding: [usize; 4]) -> Self {
        Self {
            handle,
            odd_padding,
            state: None,
        }
    }
}

impl Operation for Conv2d {
    fn op_type(&self) -> OpType {
        OpType::Conv2d
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let expected = if self.handle.bias { 3 } else { 2 };
        let xs = expect_inputs(xs, expected, "Conv2d")?;
        let (x, w) = (&xs[0], &xs[1]);

        let mut x4 = as_4d(x)?;
        if has_odd_padding(&self.odd_padding) {
            x4 = x4.pad2d(self.odd_padding)?;
        }
        let w4 = as_4d(w)?;
        let (y, cache) = x4.conv2d_forward(&self.handle, &w4, xs.get(2))?;

        self.state = Some(ConvState {
            cache,
            weight: w4,
            x_shape: x.shape().to_vec(),
            w_shape: w.shape().to_vec(),
            has_bias: self.handle.bias,
        });
        Ok(vec![restore_rank(y, x.ndim())?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Conv2d")?;
        let state = cached(&self.state, "Conv2d")?;
        let (mut dx, dw, db) = RawTensor::conv2d_backward(&state.cache, &state.weight, &as_4d(dy)?)?;
        if has_odd_padding(&self.odd_padding) {
            dx = dx.crop2d(self.odd_padding)?;
        }
        let mut dxs = vec![Some(dx.reshape(&state.x_shape)?), Some(dw.reshape(&state.w_shape)?)];
        if state.has_bias {
            dxs.push(Some(db));
        }
        Ok(dxs)
    }
}

/// Max or average pooling over NCHW input (1-D input is treated as height 1).
pub struct Pooling2d {
    pub handle: PoolingHandle,
    pub odd_padding: [usize; 4],
    state: Option<(PoolingCache, Vec<usize>)>,
}

impl Pooling2d {
    pub fn new(handle: PoolingHandle, odd_padding: [usize; 4]) -> Self {
        Self {
            handle,
            odd_padding,
            state: None,
        }
    }
}

impl Operation for Pooling2d {
    fn op_type(&self) -> OpType {
        OpType::Pooling2d
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "Pooling2d")?[0];
        let mut x4 = as_4d(x)?;
        if has_odd_padding(&self.odd_padding) {
            x4 = x4.pad2d(self.odd_padding)?;
        }
        let (y, cache) = x4.pooling2d_forward(&self.handle)?;
        self.state = Some((cache, x.shape().to_vec()));
        Ok(vec![restore_rank(y, x.ndim())?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Pooling2d")?;
        let (cache, x_shape) = cached(&self.state, "Pooling2d")?;
        let mut dx = RawTensor::pooling2d_backward(cache, &as_4d(dy)?)?;
        if has_odd_padding(&self.odd_padding) {
            dx = dx.crop2d(self.odd_padding)?;
        }
        Ok(vec![Some(dx.reshape(x_shape)?)])
    }
}

/// Mean over every axis after the channel axis, keeping them as size 1.
#[derive(Default)]
pub struct GlobalAveragePool {
    in_shape: Option<Vec<usize>>,
}

impl Operation for GlobalAveragePool {
    fn op_type(&self) -> OpType {
        OpType::GlobalAveragePool
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "GlobalAveragePool")?[0];
        if x.ndim() < 3 {
            return Err(Error::shape(format!(
                "GlobalAveragePool needs [n, c, spatial...], got {:?}",
                x.shape()
            )));
        }
        let axes: Vec<usize> = (2..x.ndim()).collect();
        self.in_shape = Some(x.shape().to_vec());
        Ok(vec![x.mean(&axes, true)?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "GlobalAveragePool")?;
        let in_shape = cached(&self.in_shape, "GlobalAveragePool")?;
        let count: usize = in_shape[2..].iter().product();
        Ok(vec![Some(dy.broadcast_to(in_shape)?.mul_scalar(1.0 / count.max(1) as f32)?)])
    }
}

/// Batch normalization. Batch statistics and running-statistics updates in
/// `Mode::Train`, running statistics in `Mode::Eval`.
pub struct BatchNorm2d {
    pub handle: BatchNormHandle,
    state: Option<(RawTensor, RawTensor, BatchNormCache)>,
}

impl BatchNorm2d {
    pub fn new(handle: BatchNormHandle) -> Self {
        Self { handle, state: None }
    }
}

impl Operation for BatchNorm2d {
    fn op_type(&self) -> OpType {
        OpType::BatchNorm2d
    }

    fn forward(&mut self, xs: &[RawTensor], mode: Mode) -> Result<Vec<RawTensor>> {
        let xs = expect_inputs(xs, 3, "BatchNorm2d")?;
        let (x, scale, bias) = (&xs[0], &xs[1], &xs[2]);
        let (y, cache) = x.batchnorm2d_forward(&self.handle, scale, bias, mode.is_training())?;
        self.state = Some((x.clone(), scale.clone(), cache));
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "BatchNorm2d")?;
        let (x, scale, cache) = cached(&self.state, "BatchNorm2d")?;
        let (dx, dscale, dbias) = x.batchnorm2d_backward(&self.handle, cache, scale, dy)?;
        Ok(vec![Some(dx), Some(dscale), Some(dbias)])
    }
}

/// Inverted dropout: survivors are scaled by `1 / (1 - ratio)` in training;
/// identity in evaluation.
pub struct Dropout {
    pub ratio: f32,
    mask: Option<RawTensor>,
}

impl Dropout {
    pub fn new(ratio: f32) -> Self {
        Self { ratio, mask: None }
    }
}

impl Operation for Dropout {
    fn op_type(&self) -> OpType {
        OpType::Dropout
    }

    fn forward(&mut self, xs: &[RawTensor], mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "Dropout")?[0];
        if !mode.is_training() || self.ratio == 0.0 {
            self.mask = None;
            return Ok(vec![x.clone()]);
        }
        let keep = 1.0 - self.ratio;
        let mask = if keep > 0.0 {
            RawTensor::bernoulli(x.shape(), keep)?.mul_scalar(1.0 / keep)?
        } else {
            RawTensor::zeros(x.shape())
        };
        let y = x.mul(&mask)?;
        self.mask = Some(mask);
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Dropout")?;
        Ok(vec![Some(match &self.mask {
            Some(mask) => dy.mul(mask)?,
            None => dy.clone(),
        })])
    }
}

// functional

pub fn conv2d(x: &Tensor, w: &Tensor, b: Option<&Tensor>, handle: &ConvHandle, odd_padding: [usize; 4], mode: Mode) -> Result<Tensor> {
    let op = Conv2d::new(handle.clone(), odd_padding);
    match b {
        Some(b) => apply(op, &[x, w, b], mode),
        None => apply(op, &[x, w], mode),
    }
}

pub fn pooling2d(x: &Tensor, handle: &PoolingHandle, odd_padding: [usize; 4], mode: Mode) -> Result<Tensor> {
    apply(Pooling2d::new(handle.clone(), odd_padding), &[x], mode)
}

pub fn global_average_pool(x: &Tensor) -> Result<Tensor> {
    apply(GlobalAveragePool::default(), &[x], Mode::Train)
}

pub fn batchnorm2d(x: &Tensor, scale: &Tensor, bias: &Tensor, handle: &BatchNormHandle, mode: Mode) -> Result<Tensor> {
    apply(BatchNorm2d::new(handle.clone()), &[x, scale, bias], mode)
}

pub fn dropout(x: &Tensor, ratio: f32, mode: Mode) -> Result<Tensor> {
    apply(Dropout::new(ratio), &[x], mode)
}

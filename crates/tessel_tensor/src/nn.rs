//! Native handles and numeric entry points for convolution, pooling,
//! batch normalization and softmax.

use crate::RawTensor;
use std::sync::{Arc, RwLock};
use tessel_core::{
    error::{Error, Result},
    layout::Layout,
};
use tessel_cpu::nn::{
    batchnorm,
    conv::{self, Conv2dDims},
    pooling::{self, Pool2dDims},
    softmax,
};

/// Convolution geometry fixed at construction. Padding is symmetric; odd
/// leftovers are applied by the caller before the kernel runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvHandle {
    pub kernel: [usize; 2],
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub in_channels: usize,
    pub out_channels: usize,
    pub bias: bool,
    pub group: usize,
}

impl ConvHandle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x: &RawTensor,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: [usize; 2],
        in_channels: usize,
        out_channels: usize,
        bias: bool,
        group: usize,
    ) -> Result<Self> {
        if group != 1 && !x.device().is_accelerated() {
            return Err(Error::NotSupported(format!(
                "grouped convolution (group={}) on {}",
                group,
                x.device().name()
            )));
        }
        if kernel.contains(&0) || stride.contains(&0) {
            return Err(Error::InvalidArgument(format!(
                "kernel {:?} and stride {:?} must be positive",
                kernel, stride
            )));
        }
        Ok(Self {
            kernel,
            stride,
            padding,
            in_channels,
            out_channels,
            bias,
            group,
        })
    }

    fn dims(&self, x: &RawTensor) -> Result<Conv2dDims> {
        let [n, c, h, w] = x.nchw()?;
        if c != self.in_channels {
            return Err(Error::shape(format!(
                "conv expects {} input channels, got {}",
                self.in_channels, c
            )));
        }
        if h + 2 * self.padding[0] < self.kernel[0] || w + 2 * self.padding[1] < self.kernel[1] {
            return Err(Error::shape(format!(
                "kernel {:?} larger than padded input {:?}",
                self.kernel,
                x.shape()
            )));
        }
        Ok(Conv2dDims {
            batch_size: n,
            in_channels: c,
            height: h,
            width: w,
            out_channels: self.out_channels,
            kernel_h: self.kernel[0],
            kernel_w: self.kernel[1],
            pad_h: self.padding[0],
            pad_w: self.padding[1],
            stride_h: self.stride[0],
            stride_w: self.stride[1],
        })
    }
}

/// Columns saved by the forward convolution.
#[derive(Debug, Clone)]
pub struct ConvCache {
    col: Vec<f32>,
    dims: Conv2dDims,
}

impl RawTensor {
    pub fn conv2d_forward(&self, handle: &ConvHandle, weight: &RawTensor, bias: Option<&RawTensor>) -> Result<(RawTensor, ConvCache)> {
        let dims = handle.dims(self)?;
        let expected = [handle.out_channels, handle.in_channels, handle.kernel[0], handle.kernel[1]];
        if weight.shape() != expected {
            return Err(Error::shape(format!(
                "conv weight must be {:?}, got {:?}",
                expected,
                weight.shape()
            )));
        }
        let bias_values = bias.map(|b| b.values().into_owned());
        if let Some(b) = &bias_values {
            if b.len() != handle.out_channels {
                return Err(Error::shape(format!(
                    "conv bias must have {} elements, got {}",
                    handle.out_channels,
                    b.len()
                )));
            }
        }

        let shape = [dims.batch_size, dims.out_channels, dims.out_h(), dims.out_w()];
        let mut output = vec![0.0f32; shape.iter().product()];
        let col = conv::conv2d_forward_f32(&dims, &self.values(), &weight.values(), bias_values.as_deref(), &mut output);
        Ok((Self::from_f32(output, &shape)?, ConvCache { col, dims }))
    }

    /// Returns `(dx, dw, db)`.
    pub fn conv2d_backward(cache: &ConvCache, weight: &RawTensor, grad_output: &RawTensor) -> Result<(RawTensor, RawTensor, RawTensor)> {
        let d = &cache.dims;
        let (dx, dw, db) = conv::conv2d_backward_f32(d, &cache.col, &weight.values(), &grad_output.values());
        Ok((
            Self::from_f32(dx, &[d.batch_size, d.in_channels, d.height, d.width])?,
            Self::from_f32(dw, weight.shape())?,
            Self::from_f32(db, &[d.out_channels])?,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolingHandle {
    pub kernel: [usize; 2],
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub is_max: bool,
}

impl PoolingHandle {
    pub fn new(kernel: [usize; 2], stride: [usize; 2], padding: [usize; 2], is_max: bool) -> Result<Self> {
        if kernel.contains(&0) || stride.contains(&0) {
            return Err(Error::InvalidArgument(format!(
                "kernel {:?} and stride {:?} must be positive",
                kernel, stride
            )));
        }
        Ok(Self {
            kernel,
            stride,
            padding,
            is_max,
        })
    }

    fn dims(&self, x: &RawTensor) -> Result<Pool2dDims> {
        let [n, c, h, w] = x.nchw()?;
        if h + 2 * self.padding[0] < self.kernel[0] || w + 2 * self.padding[1] < self.kernel[1] {
            return Err(Error::shape(format!(
                "kernel {:?} larger than padded input {:?}",
                self.kernel,
                x.shape()
            )));
        }
        Ok(Pool2dDims {
            batch_size: n,
            channels: c,
            height: h,
            width: w,
            kernel_h: self.kernel[0],
            kernel_w: self.kernel[1],
            pad_h: self.padding[0],
            pad_w: self.padding[1],
            stride_h: self.stride[0],
            stride_w: self.stride[1],
        })
    }
}

#[derive(Debug, Clone)]
pub struct PoolingCache {
    argmax: Option<Vec<usize>>,
    dims: Pool2dDims,
}

impl RawTensor {
    pub fn pooling2d_forward(&self, handle: &PoolingHandle) -> Result<(RawTensor, PoolingCache)> {
        let dims = handle.dims(self)?;
        let shape = [dims.batch_size, dims.channels, dims.out_h(), dims.out_w()];
        let size = shape.iter().product();
        let mut output = vec![0.0f32; size];
        let argmax = if handle.is_max {
            let mut argmax = vec![0usize; size];
            pooling::max_pool2d_forward_f32(&dims, &self.values(), &mut output, &mut argmax);
            Some(argmax)
        } else {
            pooling::avg_pool2d_forward_f32(&dims, &self.values(), &mut output);
            None
        };
        Ok((Self::from_f32(output, &shape)?, PoolingCache { argmax, dims }))
    }

    pub fn pooling2d_backward(cache: &PoolingCache, grad_output: &RawTensor) -> Result<RawTensor> {
        let d = &cache.dims;
        let mut dx = vec![0.0f32; d.batch_size * d.channels * d.height * d.width];
        match &cache.argmax {
            Some(argmax) => pooling::max_pool2d_backward_f32(d, argmax, &grad_output.values(), &mut dx),
            None => pooling::avg_pool2d_backward_f32(d, &grad_output.values(), &mut dx),
        }
        Self::from_f32(dx, &[d.batch_size, d.channels, d.height, d.width])
    }
}

/// Batch-norm hyper-parameters plus running statistics shared by every
/// clone of the handle.
#[derive(Debug, Clone)]
pub struct BatchNormHandle {
    pub momentum: f32,
    pub epsilon: f32,
    running_mean: Arc<RwLock<RawTensor>>,
    running_var: Arc<RwLock<RawTensor>>,
}

/// Statistics used by a forward pass, needed again for backward.
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    mean: Vec<f32>,
    var: Vec<f32>,
    batch_stats: bool,
}

impl BatchNormHandle {
    pub fn new(momentum: f32, epsilon: f32, running_mean: RawTensor, running_var: RawTensor) -> Result<Self> {
        if running_mean.shape() != running_var.shape() || running_mean.ndim() != 1 {
            return Err(Error::shape(format!(
                "running statistics must be matching 1-D tensors, got {:?} and {:?}",
                running_mean.shape(),
                running_var.shape()
            )));
        }
        Ok(Self {
            momentum,
            epsilon,
            running_mean: Arc::new(RwLock::new(running_mean)),
            running_var: Arc::new(RwLock::new(running_var)),
        })
    }

    pub fn running_mean(&self) -> Result<RawTensor> {
        self.running_mean
            .read()
            .map(|t| t.clone())
            .map_err(|_| Error::internal("running mean lock poisoned"))
    }

    pub fn running_var(&self) -> Result<RawTensor> {
        self.running_var
            .read()
            .map(|t| t.clone())
            .map_err(|_| Error::internal("running variance lock poisoned"))
    }

    fn channels(&self) -> Result<usize> {
        Ok(self.running_mean()?.size())
    }

    /// `running = running * momentum + batch * (1 - momentum)`.
    fn update_running(&self, mean: &[f32], var: &[f32]) -> Result<()> {
        let m = self.momentum;
        for (lock, batch) in [(&self.running_mean, mean), (&self.running_var, var)] {
            let mut guard = lock.write().map_err(|_| Error::internal("running statistics lock poisoned"))?;
            let updated: Vec<f32> = guard
                .values()
                .iter()
                .zip(batch)
                .map(|(&r, &b)| r * m + b * (1.0 - m))
                .collect();
            *guard = RawTensor::from_f32(updated, guard.shape())?;
        }
        Ok(())
    }
}

impl RawTensor {
    /// Batch statistics are used (and running ones updated) when `training`.
    pub fn batchnorm2d_forward(
        &self,
        handle: &BatchNormHandle,
        scale: &RawTensor,
        bias: &RawTensor,
        training: bool,
    ) -> Result<(RawTensor, BatchNormCache)> {
        let (n, c, spatial) = self.channel_extents()?;
        if c != handle.channels()? || scale.size() != c || bias.size() != c {
            return Err(Error::shape(format!(
                "batch norm over {} channels got input {:?}, scale {:?}, bias {:?}",
                handle.channels()?,
                self.shape(),
                scale.shape(),
                bias.shape()
            )));
        }
        let x = self.values();
        let (mean, var) = if training {
            let (mean, var) = batchnorm::channel_stats_f32(&x, n, c, spatial);
            handle.update_running(&mean, &var)?;
            (mean, var)
        } else {
            (handle.running_mean()?.to_vec_f32(), handle.running_var()?.to_vec_f32())
        };
        let mut output = vec![0.0f32; x.len()];
        batchnorm::batchnorm_forward_f32(&x, n, c, spatial, &scale.values(), &bias.values(), &mean, &var, handle.epsilon, &mut output);
        Ok((
            Self::from_f32(output, self.shape())?,
            BatchNormCache {
                mean,
                var,
                batch_stats: training,
            },
        ))
    }

    /// Returns `(dx, dscale, dbias)`.
    pub fn batchnorm2d_backward(
        &self,
        handle: &BatchNormHandle,
        cache: &BatchNormCache,
        scale: &RawTensor,
        grad_output: &RawTensor,
    ) -> Result<(RawTensor, RawTensor, RawTensor)> {
        let (n, c, spatial) = self.channel_extents()?;
        let (dx, dscale, dbias) = batchnorm::batchnorm_backward_f32(
            &self.values(),
            &grad_output.values(),
            n,
            c,
            spatial,
            &scale.values(),
            &cache.mean,
            &cache.var,
            handle.epsilon,
            cache.batch_stats,
        );
        Ok((
            Self::from_f32(dx, self.shape())?,
            Self::from_f32(dscale, scale.shape())?,
            Self::from_f32(dbias, scale.shape())?,
        ))
    }

    fn channel_extents(&self) -> Result<(usize, usize, usize)> {
        if self.ndim() < 2 {
            return Err(Error::shape(format!("batch norm needs [n, c, ...], got {:?}", self.shape())));
        }
        let spatial = self.shape()[2..].iter().product();
        Ok((self.shape()[0], self.shape()[1], spatial))
    }

    pub fn softmax_forward(&self, axis: isize) -> Result<RawTensor> {
        let axis = Layout::normalize_axis(axis, self.ndim())?;
        let mut output = vec![0.0f32; self.size()];
        softmax::softmax_forward_f32(&self.values(), self.shape(), axis, &mut output);
        Self::from_f32(output, self.shape())
    }

    /// `self` is the forward output.
    pub fn softmax_backward(&self, grad_output: &RawTensor, axis: isize) -> Result<RawTensor> {
        let axis = Layout::normalize_axis(axis, self.ndim())?;
        let mut grad_input = vec![0.0f32; self.size()];
        softmax::softmax_backward_f32(&self.values(), &grad_output.values(), self.shape(), axis, &mut grad_input);
        Self::from_f32(grad_input, self.shape())
    }
}

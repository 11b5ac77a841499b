use crate::RawTensor;
use std::borrow::Cow;
use tessel_core::{
    buffer::cpu::CpuBuffer,
    error::{Error, Result},
    layout::Layout,
};
use tessel_cpu::ops::{binary as kernels, reduction, transform};

macro_rules! arithmetic_ops {
    ($($name:ident => $kernel:ident),* $(,)?) => {
        impl RawTensor {
            $(
                pub fn $name(&self, rhs: &RawTensor) -> Result<RawTensor> {
                    let (shape, lhs, rhs) = broadcast_pair(self, rhs)?;
                    let mut output = vec![0.0f32; lhs.len()];
                    kernels::$kernel(&lhs, &rhs, &mut output);
                    Self::from_f32(output, &shape)
                }
            )*
        }
    };
}

macro_rules! comparison_ops {
    ($($name:ident => $kernel:ident),* $(,)?) => {
        impl RawTensor {
            $(
                pub fn $name(&self, rhs: &RawTensor) -> Result<RawTensor> {
                    let (shape, lhs, rhs) = broadcast_pair(self, rhs)?;
                    let mut output = vec![false; lhs.len()];
                    kernels::$kernel(&lhs, &rhs, &mut output);
                    Self::from_parts(CpuBuffer::BOOL(output), &shape)
                }
            )*
        }
    };
}

macro_rules! logical_ops {
    ($($name:ident => $kernel:ident),* $(,)?) => {
        impl RawTensor {
            $(
                pub fn $name(&self, rhs: &RawTensor) -> Result<RawTensor> {
                    let shape = Layout::broadcast_shape(self.shape(), rhs.shape())?;
                    let lhs = self.broadcast_to(&shape)?;
                    let rhs = rhs.broadcast_to(&shape)?;
                    let (lhs, rhs) = (lhs.bools(), rhs.bools());
                    let mut output = vec![false; lhs.len()];
                    kernels::$kernel(&lhs, &rhs, &mut output);
                    Self::from_parts(CpuBuffer::BOOL(output), &shape)
                }
            )*
        }
    };
}

arithmetic_ops!(
    add => add_f32,
    sub => sub_f32,
    mul => mul_f32,
    div => div_f32,
    pow => pow_f32,
    maximum => maximum_f32,
    minimum => minimum_f32,
);

comparison_ops!(
    equal => eq_f32,
    less => lt_f32,
    greater => gt_f32,
);

logical_ops!(
    logical_and => logical_and_bool,
    logical_or => logical_or_bool,
    logical_xor => logical_xor_bool,
);

fn broadcast_pair<'a>(lhs: &'a RawTensor, rhs: &'a RawTensor) -> Result<(Vec<usize>, Cow<'a, [f32]>, Cow<'a, [f32]>)> {
    let shape = Layout::broadcast_shape(lhs.shape(), rhs.shape())?;
    Ok((shape.clone(), expand_values(lhs, &shape), expand_values(rhs, &shape)))
}

fn expand_values<'a>(tensor: &'a RawTensor, shape: &[usize]) -> Cow<'a, [f32]> {
    if tensor.shape() == shape {
        return tensor.values();
    }
    let size: usize = shape.iter().product();
    let mut output = vec![0.0f32; size];
    transform::broadcast(&tensor.values(), tensor.shape(), shape, &mut output);
    Cow::Owned(output)
}

impl RawTensor {
    /// Expands size-1 and missing leading axes to `shape`, keeping the dtype.
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<RawTensor> {
        if self.shape() == shape {
            return Ok(self.clone());
        }
        if !Layout::can_broadcast_to(self.shape(), shape) {
            return Err(Error::IncompatibleShape(format!(
                "Cannot broadcast {:?} to {:?}",
                self.shape(),
                shape
            )));
        }
        let size: usize = shape.iter().product();
        let buffer = match self.buffer().as_cpu() {
            CpuBuffer::F32(v) => {
                let mut out = vec![0.0f32; size];
                transform::broadcast(v, self.shape(), shape, &mut out);
                CpuBuffer::F32(out)
            }
            CpuBuffer::I32(v) => {
                let mut out = vec![0i32; size];
                transform::broadcast(v, self.shape(), shape, &mut out);
                CpuBuffer::I32(out)
            }
            CpuBuffer::BOOL(v) => {
                let mut out = vec![false; size];
                transform::broadcast(v, self.shape(), shape, &mut out);
                CpuBuffer::BOOL(out)
            }
        };
        Self::from_parts(buffer, shape)
    }

    /// Sums a broadcast gradient back down to `shape`.
    pub fn reduce_to_shape(&self, shape: &[usize]) -> Result<RawTensor> {
        if self.shape() == shape {
            return Ok(self.clone());
        }
        if !Layout::can_broadcast_to(shape, self.shape()) {
            return Err(Error::IncompatibleShape(format!(
                "Cannot reduce {:?} to {:?}",
                self.shape(),
                shape
            )));
        }
        let rank_diff = self.ndim() - shape.len();
        let reduce: Vec<bool> = self
            .shape()
            .iter()
            .enumerate()
            .map(|(d, &size)| d < rank_diff || (shape[d - rank_diff] == 1 && size != 1))
            .collect();
        let mut output = vec![0.0f32; shape.iter().product()];
        reduction::sum_f32(&self.values(), self.shape(), &reduce, &mut output);
        Self::from_f32(output, shape)
    }
}

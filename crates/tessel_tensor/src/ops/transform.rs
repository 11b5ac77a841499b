use crate::RawTensor;
use std::sync::Arc;
use tessel_core::{
    buffer::cpu::CpuBuffer,
    error::{Error, Result},
    layout::Layout,
};
use tessel_cpu::ops::transform;

macro_rules! per_dtype {
    ($buffer:expr, $v:ident => $body:expr) => {
        match $buffer {
            CpuBuffer::F32($v) => CpuBuffer::F32($body),
            CpuBuffer::I32($v) => CpuBuffer::I32($body),
            CpuBuffer::BOOL($v) => CpuBuffer::BOOL($body),
        }
    };
}

impl RawTensor {
    /// Same storage under a new shape.
    pub fn reshape(&self, shape: &[usize]) -> Result<RawTensor> {
        let mut layout = self.layout.clone();
        layout.view(shape)?;
        Ok(Self {
            buffer: Arc::clone(&self.buffer),
            layout,
        })
    }

    /// Collapses to 2-D: axes before `axis` form rows, the rest columns.
    pub fn flatten(&self, axis: usize) -> Result<RawTensor> {
        if axis > self.ndim() {
            return Err(Error::DimensionOutOfBounds {
                dim: axis as isize,
                ndim: self.ndim(),
            });
        }
        let rows: usize = self.shape()[..axis].iter().product();
        let cols: usize = self.shape()[axis..].iter().product();
        self.reshape(&[rows, cols])
    }

    pub fn transpose(&self, perm: &[usize]) -> Result<RawTensor> {
        let ndim = self.ndim();
        let mut seen = vec![false; ndim];
        if perm.len() != ndim || perm.iter().any(|&p| p >= ndim || std::mem::replace(&mut seen[p], true)) {
            return Err(Error::InvalidArgument(format!(
                "{:?} is not a permutation of {} axes",
                perm, ndim
            )));
        }
        let shape: Vec<usize> = perm.iter().map(|&p| self.shape()[p]).collect();
        let size = self.size();
        let buffer = per_dtype!(self.buffer().as_cpu(), v => {
            let mut out = vec![Default::default(); size];
            transform::transpose(v, self.shape(), perm, &mut out);
            out
        });
        Self::from_parts(buffer, &shape)
    }

    /// Joins tensors of equal rank along `axis`; other extents must agree.
    pub fn concat(tensors: &[&RawTensor], axis: usize) -> Result<RawTensor> {
        let first = tensors
            .first()
            .ok_or_else(|| Error::InvalidArgument("concat of an empty list".to_string()))?;
        if axis >= first.ndim() {
            return Err(Error::DimensionOutOfBounds {
                dim: axis as isize,
                ndim: first.ndim(),
            });
        }
        for t in tensors {
            let compatible = t.ndim() == first.ndim()
                && t.shape().iter().zip(first.shape()).enumerate().all(|(d, (a, b))| d == axis || a == b);
            if !compatible {
                return Err(Error::IncompatibleShape(format!(
                    "Cannot concat {:?} with {:?} along axis {}",
                    first.shape(),
                    t.shape(),
                    axis
                )));
            }
        }
        let mut shape = first.shape().to_vec();
        shape[axis] = tensors.iter().map(|t| t.shape()[axis]).sum();

        let values: Vec<Vec<f32>> = tensors.iter().map(|t| t.values().into_owned()).collect();
        let parts: Vec<(&[f32], &[usize])> = values.iter().zip(tensors).map(|(v, t)| (v.as_slice(), t.shape())).collect();
        let mut output = vec![0.0f32; shape.iter().product()];
        transform::concat(&parts, axis, &mut output);
        Self::from_f32(output, &shape)?.to_dtype(first.dtype())
    }

    /// `len` entries starting at `start` along `axis`.
    pub fn slice_axis(&self, axis: usize, start: usize, len: usize) -> Result<RawTensor> {
        let dim = self
            .dim_size(axis)
            .ok_or(Error::DimensionOutOfBounds {
                dim: axis as isize,
                ndim: self.ndim(),
            })?;
        if start + len > dim {
            return Err(Error::shape(format!(
                "slice [{}, {}) exceeds axis {} of size {}",
                start,
                start + len,
                axis,
                dim
            )));
        }
        let mut shape = self.shape().to_vec();
        shape[axis] = len;
        let mut output = vec![0.0f32; shape.iter().product()];
        transform::slice_axis(&self.values(), self.shape(), axis, start, len, &mut output);
        Self::from_f32(output, &shape)
    }

    /// Zero-pads the spatial axes of an NCHW tensor. `pads` is `[top, left, bottom, right]`.
    pub fn pad2d(&self, pads: [usize; 4]) -> Result<RawTensor> {
        let dims = self.nchw()?;
        let shape = [dims[0], dims[1], dims[2] + pads[0] + pads[2], dims[3] + pads[1] + pads[3]];
        let mut output = vec![0.0f32; shape.iter().product()];
        transform::pad2d_f32(&self.values(), dims, pads, &mut output);
        Self::from_f32(output, &shape)
    }

    /// Removes `pads` from the spatial axes of an NCHW tensor.
    pub fn crop2d(&self, pads: [usize; 4]) -> Result<RawTensor> {
        let dims = self.nchw()?;
        if pads[0] + pads[2] > dims[2] || pads[1] + pads[3] > dims[3] {
            return Err(Error::shape(format!("cannot crop {:?} from {:?}", pads, self.shape())));
        }
        let shape = [dims[0], dims[1], dims[2] - pads[0] - pads[2], dims[3] - pads[1] - pads[3]];
        let mut output = vec![0.0f32; shape.iter().product()];
        transform::crop2d_f32(&self.values(), dims, pads, &mut output);
        Self::from_f32(output, &shape)
    }

    pub(crate) fn nchw(&self) -> Result<[usize; 4]> {
        match *self.shape() {
            [n, c, h, w] => Ok([n, c, h, w]),
            _ => Err(Error::shape(format!("expected an NCHW tensor, got {:?}", self.shape()))),
        }
    }

    /// Resolves a target shape with `0` (copy input extent) and one `-1` (infer).
    pub fn resolve_shape(&self, target: &[i64]) -> Result<Vec<usize>> {
        let mut shape = Vec::with_capacity(target.len());
        let mut infer = None;
        for (i, &d) in target.iter().enumerate() {
            match d {
                0 => shape.push(self.dim_size(i).ok_or_else(|| Error::shape(format!("0 at axis {} has no input extent", i)))?),
                -1 if infer.is_none() => {
                    infer = Some(i);
                    shape.push(1);
                }
                d if d > 0 => shape.push(d as usize),
                _ => return Err(Error::shape(format!("invalid target shape {:?}", target))),
            }
        }
        if let Some(i) = infer {
            let known: usize = shape.iter().product();
            if known == 0 || self.size() % known != 0 {
                return Err(Error::shape(format!("cannot infer {:?} from {} elements", target, self.size())));
            }
            shape[i] = self.size() / known;
        }
        if Layout::from_shape(&shape).size() != self.size() {
            return Err(Error::IncompatibleShape(format!(
                "Cannot reshape {:?} to {:?}",
                self.shape(),
                target
            )));
        }
        Ok(shape)
    }
}

use crate::RawTensor;
use tessel_core::{
    error::{Error, Result},
    layout::Layout,
};
use tessel_cpu::ops::reduction::sum_f32;

impl RawTensor {
    /// Sums over `axes` (all axes when empty).
    pub fn sum(&self, axes: &[usize], keepdims: bool) -> Result<RawTensor> {
        let reduce = self.reduce_mask(axes)?;
        let kept: Vec<usize> = self
            .shape()
            .iter()
            .zip(&reduce)
            .map(|(&d, &r)| if r { 1 } else { d })
            .collect();
        let mut output = vec![0.0f32; kept.iter().product()];
        sum_f32(&self.values(), self.shape(), &reduce, &mut output);

        let shape: Vec<usize> = if keepdims {
            kept
        } else {
            self.shape()
                .iter()
                .zip(&reduce)
                .filter(|&(_, &r)| !r)
                .map(|(&d, _)| d)
                .collect()
        };
        Self::from_f32(output, &shape)
    }

    pub fn mean(&self, axes: &[usize], keepdims: bool) -> Result<RawTensor> {
        let reduce = self.reduce_mask(axes)?;
        let count: usize = self
            .shape()
            .iter()
            .zip(&reduce)
            .filter(|&(_, &r)| r)
            .map(|(&d, _)| d)
            .product();
        self.sum(axes, keepdims)?.mul_scalar(1.0 / count.max(1) as f32)
    }

    /// Sum of every element as a 0-d tensor.
    pub fn sum_all(&self) -> Result<RawTensor> {
        Self::from_f32(vec![self.values().iter().sum()], &[])
    }

    /// Resolves possibly negative axes into sorted, unique positive ones.
    pub fn normalize_axes(&self, axes: &[isize]) -> Result<Vec<usize>> {
        let mut out = axes
            .iter()
            .map(|&a| Layout::normalize_axis(a, self.ndim()))
            .collect::<Result<Vec<_>>>()?;
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    fn reduce_mask(&self, axes: &[usize]) -> Result<Vec<bool>> {
        let ndim = self.ndim();
        let mut reduce = vec![axes.is_empty(); ndim];
        for &axis in axes {
            if axis >= ndim {
                return Err(Error::DimensionOutOfBounds {
                    dim: axis as isize,
                    ndim,
                });
            }
            reduce[axis] = true;
        }
        Ok(reduce)
    }
}

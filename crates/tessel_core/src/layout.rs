use crate::error::{Error, Result};

/// Shape bookkeeping for a contiguous row-major buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl Layout {
    pub fn from_shape(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            strides: Self::compute_strides(shape),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
    pub fn dim_size(&self, dim: usize) -> Option<usize> {
        self.shape.get(dim).copied()
    }
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn view(&mut self, new_shape: &[usize]) -> Result<()> {
        let old_size = self.size();
        let new_size: usize = new_shape.iter().product();

        if old_size != new_size {
            return Err(Error::IncompatibleShape(format!(
                "Cannot reshape layout of size {} to size {}",
                old_size, new_size
            )));
        }

        self.shape = new_shape.to_vec();
        self.strides = Self::compute_strides(new_shape);

        Ok(())
    }

    // helper

    pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
        if shape.is_empty() {
            return vec![];
        }

        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len() - 1).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    /// Numpy-style broadcast of two shapes.
    pub fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
        let ndim = lhs.len().max(rhs.len());
        let mut shape = vec![0; ndim];
        for i in 0..ndim {
            let l = if i < lhs.len() { lhs[lhs.len() - 1 - i] } else { 1 };
            let r = if i < rhs.len() { rhs[rhs.len() - 1 - i] } else { 1 };
            if l != r && l != 1 && r != 1 {
                return Err(Error::IncompatibleShape(format!(
                    "Cannot broadcast shapes {:?} and {:?}",
                    lhs, rhs
                )));
            }
            shape[ndim - 1 - i] = l.max(r);
        }
        Ok(shape)
    }

    pub fn can_broadcast_to(shape: &[usize], target: &[usize]) -> bool {
        if shape.len() > target.len() {
            return false;
        }
        let rank_diff = target.len() - shape.len();
        shape
            .iter()
            .zip(&target[rank_diff..])
            .all(|(&a, &b)| a == b || a == 1)
    }

    /// Resolves a possibly negative axis against `ndim`.
    pub fn normalize_axis(axis: isize, ndim: usize) -> Result<usize> {
        let resolved = if axis < 0 { axis + ndim as isize } else { axis };
        if resolved < 0 || resolved as usize >= ndim {
            return Err(Error::DimensionOutOfBounds { dim: axis, ndim });
        }
        Ok(resolved as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_are_row_major() {
        assert_eq!(Layout::compute_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert!(Layout::compute_strides(&[]).is_empty());
    }

    #[test]
    fn broadcast_pads_on_the_left() -> Result<()> {
        assert_eq!(Layout::broadcast_shape(&[2, 3], &[3])?, vec![2, 3]);
        assert_eq!(Layout::broadcast_shape(&[4, 1, 3], &[2, 1])?, vec![4, 2, 3]);
        assert!(Layout::broadcast_shape(&[2, 3], &[4]).is_err());
        Ok(())
    }

    #[test]
    fn negative_axes_wrap() -> Result<()> {
        assert_eq!(Layout::normalize_axis(-1, 4)?, 3);
        assert!(Layout::normalize_axis(4, 4).is_err());
        Ok(())
    }
}

use crate::RawTensor;
use tessel_core::error::{Error, Result};
use tessel_cpu::ops::{matmul::matmul_f32, transform};

impl RawTensor {
    /// `[m, k] x [k, n] -> [m, n]`.
    pub fn matmul(&self, rhs: &RawTensor) -> Result<RawTensor> {
        let (&[m, k], &[k2, n]) = (self.shape(), rhs.shape()) else {
            return Err(Error::shape(format!(
                "matmul expects 2-D operands, got {:?} and {:?}",
                self.shape(),
                rhs.shape()
            )));
        };
        if k != k2 {
            return Err(Error::shape(format!(
                "matmul inner dimensions differ: {:?} x {:?}",
                self.shape(),
                rhs.shape()
            )));
        }
        let mut output = vec![0.0f32; m * n];
        matmul_f32(&self.values(), &rhs.values(), m, k, n, &mut output);
        Self::from_f32(output, &[m, n])
    }

    /// Transpose of a 2-D tensor.
    pub fn t(&self) -> Result<RawTensor> {
        let &[rows, cols] = self.shape() else {
            return Err(Error::shape(format!("t() expects a 2-D tensor, got {:?}", self.shape())));
        };
        let mut output = vec![0.0f32; rows * cols];
        transform::transpose(&self.values(), &[rows, cols], &[1, 0], &mut output);
        Self::from_f32(output, &[cols, rows])
    }
}

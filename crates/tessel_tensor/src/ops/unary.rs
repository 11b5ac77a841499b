use crate::RawTensor;
use tessel_core::{buffer::cpu::CpuBuffer, error::Result};
use tessel_cpu::ops::unary as kernels;

macro_rules! unary_ops {
    ($($name:ident),* $(,)?) => {
        paste::paste! {
            impl RawTensor {
                $(
                    pub fn $name(&self) -> Result<RawTensor> {
                        let input = self.values();
                        let mut output = vec![0.0f32; input.len()];
                        kernels::[<$name _f32>](&input, &mut output);
                        Self::from_f32(output, self.shape())
                    }
                )*
            }
        }
    };
}

macro_rules! unary_ops_with_constant {
    ($($name:ident),* $(,)?) => {
        paste::paste! {
            impl RawTensor {
                $(
                    pub fn $name(&self, constant: f32) -> Result<RawTensor> {
                        let input = self.values();
                        let mut output = vec![0.0f32; input.len()];
                        kernels::[<$name _f32>](&input, constant, &mut output);
                        Self::from_f32(output, self.shape())
                    }
                )*
            }
        }
    };
}

unary_ops!(
    neg, abs, sign, sqrt, exp, log, relu, sigmoid, tanh, cos, cosh, sin, sinh, tan, acos, acosh, asin, asinh, atan, atanh,
    recip, softplus, softsign, square,
);

unary_ops_with_constant!(add_scalar, mul_scalar, pow_scalar, leaky_relu, elu);

impl RawTensor {
    pub fn clip(&self, min: f32, max: f32) -> Result<RawTensor> {
        let input = self.values();
        let mut output = vec![0.0f32; input.len()];
        kernels::clip_f32(&input, min, max, &mut output);
        Self::from_f32(output, self.shape())
    }

    /// `1.0` where the element exceeds `threshold`.
    pub fn gt_mask(&self, threshold: f32) -> Result<RawTensor> {
        let input = self.values();
        let mut output = vec![0.0f32; input.len()];
        kernels::gt_scalar_mask_f32(&input, threshold, &mut output);
        Self::from_f32(output, self.shape())
    }

    /// `1.0` where `min <= x <= max`.
    pub fn in_range_mask(&self, min: f32, max: f32) -> Result<RawTensor> {
        let data = self
            .values()
            .iter()
            .map(|&x| if x >= min && x <= max { 1.0 } else { 0.0 })
            .collect();
        Self::from_f32(data, self.shape())
    }

    pub fn logical_not(&self) -> Result<RawTensor> {
        let input = self.bools();
        let mut output = vec![false; input.len()];
        kernels::not_bool(&input, &mut output);
        Self::from_parts(CpuBuffer::BOOL(output), self.shape())
    }

    /// Elementwise map with an arbitrary function.
    pub fn map(&self, func: impl Fn(f32) -> f32 + Sync + Send) -> Result<RawTensor> {
        let input = self.values();
        let mut output = vec![0.0f32; input.len()];
        kernels::map_f32(&input, &mut output, func);
        Self::from_f32(output, self.shape())
    }
}

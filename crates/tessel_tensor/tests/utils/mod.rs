#![allow(dead_code)]

use tessel_core::{
    device::{set_default_device, Device},
    dtype::{set_default_dtype, DType},
    error::Result,
};
use tessel_tensor::RawTensor;

// Helper functions
pub fn setup_device() {
    set_default_device(Device::CPU);
    set_default_dtype(DType::F32);
}

pub fn setup_tensor(data: Vec<f32>, shape: &[usize]) -> Result<RawTensor> {
    setup_device();
    RawTensor::from_vec(data, shape)
}

pub fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch: {:?} vs {:?}", actual, expected);
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tol, "index {}: {} vs {} (tol {})", i, a, e, tol);
    }
}

#![allow(dead_code)]

use tessel_autograd::{
    ops::{mul, reduce_sum},
    Tensor,
};
use tessel_core::{
    device::{set_default_device, Device},
    dtype::{set_default_dtype, DType},
    error::{Error, Result},
};
use tessel_tensor::RawTensor;

// Helper functions
pub fn setup_device() {
    set_default_device(Device::CPU);
    set_default_dtype(DType::F32);
}

pub fn setup_tensor(data: Vec<f32>, shape: &[usize]) -> Result<Tensor> {
    setup_device();
    Tensor::from_vec(data, shape)
}

pub fn setup_grad_tensor(data: Vec<f32>, shape: &[usize]) -> Result<Tensor> {
    setup_device();
    Ok(Tensor::parameter(RawTensor::from_vec(data, shape)?))
}

/// Deterministic, non-uniform values.
pub fn wave(len: usize, phase: f32) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.73 + phase).sin()).collect()
}

/// `sum(y * w)` for fixed, non-uniform `w`, so every output element gets a
/// distinct upstream gradient.
pub fn weighted_sum(y: &Tensor) -> Result<Tensor> {
    let w = Tensor::from_vec(wave(y.size(), 0.3), y.shape())?;
    reduce_sum(&mul(y, &w)?, None, false)
}

pub fn analytic_gradient<F>(f: F, inputs: &[RawTensor], which: usize) -> Result<Vec<f32>>
where
    F: Fn(&[Tensor]) -> Result<Tensor>,
{
    let tensors: Vec<Tensor> = inputs.iter().map(|r| Tensor::parameter(r.clone())).collect();
    let y = weighted_sum(&f(&tensors)?)?;
    let grads = y.backward()?;
    grads
        .get(&tensors[which].id())
        .map(|g| g.to_vec_f32())
        .ok_or_else(|| Error::Runtime(format!("no gradient for input {}", which)))
}

pub fn numeric_gradient<F>(f: F, inputs: &[RawTensor], which: usize, eps: f32) -> Result<Vec<f32>>
where
    F: Fn(&[Tensor]) -> Result<Tensor>,
{
    let base = inputs[which].to_vec_f32();
    let eval = |i: usize, delta: f32| -> Result<f32> {
        let mut values = base.clone();
        values[i] += delta;
        let mut tensors: Vec<Tensor> = inputs.iter().map(|r| Tensor::new(r.clone())).collect();
        tensors[which] = Tensor::from_vec(values, inputs[which].shape())?;
        weighted_sum(&f(&tensors)?)?.item()
    };
    (0..base.len())
        .map(|i| Ok((eval(i, eps)? - eval(i, -eps)?) / (2.0 * eps)))
        .collect()
}

pub fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch: {:?} vs {:?}", actual, expected);
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tol, "index {}: {} vs {} (tol {})", i, a, e, tol);
    }
}

pub fn check_gradients<F>(f: F, inputs: &[RawTensor], which: &[usize], tol: f32) -> Result<()>
where
    F: Fn(&[Tensor]) -> Result<Tensor> + Copy,
{
    for &i in which {
        let analytic = analytic_gradient(f, inputs, i)?;
        let numeric = numeric_gradient(f, inputs, i, 1e-2)?;
        assert_close(&analytic, &numeric, tol);
    }
    Ok(())
}

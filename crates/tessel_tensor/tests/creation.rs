mod utils;

use tessel_core::{dtype::DType, error::Result};
use tessel_tensor::RawTensor;
use utils::{setup_device, setup_tensor};

#[test]
fn from_vec_rejects_wrong_length() {
    setup_device();
    assert!(RawTensor::from_vec(vec![1.0f32, 2.0, 3.0], &[2, 2]).is_err());
}

#[test]
fn scalar_has_empty_shape() -> Result<()> {
    setup_device();
    let s = RawTensor::scalar(2.5);
    assert_eq!(s.shape(), &[] as &[usize]);
    assert_eq!(s.size(), 1);
    assert_eq!(s.item()?, 2.5);
    Ok(())
}

#[test]
fn item_requires_single_element() -> Result<()> {
    let x = setup_tensor(vec![1.0, 2.0], &[2])?;
    assert!(x.item().is_err());
    Ok(())
}

#[test]
fn randn_has_requested_shape() -> Result<()> {
    setup_device();
    let x = RawTensor::randn(&[3, 4])?;
    assert_eq!(x.shape(), &[3, 4]);
    assert_eq!(x.dtype(), DType::F32);
    Ok(())
}

#[test]
fn bernoulli_extremes_are_deterministic() -> Result<()> {
    setup_device();
    assert!(RawTensor::bernoulli(&[8], 1.0)?.to_vec_f32().iter().all(|&v| v == 1.0));
    assert!(RawTensor::bernoulli(&[8], 0.0)?.to_vec_f32().iter().all(|&v| v == 0.0));
    Ok(())
}

#[test]
fn dtype_conversion_narrows() -> Result<()> {
    let x = setup_tensor(vec![1.7, -2.2, 0.0], &[3])?;
    assert_eq!(x.to_dtype(DType::I32)?.to_vec_i32(), vec![1, -2, 0]);
    assert_eq!(x.to_dtype(DType::BOOL)?.to_vec_bool(), vec![true, true, false]);
    Ok(())
}

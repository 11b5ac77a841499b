mod utils;

use tessel_core::{dtype::DType, error::Result};
use tessel_tensor::RawTensor;
use utils::{assert_close, setup_tensor};

#[test]
fn add_broadcasts_row_vector() -> Result<()> {
    let a = setup_tensor(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])?;
    let b = setup_tensor(vec![10.0, 20.0, 30.0], &[3])?;
    let c = a.add(&b)?;
    assert_eq!(c.shape(), &[2, 3]);
    assert_eq!(c.to_vec_f32(), vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
    Ok(())
}

#[test]
fn reduce_to_shape_sums_broadcast_axes() -> Result<()> {
    let g = setup_tensor(vec![1.0; 6], &[2, 3])?;
    assert_eq!(g.reduce_to_shape(&[3])?.to_vec_f32(), vec![2.0, 2.0, 2.0]);
    assert_eq!(g.reduce_to_shape(&[2, 1])?.to_vec_f32(), vec![3.0, 3.0]);
    Ok(())
}

#[test]
fn comparison_returns_bool() -> Result<()> {
    let a = setup_tensor(vec![1.0, 2.0, 3.0], &[3])?;
    let b = setup_tensor(vec![2.0], &[1])?;
    let lt = a.less(&b)?;
    assert_eq!(lt.dtype(), DType::BOOL);
    assert_eq!(lt.to_vec_bool(), vec![true, false, false]);
    assert_eq!(a.equal(&b)?.to_vec_bool(), vec![false, true, false]);
    Ok(())
}

#[test]
fn matmul_and_transpose() -> Result<()> {
    let a = setup_tensor(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])?;
    let b = a.t()?;
    assert_eq!(b.shape(), &[3, 2]);
    let c = a.matmul(&b)?;
    assert_eq!(c.to_vec_f32(), vec![14.0, 32.0, 32.0, 77.0]);
    assert!(a.matmul(&a).is_err());
    Ok(())
}

#[test]
fn sum_and_mean_over_axes() -> Result<()> {
    let a = setup_tensor(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])?;
    let s = a.sum(&[1], false)?;
    assert_eq!(s.shape(), &[2]);
    assert_eq!(s.to_vec_f32(), vec![6.0, 15.0]);
    let m = a.mean(&[0], true)?;
    assert_eq!(m.shape(), &[1, 3]);
    assert_eq!(m.to_vec_f32(), vec![2.5, 3.5, 4.5]);
    assert_eq!(a.sum_all()?.item()?, 21.0);
    Ok(())
}

#[test]
fn reshape_resolves_zero_and_minus_one() -> Result<()> {
    let a = setup_tensor((0..24).map(|v| v as f32).collect(), &[2, 3, 4])?;
    assert_eq!(a.resolve_shape(&[0, -1])?, vec![2, 12]);
    assert_eq!(a.resolve_shape(&[-1, 4])?, vec![6, 4]);
    assert!(a.resolve_shape(&[5, -1]).is_err());
    let r = a.reshape(&[4, 6])?;
    assert_eq!(r.to_vec_f32(), a.to_vec_f32());
    Ok(())
}

#[test]
fn transpose_three_axes() -> Result<()> {
    let a = setup_tensor((0..6).map(|v| v as f32).collect(), &[1, 2, 3])?;
    let t = a.transpose(&[2, 1, 0])?;
    assert_eq!(t.shape(), &[3, 2, 1]);
    assert_eq!(t.to_vec_f32(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    assert!(a.transpose(&[0, 0, 1]).is_err());
    Ok(())
}

#[test]
fn concat_then_slice_back() -> Result<()> {
    let a = setup_tensor(vec![1.0, 2.0, 3.0, 4.0], &[2, 2])?;
    let b = setup_tensor(vec![5.0, 6.0], &[2, 1])?;
    let c = RawTensor::concat(&[&a, &b], 1)?;
    assert_eq!(c.shape(), &[2, 3]);
    assert_eq!(c.slice_axis(1, 2, 1)?.to_vec_f32(), b.to_vec_f32());
    Ok(())
}

#[test]
fn unary_math_family() -> Result<()> {
    let x = setup_tensor(vec![-1.0, 0.0, 1.0], &[3])?;
    assert_eq!(x.relu()?.to_vec_f32(), vec![0.0, 0.0, 1.0]);
    assert_eq!(x.sign()?.to_vec_f32(), vec![-1.0, 0.0, 1.0]);
    assert_close(&x.sigmoid()?.to_vec_f32(), &[0.268_941_4, 0.5, 0.731_058_6], 1e-6);
    assert_eq!(x.clip(-0.5, 0.5)?.to_vec_f32(), vec![-0.5, 0.0, 0.5]);
    assert_eq!(x.gt_mask(0.0)?.to_vec_f32(), vec![0.0, 0.0, 1.0]);
    Ok(())
}

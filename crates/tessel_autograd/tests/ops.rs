mod utils;

use tessel_autograd::{
    gradients,
    ops::{
        add_bias, clip, concat, constant_of_shape, div, elu, equal, exp, flatten, gemm, leaky_relu, less, logical_not,
        matmul, max, mean, mul, pow, prelu, reduce_mean, reduce_sum, reshape, shape, sigmoid, softmax, sum, tanh,
        transpose,
    },
    OpType,
};
use tessel_core::{dtype::DType, error::Result};
use tessel_tensor::RawTensor;
use utils::{assert_close, check_gradients, setup_device, setup_grad_tensor, setup_tensor, wave};

fn raw(data: Vec<f32>, shape: &[usize]) -> Result<RawTensor> {
    setup_device();
    RawTensor::from_vec(data, shape)
}

#[test]
fn smooth_activations() -> Result<()> {
    let x = raw(wave(6, 0.4), &[2, 3])?;
    check_gradients(|t| sigmoid(&t[0]), &[x.clone()], &[0], 1e-2)?;
    check_gradients(|t| tanh(&t[0]), &[x.clone()], &[0], 1e-2)?;
    check_gradients(|t| exp(&t[0]), &[x.clone()], &[0], 1e-2)?;
    check_gradients(|t| softmax(&t[0], -1), &[x], &[0], 1e-2)?;
    Ok(())
}

#[test]
fn piecewise_activations() -> Result<()> {
    let x = setup_grad_tensor(vec![-2.0, -0.5, 0.5, 2.0], &[4])?;

    let y = leaky_relu(&x, 0.1)?;
    assert_close(&y.to_vec_f32(), &[-0.2, -0.05, 0.5, 2.0], 1e-6);
    let g = reduce_sum(&y, None, false)?.backward()?;
    assert_eq!(g[&x.id()].to_vec_f32(), vec![0.1, 0.1, 1.0, 1.0]);

    let y = clip(&x, Some(-1.0), Some(1.0))?;
    assert_eq!(y.to_vec_f32(), vec![-1.0, -0.5, 0.5, 1.0]);
    let g = reduce_sum(&y, None, false)?.backward()?;
    assert_eq!(g[&x.id()].to_vec_f32(), vec![0.0, 1.0, 1.0, 0.0]);

    let y = elu(&x, 1.0)?;
    let g = reduce_sum(&y, None, false)?.backward()?;
    assert_close(&g[&x.id()].to_vec_f32(), &[(-2.0f32).exp(), (-0.5f32).exp(), 1.0, 1.0], 1e-5);
    Ok(())
}

#[test]
fn prelu_slope_gradient() -> Result<()> {
    let x = setup_grad_tensor(vec![-1.0, 2.0, -3.0, 4.0], &[2, 2])?;
    let slope = setup_grad_tensor(vec![0.25, 0.5], &[2])?;
    let y = prelu(&x, &slope)?;
    assert_eq!(y.to_vec_f32(), vec![-0.25, 2.0, -0.75, 4.0]);

    let g = reduce_sum(&y, None, false)?.backward()?;
    assert_eq!(g[&x.id()].to_vec_f32(), vec![0.25, 1.0, 0.25, 1.0]);
    assert_eq!(g[&slope.id()].to_vec_f32(), vec![-4.0, 0.0]);
    Ok(())
}

#[test]
fn broadcast_arithmetic() -> Result<()> {
    let a = raw(wave(6, 0.1), &[2, 3])?;
    let b = raw(wave(3, 1.0).into_iter().map(|v| v + 2.0).collect(), &[3])?;
    check_gradients(|t| mul(&t[0], &t[1]), &[a.clone(), b.clone()], &[0, 1], 1e-2)?;
    check_gradients(|t| div(&t[0], &t[1]), &[a, b], &[0, 1], 1e-2)?;

    let base = raw(wave(4, 0.2).into_iter().map(|v| v * 0.5 + 1.5).collect(), &[4])?;
    let exponent = raw(wave(4, 2.0), &[4])?;
    check_gradients(|t| pow(&t[0], &t[1]), &[base, exponent], &[0, 1], 1e-2)?;
    Ok(())
}

#[test]
fn max_routes_gradient_to_the_winner() -> Result<()> {
    let a = setup_grad_tensor(vec![1.0, 5.0, 3.0], &[3])?;
    let b = setup_grad_tensor(vec![4.0, 2.0, 3.0], &[3])?;
    let y = max(&a, &b)?;
    assert_eq!(y.to_vec_f32(), vec![4.0, 5.0, 3.0]);
    let g = reduce_sum(&y, None, false)?.backward()?;
    assert_eq!(g[&a.id()].to_vec_f32(), vec![0.0, 1.0, 1.0]);
    assert_eq!(g[&b.id()].to_vec_f32(), vec![1.0, 0.0, 0.0]);
    Ok(())
}

#[test]
fn bias_and_variadic_sums() -> Result<()> {
    let x = raw(wave(6, 0.0), &[2, 3])?;
    let row = raw(vec![0.1, 0.2, 0.3], &[3])?;
    let col = raw(vec![1.0, -1.0], &[2])?;
    check_gradients(|t| add_bias(&t[0], &t[1], 0), &[x.clone(), row], &[0, 1], 1e-2)?;
    check_gradients(|t| add_bias(&t[0], &t[1], 1), &[x, col], &[0, 1], 1e-2)?;

    let a = setup_grad_tensor(vec![1.0, 2.0], &[2])?;
    let b = setup_grad_tensor(vec![3.0, 4.0], &[2])?;
    let c = setup_grad_tensor(vec![5.0, 6.0], &[2])?;
    assert_eq!(sum(&[&a, &b, &c])?.to_vec_f32(), vec![9.0, 12.0]);
    let m = mean(&[&a, &b, &c])?;
    assert_eq!(m.to_vec_f32(), vec![3.0, 4.0]);
    let g = reduce_sum(&m, None, false)?.backward()?;
    assert_close(&g[&b.id()].to_vec_f32(), &[1.0 / 3.0, 1.0 / 3.0], 1e-6);
    Ok(())
}

#[test]
fn matrix_products() -> Result<()> {
    let a = raw(wave(6, 0.3), &[2, 3])?;
    let b = raw(wave(12, 0.9), &[3, 4])?;
    check_gradients(|t| matmul(&t[0], &t[1]), &[a.clone(), b.clone()], &[0, 1], 1e-2)?;

    let at = raw(wave(6, 0.3), &[3, 2])?;
    let bt = raw(wave(12, 0.9), &[4, 3])?;
    let c = raw(wave(4, 1.3), &[4])?;
    check_gradients(
        |t| gemm(&t[0], &t[1], Some(&t[2]), 0.5, 2.0, true, true),
        &[at, bt, c],
        &[0, 1, 2],
        1e-2,
    )?;
    check_gradients(|t| gemm(&t[0], &t[1], None, 1.5, 0.0, false, false), &[a, b], &[0, 1], 1e-2)?;
    Ok(())
}

#[test]
fn gemm_matches_manual_result() -> Result<()> {
    let a = setup_tensor(vec![1.0, 2.0, 3.0, 4.0], &[2, 2])?;
    let b = setup_tensor(vec![1.0, 0.0, 0.0, 1.0], &[2, 2])?;
    let c = setup_tensor(vec![10.0, 20.0], &[2])?;
    let y = gemm(&a, &b, Some(&c), 2.0, 0.5, true, false)?;
    assert_eq!(y.to_vec_f32(), vec![7.0, 16.0, 9.0, 18.0]);
    Ok(())
}

#[test]
fn shape_manipulation() -> Result<()> {
    let x = raw(wave(24, 0.5), &[2, 3, 4])?;
    check_gradients(|t| reshape(&t[0], &[4, -1]), &[x.clone()], &[0], 1e-2)?;
    check_gradients(|t| flatten(&t[0], 2), &[x.clone()], &[0], 1e-2)?;
    check_gradients(|t| transpose(&t[0], Some(&[1, 2, 0])), &[x.clone()], &[0], 1e-2)?;
    check_gradients(|t| transpose(&t[0], None), &[x.clone()], &[0], 1e-2)?;

    let y = raw(wave(8, 2.5), &[2, 1, 4])?;
    check_gradients(|t| concat(&[&t[0], &t[1]], 1), &[x, y], &[0, 1], 1e-2)?;
    Ok(())
}

#[test]
fn reshape_keeps_zero_and_infers_minus_one() -> Result<()> {
    let x = setup_tensor(wave(24, 0.0), &[2, 3, 4])?;
    assert_eq!(reshape(&x, &[0, -1])?.shape(), &[2, 12]);
    assert_eq!(flatten(&x, 0)?.shape(), &[1, 24]);
    assert_eq!(transpose(&x, None)?.shape(), &[4, 3, 2]);
    Ok(())
}

#[test]
fn reductions() -> Result<()> {
    let x = raw(wave(24, 0.7), &[2, 3, 4])?;
    check_gradients(|t| reduce_sum(&t[0], Some(&[1]), true), &[x.clone()], &[0], 1e-2)?;
    check_gradients(|t| reduce_mean(&t[0], Some(&[0, -1]), false), &[x.clone()], &[0], 1e-2)?;
    check_gradients(|t| reduce_mean(&t[0], None, false), &[x], &[0], 1e-2)?;

    let x = setup_tensor(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])?;
    let y = reduce_sum(&x, Some(&[1]), true)?;
    assert_eq!(y.shape(), &[2, 1]);
    assert_eq!(y.to_vec_f32(), vec![6.0, 15.0]);
    assert_eq!(reduce_mean(&x, Some(&[0]), false)?.to_vec_f32(), vec![2.5, 3.5, 4.5]);
    Ok(())
}

#[test]
fn comparisons_produce_no_gradient() -> Result<()> {
    let a = setup_grad_tensor(vec![1.0], &[1])?;
    let b = setup_grad_tensor(vec![2.0], &[1])?;

    let lt = less(&a, &b)?;
    assert_eq!(lt.dtype(), DType::BOOL);
    assert_eq!(lt.data().to_vec_bool(), vec![true]);
    assert_eq!(lt.creator().op_type(), OpType::Less);
    assert!(gradients(&lt, None)?.is_empty());

    let eq = equal(&a, &b)?;
    assert_eq!(logical_not(&eq)?.data().to_vec_bool(), vec![true]);
    Ok(())
}

#[test]
fn shape_feeds_constant_of_shape() -> Result<()> {
    let x = setup_tensor(wave(6, 0.0), &[2, 3])?;
    let s = shape(&x)?;
    assert_eq!(s.dtype(), DType::I32);
    assert_eq!(s.data().to_vec_i32(), vec![2, 3]);

    let filled = constant_of_shape(&s, 1.5)?;
    assert_eq!(filled.shape(), &[2, 3]);
    assert_eq!(filled.to_vec_f32(), vec![1.5; 6]);
    Ok(())
}

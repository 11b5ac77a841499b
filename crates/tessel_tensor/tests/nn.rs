mod utils;

use tessel_core::error::{Error, Result};
use tessel_tensor::{BatchNormHandle, ConvHandle, PoolingHandle, RawTensor};
use utils::{assert_close, setup_tensor};

#[test]
fn conv_gradients_match_finite_differences() -> Result<()> {
    let x = setup_tensor((0..18).map(|v| (v as f32 * 0.37).sin()).collect(), &[1, 2, 3, 3])?;
    let w = setup_tensor((0..16).map(|v| (v as f32 * 0.11).cos()).collect(), &[2, 2, 2, 2])?;
    let b = setup_tensor(vec![0.1, -0.2], &[2])?;
    let handle = ConvHandle::new(&x, [2, 2], [1, 1], [1, 1], 2, 2, true, 1)?;

    let (y, cache) = x.conv2d_forward(&handle, &w, Some(&b))?;
    assert_eq!(y.shape(), &[1, 2, 4, 4]);
    let (dx, dw, db) = RawTensor::conv2d_backward(&cache, &w, &y.ones_like())?;
    assert_eq!(db.to_vec_f32(), vec![16.0, 16.0]);

    let eps = 1e-2;
    let loss = |x: &RawTensor, w: &RawTensor| -> Result<f32> {
        let (y, _) = x.conv2d_forward(&handle, w, Some(&b))?;
        y.sum_all()?.item()
    };
    let xs = x.to_vec_f32();
    for i in [0, 4, 13] {
        let mut plus = xs.clone();
        plus[i] += eps;
        let mut minus = xs.clone();
        minus[i] -= eps;
        let numeric = (loss(&RawTensor::from_vec(plus, x.shape())?, &w)? - loss(&RawTensor::from_vec(minus, x.shape())?, &w)?) / (2.0 * eps);
        assert_close(&[dx.to_vec_f32()[i]], &[numeric], 1e-2);
    }
    let ws = w.to_vec_f32();
    for i in [0, 7, 15] {
        let mut plus = ws.clone();
        plus[i] += eps;
        let mut minus = ws.clone();
        minus[i] -= eps;
        let numeric = (loss(&x, &RawTensor::from_vec(plus, w.shape())?)? - loss(&x, &RawTensor::from_vec(minus, w.shape())?)?) / (2.0 * eps);
        assert_close(&[dw.to_vec_f32()[i]], &[numeric], 1e-2);
    }
    Ok(())
}

#[test]
fn grouped_conv_is_rejected_on_cpu() -> Result<()> {
    let x = setup_tensor(vec![0.0; 16], &[1, 4, 2, 2])?;
    match ConvHandle::new(&x, [1, 1], [1, 1], [0, 0], 4, 4, false, 2) {
        Err(Error::NotSupported(_)) => Ok(()),
        other => panic!("expected NotSupported, got {:?}", other),
    }
}

#[test]
fn max_and_average_pooling() -> Result<()> {
    let x = setup_tensor((0..16).map(|v| v as f32).collect(), &[1, 1, 4, 4])?;
    let max = PoolingHandle::new([2, 2], [2, 2], [0, 0], true)?;
    let (y, cache) = x.pooling2d_forward(&max)?;
    assert_eq!(y.to_vec_f32(), vec![5.0, 7.0, 13.0, 15.0]);
    let dx = RawTensor::pooling2d_backward(&cache, &y.ones_like())?;
    assert_eq!(dx.sum_all()?.item()?, 4.0);

    let avg = PoolingHandle::new([2, 2], [2, 2], [0, 0], false)?;
    let (y, _) = x.pooling2d_forward(&avg)?;
    assert_eq!(y.to_vec_f32(), vec![2.5, 4.5, 10.5, 12.5]);
    Ok(())
}

#[test]
fn batchnorm_updates_running_statistics_through_clones() -> Result<()> {
    let x = setup_tensor(vec![1.0, 3.0, 5.0, 7.0], &[2, 1, 1, 2])?;
    let handle = BatchNormHandle::new(0.9, 1e-5, RawTensor::zeros(&[1]), RawTensor::ones(&[1]))?;
    let shared = handle.clone();
    let scale = RawTensor::ones(&[1]);
    let bias = RawTensor::zeros(&[1]);

    let (y, _) = x.batchnorm2d_forward(&handle, &scale, &bias, true)?;
    assert!(y.sum_all()?.item()?.abs() < 1e-4);
    assert_close(&shared.running_mean()?.to_vec_f32(), &[0.4], 1e-6);
    assert_close(&shared.running_var()?.to_vec_f32(), &[0.9 + 0.5], 1e-5);

    let (y_eval, _) = x.batchnorm2d_forward(&handle, &scale, &bias, false)?;
    let expected: Vec<f32> = [1.0f32, 3.0, 5.0, 7.0].iter().map(|v| (v - 0.4) / (1.4f32 + 1e-5).sqrt()).collect();
    assert_close(&y_eval.to_vec_f32(), &expected, 1e-4);
    Ok(())
}

#[test]
fn softmax_backward_matches_jacobian() -> Result<()> {
    let x = setup_tensor(vec![0.5, -0.3, 1.2], &[1, 3])?;
    let y = x.softmax_forward(-1)?;
    let dy = setup_tensor(vec![1.0, 0.0, 0.0], &[1, 3])?;
    let dx = y.softmax_backward(&dy, 1)?;
    let p = y.to_vec_f32();
    let expected = vec![p[0] * (1.0 - p[0]), -p[0] * p[1], -p[0] * p[2]];
    assert_close(&dx.to_vec_f32(), &expected, 1e-6);
    Ok(())
}

use criterion::{black_box, Criterion};
use tessel_tensor::{ConvHandle, PoolingHandle, RawTensor};

// (batch, channels, extent)
const SIZES: [((usize, usize, usize), &str); 3] = [((1, 3, 16), "small"), ((4, 8, 32), "medium"), ((8, 16, 64), "large")];

fn input(n: usize, c: usize, hw: usize) -> RawTensor {
    let data: Vec<f32> = (0..n * c * hw * hw).map(|i| (i as f32 * 0.37).sin()).collect();
    RawTensor::from_vec(data, &[n, c, hw, hw]).unwrap()
}

pub fn basic(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("nn/basic");
    group.warm_up_time(core::time::Duration::from_millis(500));
    group.measurement_time(core::time::Duration::from_secs(3));
    group.sample_size(20);

    for &((n, c, hw), size_name) in &SIZES {
        let x = input(n, c, hw);
        let w = RawTensor::ones(&[c, c, 3, 3]);
        let conv = ConvHandle::new(&x, [3, 3], [1, 1], [1, 1], c, c, false, 1).unwrap();
        group.bench_function(format!("conv2d_forward/cpu/{}", size_name), |b| {
            b.iter(|| black_box(x.conv2d_forward(&conv, &w, None)).unwrap())
        });

        let (y, cache) = x.conv2d_forward(&conv, &w, None).unwrap();
        let dy = RawTensor::ones(y.shape());
        group.bench_function(format!("conv2d_backward/cpu/{}", size_name), |b| {
            b.iter(|| black_box(RawTensor::conv2d_backward(&cache, &w, &dy)).unwrap())
        });

        let pool = PoolingHandle::new([2, 2], [2, 2], [0, 0], true).unwrap();
        group.bench_function(format!("max_pool/cpu/{}", size_name), |b| {
            b.iter(|| black_box(x.pooling2d_forward(&pool)).unwrap())
        });
    }

    group.finish();
}

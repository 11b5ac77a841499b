use criterion::{black_box, criterion_group, Criterion};
use tessel_autograd::{
    ops::{add_bias, matmul, relu, softmax_cross_entropy},
    Tensor,
};
use tessel_core::error::Result;
use tessel_tensor::RawTensor;

// (batch, hidden, depth)
const SIZES: [((usize, usize, usize), &str); 3] = [((8, 16, 2), "small"), ((32, 64, 4), "medium"), ((64, 256, 8), "large")];

fn param(shape: &[usize], phase: f32) -> Tensor {
    let len = shape.iter().product::<usize>();
    let data: Vec<f32> = (0..len).map(|i| (i as f32 * 0.61 + phase).sin() * 0.1).collect();
    Tensor::parameter(RawTensor::from_vec(data, shape).unwrap())
}

/// A stack of dense layers ending in a cross-entropy loss.
fn mlp_loss(x: &Tensor, target: &Tensor, layers: &[(Tensor, Tensor)]) -> Result<Tensor> {
    let mut h = x.clone();
    for (w, b) in layers {
        h = relu(&add_bias(&matmul(&h, w)?, b, 0)?)?;
    }
    softmax_cross_entropy(&h, target)
}

pub fn mlp(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("autograd/mlp");
    group.warm_up_time(core::time::Duration::from_millis(500));
    group.measurement_time(core::time::Duration::from_secs(3));
    group.sample_size(30);

    for &((batch, hidden, depth), size_name) in &SIZES {
        let x = param(&[batch, hidden], 0.0);
        let labels: Vec<i32> = (0..batch).map(|i| (i % hidden) as i32).collect();
        let target = Tensor::new(RawTensor::from_vec(labels, &[batch]).unwrap());
        let layers: Vec<(Tensor, Tensor)> = (0..depth)
            .map(|i| (param(&[hidden, hidden], i as f32), param(&[hidden], i as f32 + 0.5)))
            .collect();

        group.bench_function(format!("forward/cpu/{}", size_name), |b| {
            b.iter(|| black_box(mlp_loss(&x, &target, &layers)).unwrap())
        });

        let loss = mlp_loss(&x, &target, &layers).unwrap();
        group.bench_function(format!("backward/cpu/{}", size_name), |b| {
            b.iter(|| black_box(loss.backward()).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, mlp);

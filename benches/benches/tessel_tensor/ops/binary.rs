use criterion::{black_box, Criterion};
use tessel_core::error::Result;
use tessel_tensor::RawTensor;

// Constants for benchmark data sizes
const SIZES: [(usize, &str); 3] = [(100, "small"), (5000, "medium"), (10000, "large")];

fn bench_binary_op<F>(
    b: &mut criterion::Bencher,
    size: usize,
    x_transform: impl Fn(Vec<f32>) -> Vec<f32>,
    y_transform: impl Fn(Vec<f32>) -> Vec<f32>,
    op_fn: F,
) where
    F: Fn(&RawTensor, &RawTensor) -> Result<RawTensor>,
{
    let base_data: Vec<f32> = (0..size).map(|i| i as f32).collect();
    let x = RawTensor::from_vec(x_transform(base_data.clone()), &[size]).unwrap();
    let y = RawTensor::from_vec(y_transform(base_data), &[size]).unwrap();

    b.iter(|| black_box(op_fn(&x, &y)).unwrap())
}

pub fn basic(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("binary/basic");
    group.warm_up_time(core::time::Duration::from_millis(500));
    group.measurement_time(core::time::Duration::from_secs(3));
    group.sample_size(50);

    #[allow(clippy::type_complexity)]
    let operations: Vec<(
        &str,
        Box<dyn Fn(Vec<f32>) -> Vec<f32>>,
        Box<dyn Fn(Vec<f32>) -> Vec<f32>>,
        Box<dyn Fn(&RawTensor, &RawTensor) -> Result<RawTensor>>,
    )> = vec![
        ("add", Box::new(|v| v), Box::new(|v| v.iter().map(|x| x + 1.0).collect()), Box::new(|x, y| x.add(y))),
        ("sub", Box::new(|v| v), Box::new(|v| v.iter().map(|x| x + 1.0).collect()), Box::new(|x, y| x.sub(y))),
        ("mul", Box::new(|v| v), Box::new(|v| v.iter().map(|x| x + 1.0).collect()), Box::new(|x, y| x.mul(y))),
        (
            "div",
            Box::new(|v| v.iter().map(|x| x + 2.0).collect()),
            Box::new(|v| v.iter().map(|x| x + 1.0).collect()),
            Box::new(|x, y| x.div(y)),
        ),
        (
            "maximum",
            Box::new(|v| v),
            Box::new(|v| v.iter().rev().copied().collect()),
            Box::new(|x, y| x.maximum(y)),
        ),
        (
            "equal",
            Box::new(|v| v),
            Box::new(|v| v.iter().map(|x| x % 3.0).collect()),
            Box::new(|x, y| x.equal(y)),
        ),
    ];

    for (op_name, x_transform, y_transform, op_fn) in &operations {
        for &(size, size_name) in &SIZES {
            let bench_name = format!("{}/cpu/{}", op_name, size_name);
            group.bench_function(&bench_name, |b| {
                bench_binary_op(b, size, x_transform, y_transform, op_fn)
            });
        }
    }

    group.finish();
}

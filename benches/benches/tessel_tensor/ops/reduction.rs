use criterion::{black_box, Criterion};
use tessel_core::error::Result;
use tessel_tensor::RawTensor;

// Constants for benchmark data sizes
const SIZES: [(usize, &str); 3] = [(20, "small"), (200, "medium"), (1000, "large")];

fn bench_op<F>(b: &mut criterion::Bencher, dims: &[usize], op_fn: F)
where
    F: Fn(&RawTensor) -> Result<RawTensor>,
{
    let data: Vec<f32> = (0..dims.iter().product::<usize>()).map(|i| i as f32).collect();
    let x = RawTensor::from_vec(data, dims).unwrap();

    b.iter(|| black_box(op_fn(&x)).unwrap())
}

// `size` x `size` matrix
fn create_dims(size: usize) -> Vec<usize> {
    vec![size, size]
}

pub fn basic(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("reduction/basic");
    group.warm_up_time(core::time::Duration::from_millis(500));
    group.measurement_time(core::time::Duration::from_secs(3));
    group.sample_size(50);

    #[allow(clippy::type_complexity)]
    let operations: Vec<(&str, Box<dyn Fn(&RawTensor) -> Result<RawTensor>>)> = vec![
        ("sum_all", Box::new(|x| x.sum_all())),
        ("sum_dim_0", Box::new(|x| x.sum(&[0], false))),
        ("sum_dim_last", Box::new(|x| x.sum(&[x.ndim() - 1], false))),
        ("sum_keepdim", Box::new(|x| x.sum(&[0], true))),
        ("mean_dim_0", Box::new(|x| x.mean(&[0], false))),
        ("softmax_last", Box::new(|x| x.softmax_forward(-1))),
    ];

    for (op_name, op_fn) in &operations {
        for &(size, size_name) in &SIZES {
            let bench_name = format!("{}/cpu/{}", op_name, size_name);
            let dims = create_dims(size);
            group.bench_function(&bench_name, |b| bench_op(b, &dims, op_fn));
        }
    }

    group.finish();
}

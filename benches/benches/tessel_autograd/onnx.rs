use criterion::{black_box, criterion_group, Criterion};
use tessel_autograd::{
    ops::{matmul, relu, sigmoid},
    Tensor,
};
use tessel_core::device::Device;
use tessel_onnx::{prepare, to_onnx, RunOptions};
use tessel_tensor::RawTensor;

const SIZES: [(usize, &str); 3] = [(16, "small"), (64, "medium"), (256, "large")];

pub fn round_trip(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("onnx/round_trip");
    group.warm_up_time(core::time::Duration::from_millis(500));
    group.measurement_time(core::time::Duration::from_secs(3));
    group.sample_size(30);

    for &(size, size_name) in &SIZES {
        let x = Tensor::new(RawTensor::ones(&[size, size])).named("x");
        let w1 = Tensor::parameter(RawTensor::ones(&[size, size]));
        let w2 = Tensor::parameter(RawTensor::ones(&[size, size]));
        let y = sigmoid(&matmul(&relu(&matmul(&x, &w1).unwrap()).unwrap(), &w2).unwrap()).unwrap();

        group.bench_function(format!("export/cpu/{}", size_name), |b| {
            b.iter(|| black_box(to_onnx(&[&x], &[&y])).unwrap())
        });

        let model = to_onnx(&[&x], &[&y]).unwrap();
        group.bench_function(format!("prepare/cpu/{}", size_name), |b| {
            b.iter(|| black_box(prepare(model.clone(), Device::CPU)).unwrap())
        });

        let rep = prepare(model, Device::CPU).unwrap();
        let options = RunOptions::default();
        group.bench_function(format!("run/cpu/{}", size_name), |b| {
            b.iter(|| black_box(rep.run(&[x.clone()], &options)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, round_trip);

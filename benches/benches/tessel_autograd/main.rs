mod backward;
mod onnx;

criterion::criterion_main!(backward::benches, onnx::benches);

#![allow(dead_code)]

use tessel_autograd::Tensor;
use tessel_core::{
    device::{set_default_device, Device},
    dtype::{set_default_dtype, DType},
    error::Result,
};
use tessel_onnx::{ElemType, GraphProto, ModelProto, NodeProto, TensorProto, ValueInfoProto};

// Helper functions
pub fn setup_device() {
    set_default_device(Device::CPU);
    set_default_dtype(DType::F32);
}

pub fn setup_tensor(data: Vec<f32>, shape: &[usize]) -> Result<Tensor> {
    setup_device();
    Tensor::from_vec(data, shape)
}

/// Deterministic, non-uniform values.
pub fn wave(len: usize, phase: f32) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.73 + phase).sin()).collect()
}

pub fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch: {:?} vs {:?}", actual, expected);
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tol, "index {}: {} vs {} (tol {})", i, a, e, tol);
    }
}

pub fn node(name: &str, op_type: &str, inputs: &[&str], outputs: &[&str]) -> NodeProto {
    let mut node = NodeProto::new(name, op_type);
    node.input = inputs.iter().map(|s| s.to_string()).collect();
    node.output = outputs.iter().map(|s| s.to_string()).collect();
    node
}

pub fn float_input(name: &str, shape: &[usize]) -> ValueInfoProto {
    ValueInfoProto::new(name, ElemType::Float, shape)
}

/// Wraps nodes into a model. Every initializer is also declared as an input.
pub fn model(
    nodes: Vec<NodeProto>,
    inputs: Vec<ValueInfoProto>,
    initializers: Vec<TensorProto>,
    output: ValueInfoProto,
) -> ModelProto {
    let mut input = inputs;
    for init in &initializers {
        let shape: Vec<usize> = init.dims.iter().map(|&d| d as usize).collect();
        input.push(ValueInfoProto::new(&init.name, init.data_type, &shape));
    }
    ModelProto::new(GraphProto {
        name: "test".into(),
        node: nodes,
        input,
        output: vec![output],
        initializer: initializers,
    })
}

/// `y = relu(x @ w)` with `x: [2, 3]` bound at run time and `w: [3, 4]` stored.
pub fn matmul_relu_model() -> ModelProto {
    let w = TensorProto::from_f32(
        "w",
        &[3, 4],
        vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0],
    );
    model(
        vec![
            node("matmul", "MatMul", &["x", "w"], &["h"]),
            node("relu", "Relu", &["h"], &["y"]),
        ],
        vec![float_input("x", &[2, 3])],
        vec![w],
        float_input("y", &[2, 4]),
    )
}

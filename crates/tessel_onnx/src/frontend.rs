//! Exporter: walks the operator graph behind an output tensor and emits an
//! interchange document.

use crate::{
    checker::check_model,
    names::{output_elem_type, to_onnx_name},
    optimizer::optimize,
    proto::{AttributeProto, ElemType, GraphProto, ModelProto, NodeProto, TensorProto, ValueInfoProto},
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tessel_autograd::{
    ops::{
        constant::Dummy, BatchNorm2d, Clip, Concat, ConstantOfShape, Conv2d, Dropout, Elu, Flatten, Gemm,
        HardSigmoid, LeakyRelu, Pooling2d, ReduceMean, ReduceSum, Reshape, SeLU, SoftMax, Transpose,
    },
    OpId, OpNode, OpType, Operation, Tensor, TensorId,
};
use tessel_core::error::{Error, Result};

pub const DEFAULT_GRAPH_NAME: &str = "tessel";

/// Exports the graph computing `outputs[0]`. Leaves listed in `inputs` become
/// graph inputs, every other leaf a `Constant` node.
pub fn to_onnx(inputs: &[&Tensor], outputs: &[&Tensor]) -> Result<ModelProto> {
    let graph = to_onnx_graph(inputs, outputs, DEFAULT_GRAPH_NAME)?;
    let model = optimize(ModelProto::new(graph));
    check_model(&model)?;
    Ok(model)
}

pub fn to_onnx_graph(inputs: &[&Tensor], outputs: &[&Tensor], graph_name: &str) -> Result<GraphProto> {
    let y = match outputs {
        [y] => *y,
        _ => {
            return Err(Error::NotSupported(format!(
                "export needs exactly one output tensor, got {}",
                outputs.len()
            )))
        }
    };

    let mut exporter = Exporter {
        graph: GraphProto {
            name: graph_name.to_string(),
            ..Default::default()
        },
        input_ids: inputs.iter().map(|x| x.id()).collect(),
        graph_inputs: HashMap::new(),
    };
    for op in post_order(y.creator()) {
        exporter.translate(&op)?;
    }

    // declared inputs in the caller's order, synthesized ones after
    let mut declared: Vec<ValueInfoProto> = Vec::new();
    for x in inputs {
        if let Some(info) = exporter.graph_inputs.remove(&x.id()) {
            declared.push(info);
        } else {
            log::debug!("input {} is not reachable from the output", x.output_name());
        }
    }
    let mut graph = exporter.graph;
    declared.append(&mut graph.input);
    graph.input = declared;

    graph.output.push(ValueInfoProto::new(
        y.output_name(),
        output_elem_type(y.creator().op_type().name()),
        y.shape(),
    ));
    log::debug!(
        "exported {} nodes, {} inputs, {} initializers",
        graph.node.len(),
        graph.input.len(),
        graph.initializer.len()
    );
    Ok(graph)
}

/// Operations reachable from `root`, producers before consumers.
fn post_order(root: &Arc<OpNode>) -> Vec<Arc<OpNode>> {
    let mut order = Vec::new();
    let mut visited: HashSet<OpId> = HashSet::new();
    let mut stack = vec![(Arc::clone(root), false)];

    while let Some((op, expanded)) = stack.pop() {
        if expanded {
            order.push(op);
            continue;
        }
        if !visited.insert(op.id()) {
            continue;
        }
        stack.push((Arc::clone(&op), true));
        for binding in op.src().iter().rev() {
            if !visited.contains(&binding.creator.id()) {
                stack.push((Arc::clone(&binding.creator), false));
            }
        }
    }
    order
}

struct Exporter {
    graph: GraphProto,
    input_ids: HashSet<TensorId>,
    /// Descriptors of leaves the caller listed as inputs.
    graph_inputs: HashMap<TensorId, ValueInfoProto>,
}

impl Exporter {
    fn translate(&mut self, op: &OpNode) -> Result<()> {
        match op.op_type() {
            OpType::Dummy => return self.translate_leaf(op),
            OpType::BatchNorm2d => {
                let bn = downcast::<BatchNorm2d>(op)?;
                let mut node = common_node(op)?
                    .with_attr(AttributeProto::float("momentum", bn.handle.momentum))
                    .with_attr(AttributeProto::float("epsilon", bn.handle.epsilon));
                let running = [("mean", bn.handle.running_mean()?), ("var", bn.handle.running_var()?)];
                for (suffix, value) in running {
                    let name = format!("{}:{}", op.name(), suffix);
                    self.synthesize(&name, TensorProto::from_raw(&name, &value));
                    node.input.push(name);
                }
                self.graph.node.push(node);
            }
            OpType::Reshape => {
                let reshape = downcast::<Reshape>(op)?;
                let name = format!("{}:shape", op.name());
                let mut node = common_node(op)?;
                self.synthesize(&name, TensorProto::from_i64(&name, &[reshape.shape.len()], reshape.shape.clone()));
                node.input.push(name);
                self.graph.node.push(node);
            }
            OpType::Clip => {
                let clip = downcast::<Clip>(op)?;
                let mut node = common_node(op)?;
                for (suffix, bound) in [("min", clip.min), ("max", clip.max)] {
                    match bound {
                        Some(v) => {
                            let name = format!("{}:{}", op.name(), suffix);
                            self.synthesize(&name, TensorProto::from_f32(&name, &[1], vec![v]));
                            node.input.push(name);
                        }
                        None => node.input.push(String::new()),
                    }
                }
                while node.input.last().is_some_and(|n| n.is_empty()) {
                    node.input.pop();
                }
                self.graph.node.push(node);
            }
            _ => {
                let node = attributes(op, common_node(op)?)?;
                self.graph.node.push(node);
            }
        }
        Ok(())
    }

    fn translate_leaf(&mut self, op: &OpNode) -> Result<()> {
        let dummy = downcast::<Dummy>(op)?;
        let data = dummy.data();
        let id = op
            .y_ids()
            .first()
            .copied()
            .ok_or_else(|| Error::internal(format!("{} has no output", op.name())))?;

        if self.input_ids.contains(&id) {
            let info = ValueInfoProto::new(op.name(), ElemType::from_dtype(data.dtype()), data.shape());
            self.graph_inputs.insert(id, info);
        } else {
            let mut node = NodeProto::new(op.name(), to_onnx_name(op.op_type().name()))
                .with_attr(AttributeProto::tensor("value", TensorProto::from_raw(op.name(), data)));
            node.output.push(op.output_name(0));
            self.graph.node.push(node);
        }
        Ok(())
    }

    /// Registers an extra input backed by an initializer.
    fn synthesize(&mut self, name: &str, payload: TensorProto) {
        let shape: Vec<usize> = payload.dims.iter().map(|&d| d.max(0) as usize).collect();
        let elem_type = payload.data_type;
        self.graph.input.push(ValueInfoProto::new(name, elem_type, &shape));
        self.graph.initializer.push(payload);
    }
}

fn downcast<T: Operation + 'static>(op: &OpNode) -> Result<&T> {
    op.downcast::<T>()
        .ok_or_else(|| Error::internal(format!("{} does not hold a {}", op.name(), op.op_type())))
}

/// Type, inputs and outputs; no attributes.
fn common_node(op: &OpNode) -> Result<NodeProto> {
    let mut node = NodeProto::new(op.name(), to_onnx_name(op.op_type().name()));
    for binding in op.src() {
        let src = &binding.creator;
        let idx = src.y_index(binding.input_id).ok_or_else(|| {
            Error::Runtime(format!("{} does not produce an input of {}", src.name(), op.name()))
        })?;
        node.input.push(src.output_name(idx));
    }
    node.output = (0..op.num_outputs()).map(|i| op.output_name(i)).collect();
    Ok(node)
}

fn attributes(op: &OpNode, node: NodeProto) -> Result<NodeProto> {
    let node = match op.op_type() {
        OpType::Conv2d => {
            let conv = downcast::<Conv2d>(op)?;
            let h = &conv.handle;
            window_attributes(node, h.kernel, h.stride, h.padding, conv.odd_padding)
                .with_attr(AttributeProto::int("group", h.group as i64))
        }
        OpType::Pooling2d => {
            let pool = downcast::<Pooling2d>(op)?;
            let h = &pool.handle;
            let mut node = window_attributes(node, h.kernel, h.stride, h.padding, pool.odd_padding);
            node.op_type = if h.is_max { "MaxPool" } else { "AveragePool" }.to_string();
            node
        }
        OpType::Flatten => node.with_attr(AttributeProto::int("axis", downcast::<Flatten>(op)?.axis as i64)),
        OpType::SoftMax => node.with_attr(AttributeProto::int("axis", downcast::<SoftMax>(op)?.axis as i64)),
        OpType::Concat => node.with_attr(AttributeProto::int("axis", downcast::<Concat>(op)?.axis as i64)),
        OpType::LeakyRelu => node.with_attr(AttributeProto::float("alpha", downcast::<LeakyRelu>(op)?.alpha)),
        OpType::Elu => node.with_attr(AttributeProto::float("alpha", downcast::<Elu>(op)?.alpha)),
        OpType::SeLU => {
            let selu = downcast::<SeLU>(op)?;
            node.with_attr(AttributeProto::float("alpha", selu.alpha))
                .with_attr(AttributeProto::float("gamma", selu.gamma))
        }
        OpType::HardSigmoid => {
            let hs = downcast::<HardSigmoid>(op)?;
            node.with_attr(AttributeProto::float("alpha", hs.alpha))
                .with_attr(AttributeProto::float("beta", hs.gamma))
        }
        OpType::Transpose => match &downcast::<Transpose>(op)?.perm {
            Some(perm) => node.with_attr(AttributeProto::ints("perm", perm.iter().map(|&p| p as i64).collect())),
            None => node,
        },
        OpType::ReduceSum => {
            let r = downcast::<ReduceSum>(op)?;
            reduce_attributes(node, &r.axes, r.keepdims)
        }
        OpType::ReduceMean => {
            let r = downcast::<ReduceMean>(op)?;
            reduce_attributes(node, &r.axes, r.keepdims)
        }
        OpType::ConstantOfShape => {
            let value = downcast::<ConstantOfShape>(op)?.value;
            node.with_attr(AttributeProto::tensor("value", TensorProto::from_f32("value", &[1], vec![value])))
        }
        OpType::Dropout => node.with_attr(AttributeProto::float("ratio", downcast::<Dropout>(op)?.ratio)),
        OpType::Gemm => {
            let gemm = downcast::<Gemm>(op)?;
            node.with_attr(AttributeProto::float("alpha", gemm.alpha))
                .with_attr(AttributeProto::float("beta", gemm.beta))
                .with_attr(AttributeProto::int("transA", gemm.trans_a as i64))
                .with_attr(AttributeProto::int("transB", gemm.trans_b as i64))
        }
        _ => node,
    };
    Ok(node)
}

/// `pads` is `[h_begin, w_begin, h_end, w_end]`, folding the odd padding in.
fn window_attributes(node: NodeProto, kernel: [usize; 2], stride: [usize; 2], padding: [usize; 2], odd: [usize; 4]) -> NodeProto {
    let pads = [padding[0] + odd[0], padding[1] + odd[1], padding[0] + odd[2], padding[1] + odd[3]];
    node.with_attr(AttributeProto::ints("kernel_shape", kernel.iter().map(|&k| k as i64).collect()))
        .with_attr(AttributeProto::ints("pads", pads.iter().map(|&p| p as i64).collect()))
        .with_attr(AttributeProto::ints("strides", stride.iter().map(|&s| s as i64).collect()))
}

fn reduce_attributes(node: NodeProto, axes: &Option<Vec<isize>>, keepdims: bool) -> NodeProto {
    let node = match axes {
        Some(axes) => node.with_attr(AttributeProto::ints("axes", axes.iter().map(|&a| a as i64).collect())),
        None => node,
    };
    node.with_attr(AttributeProto::int("keepdims", keepdims as i64))
}

//! Importer: turns an interchange document into a replayable sequence of
//! prepared operators over the autograd engine.

use crate::{
    builder::{build, ForwardFn, Handle},
    checker::check_graph,
    optimizer::optimize,
    proto::{ModelProto, NodeProto, ValueInfoProto},
};
use std::{collections::HashMap, fmt};
use tessel_autograd::{Mode, Tensor};
use tessel_core::{
    device::Device,
    error::{Error, Result},
};
use tessel_tensor::RawTensor;

/// Default-domain operator set version the builders follow.
pub const KNOWN_OPSET_VERSION: i64 = 11;

/// One node resolved to a native operator.
pub struct PreparedOp {
    pub name: String,
    pub node: NodeProto,
    pub handle: Option<Handle>,
    /// Inputs folded into the operator when it was built.
    pub consumed: Vec<String>,
    forward: ForwardFn,
}

impl PreparedOp {
    pub fn forward(&self, xs: &[Tensor], mode: Mode) -> Result<Vec<Tensor>> {
        (self.forward)(xs, mode)
    }

    /// Names of the inputs fed to `forward` at run time.
    pub fn active_inputs(&self) -> impl Iterator<Item = &str> {
        self.node
            .input
            .iter()
            .filter(|name| !name.is_empty() && !self.consumed.contains(*name))
            .map(String::as_str)
    }
}

impl fmt::Debug for PreparedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedOp")
            .field("name", &self.name)
            .field("op_type", &self.node.op_type)
            .field("handle", &self.handle)
            .field("consumed", &self.consumed)
            .finish()
    }
}

/// Replay configuration for [`GraphRep::run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Executes only the first `n` prepared operators.
    pub last_layers: Option<usize>,
    pub all_outputs: bool,
    pub op_name: Option<String>,
    pub mode: Mode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            last_layers: None,
            all_outputs: false,
            op_name: None,
            mode: Mode::Eval,
        }
    }
}

impl RunOptions {
    pub fn with_last_layers(mut self, n: usize) -> Self {
        self.last_layers = Some(n);
        self
    }

    pub fn with_all_outputs(mut self, all_outputs: bool) -> Self {
        self.all_outputs = all_outputs;
        self
    }

    pub fn with_op_name(mut self, name: impl Into<String>) -> Self {
        self.op_name = Some(name.into());
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Clone)]
pub enum RunOutput {
    /// Outputs of the last executed operator, or the graph outputs after a full run.
    Last(Vec<Tensor>),
    /// Every value computed in this run, in execution order.
    All(Vec<(String, Tensor)>),
    Named(Tensor),
}

impl RunOutput {
    pub fn into_tensors(self) -> Vec<Tensor> {
        match self {
            RunOutput::Last(ys) => ys,
            RunOutput::All(named) => named.into_iter().map(|(_, y)| y).collect(),
            RunOutput::Named(y) => vec![y],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RunOutput::Last(ys) => ys.len(),
            RunOutput::All(named) => named.len(),
            RunOutput::Named(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An imported graph: the values computed while preparing it plus the
/// prepared operators, replayable with fresh inputs.
#[derive(Debug)]
pub struct GraphRep {
    model: ModelProto,
    device: Device,
    tensor_map: HashMap<String, Tensor>,
    weights: Vec<String>,
    ops: Vec<PreparedOp>,
    opset_version: i64,
}

impl GraphRep {
    /// Runs the prepared operators on `inputs`, bound to the graph inputs
    /// without an initializer in declaration order.
    pub fn run(&self, inputs: &[Tensor], options: &RunOptions) -> Result<RunOutput> {
        let declared: Vec<&ValueInfoProto> = self.model.graph.runtime_inputs().collect();
        if inputs.len() != declared.len() {
            return Err(Error::Runtime(format!(
                "graph {} takes {} inputs, got {}",
                self.model.graph.name,
                declared.len(),
                inputs.len()
            )));
        }

        let mut computed: HashMap<String, Tensor> = HashMap::new();
        for (info, x) in declared.into_iter().zip(inputs) {
            check_declared_shape(info, x.shape())?;
            let bound = if x.device() == self.device {
                x.clone()
            } else {
                Tensor::new(x.data().to_device(self.device)?).named(info.name.clone())
            };
            computed.insert(info.name.clone(), bound);
        }

        let count = options.last_layers.unwrap_or(self.ops.len()).min(self.ops.len());
        let mut order: Vec<(String, Tensor)> = Vec::new();
        let mut last: Vec<Tensor> = Vec::new();
        for op in &self.ops[..count] {
            let xs = op
                .active_inputs()
                .map(|name| {
                    self.resolve(&computed, name)
                        .ok_or_else(|| Error::Runtime(format!("input {} of {} is not available", name, op.name)))
                })
                .collect::<Result<Vec<_>>>()?;
            let ys = op.forward(&xs, options.mode)?;
            log::debug!("ran {} ({})", op.name, op.node.op_type);
            for (name, y) in op.node.output.iter().zip(&ys) {
                computed.insert(name.clone(), y.clone());
                order.push((name.clone(), y.clone()));
            }
            last = ys;
        }

        if let Some(name) = &options.op_name {
            return self
                .resolve(&computed, name)
                .map(RunOutput::Named)
                .ok_or_else(|| Error::Runtime(format!("{} was not computed by this run", name)));
        }
        if options.all_outputs {
            return Ok(RunOutput::All(order));
        }
        if count == self.ops.len() {
            let ys = self
                .model
                .graph
                .output
                .iter()
                .map(|y| {
                    self.resolve(&computed, &y.name)
                        .ok_or_else(|| Error::Runtime(format!("graph output {} was not computed", y.name)))
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(RunOutput::Last(ys));
        }
        Ok(RunOutput::Last(last))
    }

    /// A value bound or computed by the current run, or a weight. Values left
    /// over from `prepare` are never returned.
    fn resolve(&self, computed: &HashMap<String, Tensor>, name: &str) -> Option<Tensor> {
        computed
            .get(name)
            .or_else(|| {
                if self.weights.iter().any(|w| w == name) {
                    self.tensor_map.get(name)
                } else {
                    None
                }
            })
            .cloned()
    }

    /// A value computed while preparing, or a weight.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensor_map.get(name)
    }

    pub fn ops(&self) -> &[PreparedOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Initializer-backed tensors in document order.
    pub fn weights(&self) -> Vec<(&str, &Tensor)> {
        self.weights
            .iter()
            .filter_map(|name| self.tensor_map.get(name).map(|t| (name.as_str(), t)))
            .collect()
    }

    pub fn model(&self) -> &ModelProto {
        &self.model
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn opset_version(&self) -> i64 {
        self.opset_version
    }
}

fn check_declared_shape(info: &ValueInfoProto, shape: &[usize]) -> Result<()> {
    let matches = info.shape.len() == shape.len()
        && info
            .shape
            .iter()
            .zip(shape)
            .all(|(&declared, &actual)| declared <= 0 || declared as usize == actual);
    if matches {
        Ok(())
    } else {
        Err(Error::shape(format!(
            "input {} is declared as {:?}, got {:?}",
            info.name, info.shape, shape
        )))
    }
}

/// Entry points of the importer.
pub struct Backend;

impl Backend {
    /// Validates `model`, builds one operator per node and executes each
    /// once to fill the value map.
    pub fn prepare(model: ModelProto, device: Device) -> Result<GraphRep> {
        let opset_version = resolve_opset(&model)?;
        let model = optimize(model);
        check_graph(&model.graph)?;

        let mut tensor_map: HashMap<String, Tensor> = HashMap::new();
        let mut weights: Vec<String> = Vec::new();
        let graph = &model.graph;
        for info in &graph.input {
            let tensor = match graph.initializer(&info.name) {
                Some(init) => {
                    weights.push(info.name.clone());
                    Tensor::parameter(init.to_raw()?.to_device(device)?)
                }
                None => Tensor::new(synthesize(info)?.to_device(device)?),
            };
            tensor_map.insert(info.name.clone(), tensor.named(info.name.clone()));
        }
        for init in &graph.initializer {
            if !tensor_map.contains_key(&init.name) {
                weights.push(init.name.clone());
                let tensor = Tensor::parameter(init.to_raw()?.to_device(device)?).named(init.name.clone());
                tensor_map.insert(init.name.clone(), tensor);
            }
        }

        let mut ops = Vec::with_capacity(graph.node.len());
        for (idx, node) in graph.node.iter().enumerate() {
            let op = prepare_node(node, idx, &tensor_map)?;
            let xs = op
                .active_inputs()
                .map(|name| lookup(&tensor_map, name, &op.name))
                .collect::<Result<Vec<_>>>()?;
            let ys = op.forward(&xs, Mode::Eval)?;
            log::debug!(
                "prepared {} ({}) -> {:?}",
                op.name,
                node.op_type,
                ys.iter().map(|y| y.shape().to_vec()).collect::<Vec<_>>()
            );
            for (name, y) in node.output.iter().zip(ys) {
                tensor_map.insert(name.clone(), y);
            }
            ops.push(op);
        }

        Ok(GraphRep {
            model,
            device,
            tensor_map,
            weights,
            ops,
            opset_version,
        })
    }

    /// Builds and runs a single node. `inputs` match the node's non-empty
    /// input names in order.
    pub fn run_node(node: &NodeProto, inputs: &[Tensor], mode: Mode) -> Result<Vec<Tensor>> {
        let named: Vec<&String> = node.input.iter().filter(|n| !n.is_empty()).collect();
        if named.len() != inputs.len() {
            return Err(Error::InvalidArgument(format!(
                "{} ({}) takes {} inputs, got {}",
                node.name,
                node.op_type,
                named.len(),
                inputs.len()
            )));
        }
        let map: HashMap<String, Tensor> = named.into_iter().cloned().zip(inputs.iter().cloned()).collect();
        let op = prepare_node(node, 0, &map)?;
        let xs = op
            .active_inputs()
            .map(|name| lookup(&map, name, &op.name))
            .collect::<Result<Vec<_>>>()?;
        op.forward(&xs, mode)
    }
}

pub fn prepare(model: ModelProto, device: Device) -> Result<GraphRep> {
    Backend::prepare(model, device)
}

pub fn run_node(node: &NodeProto, inputs: &[Tensor], mode: Mode) -> Result<Vec<Tensor>> {
    Backend::run_node(node, inputs, mode)
}

fn lookup(map: &HashMap<String, Tensor>, name: &str, op: &str) -> Result<Tensor> {
    map.get(name)
        .cloned()
        .ok_or_else(|| Error::Runtime(format!("input {} of {} has not been computed", name, op)))
}

fn prepare_node(node: &NodeProto, idx: usize, map: &HashMap<String, Tensor>) -> Result<PreparedOp> {
    let name = if node.name.is_empty() {
        format!("{}_{}", node.op_type, idx)
    } else {
        node.name.clone()
    };
    let values = node
        .input
        .iter()
        .map(|input| {
            if input.is_empty() {
                Ok(None)
            } else {
                lookup(map, input, &name).map(Some)
            }
        })
        .collect::<Result<Vec<_>>>()?;
    let built = build(node, &values)?;
    Ok(PreparedOp {
        name,
        node: node.clone(),
        handle: built.handle,
        consumed: built.consumed,
        forward: built.forward,
    })
}

/// Random normal payload for an input with no initializer. Unknown or
/// non-positive dims become 1.
fn synthesize(info: &ValueInfoProto) -> Result<RawTensor> {
    let shape: Vec<usize> = info.shape.iter().map(|&d| if d > 0 { d as usize } else { 1 }).collect();
    RawTensor::randn(&shape)
}

/// Version of the default-domain operator set. A mismatch with
/// [`KNOWN_OPSET_VERSION`] or an unknown domain only warns.
fn resolve_opset(model: &ModelProto) -> Result<i64> {
    for opset in &model.opset_import {
        if !opset.domain.is_empty() && opset.domain != "ai.onnx" {
            log::warn!("unrecognized operator set domain {} (version {})", opset.domain, opset.version);
        }
    }
    match model.default_opset() {
        Some(version) => {
            if version != KNOWN_OPSET_VERSION {
                log::warn!(
                    "model uses operator set version {}, operators follow version {}",
                    version,
                    KNOWN_OPSET_VERSION
                );
            }
            Ok(version)
        }
        None if model.ir_version >= 3 => Err(Error::Runtime(format!(
            "model with IR version {} declares no default operator set",
            model.ir_version
        ))),
        None => Ok(1),
    }
}

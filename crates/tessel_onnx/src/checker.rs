//! Structural validation of interchange documents.

use crate::proto::{GraphProto, ModelProto};
use std::collections::HashSet;
use tessel_core::error::{Error, Result};

fn invalid(message: String) -> Error {
    Error::Runtime(format!("invalid model: {}", message))
}

/// Checks the opset declaration and then the graph.
pub fn check_model(model: &ModelProto) -> Result<()> {
    if model.default_opset().is_none() {
        return Err(invalid("no default-domain operator set declared".into()));
    }
    check_graph(&model.graph)
}

/// Node names and outputs are unique, every input is defined before it is
/// used, graph outputs are produced, and initializer payloads match their
/// declared shapes.
pub fn check_graph(graph: &GraphProto) -> Result<()> {
    let mut defined: HashSet<&str> = HashSet::new();
    for x in &graph.input {
        if !defined.insert(&x.name) {
            return Err(invalid(format!("graph input {} declared twice", x.name)));
        }
    }
    for init in &graph.initializer {
        if init.payload_len() != init.element_count()? {
            return Err(invalid(format!(
                "initializer {} declares dims {:?} but stores {} values",
                init.name,
                init.dims,
                init.payload_len()
            )));
        }
        defined.insert(&init.name);
    }

    let mut node_names: HashSet<&str> = HashSet::new();
    for node in &graph.node {
        if node.op_type.is_empty() {
            return Err(invalid(format!("node {} has no op type", node.name)));
        }
        if !node.name.is_empty() && !node_names.insert(&node.name) {
            return Err(invalid(format!("duplicate node name {}", node.name)));
        }
        for input in node.input.iter().filter(|i| !i.is_empty()) {
            if !defined.contains(input.as_str()) {
                return Err(invalid(format!("input {} of node {} is not defined before use", input, node.name)));
            }
        }
        for output in node.output.iter().filter(|o| !o.is_empty()) {
            if !defined.insert(output) {
                return Err(invalid(format!("value {} is produced more than once", output)));
            }
        }
    }

    for y in &graph.output {
        if !defined.contains(y.name.as_str()) {
            return Err(invalid(format!("graph output {} is never produced", y.name)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{ElemType, NodeProto, TensorProto, ValueInfoProto};

    fn graph() -> GraphProto {
        let mut relu = NodeProto::new("relu", "Relu");
        relu.input.push("x".into());
        relu.output.push("y".into());
        GraphProto {
            name: "g".into(),
            node: vec![relu],
            input: vec![ValueInfoProto::new("x", ElemType::Float, &[2])],
            output: vec![ValueInfoProto::new("y", ElemType::Float, &[2])],
            initializer: Vec::new(),
        }
    }

    #[test]
    fn accepts_a_well_formed_graph() -> Result<()> {
        check_model(&ModelProto::new(graph()))
    }

    #[test]
    fn rejects_use_before_definition() {
        let mut g = graph();
        g.node[0].input[0] = "z".into();
        assert!(matches!(check_graph(&g), Err(Error::Runtime(_))));
    }

    #[test]
    fn rejects_missing_output_and_bad_payload() {
        let mut g = graph();
        g.output[0].name = "w".into();
        assert!(check_graph(&g).is_err());

        let mut g = graph();
        g.initializer.push(TensorProto::from_f32("x", &[2], vec![1.0]));
        assert!(check_graph(&g).is_err());
    }

    #[test]
    fn rejects_missing_opset() {
        let mut model = ModelProto::new(graph());
        model.opset_import.clear();
        assert!(check_model(&model).is_err());
    }
}

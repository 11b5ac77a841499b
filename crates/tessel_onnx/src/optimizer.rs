use crate::proto::ModelProto;
use std::collections::HashSet;

/// Dead-node elimination: drops every node none of whose outputs is needed,
/// directly or transitively, by a graph output.
pub fn optimize(mut model: ModelProto) -> ModelProto {
    let graph = &mut model.graph;
    let mut needed: HashSet<String> = graph.output.iter().map(|y| y.name.clone()).collect();
    let mut keep = vec![false; graph.node.len()];

    for (i, node) in graph.node.iter().enumerate().rev() {
        if node.output.iter().any(|o| needed.contains(o)) {
            keep[i] = true;
            needed.extend(node.input.iter().filter(|x| !x.is_empty()).cloned());
        }
    }

    let before = graph.node.len();
    let mut flags = keep.into_iter();
    graph.node.retain(|_| flags.next().unwrap_or(false));
    if graph.node.len() != before {
        log::debug!("optimizer removed {} dead nodes", before - graph.node.len());
    }
    model
}

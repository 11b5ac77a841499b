use crate::operation::{OpId, OpNode};
use std::{collections::HashMap, sync::Arc};

/// Consumer-edge counts for every non-placeholder operation reachable from a
/// terminal operation. Nodes live in an arena addressed by integer handles.
#[derive(Debug, Default)]
pub struct Dependency {
    nodes: Vec<Arc<OpNode>>,
    index: HashMap<OpId, usize>,
    counts: Vec<usize>,
}

impl Dependency {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn handle(&self, op: OpId) -> Option<usize> {
        self.index.get(&op).copied()
    }

    pub fn count(&self, op: OpId) -> Option<usize> {
        self.handle(op).map(|h| self.counts[h])
    }

    pub fn node(&self, handle: usize) -> Option<&Arc<OpNode>> {
        self.nodes.get(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<OpNode>, usize)> {
        self.nodes.iter().zip(self.counts.iter().copied())
    }

    /// Decrements and returns the remaining count.
    pub(crate) fn release(&mut self, op: OpId) -> Option<usize> {
        let h = self.handle(op)?;
        self.counts[h] = self.counts[h].saturating_sub(1);
        Some(self.counts[h])
    }

    fn insert(&mut self, node: &Arc<OpNode>) -> (usize, bool) {
        if let Some(&h) = self.index.get(&node.id()) {
            return (h, false);
        }
        let h = self.nodes.len();
        self.nodes.push(Arc::clone(node));
        self.counts.push(0);
        self.index.insert(node.id(), h);
        (h, true)
    }
}

/// Counts, for each operation reachable from `op`, how many input bindings
/// consume one of its outputs. Placeholders are skipped and `op` itself is
/// not counted.
pub fn infer_dependency(op: &Arc<OpNode>) -> Dependency {
    let mut deps = Dependency::default();
    let mut stack = vec![Arc::clone(op)];

    while let Some(cur) = stack.pop() {
        for binding in cur.src() {
            let src = &binding.creator;
            if src.is_dummy() {
                continue;
            }
            let (h, fresh) = deps.insert(src);
            deps.counts[h] += 1;
            if fresh {
                stack.push(Arc::clone(src));
            }
        }
    }
    log::debug!("dependency of {}: {} operations", op.name(), deps.len());
    deps
}

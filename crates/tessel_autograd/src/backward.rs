use crate::{
    dependency::{infer_dependency, Dependency},
    operation::{OpId, OpNode},
    tensor::{Tensor, TensorId},
};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tessel_core::{
    dtype::DType,
    error::{Error, Result},
};
use tessel_tensor::RawTensor;

/// Initial output gradient.
#[derive(Debug, Clone)]
pub enum Seed {
    Scalar(f32),
    Tensor(RawTensor),
}

impl From<f32> for Seed {
    fn from(value: f32) -> Self {
        Seed::Scalar(value)
    }
}

impl From<RawTensor> for Seed {
    fn from(value: RawTensor) -> Self {
        Seed::Tensor(value)
    }
}

impl From<&Tensor> for Seed {
    fn from(value: &Tensor) -> Self {
        Seed::Tensor(value.data().clone())
    }
}

/// Lazy reverse traversal. Yields `(tensor, gradient)` for every tensor on the
/// path that stores gradients. A tensor consumed by several operations is
/// yielded once per consumer with the running total; the last pair carries
/// the complete gradient.
pub struct Backward {
    deps: Dependency,
    ready: VecDeque<(Arc<OpNode>, Vec<RawTensor>)>,
    not_ready: HashMap<OpId, Vec<Option<RawTensor>>>,
    pending: VecDeque<(Tensor, Tensor)>,
    failed: bool,
}

/// Starts backpropagation from the one-element tensor `y`.
pub fn backward(y: &Tensor, dy: Option<Seed>) -> Result<Backward> {
    if y.size() != 1 {
        return Err(Error::shape(format!(
            "backward needs a one-element output, got shape {:?}",
            y.shape()
        )));
    }
    let dy = match dy.unwrap_or(Seed::Scalar(1.0)) {
        Seed::Scalar(v) => RawTensor::from_vec(vec![v], y.shape())?,
        Seed::Tensor(t) if t.size() == 1 => t.to_dtype(DType::F32)?.reshape(y.shape())?,
        Seed::Tensor(t) => {
            return Err(Error::shape(format!(
                "seed gradient must hold one element, got shape {:?}",
                t.shape()
            )))
        }
    };

    let creator = Arc::clone(y.creator());
    let deps = infer_dependency(&creator);
    log::debug!("backward from {} over {} operations", creator.name(), deps.len());

    let mut pending = VecDeque::new();
    if y.stores_grad() {
        pending.push_back((y.clone(), grad_tensor(&creator, 0, dy.clone())));
    }
    let mut ready = VecDeque::new();
    if creator.requires_grad() && !creator.is_dummy() {
        ready.push_back((creator, vec![dy]));
    }

    Ok(Backward {
        deps,
        ready,
        not_ready: HashMap::new(),
        pending,
        failed: false,
    })
}

/// Runs the traversal to completion and keeps the final gradient per tensor.
pub fn gradients(y: &Tensor, dy: Option<Seed>) -> Result<HashMap<TensorId, Tensor>> {
    let mut grads = HashMap::new();
    for pair in backward(y, dy)? {
        let (x, dx) = pair?;
        grads.insert(x.id(), dx);
    }
    Ok(grads)
}

fn grad_tensor(op: &OpNode, idx: usize, g: RawTensor) -> Tensor {
    Tensor::new(g).named(format!("{}_g", op.output_name(idx)))
}

impl Backward {
    fn step(&mut self) -> Result<()> {
        let Some((op, dys)) = self.ready.pop_back() else {
            return Ok(());
        };
        let dxs = op.run_backward(&dys)?;

        for (binding, dx) in op.src().iter().zip(dxs) {
            let src = &binding.creator;
            if src.is_dummy() && !binding.stores_grad {
                continue;
            }
            let y_idx = src.y_index(binding.input_id).ok_or_else(|| {
                Error::Runtime(format!("{} does not produce an input of {}", src.name(), op.name()))
            })?;

            let slots = self
                .not_ready
                .entry(src.id())
                .or_insert_with(|| vec![None; src.num_outputs()]);
            if let Some(dx) = dx {
                slots[y_idx] = Some(match slots[y_idx].take() {
                    Some(acc) => acc.add(&dx)?,
                    None => dx,
                });
            }

            if let (Some(x), Some(g)) = (&binding.retained, &slots[y_idx]) {
                self.pending.push_back((x.clone(), grad_tensor(src, y_idx, g.clone())));
            }

            if src.is_dummy() {
                continue;
            }
            if self.deps.release(src.id()) == Some(0) {
                let slots = self.not_ready.remove(&src.id()).unwrap_or_default();
                if src.requires_grad() {
                    let dys = slots
                        .into_iter()
                        .zip(src.y_shapes())
                        .map(|(g, shape)| g.unwrap_or_else(|| RawTensor::zeros(shape)))
                        .collect();
                    self.ready.push_back((Arc::clone(src), dys));
                }
            }
        }
        Ok(())
    }
}

impl Iterator for Backward {
    type Item = Result<(Tensor, Tensor)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.pending.pop_front() {
                return Some(Ok(pair));
            }
            if self.failed || self.ready.is_empty() {
                return None;
            }
            if let Err(e) = self.step() {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}

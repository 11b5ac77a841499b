use super::{apply, cached, expect_grads, expect_inputs};
use crate::{
    mode::Mode,
    operation::{OpType, Operation},
    tensor::Tensor,
};
use tessel_core::{
    error::{Error, Result},
    layout::Layout,
};
use tessel_tensor::RawTensor;

/// Reshape to a target where `0` copies the input extent and `-1` is inferred.
pub struct Reshape {
    pub shape: Vec<i64>,
    in_shape: Option<Vec<usize>>,
}

impl Reshape {
    pub fn new(shape: Vec<i64>) -> Self {
        Self { shape, in_shape: None }
    }
}

impl Operation for Reshape {
    fn op_type(&self) -> OpType {
        OpType::Reshape
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "Reshape")?[0];
        let shape = x.resolve_shape(&self.shape)?;
        self.in_shape = Some(x.shape().to_vec());
        Ok(vec![x.reshape(&shape)?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Reshape")?;
        Ok(vec![Some(dy.reshape(cached(&self.in_shape, "Reshape")?)?)])
    }
}

/// Collapses to 2-D around `axis` (negative counts from the end).
pub struct Flatten {
    pub axis: isize,
    in_shape: Option<Vec<usize>>,
}

impl Flatten {
    pub fn new(axis: isize) -> Self {
        Self { axis, in_shape: None }
    }
}

impl Operation for Flatten {
    fn op_type(&self) -> OpType {
        OpType::Flatten
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "Flatten")?[0];
        let axis = if self.axis < 0 { self.axis + x.ndim() as isize } else { self.axis };
        if axis < 0 {
            return Err(Error::DimensionOutOfBounds {
                dim: self.axis,
                ndim: x.ndim(),
            });
        }
        self.in_shape = Some(x.shape().to_vec());
        Ok(vec![x.flatten(axis as usize)?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Flatten")?;
        Ok(vec![Some(dy.reshape(cached(&self.in_shape, "Flatten")?)?)])
    }
}

/// Axis permutation; without `perm` the axes are reversed.
pub struct Transpose {
    pub perm: Option<Vec<usize>>,
    applied: Option<Vec<usize>>,
}

impl Transpose {
    pub fn new(perm: Option<Vec<usize>>) -> Self {
        Self { perm, applied: None }
    }
}

impl Operation for Transpose {
    fn op_type(&self) -> OpType {
        OpType::Transpose
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "Transpose")?[0];
        let perm = self.perm.clone().unwrap_or_else(|| (0..x.ndim()).rev().collect());
        let y = x.transpose(&perm)?;
        self.applied = Some(perm);
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Transpose")?;
        let perm = cached(&self.applied, "Transpose")?;
        let mut inverse = vec![0; perm.len()];
        for (i, &p) in perm.iter().enumerate() {
            inverse[p] = i;
        }
        Ok(vec![Some(dy.transpose(&inverse)?)])
    }
}

pub struct Concat {
    pub axis: isize,
    cache: Option<(usize, Vec<usize>)>,
}

impl Concat {
    pub fn new(axis: isize) -> Self {
        Self { axis, cache: None }
    }
}

impl Operation for Concat {
    fn op_type(&self) -> OpType {
        OpType::Concat
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let first = xs
            .first()
            .ok_or_else(|| Error::InvalidArgument("Concat of no inputs".to_string()))?;
        let axis = Layout::normalize_axis(self.axis, first.ndim())?;
        let refs: Vec<&RawTensor> = xs.iter().collect();
        let y = RawTensor::concat(&refs, axis)?;
        self.cache = Some((axis, xs.iter().map(|x| x.shape()[axis]).collect()));
        Ok(vec![y])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let dy = expect_grads(dys, "Concat")?;
        let (axis, extents) = cached(&self.cache, "Concat")?;
        let mut start = 0;
        let mut dxs = Vec::with_capacity(extents.len());
        for &len in extents {
            dxs.push(Some(dy.slice_axis(*axis, start, len)?));
            start += len;
        }
        Ok(dxs)
    }
}

/// The input's shape as a 1-D integer tensor.
#[derive(Default)]
pub struct Shape;

impl Operation for Shape {
    fn op_type(&self) -> OpType {
        OpType::Shape
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &expect_inputs(xs, 1, "Shape")?[0];
        let dims: Vec<i32> = x.shape().iter().map(|&d| d as i32).collect();
        let len = dims.len();
        Ok(vec![RawTensor::from_vec(dims, &[len])?])
    }

    fn backward(&self, _dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        Ok(vec![None])
    }
}

/// A tensor filled with `value`, shaped by the 1-D input.
pub struct ConstantOfShape {
    pub value: f32,
}

impl ConstantOfShape {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl Operation for ConstantOfShape {
    fn op_type(&self) -> OpType {
        OpType::ConstantOfShape
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let shape_tensor = &expect_inputs(xs, 1, "ConstantOfShape")?[0];
        let shape = shape_tensor
            .to_vec_i32()
            .into_iter()
            .map(|d| {
                usize::try_from(d).map_err(|_| Error::shape(format!("negative extent {} in ConstantOfShape", d)))
            })
            .collect::<Result<Vec<_>>>()?;
        let size: usize = shape.iter().product();
        Ok(vec![RawTensor::from_vec(vec![self.value; size], &shape)?])
    }

    fn backward(&self, _dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        Ok(vec![None])
    }
}

// functional

pub fn reshape(x: &Tensor, shape: &[i64]) -> Result<Tensor> {
    apply(Reshape::new(shape.to_vec()), &[x], Mode::Train)
}

pub fn flatten(x: &Tensor, axis: isize) -> Result<Tensor> {
    apply(Flatten::new(axis), &[x], Mode::Train)
}

pub fn transpose(x: &Tensor, perm: Option<&[usize]>) -> Result<Tensor> {
    apply(Transpose::new(perm.map(|p| p.to_vec())), &[x], Mode::Train)
}

pub fn concat(xs: &[&Tensor], axis: isize) -> Result<Tensor> {
    apply(Concat::new(axis), xs, Mode::Train)
}

pub fn shape(x: &Tensor) -> Result<Tensor> {
    apply(Shape, &[x], Mode::Train)
}

pub fn constant_of_shape(shape: &Tensor, value: f32) -> Result<Tensor> {
    apply(ConstantOfShape::new(value), &[shape], Mode::Train)
}

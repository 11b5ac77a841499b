//! Concrete operators and their functional wrappers.

pub mod activation;
pub mod arithmetic;
pub mod constant;
pub mod logical;
pub mod loss;
pub mod nn;
pub mod reduce;
pub mod shape;

pub use activation::*;
pub use arithmetic::*;
pub use logical::*;
pub use loss::*;
pub use nn::*;
pub use reduce::*;
pub use shape::*;

use crate::{mode::Mode, operation::call, operation::Operation, tensor::Tensor};
use tessel_core::error::{Error, Result};
use tessel_tensor::RawTensor;

/// Runs a single-output operator.
pub(crate) fn apply<O: Operation + 'static>(op: O, inputs: &[&Tensor], mode: Mode) -> Result<Tensor> {
    call(op, inputs, mode)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::internal("operation produced no output"))
}

pub(crate) fn expect_inputs<'a>(xs: &'a [RawTensor], n: usize, op: &str) -> Result<&'a [RawTensor]> {
    if xs.len() != n {
        return Err(Error::InvalidArgument(format!("{} expects {} inputs, got {}", op, n, xs.len())));
    }
    Ok(xs)
}

pub(crate) fn expect_grads<'a>(dys: &'a [RawTensor], op: &str) -> Result<&'a RawTensor> {
    dys.first()
        .ok_or_else(|| Error::Runtime(format!("{} backward called without output gradient", op)))
}

pub(crate) fn cached<'a, T>(slot: &'a Option<T>, op: &str) -> Result<&'a T> {
    slot.as_ref()
        .ok_or_else(|| Error::Runtime(format!("{} backward called before forward", op)))
}

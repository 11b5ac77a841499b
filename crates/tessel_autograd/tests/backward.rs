mod utils;

use tessel_autograd::{
    backward, call, gradients, infer_dependency,
    ops::{add, matmul, mul, reduce_sum, relu, sigmoid},
    Mode, OpType, Operation, Seed,
};
use tessel_core::error::{Error, Result};
use tessel_tensor::RawTensor;
use utils::{setup_grad_tensor, setup_tensor};

#[test]
fn relu_matmul_weight_gradient() -> Result<()> {
    let x = setup_tensor(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])?;
    let w = setup_grad_tensor(
        vec![1.0, -1.0, 0.5, -0.5, 1.0, -1.0, 0.5, -0.5, 1.0, -1.0, 0.5, -0.5],
        &[3, 4],
    )?;
    let z = relu(&matmul(&x, &w)?)?;
    let loss = reduce_sum(&z, None, false)?;

    let grads = loss.backward()?;
    let dw = &grads[&w.id()];
    assert_eq!(dw.shape(), &[3, 4]);
    assert_eq!(
        dw.to_vec_f32(),
        vec![5.0, 0.0, 5.0, 0.0, 7.0, 0.0, 7.0, 0.0, 9.0, 0.0, 9.0, 0.0]
    );
    assert!(!grads.contains_key(&x.id()));
    Ok(())
}

#[test]
fn fan_out_accumulates() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0, 3.0], &[3])?;
    let y = reduce_sum(&add(&x, &x)?, None, false)?;
    assert_eq!(y.backward()?[&x.id()].to_vec_f32(), vec![2.0, 2.0, 2.0]);

    let y = reduce_sum(&mul(&x, &x)?, None, false)?;
    assert_eq!(y.backward()?[&x.id()].to_vec_f32(), vec![2.0, 4.0, 6.0]);
    Ok(())
}

#[test]
fn running_totals_are_yielded_per_consumer() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0, 3.0], &[3])?;
    let y = reduce_sum(&mul(&x, &x)?, None, false)?;

    let yielded: Vec<Vec<f32>> = backward(&y, None)?
        .map(|pair| pair.map(|(t, g)| {
            assert_eq!(t.id(), x.id());
            g.to_vec_f32()
        }))
        .collect::<Result<_>>()?;
    assert_eq!(yielded, vec![vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 6.0]]);
    Ok(())
}

#[test]
fn shared_subexpression_is_backpropagated_once() -> Result<()> {
    let x = setup_tensor(vec![0.5, -1.0], &[1, 2])?;
    let w = setup_grad_tensor(vec![1.0, 2.0, 3.0, 4.0], &[2, 2])?;
    let h = matmul(&x, &w)?;
    let y = reduce_sum(&add(&relu(&h)?, &sigmoid(&h)?)?, None, false)?;

    let deps = infer_dependency(y.creator());
    assert_eq!(deps.len(), 4);
    assert_eq!(deps.count(h.creator().id()), Some(2));
    assert!(deps.iter().all(|(op, _)| op.op_type() != OpType::Dummy));
    assert_eq!(deps.count(y.creator().id()), None);

    let grads = y.backward()?;
    let hv = h.to_vec_f32();
    let dh: Vec<f32> = hv
        .iter()
        .map(|&v| {
            let s = 1.0 / (1.0 + (-v).exp());
            (if v > 0.0 { 1.0 } else { 0.0 }) + s * (1.0 - s)
        })
        .collect();
    let expected = vec![0.5 * dh[0], 0.5 * dh[1], -dh[0], -dh[1]];
    let dw = grads[&w.id()].to_vec_f32();
    for (a, e) in dw.iter().zip(&expected) {
        assert!((a - e).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn default_seed_equals_explicit_one() -> Result<()> {
    let x = setup_grad_tensor(vec![0.3, -0.7], &[2])?;
    let y = reduce_sum(&sigmoid(&x)?, None, false)?;
    let implicit = gradients(&y, None)?;
    let explicit = gradients(&y, Some(Seed::from(1.0)))?;
    assert_eq!(implicit[&x.id()].to_vec_f32(), explicit[&x.id()].to_vec_f32());

    let doubled = gradients(&y, Some(Seed::Tensor(RawTensor::from_vec(vec![2.0f32], &[1])?)))?;
    let a = implicit[&x.id()].to_vec_f32();
    let b = doubled[&x.id()].to_vec_f32();
    assert!(a.iter().zip(&b).all(|(a, b)| (2.0 * a - b).abs() < 1e-6));
    Ok(())
}

#[test]
fn non_scalar_output_is_rejected() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0], &[2])?;
    let y = relu(&x)?;
    assert!(matches!(backward(&y, None), Err(Error::InvalidShape { .. })));
    Ok(())
}

#[test]
fn output_that_stores_grad_is_yielded_first() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0], &[2])?;
    let y = reduce_sum(&x, None, false)?.with_stores_grad(true);
    let mut iter = backward(&y, None)?;
    let (first, g) = iter.next().ok_or_else(|| Error::Runtime("empty".into()))??;
    assert_eq!(first.id(), y.id());
    assert_eq!(g.to_vec_f32(), vec![1.0]);
    let (second, g) = iter.next().ok_or_else(|| Error::Runtime("empty".into()))??;
    assert_eq!(second.id(), x.id());
    assert_eq!(g.to_vec_f32(), vec![1.0, 1.0]);
    assert!(iter.next().is_none());
    Ok(())
}

#[test]
fn intermediate_tensor_can_store_grad() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, -2.0], &[2])?;
    let h = mul(&x, &x)?.with_stores_grad(true);
    let y = reduce_sum(&mul(&h, &h)?, None, false)?;
    let grads = y.backward()?;
    assert_eq!(grads[&h.id()].to_vec_f32(), vec![2.0, 8.0]);
    assert_eq!(grads[&x.id()].to_vec_f32(), vec![4.0, -32.0]);
    Ok(())
}

#[test]
fn leaf_without_requires_grad_gets_nothing() -> Result<()> {
    let x = setup_tensor(vec![1.0, 2.0], &[2])?;
    let y = reduce_sum(&x, None, false)?;
    assert!(y.backward()?.is_empty());
    Ok(())
}

#[test]
fn call_rejects_empty_inputs() {
    #[derive(Default)]
    struct Nothing;
    impl Operation for Nothing {
        fn op_type(&self) -> OpType {
            OpType::Sum
        }
    }
    assert!(matches!(call(Nothing, &[], Mode::Train), Err(Error::InvalidArgument(_))));
}

#[test]
fn unimplemented_forward_fails() -> Result<()> {
    struct Abstract;
    impl Operation for Abstract {
        fn op_type(&self) -> OpType {
            OpType::Sum
        }
    }
    let x = setup_tensor(vec![1.0], &[1])?;
    assert!(matches!(call(Abstract, &[&x], Mode::Train), Err(Error::NotImplemented(_))));
    Ok(())
}

/// Splits the last axis into two halves; two outputs.
#[derive(Default)]
struct SplitHalves {
    len: usize,
}

impl Operation for SplitHalves {
    fn op_type(&self) -> OpType {
        OpType::Concat
    }

    fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
        let x = &xs[0];
        self.len = x.shape()[0];
        let half = self.len / 2;
        Ok(vec![x.slice_axis(0, 0, half)?, x.slice_axis(0, half, self.len - half)?])
    }

    fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
        let refs: Vec<&RawTensor> = dys.iter().collect();
        Ok(vec![Some(RawTensor::concat(&refs, 0)?)])
    }
}

#[test]
fn unused_outputs_get_zero_gradients() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0, 3.0, 4.0], &[4])?;
    let halves = call(SplitHalves::default(), &[&x], Mode::Train)?;
    assert_eq!(halves.len(), 2);
    assert_eq!(halves[1].output_name(), format!("{}:1", halves[1].creator().name()));

    let y = reduce_sum(&mul(&halves[0], &halves[0])?, None, false)?;
    assert_eq!(y.backward()?[&x.id()].to_vec_f32(), vec![2.0, 4.0, 0.0, 0.0]);
    Ok(())
}

#[test]
fn gradient_count_mismatch_is_a_runtime_error() -> Result<()> {
    struct Broken;
    impl Operation for Broken {
        fn op_type(&self) -> OpType {
            OpType::Add
        }
        fn forward(&mut self, xs: &[RawTensor], _mode: Mode) -> Result<Vec<RawTensor>> {
            Ok(vec![xs[0].add(&xs[1])?])
        }
        fn backward(&self, dys: &[RawTensor]) -> Result<Vec<Option<RawTensor>>> {
            Ok(vec![Some(dys[0].clone())])
        }
    }
    let a = setup_grad_tensor(vec![1.0], &[1])?;
    let b = setup_grad_tensor(vec![2.0], &[1])?;
    let y = call(Broken, &[&a, &b], Mode::Train)?.remove(0);
    assert!(matches!(y.backward(), Err(Error::Runtime(_))));
    Ok(())
}

#[test]
fn leaf_names_follow_the_tensor() -> Result<()> {
    let x = setup_tensor(vec![1.0], &[1])?.named("input");
    assert_eq!(x.output_name(), "input");
    assert!(x.is_leaf());
    let y = relu(&x)?;
    assert!(y.creator().name().starts_with("ReLU#"));
    assert_eq!(y.output_name(), format!("{}:0", y.creator().name()));
    Ok(())
}

#[test]
fn naming_a_used_leaf_renames_its_bindings() -> Result<()> {
    let x = setup_tensor(vec![1.0, -1.0], &[2])?;
    let y = relu(&x)?;
    assert!(y.creator().src()[0].creator.name().starts_with("Dummy#"));

    let x = x.named("late");
    assert_eq!(x.output_name(), "late");
    assert_eq!(y.creator().src()[0].creator.name(), "late");
    Ok(())
}

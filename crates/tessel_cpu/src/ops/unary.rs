use rayon::prelude::*;

/// Applies `func` elementwise. `input` and `output` must have the same length.
pub fn map_f32<F>(input: &[f32], output: &mut [f32], func: F)
where
    F: Fn(f32) -> f32 + Sync + Send,
{
    output
        .par_iter_mut()
        .zip(input.par_iter())
        .for_each(|(out, &x)| *out = func(x));
}

macro_rules! unary_op {
    ($name:ident, $func:expr) => {
        paste::paste! {
            pub fn [<$name _f32>](input: &[f32], output: &mut [f32]) {
                map_f32(input, output, $func);
            }
        }
    };
}

macro_rules! unary_op_with_constant {
    ($name:ident, $func:expr) => {
        paste::paste! {
            pub fn [<$name _f32>](input: &[f32], constant: f32, output: &mut [f32]) {
                let func = $func;
                map_f32(input, output, |x| func(x, constant));
            }
        }
    };
}

unary_op!(neg, |x: f32| -x);
unary_op!(abs, |x: f32| x.abs());
unary_op!(sign, |x: f32| if x > 0.0 {
    1.0
} else if x < 0.0 {
    -1.0
} else {
    0.0
});
unary_op!(sqrt, |x: f32| x.sqrt());
unary_op!(exp, |x: f32| x.exp());
unary_op!(log, |x: f32| x.ln());
unary_op!(relu, |x: f32| if x > 0.0 { x } else { 0.0 });
unary_op!(sigmoid, |x: f32| 1.0 / (1.0 + (-x).exp()));
unary_op!(tanh, |x: f32| x.tanh());
unary_op!(cos, |x: f32| x.cos());
unary_op!(cosh, |x: f32| x.cosh());
unary_op!(sin, |x: f32| x.sin());
unary_op!(sinh, |x: f32| x.sinh());
unary_op!(tan, |x: f32| x.tan());
unary_op!(acos, |x: f32| x.acos());
unary_op!(acosh, |x: f32| x.acosh());
unary_op!(asin, |x: f32| x.asin());
unary_op!(asinh, |x: f32| x.asinh());
unary_op!(atan, |x: f32| x.atan());
unary_op!(atanh, |x: f32| x.atanh());
unary_op!(recip, |x: f32| 1.0 / x);
unary_op!(softplus, |x: f32| (1.0 + x.exp()).ln());
unary_op!(softsign, |x: f32| x / (1.0 + x.abs()));
unary_op!(square, |x: f32| x * x);

unary_op_with_constant!(add_scalar, |x: f32, c: f32| x + c);
unary_op_with_constant!(mul_scalar, |x: f32, c: f32| x * c);
unary_op_with_constant!(pow_scalar, |x: f32, c: f32| x.powf(c));
unary_op_with_constant!(leaky_relu, |x: f32, alpha: f32| if x > 0.0 { x } else { alpha * x });
unary_op_with_constant!(elu, |x: f32, alpha: f32| if x > 0.0 { x } else { alpha * (x.exp() - 1.0) });

pub fn clip_f32(input: &[f32], min: f32, max: f32, output: &mut [f32]) {
    map_f32(input, output, |x| x.max(min).min(max));
}

/// `1.0` where `x > threshold`, `0.0` elsewhere.
pub fn gt_scalar_mask_f32(input: &[f32], threshold: f32, output: &mut [f32]) {
    map_f32(input, output, |x| if x > threshold { 1.0 } else { 0.0 });
}

pub fn not_bool(input: &[bool], output: &mut [bool]) {
    output
        .par_iter_mut()
        .zip(input.par_iter())
        .for_each(|(out, &x)| *out = !x);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_clamps_negatives() {
        let input = [-1.0f32, 0.0, 2.5];
        let mut output = [0.0f32; 3];
        relu_f32(&input, &mut output);
        assert_eq!(output, [0.0, 0.0, 2.5]);
    }

    #[test]
    fn leaky_relu_scales_negatives() {
        let input = [-2.0f32, 3.0];
        let mut output = [0.0f32; 2];
        leaky_relu_f32(&input, 0.1, &mut output);
        assert!((output[0] + 0.2).abs() < 1e-6);
        assert_eq!(output[1], 3.0);
    }
}

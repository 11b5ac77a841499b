use rayon::prelude::*;

/// Elementwise combine of two equally sized slices.
pub fn zip_map<A, B, O, F>(lhs: &[A], rhs: &[B], output: &mut [O], func: F)
where
    A: Copy + Sync,
    B: Copy + Sync,
    O: Send,
    F: Fn(A, B) -> O + Sync + Send,
{
    output
        .par_iter_mut()
        .zip(lhs.par_iter().zip(rhs.par_iter()))
        .for_each(|(out, (&a, &b))| *out = func(a, b));
}

macro_rules! binary_op {
    ($name:ident, $in:ty, $out:ty, $func:expr) => {
        paste::paste! {
            pub fn [<$name _ $in>](lhs: &[$in], rhs: &[$in], output: &mut [$out]) {
                zip_map(lhs, rhs, output, $func);
            }
        }
    };
}

binary_op!(add, f32, f32, |a: f32, b: f32| a + b);
binary_op!(sub, f32, f32, |a: f32, b: f32| a - b);
binary_op!(mul, f32, f32, |a: f32, b: f32| a * b);
binary_op!(div, f32, f32, |a: f32, b: f32| a / b);
binary_op!(pow, f32, f32, |a: f32, b: f32| a.powf(b));
binary_op!(maximum, f32, f32, |a: f32, b: f32| a.max(b));
binary_op!(minimum, f32, f32, |a: f32, b: f32| a.min(b));

binary_op!(eq, f32, bool, |a: f32, b: f32| a == b);
binary_op!(lt, f32, bool, |a: f32, b: f32| a < b);
binary_op!(gt, f32, bool, |a: f32, b: f32| a > b);

binary_op!(logical_and, bool, bool, |a: bool, b: bool| a && b);
binary_op!(logical_or, bool, bool, |a: bool, b: bool| a || b);
binary_op!(logical_xor, bool, bool, |a: bool, b: bool| a ^ b);

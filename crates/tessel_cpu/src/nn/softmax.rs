use crate::utils::split_at_axis;

/// Softmax along `axis` of a tensor shaped `dims`.
pub fn softmax_forward_f32(input: &[f32], dims: &[usize], axis: usize, output: &mut [f32]) {
    let (outer, dim, inner) = split_at_axis(dims, axis);
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| (o * dim + k) * inner + i;
            let max = (0..dim).map(|k| input[at(k)]).fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0;
            for k in 0..dim {
                let e = (input[at(k)] - max).exp();
                output[at(k)] = e;
                sum += e;
            }
            for k in 0..dim {
                output[at(k)] /= sum;
            }
        }
    }
}

/// `dx = y * (dy - sum(dy * y))` along `axis`.
pub fn softmax_backward_f32(output: &[f32], grad_output: &[f32], dims: &[usize], axis: usize, grad_input: &mut [f32]) {
    let (outer, dim, inner) = split_at_axis(dims, axis);
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| (o * dim + k) * inner + i;
            let dot: f32 = (0..dim).map(|k| grad_output[at(k)] * output[at(k)]).sum();
            for k in 0..dim {
                grad_input[at(k)] = output[at(k)] * (grad_output[at(k)] - dot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_sum_to_one() {
        let x = [1.0f32, 2.0, 3.0, 0.0, 0.0, 0.0];
        let mut y = [0.0f32; 6];
        softmax_forward_f32(&x, &[2, 3], 1, &mut y);
        assert!((y[..3].iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((y[3] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn uniform_upstream_gradient_vanishes() {
        let x = [0.3f32, -1.2, 2.0];
        let mut y = [0.0f32; 3];
        softmax_forward_f32(&x, &[3], 0, &mut y);
        let mut dx = [0.0f32; 3];
        softmax_backward_f32(&y, &[1.0; 3], &[3], 0, &mut dx);
        assert!(dx.iter().all(|v| v.abs() < 1e-6));
    }
}

/// Per-channel statistics of an `[n, c, ...]` input: `(mean, biased var)`.
pub fn channel_stats_f32(input: &[f32], n: usize, c: usize, spatial: usize) -> (Vec<f32>, Vec<f32>) {
    let count = (n * spatial).max(1) as f32;
    let mut mean = vec![0.0f32; c];
    let mut var = vec![0.0f32; c];
    for b in 0..n {
        for ch in 0..c {
            let base = (b * c + ch) * spatial;
            mean[ch] += input[base..base + spatial].iter().sum::<f32>();
        }
    }
    mean.iter_mut().for_each(|m| *m /= count);
    for b in 0..n {
        for ch in 0..c {
            let base = (b * c + ch) * spatial;
            var[ch] += input[base..base + spatial].iter().map(|&x| (x - mean[ch]).powi(2)).sum::<f32>();
        }
    }
    var.iter_mut().for_each(|v| *v /= count);
    (mean, var)
}

/// `y = scale * (x - mean) / sqrt(var + eps) + bias`, per channel.
#[allow(clippy::too_many_arguments)]
pub fn batchnorm_forward_f32(
    input: &[f32],
    n: usize,
    c: usize,
    spatial: usize,
    scale: &[f32],
    bias: &[f32],
    mean: &[f32],
    var: &[f32],
    epsilon: f32,
    output: &mut [f32],
) {
    for b in 0..n {
        for ch in 0..c {
            let inv_std = 1.0 / (var[ch] + epsilon).sqrt();
            let base = (b * c + ch) * spatial;
            for s in base..base + spatial {
                output[s] = scale[ch] * (input[s] - mean[ch]) * inv_std + bias[ch];
            }
        }
    }
}

/// Gradients `(dx, dscale, dbias)`. With `batch_stats` the mean and variance
/// are treated as functions of the input.
#[allow(clippy::too_many_arguments)]
pub fn batchnorm_backward_f32(
    input: &[f32],
    grad_output: &[f32],
    n: usize,
    c: usize,
    spatial: usize,
    scale: &[f32],
    mean: &[f32],
    var: &[f32],
    epsilon: f32,
    batch_stats: bool,
) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let count = (n * spatial).max(1) as f32;
    let inv_std: Vec<f32> = var.iter().map(|v| 1.0 / (v + epsilon).sqrt()).collect();

    let mut dscale = vec![0.0f32; c];
    let mut dbias = vec![0.0f32; c];
    for b in 0..n {
        for ch in 0..c {
            let base = (b * c + ch) * spatial;
            for s in base..base + spatial {
                let x_hat = (input[s] - mean[ch]) * inv_std[ch];
                dbias[ch] += grad_output[s];
                dscale[ch] += grad_output[s] * x_hat;
            }
        }
    }

    let mut dx = vec![0.0f32; input.len()];
    for b in 0..n {
        for ch in 0..c {
            let base = (b * c + ch) * spatial;
            let k = scale[ch] * inv_std[ch];
            for s in base..base + spatial {
                dx[s] = if batch_stats {
                    let x_hat = (input[s] - mean[ch]) * inv_std[ch];
                    k * (grad_output[s] - dbias[ch] / count - x_hat * dscale[ch] / count)
                } else {
                    k * grad_output[s]
                };
            }
        }
    }
    (dx, dscale, dbias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_output_has_zero_mean() {
        let x = [1.0f32, 3.0, 5.0, 7.0];
        let (mean, var) = channel_stats_f32(&x, 2, 1, 2);
        assert_eq!(mean, vec![4.0]);
        assert_eq!(var, vec![5.0]);

        let mut y = [0.0f32; 4];
        batchnorm_forward_f32(&x, 2, 1, 2, &[1.0], &[0.0], &mean, &var, 0.0, &mut y);
        assert!(y.iter().sum::<f32>().abs() < 1e-5);
    }

    #[test]
    fn constant_upstream_gradient_cancels_in_training() {
        let x = [1.0f32, 3.0, 5.0, 7.0];
        let (mean, var) = channel_stats_f32(&x, 1, 1, 4);
        let (dx, _, dbias) = batchnorm_backward_f32(&x, &[1.0; 4], 1, 1, 4, &[2.0], &mean, &var, 1e-5, true);
        assert!(dx.iter().all(|v| v.abs() < 1e-5));
        assert_eq!(dbias, vec![4.0]);
    }
}

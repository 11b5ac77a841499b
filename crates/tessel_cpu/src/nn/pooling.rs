use rayon::prelude::*;

/// Geometry of a symmetric-padding 2-D pooling over `[n, c, h, w]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pool2dDims {
    pub batch_size: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub pad_h: usize,
    pub pad_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
}

impl Pool2dDims {
    pub fn out_h(&self) -> usize {
        (self.height + 2 * self.pad_h - self.kernel_h) / self.stride_h + 1
    }

    pub fn out_w(&self) -> usize {
        (self.width + 2 * self.pad_w - self.kernel_w) / self.stride_w + 1
    }

    /// Clamped input window `(h0, h1, w0, w1)` for one output cell.
    fn window(&self, oh: usize, ow: usize) -> (usize, usize, usize, usize) {
        let h_start = (oh * self.stride_h) as isize - self.pad_h as isize;
        let w_start = (ow * self.stride_w) as isize - self.pad_w as isize;
        let h_end = (h_start + self.kernel_h as isize).min(self.height as isize);
        let w_end = (w_start + self.kernel_w as isize).min(self.width as isize);
        (h_start.max(0) as usize, h_end.max(0) as usize, w_start.max(0) as usize, w_end.max(0) as usize)
    }
}

/// Max pooling. `argmax` receives the flat in-plane index of each winner.
pub fn max_pool2d_forward_f32(dims: &Pool2dDims, input: &[f32], output: &mut [f32], argmax: &mut [usize]) {
    let plane_in = dims.height * dims.width;
    let out_w = dims.out_w();
    let plane_out = dims.out_h() * out_w;

    output
        .par_chunks_mut(plane_out)
        .zip(argmax.par_chunks_mut(plane_out))
        .enumerate()
        .for_each(|(p, (out, idx))| {
            let src = &input[p * plane_in..(p + 1) * plane_in];
            for (o, (val, arg)) in out.iter_mut().zip(idx.iter_mut()).enumerate() {
                let (h0, h1, w0, w1) = dims.window(o / out_w, o % out_w);
                let mut best = f32::NEG_INFINITY;
                let mut best_idx = h0 * dims.width + w0;
                for h in h0..h1 {
                    for w in w0..w1 {
                        let i = h * dims.width + w;
                        if src[i] > best {
                            best = src[i];
                            best_idx = i;
                        }
                    }
                }
                *val = best;
                *arg = best_idx;
            }
        });
}

pub fn max_pool2d_backward_f32(dims: &Pool2dDims, argmax: &[usize], grad_output: &[f32], grad_input: &mut [f32]) {
    let plane_in = dims.height * dims.width;
    let plane_out = dims.out_h() * dims.out_w();

    grad_input.fill(0.0);
    grad_input.par_chunks_mut(plane_in).enumerate().for_each(|(p, dx)| {
        let dy = &grad_output[p * plane_out..(p + 1) * plane_out];
        let idx = &argmax[p * plane_out..(p + 1) * plane_out];
        for (&g, &i) in dy.iter().zip(idx) {
            dx[i] += g;
        }
    });
}

/// Average pooling. Padded cells are excluded from the divisor.
pub fn avg_pool2d_forward_f32(dims: &Pool2dDims, input: &[f32], output: &mut [f32]) {
    let plane_in = dims.height * dims.width;
    let out_w = dims.out_w();
    let plane_out = dims.out_h() * out_w;

    output.par_chunks_mut(plane_out).enumerate().for_each(|(p, out)| {
        let src = &input[p * plane_in..(p + 1) * plane_in];
        for (o, val) in out.iter_mut().enumerate() {
            let (h0, h1, w0, w1) = dims.window(o / out_w, o % out_w);
            let count = ((h1 - h0) * (w1 - w0)).max(1);
            let mut sum = 0.0;
            for h in h0..h1 {
                for w in w0..w1 {
                    sum += src[h * dims.width + w];
                }
            }
            *val = sum / count as f32;
        }
    });
}

pub fn avg_pool2d_backward_f32(dims: &Pool2dDims, grad_output: &[f32], grad_input: &mut [f32]) {
    let plane_in = dims.height * dims.width;
    let out_w = dims.out_w();
    let plane_out = dims.out_h() * out_w;

    grad_input.fill(0.0);
    grad_input.par_chunks_mut(plane_in).enumerate().for_each(|(p, dx)| {
        let dy = &grad_output[p * plane_out..(p + 1) * plane_out];
        for (o, &g) in dy.iter().enumerate() {
            let (h0, h1, w0, w1) = dims.window(o / out_w, o % out_w);
            let count = ((h1 - h0) * (w1 - w0)).max(1);
            let share = g / count as f32;
            for h in h0..h1 {
                for w in w0..w1 {
                    dx[h * dims.width + w] += share;
                }
            }
        }
    });
}

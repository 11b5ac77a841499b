use crate::ops::matmul::matmul_f32;
use rayon::prelude::*;

/// Geometry of a symmetric-padding 2-D convolution over `[n, c, h, w]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dDims {
    pub batch_size: usize,
    pub in_channels: usize,
    pub height: usize,
    pub width: usize,
    pub out_channels: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub pad_h: usize,
    pub pad_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
}

impl Conv2dDims {
    pub fn out_h(&self) -> usize {
        (self.height + 2 * self.pad_h - self.kernel_h) / self.stride_h + 1
    }

    pub fn out_w(&self) -> usize {
        (self.width + 2 * self.pad_w - self.kernel_w) / self.stride_w + 1
    }

    fn col_rows(&self) -> usize {
        self.in_channels * self.kernel_h * self.kernel_w
    }

    fn col_cols(&self) -> usize {
        self.out_h() * self.out_w()
    }
}

/// Unfolds every receptive field into a column. One `[c*kh*kw, oh*ow]` block
/// per batch entry.
pub fn im2col_f32(dims: &Conv2dDims, input: &[f32], col: &mut [f32]) {
    let Conv2dDims {
        in_channels: channels,
        height,
        width,
        kernel_h,
        kernel_w,
        pad_h,
        pad_w,
        stride_h,
        stride_w,
        ..
    } = *dims;
    let out_h = dims.out_h();
    let out_w = dims.out_w();
    let kernel_size = kernel_h * kernel_w;
    let output_size = out_h * out_w;
    let chunk_size = channels * kernel_size * output_size;

    col.par_chunks_mut(chunk_size).enumerate().for_each(|(b, col_chunk)| {
        for c in 0..channels {
            let input_offset = (b * channels + c) * height * width;
            for kh in 0..kernel_h {
                for kw in 0..kernel_w {
                    let col_offset = (c * kernel_size + kh * kernel_w + kw) * output_size;

                    for h_out in 0..out_h {
                        let h_in = (h_out * stride_h + kh) as isize - pad_h as isize;
                        let row = col_offset + h_out * out_w;

                        if h_in < 0 || h_in >= height as isize {
                            col_chunk[row..row + out_w].fill(0.0);
                            continue;
                        }
                        for w_out in 0..out_w {
                            let w_in = (w_out * stride_w + kw) as isize - pad_w as isize;
                            col_chunk[row + w_out] = if w_in >= 0 && w_in < width as isize {
                                input[input_offset + h_in as usize * width + w_in as usize]
                            } else {
                                0.0
                            };
                        }
                    }
                }
            }
        }
    });
}

/// Folds columns back into an image, summing overlapping contributions.
pub fn col2im_f32(dims: &Conv2dDims, col: &[f32], output: &mut [f32]) {
    let Conv2dDims {
        in_channels: channels,
        height,
        width,
        kernel_h,
        kernel_w,
        pad_h,
        pad_w,
        stride_h,
        stride_w,
        ..
    } = *dims;
    let out_h = dims.out_h();
    let out_w = dims.out_w();
    let kernel_size = kernel_h * kernel_w;
    let output_size = out_h * out_w;

    output.fill(0.0);
    output
        .par_chunks_mut(channels * height * width)
        .enumerate()
        .for_each(|(b, out_chunk)| {
            let col_chunk = &col[b * channels * kernel_size * output_size..];
            for c in 0..channels {
                for kh in 0..kernel_h {
                    for kw in 0..kernel_w {
                        let col_offset = (c * kernel_size + kh * kernel_w + kw) * output_size;
                        for h_out in 0..out_h {
                            let h_in = (h_out * stride_h + kh) as isize - pad_h as isize;
                            if h_in < 0 || h_in >= height as isize {
                                continue;
                            }
                            for w_out in 0..out_w {
                                let w_in = (w_out * stride_w + kw) as isize - pad_w as isize;
                                if w_in < 0 || w_in >= width as isize {
                                    continue;
                                }
                                out_chunk[(c * height + h_in as usize) * width + w_in as usize] +=
                                    col_chunk[col_offset + h_out * out_w + w_out];
                            }
                        }
                    }
                }
            }
        });
}

/// `weight` is `[oc, ic, kh, kw]`; `output` is `[n, oc, oh, ow]`. Returns the
/// unfolded columns for reuse in the backward pass.
pub fn conv2d_forward_f32(dims: &Conv2dDims, input: &[f32], weight: &[f32], bias: Option<&[f32]>, output: &mut [f32]) -> Vec<f32> {
    let rows = dims.col_rows();
    let cols = dims.col_cols();
    let mut col = vec![0.0f32; dims.batch_size * rows * cols];
    im2col_f32(dims, input, &mut col);

    let oc = dims.out_channels;
    for b in 0..dims.batch_size {
        let out = &mut output[b * oc * cols..(b + 1) * oc * cols];
        matmul_f32(weight, &col[b * rows * cols..(b + 1) * rows * cols], oc, rows, cols, out);
        if let Some(bias) = bias {
            for (o, chunk) in out.chunks_mut(cols).enumerate() {
                chunk.iter_mut().for_each(|v| *v += bias[o]);
            }
        }
    }
    col
}

/// Gradients `(dx, dw, db)` of a convolution, given the columns from the forward pass.
pub fn conv2d_backward_f32(dims: &Conv2dDims, col: &[f32], weight: &[f32], grad_output: &[f32]) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let rows = dims.col_rows();
    let cols = dims.col_cols();
    let oc = dims.out_channels;

    let mut weight_t = vec![0.0f32; rows * oc];
    crate::ops::transform::transpose(weight, &[oc, rows], &[1, 0], &mut weight_t);

    let mut dw = vec![0.0f32; oc * rows];
    let mut db = vec![0.0f32; oc];
    let mut dcol = vec![0.0f32; dims.batch_size * rows * cols];
    let mut col_t = vec![0.0f32; cols * rows];
    let mut dw_b = vec![0.0f32; oc * rows];

    for b in 0..dims.batch_size {
        let dy = &grad_output[b * oc * cols..(b + 1) * oc * cols];
        let col_b = &col[b * rows * cols..(b + 1) * rows * cols];

        crate::ops::transform::transpose(col_b, &[rows, cols], &[1, 0], &mut col_t);
        matmul_f32(dy, &col_t, oc, cols, rows, &mut dw_b);
        dw.iter_mut().zip(&dw_b).for_each(|(a, &g)| *a += g);

        for (o, chunk) in dy.chunks(cols).enumerate() {
            db[o] += chunk.iter().sum::<f32>();
        }

        matmul_f32(&weight_t, dy, rows, oc, cols, &mut dcol[b * rows * cols..(b + 1) * rows * cols]);
    }

    let mut dx = vec![0.0f32; dims.batch_size * dims.in_channels * dims.height * dims.width];
    col2im_f32(dims, &dcol, &mut dx);
    (dx, dw, db)
}

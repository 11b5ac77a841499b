use crate::utils::{broadcast_strides, compute_strides, get_strided_index, split_at_axis};
use rayon::prelude::*;

/// Materializes `input` (shaped `in_dims`) expanded to `out_dims`.
pub fn broadcast<T: Copy + Send + Sync>(input: &[T], in_dims: &[usize], out_dims: &[usize], output: &mut [T]) {
    let strides = broadcast_strides(in_dims, out_dims);
    let num_dims = out_dims.len();
    output.par_iter_mut().enumerate().for_each(|(i, out)| {
        *out = input[get_strided_index(i, num_dims, out_dims, &strides)];
    });
}

/// Permutes axes: output axis `d` is input axis `perm[d]`.
pub fn transpose<T: Copy + Send + Sync>(input: &[T], dims: &[usize], perm: &[usize], output: &mut [T]) {
    let in_strides = compute_strides(dims);
    let out_dims: Vec<usize> = perm.iter().map(|&p| dims[p]).collect();
    let strides: Vec<usize> = perm.iter().map(|&p| in_strides[p]).collect();
    let num_dims = dims.len();
    output.par_iter_mut().enumerate().for_each(|(i, out)| {
        *out = input[get_strided_index(i, num_dims, &out_dims, &strides)];
    });
}

/// Joins equally ranked inputs along `axis`.
pub fn concat<T: Copy>(inputs: &[(&[T], &[usize])], axis: usize, output: &mut [T]) {
    let Some((_, first_dims)) = inputs.first() else {
        return;
    };
    let (outer, _, inner) = split_at_axis(first_dims, axis);
    let mut offset = 0;
    for o in 0..outer {
        for (data, dims) in inputs {
            let chunk = dims[axis] * inner;
            output[offset..offset + chunk].copy_from_slice(&data[o * chunk..(o + 1) * chunk]);
            offset += chunk;
        }
    }
}

/// Copies `len` entries starting at `start` along `axis`.
pub fn slice_axis<T: Copy>(input: &[T], dims: &[usize], axis: usize, start: usize, len: usize, output: &mut [T]) {
    let (outer, dim, inner) = split_at_axis(dims, axis);
    for o in 0..outer {
        let src = (o * dim + start) * inner;
        let dst = o * len * inner;
        output[dst..dst + len * inner].copy_from_slice(&input[src..src + len * inner]);
    }
}

/// Zero-pads the two trailing axes of an `[n, c, h, w]` input.
/// `pads` is `[top, left, bottom, right]`.
pub fn pad2d_f32(input: &[f32], dims: [usize; 4], pads: [usize; 4], output: &mut [f32]) {
    let [n, c, h, w] = dims;
    let out_h = h + pads[0] + pads[2];
    let out_w = w + pads[1] + pads[3];
    output.fill(0.0);
    output
        .par_chunks_mut(out_h * out_w)
        .take(n * c)
        .enumerate()
        .for_each(|(plane, out)| {
            let src = &input[plane * h * w..(plane + 1) * h * w];
            for y in 0..h {
                let dst = (y + pads[0]) * out_w + pads[1];
                out[dst..dst + w].copy_from_slice(&src[y * w..(y + 1) * w]);
            }
        });
}

/// Inverse of [`pad2d_f32`]: `dims` is the padded shape.
pub fn crop2d_f32(input: &[f32], dims: [usize; 4], pads: [usize; 4], output: &mut [f32]) {
    let [n, c, h, w] = dims;
    let out_h = h - pads[0] - pads[2];
    let out_w = w - pads[1] - pads[3];
    output
        .par_chunks_mut(out_h * out_w)
        .take(n * c)
        .enumerate()
        .for_each(|(plane, out)| {
            let src = &input[plane * h * w..(plane + 1) * h * w];
            for y in 0..out_h {
                let from = (y + pads[0]) * w + pads[1];
                out[y * out_w..(y + 1) * out_w].copy_from_slice(&src[from..from + out_w]);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_2d() {
        let x = [1, 2, 3, 4, 5, 6];
        let mut y = [0; 6];
        transpose(&x, &[2, 3], &[1, 0], &mut y);
        assert_eq!(y, [1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn concat_along_last_axis() {
        let a = [1.0f32, 2.0, 3.0, 4.0];
        let b = [5.0f32, 6.0];
        let mut out = [0.0f32; 6];
        concat(&[(&a[..], &[2, 2][..]), (&b[..], &[2, 1][..])], 1, &mut out);
        assert_eq!(out, [1.0, 2.0, 5.0, 3.0, 4.0, 6.0]);
    }

    #[test]
    fn pad_then_crop_restores_input() {
        let x: Vec<f32> = (0..4).map(|v| v as f32).collect();
        let mut padded = vec![0.0f32; 9];
        pad2d_f32(&x, [1, 1, 2, 2], [0, 0, 1, 1], &mut padded);
        assert_eq!(padded, vec![0.0, 1.0, 0.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0]);

        let mut cropped = vec![0.0f32; 4];
        crop2d_f32(&padded, [1, 1, 3, 3], [0, 0, 1, 1], &mut cropped);
        assert_eq!(cropped, x);
    }
}

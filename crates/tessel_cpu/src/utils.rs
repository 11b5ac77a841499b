#[inline]
pub fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for d in (0..dims.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * dims[d + 1];
    }
    strides
}

/// Maps a flat output index onto an input whose strides may contain zeros
/// (broadcast) or be permuted (transpose).
#[inline]
pub fn get_strided_index(idx: usize, num_dims: usize, dims: &[usize], strides: &[usize]) -> usize {
    let mut strided_i = 0;
    let mut remaining_idx = idx;

    for d in 0..num_dims {
        let dim_idx = num_dims - 1 - d;
        strided_i += (remaining_idx % dims[dim_idx]) * strides[dim_idx];
        remaining_idx /= dims[dim_idx];
    }

    strided_i
}

/// Strides of `in_dims` read through the broadcast target `out_dims`. Broadcast
/// axes get stride zero.
pub fn broadcast_strides(in_dims: &[usize], out_dims: &[usize]) -> Vec<usize> {
    let rank_diff = out_dims.len() - in_dims.len();
    let in_strides = compute_strides(in_dims);
    (0..out_dims.len())
        .map(|d| {
            if d < rank_diff {
                0
            } else {
                let i = d - rank_diff;
                if in_dims[i] == 1 && out_dims[d] != 1 {
                    0
                } else {
                    in_strides[i]
                }
            }
        })
        .collect()
}

/// Splits `dims` around `axis` into `(outer, dim, inner)` extents.
#[inline]
pub fn split_at_axis(dims: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer = dims[..axis].iter().product();
    let inner = dims[axis + 1..].iter().product();
    (outer, dims[axis], inner)
}

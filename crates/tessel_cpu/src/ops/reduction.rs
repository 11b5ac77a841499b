use crate::utils::compute_strides;

/// Sums `input` (shaped `dims`) over every axis flagged in `reduce`. The output
/// is laid out as `dims` with reduced axes collapsed to 1.
pub fn sum_f32(input: &[f32], dims: &[usize], reduce: &[bool], output: &mut [f32]) {
    let out_dims: Vec<usize> = dims
        .iter()
        .zip(reduce)
        .map(|(&d, &r)| if r { 1 } else { d })
        .collect();
    let out_strides = compute_strides(&out_dims);

    output.fill(0.0);
    for (i, &x) in input.iter().enumerate() {
        let mut rem = i;
        let mut out_idx = 0;
        for d in (0..dims.len()).rev() {
            let coord = rem % dims[d];
            rem /= dims[d];
            if !reduce[d] {
                out_idx += coord * out_strides[d];
            }
        }
        output[out_idx] += x;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_rows_and_columns() {
        let x = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut rows = [0.0f32; 2];
        sum_f32(&x, &[2, 3], &[false, true], &mut rows);
        assert_eq!(rows, [6.0, 15.0]);

        let mut cols = [0.0f32; 3];
        sum_f32(&x, &[2, 3], &[true, false], &mut cols);
        assert_eq!(cols, [5.0, 7.0, 9.0]);
    }
}

use rayon::prelude::*;

/// Row-major `[m, k] x [k, n] -> [m, n]`, parallel over output rows.
pub fn matmul_f32(lhs: &[f32], rhs: &[f32], m: usize, k: usize, n: usize, output: &mut [f32]) {
    debug_assert_eq!(lhs.len(), m * k);
    debug_assert_eq!(rhs.len(), k * n);

    output[..m * n].par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        row.fill(0.0);
        let lhs_row = &lhs[i * k..(i + 1) * k];
        for (p, &a) in lhs_row.iter().enumerate() {
            if a == 0.0 {
                continue;
            }
            let rhs_row = &rhs[p * n..(p + 1) * n];
            for (out, &b) in row.iter_mut().zip(rhs_row) {
                *out += a * b;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_by_three_times_three_by_two() {
        let a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0f32, 8.0, 9.0, 10.0, 11.0, 12.0];
        let mut c = [0.0f32; 4];
        matmul_f32(&a, &b, 2, 3, 2, &mut c);
        assert_eq!(c, [58.0, 64.0, 139.0, 154.0]);
    }
}

//! Host reference implementations used to verify device results.

use rayon::prelude::*;

use crate::error::ClError;
use crate::matrix::Matrix;

/// Minimum rows before the reference GEMM goes parallel.
const PAR_ROW_THRESHOLD: usize = 64;

/// Naive triple-loop product `A[M,K] * B[K,N]`.
pub fn gemm(a: &Matrix, b: &Matrix) -> Result<Matrix, ClError> {
    if a.cols() != b.rows() {
        return Err(ClError::InvalidArgument(format!(
            "inner dimensions differ: A is {}x{}, B is {}x{}",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    let (m, k, n) = (a.rows(), a.cols(), b.cols());
    let mut c = vec![0.0f32; m * n];

    let row_kernel = |(i, c_row): (usize, &mut [f32])| {
        let a_row = a.row(i);
        for (j, out) in c_row.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for p in 0..k {
                acc += a_row[p] * b.get(p, j);
            }
            *out = acc;
        }
    };

    if n > 0 {
        if m >= PAR_ROW_THRESHOLD {
            c.par_chunks_mut(n).enumerate().for_each(row_kernel);
        } else {
            c.chunks_mut(n).enumerate().for_each(row_kernel);
        }
    }
    Matrix::new(m, n, c)
}

/// Sequential inclusive prefix sum.
pub fn inclusive_prefix_sum(input: &[f32]) -> Vec<f32> {
    input
        .iter()
        .scan(0.0f32, |acc, &x| {
            *acc += x;
            Some(*acc)
        })
        .collect()
}

/// Compare element-wise with a tolerance relative to the magnitude of
/// `expected`. Returns the largest absolute difference seen.
pub fn compare(expected: &[f32], got: &[f32], rel_tol: f32) -> Result<f32, ClError> {
    if expected.len() != got.len() {
        return Err(ClError::SizeMismatch {
            expected: expected.len() * std::mem::size_of::<f32>(),
            got: got.len() * std::mem::size_of::<f32>(),
        });
    }
    let mut max_err = 0.0f32;
    for (index, (&e, &g)) in expected.iter().zip(got).enumerate() {
        let diff = (e - g).abs();
        if !(diff <= rel_tol * e.abs().max(1.0)) {
            return Err(ClError::Mismatch { index, expected: e, got: g });
        }
        max_err = max_err.max(diff);
    }
    Ok(max_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemm_small() {
        let a = Matrix::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Matrix::new(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let c = gemm(&a, &b).unwrap();
        assert_eq!((c.rows(), c.cols()), (2, 2));
        assert_eq!(c.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_gemm_parallel_matches_identity() {
        let n = PAR_ROW_THRESHOLD + 3;
        let mut eye = vec![0.0f32; n * n];
        for i in 0..n {
            eye[i * n + i] = 1.0;
        }
        let a_data: Vec<f32> = (0..n * n).map(|i| ((i * 7 + 3) % 13) as f32 * 0.5).collect();
        let a = Matrix::new(n, n, a_data).unwrap();
        let c = gemm(&a, &Matrix::new(n, n, eye).unwrap()).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn test_gemm_dim_mismatch() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 3);
        assert!(matches!(gemm(&a, &b), Err(ClError::InvalidArgument(_))));
    }

    #[test]
    fn test_prefix_sum() {
        assert_eq!(inclusive_prefix_sum(&[1.0, 2.0, 3.0, 4.0]), vec![1.0, 3.0, 6.0, 10.0]);
        assert!(inclusive_prefix_sum(&[]).is_empty());
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(&[1.0, 2.0], &[1.0, 2.0], 1e-4).unwrap(), 0.0);
        let err = compare(&[1.0, 2.0], &[1.0, 2.5], 1e-4).unwrap_err();
        assert!(matches!(err, ClError::Mismatch { index: 1, .. }));
        assert!(compare(&[1.0], &[f32::NAN], 1e-4).is_err());
        assert!(matches!(compare(&[1.0], &[], 1e-4), Err(ClError::SizeMismatch { .. })));
    }
}

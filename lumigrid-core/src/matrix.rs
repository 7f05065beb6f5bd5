//! Matrix operations for the gain model
//!
//! Basic dense linear algebra over runtime-sized matrices. Sensor and bulb
//! counts are deployment configuration, so matrices are `Vec`-of-rows rather
//! than fixed arrays; every operation validates shapes and returns a typed
//! error on mismatch.

use alloc::vec::Vec;

use crate::errors::{ControlError, ControlResult};

/// Validated dimensions of a row-major matrix: (rows, cols)
///
/// An empty matrix has shape (0, 0). Ragged rows are rejected.
pub fn dims(a: &[Vec<f32>]) -> ControlResult<(usize, usize)> {
    let rows = a.len();
    if rows == 0 {
        return Ok((0, 0));
    }
    let cols = a[0].len();
    for row in a.iter() {
        if row.len() != cols {
            return Err(ControlError::DimensionMismatch {
                expected: cols,
                actual: row.len(),
            });
        }
    }
    Ok((rows, cols))
}

/// Matrix-vector multiplication: y = A × x
pub fn matvec(a: &[Vec<f32>], x: &[f32]) -> ControlResult<Vec<f32>> {
    let (rows, cols) = dims(a)?;
    if x.len() != cols {
        return Err(ControlError::DimensionMismatch {
            expected: cols,
            actual: x.len(),
        });
    }
    let mut result = Vec::with_capacity(rows);
    for row in a.iter() {
        let mut acc = 0.0;
        for (a_ij, x_j) in row.iter().zip(x.iter()) {
            acc += a_ij * x_j;
        }
        result.push(acc);
    }
    Ok(result)
}

/// Residual vector: e = r - A × x
///
/// This is the environmental-offset update `E = R - A·d`: the part of each
/// reading the bulb model does not explain.
pub fn residual(r: &[f32], a: &[Vec<f32>], x: &[f32]) -> ControlResult<Vec<f32>> {
    let predicted = matvec(a, x)?;
    if r.len() != predicted.len() {
        return Err(ControlError::DimensionMismatch {
            expected: predicted.len(),
            actual: r.len(),
        });
    }
    Ok(r.iter()
        .zip(predicted.iter())
        .map(|(r_i, p_i)| r_i - p_i)
        .collect())
}

/// Matrix transpose: B = Aᵀ
pub fn transpose(a: &[Vec<f32>]) -> ControlResult<Vec<Vec<f32>>> {
    let (rows, cols) = dims(a)?;
    let mut result = Vec::with_capacity(cols);
    for j in 0..cols {
        let mut row = Vec::with_capacity(rows);
        for i in 0..rows {
            row.push(a[i][j]);
        }
        result.push(row);
    }
    Ok(result)
}

/// True if every entry is a finite number
pub fn all_finite(xs: &[f32]) -> bool {
    xs.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn dims_rejects_ragged_rows() {
        let a = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            dims(&a),
            Err(ControlError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn matvec_computes_products() {
        let a = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let y = matvec(&a, &[1.0, 1.0]).unwrap();
        assert_eq!(y, vec![3.0, 7.0]);
    }

    #[test]
    fn matvec_rejects_length_mismatch() {
        let a = vec![vec![1.0, 2.0]];
        assert!(matvec(&a, &[1.0]).is_err());
    }

    #[test]
    fn residual_subtracts_prediction() {
        let a = vec![vec![2.0, 0.0], vec![0.0, 2.0]];
        let e = residual(&[5.0, 3.0], &a, &[1.0, 0.5]).unwrap();
        assert_eq!(e, vec![3.0, 2.0]);
    }

    #[test]
    fn transpose_swaps_shape() {
        let a = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let t = transpose(&a).unwrap();
        assert_eq!(t, vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]);
    }

    #[test]
    fn empty_matrix_has_zero_dims() {
        let a: Vec<Vec<f32>> = vec![];
        assert_eq!(dims(&a).unwrap(), (0, 0));
        assert_eq!(matvec(&a, &[]).unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn all_finite_rejects_nan() {
        assert!(all_finite(&[1.0, 0.0, -3.5]));
        assert!(!all_finite(&[1.0, f32::NAN]));
        assert!(!all_finite(&[f32::INFINITY]));
    }
}

//! Dense linear solver for the homography system

use crate::error::{Result, WarpError};

/// Pivots smaller than this are treated as zero
pub const PIVOT_EPSILON: f64 = 1e-10;

/// Solve `a * x = b` using Gaussian elimination with partial pivoting.
///
/// The inputs are copied into a private working system, so the caller's
/// arrays are left untouched. A pivot below [`PIVOT_EPSILON`] after row
/// selection means the system is singular and yields
/// [`WarpError::DegenerateGeometry`].
pub fn solve_linear_system<const N: usize>(a: &[[f64; N]; N], b: &[f64; N]) -> Result<[f64; N]> {
    let mut m = *a;
    let mut rhs = *b;

    // Forward elimination with partial pivoting
    for col in 0..N {
        // Find pivot
        let mut max_row = col;
        let mut max_val = m[col][col].abs();
        for row in (col + 1)..N {
            if m[row][col].abs() > max_val {
                max_val = m[row][col].abs();
                max_row = row;
            }
        }

        // NaN never compares greater, so it has to be caught here
        if max_val.is_nan() || max_val < PIVOT_EPSILON {
            return Err(WarpError::DegenerateGeometry);
        }

        if max_row != col {
            m.swap(col, max_row);
            rhs.swap(col, max_row);
        }

        let pivot = m[col][col];
        for row in (col + 1)..N {
            let factor = m[row][col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for j in col..N {
                m[row][j] -= factor * m[col][j];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    // Back substitution
    let mut x = [0.0f64; N];
    for i in (0..N).rev() {
        let mut sum = rhs[i];
        for j in (i + 1)..N {
            sum -= m[i][j] * x[j];
        }
        x[i] = sum / m[i][i];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(WarpError::DegenerateGeometry);
    }

    Ok(x)
}

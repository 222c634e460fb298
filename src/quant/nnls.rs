//! Non-negative least squares by the Lawson–Hanson active-set method.
use nalgebra::{DMatrix, DVector};

use crate::error::CoreError;

/// KKT optimality tolerance, relative to machine precision and problem
/// scale.
const KKT_TOLERANCE: f64 = 1e-10;

/// The maximum number of active-set iterations before declaring the fit
/// exhausted. Each column can enter and leave the passive set only a
/// bounded number of times in practice.
const MAX_ITERATIONS_PER_COLUMN: usize = 30;

/// Solve `min ‖A x − b‖₂ subject to x ≥ 0`.
///
/// Returns the minimizer; the solution satisfies the KKT conditions to
/// machine tolerance on return.
pub fn nnls(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, CoreError> {
    let (rows, cols) = a.shape();
    if b.len() != rows {
        return Err(CoreError::IllegalArgument(format!(
            "matrix has {} rows but the target vector has {} entries",
            rows,
            b.len()
        )));
    }

    let mut x = DVector::zeros(cols);
    let mut passive = vec![false; cols];
    let scale = b.amax().max(1.0);
    let tolerance = KKT_TOLERANCE * scale;

    let max_iterations = MAX_ITERATIONS_PER_COLUMN * cols.max(1);
    for _ in 0..max_iterations {
        // Gradient of the residual; positive entries in the active set mean
        // the objective can still improve.
        let w = a.transpose() * (b - a * &x);
        let candidate = (0..cols)
            .filter(|&j| !passive[j])
            .max_by(|&i, &j| w[i].total_cmp(&w[j]));
        let Some(entering) = candidate else {
            break;
        };
        if w[entering] <= tolerance {
            break;
        }
        passive[entering] = true;

        // Inner loop: solve the unconstrained problem on the passive set
        // and walk back along the segment to x until feasible.
        loop {
            let z = solve_passive(a, b, &passive)?;
            let negative: Vec<usize> = (0..cols)
                .filter(|&j| passive[j] && z[j] <= 0.0)
                .collect();
            if negative.is_empty() {
                x = z;
                break;
            }
            let alpha = negative
                .iter()
                .map(|&j| x[j] / (x[j] - z[j]))
                .fold(f64::INFINITY, f64::min);
            let alpha = alpha.clamp(0.0, 1.0);
            x = &x + alpha * (&z - &x);
            for j in 0..cols {
                if passive[j] && x[j].abs() <= tolerance {
                    x[j] = 0.0;
                    passive[j] = false;
                }
            }
            if !passive.iter().any(|&p| p) {
                break;
            }
        }
    }

    for v in x.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
    Ok(x)
}

/// Least-squares solve restricted to the passive columns; inactive entries
/// of the result are zero.
fn solve_passive(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    passive: &[bool],
) -> Result<DVector<f64>, CoreError> {
    let selected: Vec<usize> = (0..passive.len()).filter(|&j| passive[j]).collect();
    if selected.is_empty() {
        return Ok(DVector::zeros(passive.len()));
    }
    let sub = a.select_columns(selected.iter());
    let svd = sub.svd(true, true);
    let solution = svd
        .solve(b, 1e-12)
        .map_err(|e| CoreError::UnableToFit(e.to_string()))?;
    let mut full = DVector::zeros(passive.len());
    for (slot, &j) in selected.iter().enumerate() {
        full[j] = solution[slot];
    }
    Ok(full)
}

#[cfg(test)]
mod test {
    use super::*;

    fn residual(a: &DMatrix<f64>, b: &DVector<f64>, x: &DVector<f64>) -> f64 {
        (a * x - b).norm()
    }

    #[test]
    fn test_unconstrained_optimum_recovered_when_non_negative() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let truth = DVector::from_vec(vec![2.0, 3.0]);
        let b = &a * &truth;
        let x = nnls(&a, &b).unwrap();
        assert!((x - truth).norm() < 1e-8);
    }

    #[test]
    fn test_negative_component_clamps_to_boundary() {
        // The unconstrained solution has a negative coordinate; NNLS must
        // land on the boundary instead.
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.01]);
        let b = DVector::from_vec(vec![1.0, 0.5]);
        let unconstrained = a.clone().lu().solve(&b).unwrap();
        assert!(unconstrained.min() < 0.0);

        let x = nnls(&a, &b).unwrap();
        assert!(x.min() >= 0.0);
        // No better non-negative candidate on a coarse simplex sweep.
        let best = residual(&a, &b, &x);
        for i in 0..=20 {
            for j in 0..=20 {
                let candidate = DVector::from_vec(vec![i as f64 * 0.1, j as f64 * 0.1]);
                assert!(residual(&a, &b, &candidate) + 1e-9 >= best);
            }
        }
    }

    #[test]
    fn test_column_stochastic_system() {
        // A column-stochastic impurity-style matrix with non-negative data
        // must yield a non-negative solution with a small residual.
        let a = DMatrix::from_row_slice(
            3,
            3,
            &[0.95, 0.05, 0.00, 0.04, 0.90, 0.06, 0.01, 0.05, 0.94],
        );
        let b = DVector::from_vec(vec![100.0, 150.0, 80.0]);
        let x = nnls(&a, &b).unwrap();
        assert!(x.min() >= 0.0);
        assert!(residual(&a, &b, &x) < 1e-6);
    }

    #[test]
    fn test_zero_rhs() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, 1.0]);
        let b = DVector::zeros(2);
        let x = nnls(&a, &b).unwrap();
        assert_eq!(x, DVector::zeros(2));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(nnls(&a, &b).is_err());
    }
}

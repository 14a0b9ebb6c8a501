//! The linear half of variable projection.
//!
//! For a fixed nonlinear parameter guess the model is linear in the clp
//! `$\vec{c}$`: given the design matrix `$\mathbf{D}$` of a group and the
//! observed data `$\vec{y}$`, the clp minimize
//! `$||\vec{y} - \mathbf{D}\vec{c}||_2$`, optionally subject to
//! `$\vec{c} \geq 0$`. Only the residual of this inner solve is handed to
//! the nonlinear optimizer.

use nalgebra::{DMatrix, DVector};


/// truncation threshold for singular values in the least squares solve
const SVD_EPSILON: f64 = f64::EPSILON;

/// The solution of the linear inner problem of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSolution {
    /// the conditionally linear parameters, one per design matrix column
    pub clp: DVector<f64>,
    /// the residual `$\vec{y} - \mathbf{D}\vec{c}$`, in the row order of
    /// the design matrix
    pub residual: DVector<f64>,
}

/// Solve the linear least squares problem of one group.
///
/// With `non_negative` the clp are additionally constrained to be
/// non-negative and the problem is solved with the active set method of
/// Lawson and Hanson; otherwise a singular value decomposition gives the
/// minimum norm least squares solution, which also handles rank deficient
/// design matrices (as produced e.g. by zero filled group merges).
///
/// Returns `None` when the decomposition fails or the active set method
/// does not converge; the caller decides how to report the failure.
pub fn solve(
    design: &DMatrix<f64>,
    data: &DVector<f64>,
    non_negative: bool,
) -> Option<LinearSolution> {
    let clp = if non_negative {
        solve_non_negative(design, data)?
    } else {
        solve_unconstrained(design, data)?
    };
    let residual = data - design * &clp;
    Some(LinearSolution { clp, residual })
}

/// minimum norm least squares via singular value decomposition
fn solve_unconstrained(design: &DMatrix<f64>, data: &DVector<f64>) -> Option<DVector<f64>> {
    design
        .clone()
        .svd(true, true)
        .solve(data, SVD_EPSILON)
        .ok()
}

/// Non-negative least squares with the active set method of Lawson and
/// Hanson.
///
/// Columns enter the passive set one at a time by largest positive
/// gradient of the objective; the unconstrained sub-solve on the passive
/// columns is repaired whenever it turns a coefficient negative.
fn solve_non_negative(design: &DMatrix<f64>, data: &DVector<f64>) -> Option<DVector<f64>> {
    let n = design.ncols();
    let mut x = DVector::zeros(n);
    let mut passive = vec![false; n];
    let tolerance = f64::EPSILON * design.amax().max(1.0) * design.nrows() as f64;
    // generous cap, the method terminates far earlier in practice
    let max_iterations = 3 * n.max(1);

    for _ in 0..max_iterations {
        let gradient = design.transpose() * (data - design * &x);
        let candidate = (0..n)
            .filter(|&i| !passive[i])
            .max_by(|&a, &b| gradient[a].total_cmp(&gradient[b]));
        match candidate {
            Some(i) if gradient[i] > tolerance => passive[i] = true,
            _ => return Some(x),
        }

        loop {
            let columns: Vec<usize> = (0..n).filter(|&i| passive[i]).collect();
            let sub_design = design.select_columns(columns.iter());
            let z_passive = sub_design.svd(true, true).solve(data, SVD_EPSILON).ok()?;

            if z_passive.iter().all(|&z| z > 0.0) {
                x = DVector::zeros(n);
                for (&column, &z) in columns.iter().zip(z_passive.iter()) {
                    x[column] = z;
                }
                break;
            }

            // step from x towards z only as far as no passive coefficient
            // turns negative, then drop the binding coefficients
            let mut alpha = f64::INFINITY;
            for (&column, &z) in columns.iter().zip(z_passive.iter()) {
                if z <= 0.0 {
                    alpha = alpha.min(x[column] / (x[column] - z));
                }
            }
            for (&column, &z) in columns.iter().zip(z_passive.iter()) {
                x[column] += alpha * (z - x[column]);
            }
            for &column in &columns {
                if x[column] <= tolerance {
                    x[column] = 0.0;
                    passive[column] = false;
                }
            }
        }
    }
    // ran out of iterations without converging
    None
}

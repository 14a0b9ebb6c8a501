use nalgebra::{DMatrix, DVector};


/// Compute all eigenvalues and right eigenvectors of a general real square
/// matrix.
///
/// nalgebra only offers eigenvectors for symmetric matrices, so this
/// recovers them by hand: the (real) eigenvalues come from the Schur
/// decomposition, the eigenvector for each eigenvalue from one pass of
/// shifted inverse iteration started from a fixed vector of ones. No
/// randomization is involved, so results are reproducible bit for bit.
///
/// Returns `(eigenvalues, eigenvectors)` where column `i` of the
/// eigenvector matrix belongs to eigenvalue `i`. Returns `None` when the
/// matrix has complex eigenvalues or the iteration cannot be carried out.
pub(crate) fn eigen_real(matrix: &DMatrix<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
    let size = matrix.nrows();
    debug_assert_eq!(size, matrix.ncols(), "eigen_real requires a square matrix");
    // None here means a complex eigenvalue pair
    let eigenvalues = matrix.eigenvalues()?;

    let scale = matrix.amax().max(1.0);
    let mut eigenvectors = DMatrix::zeros(size, size);
    for (i, &eigenvalue) in eigenvalues.iter().enumerate() {
        // shift slightly off the eigenvalue so the shifted matrix stays
        // invertible
        let shift = eigenvalue + scale * 1e-10;
        let shifted = matrix - DMatrix::identity(size, size) * shift;
        let lu = shifted.full_piv_lu();
        let mut vector = DVector::from_element(size, 1.0);
        for _ in 0..5 {
            vector = lu.solve(&vector)?;
            let norm = vector.norm();
            if !norm.is_finite() || norm == 0.0 {
                return None;
            }
            vector /= norm;
        }
        // fix the sign so the largest magnitude component is positive
        let pivot = vector.iter().cloned().fold(0.0f64, |acc, x| {
            if x.abs() > acc.abs() {
                x
            } else {
                acc
            }
        });
        if pivot < 0.0 {
            vector = -vector;
        }
        eigenvectors.set_column(i, &vector);
    }
    Some((eigenvalues, eigenvectors))
}

/// The scaled complementary error function
/// `$\mathrm{erfcx}(x) = e^{x^2}\,\mathrm{erfc}(x)$`.
///
/// For moderate arguments the product is formed directly (both factors are
/// representable up to `x` around 26); beyond that the asymptotic expansion
/// `$\mathrm{erfcx}(x) \approx (x\sqrt{\pi})^{-1}(1 - \tfrac{1}{2x^2} + \tfrac{3}{4x^4})$`
/// takes over.
pub(crate) fn erfcx(x: f64) -> f64 {
    if x < 26.0 {
        statrs::function::erf::erfc(x) * (x * x).exp()
    } else {
        let inv_sq = 1.0 / (x * x);
        (1.0 - 0.5 * inv_sq + 0.75 * inv_sq * inv_sq)
            / (x * std::f64::consts::PI.sqrt())
    }
}

/// Discrete convolution of `signal` with `kernel`, truncated to the length
/// of `signal` and centered like numpy's `convolve(..., mode="same")`.
pub(crate) fn convolve_same(signal: &DVector<f64>, kernel: &DVector<f64>) -> DVector<f64> {
    let n = signal.len();
    let m = kernel.len();
    if n == 0 || m == 0 {
        return DVector::zeros(n);
    }
    let offset = (m - 1) / 2;
    let mut result = DVector::zeros(n);
    for i in 0..n {
        let full_index = i + offset;
        let mut acc = 0.0;
        // full convolution index k ranges over the kernel where the signal
        // index stays in bounds
        let k_min = full_index.saturating_sub(n - 1);
        let k_max = full_index.min(m - 1);
        for k in k_min..=k_max {
            acc += kernel[k] * signal[full_index - k];
        }
        result[i] = acc;
    }
    result
}

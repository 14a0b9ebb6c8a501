use crate::model::ModelError;
use crate::parameter::ParameterError;
use thiserror::Error as ThisError;

/// Errors surfaced by the fitting engine.
///
/// Configuration errors (`Model`, `Parameter`, `MissingDataset`,
/// `EmptyMatrix`) abort a fit before or at the first residual evaluation.
/// Numeric errors (`NonRealRates`, `SingularAMatrix`, `LinearSolveFailed`)
/// are hard failures of the current evaluation and are never masked by
/// substituting zeros or NaNs. Nothing is retried.
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum FitError {
    /// the model failed validation
    #[error(transparent)]
    Model(#[from] ModelError),

    /// a parameter label could not be resolved
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// the model declares a dataset that is missing from the data
    /// collection
    #[error("Dataset '{}' is declared by the model but missing from the data.", label)]
    MissingDataset {
        /// the missing dataset label
        label: String,
    },

    /// a group produced a design matrix without any columns, i.e. no
    /// megacomplex, baseline or artifact contributes at this index
    #[error("Group {} produced a design matrix with zero coefficients.", index)]
    EmptyMatrix {
        /// the group index
        index: usize,
    },

    /// the compartmental matrix has complex eigenvalues, so no real decay
    /// rates exist
    #[error("K-matrix of dataset '{}' has no real eigendecomposition.", dataset)]
    NonRealRates {
        /// the dataset whose k-matrix failed
        dataset: String,
    },

    /// the eigenvector matrix could not be inverted to apply the initial
    /// concentration
    #[error("Eigenvector matrix of dataset '{}' is singular.", dataset)]
    SingularAMatrix {
        /// the dataset whose A-matrix failed
        dataset: String,
    },

    /// the linear least squares solve for a group failed
    #[error("Linear least squares solve failed for group {}.", index)]
    LinearSolveFailed {
        /// the group index
        index: usize,
    },

    /// a simulation amplitude spectrum does not match the estimated axis
    #[error(
        "Amplitude spectrum of clp '{}' has {} entries, expected {}.",
        label,
        actual,
        expected
    )]
    AmplitudeLengthMismatch {
        /// the clp label of the offending spectrum
        label: String,
        /// number of entries in the given spectrum
        actual: usize,
        /// length of the estimated axis
        expected: usize,
    },

    /// the singular value decomposition of a residual matrix did not
    /// converge
    #[error("SVD of the residual of dataset '{}' did not converge.", dataset)]
    ResidualSvdFailed {
        /// the dataset whose residual was decomposed
        dataset: String,
    },

    /// the worker thread pool could not be constructed
    #[error("Failed to build the worker thread pool: {}", reason)]
    WorkerPool {
        /// the underlying pool build error
        reason: String,
    },

    /// the nonlinear minimization terminated unsuccessfully
    #[error("Nonlinear minimization did not terminate successfully.")]
    MinimizationFailed,
}

use crate::parameter::ParameterError;
use thiserror::Error as ThisError;

/// Errors detected while validating a model against its datasets and a
/// parameter snapshot. All of these indicate a misconfigured model and are
/// reported before the optimizer is ever invoked.
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum ModelError {
    /// a dataset references a megacomplex the model does not declare
    #[error("Dataset '{}' references unknown megacomplex '{}'.", dataset, label)]
    UnknownMegacomplex {
        /// the referencing dataset
        dataset: String,
        /// the missing megacomplex label
        label: String,
    },

    /// a megacomplex references a k-matrix the model does not declare
    #[error("Megacomplex '{}' references unknown k-matrix '{}'.", megacomplex, label)]
    UnknownKMatrix {
        /// the referencing megacomplex
        megacomplex: String,
        /// the missing k-matrix label
        label: String,
    },

    /// a dataset references an instrument response function the model does
    /// not declare
    #[error("Dataset '{}' references unknown irf '{}'.", dataset, label)]
    UnknownIrf {
        /// the referencing dataset
        dataset: String,
        /// the missing irf label
        label: String,
    },

    /// a Gaussian irf declares no center or center, width and scale lists
    /// of different lengths
    #[error(
        "Gaussian irf '{}' has {} centers, {} widths and {} scales.",
        label,
        centers,
        widths,
        scales
    )]
    MismatchedIrf {
        /// the offending irf label
        label: String,
        /// number of declared centers
        centers: usize,
        /// number of declared widths
        widths: usize,
        /// number of declared scales
        scales: usize,
    },

    /// a dataset references an initial concentration the model does not
    /// declare
    #[error(
        "Dataset '{}' references unknown initial concentration '{}'.",
        dataset,
        label
    )]
    UnknownInitialConcentration {
        /// the referencing dataset
        dataset: String,
        /// the missing initial concentration label
        label: String,
    },

    /// a k-matrix, constraint or initial concentration uses a compartment
    /// that is not declared on the model
    #[error("Unknown compartment '{}' referenced by {}.", label, referenced_by)]
    UnknownCompartment {
        /// the missing compartment label
        label: String,
        /// a description of the referencing item
        referenced_by: String,
    },

    /// a dataset has k-matrices attached but no initial concentration
    #[error("No initial concentration specified in dataset '{}'.", dataset)]
    MissingInitialConcentration {
        /// the offending dataset
        dataset: String,
    },

    /// an initial concentration declares a different number of compartments
    /// and parameters
    #[error(
        "Initial concentration '{}' has {} compartments but {} parameters.",
        label,
        compartments,
        parameters
    )]
    MismatchedInitialConcentration {
        /// the offending initial concentration label
        label: String,
        /// number of declared compartments
        compartments: usize,
        /// number of declared parameters
        parameters: usize,
    },

    /// the raw data array of a dataset does not match its axes
    #[error(
        "Data of dataset '{}' has shape {}x{}, but the axes imply {}x{}.",
        label,
        data_rows,
        data_cols,
        estimated_len,
        calculated_len
    )]
    DataShapeMismatch {
        /// the offending dataset
        label: String,
        /// rows of the raw data array
        data_rows: usize,
        /// columns of the raw data array
        data_cols: usize,
        /// length of the estimated axis
        estimated_len: usize,
        /// length of the calculated axis
        calculated_len: usize,
    },

    /// a referenced parameter label does not exist in the parameter group
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

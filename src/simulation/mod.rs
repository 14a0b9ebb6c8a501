//! Forward simulation of datasets from a model.
//!
//! Simulation runs the matrix builder in the opposite direction of a fit:
//! given a parameter snapshot and amplitude spectra for the clp, it
//! produces the noise free data a fit would reconstruct. Its main use is
//! generating test problems with known ground truth.

use crate::errors::FitError;
use crate::grouping::GroupItem;
use crate::matrix::calculate_dataset_matrix;
use crate::model::{Dataset, Model};
use crate::parameter::ParameterGroup;
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;


/// Simulate one dataset of a model on the given axes.
///
/// `amplitudes` maps clp labels to their spectrum over the estimated axis;
/// labels without a spectrum contribute nothing. The returned dataset has
/// one row per estimated axis value, built exactly like the matrices of a
/// fit, so fitting the simulated data with the same model and parameters
/// gives a zero residual.
///
/// # Errors
/// Fails on dangling model references for the dataset and on the same
/// numeric conditions as the matrix builder, and if an amplitude spectrum
/// has a different length than the estimated axis.
pub fn simulate(
    model: &Model,
    parameters: &ParameterGroup,
    dataset: &str,
    calculated_axis: DVector<f64>,
    estimated_axis: DVector<f64>,
    amplitudes: &HashMap<String, DVector<f64>>,
) -> Result<Dataset, FitError> {
    for (label, spectrum) in amplitudes {
        if spectrum.len() != estimated_axis.len() {
            return Err(FitError::AmplitudeLengthMismatch {
                label: label.clone(),
                actual: spectrum.len(),
                expected: estimated_axis.len(),
            });
        }
    }

    // the matrix builder reads the calculated axis from the data
    // collection, so hand it an empty carrier dataset
    let carrier = Dataset::new(
        dataset,
        calculated_axis.clone(),
        estimated_axis.clone(),
        DMatrix::zeros(estimated_axis.len(), calculated_axis.len()),
    )?;
    let mut data = HashMap::new();
    data.insert(dataset.to_owned(), carrier);

    let mut simulated = DMatrix::zeros(estimated_axis.len(), calculated_axis.len());
    for (estimated_index, &value) in estimated_axis.iter().enumerate() {
        let item = GroupItem {
            value,
            dataset: dataset.to_owned(),
            estimated_index,
        };
        let matrix = calculate_dataset_matrix(&item, model, parameters, &data)?;
        let mut trace = DVector::zeros(calculated_axis.len());
        for (column, label) in matrix.clp_labels.iter().enumerate() {
            if let Some(spectrum) = amplitudes.get(label) {
                trace += matrix.matrix.column(column) * spectrum[estimated_index];
            }
        }
        simulated.row_mut(estimated_index).copy_from(&trace.transpose());
    }

    Dataset::new(dataset, calculated_axis, estimated_axis, simulated).map_err(FitError::from)
}

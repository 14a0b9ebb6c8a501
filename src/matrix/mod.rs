use crate::errors::FitError;
use crate::grouping::{Group, GroupItem};
use crate::linalg::{convolve_same, eigen_real, erfcx};
use crate::model::{
    CompartmentConstraint, Dataset, DatasetDescriptor, EvaluatedGaussianIrf, Irf, KMatrix, Model,
    ModelError,
};
use crate::parameter::ParameterGroup;
use nalgebra::{DMatrix, DVector};
use statrs::function::erf::erf;
use std::collections::HashMap;
use std::f64::consts::SQRT_2;

#[cfg(test)]
mod test;

/// The concentration matrix of one dataset at one group index, before the
/// group level label merge.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetMatrix {
    /// the matrix, `calculated axis x coefficients`
    pub matrix: DMatrix<f64>,
    /// one label per column
    pub clp_labels: Vec<String>,
}

/// The matrices of all datasets of one group, merged onto a common clp
/// label set.
///
/// Each block is stored `clp x calculated axis` and is indexed by the
/// merged label list: columns a dataset does not contribute are zero
/// filled rather than rejected (the merge rule of the original engine).
/// `raw_clp_labels` keeps each dataset's own label list from before the
/// merge; the result assembler needs it to reconstruct per dataset label
/// sets.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupItemMatrix {
    /// one `clp x calculated` block per dataset, in group item order
    pub concentrations: Vec<DMatrix<f64>>,
    /// the merged clp labels, indexing the rows of every block
    pub clp_labels: Vec<String>,
    /// the unmerged label list of every dataset, in group item order
    pub raw_clp_labels: Vec<Vec<String>>,
}

impl GroupItemMatrix {
    /// Stack the blocks into the design matrix of the group's least
    /// squares problem: `sum of calculated axis sizes x merged clp count`,
    /// block rows in group item order (matching the data group layout).
    pub fn design_matrix(&self) -> DMatrix<f64> {
        let rows: usize = self.concentrations.iter().map(|block| block.ncols()).sum();
        let mut design = DMatrix::zeros(rows, self.clp_labels.len());
        let mut offset = 0;
        for block in &self.concentrations {
            design
                .view_mut((offset, 0), (block.ncols(), block.nrows()))
                .copy_from(&block.transpose());
            offset += block.ncols();
        }
        design
    }
}

/// Build the concentration matrices of all datasets of one group and merge
/// their clp labels.
///
/// # Errors
/// Configuration errors (missing datasets or initial concentrations) and
/// numeric errors (non-real rates, singular eigenvector matrices) abort
/// the whole evaluation.
pub fn calculate_group_item(
    group: &Group,
    model: &Model,
    parameters: &ParameterGroup,
    data: &HashMap<String, Dataset>,
) -> Result<GroupItemMatrix, FitError> {
    let mut dataset_matrices = Vec::with_capacity(group.items.len());
    for item in &group.items {
        dataset_matrices.push(calculate_dataset_matrix(item, model, parameters, data)?);
    }

    // union of the per dataset labels, first seen wins
    let mut clp_labels: Vec<String> = Vec::new();
    for dataset_matrix in &dataset_matrices {
        for label in &dataset_matrix.clp_labels {
            if !clp_labels.contains(label) {
                clp_labels.push(label.clone());
            }
        }
    }

    let mut concentrations = Vec::with_capacity(dataset_matrices.len());
    let mut raw_clp_labels = Vec::with_capacity(dataset_matrices.len());
    for dataset_matrix in dataset_matrices {
        let n_time = dataset_matrix.matrix.nrows();
        // widen to the merged label set, zero filling absent columns
        let mut block = DMatrix::zeros(clp_labels.len(), n_time);
        for (column, label) in dataset_matrix.clp_labels.iter().enumerate() {
            let row = clp_labels
                .iter()
                .position(|l| l == label)
                .expect("merged labels contain every dataset label");
            block
                .row_mut(row)
                .copy_from(&dataset_matrix.matrix.column(column).transpose());
        }
        concentrations.push(block);
        raw_clp_labels.push(dataset_matrix.clp_labels);
    }

    Ok(GroupItemMatrix {
        concentrations,
        clp_labels,
        raw_clp_labels,
    })
}

/// Build the concentration matrix of a single dataset at one estimated
/// axis value.
pub fn calculate_dataset_matrix(
    item: &GroupItem,
    model: &Model,
    parameters: &ParameterGroup,
    data: &HashMap<String, Dataset>,
) -> Result<DatasetMatrix, FitError> {
    let descriptor = model
        .dataset(&item.dataset)
        .ok_or_else(|| FitError::MissingDataset {
            label: item.dataset.clone(),
        })?;
    let dataset = data
        .get(&item.dataset)
        .ok_or_else(|| FitError::MissingDataset {
            label: item.dataset.clone(),
        })?;
    let time = dataset.calculated_axis();
    let irf = match descriptor.irf.as_deref() {
        Some(label) => Some(model.irf(label).ok_or_else(|| ModelError::UnknownIrf {
            dataset: descriptor.label.clone(),
            label: label.to_owned(),
        })?),
        None => None,
    };

    let mut matrix: Option<DatasetMatrix> = None;

    let dataset_scale = descriptor
        .scaling
        .as_deref()
        .map(|label| parameters.value(label))
        .transpose()?
        .unwrap_or(1.0);

    for megacomplex_label in &descriptor.megacomplexes {
        let megacomplex =
            model
                .megacomplex(megacomplex_label)
                .ok_or(ModelError::UnknownMegacomplex {
                    dataset: descriptor.label.clone(),
                    label: megacomplex_label.clone(),
                })?;
        let mut k_matrix: Option<KMatrix> = None;
        for label in &megacomplex.k_matrices {
            let next = model.k_matrix(label).ok_or(ModelError::UnknownKMatrix {
                megacomplex: megacomplex_label.clone(),
                label: label.clone(),
            })?;
            k_matrix = Some(match k_matrix {
                Some(combined) => combined.combine(next),
                None => next.clone(),
            });
        }
        let Some(k_matrix) = k_matrix else {
            continue;
        };

        let scale = dataset_scale
            * descriptor
                .megacomplex_scaling_of(megacomplex_label)
                .map(|label| parameters.value(label))
                .transpose()?
                .unwrap_or(1.0);

        let contribution =
            kinetic_contribution(descriptor, &k_matrix, model, parameters, time, irf, item)?
                .scaled(scale);

        matrix = Some(match matrix {
            None => contribution,
            Some(merged) => merge_columns(merged, contribution),
        });
    }

    for constraint in &descriptor.constraints {
        if let Some(dataset_matrix) = matrix.as_mut() {
            apply_constraint(dataset_matrix, constraint, parameters, item.value)?;
        }
    }

    let mut matrix = matrix.unwrap_or_else(|| DatasetMatrix {
        matrix: DMatrix::zeros(time.len(), 0),
        clp_labels: Vec::new(),
    });

    if descriptor.baseline {
        let baseline = DVector::from_element(time.len(), 1.0);
        matrix = append_column(matrix, format!("{}_baseline", descriptor.label), baseline);
    }

    if let Some(Irf::Gaussian(gaussian)) = irf {
        if gaussian.coherent_artifact_order > 0 {
            let evaluated = gaussian.evaluate(parameters, item.value)?;
            for (order, column) in
                coherent_artifact_columns(time, &evaluated, gaussian.coherent_artifact_order)
                    .into_iter()
                    .enumerate()
            {
                matrix = append_column(
                    matrix,
                    format!("coherent_artifact_{}", order + 1),
                    column,
                );
            }
        }
    }

    Ok(matrix)
}

impl DatasetMatrix {
    fn scaled(mut self, scale: f64) -> Self {
        if scale != 1.0 {
            self.matrix *= scale;
        }
        self
    }
}

/// merge two matrices column wise over the union of their labels, summing
/// contributions of shared compartments
fn merge_columns(left: DatasetMatrix, right: DatasetMatrix) -> DatasetMatrix {
    let mut labels = left.clp_labels.clone();
    for label in &right.clp_labels {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }
    let n_time = left.matrix.nrows();
    let mut matrix = DMatrix::zeros(n_time, labels.len());
    for (target, label) in labels.iter().enumerate() {
        let mut column = DVector::zeros(n_time);
        if let Some(i) = left.clp_labels.iter().position(|l| l == label) {
            column += left.matrix.column(i);
        }
        if let Some(i) = right.clp_labels.iter().position(|l| l == label) {
            column += right.matrix.column(i);
        }
        matrix.column_mut(target).copy_from(&column);
    }
    DatasetMatrix {
        matrix,
        clp_labels: labels,
    }
}

fn append_column(mut matrix: DatasetMatrix, label: String, column: DVector<f64>) -> DatasetMatrix {
    let ncols = matrix.matrix.ncols();
    matrix.matrix = matrix.matrix.insert_column(ncols, 0.0);
    matrix.matrix.column_mut(ncols).copy_from(&column);
    matrix.clp_labels.push(label);
    matrix
}

/// the kinetic part of a dataset matrix for one (combined) k-matrix
fn kinetic_contribution(
    descriptor: &DatasetDescriptor,
    k_matrix: &KMatrix,
    model: &Model,
    parameters: &ParameterGroup,
    time: &DVector<f64>,
    irf: Option<&Irf>,
    item: &GroupItem,
) -> Result<DatasetMatrix, FitError> {
    let initial_label = descriptor.initial_concentration.as_deref().ok_or(
        ModelError::MissingInitialConcentration {
            dataset: descriptor.label.clone(),
        },
    )?;
    let initial = model.initial_concentration(initial_label).ok_or(
        ModelError::UnknownInitialConcentration {
            dataset: descriptor.label.clone(),
            label: initial_label.to_owned(),
        },
    )?;

    // restrict the initial concentration to the compartments this k-matrix
    // involves, keeping the initial concentration order
    let involved = k_matrix.involved_compartments();
    let mut compartments = Vec::new();
    let mut concentration = Vec::new();
    for (compartment, parameter) in initial.compartments.iter().zip(&initial.parameters) {
        if involved.contains(&compartment.as_str()) {
            compartments.push(compartment.clone());
            concentration.push(parameters.value(parameter)?);
        }
    }
    for compartment in &involved {
        if !compartments.iter().any(|c| c == compartment) {
            return Err(ModelError::UnknownCompartment {
                label: (*compartment).to_owned(),
                referenced_by: format!("initial concentration '{}'", initial.label),
            }
            .into());
        }
    }

    let full = k_matrix.full(&compartments, parameters)?;
    let (eigenvalues, eigenvectors) =
        eigen_real(&full).ok_or_else(|| FitError::NonRealRates {
            dataset: descriptor.label.clone(),
        })?;
    let rates = -eigenvalues;

    let decays = match irf {
        Some(Irf::Gaussian(gaussian)) => {
            let evaluated = gaussian.evaluate(parameters, item.value)?;
            gaussian_irf_decays(time, &rates, &evaluated)
        }
        Some(Irf::Measured(measured)) => {
            let mut decays = plain_decays(time, &rates);
            let curve = measured.curve_at(item.value);
            for mut column in decays.column_iter_mut() {
                let convolved = convolve_same(&column.clone_owned(), &curve);
                column.copy_from(&convolved);
            }
            decays
        }
        None => plain_decays(time, &rates),
    };

    // amplitude matrix: row i is eigenvector i scaled by
    // gamma_i = (V^-1 j)_i
    let inverse = eigenvectors
        .clone()
        .try_inverse()
        .ok_or_else(|| FitError::SingularAMatrix {
            dataset: descriptor.label.clone(),
        })?;
    let gamma = inverse * DVector::from(concentration);
    let size = compartments.len();
    let mut a_matrix = DMatrix::zeros(size, size);
    for i in 0..size {
        a_matrix
            .row_mut(i)
            .copy_from(&(eigenvectors.column(i).transpose() * gamma[i]));
    }

    Ok(DatasetMatrix {
        matrix: decays * a_matrix,
        clp_labels: compartments,
    })
}

/// decay curves without instrument response, one column per rate
fn plain_decays(time: &DVector<f64>, rates: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(time.len(), rates.len(), |row, col| {
        (-rates[col] * time[row]).exp()
    })
}

/// decay curves convolved with a (multi-) Gaussian instrument response,
/// using the analytic expression for the convolution integral
fn gaussian_irf_decays(
    time: &DVector<f64>,
    rates: &DVector<f64>,
    irf: &EvaluatedGaussianIrf,
) -> DMatrix<f64> {
    let scale_sum: f64 = irf.scales.iter().sum();
    let mut decays = DMatrix::zeros(time.len(), rates.len());
    for ((&center, &width), &scale) in irf
        .centers
        .iter()
        .zip(&irf.widths)
        .zip(&irf.scales)
    {
        for (col, &rate) in rates.iter().enumerate() {
            for (row, &t) in time.iter().enumerate() {
                let mut value = scale * gaussian_irf_decay(t, rate, center, width);
                if let Some(period) = irf.backsweep_period {
                    value += scale * backsweep_correction(t, rate, center, period);
                }
                decays[(row, col)] += value;
            }
        }
    }
    decays / scale_sum
}

/// One point of the analytic convolution of `$e^{-kt}$` with a normalized
/// Gaussian of the given center and width:
///
/// ```math
/// c(t) = \frac{1}{2} e^{\alpha(\alpha - 2\beta)}\,\mathrm{erfc}(\alpha - \beta),
/// \quad \alpha = \frac{k\sigma}{\sqrt{2}}, \quad \beta = \frac{t-\mu}{\sigma\sqrt{2}}
/// ```
///
/// evaluated through erfcx on the early-time branch where the exponential
/// factor alone would overflow.
fn gaussian_irf_decay(t: f64, rate: f64, center: f64, width: f64) -> f64 {
    let alpha = rate * width / SQRT_2;
    let beta = (t - center) / (width * SQRT_2);
    let thresh = beta - alpha;
    if thresh < -1.0 {
        0.5 * erfcx(-thresh) * (-beta * beta).exp()
    } else {
        0.5 * (1.0 + erf(thresh)) * (alpha * (alpha - 2.0 * beta)).exp()
    }
}

/// periodic folding correction for backsweep acquisition
fn backsweep_correction(t: f64, rate: f64, center: f64, period: f64) -> f64 {
    if period <= 0.0 {
        return 0.0;
    }
    let x1 = (-rate * (t - center + period)).exp();
    let x2 = (-rate * (period / 2.0 - (t - center))).exp();
    let x3 = (-rate * period).exp();
    (x1 + x2) / (1.0 - x3)
}

/// the coherent artifact columns: the irf Gaussian and its first
/// derivatives, one column per order
fn coherent_artifact_columns(
    time: &DVector<f64>,
    irf: &EvaluatedGaussianIrf,
    order: usize,
) -> Vec<DVector<f64>> {
    let center = irf.centers[0];
    let width = irf.widths[0];
    let gaussian = time.map(|t| {
        let d = (t - center) / width;
        (-0.5 * d * d).exp()
    });
    let mut columns = vec![gaussian.clone()];
    if order > 1 {
        columns.push(DVector::from_fn(time.len(), |row, _| {
            let d = (time[row] - center) / width;
            -d / width * gaussian[row]
        }));
    }
    if order > 2 {
        columns.push(DVector::from_fn(time.len(), |row, _| {
            let d = (time[row] - center) / width;
            (d * d - 1.0) / (width * width) * gaussian[row]
        }));
    }
    columns.truncate(order.min(3));
    columns
}

/// apply a zero or equal constraint to the matrix when it is active at the
/// given estimated axis value
fn apply_constraint(
    matrix: &mut DatasetMatrix,
    constraint: &CompartmentConstraint,
    parameters: &ParameterGroup,
    index: f64,
) -> Result<(), FitError> {
    if !constraint.applies(index) {
        return Ok(());
    }
    match constraint {
        CompartmentConstraint::Zero { compartment, .. } => {
            if let Some(position) = matrix.clp_labels.iter().position(|l| l == compartment) {
                matrix.matrix = matrix.matrix.clone().remove_column(position);
                matrix.clp_labels.remove(position);
            }
        }
        CompartmentConstraint::Equal {
            compartment,
            targets,
            ..
        } => {
            if let Some(position) = matrix.clp_labels.iter().position(|l| l == compartment) {
                // previous unconstrained values are discarded, not summed
                let mut column = DVector::zeros(matrix.matrix.nrows());
                for (target, parameter) in targets {
                    if let Some(target_position) =
                        matrix.clp_labels.iter().position(|l| l == target)
                    {
                        let weight = parameters.value(parameter)?;
                        column += matrix.matrix.column(target_position) * weight;
                    }
                }
                matrix.matrix.column_mut(position).copy_from(&column);
            }
        }
        // equal area ties integrated amplitudes, the matrix is untouched
        CompartmentConstraint::EqualArea { .. } => {}
    }
    Ok(())
}

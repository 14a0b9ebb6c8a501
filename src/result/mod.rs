//! Assembly of per dataset results after the optimization has converged.
//!
//! During the fit everything lives in group order; a [`FitResult`] re-sorts
//! the converged group solutions back into per dataset quantities: fitted
//! traces, concentration matrices, clp spectra and residuals, each indexed
//! by the dataset's own axes again.

use crate::errors::FitError;
use crate::grouping::Group;
use crate::model::{Dataset, Model};
use crate::parameter::ParameterGroup;
use crate::problem::{FitProblem, GroupSolution};
use nalgebra::{DMatrix, DVector, SVD};
use std::collections::HashMap;


/// The singular value decomposition of a dataset's residual matrix, the
/// usual quick check for structure left in the residual.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualSvd {
    /// left singular vectors, one column per component over the estimated
    /// axis
    pub left_singular_vectors: DMatrix<f64>,
    /// singular values in descending order
    pub singular_values: DVector<f64>,
    /// right singular vectors, one row per component over the calculated
    /// axis
    pub right_singular_vectors: DMatrix<f64>,
}

/// The result of a converged fit.
pub struct FitResult {
    model: Model,
    data: HashMap<String, Dataset>,
    parameters: ParameterGroup,
    groups: Vec<Group>,
    solutions: Vec<GroupSolution>,
    number_of_evaluations: usize,
    objective_function: f64,
}

impl FitResult {
    /// Build the result from a converged problem: evaluates the problem
    /// once more at the best fit position, on the calling thread, and
    /// keeps the group solutions for the per dataset accessors.
    pub(crate) fn new(
        problem: FitProblem,
        number_of_evaluations: usize,
        objective_function: f64,
    ) -> Result<Self, FitError> {
        let solutions = problem.evaluate_serial(problem.parameters())?;
        Ok(Self {
            model: problem.model().clone(),
            data: problem.data().clone(),
            parameters: problem.parameters().clone(),
            groups: problem.groups().to_vec(),
            solutions,
            number_of_evaluations,
            objective_function,
        })
    }

    /// the best fit parameter snapshot
    pub fn best_fit_parameters(&self) -> &ParameterGroup {
        &self.parameters
    }

    /// the fitted model
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// the observed data the model was fitted to
    pub fn data(&self) -> &HashMap<String, Dataset> {
        &self.data
    }

    /// the groups the datasets were partitioned into
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// the converged group solutions in group order
    pub fn group_solutions(&self) -> &[GroupSolution] {
        &self.solutions
    }

    /// number of residual evaluations the optimizer spent
    pub fn number_of_evaluations(&self) -> usize {
        self.number_of_evaluations
    }

    /// the optimizer's objective function at the best fit position
    pub fn objective_function(&self) -> f64 {
        self.objective_function
    }

    /// the sum of squared residuals over all groups
    pub fn chi_square(&self) -> f64 {
        self.solutions
            .iter()
            .map(|s| s.solution.residual.norm_squared())
            .sum()
    }

    /// The clp labels of one dataset: the union of its per group labels in
    /// first seen order. Constraints can make this vary along the
    /// estimated axis, which is why the union is taken.
    ///
    /// # Errors
    /// Fails if the dataset is not part of the fit.
    pub fn clp_labels(&self, dataset: &str) -> Result<Vec<String>, FitError> {
        self.require_dataset(dataset)?;
        let mut labels: Vec<String> = Vec::new();
        for (group, solution) in self.groups.iter().zip(&self.solutions) {
            if let Some(index) = group.dataset_index(dataset) {
                for label in &solution.matrix.raw_clp_labels[index] {
                    if !labels.contains(label) {
                        labels.push(label.clone());
                    }
                }
            }
        }
        Ok(labels)
    }

    /// The fitted dataset: the model's reconstruction
    /// `$\vec{c}^T \mathbf{C}$` of every observed trace, on the same axes
    /// as the observed dataset.
    ///
    /// # Errors
    /// Fails if the dataset is not part of the fit.
    pub fn fitted_dataset(&self, dataset: &str) -> Result<Dataset, FitError> {
        let observed = self.require_dataset(dataset)?;
        let mut fitted = DMatrix::zeros(
            observed.estimated_axis().len(),
            observed.calculated_axis().len(),
        );
        for (group, solution) in self.groups.iter().zip(&self.solutions) {
            if let Some(index) = group.dataset_index(dataset) {
                let block = &solution.matrix.concentrations[index];
                let trace = solution.solution.clp.transpose() * block;
                fitted
                    .row_mut(group.items[index].estimated_index)
                    .copy_from(&trace);
            }
        }
        Dataset::new(
            dataset,
            observed.calculated_axis().clone(),
            observed.estimated_axis().clone(),
            fitted,
        )
        .map_err(FitError::from)
    }

    /// The concentration matrices of one dataset: for every estimated axis
    /// index the `clp x calculated` matrix of the group it was solved in,
    /// restricted to this dataset's [`clp_labels`](Self::clp_labels) (rows
    /// of labels a group does not carry are zero).
    ///
    /// # Errors
    /// Fails if the dataset is not part of the fit.
    pub fn concentrations(&self, dataset: &str) -> Result<Vec<DMatrix<f64>>, FitError> {
        let observed = self.require_dataset(dataset)?;
        let labels = self.clp_labels(dataset)?;
        let n_time = observed.calculated_axis().len();
        let mut concentrations =
            vec![DMatrix::zeros(labels.len(), n_time); observed.estimated_axis().len()];
        for (group, solution) in self.groups.iter().zip(&self.solutions) {
            if let Some(index) = group.dataset_index(dataset) {
                let block = &solution.matrix.concentrations[index];
                let target = &mut concentrations[group.items[index].estimated_index];
                for (row, label) in labels.iter().enumerate() {
                    if let Some(merged) =
                        solution.matrix.clp_labels.iter().position(|l| l == label)
                    {
                        target.row_mut(row).copy_from(&block.row(merged));
                    }
                }
            }
        }
        Ok(concentrations)
    }

    /// The clp of one dataset as an `estimated x clp` matrix over
    /// [`clp_labels`](Self::clp_labels); entries of labels a group does not
    /// carry are zero.
    ///
    /// # Errors
    /// Fails if the dataset is not part of the fit.
    pub fn clp(&self, dataset: &str) -> Result<DMatrix<f64>, FitError> {
        let observed = self.require_dataset(dataset)?;
        let labels = self.clp_labels(dataset)?;
        let mut clp = DMatrix::zeros(observed.estimated_axis().len(), labels.len());
        for (group, solution) in self.groups.iter().zip(&self.solutions) {
            if let Some(index) = group.dataset_index(dataset) {
                let row = group.items[index].estimated_index;
                for (column, label) in labels.iter().enumerate() {
                    if let Some(merged) =
                        solution.matrix.clp_labels.iter().position(|l| l == label)
                    {
                        clp[(row, column)] = solution.solution.clp[merged];
                    }
                }
            }
        }
        Ok(clp)
    }

    /// The residual of one dataset as an `estimated x calculated` matrix,
    /// cut out of the stacked group residuals.
    ///
    /// # Errors
    /// Fails if the dataset is not part of the fit.
    pub fn residual(&self, dataset: &str) -> Result<DMatrix<f64>, FitError> {
        let observed = self.require_dataset(dataset)?;
        let mut residual = DMatrix::zeros(
            observed.estimated_axis().len(),
            observed.calculated_axis().len(),
        );
        for (group, solution) in self.groups.iter().zip(&self.solutions) {
            if let Some(index) = group.dataset_index(dataset) {
                // rows of earlier items in the group come first in the
                // stacked residual
                let offset: usize = group.items[..index]
                    .iter()
                    .map(|item| {
                        self.data[&item.dataset].calculated_axis().len()
                    })
                    .sum();
                let rows = observed.calculated_axis().len();
                let slice = solution.solution.residual.rows(offset, rows);
                residual
                    .row_mut(group.items[index].estimated_index)
                    .copy_from(&slice.transpose());
            }
        }
        Ok(residual)
    }

    /// the singular value decomposition of one dataset's residual matrix
    ///
    /// # Errors
    /// Fails if the dataset is not part of the fit or the decomposition
    /// does not converge.
    pub fn residual_svd(&self, dataset: &str) -> Result<ResidualSvd, FitError> {
        let residual = self.residual(dataset)?;
        let svd = SVD::try_new(residual, true, true, f64::EPSILON, 0).ok_or_else(|| {
            FitError::ResidualSvdFailed {
                dataset: dataset.to_owned(),
            }
        })?;
        match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => Ok(ResidualSvd {
                left_singular_vectors: u,
                singular_values: svd.singular_values,
                right_singular_vectors: v_t,
            }),
            _ => Err(FitError::ResidualSvdFailed {
                dataset: dataset.to_owned(),
            }),
        }
    }

    fn require_dataset(&self, label: &str) -> Result<&Dataset, FitError> {
        self.data.get(label).ok_or_else(|| FitError::MissingDataset {
            label: label.to_owned(),
        })
    }
}

//! The residual evaluation engine driven by the nonlinear optimizer.
//!
//! [`FitProblem`] implements the
//! [`LeastSquaresProblem`](levenberg_marquardt::LeastSquaresProblem) trait
//! of the [levenberg_marquardt](https://crates.io/crates/levenberg-marquardt)
//! crate: the optimizer pushes parameter vectors in via `set_params` and
//! pulls residual vectors and (forward difference) jacobians out. Every
//! evaluation rebuilds the concentration matrices of all groups from
//! scratch and solves their linear inner problems; with more than one
//! worker the groups are solved on a rayon thread pool, group order (and
//! thus the residual layout) is identical in both modes.

use crate::errors::FitError;
use crate::fit::FitOptions;
use crate::grouping::{create_data_group, create_group, Group};
use crate::matrix::{calculate_group_item, GroupItemMatrix};
use crate::model::{Dataset, Model};
use crate::parameter::ParameterGroup;
use crate::varpro::{self, LinearSolution};
use levenberg_marquardt::LeastSquaresProblem;
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn, Matrix, Vector};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::HashMap;


/// Observer invoked with the parameter snapshot after every position
/// change the optimizer makes.
pub type IterationCallback = Box<dyn Fn(&ParameterGroup) + Send + Sync>;

/// The solved inner problem of one group: its merged concentration
/// matrices together with the linear solution against the group's data.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSolution {
    /// the merged concentration matrices of the group
    pub matrix: GroupItemMatrix,
    /// clp and residual of the linear solve
    pub solution: LinearSolution,
}

/// The full separable fitting problem in the form the nonlinear optimizer
/// consumes.
pub struct FitProblem {
    model: Model,
    data: HashMap<String, Dataset>,
    groups: Vec<Group>,
    data_group: Vec<DVector<f64>>,
    non_negative_clp: bool,
    pool: Option<ThreadPool>,
    // the snapshot and cache for the optimizer's current position; a
    // failed evaluation leaves `solutions` empty, which the optimizer
    // observes as `None` residuals
    parameters: ParameterGroup,
    optimizer_params: DVector<f64>,
    solutions: Option<Vec<GroupSolution>>,
    callback: Option<IterationCallback>,
}

impl FitProblem {
    /// Set up the problem: validate the model, group the datasets, stack
    /// the data and evaluate the starting point.
    ///
    /// # Errors
    /// Configuration errors of the model or data and a failing evaluation
    /// at the starting point are reported here, before any optimization
    /// runs.
    pub fn new(
        model: Model,
        data: HashMap<String, Dataset>,
        parameters: ParameterGroup,
        options: &FitOptions,
    ) -> Result<Self, FitError> {
        model.validate(&parameters)?;
        let groups = create_group(&model, &data, options.group_tolerance)?;
        let data_group = create_data_group(&groups, &data)?;

        let workers = options
            .workers
            .min(std::thread::available_parallelism().map_or(1, |n| n.get()));
        let pool = if workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|error| FitError::WorkerPool {
                        reason: error.to_string(),
                    })?,
            )
        } else {
            None
        };

        let optimizer_params = parameters.optimizer_values();
        let mut problem = Self {
            model,
            data,
            groups,
            data_group,
            non_negative_clp: options.non_negative_clp,
            pool,
            parameters,
            optimizer_params,
            solutions: None,
            callback: None,
        };
        let solutions = problem.evaluate(&problem.parameters)?;
        problem.solutions = Some(solutions);
        Ok(problem)
    }

    /// attach an observer that is called with the new parameter snapshot
    /// whenever the optimizer moves to a new position
    pub fn with_iteration_callback(
        mut self,
        callback: impl Fn(&ParameterGroup) + Send + Sync + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// the parameter snapshot of the optimizer's current position
    pub fn parameters(&self) -> &ParameterGroup {
        &self.parameters
    }

    /// the groups the datasets were partitioned into
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// the model this problem fits
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// the data collection this problem fits
    pub fn data(&self) -> &HashMap<String, Dataset> {
        &self.data
    }

    /// the stacked observations per group
    pub fn data_group(&self) -> &[DVector<f64>] {
        &self.data_group
    }

    /// the group solutions of the current position, if the last evaluation
    /// succeeded
    pub fn solutions(&self) -> Option<&[GroupSolution]> {
        self.solutions.as_deref()
    }

    /// Evaluate all groups for a parameter snapshot: rebuild the
    /// concentration matrices and solve the linear inner problems.
    ///
    /// # Errors
    /// The first failing group aborts the evaluation.
    pub fn evaluate(&self, parameters: &ParameterGroup) -> Result<Vec<GroupSolution>, FitError> {
        match &self.pool {
            Some(pool) => pool.install(|| {
                self.groups
                    .par_iter()
                    .enumerate()
                    .map(|(index, group)| self.solve_group(index, group, parameters))
                    .collect()
            }),
            None => self.evaluate_serial(parameters),
        }
    }

    /// Like [`evaluate`](Self::evaluate), but always on the calling
    /// thread, regardless of the worker configuration. The result assembly
    /// uses this for its final pass after convergence.
    ///
    /// # Errors
    /// The first failing group aborts the evaluation.
    pub fn evaluate_serial(
        &self,
        parameters: &ParameterGroup,
    ) -> Result<Vec<GroupSolution>, FitError> {
        self.groups
            .iter()
            .enumerate()
            .map(|(index, group)| self.solve_group(index, group, parameters))
            .collect()
    }

    fn solve_group(
        &self,
        index: usize,
        group: &Group,
        parameters: &ParameterGroup,
    ) -> Result<GroupSolution, FitError> {
        let matrix = calculate_group_item(group, &self.model, parameters, &self.data)?;
        if matrix.clp_labels.is_empty() {
            return Err(FitError::EmptyMatrix { index });
        }
        let design = matrix.design_matrix();
        let solution = varpro::solve(&design, &self.data_group[index], self.non_negative_clp)
            .ok_or(FitError::LinearSolveFailed { index })?;
        Ok(GroupSolution { matrix, solution })
    }

    fn stacked_residual(solutions: &[GroupSolution]) -> DVector<f64> {
        let rows = solutions
            .iter()
            .map(|s| s.solution.residual.len())
            .sum::<usize>();
        let mut stacked = DVector::zeros(rows);
        let mut offset = 0;
        for solution in solutions {
            let residual = &solution.solution.residual;
            stacked.rows_mut(offset, residual.len()).copy_from(residual);
            offset += residual.len();
        }
        stacked
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for FitProblem {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, params: &Vector<f64, Dyn, Self::ParameterStorage>) {
        self.optimizer_params = params.clone_owned();
        self.solutions = None;
        let Ok(parameters) = self.parameters.updated(params) else {
            return;
        };
        self.parameters = parameters;
        if let Some(callback) = &self.callback {
            callback(&self.parameters);
        }
        self.solutions = self.evaluate(&self.parameters).ok();
    }

    fn params(&self) -> Vector<f64, Dyn, Self::ParameterStorage> {
        self.optimizer_params.clone()
    }

    fn residuals(&self) -> Option<Vector<f64, Dyn, Self::ResidualStorage>> {
        self.solutions.as_deref().map(Self::stacked_residual)
    }

    fn jacobian(&self) -> Option<Matrix<f64, Dyn, Dyn, Self::JacobianStorage>> {
        let base = Self::stacked_residual(self.solutions.as_deref()?);
        let mut jacobian = DMatrix::zeros(base.len(), self.optimizer_params.len());
        for column in 0..self.optimizer_params.len() {
            let mut params = self.optimizer_params.clone();
            let step = f64::EPSILON.sqrt() * params[column].abs().max(1.0);
            params[column] += step;
            let parameters = self.parameters.updated(&params).ok()?;
            let solutions = self.evaluate(&parameters).ok()?;
            let perturbed = Self::stacked_residual(&solutions);
            jacobian
                .column_mut(column)
                .copy_from(&((perturbed - &base) / step));
        }
        Some(jacobian)
    }
}

//! The driver that runs a complete fit.

use crate::errors::FitError;
use crate::model::{Dataset, Model};
use crate::parameter::ParameterGroup;
use crate::problem::FitProblem;
use crate::result::FitResult;
use levenberg_marquardt::LevenbergMarquardt;
use std::collections::HashMap;


/// Options controlling a fit.
///
/// The defaults fit each estimated axis value as its own group
/// (`group_tolerance` zero), solve the clp without sign constraints, run
/// single threaded and give the optimizer a patience of 250 iterations.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// constrain the clp to be non-negative
    pub non_negative_clp: bool,
    /// absolute tolerance for merging estimated axis values into one group
    pub group_tolerance: f64,
    /// number of worker threads for the residual evaluation; values above
    /// the available parallelism are clamped, `1` evaluates serially
    pub workers: usize,
    /// maximum number of optimizer iterations before giving up
    pub max_iterations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            non_negative_clp: false,
            group_tolerance: 0.0,
            workers: 1,
            max_iterations: 250,
        }
    }
}

impl FitOptions {
    /// create the default options
    pub fn new() -> Self {
        Self::default()
    }

    /// constrain the clp to be non-negative
    pub fn with_non_negative_clp(mut self, non_negative_clp: bool) -> Self {
        self.non_negative_clp = non_negative_clp;
        self
    }

    /// set the absolute tolerance for merging estimated axis values
    pub fn with_group_tolerance(mut self, group_tolerance: f64) -> Self {
        self.group_tolerance = group_tolerance;
        self
    }

    /// set the number of worker threads for the residual evaluation
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// set the maximum number of optimizer iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Fit a model to a collection of datasets, starting from the given
/// parameter snapshot.
///
/// # Errors
/// Configuration errors surface before the optimization starts; a
/// nonlinear minimization that terminates for any other reason than
/// convergence is reported as [`FitError::MinimizationFailed`].
pub fn fit(
    model: Model,
    data: HashMap<String, Dataset>,
    parameters: ParameterGroup,
    options: &FitOptions,
) -> Result<FitResult, FitError> {
    run(FitProblem::new(model, data, parameters, options)?, options)
}

/// Like [`fit`], but invokes `callback` with the parameter snapshot of
/// every position the optimizer visits, e.g. for progress reporting.
///
/// # Errors
/// Same as [`fit`].
pub fn fit_with_callback(
    model: Model,
    data: HashMap<String, Dataset>,
    parameters: ParameterGroup,
    options: &FitOptions,
    callback: impl Fn(&ParameterGroup) + Send + Sync + 'static,
) -> Result<FitResult, FitError> {
    let problem =
        FitProblem::new(model, data, parameters, options)?.with_iteration_callback(callback);
    run(problem, options)
}

fn run(problem: FitProblem, options: &FitOptions) -> Result<FitResult, FitError> {
    let (problem, report) = LevenbergMarquardt::new()
        .with_patience(options.max_iterations)
        .minimize(problem);
    if !report.termination.was_successful() {
        return Err(FitError::MinimizationFailed);
    }
    FitResult::new(problem, report.number_of_evaluations, report.objective_function)
}

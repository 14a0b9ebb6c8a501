#![warn(missing_docs)]
//!
//! # Introduction
//!
//! Time resolved spectroscopy experiments produce two dimensional datasets:
//! a signal observed along a *calculated* axis (typically time) for every
//! point of an *estimated* axis (typically wavelength). Global and target
//! analysis fits one parametric kinetic model to all of these traces at
//! once. The model is *separable*: for a fixed set of nonlinear parameters
//! `$\vec{\alpha}$` (decay rates, instrument response parameters) the
//! observed trace at a point of the estimated axis is a linear combination
//!
//! ```math
//! \vec{y}(\lambda) \approx \mathbf{C}(\vec{\alpha}) \, \vec{c}(\lambda),
//! ```
//!
//! where the columns of the *concentration matrix* `$\mathbf{C}$` are the
//! (instrument-response convolved) decay curves of the model compartments
//! and `$\vec{c}(\lambda)$` are conditionally linear amplitudes, the so
//! called *clp* (conditionally linear parameters).
//!
//! This crate implements the fitting engine for such models using the
//! Variable Projection algorithm: for every guess of `$\vec{\alpha}$` the
//! clp are solved in closed form by linear least squares (optionally under
//! non-negativity constraints) and only the projected residual is handed to
//! a nonlinear minimization backend. The backend is the
//! [levenberg_marquardt](https://crates.io/crates/levenberg-marquardt)
//! crate, which treats the engine as an opaque least squares problem.
//!
//! # Workflow
//!
//! 1. Describe the kinetic scheme with a [`Model`](crate::model::Model):
//!    compartments, k-matrices, megacomplexes, instrument response
//!    functions, compartment constraints and the participating datasets.
//! 2. Provide the measured data as [`Dataset`](crate::model::Dataset)
//!    values and the starting point as a
//!    [`ParameterGroup`](crate::parameter::ParameterGroup).
//! 3. Call [`fit`](crate::fit::fit) with [`FitOptions`](crate::fit::FitOptions)
//!    controlling non-negative least squares, the grouping tolerance and the
//!    number of parallel workers.
//! 4. Query the returned [`FitResult`](crate::result::FitResult) for best
//!    fit parameters, fitted traces, concentrations, clp and residuals.
//!
//! Datasets that share values on the estimated axis (within a tolerance)
//! are fitted jointly: their traces are grouped per shared axis value and
//! each group is solved as one stacked least squares problem. See the
//! [`grouping`](crate::grouping) module for the exact rules.
//!
//! # References and Further Reading
//! (Golub2003) Golub, G., Pereyra, V. Separable nonlinear least squares:
//! the variable projection method and its applications.
//! Inverse Problems **19** R1 (2003).
//!
//! (vanStokkum2004) van Stokkum, I.H.M., Larsen, D.S., van Grondelle, R.
//! Global and target analysis of time-resolved spectra.
//! Biochimica et Biophysica Acta **1657** 82-104 (2004).

/// the error type of the fitting engine
pub mod errors;
/// the driver function that runs a full fit and its options
pub mod fit;
/// partitioning of datasets into groups along the estimated axis
pub mod grouping;
/// construction of the per group concentration matrices
pub mod matrix;
/// the kinetic model description: compartments, k-matrices, irfs, datasets
pub mod model;
/// named, hierarchical fit parameters
pub mod parameter;
/// commonly useful imports
pub mod prelude;
/// the residual evaluation engine driven by the nonlinear optimizer
pub mod problem;
/// assembly of per dataset results after the optimization has converged
pub mod result;
/// forward simulation of datasets from a model, mainly for testing
pub mod simulation;
/// the linear part of variable projection: (non-negative) least squares
pub mod varpro;

/// private module with linear algebra helpers that are not (yet)
/// implemented in the nalgebra crate
mod linalg;

#[cfg(test)]
pub mod test_helpers;

use nalgebra::DVector;
use thiserror::Error as ThisError;


/// Errors pertaining to parameter lookup and optimizer round trips
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum ParameterError {
    /// a parameter label was referenced that is not part of the group
    #[error("No parameter with label '{}' in group.", label)]
    UnknownParameter {
        /// the offending label
        label: String,
    },

    /// a parameter with the same label was added twice
    #[error("Duplicate parameter label '{}'.", label)]
    DuplicateLabel {
        /// the offending label
        label: String,
    },

    /// the optimizer handed back a vector of the wrong length
    #[error(
        "Optimizer vector has {} elements, but {} parameters vary.",
        actual,
        expected
    )]
    InvalidVectorLength {
        /// number of varying parameters in the group
        expected: usize,
        /// number of elements in the given vector
        actual: usize,
    },
}

/// A single named fit parameter.
///
/// Parameters are identified by a dotted label (e.g. `kinetic.1`), carry a
/// numeric value, optional box bounds, a `vary` flag that decides whether
/// the nonlinear optimizer may change them and a `non_negative` flag. Non
/// negative parameters are handed to the optimizer as their natural
/// logarithm and exponentiated on the way back, so the optimizer itself
/// works on an unconstrained value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    label: String,
    value: f64,
    min: f64,
    max: f64,
    vary: bool,
    non_negative: bool,
    stderr: Option<f64>,
}

impl Parameter {
    /// create a new parameter with the given label and value that varies
    /// during optimization, has no bounds and is not non-negative
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            vary: true,
            non_negative: false,
            stderr: None,
        }
    }

    /// set whether the optimizer may vary this parameter
    pub fn with_vary(mut self, vary: bool) -> Self {
        self.vary = vary;
        self
    }

    /// mark this parameter as non-negative. It is log-transformed for the
    /// optimizer, which requires a strictly positive current value.
    pub fn with_non_negative(mut self, non_negative: bool) -> Self {
        self.non_negative = non_negative;
        self
    }

    /// set box bounds for this parameter. Updated snapshots are clamped
    /// into `[min, max]`.
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// the full (dotted) label of this parameter
    pub fn label(&self) -> &str {
        &self.label
    }

    /// the current value of this parameter
    pub fn value(&self) -> f64 {
        self.value
    }

    /// whether the optimizer may vary this parameter
    pub fn vary(&self) -> bool {
        self.vary
    }

    /// whether this parameter is constrained to be non-negative
    pub fn non_negative(&self) -> bool {
        self.non_negative
    }

    /// the fitted standard error, if one has been attached
    pub fn stderr(&self) -> Option<f64> {
        self.stderr
    }
}

/// An ordered collection of [`Parameter`]s, addressed by their dotted
/// labels.
///
/// The group is an immutable snapshot during matrix building: the residual
/// engine produces *new* snapshots via [`ParameterGroup::updated`] when the
/// optimizer changes the varying parameters, it never mutates a snapshot in
/// place. Iteration and optimizer vector order is insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterGroup {
    parameters: Vec<Parameter>,
}

impl ParameterGroup {
    /// create an empty parameter group
    pub fn new() -> Self {
        Self::default()
    }

    /// create a group from a list of parameters
    ///
    /// # Errors
    /// Fails if two parameters share a label.
    pub fn from_parameters(
        parameters: impl IntoIterator<Item = Parameter>,
    ) -> Result<Self, ParameterError> {
        let mut group = Self::new();
        for parameter in parameters {
            group.add(parameter)?;
        }
        Ok(group)
    }

    /// add a parameter to the group
    ///
    /// # Errors
    /// Fails if a parameter with the same label is already present.
    pub fn add(&mut self, parameter: Parameter) -> Result<(), ParameterError> {
        if self.get(parameter.label()).is_some() {
            return Err(ParameterError::DuplicateLabel {
                label: parameter.label().to_owned(),
            });
        }
        self.parameters.push(parameter);
        Ok(())
    }

    /// add a whole subgroup under a label prefix. A parameter `1` added
    /// under prefix `kinetic` gets the full label `kinetic.1`.
    ///
    /// # Errors
    /// Fails on duplicate resulting labels.
    pub fn add_group(
        &mut self,
        prefix: &str,
        parameters: impl IntoIterator<Item = Parameter>,
    ) -> Result<(), ParameterError> {
        for mut parameter in parameters {
            parameter.label = format!("{prefix}.{}", parameter.label);
            self.add(parameter)?;
        }
        Ok(())
    }

    /// look up a parameter by its full label
    pub fn get(&self, label: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.label == label)
    }

    /// the current value of the parameter with the given label
    ///
    /// # Errors
    /// Fails if no parameter with this label exists.
    pub fn value(&self, label: &str) -> Result<f64, ParameterError> {
        self.get(label)
            .map(Parameter::value)
            .ok_or_else(|| ParameterError::UnknownParameter {
                label: label.to_owned(),
            })
    }

    /// iterate over all parameters in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// the number of parameters in the group
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// whether the group contains no parameters
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// the number of parameters the optimizer may vary
    pub fn varying_count(&self) -> usize {
        self.parameters.iter().filter(|p| p.vary).count()
    }

    /// the parameter vector handed to the nonlinear optimizer: the values
    /// of all varying parameters in insertion order, with non-negative
    /// parameters replaced by their natural logarithm
    pub fn optimizer_values(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.varying_count(),
            self.parameters.iter().filter(|p| p.vary).map(|p| {
                if p.non_negative {
                    p.value.ln()
                } else {
                    p.value
                }
            }),
        )
    }

    /// produce a new snapshot with the varying parameters replaced by the
    /// given optimizer vector. Non-negative parameters are exponentiated
    /// back and every updated value is clamped into its bounds.
    ///
    /// # Errors
    /// Fails if the vector length does not match the number of varying
    /// parameters.
    pub fn updated(&self, values: &DVector<f64>) -> Result<Self, ParameterError> {
        if values.len() != self.varying_count() {
            return Err(ParameterError::InvalidVectorLength {
                expected: self.varying_count(),
                actual: values.len(),
            });
        }
        let mut snapshot = self.clone();
        let mut next = values.iter();
        for parameter in snapshot.parameters.iter_mut().filter(|p| p.vary) {
            let raw = *next.next().expect("length checked above");
            let value = if parameter.non_negative { raw.exp() } else { raw };
            parameter.value = value.clamp(parameter.min, parameter.max);
        }
        Ok(snapshot)
    }
}

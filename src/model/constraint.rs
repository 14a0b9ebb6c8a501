/// A constraint on one compartment's clp, active on one or more intervals
/// of the estimated axis.
///
/// The matrix builder evaluates constraints per group item against the
/// current estimated axis value: `Zero` removes the compartment's column
/// from the matrix, `Equal` overwrites the column with a weighted sum of
/// target columns. `EqualArea` only constrains the integrated amplitudes
/// and leaves the matrix untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum CompartmentConstraint {
    /// the compartment does not contribute inside the intervals
    Zero {
        /// the constrained compartment
        compartment: String,
        /// closed intervals `[min, max]` on the estimated axis
        intervals: Vec<(f64, f64)>,
    },
    /// the compartment's column is replaced by
    /// `$\sum_i p_i \cdot \mathrm{column}(t_i)$` inside the intervals
    Equal {
        /// the constrained compartment
        compartment: String,
        /// closed intervals `[min, max]` on the estimated axis
        intervals: Vec<(f64, f64)>,
        /// `(target compartment, scaling parameter label)` pairs
        targets: Vec<(String, String)>,
    },
    /// the integrated clp of the compartment is tied to the targets; does
    /// not modify the matrix
    EqualArea {
        /// the constrained compartment
        compartment: String,
        /// closed intervals `[min, max]` on the estimated axis
        intervals: Vec<(f64, f64)>,
        /// `(target compartment, scaling parameter label)` pairs
        targets: Vec<(String, String)>,
        /// weight parameter label for the additional residual
        weight: String,
    },
}

impl CompartmentConstraint {
    /// the compartment this constraint applies to
    pub fn compartment(&self) -> &str {
        match self {
            CompartmentConstraint::Zero { compartment, .. }
            | CompartmentConstraint::Equal { compartment, .. }
            | CompartmentConstraint::EqualArea { compartment, .. } => compartment,
        }
    }

    /// the intervals on the estimated axis this constraint is active in
    pub fn intervals(&self) -> &[(f64, f64)] {
        match self {
            CompartmentConstraint::Zero { intervals, .. }
            | CompartmentConstraint::Equal { intervals, .. }
            | CompartmentConstraint::EqualArea { intervals, .. } => intervals,
        }
    }

    /// whether the constraint is active at the given estimated axis value
    pub fn applies(&self, index: f64) -> bool {
        self.intervals()
            .iter()
            .any(|(min, max)| *min <= index && index <= *max)
    }
}

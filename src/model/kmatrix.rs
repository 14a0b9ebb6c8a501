use crate::parameter::{ParameterError, ParameterGroup};
use nalgebra::DMatrix;

/// A kinetic transfer matrix.
///
/// Entries are `(to, from) -> rate parameter label`. An entry with
/// `to != from` describes population transfer from compartment `from` to
/// compartment `to` (and the corresponding loss from `from`), an entry with
/// `to == from` describes plain decay of the compartment. The differential
/// equation modeled is `$\dot{\vec{c}} = \mathbf{K} \vec{c}$` with the
/// compartmental matrix `$\mathbf{K}$` assembled by [`KMatrix::full`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KMatrix {
    entries: Vec<(String, String, String)>,
}

impl KMatrix {
    /// create an empty k-matrix
    pub fn new() -> Self {
        Self::default()
    }

    /// create a k-matrix from `((to, from), parameter)` entries
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = ((&'a str, &'a str), &'a str)>,
    ) -> Self {
        let mut matrix = Self::new();
        for ((to, from), parameter) in entries {
            matrix.add(to, from, parameter);
        }
        matrix
    }

    /// add a rate entry. A later entry for the same `(to, from)` pair
    /// replaces the earlier one.
    pub fn add(&mut self, to: &str, from: &str, parameter: &str) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(t, f, _)| t == to && f == from)
        {
            entry.2 = parameter.to_owned();
        } else {
            self.entries
                .push((to.to_owned(), from.to_owned(), parameter.to_owned()));
        }
    }

    /// combine this k-matrix with another one. Entries of `other` take
    /// precedence for shared `(to, from)` pairs.
    pub fn combine(&self, other: &KMatrix) -> KMatrix {
        let mut combined = self.clone();
        for (to, from, parameter) in &other.entries {
            combined.add(to, from, parameter);
        }
        combined
    }

    /// the compartments involved in this matrix, in first-seen order over
    /// the entries (`to` before `from` per entry)
    pub fn involved_compartments(&self) -> Vec<&str> {
        let mut compartments = Vec::new();
        for (to, from, _) in &self.entries {
            for compartment in [to.as_str(), from.as_str()] {
                if !compartments.contains(&compartment) {
                    compartments.push(compartment);
                }
            }
        }
        compartments
    }

    /// iterate over the `(to, from, parameter)` entries
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.entries
            .iter()
            .map(|(to, from, parameter)| (to.as_str(), from.as_str(), parameter.as_str()))
    }

    /// Assemble the full compartmental matrix `$\mathbf{K}$` over the given
    /// compartment order, resolving rate labels against the parameter
    /// snapshot.
    ///
    /// For an entry `(to, from)` with rate `$k$` and `to != from` this adds
    /// `$k$` at `(to, from)` and subtracts `$k$` from `(from, from)`; an
    /// entry on the diagonal subtracts `$k$` from `(to, to)`.
    ///
    /// # Errors
    /// Fails if a rate label is not part of the parameter group.
    ///
    /// # Panics
    /// Panics if a compartment of this matrix is missing from
    /// `compartments`; [`crate::model::Model::validate`] rules this out.
    pub fn full(
        &self,
        compartments: &[String],
        parameters: &ParameterGroup,
    ) -> Result<DMatrix<f64>, ParameterError> {
        let index_of = |label: &str| {
            compartments
                .iter()
                .position(|c| c == label)
                .expect("k-matrix compartment missing from compartment order")
        };
        let size = compartments.len();
        let mut matrix = DMatrix::zeros(size, size);
        for (to, from, parameter) in &self.entries {
            let rate = parameters.value(parameter)?;
            let (to, from) = (index_of(to), index_of(from));
            if to == from {
                matrix[(to, to)] -= rate;
            } else {
                matrix[(to, from)] += rate;
                matrix[(from, from)] -= rate;
            }
        }
        Ok(matrix)
    }
}

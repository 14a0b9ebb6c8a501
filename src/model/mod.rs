use crate::parameter::ParameterGroup;

mod constraint;
mod dataset;
/// contains the error structure that belongs to a model
pub mod errors;
mod irf;
mod kmatrix;

pub use constraint::CompartmentConstraint;
pub use dataset::{Dataset, DatasetDescriptor};
pub use errors::ModelError;
pub use irf::{EvaluatedGaussianIrf, GaussianIrf, Irf, MeasuredIrf};
pub use kmatrix::KMatrix;

/// A megacompex couples one or more k-matrices into a single contribution
/// to a dataset's concentration matrix. The k-matrices are combined into
/// one before the kinetic curves are computed.
#[derive(Debug, Clone, PartialEq)]
pub struct Megacomplex {
    /// the megacomplex label
    pub label: String,
    /// labels of the k-matrices this megacomplex combines
    pub k_matrices: Vec<String>,
}

impl Megacomplex {
    /// create a megacomplex from k-matrix labels
    pub fn new(label: &str, k_matrices: &[&str]) -> Self {
        Self {
            label: label.to_owned(),
            k_matrices: k_matrices.iter().map(|&k| k.to_owned()).collect(),
        }
    }
}

/// The initial concentration vector `$\vec{j}$` of a kinetic scheme: one
/// parameter per listed compartment, giving the population at excitation.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialConcentration {
    /// the initial concentration label
    pub label: String,
    /// the compartments, in the same order as `parameters`
    pub compartments: Vec<String>,
    /// one parameter label per compartment
    pub parameters: Vec<String>,
}

impl InitialConcentration {
    /// create an initial concentration from parallel compartment and
    /// parameter label lists
    pub fn new(label: &str, compartments: &[&str], parameters: &[&str]) -> Self {
        Self {
            label: label.to_owned(),
            compartments: compartments.iter().map(|&c| c.to_owned()).collect(),
            parameters: parameters.iter().map(|&p| p.to_owned()).collect(),
        }
    }
}

/// The declarative description of a global/target analysis model.
///
/// A model owns no data. It declares compartments, k-matrices,
/// megacomplexes, instrument response functions, initial concentrations and
/// the participating datasets, all referenced by label. Construction is
/// incremental through the `add_*` methods; [`Model::validate`] checks all
/// cross references against the model and a parameter snapshot before a fit
/// starts, so the hot fitting loop never encounters dangling labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    compartments: Vec<String>,
    k_matrices: Vec<(String, KMatrix)>,
    megacomplexes: Vec<Megacomplex>,
    initial_concentrations: Vec<InitialConcentration>,
    irfs: Vec<(String, Irf)>,
    datasets: Vec<DatasetDescriptor>,
}

impl Model {
    /// create a model declaring the given compartments
    pub fn new(compartments: &[&str]) -> Self {
        Self {
            compartments: compartments.iter().map(|&c| c.to_owned()).collect(),
            ..Self::default()
        }
    }

    /// the declared compartments in declaration order
    pub fn compartments(&self) -> &[String] {
        &self.compartments
    }

    /// declare a k-matrix under the given label
    pub fn add_k_matrix(mut self, label: &str, k_matrix: KMatrix) -> Self {
        self.k_matrices.push((label.to_owned(), k_matrix));
        self
    }

    /// declare a megacomplex
    pub fn add_megacomplex(mut self, megacomplex: Megacomplex) -> Self {
        self.megacomplexes.push(megacomplex);
        self
    }

    /// declare an initial concentration
    pub fn add_initial_concentration(mut self, initial: InitialConcentration) -> Self {
        self.initial_concentrations.push(initial);
        self
    }

    /// declare an instrument response function under the given label
    pub fn add_irf(mut self, label: &str, irf: Irf) -> Self {
        self.irfs.push((label.to_owned(), irf));
        self
    }

    /// declare a dataset
    pub fn add_dataset(mut self, dataset: DatasetDescriptor) -> Self {
        self.datasets.push(dataset);
        self
    }

    /// the declared datasets in declaration order
    pub fn datasets(&self) -> &[DatasetDescriptor] {
        &self.datasets
    }

    /// look up a dataset descriptor by label
    pub fn dataset(&self, label: &str) -> Option<&DatasetDescriptor> {
        self.datasets.iter().find(|d| d.label == label)
    }

    /// look up a k-matrix by label
    pub fn k_matrix(&self, label: &str) -> Option<&KMatrix> {
        self.k_matrices
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, k)| k)
    }

    /// look up a megacomplex by label
    pub fn megacomplex(&self, label: &str) -> Option<&Megacomplex> {
        self.megacomplexes.iter().find(|m| m.label == label)
    }

    /// look up an initial concentration by label
    pub fn initial_concentration(&self, label: &str) -> Option<&InitialConcentration> {
        self.initial_concentrations.iter().find(|i| i.label == label)
    }

    /// look up an irf by label
    pub fn irf(&self, label: &str) -> Option<&Irf> {
        self.irfs.iter().find(|(l, _)| l == label).map(|(_, i)| i)
    }

    /// Check all label cross references of this model against itself and a
    /// parameter snapshot.
    ///
    /// # Errors
    /// Returns the first dangling reference found: unknown megacomplexes,
    /// k-matrices, irfs, initial concentrations, compartments (in
    /// k-matrices, constraints or initial concentrations) or parameter
    /// labels, and Gaussian irfs with empty or uneven center, width and
    /// scale lists.
    pub fn validate(&self, parameters: &ParameterGroup) -> Result<(), ModelError> {
        for (label, k_matrix) in &self.k_matrices {
            for (to, from, parameter) in k_matrix.entries() {
                for compartment in [to, from] {
                    if !self.compartments.iter().any(|c| c == compartment) {
                        return Err(ModelError::UnknownCompartment {
                            label: compartment.to_owned(),
                            referenced_by: format!("k-matrix '{label}'"),
                        });
                    }
                }
                parameters.value(parameter)?;
            }
        }

        for initial in &self.initial_concentrations {
            if initial.compartments.len() != initial.parameters.len() {
                return Err(ModelError::MismatchedInitialConcentration {
                    label: initial.label.clone(),
                    compartments: initial.compartments.len(),
                    parameters: initial.parameters.len(),
                });
            }
            for compartment in &initial.compartments {
                if !self.compartments.contains(compartment) {
                    return Err(ModelError::UnknownCompartment {
                        label: compartment.clone(),
                        referenced_by: format!("initial concentration '{}'", initial.label),
                    });
                }
            }
            for parameter in &initial.parameters {
                parameters.value(parameter)?;
            }
        }

        for megacomplex in &self.megacomplexes {
            for k_matrix in &megacomplex.k_matrices {
                if self.k_matrix(k_matrix).is_none() {
                    return Err(ModelError::UnknownKMatrix {
                        megacomplex: megacomplex.label.clone(),
                        label: k_matrix.clone(),
                    });
                }
            }
        }

        for (label, irf) in &self.irfs {
            if let Irf::Gaussian(gaussian) = irf {
                // an empty or uneven center/width/scale list would poison
                // the convolution with NaN, reject it here
                if gaussian.center.is_empty()
                    || gaussian.center.len() != gaussian.width.len()
                    || (!gaussian.scale.is_empty()
                        && gaussian.scale.len() != gaussian.center.len())
                {
                    return Err(ModelError::MismatchedIrf {
                        label: label.clone(),
                        centers: gaussian.center.len(),
                        widths: gaussian.width.len(),
                        scales: gaussian.scale.len(),
                    });
                }
                for label in gaussian
                    .center
                    .iter()
                    .chain(&gaussian.width)
                    .chain(&gaussian.scale)
                    .chain(&gaussian.center_dispersion)
                    .chain(&gaussian.width_dispersion)
                    .chain(&gaussian.backsweep_period)
                {
                    parameters.value(label)?;
                }
            }
        }

        for dataset in &self.datasets {
            self.validate_dataset(dataset, parameters)?;
        }
        Ok(())
    }

    fn validate_dataset(
        &self,
        dataset: &DatasetDescriptor,
        parameters: &ParameterGroup,
    ) -> Result<(), ModelError> {
        let mut has_k_matrices = false;
        for megacomplex in &dataset.megacomplexes {
            match self.megacomplex(megacomplex) {
                Some(megacomplex) => has_k_matrices |= !megacomplex.k_matrices.is_empty(),
                None => {
                    return Err(ModelError::UnknownMegacomplex {
                        dataset: dataset.label.clone(),
                        label: megacomplex.clone(),
                    })
                }
            }
        }
        if has_k_matrices && dataset.initial_concentration.is_none() {
            return Err(ModelError::MissingInitialConcentration {
                dataset: dataset.label.clone(),
            });
        }
        if let Some(initial) = &dataset.initial_concentration {
            if self.initial_concentration(initial).is_none() {
                return Err(ModelError::UnknownInitialConcentration {
                    dataset: dataset.label.clone(),
                    label: initial.clone(),
                });
            }
        }
        if let Some(irf) = &dataset.irf {
            if self.irf(irf).is_none() {
                return Err(ModelError::UnknownIrf {
                    dataset: dataset.label.clone(),
                    label: irf.clone(),
                });
            }
        }
        if let Some(scaling) = &dataset.scaling {
            parameters.value(scaling)?;
        }
        for (megacomplex, parameter) in &dataset.megacomplex_scaling {
            if self.megacomplex(megacomplex).is_none() {
                return Err(ModelError::UnknownMegacomplex {
                    dataset: dataset.label.clone(),
                    label: megacomplex.clone(),
                });
            }
            parameters.value(parameter)?;
        }
        for constraint in &dataset.constraints {
            if !self.compartments.iter().any(|c| c == constraint.compartment()) {
                return Err(ModelError::UnknownCompartment {
                    label: constraint.compartment().to_owned(),
                    referenced_by: format!("constraint in dataset '{}'", dataset.label),
                });
            }
            let targets = match constraint {
                CompartmentConstraint::Zero { .. } => &[][..],
                CompartmentConstraint::Equal { targets, .. }
                | CompartmentConstraint::EqualArea { targets, .. } => targets,
            };
            for (target, parameter) in targets {
                if !self.compartments.contains(target) {
                    return Err(ModelError::UnknownCompartment {
                        label: target.clone(),
                        referenced_by: format!("constraint in dataset '{}'", dataset.label),
                    });
                }
                parameters.value(parameter)?;
            }
            if let CompartmentConstraint::EqualArea { weight, .. } = constraint {
                parameters.value(weight)?;
            }
        }
        Ok(())
    }
}

use crate::model::constraint::CompartmentConstraint;
use crate::model::errors::ModelError;
use nalgebra::{DMatrix, DVector};

/// The model side description of one dataset: which megacomplexes,
/// initial concentration, irf and constraints apply to it.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetDescriptor {
    /// the dataset label, matching the key in the data collection
    pub label: String,
    /// labels of the megacomplexes contributing to this dataset
    pub megacomplexes: Vec<String>,
    /// optional `(megacomplex label, scaling parameter label)` pairs
    pub megacomplex_scaling: Vec<(String, String)>,
    /// label of the initial concentration vector, required when
    /// megacomplexes with k-matrices are attached
    pub initial_concentration: Option<String>,
    /// label of the instrument response function, if any
    pub irf: Option<String>,
    /// whether a constant baseline compartment is added to the matrix
    pub baseline: bool,
    /// optional dataset scaling parameter label, multiplying the whole
    /// matrix of this dataset
    pub scaling: Option<String>,
    /// compartment constraints evaluated per estimated axis value
    pub constraints: Vec<CompartmentConstraint>,
}

impl DatasetDescriptor {
    /// create a descriptor with the given label and megacomplexes and no
    /// further attachments
    pub fn new(label: &str, megacomplexes: &[&str]) -> Self {
        Self {
            label: label.to_owned(),
            megacomplexes: megacomplexes.iter().map(|&m| m.to_owned()).collect(),
            megacomplex_scaling: Vec::new(),
            initial_concentration: None,
            irf: None,
            baseline: false,
            scaling: None,
            constraints: Vec::new(),
        }
    }

    /// attach an initial concentration by label
    pub fn with_initial_concentration(mut self, label: &str) -> Self {
        self.initial_concentration = Some(label.to_owned());
        self
    }

    /// attach an instrument response function by label
    pub fn with_irf(mut self, label: &str) -> Self {
        self.irf = Some(label.to_owned());
        self
    }

    /// enable the constant baseline compartment
    pub fn with_baseline(mut self) -> Self {
        self.baseline = true;
        self
    }

    /// attach a dataset scaling parameter by label
    pub fn with_scaling(mut self, parameter: &str) -> Self {
        self.scaling = Some(parameter.to_owned());
        self
    }

    /// scale the contribution of one megacomplex by a parameter
    pub fn with_megacomplex_scaling(mut self, megacomplex: &str, parameter: &str) -> Self {
        self.megacomplex_scaling
            .push((megacomplex.to_owned(), parameter.to_owned()));
        self
    }

    /// add a compartment constraint
    pub fn with_constraint(mut self, constraint: CompartmentConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// the scaling parameter label for a megacomplex, if one is declared
    pub fn megacomplex_scaling_of(&self, megacomplex: &str) -> Option<&str> {
        self.megacomplex_scaling
            .iter()
            .find(|(label, _)| label == megacomplex)
            .map(|(_, parameter)| parameter.as_str())
    }
}

/// An observed two dimensional dataset.
///
/// The raw data is indexed `(estimated, calculated)`: one row per estimated
/// axis value (e.g. wavelength), one column per calculated axis value (e.g.
/// time). A dataset is immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    label: String,
    calculated_axis: DVector<f64>,
    estimated_axis: DVector<f64>,
    data: DMatrix<f64>,
}

impl Dataset {
    /// create a dataset and check the data shape against the axes
    ///
    /// # Errors
    /// Fails if `data` is not `estimated_axis.len() x calculated_axis.len()`.
    pub fn new(
        label: &str,
        calculated_axis: DVector<f64>,
        estimated_axis: DVector<f64>,
        data: DMatrix<f64>,
    ) -> Result<Self, ModelError> {
        if data.nrows() != estimated_axis.len() || data.ncols() != calculated_axis.len() {
            return Err(ModelError::DataShapeMismatch {
                label: label.to_owned(),
                data_rows: data.nrows(),
                data_cols: data.ncols(),
                estimated_len: estimated_axis.len(),
                calculated_len: calculated_axis.len(),
            });
        }
        Ok(Self {
            label: label.to_owned(),
            calculated_axis,
            estimated_axis,
            data,
        })
    }

    /// the dataset label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// the calculated axis (e.g. time points)
    pub fn calculated_axis(&self) -> &DVector<f64> {
        &self.calculated_axis
    }

    /// the estimated axis (e.g. wavelengths)
    pub fn estimated_axis(&self) -> &DVector<f64> {
        &self.estimated_axis
    }

    /// the raw data, `estimated x calculated`
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// the observed trace along the calculated axis at one estimated axis
    /// index
    pub fn trace(&self, estimated_index: usize) -> DVector<f64> {
        self.data.row(estimated_index).transpose()
    }
}

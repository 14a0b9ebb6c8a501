//! shared builders for the unit tests

use crate::model::{
    Dataset, DatasetDescriptor, InitialConcentration, KMatrix, Megacomplex, Model,
};
use crate::parameter::{Parameter, ParameterGroup};
use crate::simulation::simulate;
use nalgebra::DVector;
use std::collections::HashMap;

/// a parameter group from `(label, value)` pairs
pub fn parameters(values: &[(&str, f64)]) -> ParameterGroup {
    ParameterGroup::from_parameters(
        values
            .iter()
            .map(|&(label, value)| Parameter::new(label, value)),
    )
    .unwrap()
}

/// a model with one decaying compartment `s1` observed in dataset `d1`
pub fn single_decay_model() -> Model {
    Model::new(&["s1"])
        .add_k_matrix("k1", KMatrix::from_entries([(("s1", "s1"), "rates.1")]))
        .add_megacomplex(Megacomplex::new("m1", &["k1"]))
        .add_initial_concentration(InitialConcentration::new("j1", &["s1"], &["inputs.1"]))
        .add_dataset(DatasetDescriptor::new("d1", &["m1"]).with_initial_concentration("j1"))
}

/// Noise free data for [`single_decay_model`]: 50 time points, three
/// estimated axis points with a falling amplitude spectrum for `s1`.
/// Returns the data collection together with the ground truth parameters.
pub fn single_decay_data(rate: f64) -> (ParameterGroup, HashMap<String, Dataset>) {
    // the input amplitude is compensated exactly by the clp, so it must
    // not vary during optimization
    let truth = ParameterGroup::from_parameters([
        Parameter::new("rates.1", rate),
        Parameter::new("inputs.1", 1.0).with_vary(false),
    ])
    .unwrap();
    let time = DVector::from_iterator(50, (0..50).map(|i| i as f64 * 4.0));
    let spectral = DVector::from(vec![600.0, 620.0, 640.0]);
    let mut amplitudes = HashMap::new();
    amplitudes.insert("s1".to_owned(), DVector::from(vec![1.0, 0.8, 0.5]));

    let dataset = simulate(
        &single_decay_model(),
        &truth,
        "d1",
        time,
        spectral,
        &amplitudes,
    )
    .unwrap();
    let mut data = HashMap::new();
    data.insert("d1".to_owned(), dataset);
    (truth, data)
}

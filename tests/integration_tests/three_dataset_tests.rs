//! A joint fit of three datasets sharing one sequential kinetic scheme
//! with a Gaussian instrument response.

use glofit::prelude::*;
use glofit::simulation::simulate;
use nalgebra::DVector;
use std::collections::HashMap;

use crate::relative_error;

const RATES: [f64; 3] = [0.1, 0.02, 0.004];
const IRF_CENTER: f64 = 1.3;
const IRF_WIDTH: f64 = 7.8;

fn sequential_model() -> Model {
    Model::new(&["s1", "s2", "s3"])
        .add_k_matrix(
            "k1",
            KMatrix::from_entries([
                (("s2", "s1"), "rates.1"),
                (("s3", "s2"), "rates.2"),
                (("s3", "s3"), "rates.3"),
            ]),
        )
        .add_megacomplex(Megacomplex::new("m1", &["k1"]))
        .add_initial_concentration(InitialConcentration::new(
            "j1",
            &["s1", "s2", "s3"],
            &["inputs.1", "inputs.0", "inputs.0"],
        ))
        .add_irf("irf1", Irf::Gaussian(GaussianIrf::new("irf.center", "irf.width")))
        .add_dataset(dataset_descriptor("d1"))
        .add_dataset(dataset_descriptor("d2"))
        .add_dataset(dataset_descriptor("d3"))
}

fn dataset_descriptor(label: &str) -> DatasetDescriptor {
    DatasetDescriptor::new(label, &["m1"])
        .with_initial_concentration("j1")
        .with_irf("irf1")
}

fn sequential_parameters(rates: [f64; 3], center: f64, width: f64) -> ParameterGroup {
    ParameterGroup::from_parameters([
        Parameter::new("rates.1", rates[0]),
        Parameter::new("rates.2", rates[1]),
        Parameter::new("rates.3", rates[2]),
        Parameter::new("irf.center", center),
        Parameter::new("irf.width", width),
        Parameter::new("inputs.1", 1.0).with_vary(false),
        Parameter::new("inputs.0", 0.0).with_vary(false),
    ])
    .unwrap()
}

fn amplitude(compartment: &str, x: f64) -> f64 {
    let (center, sigma) = match compartment {
        "s1" => (610.0, 15.0),
        "s2" => (630.0, 18.0),
        _ => (650.0, 12.0),
    };
    (-((x - center) / sigma).powi(2)).exp()
}

/// three datasets, two of them on identical estimated axes so their
/// traces land in shared groups
fn simulated_data() -> HashMap<String, Dataset> {
    let truth = sequential_parameters(RATES, IRF_CENTER, IRF_WIDTH);
    let model = sequential_model();
    let time = DVector::from_iterator(100, (0..100).map(|i| -20.0 + 3.0 * i as f64));

    let mut data = HashMap::new();
    for (label, offset) in [("d1", 600.0), ("d2", 605.0), ("d3", 600.0)] {
        let spectral = DVector::from_iterator(6, (0..6).map(|i| offset + 10.0 * i as f64));
        let mut amplitudes = HashMap::new();
        for compartment in ["s1", "s2", "s3"] {
            amplitudes.insert(
                compartment.to_owned(),
                spectral.map(|x| amplitude(compartment, x)),
            );
        }
        let dataset = simulate(
            &model,
            &truth,
            label,
            time.clone(),
            spectral,
            &amplitudes,
        )
        .unwrap();
        data.insert(label.to_owned(), dataset);
    }
    data
}

fn perturbed_guess() -> ParameterGroup {
    sequential_parameters(
        [RATES[0] * 1.3, RATES[1] * 0.8, RATES[2] * 1.2],
        0.9,
        8.5,
    )
}

#[test]
fn rates_and_irf_are_recovered_from_a_joint_three_dataset_fit() {
    let result = fit(
        sequential_model(),
        simulated_data(),
        perturbed_guess(),
        &FitOptions::default(),
    )
    .unwrap();

    let fitted = result.best_fit_parameters();
    for (index, truth) in RATES.iter().enumerate() {
        let label = format!("rates.{}", index + 1);
        let value = fitted.value(&label).unwrap();
        assert!(
            relative_error(value, *truth) < 1e-3,
            "{label}: recovered {value}, expected {truth}"
        );
    }
    assert!(relative_error(fitted.value("irf.center").unwrap(), IRF_CENTER) < 1e-2);
    assert!(relative_error(fitted.value("irf.width").unwrap(), IRF_WIDTH) < 1e-3);

    for label in ["d1", "d2", "d3"] {
        let observed = &result.data()[label];
        let fitted = result.fitted_dataset(label).unwrap();
        assert_eq!(fitted.data().shape(), observed.data().shape());
        assert!(
            result.residual(label).unwrap().norm() < 1e-2,
            "residual of {label} too large"
        );
    }
}

#[test]
fn parallel_workers_reproduce_the_serial_fit_exactly() {
    let serial = fit(
        sequential_model(),
        simulated_data(),
        perturbed_guess(),
        &FitOptions::default(),
    )
    .unwrap();
    let parallel = fit(
        sequential_model(),
        simulated_data(),
        perturbed_guess(),
        &FitOptions::default().with_workers(4),
    )
    .unwrap();

    // group order fixes the residual layout in both modes, so the whole
    // optimization trajectory is identical
    for label in ["rates.1", "rates.2", "rates.3", "irf.center", "irf.width"] {
        assert_eq!(
            serial.best_fit_parameters().value(label).unwrap(),
            parallel.best_fit_parameters().value(label).unwrap(),
            "{label} differs between serial and parallel fit"
        );
    }
}

#[test]
fn grouping_merges_the_shared_estimated_axes() {
    let result = fit(
        sequential_model(),
        simulated_data(),
        sequential_parameters(RATES, IRF_CENTER, IRF_WIDTH),
        &FitOptions::default(),
    )
    .unwrap();

    // d1 and d3 share all six values, d2 sits in between: 12 distinct
    // group values in total
    assert_eq!(result.groups().len(), 12);
    let shared = result
        .groups()
        .iter()
        .filter(|group| group.items.len() == 2)
        .count();
    assert_eq!(shared, 6);
}

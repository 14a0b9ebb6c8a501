use glofit::prelude::*;
use glofit::simulation::simulate;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

mod three_dataset_tests;

/// relative difference helper for parameter recovery checks
fn relative_error(fitted: f64, truth: f64) -> f64 {
    ((fitted - truth) / truth).abs()
}

fn single_decay_model() -> Model {
    Model::new(&["s1"])
        .add_k_matrix("k1", KMatrix::from_entries([(("s1", "s1"), "rates.1")]))
        .add_megacomplex(Megacomplex::new("m1", &["k1"]))
        .add_initial_concentration(InitialConcentration::new("j1", &["s1"], &["inputs.1"]))
        .add_dataset(DatasetDescriptor::new("d1", &["m1"]).with_initial_concentration("j1"))
}

fn single_decay_parameters(rate: f64) -> ParameterGroup {
    ParameterGroup::from_parameters([
        Parameter::new("rates.1", rate),
        Parameter::new("inputs.1", 1.0).with_vary(false),
    ])
    .unwrap()
}

fn single_decay_data(rate: f64) -> HashMap<String, Dataset> {
    let time = DVector::from_iterator(50, (0..50).map(|i| i as f64 * 1.5));
    let spectral = DVector::from_iterator(8, (0..8).map(|i| 600.0 + 10.0 * i as f64));
    let mut amplitudes = HashMap::new();
    amplitudes.insert(
        "s1".to_owned(),
        spectral.map(|x| 1.0 + 0.5 * ((x - 620.0) / 30.0).cos()),
    );
    let dataset = simulate(
        &single_decay_model(),
        &single_decay_parameters(rate),
        "d1",
        time,
        spectral,
        &amplitudes,
    )
    .unwrap();
    HashMap::from([("d1".to_owned(), dataset)])
}

#[test]
fn single_decay_rate_is_recovered_to_high_accuracy() {
    let result = fit(
        single_decay_model(),
        single_decay_data(0.01),
        single_decay_parameters(0.035),
        &FitOptions::default(),
    )
    .unwrap();

    let rate = result.best_fit_parameters().value("rates.1").unwrap();
    assert!(
        relative_error(rate, 0.01) < 1e-6,
        "recovered rate {rate} too far from 0.01"
    );
    assert!(
        result.number_of_evaluations() < 20,
        "spent {} evaluations",
        result.number_of_evaluations()
    );
    assert!(result.chi_square() < 1e-10);
}

#[test]
fn single_decay_rate_survives_measurement_noise() {
    let mut data = single_decay_data(0.01);
    let noisy = {
        let clean = data.remove("d1").unwrap();
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        let noisy_values = DMatrix::from_fn(clean.data().nrows(), clean.data().ncols(), |r, c| {
            clean.data()[(r, c)] + rng.gen_range(-1e-3..1e-3)
        });
        Dataset::new(
            "d1",
            clean.calculated_axis().clone(),
            clean.estimated_axis().clone(),
            noisy_values,
        )
        .unwrap()
    };
    data.insert("d1".to_owned(), noisy);

    let result = fit(
        single_decay_model(),
        data,
        single_decay_parameters(0.035),
        &FitOptions::default(),
    )
    .unwrap();

    let rate = result.best_fit_parameters().value("rates.1").unwrap();
    assert!(
        relative_error(rate, 0.01) < 1e-2,
        "recovered rate {rate} too far from 0.01"
    );
}

#[test]
fn non_negative_parameters_round_trip_through_the_log_transform() {
    let truth = ParameterGroup::from_parameters([
        Parameter::new("rates.1", 0.01).with_non_negative(true),
        Parameter::new("inputs.1", 1.0).with_vary(false),
    ])
    .unwrap();
    let guess = ParameterGroup::from_parameters([
        Parameter::new("rates.1", 0.05).with_non_negative(true),
        Parameter::new("inputs.1", 1.0).with_vary(false),
    ])
    .unwrap();

    let result = fit(
        single_decay_model(),
        single_decay_data(0.01),
        guess,
        &FitOptions::default(),
    )
    .unwrap();

    let rate = result.best_fit_parameters().value("rates.1").unwrap();
    assert!(rate > 0.0);
    assert!(relative_error(rate, truth.value("rates.1").unwrap()) < 1e-5);
}

use crate::grouping::create_group;
use crate::matrix::{calculate_dataset_matrix, calculate_group_item};
use crate::model::{
    CompartmentConstraint, Dataset, DatasetDescriptor, GaussianIrf, InitialConcentration, Irf,
    KMatrix, MeasuredIrf, Megacomplex, Model,
};
use crate::parameter::{Parameter, ParameterGroup};
use approx::assert_relative_eq;
use nalgebra::{dvector, DMatrix, DVector};
use std::collections::HashMap;

fn parameters(values: &[(&str, f64)]) -> ParameterGroup {
    let mut group = ParameterGroup::new();
    for &(label, value) in values {
        group.add(Parameter::new(label, value)).unwrap();
    }
    group
}

fn flat_dataset(label: &str, time: DVector<f64>, estimated: Vec<f64>) -> Dataset {
    let data = DMatrix::zeros(estimated.len(), time.len());
    Dataset::new(label, time, DVector::from(estimated), data).unwrap()
}

fn single_decay_model(dataset: DatasetDescriptor) -> Model {
    Model::new(&["s1"])
        .add_k_matrix("k1", KMatrix::from_entries([(("s1", "s1"), "rates.1")]))
        .add_megacomplex(Megacomplex::new("m1", &["k1"]))
        .add_initial_concentration(InitialConcentration::new("j1", &["s1"], &["inputs.1"]))
        .add_dataset(dataset)
}

fn group_of(model: &Model, data: &HashMap<String, Dataset>) -> crate::grouping::Group {
    create_group(model, data, 0.0).unwrap().remove(0)
}

#[test]
fn single_compartment_without_irf_is_a_plain_exponential() {
    let time = dvector![0.0, 1.0, 5.0, 25.0];
    let model = single_decay_model(
        DatasetDescriptor::new("d1", &["m1"]).with_initial_concentration("j1"),
    );
    let parameters = parameters(&[("rates.1", 0.1), ("inputs.1", 1.0)]);
    let mut data = HashMap::new();
    data.insert("d1".to_owned(), flat_dataset("d1", time.clone(), vec![0.0]));

    let group = group_of(&model, &data);
    let matrix = calculate_dataset_matrix(&group.items[0], &model, &parameters, &data).unwrap();

    assert_eq!(matrix.clp_labels, vec!["s1".to_owned()]);
    for (row, &t) in time.iter().enumerate() {
        assert_relative_eq!(matrix.matrix[(row, 0)], (-0.1 * t).exp(), epsilon = 1e-12);
    }
}

#[test]
fn sequential_scheme_matches_the_analytic_solution() {
    // s1 -> s2 -> ground, the classic two step scheme with the textbook
    // closed form for both populations
    let time = dvector![0.0, 0.5, 2.0, 10.0, 40.0];
    let (k1, k2) = (0.8, 0.05);
    let model = Model::new(&["s1", "s2"])
        .add_k_matrix(
            "k1",
            KMatrix::from_entries([(("s2", "s1"), "rates.1"), (("s2", "s2"), "rates.2")]),
        )
        .add_megacomplex(Megacomplex::new("m1", &["k1"]))
        .add_initial_concentration(InitialConcentration::new(
            "j1",
            &["s1", "s2"],
            &["inputs.1", "inputs.2"],
        ))
        .add_dataset(DatasetDescriptor::new("d1", &["m1"]).with_initial_concentration("j1"));
    let parameters = parameters(&[
        ("rates.1", k1),
        ("rates.2", k2),
        ("inputs.1", 1.0),
        ("inputs.2", 0.0),
    ]);
    let mut data = HashMap::new();
    data.insert("d1".to_owned(), flat_dataset("d1", time.clone(), vec![0.0]));

    let group = group_of(&model, &data);
    let matrix = calculate_dataset_matrix(&group.items[0], &model, &parameters, &data).unwrap();

    assert_eq!(matrix.clp_labels, vec!["s1".to_owned(), "s2".to_owned()]);
    for (row, &t) in time.iter().enumerate() {
        let c1 = (-k1 * t).exp();
        let c2 = k1 / (k1 - k2) * ((-k2 * t).exp() - (-k1 * t).exp());
        assert_relative_eq!(matrix.matrix[(row, 0)], c1, epsilon = 1e-10);
        assert_relative_eq!(matrix.matrix[(row, 1)], c2, epsilon = 1e-10);
    }
}

#[test]
fn gaussian_irf_convolution_matches_a_discrete_convolution() {
    let time = DVector::from_iterator(120, (0..120).map(|i| -6.0 + 0.25 * i as f64));
    let (rate, center, width) = (0.35, 1.5, 0.6);
    let model = single_decay_model(
        DatasetDescriptor::new("d1", &["m1"])
            .with_initial_concentration("j1")
            .with_irf("irf1"),
    )
    .add_irf("irf1", Irf::Gaussian(GaussianIrf::new("irf.center", "irf.width")));
    let parameters = parameters(&[
        ("rates.1", rate),
        ("inputs.1", 1.0),
        ("irf.center", center),
        ("irf.width", width),
    ]);
    let mut data = HashMap::new();
    data.insert("d1".to_owned(), flat_dataset("d1", time.clone(), vec![0.0]));

    let group = group_of(&model, &data);
    let matrix = calculate_dataset_matrix(&group.items[0], &model, &parameters, &data).unwrap();

    // brute force reference: integrate the gaussian against the decay on a
    // fine grid
    let dt = 1e-3;
    let reference = |t: f64| -> f64 {
        let mut sum = 0.0;
        let mut s = center - 8.0 * width;
        while s <= t {
            let g = (-0.5 * ((s - center) / width).powi(2)).exp()
                / (width * (2.0 * std::f64::consts::PI).sqrt());
            sum += g * (-rate * (t - s)).exp() * dt;
            s += dt;
        }
        sum
    };
    for (row, &t) in time.iter().enumerate() {
        assert_relative_eq!(matrix.matrix[(row, 0)], reference(t), epsilon = 1e-3);
    }
}

#[test]
fn backsweep_adds_the_folded_signal_of_adjacent_sweeps() {
    let time = dvector![0.0, 2.0, 5.0, 9.0];
    let (rate, center, period) = (0.4, 1.0, 12.0);
    let with_irf = |irf: GaussianIrf| {
        single_decay_model(
            DatasetDescriptor::new("d1", &["m1"])
                .with_initial_concentration("j1")
                .with_irf("irf1"),
        )
        .add_irf("irf1", Irf::Gaussian(irf))
    };
    let mut swept = GaussianIrf::new("irf.center", "irf.width");
    swept.backsweep_period = Some("irf.period".to_owned());
    let zero_period = parameters(&[
        ("rates.1", rate),
        ("inputs.1", 1.0),
        ("irf.center", center),
        ("irf.width", 0.05),
        ("irf.period", 0.0),
    ]);
    let parameters = parameters(&[
        ("rates.1", rate),
        ("inputs.1", 1.0),
        ("irf.center", center),
        ("irf.width", 0.05),
        ("irf.period", period),
    ]);
    let mut data = HashMap::new();
    data.insert("d1".to_owned(), flat_dataset("d1", time.clone(), vec![0.0]));

    let plain_model = with_irf(GaussianIrf::new("irf.center", "irf.width"));
    let swept_model = with_irf(swept);
    let group = group_of(&plain_model, &data);
    let plain =
        calculate_dataset_matrix(&group.items[0], &plain_model, &parameters, &data).unwrap();
    let folded =
        calculate_dataset_matrix(&group.items[0], &swept_model, &parameters, &data).unwrap();

    // the folding adds (e^{-k(t-mu+T)} + e^{-k(T/2-(t-mu))}) / (1 - e^{-kT})
    for (row, &t) in time.iter().enumerate() {
        let expected = ((-rate * (t - center + period)).exp()
            + (-rate * (period / 2.0 - (t - center))).exp())
            / (1.0 - (-rate * period).exp());
        assert_relative_eq!(
            folded.matrix[(row, 0)] - plain.matrix[(row, 0)],
            expected,
            epsilon = 1e-12
        );
    }

    // a non-positive period disables the correction
    let disabled =
        calculate_dataset_matrix(&group.items[0], &swept_model, &zero_period, &data).unwrap();
    assert_relative_eq!(disabled.matrix, plain.matrix, epsilon = 1e-14);
}

#[test]
fn unit_measured_irf_leaves_the_decay_unchanged() {
    let time = dvector![0.0, 1.0, 2.0, 3.0];
    let model = single_decay_model(
        DatasetDescriptor::new("d1", &["m1"])
            .with_initial_concentration("j1")
            .with_irf("irf1"),
    )
    .add_irf("irf1", Irf::Measured(MeasuredIrf::Curve(dvector![1.0])));
    let parameters = parameters(&[("rates.1", 0.2), ("inputs.1", 1.0)]);
    let mut data = HashMap::new();
    data.insert("d1".to_owned(), flat_dataset("d1", time.clone(), vec![0.0]));

    let group = group_of(&model, &data);
    let matrix = calculate_dataset_matrix(&group.items[0], &model, &parameters, &data).unwrap();
    for (row, &t) in time.iter().enumerate() {
        assert_relative_eq!(matrix.matrix[(row, 0)], (-0.2 * t).exp(), epsilon = 1e-12);
    }
}

#[test]
fn baseline_and_coherent_artifact_columns_are_appended_with_their_labels() {
    let time = dvector![-1.0, 0.0, 1.0];
    let mut irf = GaussianIrf::new("irf.center", "irf.width");
    irf.coherent_artifact_order = 2;
    let model = single_decay_model(
        DatasetDescriptor::new("d1", &["m1"])
            .with_initial_concentration("j1")
            .with_irf("irf1")
            .with_baseline(),
    )
    .add_irf("irf1", Irf::Gaussian(irf));
    let parameters = parameters(&[
        ("rates.1", 0.1),
        ("inputs.1", 1.0),
        ("irf.center", 0.0),
        ("irf.width", 0.5),
    ]);
    let mut data = HashMap::new();
    data.insert("d1".to_owned(), flat_dataset("d1", time.clone(), vec![0.0]));

    let group = group_of(&model, &data);
    let matrix = calculate_dataset_matrix(&group.items[0], &model, &parameters, &data).unwrap();

    assert_eq!(
        matrix.clp_labels,
        vec![
            "s1".to_owned(),
            "d1_baseline".to_owned(),
            "coherent_artifact_1".to_owned(),
            "coherent_artifact_2".to_owned(),
        ]
    );
    // the baseline column is constant one
    for row in 0..time.len() {
        assert_relative_eq!(matrix.matrix[(row, 1)], 1.0);
    }
    // the artifact gaussian peaks at the irf center
    assert_relative_eq!(matrix.matrix[(1, 2)], 1.0);
    assert!(matrix.matrix[(0, 2)] < 1.0 && matrix.matrix[(2, 2)] < 1.0);
    // its derivative vanishes at the center and changes sign across it
    assert_relative_eq!(matrix.matrix[(1, 3)], 0.0);
    assert!(matrix.matrix[(0, 3)] > 0.0 && matrix.matrix[(2, 3)] < 0.0);
}

#[test]
fn zero_constraint_drops_the_column_only_inside_its_interval() {
    let time = dvector![0.0, 1.0];
    let model = single_decay_model(
        DatasetDescriptor::new("d1", &["m1"])
            .with_initial_concentration("j1")
            .with_constraint(CompartmentConstraint::Zero {
                compartment: "s1".to_owned(),
                intervals: vec![(100.0, 200.0)],
            }),
    );
    let parameters = parameters(&[("rates.1", 0.1), ("inputs.1", 1.0)]);

    let mut data = HashMap::new();
    data.insert(
        "d1".to_owned(),
        flat_dataset("d1", time.clone(), vec![150.0, 300.0]),
    );
    let groups = create_group(&model, &data, 0.0).unwrap();

    let inside = calculate_dataset_matrix(&groups[0].items[0], &model, &parameters, &data).unwrap();
    assert!(inside.clp_labels.is_empty());
    assert_eq!(inside.matrix.ncols(), 0);

    let outside =
        calculate_dataset_matrix(&groups[1].items[0], &model, &parameters, &data).unwrap();
    assert_eq!(outside.clp_labels, vec!["s1".to_owned()]);
}

#[test]
fn equal_constraint_replaces_the_column_with_the_weighted_target() {
    let time = dvector![0.0, 1.0, 4.0];
    let model = Model::new(&["s1", "s2"])
        .add_k_matrix(
            "k1",
            KMatrix::from_entries([(("s1", "s1"), "rates.1"), (("s2", "s2"), "rates.2")]),
        )
        .add_megacomplex(Megacomplex::new("m1", &["k1"]))
        .add_initial_concentration(InitialConcentration::new(
            "j1",
            &["s1", "s2"],
            &["inputs.1", "inputs.1"],
        ))
        .add_dataset(
            DatasetDescriptor::new("d1", &["m1"])
                .with_initial_concentration("j1")
                .with_constraint(CompartmentConstraint::Equal {
                    compartment: "s2".to_owned(),
                    intervals: vec![(0.0, 1000.0)],
                    targets: vec![("s1".to_owned(), "weights.1".to_owned())],
                }),
        );
    let parameters = parameters(&[
        ("rates.1", 0.3),
        ("rates.2", 0.01),
        ("inputs.1", 1.0),
        ("weights.1", 2.5),
    ]);
    let mut data = HashMap::new();
    data.insert("d1".to_owned(), flat_dataset("d1", time.clone(), vec![500.0]));

    let group = group_of(&model, &data);
    let matrix = calculate_dataset_matrix(&group.items[0], &model, &parameters, &data).unwrap();

    assert_eq!(matrix.clp_labels, vec!["s1".to_owned(), "s2".to_owned()]);
    for row in 0..time.len() {
        assert_relative_eq!(
            matrix.matrix[(row, 1)],
            2.5 * matrix.matrix[(row, 0)],
            epsilon = 1e-12
        );
    }
}

#[test]
fn scaling_applies_to_the_kinetic_columns_but_not_the_baseline() {
    let time = dvector![0.0, 2.0];
    let model = single_decay_model(
        DatasetDescriptor::new("d1", &["m1"])
            .with_initial_concentration("j1")
            .with_baseline()
            .with_scaling("scale.dataset")
            .with_megacomplex_scaling("m1", "scale.megacomplex"),
    );
    let parameters = parameters(&[
        ("rates.1", 0.1),
        ("inputs.1", 1.0),
        ("scale.dataset", 2.0),
        ("scale.megacomplex", 3.0),
    ]);
    let mut data = HashMap::new();
    data.insert("d1".to_owned(), flat_dataset("d1", time.clone(), vec![0.0]));

    let group = group_of(&model, &data);
    let matrix = calculate_dataset_matrix(&group.items[0], &model, &parameters, &data).unwrap();

    for (row, &t) in time.iter().enumerate() {
        assert_relative_eq!(
            matrix.matrix[(row, 0)],
            6.0 * (-0.1 * t).exp(),
            epsilon = 1e-12
        );
        assert_relative_eq!(matrix.matrix[(row, 1)], 1.0);
    }
}

#[test]
fn group_merge_zero_fills_columns_a_dataset_does_not_contribute() {
    let time = dvector![0.0, 1.0];
    let model = Model::new(&["s1", "s2"])
        .add_k_matrix("k1", KMatrix::from_entries([(("s1", "s1"), "rates.1")]))
        .add_k_matrix("k2", KMatrix::from_entries([(("s2", "s2"), "rates.2")]))
        .add_megacomplex(Megacomplex::new("m1", &["k1"]))
        .add_megacomplex(Megacomplex::new("m2", &["k2"]))
        .add_initial_concentration(InitialConcentration::new("j1", &["s1"], &["inputs.1"]))
        .add_initial_concentration(InitialConcentration::new("j2", &["s2"], &["inputs.1"]))
        .add_dataset(DatasetDescriptor::new("d1", &["m1"]).with_initial_concentration("j1"))
        .add_dataset(DatasetDescriptor::new("d2", &["m2"]).with_initial_concentration("j2"));
    let parameters = parameters(&[("rates.1", 0.1), ("rates.2", 0.2), ("inputs.1", 1.0)]);
    let mut data = HashMap::new();
    data.insert("d1".to_owned(), flat_dataset("d1", time.clone(), vec![600.0]));
    data.insert("d2".to_owned(), flat_dataset("d2", time.clone(), vec![600.0]));

    let group = group_of(&model, &data);
    let item_matrix = calculate_group_item(&group, &model, &parameters, &data).unwrap();

    assert_eq!(
        item_matrix.clp_labels,
        vec!["s1".to_owned(), "s2".to_owned()]
    );
    assert_eq!(
        item_matrix.raw_clp_labels,
        vec![vec!["s1".to_owned()], vec!["s2".to_owned()]]
    );
    // d1 contributes nothing to s2, d2 nothing to s1
    assert_relative_eq!(item_matrix.concentrations[0].row(1).norm(), 0.0);
    assert_relative_eq!(item_matrix.concentrations[1].row(0).norm(), 0.0);
    assert_relative_eq!(item_matrix.concentrations[0][(0, 0)], 1.0);
    assert_relative_eq!(item_matrix.concentrations[1][(1, 0)], 1.0);

    let design = item_matrix.design_matrix();
    assert_eq!(design.shape(), (4, 2));
    // d1 rows first, then d2, matching the data group layout
    assert_relative_eq!(design[(0, 0)], 1.0);
    assert_relative_eq!(design[(0, 1)], 0.0);
    assert_relative_eq!(design[(2, 0)], 0.0);
    assert_relative_eq!(design[(2, 1)], 1.0);
}

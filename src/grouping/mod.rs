use crate::errors::FitError;
use crate::model::{Dataset, Model};
use nalgebra::DVector;
use std::collections::HashMap;


/// One observation inside a group: a dataset observed at one index of its
/// estimated axis.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupItem {
    /// the dataset's own estimated axis value that matched the group
    pub value: f64,
    /// the dataset label
    pub dataset: String,
    /// the index of `value` on the dataset's estimated axis
    pub estimated_index: usize,
}

/// All observations sharing one estimated axis value within the grouping
/// tolerance. Groups are the unit of batched work: each group is solved as
/// one stacked least squares problem per optimizer iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// the representative estimated axis value (the numerically smallest of
    /// the merged values)
    pub value: f64,
    /// the member observations in ascending value order; ties keep the
    /// dataset declaration order of the model
    pub items: Vec<GroupItem>,
}

impl Group {
    /// the position of a dataset within this group's item list, if present
    pub fn dataset_index(&self, label: &str) -> Option<usize> {
        self.items.iter().position(|item| item.dataset == label)
    }
}

/// Partition the estimated axis values of all declared datasets into
/// groups.
///
/// Values are merged into one group when they lie within `atol` of the
/// group's representative value, which is the numerically smallest member.
/// Merging is not chained: a value farther than `atol` from the
/// representative opens a new group even if it is close to the previous
/// member. Groups are returned in ascending order of their representative
/// value; the group index used throughout the engine is the position in
/// this vector.
///
/// # Errors
/// Fails if a dataset declared by the model is missing from `data`.
pub fn create_group(
    model: &Model,
    data: &HashMap<String, Dataset>,
    atol: f64,
) -> Result<Vec<Group>, FitError> {
    let mut entries = Vec::new();
    for descriptor in model.datasets() {
        let dataset = data
            .get(&descriptor.label)
            .ok_or_else(|| FitError::MissingDataset {
                label: descriptor.label.clone(),
            })?;
        for (estimated_index, &value) in dataset.estimated_axis().iter().enumerate() {
            entries.push(GroupItem {
                value,
                dataset: descriptor.label.clone(),
                estimated_index,
            });
        }
    }
    // stable sort keeps dataset declaration order for equal values
    entries.sort_by(|a, b| a.value.total_cmp(&b.value));

    let mut groups: Vec<Group> = Vec::new();
    for item in entries {
        match groups.last_mut() {
            Some(group) if (item.value - group.value).abs() <= atol => {
                group.items.push(item);
            }
            _ => groups.push(Group {
                value: item.value,
                items: vec![item],
            }),
        }
    }
    Ok(groups)
}

/// Build the data group: for every group, the observed traces of all member
/// datasets concatenated along the calculated axis, in item order. This
/// fixes the row order the variable projection solve must match.
///
/// # Errors
/// Fails if a group member's dataset is missing from `data`.
pub fn create_data_group(
    groups: &[Group],
    data: &HashMap<String, Dataset>,
) -> Result<Vec<DVector<f64>>, FitError> {
    groups
        .iter()
        .map(|group| {
            let mut traces = Vec::with_capacity(group.items.len());
            let mut rows = 0;
            for item in &group.items {
                let dataset = data
                    .get(&item.dataset)
                    .ok_or_else(|| FitError::MissingDataset {
                        label: item.dataset.clone(),
                    })?;
                let trace = dataset.trace(item.estimated_index);
                rows += trace.len();
                traces.push(trace);
            }
            let mut stacked = DVector::zeros(rows);
            let mut offset = 0;
            for trace in traces {
                stacked.rows_mut(offset, trace.len()).copy_from(&trace);
                offset += trace.len();
            }
            Ok(stacked)
        })
        .collect()
}

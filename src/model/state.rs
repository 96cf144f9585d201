//! Named parameter state and non-strict transplantation
//!
//! A `StateDict` is an ordered name → (shape, data) mapping, the unit of
//! exchange between models and the checkpoint store. Loading is
//! non-strict by design: only keys present in both the snapshot and the
//! target with matching shapes are applied, and the outcome is returned
//! as an explicit `LoadReport` so a capacity-reduction transplant is
//! auditable instead of silent.

use crate::tensor::Tensor;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One named parameter's serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Logical shape of the parameter.
    pub shape: Vec<usize>,
    /// Flattened row-major data.
    pub data: Vec<f32>,
}

/// Ordered mapping of parameter names to serialized entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDict {
    entries: BTreeMap<String, StateEntry>,
}

impl StateDict {
    /// Empty dict.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter under `name`.
    pub fn insert(&mut self, name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        self.entries.insert(name.into(), StateEntry { shape, data });
    }

    /// Look up a parameter.
    pub fn get(&self, name: &str) -> Option<&StateEntry> {
        self.entries.get(name)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dict is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateEntry)> {
        self.entries.iter()
    }

    /// Parameter names in order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

/// Outcome of a non-strict state load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Target keys whose values were applied from the snapshot.
    pub applied: Vec<String>,
    /// Target keys absent from the snapshot (kept their prior values).
    pub skipped_missing: Vec<String>,
    /// Target keys present in the snapshot with a different shape.
    pub skipped_shape: Vec<String>,
    /// Snapshot keys with no counterpart in the target.
    pub unused: Vec<String>,
}

impl LoadReport {
    /// Fraction of target parameters that received snapshot values.
    pub fn applied_fraction(&self) -> f32 {
        let total = self.applied.len() + self.skipped_missing.len() + self.skipped_shape.len();
        if total == 0 {
            return 0.0;
        }
        self.applied.len() as f32 / total as f32
    }

    /// Whether every target parameter was applied.
    pub fn is_exact(&self) -> bool {
        self.skipped_missing.is_empty() && self.skipped_shape.is_empty() && !self.applied.is_empty()
    }

    /// One-line summary for progress logs.
    pub fn summary(&self) -> String {
        format!(
            "applied {}/{} parameters ({} missing, {} shape-mismatched, {} unused)",
            self.applied.len(),
            self.applied.len() + self.skipped_missing.len() + self.skipped_shape.len(),
            self.skipped_missing.len(),
            self.skipped_shape.len(),
            self.unused.len()
        )
    }
}

/// Apply a snapshot onto a model's named parameters, key-intersected.
///
/// `targets` lists the model's parameters as (name, handle, shape).
/// Entries matching by name and shape are copied into the handles; all
/// other target parameters keep their current values.
pub fn apply_state(targets: &[(String, Tensor, Vec<usize>)], dict: &StateDict) -> LoadReport {
    let mut report = LoadReport::default();

    for (name, tensor, shape) in targets {
        match dict.get(name) {
            Some(entry) if entry.shape == *shape => {
                tensor.set_data(Array1::from_vec(entry.data.clone()));
                report.applied.push(name.clone());
            }
            Some(_) => report.skipped_shape.push(name.clone()),
            None => report.skipped_missing.push(name.clone()),
        }
    }

    let target_names: std::collections::BTreeSet<&str> =
        targets.iter().map(|(n, _, _)| n.as_str()).collect();
    for (name, _) in dict.iter() {
        if !target_names.contains(name.as_str()) {
            report.unused.push(name.clone());
        }
    }

    report
}

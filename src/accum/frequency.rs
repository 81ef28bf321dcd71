use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Label -> count map for keyboard statistics, including the synthetic
/// [FrequencyMap::TOTAL] label summing all events. Insertion order is kept so
/// the descending-count serialization has stable tie-breaks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyMap {
    counts: IndexMap<String, u64>,
}

impl FrequencyMap {
    pub const TOTAL: &'static str = "total";

    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one occurrence of `label` and bumps the total.
    pub fn note(&mut self, label: &str) {
        *self.counts.entry(label.to_owned()).or_insert(0) += 1;
        *self.counts.entry(Self::TOTAL.to_owned()).or_insert(0) += 1;
    }

    pub fn get(&self, label: &str) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Element-wise `self >= other` over the keys of `other`. Used as the
    /// counter-reset heuristic: a live map that does not dominate the last
    /// persisted map cannot be a continuation of it. Reboot and data
    /// corruption are indistinguishable from raw counts alone.
    pub fn dominates(&self, other: &FrequencyMap) -> bool {
        other
            .counts
            .iter()
            .all(|(label, count)| self.get(label) >= *count)
    }

    /// Per-label difference, clamped at zero. Labels whose difference is zero
    /// are omitted.
    pub fn saturating_sub(&self, other: &FrequencyMap) -> FrequencyMap {
        let counts = self
            .counts
            .iter()
            .filter_map(|(label, count)| {
                let delta = count.saturating_sub(other.get(label));
                (delta > 0).then(|| (label.clone(), delta))
            })
            .collect();
        Self { counts }
    }

    /// Adds every count of `other` into `self`.
    pub fn merge(&mut self, other: &FrequencyMap) {
        for (label, count) in &other.counts {
            *self.counts.entry(label.clone()).or_insert(0) += count;
        }
    }

    /// Serializes as a JSON object ordered by descending count, ties kept in
    /// insertion order. The ordering is purely presentational but is part of
    /// the on-disk format.
    pub fn to_json(&self) -> String {
        let mut entries = self.counts.iter().collect::<Vec<_>>();
        entries.sort_by(|a, b| b.1.cmp(a.1));

        let mut object = serde_json::Map::new();
        for (label, count) in entries {
            object.insert(label.clone(), serde_json::Value::from(*count));
        }
        serde_json::Value::Object(object).to_string()
    }

    pub fn from_json(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value.trim())
    }
}

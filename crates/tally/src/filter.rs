// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Point filters keyed by field name. Ordered so echoed summaries are stable.
pub type Filters = BTreeMap<String, FilterValue>;

/// Expected value for one field: an exact label or a set of acceptable labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    Many(Vec<String>),
}

impl FilterValue {
    /// Single value for one label, set otherwise.
    pub fn from_labels(mut labels: Vec<String>) -> Self {
        if labels.len() == 1 {
            FilterValue::One(labels.remove(0))
        } else {
            FilterValue::Many(labels)
        }
    }

    pub fn matches(&self, actual: &str) -> bool {
        match self {
            FilterValue::One(expected) => expected == actual,
            FilterValue::Many(expected) => expected.iter().any(|e| e == actual),
        }
    }

    /// Lenient conversion from loosely typed JSON: scalars are stringified, arrays keep
    /// their scalar members, null and objects are rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => {
                let labels: Vec<String> = items.iter().filter_map(scalar_label).collect();
                if labels.is_empty() {
                    None
                } else {
                    Some(FilterValue::Many(labels))
                }
            }
            other => scalar_label(other).map(FilterValue::One),
        }
    }
}

fn scalar_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// True when `record` satisfies every filter. Field names outside the field set
/// never match, so an unsupported filter yields an empty selection rather than an error.
pub fn record_matches(record: &Record, filters: &Filters) -> bool {
    filters.iter().all(|(field, expected)| {
        record
            .value_of(field)
            .is_some_and(|actual| expected.matches(actual))
    })
}

/// Records matching all filters, in input order. No filters is the identity.
pub fn filter<'a, I>(records: I, filters: &Filters) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    records
        .into_iter()
        .filter(|record| record_matches(record, filters))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Category, ResponseStatus};
    use serde_json::json;

    fn sample() -> Vec<Record> {
        vec![
            Record::new(1, Category::WaterSupply, "Ward 5", ResponseStatus::NoResponse, 100),
            Record::new(2, Category::WaterSupply, "Ward 45", ResponseStatus::Resolved, 10),
            Record::new(3, Category::Roads, "Ward 5", ResponseStatus::Responded, 50),
        ]
    }

    #[test]
    fn single_and_set_filters() {
        let records = sample();
        let mut filters = Filters::new();
        filters.insert("category".into(), FilterValue::One("Water Supply".into()));
        filters.insert(
            "ward".into(),
            FilterValue::Many(vec!["Ward 5".into(), "Ward 45".into()]),
        );
        let ids: Vec<u64> = filter(&records, &filters).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn unknown_field_never_matches() {
        let records = sample();
        let mut filters = Filters::new();
        filters.insert("district".into(), FilterValue::One("Delhi".into()));
        assert!(filter(&records, &filters).is_empty());
    }

    #[test]
    fn empty_filters_is_identity() {
        let records = sample();
        assert_eq!(filter(&records, &Filters::new()).len(), records.len());
    }

    #[test]
    fn lenient_json_values() {
        assert_eq!(
            FilterValue::from_json(&json!(["Ward 5", 45, null])),
            Some(FilterValue::Many(vec!["Ward 5".into(), "45".into()]))
        );
        assert_eq!(FilterValue::from_json(&json!(null)), None);
        assert_eq!(FilterValue::from_json(&json!([])), None);
        assert_eq!(
            FilterValue::from_labels(vec!["Ward 5".into()]),
            FilterValue::One("Ward 5".into())
        );
    }

    #[test]
    fn untagged_serialisation() {
        let mut filters = Filters::new();
        filters.insert("category".into(), FilterValue::One("Roads".into()));
        filters.insert("ward".into(), FilterValue::Many(vec!["Ward 1".into()]));
        assert_eq!(
            serde_json::to_value(&filters).unwrap(),
            json!({"category": "Roads", "ward": ["Ward 1"]})
        );
    }
}

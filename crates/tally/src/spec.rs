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

use crate::aggregate::{filtered_breakdown, FilteredBreakdown};
use crate::filter::{FilterValue, Filters};
use crate::metrics::Metric;
use crate::record::{Field, Record};
use serde::{Deserialize, Serialize};

/// A filtered breakdown request: point filters, one or two grouping fields, one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default)]
    pub filters: Filters,
    pub breakdown_field: String,
    #[serde(default)]
    pub cross_field: Option<String>,
    #[serde(default)]
    pub metric: Metric,
}

impl QuerySpec {
    pub fn new(breakdown_field: Field) -> Self {
        Self {
            filters: Filters::new(),
            breakdown_field: breakdown_field.as_str().to_string(),
            cross_field: None,
            metric: Metric::default(),
        }
    }

    pub fn with_filter(mut self, field: Field, value: FilterValue) -> Self {
        self.filters.insert(field.as_str().to_string(), value);
        self
    }

    pub fn with_cross_field(mut self, field: Field) -> Self {
        self.cross_field = Some(field.as_str().to_string());
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Names in the spec that fall outside the field set. Such a spec still runs,
    /// it just matches nothing.
    pub fn unsupported_fields(&self) -> Vec<&str> {
        self.filters
            .keys()
            .map(String::as_str)
            .chain(std::iter::once(self.breakdown_field.as_str()))
            .chain(self.cross_field.as_deref())
            .filter(|name| name.parse::<Field>().is_err())
            .collect()
    }

    pub fn run(&self, records: &[Record]) -> FilteredBreakdown {
        filtered_breakdown(
            records,
            &self.breakdown_field,
            &self.filters,
            self.cross_field.as_deref(),
            self.metric,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Category, ResponseStatus};
    use serde_json::json;

    #[test]
    fn serialises_in_wire_shape() {
        let spec = QuerySpec::new(Field::Ward)
            .with_filter(Field::Category, FilterValue::One("Water Supply".into()))
            .with_filter(
                Field::Ward,
                FilterValue::Many(vec!["Ward 5".into(), "Ward 45".into()]),
            )
            .with_cross_field(Field::Caste);
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({
                "filters": {"category": "Water Supply", "ward": ["Ward 5", "Ward 45"]},
                "breakdown_field": "ward",
                "cross_field": "caste",
                "metric": "avg_silence"
            })
        );
    }

    #[test]
    fn unsupported_names_degrade_to_empty() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "filters": {"district": "North"},
            "breakdown_field": "caste"
        }))
        .unwrap();
        assert_eq!(spec.unsupported_fields(), vec!["district"]);
        let records = vec![Record::new(1, Category::Roads, "Ward 1", ResponseStatus::Resolved, 3)];
        assert_eq!(spec.run(&records).total_filtered, 0);
    }
}

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

//! Pure aggregation over borrowed records. Nothing here touches the store.

use crate::filter::{filter, Filters};
use crate::metrics::{BucketStats, Metric, ScoreAccumulator};
use crate::record::{Field, Record};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Half-open `[lo, hi)` day ranges for the temporal breakdown.
pub const TEMPORAL_RANGES: [(u32, u32, &str); 8] = [
    (0, 30, "0-30 days"),
    (30, 60, "30-60 days"),
    (60, 90, "60-90 days"),
    (90, 120, "90-120 days"),
    (120, 180, "120-180 days"),
    (180, 240, "180-240 days"),
    (240, 300, "240-300 days"),
    (300, 365, "300-365 days"),
];

/// One entry per distinct value of `field`, sorted descending by `metric`
/// (ties keep ascending label order). `top_n == 0` keeps everything.
///
/// A field name outside the field set yields an empty breakdown.
pub fn field_breakdown<'a, I>(records: I, field: &str, metric: Metric, top_n: usize) -> Vec<BucketStats>
where
    I: IntoIterator<Item = &'a Record>,
{
    let Ok(field) = field.parse::<Field>() else {
        debug!(field, "breakdown requested on unsupported field");
        return Vec::new();
    };
    let mut buckets: BTreeMap<&'a str, ScoreAccumulator> = BTreeMap::new();
    for record in records {
        buckets
            .entry(record.value(field))
            .or_default()
            .push(record.silence_score);
    }
    let mut results: Vec<BucketStats> = buckets
        .into_iter()
        .map(|(label, acc)| acc.into_stats(label.to_string()))
        .collect();
    results.sort_by(|a, b| descending(a.metric(metric), b.metric(metric)));
    if top_n > 0 {
        results.truncate(top_n);
    }
    results
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossTab {
    pub field_a: String,
    pub field_b: String,
    pub metric: Metric,
    pub labels_a: Vec<String>,
    pub labels_b: Vec<String>,
    /// `matrix[i][j]` is the metric for (`labels_a[i]`, `labels_b[j]`); absent pairs are 0.
    pub matrix: Vec<Vec<f64>>,
}

/// Bucketed scores keyed by (a, b) plus the sorted distinct labels on each axis.
struct Grid<'a> {
    labels_a: Vec<&'a str>,
    labels_b: Vec<&'a str>,
    cells: BTreeMap<(&'a str, &'a str), ScoreAccumulator>,
}

impl<'a> Grid<'a> {
    fn build<I>(records: I, field_a: Field, field_b: Field) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut cells: BTreeMap<(&'a str, &'a str), ScoreAccumulator> = BTreeMap::new();
        let mut labels_a = BTreeSet::new();
        let mut labels_b = BTreeSet::new();
        for record in records {
            let a = record.value(field_a);
            let b = record.value(field_b);
            labels_a.insert(a);
            labels_b.insert(b);
            cells.entry((a, b)).or_default().push(record.silence_score);
        }
        Self {
            labels_a: labels_a.into_iter().collect(),
            labels_b: labels_b.into_iter().collect(),
            cells,
        }
    }

    fn cell(&self, a: &'a str, b: &'a str) -> ScoreAccumulator {
        self.cells.get(&(a, b)).copied().unwrap_or_default()
    }
}

/// Dense two-field cross-tabulation. Unsupported field names give empty axes.
pub fn cross_tabulate<'a, I>(records: I, field_a: &str, field_b: &str, metric: Metric) -> CrossTab
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut tab = CrossTab {
        field_a: field_a.to_string(),
        field_b: field_b.to_string(),
        metric,
        labels_a: Vec::new(),
        labels_b: Vec::new(),
        matrix: Vec::new(),
    };
    let (Ok(a), Ok(b)) = (field_a.parse::<Field>(), field_b.parse::<Field>()) else {
        debug!(field_a, field_b, "cross-tab requested on unsupported field");
        return tab;
    };
    let grid = Grid::build(records, a, b);
    tab.matrix = grid
        .labels_a
        .iter()
        .map(|la| {
            grid.labels_b
                .iter()
                .map(|lb| grid.cell(la, lb).value(metric))
                .collect()
        })
        .collect();
    tab.labels_a = grid.labels_a.iter().map(|s| s.to_string()).collect();
    tab.labels_b = grid.labels_b.iter().map(|s| s.to_string()).collect();
    tab
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCell {
    pub label: String,
    pub value: f64,
    pub count: usize,
    pub avg_silence: f64,
    pub silenced_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRow {
    pub label: String,
    /// One cell per `labels_b` entry, in the same order.
    pub cells: Vec<CrossCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BreakdownBody {
    Cross {
        labels_a: Vec<String>,
        labels_b: Vec<String>,
        rows: Vec<CrossRow>,
    },
    Single {
        breakdown: Vec<BucketStats>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredBreakdown {
    pub filter_summary: Filters,
    pub total_filtered: usize,
    pub breakdown_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_field: Option<String>,
    pub metric: Metric,
    #[serde(flatten)]
    pub body: BreakdownBody,
}

impl FilteredBreakdown {
    pub fn is_empty(&self) -> bool {
        self.total_filtered == 0
    }
}

/// Filter, then break down by one field or cross-tabulate by two.
///
/// An empty selection is a normal result: `total_filtered == 0` with an empty
/// `breakdown`, whatever the requested shape.
pub fn filtered_breakdown(
    records: &[Record],
    breakdown_field: &str,
    filters: &Filters,
    cross_field: Option<&str>,
    metric: Metric,
) -> FilteredBreakdown {
    let selected = filter(records, filters);
    debug!(
        total = records.len(),
        selected = selected.len(),
        breakdown_field,
        cross_field,
        "filtered breakdown"
    );
    let mut result = FilteredBreakdown {
        filter_summary: filters.clone(),
        total_filtered: selected.len(),
        breakdown_field: breakdown_field.to_string(),
        cross_field: cross_field.map(str::to_string),
        metric,
        body: BreakdownBody::Single {
            breakdown: Vec::new(),
        },
    };
    if selected.is_empty() {
        return result;
    }

    result.body = match cross_field {
        Some(cross) => cross_rows(&selected, breakdown_field, cross, metric),
        None => BreakdownBody::Single {
            breakdown: field_breakdown(selected.iter().copied(), breakdown_field, metric, 0),
        },
    };
    result
}

fn cross_rows(selected: &[&Record], field_a: &str, field_b: &str, metric: Metric) -> BreakdownBody {
    let (Ok(a), Ok(b)) = (field_a.parse::<Field>(), field_b.parse::<Field>()) else {
        return BreakdownBody::Cross {
            labels_a: Vec::new(),
            labels_b: Vec::new(),
            rows: Vec::new(),
        };
    };
    let grid = Grid::build(selected.iter().copied(), a, b);
    let rows = grid
        .labels_a
        .iter()
        .map(|la| CrossRow {
            label: la.to_string(),
            cells: grid
                .labels_b
                .iter()
                .map(|lb| {
                    let acc = grid.cell(la, lb);
                    CrossCell {
                        label: lb.to_string(),
                        value: acc.value(metric),
                        count: acc.count(),
                        avg_silence: acc.avg_silence(),
                        silenced_pct: acc.silenced_pct(),
                    }
                })
                .collect(),
        })
        .collect();
    BreakdownBody::Cross {
        labels_a: grid.labels_a.iter().map(|s| s.to_string()).collect(),
        labels_b: grid.labels_b.iter().map(|s| s.to_string()).collect(),
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalBucket {
    pub time_bucket: String,
    pub avg_silence: f64,
    pub count: usize,
    pub silenced_pct: f64,
}

impl TemporalBucket {
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::AvgSilence => self.avg_silence,
            Metric::Count => self.count as f64,
            Metric::SilencedPct => self.silenced_pct,
        }
    }
}

/// Fixed day-count buckets in range order. Unlike [`field_breakdown`], whose labels
/// come from the data and so are never empty, these ranges are fixed and may hold no
/// records; empty ones are omitted. Records at 365 days or more fall outside every range.
pub fn temporal_buckets<'a, I>(records: I) -> Vec<TemporalBucket>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut accs = [ScoreAccumulator::default(); TEMPORAL_RANGES.len()];
    for record in records {
        let days = record.days_in_system;
        if let Some(idx) = TEMPORAL_RANGES
            .iter()
            .position(|(lo, hi, _)| (*lo..*hi).contains(&days))
        {
            accs[idx].push(record.silence_score);
        }
    }
    TEMPORAL_RANGES
        .iter()
        .zip(accs)
        .filter(|(_, acc)| acc.count() > 0)
        .map(|((_, _, label), acc)| TemporalBucket {
            time_bucket: (*label).to_string(),
            avg_silence: acc.avg_silence(),
            count: acc.count(),
            silenced_pct: acc.silenced_pct(),
        })
        .collect()
}

/// Records scoring strictly above `threshold`, highest first, at most `limit`
/// (`0` for no limit).
pub fn silenced_records<'a, I>(records: I, threshold: f64, limit: usize) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut silenced: Vec<&Record> = records
        .into_iter()
        .filter(|r| r.silence_score > threshold)
        .collect();
    silenced.sort_by(|a, b| descending(a.silence_score, b.silence_score));
    if limit > 0 {
        silenced.truncate(limit);
    }
    silenced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterValue;
    use crate::record::{Caste, Category, Gender, IncomeBracket, ResponseStatus};
    use serde_json::json;

    fn scenario() -> Vec<Record> {
        let mut records = Vec::new();
        for (id, score) in [(1, 80.0), (2, 80.0), (3, 80.0), (4, 50.0), (5, 50.0), (6, 50.0)] {
            records.push(
                Record::new(id, Category::WaterSupply, "Ward 5", ResponseStatus::NoResponse, 10)
                    .with_score(score),
            );
        }
        for id in 7..=10 {
            records.push(
                Record::new(id, Category::Roads, "Ward 45", ResponseStatus::Resolved, 10)
                    .with_score(20.0),
            );
        }
        records
    }

    #[test]
    fn category_breakdown_scenario() {
        let records = scenario();
        let result = field_breakdown(&records, "category", Metric::AvgSilence, 0);
        assert_eq!(
            result,
            vec![
                BucketStats {
                    label: "Water Supply".into(),
                    avg_silence: 65.0,
                    count: 6,
                    silenced_pct: 50.0
                },
                BucketStats {
                    label: "Roads".into(),
                    avg_silence: 20.0,
                    count: 4,
                    silenced_pct: 0.0
                },
            ]
        );
    }

    #[test]
    fn breakdown_sorts_by_requested_metric_and_truncates() {
        let mut records = scenario();
        for id in 11..=20 {
            records.push(
                Record::new(id, Category::Roads, "Ward 1", ResponseStatus::Resolved, 10)
                    .with_score(10.0),
            );
        }
        let by_count = field_breakdown(&records, "category", Metric::Count, 1);
        assert_eq!(by_count.len(), 1);
        assert_eq!(by_count[0].label, "Roads");
        assert_eq!(by_count[0].count, 14);
    }

    #[test]
    fn unsupported_field_is_empty() {
        let records = scenario();
        assert!(field_breakdown(&records, "district", Metric::Count, 0).is_empty());
        let tab = cross_tabulate(&records, "district", "caste", Metric::Count);
        assert!(tab.labels_a.is_empty() && tab.matrix.is_empty());
    }

    #[test]
    fn cross_tab_is_dense_with_zero_fill() {
        let records = vec![
            Record::new(1, Category::Roads, "Ward 1", ResponseStatus::NoResponse, 365)
                .with_demographics(Gender::Female, Caste::Sc, IncomeBracket::UpTo3L),
            Record::new(2, Category::Health, "Ward 2", ResponseStatus::NoResponse, 365)
                .with_demographics(Gender::Male, Caste::General, IncomeBracket::UpTo3L),
        ];
        let tab = cross_tabulate(&records, "gender", "caste", Metric::Count);
        assert_eq!(tab.labels_a, vec!["F", "M"]);
        assert_eq!(tab.labels_b, vec!["General", "SC"]);
        assert_eq!(tab.matrix, vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn filtered_breakdown_cross_shape() {
        let records = scenario();
        let mut filters = Filters::new();
        filters.insert("category".into(), FilterValue::One("Water Supply".into()));
        let result = filtered_breakdown(&records, "ward", &filters, Some("category"), Metric::Count);
        assert_eq!(result.total_filtered, 6);
        match &result.body {
            BreakdownBody::Cross { labels_a, labels_b, rows } => {
                assert_eq!(labels_a, &vec!["Ward 5".to_string()]);
                assert_eq!(labels_b, &vec!["Water Supply".to_string()]);
                assert_eq!(rows[0].cells[0].value, 6.0);
                assert_eq!(rows[0].cells[0].avg_silence, 65.0);
            }
            other => panic!("expected cross body, got {other:?}"),
        }
    }

    #[test]
    fn empty_filter_match_is_not_an_error() {
        let records = scenario();
        let mut filters = Filters::new();
        filters.insert("ward".into(), FilterValue::One("Ward 99".into()));
        let result = filtered_breakdown(&records, "caste", &filters, Some("gender"), Metric::AvgSilence);
        assert!(result.is_empty());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["total_filtered"], json!(0));
        assert_eq!(value["breakdown"], json!([]));
        assert_eq!(value["filter_summary"], json!({"ward": "Ward 99"}));
    }

    #[test]
    fn temporal_buckets_skip_empty_ranges() {
        let records = vec![
            Record::new(1, Category::Roads, "Ward 1", ResponseStatus::NoResponse, 0),
            Record::new(2, Category::Roads, "Ward 1", ResponseStatus::NoResponse, 29),
            Record::new(3, Category::Roads, "Ward 1", ResponseStatus::NoResponse, 30),
            Record::new(4, Category::Roads, "Ward 1", ResponseStatus::NoResponse, 364),
            Record::new(5, Category::Roads, "Ward 1", ResponseStatus::NoResponse, 365),
        ];
        let buckets = temporal_buckets(&records);
        let labels: Vec<&str> = buckets.iter().map(|b| b.time_bucket.as_str()).collect();
        assert_eq!(labels, vec!["0-30 days", "30-60 days", "300-365 days"]);
        assert_eq!(buckets[0].count, 2);
    }

    #[test]
    fn silenced_records_sorted_and_limited() {
        let records = scenario();
        let top = silenced_records(&records, 70.0, 2);
        assert_eq!(top.len(), 2);
        assert!(top.iter().all(|r| r.silence_score == 80.0));
        assert_eq!(silenced_records(&records, 70.0, 0).len(), 3);
    }
}

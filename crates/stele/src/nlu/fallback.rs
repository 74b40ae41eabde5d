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

//! Deterministic keyword parsers used when the completer is absent or unhelpful.
//! Both are pure: the same message and configuration always yield the same spec.

use super::resolver::ResolverConfig;
use super::vocabulary::{
    any_phrase, breakdown_phrase, extract_wards, normalise, BREAKDOWN_FIELD_KEYWORDS,
    CATEGORY_KEYWORDS, CHART_FIELD_GROUPS, CHART_KIND_KEYWORDS, CROSS_CONNECTIVES,
    METRIC_KEYWORDS, STATUS_KEYWORDS, TEMPORAL_KEYWORDS, ZONE_KEYWORDS,
};
use estel::{ChartKind, ChartSpec, TEMPORAL_FIELD};
use tally::{Field, FilterValue, Metric, QuerySpec};

pub fn fallback_query_spec(message: &str, config: &ResolverConfig) -> QuerySpec {
    let text = normalise(message);
    let mut filters = tally::Filters::new();

    if let Some(category) = CATEGORY_KEYWORDS.longest_match(&text) {
        filters.insert(
            Field::Category.as_str().to_string(),
            FilterValue::One(category.as_str().to_string()),
        );
    }
    let wards = extract_wards(message);
    match wards.as_slice() {
        [] => {}
        [ward] => {
            filters.insert(Field::Ward.as_str().to_string(), FilterValue::One(ward.clone()));
        }
        _ => {
            filters.insert(Field::Ward.as_str().to_string(), FilterValue::Many(wards.clone()));
        }
    }
    if let Some(zone) = ZONE_KEYWORDS.longest_match(&text) {
        filters.insert(
            Field::WardType.as_str().to_string(),
            FilterValue::One(zone.as_str().to_string()),
        );
    }
    if let Some(status) = STATUS_KEYWORDS.longest_match(&text) {
        filters.insert(
            Field::ResponseStatus.as_str().to_string(),
            FilterValue::One(status.as_str().to_string()),
        );
    }

    let detected: Vec<Field> = BREAKDOWN_FIELD_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| breakdown_phrase(&text, kw)))
        .map(|(field, _)| *field)
        .collect();

    let (breakdown, cross) = if wards.len() >= 2 {
        let other = detected.iter().copied().find(|field| *field != Field::Ward);
        (Field::Ward, other)
    } else {
        match detected.as_slice() {
            [] => (config.default_breakdown_field, None),
            [only] => (*only, None),
            [first, second, ..] => (*first, Some(*second)),
        }
    };

    QuerySpec {
        filters,
        breakdown_field: breakdown.as_str().to_string(),
        cross_field: cross.map(|field| field.as_str().to_string()),
        metric: Metric::AvgSilence,
    }
}

pub fn fallback_chart_spec(message: &str, config: &ResolverConfig) -> ChartSpec {
    let text = normalise(message);
    let kind = CHART_KIND_KEYWORDS.longest_match(&text).unwrap_or(ChartKind::Bar);

    let mut fields: Vec<String> = CHART_FIELD_GROUPS
        .iter()
        .filter(|(_, keywords)| any_phrase(&text, keywords))
        .map(|(field, _)| field.as_str().to_string())
        .collect();
    if fields.is_empty() {
        let fallback = if any_phrase(&text, TEMPORAL_KEYWORDS) {
            TEMPORAL_FIELD.to_string()
        } else {
            config.default_chart_field.clone()
        };
        fields.push(fallback);
    }
    let keep = if fields.len() >= 2 && any_phrase(&text, CROSS_CONNECTIVES) {
        2
    } else {
        1
    };
    fields.truncate(keep);

    let metric = METRIC_KEYWORDS.longest_match(&text).unwrap_or(if kind.prefers_count() {
        Metric::Count
    } else {
        Metric::AvgSilence
    });

    ChartSpec::new(kind, fields, metric)
}

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

//! Fixed keyword tables for the deterministic parsers and the router.
//!
//! Every phrase is stored in normalised form (see [`normalise`]) and matched on word
//! boundaries, so "st" never matches inside "statistics".

use estel::ChartKind;
use lazy_static::lazy_static;
use regex::Regex;
use tally::{
    Caste, Category, Field, Gender, IncomeBracket, Metric, ResponseStatus, WardType,
};

lazy_static! {
    static ref WARD_REGEX: Regex = Regex::new(r"(?i)\bward\s*(\d+)").unwrap();
}

/// Lowercase, `%` spelled out, every non-alphanumeric except `_` turned into a single
/// space, padded with one space either side.
pub fn normalise(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for ch in text.chars() {
        let piece = if ch == '%' {
            " percent "
        } else if ch.is_alphanumeric() || ch == '_' {
            out.extend(ch.to_lowercase());
            continue;
        } else {
            " "
        };
        for p in piece.chars() {
            if !(p == ' ' && out.ends_with(' ')) {
                out.push(p);
            }
        }
    }
    if !out.ends_with(' ') {
        out.push(' ');
    }
    out
}

/// `normalised` must come from [`normalise`]; `phrase` is a bare normalised phrase.
pub fn contains_phrase(normalised: &str, phrase: &str) -> bool {
    normalised
        .match_indices(phrase)
        .any(|(idx, _)| {
            let before = normalised[..idx].ends_with(' ');
            let after = normalised[idx + phrase.len()..].starts_with(' ');
            before && after
        })
}

/// Ordered phrase table. Order is the tie-break when two phrases have the same length.
#[derive(Debug)]
pub struct KeywordTable<T: 'static> {
    entries: &'static [(&'static str, T)],
}

impl<T: Copy> KeywordTable<T> {
    pub const fn new(entries: &'static [(&'static str, T)]) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &'static [(&'static str, T)] {
        self.entries
    }

    /// Value of the longest matching phrase; the earlier entry wins on equal length.
    pub fn longest_match(&self, normalised: &str) -> Option<T> {
        let mut best: Option<(usize, T)> = None;
        for (phrase, value) in self.entries {
            if contains_phrase(normalised, phrase)
                && best.map_or(true, |(len, _)| phrase.len() > len)
            {
                best = Some((phrase.len(), *value));
            }
        }
        best.map(|(_, value)| value)
    }

    pub fn first_match(&self, normalised: &str) -> Option<T> {
        self.entries
            .iter()
            .find(|(phrase, _)| contains_phrase(normalised, phrase))
            .map(|(_, value)| *value)
    }

    pub fn matches(&self, normalised: &str) -> bool {
        self.first_match(normalised).is_some()
    }
}

/// Flat phrase set.
pub fn any_phrase(normalised: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(normalised, p))
}

/// `"Ward N"` labels in order of first appearance, duplicates dropped.
/// Digits are kept as written, so `ward 05` yields `Ward 05`.
pub fn extract_wards(text: &str) -> Vec<String> {
    let mut wards: Vec<String> = Vec::new();
    for caps in WARD_REGEX.captures_iter(text) {
        let Some(number) = caps.get(1) else {
            continue;
        };
        let label = format!("Ward {}", number.as_str());
        if !wards.contains(&label) {
            wards.push(label);
        }
    }
    wards
}

pub fn mentions_ward_number(text: &str) -> bool {
    WARD_REGEX.is_match(text)
}

pub const CATEGORY_KEYWORDS: KeywordTable<Category> = KeywordTable::new(&[
    ("water", Category::WaterSupply),
    ("water supply", Category::WaterSupply),
    ("road", Category::Roads),
    ("roads", Category::Roads),
    ("sanitation", Category::Sanitation),
    ("electricity", Category::Electricity),
    ("waste", Category::WasteManagement),
    ("waste management", Category::WasteManagement),
    ("transport", Category::PublicTransport),
    ("public transport", Category::PublicTransport),
    ("safety", Category::Safety),
    ("health", Category::Health),
]);

pub const ZONE_KEYWORDS: KeywordTable<WardType> = KeywordTable::new(&[
    ("elite", WardType::Elite),
    ("middle", WardType::Middle),
    ("poor", WardType::Poor),
    ("slum", WardType::Slum),
    ("slums", WardType::Slum),
]);

pub const STATUS_KEYWORDS: KeywordTable<ResponseStatus> = KeywordTable::new(&[
    ("no_response", ResponseStatus::NoResponse),
    ("no response", ResponseStatus::NoResponse),
    ("responded", ResponseStatus::Responded),
    ("resolved", ResponseStatus::Resolved),
    ("rejected", ResponseStatus::Rejected),
]);

/// Field keywords for breakdown detection, in field priority order.
pub const BREAKDOWN_FIELD_KEYWORDS: &[(Field, &[&str])] = &[
    (Field::Caste, &["caste", "castes", "sc", "st", "obc"]),
    (Field::Gender, &["gender", "male", "female"]),
    (Field::IncomeBracket, &["income", "poor", "rich"]),
    (Field::Ward, &["ward", "wards"]),
    (Field::Category, &["category", "categories", "type"]),
    (Field::WardType, &["zone", "zones"]),
    (Field::ResponseStatus, &["status"]),
];

/// True when `keyword` appears as "by <kw>", "<kw> pattern(s)" or "<kw> breakdown".
pub fn breakdown_phrase(normalised: &str, keyword: &str) -> bool {
    [
        format!("by {keyword}"),
        format!("{keyword} pattern"),
        format!("{keyword} patterns"),
        format!("{keyword} breakdown"),
    ]
    .iter()
    .any(|pattern| contains_phrase(normalised, pattern))
}

pub const CHART_KIND_KEYWORDS: KeywordTable<ChartKind> = KeywordTable::new(&[
    ("bar", ChartKind::Bar),
    ("bars", ChartKind::Bar),
    ("bar chart", ChartKind::Bar),
    ("vertical bar", ChartKind::Bar),
    ("hologram", ChartKind::Bar),
    ("horizontal", ChartKind::HorizontalBar),
    ("horizontal bar", ChartKind::HorizontalBar),
    ("pie", ChartKind::Pie),
    ("pie chart", ChartKind::Pie),
    ("doughnut", ChartKind::Doughnut),
    ("donut", ChartKind::Doughnut),
    ("ring", ChartKind::Doughnut),
    ("line", ChartKind::Line),
    ("line chart", ChartKind::Line),
    ("trend", ChartKind::Line),
    ("radar", ChartKind::Radar),
    ("spider", ChartKind::Radar),
    ("web", ChartKind::Radar),
    ("polar", ChartKind::PolarArea),
    ("polar area", ChartKind::PolarArea),
    ("stacked", ChartKind::Stacked),
    ("stacked bar", ChartKind::Stacked),
    ("grouped", ChartKind::Grouped),
    ("grouped bar", ChartKind::Grouped),
    ("heatmap", ChartKind::Heatmap),
    ("heat map", ChartKind::Heatmap),
]);

/// Chart field groups in detection priority order.
pub const CHART_FIELD_GROUPS: &[(Field, &[&str])] = &[
    (
        Field::Gender,
        &["gender", "genders", "male", "female", "males", "females", "women", "men", "woman", "man"],
    ),
    (Field::Caste, &["caste", "castes", "sc", "st", "obc", "general category"]),
    (
        Field::IncomeBracket,
        &["income", "incomes", "income bracket", "income_bracket", "poor", "rich", "wealth", "money"],
    ),
    (Field::Ward, &["ward", "wards"]),
    (Field::WardType, &["ward_type", "zone", "zones", "elite", "slum", "slums"]),
    (
        Field::Category,
        &[
            "category", "categories", "water", "road", "roads", "sanitation", "electricity",
            "waste", "transport", "safety", "health",
        ],
    ),
    (
        Field::ResponseStatus,
        &["status", "response", "response_status", "rejected", "no_response", "resolved"],
    ),
];

pub const TEMPORAL_KEYWORDS: &[&str] =
    &["time", "temporal", "trend", "over time", "month", "months", "decay"];

/// Connectives that turn two detected chart fields into a cross-tabulation.
pub const CROSS_CONNECTIVES: &[&str] = &["vs", "versus", "by", "across", "against"];

pub const METRIC_KEYWORDS: KeywordTable<Metric> = KeywordTable::new(&[
    ("silence", Metric::AvgSilence),
    ("score", Metric::AvgSilence),
    ("silence score", Metric::AvgSilence),
    ("avg", Metric::AvgSilence),
    ("average", Metric::AvgSilence),
    ("avg_silence", Metric::AvgSilence),
    ("count", Metric::Count),
    ("number", Metric::Count),
    ("total", Metric::Count),
    ("how many", Metric::Count),
    ("percent", Metric::SilencedPct),
    ("percentage", Metric::SilencedPct),
    ("silenced", Metric::SilencedPct),
    ("silenced_pct", Metric::SilencedPct),
    ("rate", Metric::SilencedPct),
]);

pub const VISUALISATION_KEYWORDS: &[&str] = &[
    "chart", "charts", "graph", "graphs", "plot", "visualize", "visualise", "visualization",
    "visualisation", "show me", "display", "pie", "bar", "bars", "histogram", "doughnut",
    "donut", "radar", "heatmap", "hologram", "polar", "spider", "stacked", "grouped",
    "horizontal bar", "vertical bar", "line chart", "trend chart", "draw", "diagram",
    "compare visually",
];

/// Canonical stored label for a loosely written value: known enum labels and aliases are
/// normalised ("sc" -> "SC"), bare ward numbers gain the "Ward " prefix, anything else
/// passes through trimmed.
pub fn canonical_value(field: Field, raw: &str) -> String {
    let trimmed = raw.trim();
    let known = match field {
        Field::Category => Some(Category::parse_lenient(trimmed).as_str()),
        Field::WardType => Some(WardType::parse_lenient(trimmed).as_str()),
        Field::Gender => Some(Gender::parse_lenient(trimmed).as_str()),
        Field::Caste => Some(Caste::parse_lenient(trimmed).as_str()),
        Field::IncomeBracket => Some(IncomeBracket::parse_lenient(trimmed).as_str()),
        Field::ResponseStatus => Some(ResponseStatus::parse_lenient(trimmed).as_str()),
        Field::Ward => None,
    };
    match known {
        Some(label) if label != tally::UNKNOWN_LABEL => label.to_string(),
        Some(_) => trimmed.to_string(),
        None if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) => {
            format!("Ward {trimmed}")
        }
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalisation_pads_and_splits() {
        assert_eq!(normalise("Water, Ward-5 vs. Ward 45!"), " water ward 5 vs ward 45 ");
        assert_eq!(normalise("50% silenced_pct"), " 50 percent silenced_pct ");
        assert_eq!(normalise(""), " ");
    }

    #[test]
    fn phrases_match_on_word_boundaries() {
        let text = normalise("overall statistics by caste");
        assert!(contains_phrase(&text, "statistics"));
        assert!(!contains_phrase(&text, "st"));
        assert!(contains_phrase(&text, "by caste"));
        assert!(breakdown_phrase(&text, "caste"));
    }

    #[test]
    fn longest_phrase_wins() {
        let text = normalise("a horizontal bar chart");
        assert_eq!(CHART_KIND_KEYWORDS.longest_match(&text), Some(ChartKind::HorizontalBar));
        let text = normalise("public transport delays");
        assert_eq!(CATEGORY_KEYWORDS.longest_match(&text), Some(Category::PublicTransport));
        assert_eq!(CHART_KIND_KEYWORDS.longest_match(&normalise("numbers")), None);
    }

    #[test]
    fn wards_are_extracted_in_order_without_duplicates() {
        assert_eq!(
            extract_wards("Ward 5 vs ward45 and WARD 5"),
            vec!["Ward 5".to_string(), "Ward 45".to_string()]
        );
        assert!(extract_wards("no wards here").is_empty());
        assert_eq!(extract_wards("ward 05 and Ward 5"), vec!["Ward 05", "Ward 5"]);
    }

    #[test]
    fn values_are_canonicalised() {
        assert_eq!(canonical_value(Field::Caste, "sc"), "SC");
        assert_eq!(canonical_value(Field::Category, "water"), "Water Supply");
        assert_eq!(canonical_value(Field::Ward, "12"), "Ward 12");
        assert_eq!(canonical_value(Field::Category, "Potholes"), "Potholes");
    }
}

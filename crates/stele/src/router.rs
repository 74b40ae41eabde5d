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

//! Keyword routing from a message to the analytics tools that answer it.

use crate::nlu::vocabulary::{
    any_phrase, mentions_ward_number, normalise, CATEGORY_KEYWORDS, VISUALISATION_KEYWORDS,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    FilteredQuery,
    Demographics,
    Geography,
    Categories,
    Temporal,
    OverallStats,
    Critical,
    SearchComplaints,
}

impl ToolId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::FilteredQuery => "filtered_query",
            ToolId::Demographics => "demographics",
            ToolId::Geography => "geography",
            ToolId::Categories => "categories",
            ToolId::Temporal => "temporal",
            ToolId::OverallStats => "overall_stats",
            ToolId::Critical => "critical",
            ToolId::SearchComplaints => "search_complaints",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub tools: Vec<ToolId>,
    pub wants_chart: bool,
}

const SIMPLE_RULES: &[(ToolId, &[&str])] = &[
    (
        ToolId::Demographics,
        &[
            "gender", "genders", "male", "female", "women", "men", "caste", "castes", "income",
            "demographic", "demographics", "sc", "st", "obc", "poor", "rich",
        ],
    ),
    (
        ToolId::Geography,
        &[
            "ward", "wards", "area", "areas", "location", "locations", "geographic", "geography",
            "region", "regions", "where", "zone", "zones",
        ],
    ),
    (
        ToolId::Categories,
        &["category", "categories", "type", "types", "water", "road", "roads", "sanitation", "electricity"],
    ),
    (
        ToolId::Temporal,
        &["time", "temporal", "trend", "trends", "over time", "days", "waiting", "decay", "how long"],
    ),
    (
        ToolId::OverallStats,
        &[
            "stat", "stats", "statistics", "overall", "total", "summary", "overview", "how many",
            "silence rate", "count",
        ],
    ),
    (
        ToolId::Critical,
        &["critical", "worst", "most silenced", "highest score", "neglected", "extreme", "urgent"],
    ),
    (
        ToolId::SearchComplaints,
        &["search", "find", "look for", "similar", "like", "about"],
    ),
];

const BREAKDOWN_INTENT: &[&str] = &[
    "by caste", "by gender", "by income", "caste pattern", "gender pattern", "income pattern",
    "caste breakdown", "demographic", "demographics", "vs ward", "versus ward", "compare ward",
    "compare wards",
];

const COMPARISON: &[&str] = &["vs", "versus", "compare", "compared", "against"];

/// True when the message pins down a ward or category and asks for a grouping or
/// comparison on top of it.
pub fn is_compound(message: &str) -> bool {
    let text = normalise(message);
    let ward = mentions_ward_number(message);
    let category = CATEGORY_KEYWORDS.matches(&text);
    let breakdown = any_phrase(&text, BREAKDOWN_INTENT);
    let comparison = any_phrase(&text, COMPARISON);
    (ward && breakdown) || (category && breakdown) || (ward && category) || (ward && comparison)
}

pub fn wants_chart(message: &str) -> bool {
    any_phrase(&normalise(message), VISUALISATION_KEYWORDS)
}

pub fn route(message: &str) -> Route {
    let text = normalise(message);
    let wants_chart = wants_chart(message);
    let mut tools = Vec::new();

    if is_compound(message) {
        tools.push(ToolId::FilteredQuery);
    }
    for (tool, keywords) in SIMPLE_RULES {
        if any_phrase(&text, keywords) && !tools.contains(tool) {
            tools.push(*tool);
        }
    }
    if tools.is_empty() && !wants_chart {
        tools.push(ToolId::OverallStats);
    }
    Route { tools, wants_chart }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_query_comes_first() {
        let route = route("water complaints in Ward 5 vs Ward 45 by caste");
        assert_eq!(
            route.tools,
            vec![
                ToolId::FilteredQuery,
                ToolId::Demographics,
                ToolId::Geography,
                ToolId::Categories
            ]
        );
        assert!(!route.wants_chart);
    }

    #[test]
    fn compound_rules() {
        assert!(is_compound("ward 7 by gender"));
        assert!(is_compound("sanitation caste breakdown"));
        assert!(is_compound("roads in ward 3"));
        assert!(is_compound("ward 3 against ward 9"));
        assert!(!is_compound("which wards are worst"));
        assert!(!is_compound("water complaints"));
    }

    #[test]
    fn default_is_overall_stats_unless_charting() {
        assert_eq!(route("hello there").tools, vec![ToolId::OverallStats]);
        let chart = route("draw a pie");
        assert!(chart.wants_chart);
        assert!(chart.tools.is_empty());
    }

    #[test]
    fn word_boundaries_keep_short_keywords_honest() {
        let route = route("give me the statistics");
        assert_eq!(route.tools, vec![ToolId::OverallStats]);
    }

    #[test]
    fn several_simple_rules_fire_in_order() {
        let route = route("show me critical complaints over time as a chart");
        assert_eq!(route.tools, vec![ToolId::Temporal, ToolId::Critical]);
        assert!(route.wants_chart);
    }
}

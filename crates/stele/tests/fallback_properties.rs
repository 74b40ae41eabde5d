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

use proptest::prelude::*;
use std::collections::HashSet;
use stele::{fallback_chart_spec, fallback_query_spec, route, ResolverConfig};
use tally::Field;

fn arb_message() -> impl Strategy<Value = String> {
    let words = prop::sample::select(vec![
        "water", "roads", "ward 5", "ward 45", "by", "caste", "gender", "vs", "pie", "chart",
        "stacked", "bar", "income", "slum", "rejected", "over time", "count", "silenced",
        "breakdown", "pattern", "categories", "trend", "the", "complaints", "in", "%",
    ]);
    prop::collection::vec(words, 0..12).prop_map(|words| words.join(" "))
}

proptest! {
    #[test]
    fn prop_fallbacks_are_byte_identical(message in arb_message()) {
        let config = ResolverConfig::default();
        let query_a = serde_json::to_string(&fallback_query_spec(&message, &config)).unwrap();
        let query_b = serde_json::to_string(&fallback_query_spec(&message, &config)).unwrap();
        prop_assert_eq!(query_a, query_b);

        let chart_a = serde_json::to_string(&fallback_chart_spec(&message, &config)).unwrap();
        let chart_b = serde_json::to_string(&fallback_chart_spec(&message, &config)).unwrap();
        prop_assert_eq!(chart_a, chart_b);
    }

    #[test]
    fn prop_fallback_specs_are_well_formed(message in "\\PC{0,80}") {
        let config = ResolverConfig::default();
        let query = fallback_query_spec(&message, &config);
        prop_assert!(query.breakdown_field.parse::<Field>().is_ok());
        prop_assert!(query.cross_field.as_deref() != Some(query.breakdown_field.as_str()));

        let chart = fallback_chart_spec(&message, &config);
        prop_assert!((1..=2).contains(&chart.fields.len()));
        prop_assert!(chart.validate().is_ok());
        prop_assert!(!chart.title.is_empty());
    }

    #[test]
    fn prop_route_never_comes_back_empty_handed(message in arb_message()) {
        let route = route(&message);
        prop_assert!(route.wants_chart || !route.tools.is_empty());
        let distinct: HashSet<_> = route.tools.iter().collect();
        prop_assert_eq!(distinct.len(), route.tools.len());
    }
}

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

use super::extraction::extract_json_object;
use super::fallback::{fallback_chart_spec, fallback_query_spec};
use super::vocabulary::{canonical_value, normalise, CHART_KIND_KEYWORDS};
use estel::{ChartKind, ChartSpec};
use llm_contracts::{CompletionRequest, TextCompleter};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tally::{
    Caste, Category, Field, FilterValue, Filters, Gender, IncomeBracket, Metric, QuerySpec,
    ResponseStatus, WardType,
};
use tracing::{debug, info, warn};

const QUERY_SYSTEM_PROMPT: &str =
    "You parse natural language questions about civic complaint data into structured filters. \
     Respond ONLY with a JSON object, no markdown and no explanation.";

const CHART_SYSTEM_PROMPT: &str =
    "You are a data visualisation planner for a civic complaints dataset. \
     Respond ONLY with a JSON object, no markdown and no explanation.";

/// Outcome of the probabilistic attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    Resolved(T),
    Unresolved(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    Probabilistic,
    Deterministic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution<T> {
    pub spec: T,
    pub path: ResolutionPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl<T> Resolution<T> {
    fn probabilistic(spec: T) -> Self {
        Self {
            spec,
            path: ResolutionPath::Probabilistic,
            fallback_reason: None,
        }
    }

    fn deterministic(spec: T, reason: String) -> Self {
        Self {
            spec,
            path: ResolutionPath::Deterministic,
            fallback_reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub default_breakdown_field: Field,
    /// A field name or `temporal`.
    pub default_chart_field: String,
    pub timeout_seconds: u64,
    pub temperature: f32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_breakdown_field: Field::Caste,
            default_chart_field: Field::Gender.as_str().to_string(),
            timeout_seconds: 20,
            temperature: 0.1,
        }
    }
}

/// Turns free text into query and chart specs: the completer first, the keyword parsers
/// whenever it is missing, slow, failing, or returns something unusable.
pub struct SpecResolver {
    completer: Option<Arc<dyn TextCompleter>>,
    config: ResolverConfig,
}

impl SpecResolver {
    pub fn new(completer: Option<Arc<dyn TextCompleter>>, config: ResolverConfig) -> Self {
        Self { completer, config }
    }

    pub fn deterministic(config: ResolverConfig) -> Self {
        Self::new(None, config)
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn has_completer(&self) -> bool {
        self.completer.is_some()
    }

    pub async fn resolve_query(&self, message: &str) -> Resolution<QuerySpec> {
        match self
            .attempt(query_prompt(message), QUERY_SYSTEM_PROMPT, parse_query_response)
            .await
        {
            Attempt::Resolved(spec) => {
                info!(breakdown = %spec.breakdown_field, "Query spec resolved by completer");
                Resolution::probabilistic(spec)
            }
            Attempt::Unresolved(reason) => {
                self.log_fallback("query", &reason);
                Resolution::deterministic(fallback_query_spec(message, &self.config), reason)
            }
        }
    }

    pub async fn resolve_chart(&self, message: &str) -> Resolution<ChartSpec> {
        match self
            .attempt(chart_prompt(message), CHART_SYSTEM_PROMPT, parse_chart_response)
            .await
        {
            Attempt::Resolved(spec) => {
                info!(kind = %spec.chart_kind, fields = ?spec.fields, "Chart spec resolved by completer");
                Resolution::probabilistic(spec)
            }
            Attempt::Unresolved(reason) => {
                self.log_fallback("chart", &reason);
                Resolution::deterministic(fallback_chart_spec(message, &self.config), reason)
            }
        }
    }

    fn log_fallback(&self, kind: &str, reason: &str) {
        if self.completer.is_some() {
            warn!(kind, reason, "Falling back to keyword parsing");
        } else {
            debug!(kind, "No completer configured, using keyword parsing");
        }
    }

    async fn attempt<T>(
        &self,
        prompt: String,
        system_prompt: &str,
        parse: fn(&Value) -> Result<T, String>,
    ) -> Attempt<T> {
        let Some(completer) = &self.completer else {
            return Attempt::Unresolved("no completer configured".to_string());
        };
        let request = CompletionRequest::new(prompt)
            .with_system_prompt(system_prompt)
            .with_temperature(self.config.temperature);
        let limit = Duration::from_secs(self.config.timeout_seconds.max(1));

        let response = match tokio::time::timeout(limit, completer.complete(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Attempt::Unresolved(format!("completer failed: {e}")),
            Err(_) => return Attempt::Unresolved(format!("completer timed out after {limit:?}")),
        };
        let Some(object) = extract_json_object(&response.content) else {
            return Attempt::Unresolved("response contains no JSON object".to_string());
        };
        let value: Value = match serde_json::from_str(object) {
            Ok(value) => value,
            Err(e) => return Attempt::Unresolved(format!("response is not valid JSON: {e}")),
        };
        match parse(&value) {
            Ok(spec) => Attempt::Resolved(spec),
            Err(reason) => Attempt::Unresolved(reason),
        }
    }
}

fn labels<T: Copy>(known: &[T], label: fn(&T) -> &'static str) -> String {
    known.iter().map(label).collect::<Vec<_>>().join(", ")
}

fn field_catalogue() -> String {
    [
        format!("- category: {}", labels(Category::KNOWN, Category::as_str)),
        "- ward: Ward 1 through Ward 50".to_string(),
        format!("- ward_type: {}", labels(WardType::KNOWN, WardType::as_str)),
        format!("- gender: {}", labels(Gender::KNOWN, Gender::as_str)),
        format!("- caste: {}", labels(Caste::KNOWN, Caste::as_str)),
        format!("- income_bracket: {}", labels(IncomeBracket::KNOWN, IncomeBracket::as_str)),
        format!("- response_status: {}", labels(ResponseStatus::KNOWN, ResponseStatus::as_str)),
    ]
    .join("\n")
}

fn query_prompt(message: &str) -> String {
    format!(
        r#"AVAILABLE FIELDS:
{catalogue}

User query: "{message}"

Respond with:
{{
  "filters": {{"field": "value" or "field": ["value1", "value2"]}},
  "breakdown_field": "<field to group results by>",
  "cross_field": "<optional second grouping field or null>",
  "metric": "avg_silence or count or silenced_pct"
}}

Rules:
- "water complaints" means filters {{"category": "Water Supply"}}.
- "in Ward 5 vs Ward 45" means filters {{"ward": ["Ward 5", "Ward 45"]}}.
- "by caste" or "caste pattern" means breakdown_field "caste".
- When comparing wards, group by ward and put the demographic in cross_field.
- With a single grouping, cross_field is null.
- Default metric is "avg_silence".
- Use the exact values listed above."#,
        catalogue = field_catalogue(),
    )
}

fn chart_prompt(message: &str) -> String {
    let fields = Field::ALL.map(|f| f.as_str()).join(", ");
    let kinds = ChartKind::ALL.map(|k| k.as_str()).join(", ");
    format!(
        r#"AVAILABLE FIELDS: {fields}
AVAILABLE METRICS: avg_silence (average silence score), count (number of complaints), silenced_pct (% silenced)
AVAILABLE CHART TYPES: {kinds}

User request: "{message}"

Respond with:
{{
  "chart_type": "<type>",
  "fields": ["<field1>"] or ["<field1>", "<field2>"] for a cross-tabulation,
  "metric": "<metric>",
  "title": "<short descriptive title>"
}}

Rules:
- Two categorical fields compared ("gender vs caste") go together in fields.
- Default chart_type is "bar" and default metric is "avg_silence".
- pie, doughnut and polarArea prefer "count" unless another metric is asked for.
- Time or trend requests use the field "temporal"."#
    )
}

fn lowered(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn canonical_filter(field: &str, value: FilterValue) -> FilterValue {
    let Ok(field) = field.parse::<Field>() else {
        return value;
    };
    match value {
        FilterValue::One(label) => FilterValue::One(canonical_value(field, &label)),
        FilterValue::Many(labels) => FilterValue::Many(
            labels.iter().map(|label| canonical_value(field, label)).collect(),
        ),
    }
}

fn parse_filters(value: Option<&Value>) -> Result<Filters, String> {
    let entries: &Map<String, Value> = match value {
        None | Some(Value::Null) => return Ok(Filters::new()),
        Some(Value::Object(entries)) => entries,
        Some(other) => return Err(format!("filters must be an object, got {other}")),
    };
    Ok(entries
        .iter()
        .filter_map(|(field, raw)| {
            let field = lowered(field);
            FilterValue::from_json(raw).map(|value| {
                let value = canonical_filter(&field, value);
                (field, value)
            })
        })
        .collect())
}

fn parse_metric(value: Option<&Value>, default: Metric) -> Metric {
    match value.and_then(Value::as_str) {
        None => default,
        Some(raw) => Metric::from_str(raw).unwrap_or_else(|e| {
            warn!(error = %e, "Completer returned an unknown metric, using default");
            default
        }),
    }
}

pub(crate) fn parse_query_response(value: &Value) -> Result<QuerySpec, String> {
    let object = value
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;
    let breakdown_field = object
        .get("breakdown_field")
        .and_then(Value::as_str)
        .map(lowered)
        .filter(|field| !field.is_empty())
        .ok_or_else(|| "response has no breakdown_field".to_string())?;
    let filters = parse_filters(object.get("filters"))?;
    let cross_field = object
        .get("cross_field")
        .and_then(Value::as_str)
        .map(lowered)
        .filter(|field| !matches!(field.as_str(), "" | "none" | "null") && *field != breakdown_field);

    Ok(QuerySpec {
        filters,
        breakdown_field,
        cross_field,
        metric: parse_metric(object.get("metric"), Metric::AvgSilence),
    })
}

fn parse_chart_kind(raw: &str) -> Option<ChartKind> {
    ChartKind::from_str(raw)
        .ok()
        .or_else(|| CHART_KIND_KEYWORDS.longest_match(&normalise(raw)))
}

pub(crate) fn parse_chart_response(value: &Value) -> Result<ChartSpec, String> {
    let object = value
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;

    let mut fields: Vec<String> = match object.get("fields") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(lowered).collect(),
        Some(Value::String(single)) => vec![lowered(single)],
        _ => Vec::new(),
    };
    fields.retain(|field| !field.is_empty());
    if fields.is_empty() {
        return Err("response has no fields".to_string());
    }
    fields.truncate(2);

    let chart_kind = match object.get("chart_type").and_then(Value::as_str) {
        None => ChartKind::Bar,
        Some(raw) => parse_chart_kind(raw).ok_or_else(|| format!("unknown chart_type '{raw}'"))?,
    };
    let default_metric = if chart_kind.prefers_count() {
        Metric::Count
    } else {
        Metric::AvgSilence
    };
    let metric = parse_metric(object.get("metric"), default_metric);

    let spec = ChartSpec::new(chart_kind, fields, metric);
    Ok(match object.get("title").and_then(Value::as_str).map(str::trim) {
        Some(title) if !title.is_empty() => spec.with_title(title),
        _ => spec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_response_is_canonicalised() {
        let spec = parse_query_response(&json!({
            "filters": {"category": "water", "ward": ["5", "Ward 45"], "caste": "sc"},
            "breakdown_field": "Ward",
            "cross_field": "none",
            "metric": "COUNT"
        }))
        .unwrap();
        assert_eq!(spec.filters["category"], FilterValue::One("Water Supply".into()));
        assert_eq!(
            spec.filters["ward"],
            FilterValue::Many(vec!["Ward 5".into(), "Ward 45".into()])
        );
        assert_eq!(spec.filters["caste"], FilterValue::One("SC".into()));
        assert_eq!(spec.breakdown_field, "ward");
        assert_eq!(spec.cross_field, None);
        assert_eq!(spec.metric, Metric::Count);
    }

    #[test]
    fn query_response_requires_breakdown() {
        assert!(parse_query_response(&json!({"filters": {}})).is_err());
        assert!(parse_query_response(&json!({"breakdown_field": "caste", "filters": "x"})).is_err());
        assert!(parse_query_response(&json!(["caste"])).is_err());
    }

    #[test]
    fn cross_equal_to_breakdown_is_dropped() {
        let spec = parse_query_response(&json!({
            "filters": null,
            "breakdown_field": "caste",
            "cross_field": "caste",
            "metric": "median"
        }))
        .unwrap();
        assert!(spec.filters.is_empty());
        assert_eq!(spec.cross_field, None);
        assert_eq!(spec.metric, Metric::AvgSilence);
    }

    #[test]
    fn chart_response_defaults() {
        let spec = parse_chart_response(&json!({"chart_type": "donut", "fields": "category"})).unwrap();
        assert_eq!(spec.chart_kind, ChartKind::Doughnut);
        assert_eq!(spec.metric, Metric::Count);
        assert_eq!(spec.title, "Count by Category");

        let spec = parse_chart_response(&json!({
            "fields": ["gender", "caste", "ward"],
            "title": "Who waits longest"
        }))
        .unwrap();
        assert_eq!(spec.chart_kind, ChartKind::Bar);
        assert_eq!(spec.fields.len(), 2);
        assert_eq!(spec.title, "Who waits longest");
    }

    #[test]
    fn chart_response_rejects_unusable_output() {
        assert!(parse_chart_response(&json!({"chart_type": "bar", "fields": []})).is_err());
        assert!(parse_chart_response(&json!({"chart_type": "sankey", "fields": ["gender"]})).is_err());
    }

    #[test]
    fn prompts_list_every_label() {
        let prompt = query_prompt("anything");
        for status in ResponseStatus::KNOWN {
            assert!(prompt.contains(status.as_str()));
        }
        assert!(chart_prompt("anything").contains("polarArea"));
    }
}

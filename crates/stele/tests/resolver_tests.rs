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

use async_trait::async_trait;
use estel::ChartKind;
use llm_contracts::{CompletionRequest, CompletionResponse, LLMError, LLMResult, TextCompleter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stele::{fallback_chart_spec, fallback_query_spec, ResolutionPath, ResolverConfig, SpecResolver};
use tally::{FilterValue, Metric};

enum Behaviour {
    Reply(&'static str),
    Fail,
    Hang,
}

/// Completer with a fixed behaviour that counts its calls.
struct ScriptedCompleter {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl ScriptedCompleter {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextCompleter for ScriptedCompleter {
    async fn complete(&self, request: CompletionRequest) -> LLMResult<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Reply(content) => Ok(CompletionResponse::new(request.id, *content, "scripted")),
            Behaviour::Fail => Err(LLMError::Unavailable("connection refused".into())),
            Behaviour::Hang => std::future::pending().await,
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn resolver(completer: Arc<ScriptedCompleter>) -> SpecResolver {
    SpecResolver::new(Some(completer), ResolverConfig::default())
}

const COMPOUND: &str = "water complaints in Ward 5 vs Ward 45 by caste";

#[tokio::test]
async fn test_completer_query_spec_is_used() {
    let completer = ScriptedCompleter::new(Behaviour::Reply(
        r#"{"filters": {"category": "Water Supply", "ward": ["Ward 5", "Ward 45"]},
            "breakdown_field": "ward", "cross_field": "caste", "metric": "count"}"#,
    ));
    let resolution = resolver(completer.clone()).resolve_query(COMPOUND).await;

    assert_eq!(resolution.path, ResolutionPath::Probabilistic);
    assert!(resolution.fallback_reason.is_none());
    assert_eq!(resolution.spec.metric, Metric::Count);
    assert_eq!(resolution.spec.cross_field.as_deref(), Some("caste"));
    assert_eq!(
        resolution.spec.filters["ward"],
        FilterValue::Many(vec!["Ward 5".into(), "Ward 45".into()])
    );
    assert_eq!(completer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fenced_chart_response_is_extracted() {
    let completer = ScriptedCompleter::new(Behaviour::Reply(
        "Here is the plan:\n```json\n{\"chart_type\": \"radar\", \"fields\": [\"caste\"], \"metric\": \"silenced_pct\", \"title\": \"Silenced by caste\"}\n```",
    ));
    let resolution = resolver(completer).resolve_chart("radar of caste").await;

    assert_eq!(resolution.path, ResolutionPath::Probabilistic);
    assert_eq!(resolution.spec.chart_kind, ChartKind::Radar);
    assert_eq!(resolution.spec.fields, vec!["caste".to_string()]);
    assert_eq!(resolution.spec.metric, Metric::SilencedPct);
    assert_eq!(resolution.spec.title, "Silenced by caste");
}

#[tokio::test]
async fn test_prose_response_falls_back() {
    let completer = ScriptedCompleter::new(Behaviour::Reply("Sorry, I can't help with that."));
    let resolution = resolver(completer).resolve_query(COMPOUND).await;

    assert_eq!(resolution.path, ResolutionPath::Deterministic);
    assert_eq!(resolution.spec, fallback_query_spec(COMPOUND, &ResolverConfig::default()));
    assert!(resolution.fallback_reason.unwrap().contains("no JSON object"));
}

#[tokio::test]
async fn test_missing_required_keys_fall_back() {
    let completer = ScriptedCompleter::new(Behaviour::Reply(r#"{"filters": {"caste": "SC"}}"#));
    let resolution = resolver(completer).resolve_query(COMPOUND).await;
    assert_eq!(resolution.path, ResolutionPath::Deterministic);
    assert_eq!(resolution.spec.breakdown_field, "ward");

    let completer = ScriptedCompleter::new(Behaviour::Reply(r#"{"chart_type": "pie"}"#));
    let resolution = resolver(completer).resolve_chart("pie chart of categories").await;
    assert_eq!(resolution.path, ResolutionPath::Deterministic);
    assert_eq!(resolution.spec.title, "Count by Category");
}

#[tokio::test]
async fn test_invalid_json_falls_back() {
    let completer = ScriptedCompleter::new(Behaviour::Reply(r#"{"breakdown_field": caste}"#));
    let resolution = resolver(completer).resolve_query("by gender").await;
    assert_eq!(resolution.path, ResolutionPath::Deterministic);
    assert_eq!(resolution.spec.breakdown_field, "gender");
}

#[tokio::test]
async fn test_completer_error_falls_back_without_retry() {
    let completer = ScriptedCompleter::new(Behaviour::Fail);
    let resolution = resolver(completer.clone()).resolve_chart("pie chart of categories").await;

    assert_eq!(resolution.path, ResolutionPath::Deterministic);
    assert_eq!(
        resolution.spec,
        fallback_chart_spec("pie chart of categories", &ResolverConfig::default())
    );
    assert!(resolution.fallback_reason.unwrap().contains("completer failed"));
    assert_eq!(completer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_completer_times_out() {
    let completer = ScriptedCompleter::new(Behaviour::Hang);
    let config = ResolverConfig {
        timeout_seconds: 3,
        ..ResolverConfig::default()
    };
    let resolution = SpecResolver::new(Some(completer), config)
        .resolve_query(COMPOUND)
        .await;

    assert_eq!(resolution.path, ResolutionPath::Deterministic);
    assert!(resolution.fallback_reason.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_without_completer_only_keywords_are_used() {
    let resolver = SpecResolver::deterministic(ResolverConfig::default());
    assert!(!resolver.has_completer());

    let query = resolver.resolve_query(COMPOUND).await;
    assert_eq!(query.path, ResolutionPath::Deterministic);
    assert_eq!(
        serde_json::to_value(&query.spec).unwrap(),
        serde_json::json!({
            "filters": {"category": "Water Supply", "ward": ["Ward 5", "Ward 45"]},
            "breakdown_field": "ward",
            "cross_field": "caste",
            "metric": "avg_silence"
        })
    );

    let chart = resolver.resolve_chart("pie chart of categories").await;
    assert_eq!(chart.spec.chart_kind, ChartKind::Pie);
    assert_eq!(chart.spec.fields, vec!["category".to_string()]);
    assert_eq!(chart.spec.metric, Metric::Count);
    assert_eq!(chart.spec.title, "Count by Category");
}

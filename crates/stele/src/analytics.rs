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

//! The analytics context: one place that owns the record store, the spec resolver,
//! the optional embedder and the chart builder, and answers messages with them.

use crate::error::{AnalyticsError, Result};
use crate::nlu::{Resolution, ResolutionPath, SpecResolver};
use crate::router::{route, ToolId};
use estel::{ChartBuilder, ChartConfig, ChartSpec};
use llm_contracts::{Embedder, EmbeddingRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tally::{
    field_breakdown, silenced_records, temporal_buckets, BucketStats, FilteredBreakdown, Metric,
    QuerySpec, Record, RecordSnapshot, RecordStore, TemporalBucket, VectorFilter,
    SILENCED_THRESHOLD,
};
use tracing::{debug, info, warn};

pub const CRITICAL_THRESHOLD: f64 = 80.0;
pub const CRITICAL_LIMIT: usize = 10;
pub const TOP_WARDS: usize = 10;
pub const SEARCH_LIMIT: usize = 10;

fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallStats {
    pub total_complaints: usize,
    pub total_silenced: usize,
    pub silence_rate: f64,
    /// Mean score among silenced complaints.
    pub avg_silence_score: f64,
    /// Mean days in system among silenced complaints.
    pub avg_days_in_system: f64,
}

pub fn overall_stats(records: &[Record]) -> OverallStats {
    let silenced = silenced_records(records, SILENCED_THRESHOLD, 0);
    let total = records.len();
    let (score_sum, days_sum) = silenced.iter().fold((0.0, 0.0), |(score, days), record| {
        (score + record.silence_score, days + f64::from(record.days_in_system))
    });
    let mean = |sum: f64| {
        if silenced.is_empty() {
            0.0
        } else {
            sum / silenced.len() as f64
        }
    };
    OverallStats {
        total_complaints: total,
        total_silenced: silenced.len(),
        silence_rate: if total == 0 {
            0.0
        } else {
            round(silenced.len() as f64 / total as f64 * 100.0, 1)
        },
        avg_silence_score: round(mean(score_sum), 1),
        avg_days_in_system: round(mean(days_sum), 0),
    }
}

/// One demographic dimension of [`Demographics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemographicSlice {
    Gender,
    Caste,
    Income,
}

impl DemographicSlice {
    fn field(self) -> &'static str {
        match self {
            Self::Gender => "gender",
            Self::Caste => "caste",
            Self::Income => "income_bracket",
        }
    }
}

impl FromStr for DemographicSlice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gender" => Ok(Self::Gender),
            "caste" => Ok(Self::Caste),
            "income" | "income_bracket" => Ok(Self::Income),
            other => Err(format!("unknown demographic slice '{other}' (gender, caste, income)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Demographics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_gender: Option<Vec<BucketStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_caste: Option<Vec<BucketStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_income: Option<Vec<BucketStats>>,
}

pub fn demographics(records: &[Record]) -> Demographics {
    demographics_slice(records, None)
}

/// Breakdowns by gender, caste and income; `Some(slice)` keeps only that one.
pub fn demographics_slice(records: &[Record], only: Option<DemographicSlice>) -> Demographics {
    let slice = |which: DemographicSlice| {
        only.map_or(true, |o| o == which)
            .then(|| field_breakdown(records, which.field(), Metric::AvgSilence, 0))
    };
    Demographics {
        by_gender: slice(DemographicSlice::Gender),
        by_caste: slice(DemographicSlice::Caste),
        by_income: slice(DemographicSlice::Income),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geography {
    pub top_silenced: Vec<BucketStats>,
    pub all_wards: Vec<BucketStats>,
}

pub fn geography(records: &[Record]) -> Geography {
    let all_wards = field_breakdown(records, "ward", Metric::AvgSilence, 0);
    Geography {
        top_silenced: all_wards.iter().take(TOP_WARDS).cloned().collect(),
        all_wards,
    }
}

/// Categories ordered by share of silenced complaints.
pub fn categories(records: &[Record]) -> Vec<BucketStats> {
    field_breakdown(records, "category", Metric::SilencedPct, 0)
}

pub fn temporal(records: &[Record]) -> Vec<TemporalBucket> {
    temporal_buckets(records)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalComplaints {
    pub total: usize,
    pub threshold: f64,
    pub complaints: Vec<Record>,
}

pub fn critical(records: &[Record]) -> CriticalComplaints {
    let complaints: Vec<Record> = silenced_records(records, CRITICAL_THRESHOLD, CRITICAL_LIMIT)
        .into_iter()
        .cloned()
        .collect();
    CriticalComplaints {
        total: complaints.len(),
        threshold: CRITICAL_THRESHOLD,
        complaints,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub record: Record,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredAnswer {
    #[serde(flatten)]
    pub result: FilteredBreakdown,
    pub parsed_spec: QuerySpec,
    pub resolution: ResolutionPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartAnswer {
    pub chart: ChartConfig,
    pub chart_spec: ChartSpec,
    pub resolution: ResolutionPath,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub tool: ToolId,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub message: String,
    pub tools_used: Vec<ToolId>,
    pub results: Vec<ToolResult>,
    pub chart: Option<ChartConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_spec: Option<ChartSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_path: Option<ResolutionPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_error: Option<String>,
}

impl Answer {
    pub fn result(&self, tool: ToolId) -> Option<&Value> {
        self.results.iter().find(|r| r.tool == tool).map(|r| &r.result)
    }
}

fn tool_value<T: Serialize>(outcome: Result<T>) -> Value {
    match outcome.and_then(|value| serde_json::to_value(value).map_err(AnalyticsError::from)) {
        Ok(value) => value,
        Err(e) => json!({ "error": e.to_string() }),
    }
}

fn on_records<T: Serialize>(
    records: std::result::Result<&[Record], &str>,
    tool: fn(&[Record]) -> T,
) -> Value {
    match records {
        Ok(records) => tool_value(Ok(tool(records))),
        Err(e) => json!({ "error": e }),
    }
}

pub struct AnalyticsContext {
    store: Arc<RecordStore>,
    resolver: SpecResolver,
    embedder: Option<Arc<dyn Embedder>>,
    charts: ChartBuilder,
}

impl AnalyticsContext {
    pub fn new(store: Arc<RecordStore>, resolver: SpecResolver) -> Self {
        Self {
            store,
            resolver,
            embedder: None,
            charts: ChartBuilder::default(),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_chart_builder(mut self, charts: ChartBuilder) -> Self {
        self.charts = charts;
        self
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn resolver(&self) -> &SpecResolver {
        &self.resolver
    }

    pub async fn snapshot(&self) -> Result<Arc<RecordSnapshot>> {
        Ok(self.store.snapshot(false).await?)
    }

    /// Routes the message, runs every selected tool against one snapshot and, when a
    /// visualisation was asked for, resolves and builds the chart. Tool failures are
    /// reported per tool; this never fails as a whole.
    pub async fn ask(&self, message: &str) -> Answer {
        let route = route(message);
        info!(tools = ?route.tools, wants_chart = route.wants_chart, "Routing message");

        let needs_records =
            route.wants_chart || route.tools.iter().any(|t| *t != ToolId::SearchComplaints);
        let snapshot = if needs_records {
            Some(self.snapshot().await.map_err(|e| {
                warn!(error = %e, "Snapshot unavailable");
                e.to_string()
            }))
        } else {
            None
        };
        let records: std::result::Result<&[Record], &str> = match &snapshot {
            Some(Ok(snapshot)) => Ok(snapshot.records()),
            Some(Err(e)) => Err(e.as_str()),
            None => Ok(&[]),
        };

        let mut results = Vec::with_capacity(route.tools.len());
        for tool in &route.tools {
            let result = self.run_tool(*tool, message, records).await;
            results.push(ToolResult { tool: *tool, result });
        }

        let mut answer = Answer {
            message: message.to_string(),
            tools_used: route.tools,
            results,
            chart: None,
            chart_spec: None,
            chart_path: None,
            chart_error: None,
        };
        if route.wants_chart {
            let resolution = self.resolver.resolve_chart(message).await;
            answer.chart_path = Some(resolution.path);
            let built = match records {
                Ok(records) => self.charts.build(&resolution.spec, records).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match built {
                Ok(chart) => answer.chart = Some(chart),
                Err(e) => {
                    warn!(error = %e, "Chart build failed");
                    answer.chart_error = Some(e);
                }
            }
            answer.chart_spec = Some(resolution.spec);
        }
        answer
    }

    async fn run_tool(
        &self,
        tool: ToolId,
        message: &str,
        records: std::result::Result<&[Record], &str>,
    ) -> Value {
        debug!(%tool, "Running tool");
        match tool {
            ToolId::SearchComplaints => {
                tool_value(self.search(message, SEARCH_LIMIT, None).await.map(|results| {
                    json!({ "query": message, "total": results.len(), "results": results })
                }))
            }
            ToolId::FilteredQuery => match records {
                Ok(records) => tool_value(Ok(self.filtered_on(message, records).await)),
                Err(e) => json!({ "error": e }),
            },
            ToolId::Demographics => on_records(records, demographics),
            ToolId::Geography => on_records(records, geography),
            ToolId::Categories => on_records(records, categories),
            ToolId::Temporal => on_records(records, temporal),
            ToolId::OverallStats => on_records(records, overall_stats),
            ToolId::Critical => on_records(records, critical),
        }
    }

    async fn filtered_on(&self, message: &str, records: &[Record]) -> FilteredAnswer {
        let Resolution {
            spec,
            path,
            fallback_reason,
        } = self.resolver.resolve_query(message).await;
        let unsupported = spec.unsupported_fields();
        if !unsupported.is_empty() {
            warn!(fields = ?unsupported, "Query spec names unsupported fields");
        }
        FilteredAnswer {
            result: spec.run(records),
            parsed_spec: spec,
            resolution: path,
            fallback_reason,
        }
    }

    /// Resolves a query spec from the message and runs it on the current snapshot.
    pub async fn filtered(&self, message: &str) -> Result<FilteredAnswer> {
        let snapshot = self.snapshot().await?;
        Ok(self.filtered_on(message, snapshot.records()).await)
    }

    pub async fn chart(&self, message: &str) -> Result<ChartAnswer> {
        let snapshot = self.snapshot().await?;
        let resolution = self.resolver.resolve_chart(message).await;
        let chart = self.charts.build(&resolution.spec, snapshot.records())?;
        Ok(ChartAnswer {
            chart,
            chart_spec: resolution.spec,
            resolution: resolution.path,
        })
    }

    /// Semantic search: embeds the query and asks the source for its nearest records.
    /// With a threshold, only records scoring strictly above it are considered.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        silence_threshold: Option<f64>,
    ) -> Result<Vec<SearchHit>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| AnalyticsError::unavailable("no embedder configured"))?;
        if query.trim().is_empty() {
            return Err(AnalyticsError::unavailable("no search query provided"));
        }
        let embedding = embedder.embed(EmbeddingRequest::new(query)).await?;
        let filter = silence_threshold.map(|t| VectorFilter::new().above("silence_score", t));
        let hits = self
            .store
            .source()
            .vector_query(&embedding.vector, filter.as_ref(), limit)
            .await?;
        Ok(hits
            .into_iter()
            .map(|hit| SearchHit {
                similarity: round(f64::from(hit.score), 3),
                record: hit.record,
            })
            .collect())
    }
}

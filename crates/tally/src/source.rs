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

use crate::error::{Result, SourceError};
use crate::record::Record;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, info};

/// Opaque continuation handed back by a source. Sources choose the shape
/// (an offset, a point id, a cursor string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(pub Value);

impl PageToken {
    pub fn offset(offset: usize) -> Self {
        Self(Value::from(offset))
    }

    pub fn as_offset(&self) -> Option<usize> {
        self.0.as_u64().and_then(|v| usize::try_from(v).ok())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub records: Vec<Record>,
    /// `None` once the scan is exhausted.
    pub next: Option<PageToken>,
}

/// One condition of a vector-query filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterCondition {
    Equals {
        field: String,
        value: String,
    },
    Range {
        field: String,
        /// Exclusive lower bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gt: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gte: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lte: Option<f64>,
    },
}

impl FilterCondition {
    pub fn field(&self) -> &str {
        match self {
            FilterCondition::Equals { field, .. } | FilterCondition::Range { field, .. } => field,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            FilterCondition::Equals { field, value } => {
                record.value_of(field).is_some_and(|actual| actual == value)
            }
            FilterCondition::Range { field, gt, gte, lte } => {
                numeric_value(record, field).is_some_and(|v| {
                    gt.map_or(true, |lo| v > lo)
                        && gte.map_or(true, |lo| v >= lo)
                        && lte.map_or(true, |hi| v <= hi)
                })
            }
        }
    }
}

fn numeric_value(record: &Record, field: &str) -> Option<f64> {
    match field {
        "silence_score" => Some(record.silence_score),
        "days_in_system" => Some(f64::from(record.days_in_system)),
        _ => None,
    }
}

/// Conjunction of conditions applied before nearest-neighbour ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorFilter {
    pub must: Vec<FilterCondition>,
}

impl VectorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.must.push(FilterCondition::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn range(mut self, field: impl Into<String>, gte: Option<f64>, lte: Option<f64>) -> Self {
        self.must.push(FilterCondition::Range {
            field: field.into(),
            gt: None,
            gte,
            lte,
        });
        self
    }

    /// Strictly greater than `threshold`.
    pub fn above(mut self, field: impl Into<String>, threshold: f64) -> Self {
        self.must.push(FilterCondition::Range {
            field: field.into(),
            gt: Some(threshold),
            gte: None,
            lte: None,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.must.iter().all(|c| c.matches(record))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub record: Record,
    pub score: f32,
}

/// External store of complaint records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    fn name(&self) -> &str;

    /// One page of a full scan. Pass `None` to start and the returned token to continue.
    async fn scan(&self, token: Option<PageToken>) -> Result<ScanPage>;

    /// Records nearest to `embedding`, best first, optionally pre-filtered.
    async fn vector_query(
        &self,
        embedding: &[f32],
        filter: Option<&VectorFilter>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    let norm_a = a.iter().map(|x| x.powi(2)).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x.powi(2)).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Debug, Clone)]
struct StoredPoint {
    record: Record,
    embedding: Option<Vec<f32>>,
}

/// File line shape: a record payload with an optional `embedding` alongside.
#[derive(Deserialize)]
struct PointFile {
    #[serde(flatten)]
    record: Record,
    #[serde(default, alias = "vector")]
    embedding: Option<Vec<f32>>,
}

impl From<PointFile> for StoredPoint {
    fn from(point: PointFile) -> Self {
        Self {
            record: point.record,
            embedding: point.embedding,
        }
    }
}

/// In-process record source, paged by offset. Used for file-backed datasets and tests.
pub struct MemorySource {
    name: String,
    page_size: usize,
    points: RwLock<Vec<StoredPoint>>,
}

impl MemorySource {
    pub const DEFAULT_PAGE_SIZE: usize = 1000;

    pub fn new(records: Vec<Record>) -> Self {
        Self {
            name: "memory".to_string(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            points: RwLock::new(
                records
                    .into_iter()
                    .map(|record| StoredPoint {
                        record,
                        embedding: None,
                    })
                    .collect(),
            ),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Page size of at least one record.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Loads a JSON array of records, or JSON Lines when the extension is `.jsonl`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let is_lines = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"));
        let points = if is_lines {
            Self::parse_lines(&raw)?
        } else {
            let parsed: Vec<PointFile> = serde_json::from_str(&raw)?;
            parsed.into_iter().map(StoredPoint::from).collect()
        };
        info!(path = %path.display(), records = points.len(), "Loaded records from file");
        Ok(Self {
            name: path.display().to_string(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            points: RwLock::new(points),
        })
    }

    fn parse_lines(raw: &str) -> Result<Vec<StoredPoint>> {
        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str::<PointFile>(line)
                    .map(StoredPoint::from)
                    .map_err(|e| SourceError::Malformed(format!("line {}: {e}", idx + 1)))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }

    pub fn push(&self, record: Record, embedding: Option<Vec<f32>>) {
        self.points.write().push(StoredPoint { record, embedding });
    }

    /// Replaces the whole dataset. Stores built on this source must be invalidated.
    pub fn replace_records(&self, records: Vec<Record>) {
        let mut points = self.points.write();
        *points = records
            .into_iter()
            .map(|record| StoredPoint {
                record,
                embedding: None,
            })
            .collect();
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, token: Option<PageToken>) -> Result<ScanPage> {
        let offset = match token {
            None => 0,
            Some(token) => token
                .as_offset()
                .ok_or_else(|| SourceError::Malformed(format!("invalid page token {}", token.0)))?,
        };
        let points = self.points.read();
        let end = offset.saturating_add(self.page_size).min(points.len());
        let records = points
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|p| p.record.clone())
            .collect();
        let next = (end < points.len()).then(|| PageToken::offset(end));
        debug!(source = %self.name, offset, end, "Scanned page");
        Ok(ScanPage { records, next })
    }

    async fn vector_query(
        &self,
        embedding: &[f32],
        filter: Option<&VectorFilter>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let points = self.points.read();
        let mut scored: Vec<ScoredRecord> = points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.record)))
            .filter_map(|p| {
                p.embedding.as_ref().map(|vector| ScoredRecord {
                    record: p.record.clone(),
                    score: cosine_similarity(embedding, vector),
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

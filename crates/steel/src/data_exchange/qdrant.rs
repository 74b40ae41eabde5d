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

//! Qdrant REST adapter for the complaint collection.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tally::{
    FilterCondition, PageToken, Record, RecordSource, ScanPage, ScoredRecord, SourceError,
    VectorFilter,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
    /// Points per scroll request.
    pub page_size: usize,
    pub timeout_seconds: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "silence_complaints".to_string(),
            api_key: None,
            page_size: 1000,
            timeout_seconds: 30,
        }
    }
}

pub struct QdrantSource {
    client: Client,
    config: QdrantConfig,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    #[serde(default)]
    points: Vec<Point>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct Point {
    id: Value,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

impl Point {
    /// Decodes the payload leniently, falling back to the point id when the payload has none.
    fn into_record(self) -> Result<Record, SourceError> {
        let mut payload = self.payload.unwrap_or_default();
        if !payload.contains_key("id") && self.id.is_u64() {
            payload.insert("id".to_string(), self.id);
        }
        serde_json::from_value(Value::Object(payload))
            .map_err(|e| SourceError::Malformed(format!("point payload: {e}")))
    }
}

impl QdrantSource {
    pub fn new(config: QdrantConfig) -> Result<Self, SourceError> {
        let timeout = Duration::from_secs(config.timeout_seconds.max(1));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: QdrantConfig {
                url: config.url.trim_end_matches('/').to_string(),
                page_size: config.page_size.max(1),
                ..config
            },
            timeout,
        })
    }

    pub fn config(&self) -> &QdrantConfig {
        &self.config
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/collections/{}/points/{action}",
            self.config.url, self.config.collection
        )
    }

    async fn post<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T, SourceError> {
        let mut request = self.client.post(url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.header("api-key", key);
        }
        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, url, "Qdrant request failed");
            return Err(SourceError::Unavailable(format!("Qdrant returned {status}: {body}")));
        }
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("Qdrant response: {e}")))?;
        Ok(envelope.result)
    }

    fn map_transport(&self, error: reqwest::Error) -> SourceError {
        if error.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else {
            SourceError::Unavailable(format!("Qdrant request failed: {error}"))
        }
    }
}

/// Qdrant `must` clauses for a [`VectorFilter`].
pub fn filter_to_qdrant(filter: &VectorFilter) -> Value {
    let must: Vec<Value> = filter
        .must
        .iter()
        .map(|condition| match condition {
            FilterCondition::Equals { field, value } => json!({
                "key": field,
                "match": { "value": value }
            }),
            FilterCondition::Range { field, gt, gte, lte } => {
                let mut range = Map::new();
                if let Some(gt) = gt {
                    range.insert("gt".into(), json!(gt));
                }
                if let Some(gte) = gte {
                    range.insert("gte".into(), json!(gte));
                }
                if let Some(lte) = lte {
                    range.insert("lte".into(), json!(lte));
                }
                json!({ "key": field, "range": range })
            }
        })
        .collect();
    json!({ "must": must })
}

#[async_trait]
impl RecordSource for QdrantSource {
    fn name(&self) -> &str {
        &self.config.collection
    }

    async fn scan(&self, token: Option<PageToken>) -> Result<ScanPage, SourceError> {
        let mut body = json!({
            "limit": self.config.page_size,
            "with_payload": true,
            "with_vector": false
        });
        if let Some(PageToken(offset)) = token {
            body["offset"] = offset;
        }

        let result: ScrollResult = self.post(&self.endpoint("scroll"), &body).await?;
        let records = result
            .points
            .into_iter()
            .map(Point::into_record)
            .collect::<Result<Vec<_>, _>>()?;
        let next = result
            .next_page_offset
            .filter(|offset| !offset.is_null())
            .map(PageToken);
        debug!(
            collection = %self.config.collection,
            records = records.len(),
            more = next.is_some(),
            "Scrolled Qdrant page"
        );
        Ok(ScanPage { records, next })
    }

    async fn vector_query(
        &self,
        embedding: &[f32],
        filter: Option<&VectorFilter>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, SourceError> {
        let mut body = json!({
            "query": embedding,
            "limit": limit,
            "with_payload": true
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = filter_to_qdrant(filter);
        }

        let result: QueryResult = self.post(&self.endpoint("query"), &body).await?;
        result
            .points
            .into_iter()
            .map(|point| {
                let score = point.score.unwrap_or(0.0);
                point.into_record().map(|record| ScoredRecord { record, score })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_translation() {
        let filter = VectorFilter::new()
            .equals("category", "Roads")
            .range("silence_score", Some(70.0), None)
            .above("days_in_system", 30.0);
        assert_eq!(
            filter_to_qdrant(&filter),
            json!({"must": [
                {"key": "category", "match": {"value": "Roads"}},
                {"key": "silence_score", "range": {"gte": 70.0}},
                {"key": "days_in_system", "range": {"gt": 30.0}}
            ]})
        );
    }

    #[test]
    fn point_id_fills_missing_record_id() {
        let point = Point {
            id: json!(42),
            score: None,
            payload: serde_json::from_value(json!({"ward": "Ward 3", "category": "Health"}))
                .unwrap(),
        };
        let record = point.into_record().unwrap();
        assert_eq!(record.id, 42);
        assert_eq!(record.ward, "Ward 3");
    }
}

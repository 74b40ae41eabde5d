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

use serde_json::json;
use std::sync::Arc;
use steel::{QdrantConfig, QdrantSource};
use tally::{RecordSource, RecordStore, SourceError, StoreConfig, VectorFilter};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SCROLL: &str = "/collections/silence_complaints/points/scroll";
const QUERY: &str = "/collections/silence_complaints/points/query";

fn source_for(server: &MockServer) -> QdrantSource {
    QdrantSource::new(QdrantConfig {
        url: server.uri(),
        page_size: 2,
        ..QdrantConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_scan_follows_next_page_offset() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SCROLL))
        .and(body_partial_json(json!({"offset": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "result": {
                "points": [{"id": 3, "payload": {"category": "Roads", "ward": "Ward 41"}}],
                "next_page_offset": null
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SCROLL))
        .and(body_partial_json(json!({"limit": 2, "with_payload": true, "with_vector": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "result": {
                "points": [
                    {"id": 1, "payload": {"category": "Water Supply", "ward": "Ward 5", "silence_score": 80.0}},
                    {"id": 2, "payload": {"category": "Health", "ward": "Ward 12", "response_status": "RESOLVED", "days_in_system": 30}}
                ],
                "next_page_offset": 3
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = RecordStore::new(Arc::new(source_for(&server)), StoreConfig::default());
    let snapshot = store.snapshot(false).await.unwrap();
    let ids: Vec<u64> = snapshot.records().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(snapshot.records()[1].silence_score, 29.0);
    assert_eq!(snapshot.records()[2].ward_type.as_str(), "Slum");
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SCROLL))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = source_for(&server).scan(None).await.unwrap_err();
    assert!(matches!(err, SourceError::Unavailable(_)));
}

#[tokio::test]
async fn test_garbled_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SCROLL))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = source_for(&server).scan(None).await.unwrap_err();
    assert!(matches!(err, SourceError::Malformed(_)));
}

#[tokio::test]
async fn test_vector_query_sends_filter_and_returns_scores() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY))
        .and(body_partial_json(json!({
            "limit": 5,
            "filter": {"must": [{"key": "silence_score", "range": {"gte": 70.0}}]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"points": [
                {"id": 9, "score": 0.91, "payload": {"text": "Streetlight broken", "category": "Electricity", "ward": "Ward 44"}}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filter = VectorFilter::new().range("silence_score", Some(70.0), None);
    let hits = source_for(&server)
        .vector_query(&[0.1, 0.2], Some(&filter), 5)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, 9);
    assert_eq!(hits[0].record.text, "Streetlight broken");
    assert!((hits[0].score - 0.91).abs() < 1e-6);
}

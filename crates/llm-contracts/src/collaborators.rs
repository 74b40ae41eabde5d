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

//! Opaque request/response collaborators consumed by the analytics engine.
//!
//! Implementations live in `steel`; tests substitute scripted doubles.

use crate::requests::{CompletionRequest, EmbeddingRequest};
use crate::responses::{CompletionResponse, EmbeddingResponse};
use crate::types::LLMResult;
use async_trait::async_trait;

/// Free-text completion service. Output is expected to be JSON-shaped but callers
/// must tolerate fences, prose and outright garbage.
#[async_trait]
pub trait TextCompleter: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> LLMResult<CompletionResponse>;

    fn model_name(&self) -> &str;
}

/// Fixed-length text embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, request: EmbeddingRequest) -> LLMResult<EmbeddingResponse>;

    fn model_name(&self) -> &str;
}

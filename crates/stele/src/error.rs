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

use estel::ChartError;
use llm_contracts::LLMError;
use tally::SourceError;
use thiserror::Error;
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Record source failed: {0}")]
    Source(#[from] SourceError),
    #[error("Collaborator failed: {0}")]
    Collaborator(#[from] LLMError),
    #[error("Chart could not be built: {0}")]
    Chart(#[from] ChartError),
    #[error("JSON serialisation failed: {0}")]
    Serialisation(#[from] serde_json::Error),
    #[error("Not available: {0}")]
    Unavailable(String),
}
pub type Result<T> = std::result::Result<T, AnalyticsError>;
impl AnalyticsError {
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::Unavailable(msg.into())
    }
}

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

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SourceError>;

/// Failures reaching or reading the record source. Never recovered inside the
/// store: the caller decides whether a stale snapshot is acceptable.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Record source unavailable: {0}")]
    Unavailable(String),

    #[error("Record source timed out after {0:?}")]
    Timeout(Duration),

    #[error("Record source returned malformed data: {0}")]
    Malformed(String),

    #[error("Pagination did not terminate after {pages} pages")]
    PaginationLimit { pages: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

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

//! Complaint records, the snapshot store that caches them, and the pure
//! aggregation core (filter, breakdown, cross-tabulation, temporal buckets).

pub mod aggregate;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod record;
pub mod source;
pub mod spec;
pub mod store;

pub use aggregate::{
    cross_tabulate, field_breakdown, filtered_breakdown, silenced_records, temporal_buckets,
    BreakdownBody, CrossCell, CrossRow, CrossTab, FilteredBreakdown, TemporalBucket,
    TEMPORAL_RANGES,
};
pub use error::{Result, SourceError};
pub use filter::{filter, FilterValue, Filters};
pub use metrics::{BucketStats, Metric, SILENCED_THRESHOLD};
pub use record::{
    silence_score, Caste, Category, Field, Gender, IncomeBracket, Record, ResponseStatus,
    WardType, UNKNOWN_LABEL,
};
pub use source::{
    FilterCondition, MemorySource, PageToken, RecordSource, ScanPage, ScoredRecord, VectorFilter,
};
pub use spec::QuerySpec;
pub use store::{RecordSnapshot, RecordStore, StoreConfig};

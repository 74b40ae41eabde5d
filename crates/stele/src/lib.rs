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

//! Natural-language front end of the silence index: spec resolution, tool routing and
//! the analytics context that answers messages.

pub mod analytics;
pub mod error;
pub mod nlu;
pub mod router;
pub use analytics::{
    categories, critical, demographics, demographics_slice, geography, overall_stats, temporal,
    AnalyticsContext, Answer, ChartAnswer, CriticalComplaints, DemographicSlice, Demographics,
    FilteredAnswer, Geography, OverallStats, SearchHit, ToolResult,
};
pub use error::{AnalyticsError, Result};
pub use nlu::{
    extract_json_object, fallback_chart_spec, fallback_query_spec, Attempt, Resolution,
    ResolutionPath, ResolverConfig, SpecResolver,
};
pub use router::{route, Route, ToolId};

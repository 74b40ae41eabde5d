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

use crate::error::{ChartError, ChartResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tally::record::title_case;
use tally::{Field, Metric};
/// Reserved pseudo-field selecting the fixed day-count buckets.
pub const TEMPORAL_FIELD: &str = "temporal";
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChartKind {
    #[default]
    #[serde(rename = "bar")]
    Bar,
    #[serde(rename = "horizontalBar")]
    HorizontalBar,
    #[serde(rename = "pie")]
    Pie,
    #[serde(rename = "doughnut")]
    Doughnut,
    #[serde(rename = "line")]
    Line,
    #[serde(rename = "radar")]
    Radar,
    #[serde(rename = "polarArea")]
    PolarArea,
    #[serde(rename = "stacked")]
    Stacked,
    #[serde(rename = "grouped")]
    Grouped,
    #[serde(rename = "heatmap")]
    Heatmap,
}
impl ChartKind {
    pub const ALL: [ChartKind; 10] = [
        ChartKind::Bar,
        ChartKind::HorizontalBar,
        ChartKind::Pie,
        ChartKind::Doughnut,
        ChartKind::Line,
        ChartKind::Radar,
        ChartKind::PolarArea,
        ChartKind::Stacked,
        ChartKind::Grouped,
        ChartKind::Heatmap,
    ];
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::HorizontalBar => "horizontalBar",
            ChartKind::Pie => "pie",
            ChartKind::Doughnut => "doughnut",
            ChartKind::Line => "line",
            ChartKind::Radar => "radar",
            ChartKind::PolarArea => "polarArea",
            ChartKind::Stacked => "stacked",
            ChartKind::Grouped => "grouped",
            ChartKind::Heatmap => "heatmap",
        }
    }
    /// Kinds rendered as bars, where stacking and axis orientation apply.
    pub fn is_bar_family(&self) -> bool {
        matches!(
            self,
            ChartKind::Bar | ChartKind::HorizontalBar | ChartKind::Stacked | ChartKind::Grouped
        )
    }
    /// Part-of-whole kinds, where a count reads better than an average.
    pub fn prefers_count(&self) -> bool {
        matches!(self, ChartKind::Pie | ChartKind::Doughnut | ChartKind::PolarArea)
    }
}
impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for ChartKind {
    type Err = ChartError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ChartKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ChartError::UnknownKind {
                name: wanted.to_string(),
            })
    }
}
/// What to draw: kind, one or two grouping fields (or `temporal`), metric and title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_kind: ChartKind,
    pub fields: Vec<String>,
    pub metric: Metric,
    pub title: String,
}
impl ChartSpec {
    /// Spec with a synthesised title.
    pub fn new(chart_kind: ChartKind, fields: Vec<String>, metric: Metric) -> Self {
        let title = synthesise_title(&fields, metric);
        Self {
            chart_kind,
            fields,
            metric,
            title,
        }
    }
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
    pub fn is_temporal(&self) -> bool {
        self.fields.iter().any(|f| f == TEMPORAL_FIELD)
    }
    pub fn is_cross(&self) -> bool {
        self.fields.len() == 2 && !self.is_temporal()
    }
    /// Structural checks only. Field names outside the field set are allowed and
    /// produce an empty chart; `temporal` takes precedence over any other field.
    pub fn validate(&self) -> ChartResult<()> {
        match self.fields.len() {
            0 => Err(ChartError::NoFields),
            1 | 2 => Ok(()),
            count => Err(ChartError::TooManyFields { count }),
        }
    }
}
/// `"Count by Category"` for one field, `"Gender vs Caste - Avg Silence"` for two.
pub fn synthesise_title(fields: &[String], metric: Metric) -> String {
    let labels: Vec<String> = fields.iter().map(|f| field_label(f)).collect();
    match labels.as_slice() {
        [] => metric.label(),
        [a, b, ..] => format!("{a} vs {b} - {}", metric.label()),
        [a] => format!("{} by {a}", metric.label()),
    }
}
fn field_label(name: &str) -> String {
    name.parse::<Field>()
        .map(|field| field.label())
        .unwrap_or_else(|_| title_case(name))
}

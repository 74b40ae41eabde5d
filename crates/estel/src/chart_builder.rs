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

use crate::chart_spec::{ChartKind, ChartSpec};
use crate::error::ChartResult;
use crate::palette::{Palette, TEMPORAL_FILL};
use serde::{Deserialize, Serialize};
use tally::{cross_tabulate, field_breakdown, temporal_buckets, Field, Record};
use tracing::debug;
const LINE_TENSION: f64 = 0.3;
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Colour {
    Single(String),
    PerPoint(Vec<String>),
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    /// One value per chart label, 0 where the aggregate has no data.
    pub data: Vec<f64>,
    pub background_color: Colour,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tension: Option<f64>,
}
impl Dataset {
    fn new(label: impl Into<String>, data: Vec<f64>, background_color: Colour) -> Self {
        Self {
            label: label.into(),
            data,
            background_color,
            border_color: None,
            fill: None,
            tension: None,
        }
    }
    fn as_line(mut self, colour: &str, fill: bool) -> Self {
        self.border_color = Some(colour.to_string());
        self.fill = Some(fill);
        self.tension = Some(LINE_TENSION);
        self
    }
}
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarLayout {
    Grouped,
    Stacked,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisScale {
    pub stacked: bool,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scales {
    pub x: AxisScale,
    pub y: AxisScale,
}
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<BarLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scales: Option<Scales>,
    /// `"y"` swaps the index axis for horizontal bars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_axis: Option<String>,
    #[serde(default)]
    pub multi_dataset: bool,
}
impl ChartOptions {
    fn bar(kind: ChartKind) -> Self {
        let layout = if kind == ChartKind::Stacked {
            BarLayout::Stacked
        } else {
            BarLayout::Grouped
        };
        let stacked = layout == BarLayout::Stacked;
        Self {
            layout: Some(layout),
            scales: Some(Scales {
                x: AxisScale { stacked },
                y: AxisScale { stacked },
            }),
            index_axis: (kind == ChartKind::HorizontalBar).then(|| "y".to_string()),
            multi_dataset: false,
        }
    }
}
/// Renderer-agnostic chart description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Kind the renderer should draw; bar variants collapse to `bar` plus options.
    #[serde(rename = "type")]
    pub render_kind: ChartKind,
    pub title: String,
    pub data: ChartData,
    pub options: ChartOptions,
}
#[derive(Debug, Clone)]
pub struct ChartBuilder {
    palette: Palette,
    ward_top_n: usize,
}
impl Default for ChartBuilder {
    fn default() -> Self {
        Self {
            palette: Palette::default(),
            ward_top_n: 15,
        }
    }
}
impl ChartBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }
    /// Cap on bars for single-field ward charts; 0 disables it.
    pub fn with_ward_top_n(mut self, top_n: usize) -> Self {
        self.ward_top_n = top_n;
        self
    }
    pub fn palette(&self) -> &Palette {
        &self.palette
    }
    pub fn build(&self, spec: &ChartSpec, records: &[Record]) -> ChartResult<ChartConfig> {
        spec.validate()?;
        let chart = if spec.is_temporal() {
            self.temporal(spec, records)
        } else if spec.fields.len() == 2 {
            self.cross(spec, records)
        } else {
            self.single(spec, records)
        };
        debug!(
            kind = %spec.chart_kind,
            render = %chart.render_kind,
            labels = chart.data.labels.len(),
            datasets = chart.data.datasets.len(),
            "Built chart"
        );
        Ok(chart)
    }
    fn temporal(&self, spec: &ChartSpec, records: &[Record]) -> ChartConfig {
        let buckets = temporal_buckets(records);
        let render_kind = if spec.chart_kind.is_bar_family() || spec.chart_kind == ChartKind::Line {
            ChartKind::Line
        } else {
            spec.chart_kind
        };
        let dataset = Dataset::new(
            spec.metric.label(),
            buckets.iter().map(|b| b.metric(spec.metric)).collect(),
            Colour::Single(TEMPORAL_FILL.to_string()),
        )
        .as_line(self.palette.colour(1), true);
        ChartConfig {
            render_kind,
            title: spec.title.clone(),
            data: ChartData {
                labels: buckets.into_iter().map(|b| b.time_bucket).collect(),
                datasets: vec![dataset],
            },
            options: ChartOptions::default(),
        }
    }
    fn cross(&self, spec: &ChartSpec, records: &[Record]) -> ChartConfig {
        let tab = cross_tabulate(records, &spec.fields[0], &spec.fields[1], spec.metric);
        let datasets = tab
            .labels_b
            .iter()
            .enumerate()
            .map(|(j, label)| {
                let colour = self.palette.colour(j);
                let data = tab.matrix.iter().map(|row| row[j]).collect();
                let dataset = Dataset::new(label.clone(), data, Colour::Single(colour.to_string()));
                if spec.chart_kind == ChartKind::Line {
                    dataset.as_line(colour, false)
                } else {
                    dataset
                }
            })
            .collect();
        let (render_kind, mut options) = self.layout_for(spec.chart_kind);
        options.multi_dataset = true;
        ChartConfig {
            render_kind,
            title: spec.title.clone(),
            data: ChartData {
                labels: tab.labels_a,
                datasets,
            },
            options,
        }
    }
    fn single(&self, spec: &ChartSpec, records: &[Record]) -> ChartConfig {
        let field = &spec.fields[0];
        let top_n = if field.parse::<Field>() == Ok(Field::Ward) {
            self.ward_top_n
        } else {
            0
        };
        let breakdown = field_breakdown(records, field, spec.metric, top_n);
        let mut dataset = Dataset::new(
            spec.metric.label(),
            breakdown.iter().map(|b| b.metric(spec.metric)).collect(),
            Colour::PerPoint(self.palette.cycle(breakdown.len())),
        );
        if spec.chart_kind == ChartKind::Line {
            dataset = dataset.as_line(self.palette.colour(0), false);
        }
        let (render_kind, options) = self.layout_for(spec.chart_kind);
        ChartConfig {
            render_kind,
            title: spec.title.clone(),
            data: ChartData {
                labels: breakdown.into_iter().map(|b| b.label).collect(),
                datasets: vec![dataset],
            },
            options,
        }
    }
    fn layout_for(&self, kind: ChartKind) -> (ChartKind, ChartOptions) {
        if kind.is_bar_family() {
            (ChartKind::Bar, ChartOptions::bar(kind))
        } else {
            (kind, ChartOptions::default())
        }
    }
}
/// Chart for `spec` using the default palette.
pub fn build_chart(spec: &ChartSpec, records: &[Record]) -> ChartResult<ChartConfig> {
    ChartBuilder::default().build(spec, records)
}

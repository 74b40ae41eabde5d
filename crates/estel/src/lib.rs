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

//! Chart specifications and the builder that turns aggregates into
//! renderer-agnostic chart configurations.

pub mod chart_builder;
pub mod chart_spec;
pub mod error;
pub mod palette;

pub use chart_builder::{
    build_chart, AxisScale, BarLayout, ChartBuilder, ChartConfig, ChartData, ChartOptions,
    Colour, Dataset, Scales,
};
pub use chart_spec::{synthesise_title, ChartKind, ChartSpec, TEMPORAL_FIELD};
pub use error::{ChartError, ChartResult};
pub use palette::{Palette, CHART_COLORS, TEMPORAL_FILL};

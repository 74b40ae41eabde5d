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

/// Default dataset colours, cycled by index.
pub const CHART_COLORS: [&str; 12] = [
    "#00d4ff", "#ff6b6b", "#ffb700", "#00ff88", "#a855f7", "#f97316", "#ec4899", "#14b8a6",
    "#6366f1", "#eab308", "#ef4444", "#22d3ee",
];
/// Translucent fill under the temporal line, matching `CHART_COLORS[1]`.
pub const TEMPORAL_FILL: &str = "rgba(255, 107, 107, 0.15)";
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colours: Vec<String>,
}
impl Default for Palette {
    fn default() -> Self {
        Self {
            colours: CHART_COLORS.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}
impl Palette {
    pub fn new(colours: Vec<String>) -> crate::ChartResult<Self> {
        if colours.is_empty() {
            return Err(crate::ChartError::InvalidPalette {
                reason: "palette must contain at least one colour".to_string(),
            });
        }
        Ok(Self { colours })
    }
    /// Colour for position `index`, wrapping around the palette.
    pub fn colour(&self, index: usize) -> &str {
        &self.colours[index % self.colours.len()]
    }
    pub fn cycle(&self, count: usize) -> Vec<String> {
        (0..count).map(|i| self.colour(i).to_string()).collect()
    }
    pub fn len(&self) -> usize {
        self.colours.len()
    }
    pub fn is_empty(&self) -> bool {
        self.colours.is_empty()
    }
}

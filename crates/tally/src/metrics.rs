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

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A record counts as silenced when its score is strictly above this.
pub const SILENCED_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    AvgSilence,
    Count,
    SilencedPct,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::AvgSilence, Metric::Count, Metric::SilencedPct];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::AvgSilence => "avg_silence",
            Metric::Count => "count",
            Metric::SilencedPct => "silenced_pct",
        }
    }

    /// `avg_silence` -> `Avg Silence`.
    pub fn label(&self) -> String {
        crate::record::title_case(self.as_str())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avg_silence" => Ok(Metric::AvgSilence),
            "count" => Ok(Metric::Count),
            "silenced_pct" => Ok(Metric::SilencedPct),
            other => Err(format!("unsupported metric '{other}'")),
        }
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Per-bucket statistics; all three metrics are always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub label: String,
    pub avg_silence: f64,
    pub count: usize,
    pub silenced_pct: f64,
}

impl BucketStats {
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::AvgSilence => self.avg_silence,
            Metric::Count => self.count as f64,
            Metric::SilencedPct => self.silenced_pct,
        }
    }
}

/// Running totals for one bucket of scores.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScoreAccumulator {
    sum: f64,
    count: usize,
    silenced: usize,
}

impl ScoreAccumulator {
    pub(crate) fn push(&mut self, score: f64) {
        self.sum += score;
        self.count += 1;
        if score > SILENCED_THRESHOLD {
            self.silenced += 1;
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn avg_silence(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        round_to(self.sum / self.count as f64, 2)
    }

    pub(crate) fn silenced_pct(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        round_to(self.silenced as f64 / self.count as f64 * 100.0, 1)
    }

    /// Value of `metric`; an empty bucket is 0 for every metric.
    pub(crate) fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::AvgSilence => self.avg_silence(),
            Metric::Count => self.count as f64,
            Metric::SilencedPct => self.silenced_pct(),
        }
    }

    pub(crate) fn into_stats(self, label: String) -> BucketStats {
        BucketStats {
            label,
            avg_silence: self.avg_silence(),
            count: self.count,
            silenced_pct: self.silenced_pct(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_computes_all_metrics() {
        let mut acc = ScoreAccumulator::default();
        for score in [80.0, 80.0, 80.0, 50.0, 50.0, 50.0] {
            acc.push(score);
        }
        assert_eq!(acc.avg_silence(), 65.0);
        assert_eq!(acc.silenced_pct(), 50.0);
        assert_eq!(acc.value(Metric::Count), 6.0);
    }

    #[test]
    fn threshold_is_strict() {
        let mut acc = ScoreAccumulator::default();
        acc.push(70.0);
        acc.push(70.01);
        assert_eq!(acc.silenced_pct(), 50.0);
    }

    #[test]
    fn empty_bucket_is_zero() {
        let acc = ScoreAccumulator::default();
        for metric in Metric::ALL {
            assert_eq!(acc.value(metric), 0.0);
        }
    }

    #[test]
    fn rounding_and_labels() {
        assert_eq!(round_to(33.333_33, 2), 33.33);
        assert_eq!(round_to(66.666_66, 1), 66.7);
        assert_eq!(Metric::SilencedPct.label(), "Silenced Pct");
        assert_eq!("COUNT".parse::<Metric>(), Ok(Metric::Count));
        assert!("median".parse::<Metric>().is_err());
    }
}

// Experience curves for the six growth categories. Values are the cumulative
// experience a creature needs to reach a level; all six are closed-form or
// piecewise cubic in the level.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GrowthRate {
    Slow,
    Medium,
    Fast,
    MediumSlow,
    SlowThenVeryFast,
    FastThenVerySlow,
}

/// The four curves compared in the default chart.
pub const COMPARISON_RATES: [GrowthRate; 4] = [
    GrowthRate::Medium,
    GrowthRate::MediumSlow,
    GrowthRate::Slow,
    GrowthRate::Fast,
];

impl GrowthRate {
    pub const ALL: [GrowthRate; 6] = [
        GrowthRate::Slow,
        GrowthRate::Medium,
        GrowthRate::Fast,
        GrowthRate::MediumSlow,
        GrowthRate::SlowThenVeryFast,
        GrowthRate::FastThenVerySlow,
    ];

    /// Identifier used by the catalog's growth-rate endpoint.
    pub fn id(self) -> u32 {
        match self {
            GrowthRate::Slow => 1,
            GrowthRate::Medium => 2,
            GrowthRate::Fast => 3,
            GrowthRate::MediumSlow => 4,
            GrowthRate::SlowThenVeryFast => 5,
            GrowthRate::FastThenVerySlow => 6,
        }
    }

    pub fn api_name(self) -> &'static str {
        match self {
            GrowthRate::Slow => "slow",
            GrowthRate::Medium => "medium",
            GrowthRate::Fast => "fast",
            GrowthRate::MediumSlow => "medium-slow",
            GrowthRate::SlowThenVeryFast => "slow-then-very-fast",
            GrowthRate::FastThenVerySlow => "fast-then-very-slow",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GrowthRate::Slow => "Slow",
            GrowthRate::Medium => "Medium Fast",
            GrowthRate::Fast => "Fast",
            GrowthRate::MediumSlow => "Medium Slow",
            GrowthRate::SlowThenVeryFast => "Erratic",
            GrowthRate::FastThenVerySlow => "Fluctuating",
        }
    }

    pub fn from_api_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.api_name() == name)
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.id() == id)
    }

    /// Cumulative experience required at `level`.
    pub fn experience_at(self, level: u32) -> f64 {
        let x = level as f64;
        let cube = x.powi(3);
        match self {
            GrowthRate::Slow => 5.0 * cube / 4.0,
            GrowthRate::Medium => cube,
            GrowthRate::Fast => 4.0 * cube / 5.0,
            GrowthRate::MediumSlow => 6.0 * cube / 5.0 - 15.0 * x * x + 100.0 * x - 140.0,
            GrowthRate::SlowThenVeryFast => erratic(level),
            GrowthRate::FastThenVerySlow => fluctuating(level),
        }
    }
}

fn erratic(level: u32) -> f64 {
    let x = level as f64;
    let cube = x.powi(3);
    if level <= 50 {
        cube * (100.0 - x) / 50.0
    } else if level <= 68 {
        cube * (150.0 - x) / 100.0
    } else if level <= 98 {
        let m = (level % 3) as f64;
        let factor = 1274.0 + m * m - 9.0 * m - 20.0 * (level / 3) as f64;
        cube * factor / 1000.0
    } else {
        cube * (160.0 - x) / 100.0
    }
}

fn fluctuating(level: u32) -> f64 {
    let x = level as f64;
    let cube = x.powi(3);
    if level <= 15 {
        cube * (24.0 + ((level + 1) / 3) as f64) / 50.0
    } else if level <= 35 {
        cube * (14.0 + x) / 50.0
    } else {
        cube * (32.0 + (level / 2) as f64) / 50.0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CurveSeries {
    pub rate: GrowthRate,
    pub levels: Vec<u32>,
    pub experience: Vec<f64>,
}

impl CurveSeries {
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.levels
            .iter()
            .zip(self.experience.iter())
            .map(|(&level, &exp)| (level as f64, exp))
    }

    pub fn max_experience(&self) -> f64 {
        self.experience.iter().copied().fold(f64::MIN, f64::max)
    }

    pub fn min_experience(&self) -> f64 {
        self.experience.iter().copied().fold(f64::MAX, f64::min)
    }
}

/// Levels `0, step, 2*step, ...` strictly below `end`.
pub fn sample_levels(end: u32, step: u32) -> Vec<u32> {
    (0..end).step_by(step.max(1) as usize).collect()
}

pub fn comparison_curves(rates: &[GrowthRate], levels: &[u32]) -> Vec<CurveSeries> {
    rates
        .iter()
        .map(|&rate| CurveSeries {
            rate,
            levels: levels.to_vec(),
            experience: levels.iter().map(|&l| rate.experience_at(l)).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ten_values() {
        assert_eq!(GrowthRate::Medium.experience_at(10), 1000.0);
        assert_eq!(GrowthRate::Fast.experience_at(10), 800.0);
        assert_eq!(GrowthRate::Slow.experience_at(10), 1250.0);
        assert_eq!(GrowthRate::MediumSlow.experience_at(10), 560.0);
    }

    #[test]
    fn test_level_hundred_totals() {
        assert_eq!(GrowthRate::SlowThenVeryFast.experience_at(100), 600_000.0);
        assert_eq!(GrowthRate::Fast.experience_at(100), 800_000.0);
        assert_eq!(GrowthRate::Medium.experience_at(100), 1_000_000.0);
        assert_eq!(GrowthRate::MediumSlow.experience_at(100), 1_059_860.0);
        assert_eq!(GrowthRate::Slow.experience_at(100), 1_250_000.0);
        assert_eq!(GrowthRate::FastThenVerySlow.experience_at(100), 1_640_000.0);
    }

    #[test]
    fn test_piecewise_boundaries() {
        assert_eq!(erratic(50), 125_000.0);
        assert!((erratic(68) - 68f64.powi(3) * 0.82).abs() < 1.0);
        assert_eq!(fluctuating(15), 3375.0 * 29.0 / 50.0);
        assert_eq!(fluctuating(36), 36f64.powi(3));
    }

    #[test]
    fn test_sample_levels() {
        let levels = sample_levels(100, 5);
        assert_eq!(levels.len(), 20);
        assert_eq!(levels.first(), Some(&0));
        assert_eq!(levels.last(), Some(&95));
    }

    #[test]
    fn test_comparison_curves_monotonic() {
        let levels = sample_levels(100, 5);
        let curves = comparison_curves(&COMPARISON_RATES, &levels);
        assert_eq!(curves.len(), 4);
        for curve in curves
            .iter()
            .filter(|c| matches!(c.rate, GrowthRate::Medium | GrowthRate::Fast))
        {
            assert!(curve.experience.windows(2).all(|w| w[1] >= w[0]));
        }
        let medium_slow = &curves[1];
        assert_eq!(medium_slow.min_experience(), -140.0);
    }

    #[test]
    fn test_catalog_identifiers() {
        for rate in GrowthRate::ALL {
            assert_eq!(GrowthRate::from_id(rate.id()), Some(rate));
            assert_eq!(GrowthRate::from_api_name(rate.api_name()), Some(rate));
        }
        assert_eq!(GrowthRate::from_api_name("glacial"), None);
    }
}

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::SpeciesTable;

/// Label used for rows the growth resolution left without a category.
pub const UNASSIGNED_GROWTH: &str = "unassigned";

pub fn annotate_average_stats(table: &mut SpeciesTable) {
    for row in table.rows_mut() {
        row.average_base_stat = Some(row.stats.average());
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryStats {
    pub members: usize,
    pub experience_sum: u64,
    /// Members whose base experience is known.
    pub experience_samples: usize,
}

impl CategoryStats {
    pub fn mean_experience(&self) -> Option<f64> {
        if self.experience_samples == 0 {
            None
        } else {
            Some(self.experience_sum as f64 / self.experience_samples as f64)
        }
    }
}

/// Per primary type totals, built in one pass over the table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CategorySummary {
    pub by_category: BTreeMap<String, CategoryStats>,
}

impl CategorySummary {
    pub fn from_table(table: &SpeciesTable) -> Self {
        let mut by_category: BTreeMap<String, CategoryStats> = BTreeMap::new();
        for row in table.rows() {
            let entry = by_category.entry(row.primary_type.clone()).or_default();
            entry.members += 1;
            if let Some(exp) = row.base_experience {
                entry.experience_sum += exp as u64;
                entry.experience_samples += 1;
            }
        }
        Self { by_category }
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.by_category.keys().map(String::as_str)
    }

    pub fn member_counts(&self) -> BTreeMap<String, usize> {
        self.by_category
            .iter()
            .map(|(name, stats)| (name.clone(), stats.members))
            .collect()
    }

    pub fn experience_sums(&self) -> BTreeMap<String, u64> {
        self.by_category
            .iter()
            .map(|(name, stats)| (name.clone(), stats.experience_sum))
            .collect()
    }

    /// Mean base experience per category; categories without any known
    /// base experience are left out.
    pub fn mean_experience(&self) -> BTreeMap<String, f64> {
        self.by_category
            .iter()
            .filter_map(|(name, stats)| Some((name.clone(), stats.mean_experience()?)))
            .collect()
    }
}

/// Five-number summary with Tukey whiskers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BoxStats {
    pub category: String,
    pub count: usize,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub lower_whisker: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

impl BoxStats {
    pub fn from_values(category: &str, values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by_key(|v| OrderedFloat(*v));

        let q1 = quantile(&sorted, 0.25);
        let median = quantile(&sorted, 0.5);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let low_fence = q1 - 1.5 * iqr;
        let high_fence = q3 + 1.5 * iqr;

        let inside: Vec<f64> = sorted
            .iter()
            .copied()
            .filter(|v| *v >= low_fence && *v <= high_fence)
            .collect();
        let outliers = sorted
            .iter()
            .copied()
            .filter(|v| *v < low_fence || *v > high_fence)
            .collect();

        Some(Self {
            category: category.to_string(),
            count: sorted.len(),
            q1,
            median,
            q3,
            lower_whisker: inside.first().copied().unwrap_or(q1),
            upper_whisker: inside.last().copied().unwrap_or(q3),
            outliers,
        })
    }
}

/// Linearly interpolated quantile of already sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Average-stat distribution per primary type, ordered by type name.
pub fn box_stats_by_category(table: &SpeciesTable) -> Vec<BoxStats> {
    let mut grouped: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for row in table.rows() {
        let avg = row.average_base_stat.unwrap_or_else(|| row.stats.average());
        grouped
            .entry(row.primary_type.as_str())
            .or_default()
            .push(avg);
    }
    grouped
        .into_iter()
        .filter_map(|(category, values)| BoxStats::from_values(category, &values))
        .collect()
}

/// Row counts per primary type and growth label.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GrowthCountTable {
    pub counts: BTreeMap<String, BTreeMap<String, usize>>,
    pub growth_labels: Vec<String>,
}

impl GrowthCountTable {
    pub fn get(&self, category: &str, growth: &str) -> usize {
        self.counts
            .get(category)
            .and_then(|row| row.get(growth))
            .copied()
            .unwrap_or(0)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn max_count(&self) -> usize {
        self.counts
            .values()
            .flat_map(|row| row.values().copied())
            .max()
            .unwrap_or(0)
    }
}

/// Growth labels keep first-seen order so chart colors follow catalog order.
pub fn growth_counts_by_category(table: &SpeciesTable) -> GrowthCountTable {
    let mut out = GrowthCountTable::default();
    for row in table.rows() {
        let label = row.growth_name().unwrap_or(UNASSIGNED_GROWTH);
        if !out.growth_labels.iter().any(|l| l == label) {
            out.growth_labels.push(label.to_string());
        }
        let per_label = out.counts.entry(row.primary_type.clone()).or_default();
        *per_label.entry(label.to_string()).or_insert(0) += 1;
    }
    out
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountMismatch {
    pub category: String,
    pub table_count: usize,
    pub remote_count: Option<usize>,
}

/// Categories whose table-derived count differs from the remote count.
///
/// The remote count includes creatures holding the type in any slot, so
/// mismatches are expected and informational.
pub fn reconcile_member_counts(
    summary: &CategorySummary,
    remote: &BTreeMap<String, usize>,
) -> Vec<CountMismatch> {
    summary
        .by_category
        .iter()
        .filter_map(|(category, stats)| {
            let remote_count = remote.get(category).copied();
            if remote_count == Some(stats.members) {
                None
            } else {
                Some(CountMismatch {
                    category: category.clone(),
                    table_count: stats.members,
                    remote_count,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BaseStats, GrowthAssignment, SpeciesRow};

    fn row(
        name: &str,
        kind: &str,
        exp: Option<u32>,
        stats: [u32; 6],
        growth: Option<&str>,
    ) -> SpeciesRow {
        SpeciesRow {
            id: 0,
            name: name.into(),
            primary_type: kind.into(),
            base_experience: exp,
            stats: BaseStats::from_array(stats),
            growth: growth.map(|g| GrowthAssignment {
                name: g.into(),
                formula_id: 1,
            }),
            average_base_stat: None,
        }
    }

    fn sample() -> SpeciesTable {
        SpeciesTable::from_rows(vec![
            row(
                "bulbasaur",
                "grass",
                Some(64),
                [45, 49, 49, 65, 65, 45],
                Some("medium-slow"),
            ),
            row(
                "oddish",
                "grass",
                Some(142),
                [45, 50, 55, 75, 65, 30],
                Some("medium-slow"),
            ),
            row(
                "charmander",
                "fire",
                Some(62),
                [39, 52, 43, 60, 50, 65],
                Some("medium-slow"),
            ),
            row("sprigatito", "grass", None, [40, 61, 54, 45, 45, 65], None),
        ])
    }

    #[test]
    fn test_annotate_average_stats() {
        let mut table = sample();
        annotate_average_stats(&mut table);
        assert_eq!(table.get("bulbasaur").unwrap().average_base_stat, Some(53.0));
        assert!(table.rows().iter().all(|r| r.average_base_stat.is_some()));
    }

    #[test]
    fn test_mean_experience_per_category() {
        let summary = CategorySummary::from_table(&sample());
        let means = summary.mean_experience();
        assert_eq!(means.get("grass"), Some(&103.0));
        assert_eq!(means.get("fire"), Some(&62.0));
        assert_eq!(summary.member_counts().get("grass"), Some(&3));
        assert_eq!(summary.experience_sums().get("grass"), Some(&206));
    }

    #[test]
    fn test_category_without_experience_has_no_mean() {
        let table = SpeciesTable::from_rows(vec![row("x", "ghost", None, [1; 6], None)]);
        let summary = CategorySummary::from_table(&table);
        assert!(summary.mean_experience().is_empty());
        assert_eq!(summary.member_counts().get("ghost"), Some(&1));
    }

    #[test]
    fn test_box_stats_quartiles_and_outliers() {
        let stats = BoxStats::from_values("rock", &[5.0, 1.0, 3.0, 2.0, 4.0, 40.0]).unwrap();
        assert_eq!(stats.count, 6);
        assert_eq!(stats.median, 3.5);
        assert_eq!(stats.q1, 2.25);
        assert_eq!(stats.q3, 4.75);
        assert_eq!(stats.outliers, vec![40.0]);
        assert_eq!(stats.lower_whisker, 1.0);
        assert_eq!(stats.upper_whisker, 5.0);
        assert!(BoxStats::from_values("none", &[]).is_none());
    }

    #[test]
    fn test_box_stats_grouped_by_type() {
        let mut table = sample();
        annotate_average_stats(&mut table);
        let boxes = box_stats_by_category(&table);
        let names: Vec<&str> = boxes.iter().map(|b| b.category.as_str()).collect();
        assert_eq!(names, vec!["fire", "grass"]);
        assert_eq!(boxes[1].count, 3);
    }

    #[test]
    fn test_growth_counts_include_unassigned() {
        let counts = growth_counts_by_category(&sample());
        assert_eq!(counts.get("grass", "medium-slow"), 2);
        assert_eq!(counts.get("grass", UNASSIGNED_GROWTH), 1);
        assert_eq!(counts.get("fire", "slow"), 0);
        assert_eq!(counts.growth_labels, vec!["medium-slow", UNASSIGNED_GROWTH]);
        assert_eq!(counts.max_count(), 2);
    }

    #[test]
    fn test_reconcile_member_counts() {
        let summary = CategorySummary::from_table(&sample());
        let remote: BTreeMap<String, usize> =
            [("grass".to_string(), 3), ("fire".to_string(), 88)].into_iter().collect();
        let mismatches = reconcile_member_counts(&summary, &remote);
        assert_eq!(
            mismatches,
            vec![CountMismatch {
                category: "fire".into(),
                table_count: 1,
                remote_count: Some(88),
            }]
        );
    }
}

//! Growth-rate resolution: bridges the species names listed by each growth
//! category and the (sometimes form-decorated) row keys of the table.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::GrowthCategory;
use crate::{GrowthAssignment, SpeciesTable};

/// Decides whether a growth-category member name refers to a table row.
pub trait NameMatcher {
    fn name(&self) -> &'static str;

    fn matches(&self, member: &str, row_key: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Member name occurs anywhere in the row key (`thundurus` matches
    /// `thundurus-incarnate`, but `mew` also matches `mewtwo`).
    Substring,
    /// Row key equals the member name or extends it with a `-form` suffix.
    FormPrefix,
    Exact,
}

impl Default for MatchStrategy {
    fn default() -> Self {
        MatchStrategy::Substring
    }
}

impl NameMatcher for MatchStrategy {
    fn name(&self) -> &'static str {
        match self {
            MatchStrategy::Substring => "substring",
            MatchStrategy::FormPrefix => "form-prefix",
            MatchStrategy::Exact => "exact",
        }
    }

    fn matches(&self, member: &str, row_key: &str) -> bool {
        match self {
            MatchStrategy::Substring => row_key.contains(member),
            MatchStrategy::FormPrefix => {
                row_key == member
                    || row_key
                        .strip_prefix(member)
                        .map_or(false, |rest| rest.starts_with('-'))
            }
            MatchStrategy::Exact => row_key == member,
        }
    }
}

/// A row claimed by more than one growth category.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrowthCollision {
    pub species: String,
    pub kept: String,
    pub discarded: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub matcher: String,
    pub matched: usize,
    pub unmatched: Vec<String>,
    pub collisions: Vec<GrowthCollision>,
}

/// Assign each row the growth category whose member list matches its key.
///
/// Assignments are recomputed from scratch, so running this twice over the
/// same categories gives the same table. When several categories match one
/// row the category processed last is kept (categories are processed in the
/// order given) and every such collision is reported.
pub fn resolve_growth_rates<M>(
    table: &mut SpeciesTable,
    categories: &[GrowthCategory],
    matcher: &M,
) -> ResolutionReport
where
    M: NameMatcher + ?Sized,
{
    let mut claims: Vec<Option<&GrowthCategory>> = vec![None; table.len()];
    let mut collisions = Vec::new();

    for category in categories {
        for member in &category.members {
            for (idx, key) in table.names().enumerate() {
                if !matcher.matches(member, key) {
                    continue;
                }
                if let Some(previous) = claims[idx] {
                    if previous.id != category.id {
                        collisions.push(GrowthCollision {
                            species: key.to_string(),
                            kept: category.name.clone(),
                            discarded: previous.name.clone(),
                        });
                    }
                }
                claims[idx] = Some(category);
            }
        }
    }

    let mut matched = 0;
    let mut unmatched = Vec::new();
    for (row, claim) in table.rows_mut().iter_mut().zip(claims) {
        row.growth = claim.map(|category| GrowthAssignment {
            name: category.name.clone(),
            formula_id: category.id,
        });
        match claim {
            Some(_) => matched += 1,
            None => unmatched.push(row.name.clone()),
        }
    }

    for collision in &collisions {
        warn!(
            "'{}' matched growth rates '{}' and '{}'; keeping '{}'",
            collision.species, collision.discarded, collision.kept, collision.kept
        );
    }
    if !unmatched.is_empty() {
        let preview: Vec<&str> = unmatched.iter().take(10).map(String::as_str).collect();
        warn!(
            "{} species have no growth rate ({} matcher): {}{}",
            unmatched.len(),
            matcher.name(),
            preview.join(", "),
            if unmatched.len() > preview.len() { ", ..." } else { "" }
        );
        for name in &unmatched {
            debug!("no growth rate for '{}'", name);
        }
    }

    ResolutionReport {
        matcher: matcher.name().to_string(),
        matched,
        unmatched,
        collisions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BaseStats, SpeciesRow};

    fn table(names: &[&str]) -> SpeciesTable {
        SpeciesTable::from_rows(
            names
                .iter()
                .enumerate()
                .map(|(idx, name)| SpeciesRow {
                    id: idx as u32 + 1,
                    name: name.to_string(),
                    primary_type: "normal".into(),
                    base_experience: Some(100),
                    stats: BaseStats::default(),
                    growth: None,
                    average_base_stat: None,
                })
                .collect(),
        )
    }

    fn category(id: u32, name: &str, members: &[&str]) -> GrowthCategory {
        GrowthCategory {
            id,
            name: name.into(),
            formula: String::new(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_strategies() {
        let sub = MatchStrategy::Substring;
        let prefix = MatchStrategy::FormPrefix;
        let exact = MatchStrategy::Exact;
        assert!(sub.matches("thundurus", "thundurus-incarnate"));
        assert!(prefix.matches("thundurus", "thundurus-incarnate"));
        assert!(!exact.matches("thundurus", "thundurus-incarnate"));
        assert!(sub.matches("mew", "mewtwo"));
        assert!(!prefix.matches("mew", "mewtwo"));
        assert!(prefix.matches("mew", "mew"));
    }

    #[test]
    fn test_resolve_decorated_names() {
        let mut table = table(&["thundurus-incarnate", "pikachu", "missingno"]);
        let categories = vec![
            category(1, "slow", &["thundurus"]),
            category(2, "medium", &["pikachu"]),
        ];
        let report = resolve_growth_rates(&mut table, &categories, &MatchStrategy::Substring);

        assert_eq!(report.matched, 2);
        assert_eq!(report.unmatched, vec!["missingno".to_string()]);
        assert!(report.collisions.is_empty());
        let thundurus = table.get("thundurus-incarnate").unwrap();
        assert_eq!(
            thundurus.growth,
            Some(GrowthAssignment {
                name: "slow".into(),
                formula_id: 1
            })
        );
    }

    #[test]
    fn test_collision_reported_and_last_category_kept() {
        let mut table = table(&["mewtwo"]);
        let categories = vec![
            category(4, "medium-slow", &["mew"]),
            category(1, "slow", &["mewtwo"]),
        ];
        let report = resolve_growth_rates(&mut table, &categories, &MatchStrategy::Substring);
        assert_eq!(
            report.collisions,
            vec![GrowthCollision {
                species: "mewtwo".into(),
                kept: "slow".into(),
                discarded: "medium-slow".into(),
            }]
        );
        assert_eq!(table.get("mewtwo").unwrap().growth_name(), Some("slow"));

        let mut strict = self::table(&["mewtwo"]);
        let report = resolve_growth_rates(&mut strict, &categories, &MatchStrategy::FormPrefix);
        assert!(report.collisions.is_empty());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut table = table(&["bulbasaur", "ivysaur", "deoxys-normal"]);
        let categories = vec![
            category(4, "medium-slow", &["bulbasaur", "ivysaur"]),
            category(1, "slow", &["deoxys"]),
        ];
        resolve_growth_rates(&mut table, &categories, &MatchStrategy::Substring);
        let first = table.rows().to_vec();
        resolve_growth_rates(&mut table, &categories, &MatchStrategy::Substring);
        assert_eq!(table.rows(), first.as_slice());
    }

    #[test]
    fn test_stale_assignment_cleared() {
        let mut table = table(&["ditto"]);
        table.rows_mut()[0].growth = Some(GrowthAssignment {
            name: "fast".into(),
            formula_id: 3,
        });
        let report = resolve_growth_rates(&mut table, &[], &MatchStrategy::Exact);
        assert_eq!(report.unmatched, vec!["ditto".to_string()]);
        assert!(table.rows()[0].growth.is_none());
    }
}

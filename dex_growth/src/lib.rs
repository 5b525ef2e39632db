//! Growth-rate and base-stat analysis over a PokeAPI-style creature catalog.
//!
//! The pipeline fetches every species record, annotates each row with its
//! growth category, derives the average base stat and summarises base
//! experience per primary type. Rendering lives in the CLI crate.

pub mod aggregate;
pub mod catalog;
pub mod growth;
pub mod matching;

#[cfg(test)]
pub(crate) mod test_support;

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub use aggregate::{BoxStats, CategoryStats, CategorySummary, CountMismatch, GrowthCountTable};
pub use catalog::{CatalogSource, Fetched, GrowthCategory, HttpCatalog, RetryPolicy};
pub use growth::{CurveSeries, GrowthRate};
pub use matching::{GrowthCollision, MatchStrategy, NameMatcher, ResolutionReport};

pub const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2";

/// Primary type names used by the catalog for regular species.
pub const KNOWN_TYPES: [&str; 18] = [
    "normal", "fighting", "flying", "poison", "ground", "rock", "bug", "ghost", "steel", "fire",
    "water", "grass", "electric", "psychic", "ice", "dragon", "dark", "fairy",
];

/// Catalog stat names in the order they are stored in [`BaseStats`].
pub const STAT_NAMES: [&str; 6] = [
    "hp",
    "attack",
    "defense",
    "special-attack",
    "special-defense",
    "speed",
];

#[derive(Error, Debug)]
pub enum DexError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("record '{record}' is missing {field}")]
    MissingField { record: String, field: &'static str },
    #[error("catalog returned no species")]
    EmptyCatalog,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl DexError {
    /// Failures worth retrying: the request may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            DexError::Transport { .. } => true,
            DexError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// How the set of species identifiers is discovered.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Enumeration {
    /// Use the paginated listing endpoint, probing only if it is unavailable.
    Listing,
    /// Request identifiers 1, 2, 3, ... until the first not-found answer.
    Probe,
}

impl Default for Enumeration {
    fn default() -> Self {
        Enumeration::Listing
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Params {
    pub base_url: String,
    pub enumeration: Enumeration,
    pub max_species: Option<u32>,
    pub workers: usize,
    pub listing_page_size: u32,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
    pub matcher: MatchStrategy,
    pub cross_check_types: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            enumeration: Enumeration::Listing,
            max_species: None,
            workers: 4,
            listing_page_size: 200,
            max_retries: 3,
            retry_backoff_ms: 500,
            timeout_secs: 30,
            matcher: MatchStrategy::Substring,
            cross_check_types: false,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), DexError> {
        if self.base_url.trim().is_empty() {
            return Err(DexError::InvalidParameter("base URL is empty".into()));
        }
        if self.workers == 0 {
            return Err(DexError::InvalidParameter("workers must be > 0".into()));
        }
        if self.listing_page_size == 0 {
            return Err(DexError::InvalidParameter(
                "listing page size must be > 0".into(),
            ));
        }
        if self.max_species == Some(0) {
            return Err(DexError::InvalidParameter(
                "max species must be > 0 when set".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_backoff_ms)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BaseStats {
    pub hp: u32,
    pub attack: u32,
    pub defense: u32,
    pub special_attack: u32,
    pub special_defense: u32,
    pub speed: u32,
}

impl BaseStats {
    pub fn from_array(values: [u32; 6]) -> Self {
        let [hp, attack, defense, special_attack, special_defense, speed] = values;
        Self {
            hp,
            attack,
            defense,
            special_attack,
            special_defense,
            speed,
        }
    }

    pub fn as_array(&self) -> [u32; 6] {
        [
            self.hp,
            self.attack,
            self.defense,
            self.special_attack,
            self.special_defense,
            self.speed,
        ]
    }

    pub fn total(&self) -> u32 {
        self.as_array().iter().sum()
    }

    pub fn average(&self) -> f64 {
        self.total() as f64 / STAT_NAMES.len() as f64
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrowthAssignment {
    pub name: String,
    pub formula_id: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SpeciesRow {
    pub id: u32,
    pub name: String,
    pub primary_type: String,
    pub base_experience: Option<u32>,
    pub stats: BaseStats,
    pub growth: Option<GrowthAssignment>,
    pub average_base_stat: Option<f64>,
}

impl SpeciesRow {
    pub fn growth_name(&self) -> Option<&str> {
        self.growth.as_ref().map(|g| g.name.as_str())
    }
}

/// Species rows in catalog order, keyed by species name.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SpeciesRow>", into = "Vec<SpeciesRow>")]
pub struct SpeciesTable {
    rows: Vec<SpeciesRow>,
    index: HashMap<String, usize>,
}

impl From<Vec<SpeciesRow>> for SpeciesTable {
    fn from(rows: Vec<SpeciesRow>) -> Self {
        Self::from_rows(rows)
    }
}

impl From<SpeciesTable> for Vec<SpeciesRow> {
    fn from(table: SpeciesTable) -> Self {
        table.rows
    }
}

impl SpeciesTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<SpeciesRow>) -> Self {
        let mut table = Self::new();
        for row in rows {
            table.push(row);
        }
        table
    }

    /// Appends a row; a repeated name replaces the earlier row in place.
    pub fn push(&mut self, row: SpeciesRow) {
        if let Some(&idx) = self.index.get(&row.name) {
            warn!("duplicate species key '{}' (id {})", row.name, row.id);
            self.rows[idx] = row;
            return;
        }
        self.index.insert(row.name.clone(), self.rows.len());
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[SpeciesRow] {
        &self.rows
    }

    /// Mutable access for annotation passes. Row names must not change.
    pub fn rows_mut(&mut self) -> &mut [SpeciesRow] {
        &mut self.rows
    }

    pub fn get(&self, name: &str) -> Option<&SpeciesRow> {
        self.index.get(name).map(|&idx| &self.rows[idx])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.name.as_str())
    }

    pub fn unknown_types(&self) -> Vec<&SpeciesRow> {
        self.rows
            .iter()
            .filter(|r| !KNOWN_TYPES.contains(&r.primary_type.as_str()))
            .collect()
    }
}

/// Growth category metadata kept after resolution (members dropped).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrowthCategoryInfo {
    pub id: u32,
    pub name: String,
    pub formula: String,
    pub member_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Analysis {
    pub generated_at: DateTime<Utc>,
    pub params: Params,
    pub table: SpeciesTable,
    pub growth_categories: Vec<GrowthCategoryInfo>,
    pub resolution: ResolutionReport,
    pub summary: CategorySummary,
    pub count_mismatches: Vec<CountMismatch>,
}

/// Run the full fetch, resolve and aggregate pipeline against a catalog.
pub fn run_analysis<S>(source: &S, params: &Params) -> Result<Analysis, DexError>
where
    S: CatalogSource + ?Sized,
{
    params.validate()?;
    let pool = catalog::worker_pool(params.workers)?;

    let t_fetch = Instant::now();
    let mut table = catalog::fetch_species_table(source, &pool, params)?;
    info!(
        "Fetched {} species in {:.1} s",
        table.len(),
        t_fetch.elapsed().as_secs_f64()
    );
    for row in table.unknown_types() {
        warn!(
            "species '{}' has unrecognised primary type '{}'",
            row.name, row.primary_type
        );
    }

    let t_resolve = Instant::now();
    let categories = catalog::fetch_growth_categories(source, &pool, params)?;
    let resolution = matching::resolve_growth_rates(&mut table, &categories, &params.matcher);
    info!(
        "Growth rates resolved in {:.1} s: {} matched, {} unmatched, {} collisions ({})",
        t_resolve.elapsed().as_secs_f64(),
        resolution.matched,
        resolution.unmatched.len(),
        resolution.collisions.len(),
        params.matcher.name()
    );

    let t_aggregate = Instant::now();
    aggregate::annotate_average_stats(&mut table);
    let summary = CategorySummary::from_table(&table);
    info!(
        "Aggregated {} types in {:.1} ms",
        summary.by_category.len(),
        t_aggregate.elapsed().as_secs_f64() * 1000.0
    );

    let count_mismatches = if params.cross_check_types {
        let names: Vec<String> = summary.categories().map(str::to_string).collect();
        let remote = catalog::fetch_type_member_counts(source, &pool, params, &names)?;
        aggregate::reconcile_member_counts(&summary, &remote)
    } else {
        Vec::new()
    };

    let growth_categories = categories
        .iter()
        .map(|c| GrowthCategoryInfo {
            id: c.id,
            name: c.name.clone(),
            formula: c.formula.clone(),
            member_count: c.members.len(),
        })
        .collect();

    Ok(Analysis {
        generated_at: Utc::now(),
        params: params.clone(),
        table,
        growth_categories,
        resolution,
        summary,
        count_mismatches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{growth_record, record, FakeCatalog};

    fn row(name: &str, kind: &str) -> SpeciesRow {
        SpeciesRow {
            id: 1,
            name: name.to_string(),
            primary_type: kind.to_string(),
            base_experience: Some(64),
            stats: BaseStats::default(),
            growth: None,
            average_base_stat: None,
        }
    }

    #[test]
    fn test_average_base_stat() {
        let stats = BaseStats::from_array([45, 49, 49, 65, 65, 45]);
        assert_eq!(stats.total(), 318);
        assert_eq!(stats.average(), 53.0);
    }

    #[test]
    fn test_table_lookup_and_unknown_types() {
        let table =
            SpeciesTable::from_rows(vec![row("bulbasaur", "grass"), row("oddity", "shadow")]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get("bulbasaur").map(|r| r.primary_type.as_str()),
            Some("grass")
        );
        let unknown: Vec<&str> = table
            .unknown_types()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(unknown, vec!["oddity"]);
    }

    #[test]
    fn test_duplicate_name_replaces_row() {
        let mut table = SpeciesTable::new();
        table.push(row("eevee", "normal"));
        table.push(row("eevee", "fairy"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].primary_type, "fairy");
    }

    #[test]
    fn test_params_validation() {
        assert!(Params::default().validate().is_ok());
        let params = Params {
            workers: 0,
            ..Params::default()
        };
        assert!(matches!(params.validate(), Err(DexError::InvalidParameter(_))));
    }

    #[test]
    fn test_transient_classification() {
        let status = |status| DexError::Status {
            url: "u".into(),
            status,
        };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(403).is_transient());
        assert!(!DexError::EmptyCatalog.is_transient());
    }

    #[test]
    fn test_run_analysis_end_to_end() {
        let catalog = FakeCatalog::new(vec![
            record(
                1,
                "bulbasaur",
                &["grass", "poison"],
                Some(64),
                [45, 49, 49, 65, 65, 45],
            ),
            record(
                2,
                "charmander",
                &["fire"],
                Some(62),
                [39, 52, 43, 60, 50, 65],
            ),
            record(
                3,
                "oddish",
                &["grass", "poison"],
                Some(142),
                [45, 50, 55, 75, 65, 30],
            ),
        ])
        .with_growth(vec![
            growth_record(4, "medium-slow", &["bulbasaur", "charmander", "oddish"]),
            growth_record(2, "medium", &[]),
        ]);
        let params = Params {
            retry_backoff_ms: 0,
            ..Params::default()
        };

        let analysis = run_analysis(&catalog, &params).unwrap();
        assert_eq!(analysis.table.len(), 3);
        assert!(analysis.resolution.unmatched.is_empty());
        assert_eq!(analysis.summary.mean_experience().get("grass"), Some(&103.0));
        assert_eq!(analysis.growth_categories.len(), 2);
        assert_eq!(analysis.growth_categories[0].name, "medium");
        let bulbasaur = analysis.table.get("bulbasaur").unwrap();
        assert_eq!(bulbasaur.average_base_stat, Some(53.0));
        assert_eq!(bulbasaur.growth_name(), Some("medium-slow"));
    }
}

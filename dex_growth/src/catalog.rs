//! Catalog access: wire types, the [`CatalogSource`] seam, the blocking HTTP
//! client and the bounded fetch loops that build the species table.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use rayon::prelude::*;
use rayon::ThreadPool;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{BaseStats, DexError, Params, SpeciesRow, SpeciesTable, STAT_NAMES};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct NamedResource {
    pub name: String,
    pub url: String,
}

impl NamedResource {
    /// Numeric identifier at the end of the resource URL (`.../pokemon/25/`).
    pub fn trailing_id(&self) -> Option<u32> {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse().ok())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResourceList {
    pub count: u32,
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<NamedResource>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TypeSlot {
    pub slot: u32,
    #[serde(rename = "type")]
    pub kind: NamedResource,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StatEntry {
    pub base_stat: u32,
    pub stat: NamedResource,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PokemonRecord {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub base_experience: Option<u32>,
    pub types: Vec<TypeSlot>,
    pub stats: Vec<StatEntry>,
}

impl PokemonRecord {
    /// Flatten into a table row. Only the first-listed type is kept.
    pub fn into_row(self) -> Result<SpeciesRow, DexError> {
        let primary_type = self
            .types
            .first()
            .map(|slot| slot.kind.name.clone())
            .ok_or_else(|| DexError::MissingField {
                record: self.name.clone(),
                field: "types",
            })?;

        let mut values = [0u32; 6];
        for (value, stat_name) in values.iter_mut().zip(STAT_NAMES) {
            *value = self
                .stats
                .iter()
                .find(|entry| entry.stat.name == stat_name)
                .map(|entry| entry.base_stat)
                .ok_or_else(|| DexError::MissingField {
                    record: self.name.clone(),
                    field: stat_name,
                })?;
        }

        Ok(SpeciesRow {
            id: self.id,
            name: self.name,
            primary_type,
            base_experience: self.base_experience,
            stats: BaseStats::from_array(values),
            growth: None,
            average_base_stat: None,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GrowthRateRecord {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub formula: String,
    pub pokemon_species: Vec<NamedResource>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TypeMember {
    pub slot: u32,
    pub pokemon: NamedResource,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TypeRecord {
    pub id: u32,
    pub name: String,
    pub pokemon: Vec<TypeMember>,
}

/// A growth category with the species names the catalog lists for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrowthCategory {
    pub id: u32,
    pub name: String,
    pub formula: String,
    pub members: Vec<String>,
}

impl From<GrowthRateRecord> for GrowthCategory {
    fn from(record: GrowthRateRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            formula: record.formula,
            members: record
                .pokemon_species
                .into_iter()
                .map(|species| species.name)
                .collect(),
        }
    }
}

/// Result of a lookup that may legitimately find nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetched<T> {
    Found(T),
    NotFound,
}

impl<T> Fetched<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Fetched::Found(value) => Some(value),
            Fetched::NotFound => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Found(value) => Fetched::Found(f(value)),
            Fetched::NotFound => Fetched::NotFound,
        }
    }
}

/// Read-only view of the creature catalog.
pub trait CatalogSource: Sync {
    /// Identifiers from the paginated listing, or `None` when the source has
    /// no listing endpoint.
    fn species_ids(&self, page_size: u32) -> Result<Option<Vec<u32>>, DexError>;

    fn species(&self, id: u32) -> Result<Fetched<PokemonRecord>, DexError>;

    fn growth_rates(&self) -> Result<Vec<NamedResource>, DexError>;

    fn growth_rate(&self, name: &str) -> Result<GrowthRateRecord, DexError>;

    fn type_member_count(&self, name: &str) -> Result<Fetched<usize>, DexError>;
}

pub struct HttpCatalog {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpCatalog {
    pub fn new(params: &Params) -> Result<Self, DexError> {
        let base_url = params.base_url.trim_end_matches('/').to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(params.timeout_secs.max(1)))
            .user_agent(concat!("dex_growth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DexError::Transport {
                url: base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { base_url, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Fetched<T>, DexError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| DexError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Fetched::NotFound);
        }
        if !status.is_success() {
            return Err(DexError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(|e| DexError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&body)
            .map(Fetched::Found)
            .map_err(|e| DexError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    fn require_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DexError> {
        self.get_json(url)?.found().ok_or_else(|| DexError::Status {
            url: url.to_string(),
            status: StatusCode::NOT_FOUND.as_u16(),
        })
    }
}

impl CatalogSource for HttpCatalog {
    fn species_ids(&self, page_size: u32) -> Result<Option<Vec<u32>>, DexError> {
        let mut url = self.endpoint(&format!("pokemon?limit={}&offset=0", page_size));
        let mut ids = Vec::new();
        loop {
            let page: ResourceList = match self.get_json(&url)? {
                Fetched::Found(page) => page,
                Fetched::NotFound => return Ok(None),
            };
            ids.extend(page.results.iter().filter_map(NamedResource::trailing_id));
            match page.next {
                Some(next) if !page.results.is_empty() => url = next,
                _ => break,
            }
        }
        Ok(Some(ids))
    }

    fn species(&self, id: u32) -> Result<Fetched<PokemonRecord>, DexError> {
        self.get_json(&self.endpoint(&format!("pokemon/{}/", id)))
    }

    fn growth_rates(&self) -> Result<Vec<NamedResource>, DexError> {
        let list: ResourceList = self.require_json(&self.endpoint("growth-rate/"))?;
        Ok(list.results)
    }

    fn growth_rate(&self, name: &str) -> Result<GrowthRateRecord, DexError> {
        self.require_json(&self.endpoint(&format!("growth-rate/{}/", name)))
    }

    fn type_member_count(&self, name: &str) -> Result<Fetched<usize>, DexError> {
        let record: Fetched<TypeRecord> =
            self.get_json(&self.endpoint(&format!("type/{}/", name)))?;
        Ok(record.map(|t| t.pokemon.len()))
    }
}

/// Exponential backoff for transient failures.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    pub fn run<T>(
        &self,
        label: &str,
        mut op: impl FnMut() -> Result<T, DexError>,
    ) -> Result<T, DexError> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        "{} failed ({}); retry {}/{} in {} ms",
                        label,
                        err,
                        attempt,
                        self.max_retries,
                        delay.as_millis()
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Thread pool that caps the number of requests in flight.
pub fn worker_pool(workers: usize) -> Result<ThreadPool, DexError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|idx| format!("dex-fetch-{}", idx))
        .build()
        .map_err(|e| DexError::WorkerPool(e.to_string()))
}

/// Build the species table, preferring the listing endpoint over probing.
pub fn fetch_species_table<S>(
    source: &S,
    pool: &ThreadPool,
    params: &Params,
) -> Result<SpeciesTable, DexError>
where
    S: CatalogSource + ?Sized,
{
    let retry = params.retry_policy();
    let listed = match params.enumeration {
        crate::Enumeration::Listing => {
            let listing = retry.run("species listing", || {
                source.species_ids(params.listing_page_size)
            })?;
            match listing {
                Some(ids) => Some(contiguous_prefix(ids, params.max_species)),
                None => {
                    info!("Listing endpoint unavailable; probing identifiers");
                    None
                }
            }
        }
        crate::Enumeration::Probe => None,
    };

    let table = match listed {
        Some(ids) => {
            info!("Listing reports {} sequential species", ids.len());
            fetch_listed(source, pool, &retry, &ids)?
        }
        None => probe_sequential(source, pool, &retry, params)?,
    };

    if table.is_empty() {
        return Err(DexError::EmptyCatalog);
    }
    Ok(table)
}

/// Identifiers 1..=N present without gaps, optionally capped.
fn contiguous_prefix(mut ids: Vec<u32>, cap: Option<u32>) -> Vec<u32> {
    ids.sort_unstable();
    ids.dedup();
    let limit = cap.unwrap_or(u32::MAX);
    ids.into_iter()
        .zip(1u32..)
        .take_while(|(id, expected)| id == expected && *expected <= limit)
        .map(|(id, _)| id)
        .collect()
}

fn fetch_one<S>(
    source: &S,
    retry: &RetryPolicy,
    id: u32,
) -> Result<Fetched<PokemonRecord>, DexError>
where
    S: CatalogSource + ?Sized,
{
    retry.run(&format!("species {}", id), || source.species(id))
}

fn fetch_listed<S>(
    source: &S,
    pool: &ThreadPool,
    retry: &RetryPolicy,
    ids: &[u32],
) -> Result<SpeciesTable, DexError>
where
    S: CatalogSource + ?Sized,
{
    let results: Vec<Result<Fetched<PokemonRecord>, DexError>> = pool.install(|| {
        ids.par_iter()
            .map(|&id| fetch_one(source, retry, id))
            .collect()
    });

    let mut table = SpeciesTable::new();
    for (id, result) in ids.iter().zip(results) {
        match result? {
            Fetched::Found(record) => table.push(record.into_row()?),
            Fetched::NotFound => {
                warn!("listed species {} was not found; stopping there", id);
                break;
            }
        }
    }
    Ok(table)
}

fn probe_sequential<S>(
    source: &S,
    pool: &ThreadPool,
    retry: &RetryPolicy,
    params: &Params,
) -> Result<SpeciesTable, DexError>
where
    S: CatalogSource + ?Sized,
{
    let batch_size = params.workers.max(1) as u32;
    let limit = params.max_species.unwrap_or(u32::MAX);
    let mut table = SpeciesTable::new();
    let mut next_id = 1u32;

    'probe: while next_id <= limit {
        let end = next_id.saturating_add(batch_size).min(limit.saturating_add(1));
        let batch: Vec<u32> = (next_id..end).collect();
        let results: Vec<Result<Fetched<PokemonRecord>, DexError>> = pool.install(|| {
            batch
                .par_iter()
                .map(|&id| fetch_one(source, retry, id))
                .collect()
        });

        // Later identifiers in the batch are discarded once one is missing.
        for (&id, result) in batch.iter().zip(results) {
            match result? {
                Fetched::Found(record) => table.push(record.into_row()?),
                Fetched::NotFound => {
                    debug!("species {} not found: end of catalog", id);
                    break 'probe;
                }
            }
        }
        next_id = end;
    }
    Ok(table)
}

/// Fetch the growth-rate listing and every listed category, sorted by id.
pub fn fetch_growth_categories<S>(
    source: &S,
    pool: &ThreadPool,
    params: &Params,
) -> Result<Vec<GrowthCategory>, DexError>
where
    S: CatalogSource + ?Sized,
{
    let retry = params.retry_policy();
    let listing = retry.run("growth-rate listing", || source.growth_rates())?;
    if listing.len() != crate::growth::GrowthRate::ALL.len() {
        warn!(
            "expected {} growth rates, catalog lists {}",
            crate::growth::GrowthRate::ALL.len(),
            listing.len()
        );
    }

    let records: Vec<GrowthRateRecord> = pool.install(|| {
        listing
            .par_iter()
            .map(|entry| {
                retry.run(&format!("growth rate {}", entry.name), || {
                    source.growth_rate(&entry.name)
                })
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    let mut categories: Vec<GrowthCategory> =
        records.into_iter().map(GrowthCategory::from).collect();
    categories.sort_by_key(|c| c.id);
    for category in &categories {
        info!(
            "Growth rate {} ({}): {} species",
            category.id,
            category.name,
            category.members.len()
        );
    }
    Ok(categories)
}

/// Per-type member counts as reported by the type endpoint.
pub fn fetch_type_member_counts<S>(
    source: &S,
    pool: &ThreadPool,
    params: &Params,
    types: &[String],
) -> Result<BTreeMap<String, usize>, DexError>
where
    S: CatalogSource + ?Sized,
{
    let retry = params.retry_policy();
    let counts: Vec<(String, Fetched<usize>)> = pool.install(|| {
        types
            .par_iter()
            .map(|name| {
                retry
                    .run(&format!("type {}", name), || source.type_member_count(name))
                    .map(|count| (name.clone(), count))
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    let mut out = BTreeMap::new();
    for (name, count) in counts {
        match count {
            Fetched::Found(count) => {
                out.insert(name, count);
            }
            Fetched::NotFound => warn!("type '{}' not found in catalog", name),
        }
    }
    Ok(out)
}

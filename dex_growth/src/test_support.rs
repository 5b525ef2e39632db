use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::catalog::{
    CatalogSource, Fetched, GrowthRateRecord, NamedResource, PokemonRecord, StatEntry, TypeSlot,
};
use crate::{DexError, STAT_NAMES};

pub(crate) fn resource(kind: &str, name: &str, id: u32) -> NamedResource {
    NamedResource {
        name: name.to_string(),
        url: format!("https://catalog.test/api/v2/{}/{}/", kind, id),
    }
}

pub(crate) fn record(
    id: u32,
    name: &str,
    types: &[&str],
    base_experience: Option<u32>,
    stats: [u32; 6],
) -> PokemonRecord {
    PokemonRecord {
        id,
        name: name.to_string(),
        base_experience,
        types: types
            .iter()
            .enumerate()
            .map(|(idx, kind)| TypeSlot {
                slot: idx as u32 + 1,
                kind: resource("type", kind, idx as u32 + 1),
            })
            .collect(),
        stats: stats
            .iter()
            .zip(STAT_NAMES)
            .enumerate()
            .map(|(idx, (&base_stat, stat_name))| StatEntry {
                base_stat,
                stat: resource("stat", stat_name, idx as u32 + 1),
            })
            .collect(),
    }
}

pub(crate) fn growth_record(id: u32, name: &str, members: &[&str]) -> GrowthRateRecord {
    GrowthRateRecord {
        id,
        name: name.to_string(),
        formula: String::new(),
        pokemon_species: members
            .iter()
            .enumerate()
            .map(|(idx, member)| resource("pokemon-species", member, idx as u32 + 1))
            .collect(),
    }
}

/// In-memory catalog that records which species ids were requested.
pub(crate) struct FakeCatalog {
    species: BTreeMap<u32, PokemonRecord>,
    listing: Option<Vec<u32>>,
    growth: Vec<GrowthRateRecord>,
    type_counts: BTreeMap<String, usize>,
    failures: Mutex<BTreeMap<u32, u32>>,
    requested: Mutex<Vec<u32>>,
}

impl FakeCatalog {
    pub(crate) fn new(records: Vec<PokemonRecord>) -> Self {
        Self {
            species: records.into_iter().map(|r| (r.id, r)).collect(),
            listing: None,
            growth: Vec::new(),
            type_counts: BTreeMap::new(),
            failures: Mutex::new(BTreeMap::new()),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_listing(mut self, ids: Vec<u32>) -> Self {
        self.listing = Some(ids);
        self
    }

    pub(crate) fn with_growth(mut self, growth: Vec<GrowthRateRecord>) -> Self {
        self.growth = growth;
        self
    }

    pub(crate) fn with_type_count(mut self, name: &str, count: usize) -> Self {
        self.type_counts.insert(name.to_string(), count);
        self
    }

    /// Species `id` fails with a transport error `times` times before answering.
    pub(crate) fn with_failures(self, id: u32, times: u32) -> Self {
        self.failures.lock().unwrap().insert(id, times);
        self
    }

    pub(crate) fn requested(&self) -> Vec<u32> {
        self.requested.lock().unwrap().clone()
    }
}

impl CatalogSource for FakeCatalog {
    fn species_ids(&self, _page_size: u32) -> Result<Option<Vec<u32>>, DexError> {
        Ok(self.listing.clone())
    }

    fn species(&self, id: u32) -> Result<Fetched<PokemonRecord>, DexError> {
        self.requested.lock().unwrap().push(id);
        if let Some(remaining) = self.failures.lock().unwrap().get_mut(&id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DexError::Transport {
                    url: format!("fake://pokemon/{}", id),
                    message: "connection reset".into(),
                });
            }
        }
        Ok(match self.species.get(&id) {
            Some(record) => Fetched::Found(record.clone()),
            None => Fetched::NotFound,
        })
    }

    fn growth_rates(&self) -> Result<Vec<NamedResource>, DexError> {
        Ok(self
            .growth
            .iter()
            .map(|g| resource("growth-rate", &g.name, g.id))
            .collect())
    }

    fn growth_rate(&self, name: &str) -> Result<GrowthRateRecord, DexError> {
        self.growth
            .iter()
            .find(|g| g.name == name)
            .cloned()
            .ok_or_else(|| DexError::Status {
                url: format!("fake://growth-rate/{}", name),
                status: 404,
            })
    }

    fn type_member_count(&self, name: &str) -> Result<Fetched<usize>, DexError> {
        Ok(match self.type_counts.get(name) {
            Some(&count) => Fetched::Found(count),
            None => Fetched::NotFound,
        })
    }
}

//! Access to the canonical current-state REST source.
//!
//! Every request goes through the shared [`FetchCache`], so documents
//! referenced by several entities (generations, version groups, machines,
//! species in evolution chains) are fetched once per run. URLs are always
//! rendered as `<base><endpoint>/<id>/`, matching the links inside documents,
//! so a reference followed from a document and one built from an id share a
//! cache entry.

use futures::future::try_join_all;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::FetchCache;
use crate::document::{Document, id_from_url, ref_name};
use crate::types::{Generation, ResourceId, ResourceKind};
use crate::{Error, Result};

/// Client for the canonical source.
pub struct CanonicalSource {
    cache: Arc<FetchCache>,
    base: Url,
    list_limit: u32,
}

impl CanonicalSource {
    /// Default page size for whole-endpoint listings.
    pub const DEFAULT_LIST_LIMIT: u32 = 3_000;

    /// Client rooted at `base_url` (a trailing slash is added when missing).
    pub fn new(cache: Arc<FetchCache>, base_url: &str) -> Result<Self> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base = Url::parse(&normalized)
            .map_err(|e| Error::Config(format!("Invalid API base URL '{base_url}': {e}")))?;
        Ok(Self {
            cache,
            base,
            list_limit: Self::DEFAULT_LIST_LIMIT,
        })
    }

    /// Set the page size for whole-endpoint listings.
    #[must_use]
    pub const fn with_list_limit(mut self, list_limit: u32) -> Self {
        self.list_limit = list_limit;
        self
    }

    /// The shared fetch cache.
    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    /// Absolute URL of an endpoint path relative to the base.
    pub fn endpoint_url(&self, path: &str) -> String {
        self.base
            .join(path)
            .map_or_else(|_| format!("{}{path}", self.base), String::from)
    }

    /// Absolute URL of one resource.
    pub fn resource_url(&self, kind: ResourceKind, key: impl std::fmt::Display) -> String {
        self.endpoint_url(&format!("{}/{key}/", kind.endpoint()))
    }

    /// Fetch any document by absolute URL.
    pub async fn fetch_url(&self, url: &str) -> Result<Arc<Document>> {
        Ok(self.cache.get(url).await?)
    }

    /// Fetch the current-state document of one entity.
    pub async fn fetch_resource(&self, id: &ResourceId) -> Result<Arc<Document>> {
        self.fetch_url(&self.resource_url(id.kind, id.id)).await
    }

    /// Most recent generation the source knows about.
    pub async fn latest_generation(&self) -> Result<Generation> {
        let listing = self.fetch_url(&self.endpoint_url("generation/")).await?;
        let latest = listing
            .array_field("results")
            .iter()
            .filter_map(|entry| entry.get("url").and_then(Value::as_str).and_then(id_from_url))
            .max()
            .ok_or_else(|| Error::Other("generation listing is empty".into()))?;
        info!("Latest generation: {}", latest);
        Ok(Generation::new(latest))
    }

    /// Identifiers of every `kind` entity up to and including `upto`, by id.
    ///
    /// Abilities, moves and species are gathered from each generation's
    /// listing; items come from a single whole-endpoint page.
    pub async fn list_resources(
        &self,
        kind: ResourceKind,
        upto: Generation,
    ) -> Result<Vec<ResourceId>> {
        let references: Vec<Value> = if let Some(key) = kind.generation_listing_key() {
            let pages = try_join_all((1..=upto.get()).map(|n| {
                let url = self.resource_url(ResourceKind::Generation, n);
                async move { self.fetch_url(&url).await }
            }))
            .await?;
            pages
                .iter()
                .flat_map(|page| page.array_field(key).iter().cloned())
                .collect()
        } else if kind == ResourceKind::Item {
            let url = self.endpoint_url(&format!("item?limit={}", self.list_limit));
            self.fetch_url(&url).await?.array_field("results").to_vec()
        } else {
            return Err(Error::Other(format!("{kind} is not a collectable category")));
        };

        let mut ids: Vec<ResourceId> = references
            .iter()
            .filter_map(|reference| {
                let name = reference.get("name").and_then(Value::as_str)?;
                let id = reference
                    .get("url")
                    .and_then(Value::as_str)
                    .and_then(id_from_url)?;
                Some(ResourceId::new(kind, id, name))
            })
            .collect();
        ids.sort();
        ids.dedup_by_key(|id| id.id);

        debug!("Listed {} {} entries up to generation {}", ids.len(), kind, upto);
        Ok(ids)
    }

    /// Build the generation catalog for generations `1..=latest`.
    pub async fn catalog(&self, latest: Generation) -> Result<GenerationCatalog> {
        let generations = try_join_all((1..=latest.get()).map(|n| async move {
            let doc = self
                .fetch_url(&self.resource_url(ResourceKind::Generation, n))
                .await?;
            let groups = doc
                .array_field("version_groups")
                .iter()
                .filter_map(|vg| vg.get("name").and_then(Value::as_str).map(str::to_string))
                .collect::<Vec<_>>();
            Ok::<_, Error>((Generation::new(n), groups))
        }))
        .await?;

        let mut catalog = GenerationCatalog::new(latest);
        for (generation, groups) in generations {
            let versions = try_join_all(groups.iter().map(|group| async move {
                let doc = self
                    .fetch_url(&self.resource_url(ResourceKind::VersionGroup, group))
                    .await?;
                let names = doc
                    .array_field("versions")
                    .iter()
                    .filter_map(|v| v.get("name").and_then(Value::as_str).map(str::to_string))
                    .collect::<Vec<_>>();
                Ok::<_, Error>(names)
            }))
            .await?;

            for (group, versions) in groups.iter().zip(versions) {
                let versions: Vec<&str> = versions.iter().map(String::as_str).collect();
                catalog = catalog.with_version_group(generation, group, &versions);
            }
        }

        if let Err(e) = self.add_regional_pokedexes(&mut catalog).await {
            warn!("Regional Pokédex mapping unavailable: {}", e);
        }

        info!(
            "Catalog: {} generations, {} version groups",
            latest,
            catalog.version_group_count()
        );
        Ok(catalog)
    }

    /// Record the first main-series regional dex of each generation.
    async fn add_regional_pokedexes(&self, catalog: &mut GenerationCatalog) -> Result<()> {
        let listing = self.fetch_url(&self.endpoint_url("pokedex?limit=100")).await?;
        let urls: Vec<String> = listing
            .array_field("results")
            .iter()
            .filter_map(|r| r.get("url").and_then(Value::as_str).map(str::to_string))
            .collect();
        let dexes = try_join_all(urls.iter().map(|url| self.fetch_url(url))).await?;

        let mut ordered: Vec<&Document> = dexes.iter().map(AsRef::as_ref).collect();
        ordered.sort_by_key(|dex| dex.id());
        for dex in ordered {
            let main_series = dex
                .field("is_main_series")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let first_group = dex
                .array_field("version_groups")
                .first()
                .and_then(|vg| vg.get("name"))
                .and_then(Value::as_str);
            let (true, Some(group), Some(name)) = (main_series, first_group, dex.name()) else {
                continue;
            };
            if let Some(generation) = catalog.generation_of_version_group(group) {
                catalog.add_regional_pokedex(generation, name);
            }
        }
        Ok(())
    }
}

/// Version groups, versions and regional dexes per generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationCatalog {
    latest: Generation,
    version_groups: BTreeMap<Generation, Vec<String>>,
    versions: BTreeMap<Generation, Vec<String>>,
    group_generation: HashMap<String, Generation>,
    version_generation: HashMap<String, Generation>,
    regional_pokedex: BTreeMap<Generation, String>,
}

impl GenerationCatalog {
    /// Empty catalog for a run whose latest generation is `latest`.
    pub fn new(latest: Generation) -> Self {
        Self {
            latest,
            version_groups: BTreeMap::new(),
            versions: BTreeMap::new(),
            group_generation: HashMap::new(),
            version_generation: HashMap::new(),
            regional_pokedex: BTreeMap::new(),
        }
    }

    /// Register a version group and its versions.
    #[must_use]
    pub fn with_version_group(
        mut self,
        generation: Generation,
        group: &str,
        versions: &[&str],
    ) -> Self {
        self.version_groups
            .entry(generation)
            .or_default()
            .push(group.to_string());
        self.group_generation.insert(group.to_string(), generation);
        for version in versions {
            self.versions
                .entry(generation)
                .or_default()
                .push((*version).to_string());
            self.version_generation.insert((*version).to_string(), generation);
        }
        self
    }

    /// Register the main regional dex of a generation; the first one wins.
    pub fn add_regional_pokedex(&mut self, generation: Generation, pokedex: &str) {
        self.regional_pokedex
            .entry(generation)
            .or_insert_with(|| pokedex.to_string());
    }

    /// Most recent generation.
    pub const fn latest(&self) -> Generation {
        self.latest
    }

    /// Version groups released in `generation`.
    pub fn version_groups(&self, generation: Generation) -> &[String] {
        self.version_groups.get(&generation).map_or(&[], Vec::as_slice)
    }

    /// Game versions released in `generation`.
    pub fn versions(&self, generation: Generation) -> &[String] {
        self.versions.get(&generation).map_or(&[], Vec::as_slice)
    }

    /// Generation a version group belongs to.
    pub fn generation_of_version_group(&self, group: &str) -> Option<Generation> {
        self.group_generation.get(group).copied()
    }

    /// Generation a game version belongs to.
    pub fn generation_of_version(&self, version: &str) -> Option<Generation> {
        self.version_generation.get(version).copied()
    }

    /// Generation whose main regional dex is `pokedex`.
    pub fn regional_pokedex_generation(&self, pokedex: &str) -> Option<Generation> {
        self.regional_pokedex
            .iter()
            .find(|(_, name)| name.as_str() == pokedex)
            .map(|(generation, _)| *generation)
    }

    /// Total number of version groups.
    pub fn version_group_count(&self) -> usize {
        self.group_generation.len()
    }

    /// Generation of a named reference to a version group (`{"version_group": {...}}`).
    pub fn generation_of_group_ref(&self, node: &Value, key: &str) -> Option<Generation> {
        ref_name(node, key).and_then(|name| self.generation_of_version_group(name))
    }
}

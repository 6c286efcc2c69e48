//! Resolves natural-language capability requests to catalog tools.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use agent_memory::{Embedder, IndexEntry, MemoryResult, SemanticIndex};
use agent_tools::{ToolCatalog, ToolDescriptor};
use thiserror::Error;
use tracing::debug;

/// Why a capability description could not be resolved.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The index named an entry the catalog does not know.
    #[error("no function found for '{description}': index returned unknown tool `{name}`")]
    NotFound {
        /// Description as supplied by the model.
        description: String,
        /// Name returned by the index.
        name: String,
    },

    /// The index failed, or its best match was below the configured threshold.
    #[error("no function found for '{description}': {reason}")]
    Index {
        /// Description as supplied by the model.
        description: String,
        /// Underlying failure.
        reason: String,
    },
}

/// Result alias for resolution.
pub type ResolutionResult<T> = Result<T, ResolutionError>;

const DEFAULT_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(256).unwrap();

/// Description-to-tool memo that evicts its oldest entry once full.
#[derive(Debug)]
struct ResolutionCache {
    capacity: NonZeroUsize,
    entries: HashMap<String, Arc<ToolDescriptor>>,
    order: VecDeque<String>,
}

impl ResolutionCache {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, description: &str) -> Option<Arc<ToolDescriptor>> {
        self.entries.get(description).cloned()
    }

    fn insert(&mut self, description: &str, descriptor: Arc<ToolDescriptor>) {
        if self.entries.insert(description.to_owned(), descriptor).is_some() {
            return;
        }
        self.order.push_back(description.to_owned());
        while self.order.len() > self.capacity.get() {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// Turns a capability description into one catalog tool.
///
/// Catalog and index are read-only and shared; the optional cache only
/// remembers identical description strings, up to a fixed number of them.
pub struct CapabilityResolver {
    catalog: Arc<ToolCatalog>,
    index: Arc<SemanticIndex>,
    cache: Option<Mutex<ResolutionCache>>,
}

impl fmt::Debug for CapabilityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityResolver")
            .field("tools", &self.catalog.len())
            .field("index", &self.index)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl CapabilityResolver {
    /// Creates a resolver over an existing catalog and index.
    #[must_use]
    pub fn new(catalog: Arc<ToolCatalog>, index: Arc<SemanticIndex>) -> Self {
        Self {
            catalog,
            index,
            cache: None,
        }
    }

    /// Builds the index from the catalog descriptions with `embedder`.
    ///
    /// # Errors
    ///
    /// Propagates index build failures (empty catalog, embedding errors).
    pub async fn from_catalog(
        catalog: Arc<ToolCatalog>,
        embedder: Arc<dyn Embedder>,
    ) -> MemoryResult<Self> {
        Self::with_threshold(catalog, embedder, None).await
    }

    /// Like [`CapabilityResolver::from_catalog`], rejecting best matches that
    /// score below `min_similarity` when one is given.
    ///
    /// # Errors
    ///
    /// Propagates index build failures and out-of-range thresholds.
    pub async fn with_threshold(
        catalog: Arc<ToolCatalog>,
        embedder: Arc<dyn Embedder>,
        min_similarity: Option<f32>,
    ) -> MemoryResult<Self> {
        let mut index = SemanticIndex::build(index_entries(&catalog), embedder).await?;
        if let Some(threshold) = min_similarity {
            index = index.with_min_similarity(threshold)?;
        }
        Ok(Self::new(catalog, Arc::new(index)))
    }

    /// Builds a lexical index fitted on the catalog descriptions.
    ///
    /// # Errors
    ///
    /// Propagates index build failures.
    pub async fn lexical(catalog: Arc<ToolCatalog>) -> MemoryResult<Self> {
        let index = SemanticIndex::lexical(index_entries(&catalog)).await?;
        Ok(Self::new(catalog, Arc::new(index)))
    }

    /// Remembers resolutions of the 256 most recently resolved description
    /// strings.
    #[must_use]
    pub fn with_cache(self) -> Self {
        self.with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Remembers resolutions of up to `capacity` description strings; the
    /// oldest entry is dropped first.
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.cache = Some(Mutex::new(ResolutionCache::new(capacity)));
        self
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    /// Returns the index.
    #[must_use]
    pub fn index(&self) -> &Arc<SemanticIndex> {
        &self.index
    }

    /// Resolves `description` to the nearest catalog tool.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::Index`] when the index fails or rejects the
    /// best match, and [`ResolutionError::NotFound`] when the matched name is
    /// not in the catalog.
    ///
    /// # Panics
    ///
    /// Panics if the cache mutex has been poisoned by a previous panic.
    pub async fn resolve(&self, description: &str) -> ResolutionResult<Arc<ToolDescriptor>> {
        if let Some(cache) = &self.cache {
            let cached = cache
                .lock()
                .expect("resolver cache poisoned")
                .get(description);
            if let Some(descriptor) = cached {
                debug!(description, tool = descriptor.name(), "resolution cache hit");
                return Ok(descriptor);
            }
        }

        let hit = self
            .index
            .query(description)
            .await
            .map_err(|err| ResolutionError::Index {
                description: description.to_owned(),
                reason: err.to_string(),
            })?;

        let descriptor = self
            .catalog
            .find_by_name(&hit.name)
            .cloned()
            .ok_or_else(|| ResolutionError::NotFound {
                description: description.to_owned(),
                name: hit.name.clone(),
            })?;
        debug!(description, tool = %hit.name, score = hit.score, "capability resolved");

        if let Some(cache) = &self.cache {
            cache
                .lock()
                .expect("resolver cache poisoned")
                .insert(description, Arc::clone(&descriptor));
        }
        Ok(descriptor)
    }
}

fn index_entries(catalog: &ToolCatalog) -> Vec<IndexEntry> {
    catalog
        .list()
        .iter()
        .map(|tool| IndexEntry::new(tool.id().as_str(), tool.name(), tool.description()))
        .collect()
}

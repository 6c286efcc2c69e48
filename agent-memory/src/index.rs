//! Nearest-neighbour index over capability descriptions.

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::embedder::{Embedder, LexicalEmbedder};
use crate::error::{MemoryError, MemoryResult};
use crate::vector_store_api::{LocalVectorStore, VectorMatch, VectorPoint, VectorQuery, VectorStoreClient};

/// Input to [`SemanticIndex::build`]: one searchable description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    id: String,
    name: String,
    description: String,
}

impl IndexEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }

    /// Returns the entry id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the metadata name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the embedded description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A ranked match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    /// Entry id.
    pub id: String,
    /// Entry name taken from the stored metadata.
    pub name: String,
    /// Cosine similarity between the query and the entry.
    pub score: f32,
}

impl TryFrom<VectorMatch> for IndexHit {
    type Error = MemoryError;

    fn try_from(matched: VectorMatch) -> MemoryResult<Self> {
        let name = matched
            .metadata()
            .get("name")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                MemoryError::vector_store(format!("entry `{}` has no name", matched.id()))
            })?
            .to_owned();
        Ok(Self {
            id: matched.id().to_owned(),
            name,
            score: matched.score(),
        })
    }
}

/// Semantic index built once and read-only afterwards.
///
/// Queries always return the nearest entry unless a minimum similarity is
/// configured, in which case a weaker best match is reported as
/// [`MemoryError::NoMatch`].
pub struct SemanticIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStoreClient>,
    len: usize,
    min_similarity: Option<f32>,
}

impl fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("len", &self.len)
            .field("min_similarity", &self.min_similarity)
            .finish_non_exhaustive()
    }
}

impl SemanticIndex {
    /// Builds an index in a fresh [`LocalVectorStore`].
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::EmptyIndex`] for an empty entry list,
    /// [`MemoryError::DuplicateEntry`] when ids collide, and propagates
    /// embedding failures.
    pub async fn build(entries: Vec<IndexEntry>, embedder: Arc<dyn Embedder>) -> MemoryResult<Self> {
        Self::build_with_store(entries, embedder, Arc::new(LocalVectorStore::new())).await
    }

    /// Builds an index with a [`LexicalEmbedder`] fitted on the entry
    /// descriptions.
    ///
    /// # Errors
    ///
    /// Same as [`SemanticIndex::build`], plus fitting failures.
    pub async fn lexical(entries: Vec<IndexEntry>) -> MemoryResult<Self> {
        if entries.is_empty() {
            return Err(MemoryError::EmptyIndex);
        }
        let embedder = LexicalEmbedder::fit(entries.iter().map(IndexEntry::description))?;
        Self::build(entries, Arc::new(embedder)).await
    }

    /// Builds an index into the supplied store.
    ///
    /// # Errors
    ///
    /// Same as [`SemanticIndex::build`], plus store failures.
    pub async fn build_with_store(
        entries: Vec<IndexEntry>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStoreClient>,
    ) -> MemoryResult<Self> {
        if entries.is_empty() {
            return Err(MemoryError::EmptyIndex);
        }

        let mut ids = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !ids.insert(entry.id.as_str()) {
                return Err(MemoryError::DuplicateEntry {
                    id: entry.id.clone(),
                });
            }
        }

        let descriptions: Vec<String> = entries
            .iter()
            .map(|entry| entry.description.clone())
            .collect();
        let vectors = embedder.embed_batch(&descriptions).await?;
        if vectors.len() != entries.len() {
            return Err(MemoryError::embedding(format!(
                "embedder returned {} vectors for {} entries",
                vectors.len(),
                entries.len()
            )));
        }

        let len = entries.len();
        for (entry, vector) in entries.into_iter().zip(vectors) {
            let point = VectorPoint::new(entry.id, vector)
                .with_metadata(json!({ "name": entry.name }));
            store.upsert(point).await?;
        }
        debug!(entries = len, "semantic index built");

        Ok(Self {
            embedder,
            store,
            len,
            min_similarity: None,
        })
    }

    /// Rejects best matches scoring below `threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] when `threshold` lies outside
    /// `[-1, 1]`.
    pub fn with_min_similarity(mut self, threshold: f32) -> MemoryResult<Self> {
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(MemoryError::InvalidConfig(
                "minimum similarity must lie within [-1, 1]",
            ));
        }
        self.min_similarity = Some(threshold);
        Ok(self)
    }

    /// Returns the configured threshold.
    #[must_use]
    pub const fn min_similarity(&self) -> Option<f32> {
        self.min_similarity
    }

    /// Returns the number of indexed entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: empty indexes cannot be built.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the nearest entry to `text`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NoMatch`] when a threshold is configured and the
    /// best score falls below it; propagates embedding and store failures.
    pub async fn query(&self, text: &str) -> MemoryResult<IndexHit> {
        let best = self
            .query_top(text, NonZeroUsize::MIN)
            .await?
            .into_iter()
            .next()
            .ok_or(MemoryError::EmptyIndex)?;

        if let Some(threshold) = self.min_similarity {
            if best.score < threshold {
                return Err(MemoryError::NoMatch {
                    best: best.score,
                    threshold,
                });
            }
        }

        debug!(query = text, id = %best.id, score = best.score, "semantic match");
        Ok(best)
    }

    /// Returns up to `k` entries ranked by descending similarity. Equal scores
    /// keep build order. The threshold is not applied.
    ///
    /// # Errors
    ///
    /// Propagates embedding and store failures.
    pub async fn query_top(&self, text: &str, k: NonZeroUsize) -> MemoryResult<Vec<IndexHit>> {
        let embedding = self.embedder.embed(text).await?;
        let matches = self.store.query(VectorQuery::new(embedding, k)).await?;
        matches.into_iter().map(IndexHit::try_from).collect()
    }
}

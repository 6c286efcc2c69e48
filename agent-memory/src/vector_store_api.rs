//! Vector store traits and a local in-memory implementation.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::MemoryResult;
use crate::embeddings::EmbeddingVector;

/// Record stored in a vector database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    id: String,
    embedding: EmbeddingVector,
    #[serde(default)]
    metadata: Value,
}

impl VectorPoint {
    /// Creates a new vector point without metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, embedding: EmbeddingVector) -> Self {
        Self {
            id: id.into(),
            embedding,
            metadata: Value::Null,
        }
    }

    /// Assigns metadata to the point.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the embedding reference.
    #[must_use]
    pub fn embedding(&self) -> &EmbeddingVector {
        &self.embedding
    }

    /// Returns the metadata payload.
    #[must_use]
    pub fn metadata(&self) -> &Value {
        &self.metadata
    }
}

/// Query parameters for retrieving similar vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorQuery {
    embedding: EmbeddingVector,
    top_k: NonZeroUsize,
}

impl VectorQuery {
    /// Creates a new query request.
    #[must_use]
    pub fn new(embedding: EmbeddingVector, top_k: NonZeroUsize) -> Self {
        Self { embedding, top_k }
    }

    /// Returns the embedding driving the query.
    #[must_use]
    pub fn embedding(&self) -> &EmbeddingVector {
        &self.embedding
    }

    /// Returns the desired number of results.
    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k.get()
    }
}

/// Match returned from a vector store query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Value,
}

impl VectorMatch {
    /// Creates a match structure.
    #[must_use]
    pub fn new(id: impl Into<String>, score: f32, metadata: Value) -> Self {
        Self {
            id: id.into(),
            score,
            metadata,
        }
    }

    /// Returns the identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns cosine similarity score.
    #[must_use]
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Returns metadata payload.
    #[must_use]
    pub fn metadata(&self) -> &Value {
        &self.metadata
    }
}

/// Interface for vector store clients.
#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    /// Inserts or updates a vector point.
    async fn upsert(&self, point: VectorPoint) -> MemoryResult<()>;

    /// Executes a similarity query and returns matches ordered by descending
    /// score. Equal scores keep insertion order.
    async fn query(&self, query: VectorQuery) -> MemoryResult<Vec<VectorMatch>>;

    /// Returns the number of stored points.
    async fn len(&self) -> usize;
}

/// Simple in-memory vector store using cosine similarity.
///
/// Points are kept in insertion order; an upsert of an existing id replaces
/// the point in place.
#[derive(Default)]
pub struct LocalVectorStore {
    points: RwLock<Vec<VectorPoint>>,
}

impl LocalVectorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStoreClient for LocalVectorStore {
    async fn upsert(&self, point: VectorPoint) -> MemoryResult<()> {
        let mut guard = self.points.write().await;
        match guard.iter_mut().find(|existing| existing.id == point.id) {
            Some(existing) => *existing = point,
            None => guard.push(point),
        }
        Ok(())
    }

    async fn query(&self, query: VectorQuery) -> MemoryResult<Vec<VectorMatch>> {
        let guard = self.points.read().await;
        let query_embedding = query.embedding();

        let mut matches: Vec<VectorMatch> = guard
            .iter()
            .filter(|point| point.embedding().len() == query_embedding.len())
            .map(|point| {
                VectorMatch::new(
                    point.id(),
                    point.embedding().cosine_similarity(query_embedding),
                    point.metadata().clone(),
                )
            })
            .collect();

        // stable sort: ties keep insertion order
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(query.top_k());
        Ok(matches)
    }

    async fn len(&self) -> usize {
        self.points.read().await.len()
    }
}

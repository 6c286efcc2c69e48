//! Semantic lookup for agent capabilities.
//!
//! Descriptions are embedded once into a vector store; free-text queries are
//! embedded the same way and answered with the nearest entry by cosine
//! similarity.

#![warn(missing_docs, clippy::pedantic)]

pub mod embedder;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod vector_store_api;

pub use embedder::{Embedder, LexicalEmbedder, tokenize};
pub use embeddings::EmbeddingVector;
pub use error::{MemoryError, MemoryResult};
pub use index::{IndexEntry, IndexHit, SemanticIndex};
pub use vector_store_api::{LocalVectorStore, VectorMatch, VectorPoint, VectorQuery, VectorStoreClient};

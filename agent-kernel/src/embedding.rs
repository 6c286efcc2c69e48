//! Bridges provider embedding adapters onto the index [`Embedder`] trait.

use std::fmt;
use std::sync::Arc;

use agent_adapters::traits::EmbeddingAdapter;
use agent_memory::{Embedder, EmbeddingVector, MemoryError, MemoryResult};
use async_trait::async_trait;

/// [`Embedder`] backed by a remote [`EmbeddingAdapter`].
#[derive(Clone)]
pub struct AdapterEmbedder {
    adapter: Arc<dyn EmbeddingAdapter>,
}

impl fmt::Debug for AdapterEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metadata = self.adapter.embedding_metadata();
        f.debug_struct("AdapterEmbedder")
            .field("provider", &metadata.provider())
            .field("model", &metadata.model())
            .finish()
    }
}

impl AdapterEmbedder {
    /// Wraps `adapter`.
    #[must_use]
    pub fn new(adapter: Arc<dyn EmbeddingAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Embedder for AdapterEmbedder {
    async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector> {
        self.embed_batch(&[text.to_owned()])
            .await?
            .pop()
            .ok_or_else(|| MemoryError::embedding("provider returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> MemoryResult<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self
            .adapter
            .embed(texts)
            .await
            .map_err(|err| MemoryError::embedding(err.to_string()))?;
        if vectors.len() != texts.len() {
            return Err(MemoryError::embedding(format!(
                "provider returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        vectors.into_iter().map(EmbeddingVector::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_adapters::traits::{AdapterError, AdapterMetadata, AdapterResult};

    struct FixedAdapter {
        metadata: AdapterMetadata,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingAdapter for FixedAdapter {
        fn embedding_metadata(&self) -> &AdapterMetadata {
            &self.metadata
        }

        #[allow(clippy::cast_precision_loss)]
        async fn embed(&self, inputs: &[String]) -> AdapterResult<Vec<Vec<f32>>> {
            if self.fail {
                return Err(AdapterError::transport("connection refused"));
            }
            Ok(inputs
                .iter()
                .map(|input| vec![input.len() as f32, 1.0])
                .collect())
        }
    }

    fn embedder(fail: bool) -> AdapterEmbedder {
        AdapterEmbedder::new(Arc::new(FixedAdapter {
            metadata: AdapterMetadata::new("test", "fixed"),
            fail,
        }))
    }

    #[tokio::test]
    async fn embeds_in_order() {
        let vectors = embedder(false)
            .embed_batch(&["ab".to_owned(), "abcd".to_owned()])
            .await
            .unwrap();
        assert_eq!(vectors[0].as_slice(), [2.0, 1.0]);
        assert_eq!(vectors[1].as_slice(), [4.0, 1.0]);

        let single = embedder(false).embed("abc").await.unwrap();
        assert_eq!(single.as_slice(), [3.0, 1.0]);
    }

    #[tokio::test]
    async fn adapter_failures_become_embedding_errors() {
        let err = embedder(true).embed("abc").await.expect_err("transport");
        assert!(matches!(err, MemoryError::Embedding { .. }));
    }
}

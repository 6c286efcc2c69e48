//! Text embedders.
//!
//! [`LexicalEmbedder`] is a local, deterministic TF-IDF embedder fitted on a
//! fixed corpus (typically the catalog descriptions). Remote embedders live in
//! the kernel, which bridges provider adapters onto [`Embedder`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::embeddings::EmbeddingVector;
use crate::error::{MemoryError, MemoryResult};

/// Turns text into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a single text.
    async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector>;

    /// Embeds every text, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> MemoryResult<Vec<EmbeddingVector>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

const STOPWORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "could", "do",
    "does", "for", "from", "has", "have", "how", "i", "if", "in", "into", "is", "it", "its", "me",
    "my", "of", "on", "or", "our", "please", "should", "so", "some", "than", "that", "the",
    "their", "them", "then", "there", "these", "this", "those", "to", "us", "was", "we", "what",
    "when", "where", "which", "who", "will", "with", "would", "you", "your",
];

/// Splits text into normalised terms.
///
/// Terms are lower-cased alphanumeric runs of at least two characters with
/// stop-words removed and a trailing plural `s` folded (`benefits` and
/// `benefit` share a term).
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| token.chars().nth(1).is_some())
        .map(str::to_lowercase)
        .filter(|token| !STOPWORDS.contains(&token.as_str()))
        .map(|mut token| {
            if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
                token.pop();
            }
            token
        })
        .collect()
}

/// TF-IDF embedder with a vocabulary fixed at construction.
///
/// Dimensions follow first-seen term order in the fitting corpus. Inverse
/// document frequency uses the smoothed form `ln((1 + n) / (1 + df)) + 1`, so
/// terms that appear everywhere still carry weight. Terms outside the
/// vocabulary are ignored; a text with no known terms embeds to the zero
/// vector, which scores `0.0` against everything.
#[derive(Clone, Debug)]
pub struct LexicalEmbedder {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
}

impl LexicalEmbedder {
    /// Fits the vocabulary and document frequencies on `corpus`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] when the corpus yields no terms.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit<'a, I>(corpus: I) -> MemoryResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();
        let mut documents = 0_usize;

        for document in corpus {
            documents += 1;
            let mut seen = vec![false; document_frequency.len()];
            for term in tokenize(document) {
                let next = vocabulary.len();
                let index = *vocabulary.entry(term).or_insert(next);
                if index == document_frequency.len() {
                    document_frequency.push(0);
                    seen.push(false);
                }
                if !seen[index] {
                    seen[index] = true;
                    document_frequency[index] += 1;
                }
            }
        }

        if vocabulary.is_empty() {
            return Err(MemoryError::InvalidConfig(
                "lexical embedder corpus contains no terms",
            ));
        }

        let n = documents as f32;
        let idf = document_frequency
            .into_iter()
            .map(|df| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        Ok(Self { vocabulary, idf })
    }

    /// Returns the vocabulary size (the embedding dimension).
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.idf.len()
    }

    /// Embeds `text` synchronously.
    ///
    /// # Errors
    ///
    /// Propagates [`EmbeddingVector::new`] failures, which cannot occur for a
    /// fitted vocabulary.
    pub fn embed_text(&self, text: &str) -> MemoryResult<EmbeddingVector> {
        let mut weights = vec![0.0_f32; self.idf.len()];
        for term in tokenize(text) {
            if let Some(&index) = self.vocabulary.get(&term) {
                weights[index] += self.idf[index];
            }
        }
        EmbeddingVector::new(weights)
    }
}

#[async_trait]
impl Embedder for LexicalEmbedder {
    async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector> {
        self.embed_text(text)
    }
}

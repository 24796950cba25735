//! Author relevance derived from article embeddings.
//!
//! Two operations answer two different questions:
//!
//! - [`Aggregator::centroid`] averages an author's article embeddings. The
//!   store indexes these centroids so authors can be searched like articles.
//!   An author whose average article is on topic ranks high.
//! - [`Aggregator::weighted_search_author`] scores every author at query time
//!   as `Σ shape(query · article) * weight(article)` over that author's
//!   articles. One strongly relevant article is enough to rank an author,
//!   however unrelated the rest of their work is, and the sum rewards
//!   authors with several relevant articles.
//!
//! Weighted search reads live catalog data, so it is correct even when the
//! centroid index is stale.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::records::{Article, Author, AuthorId, Catalog};
use crate::vector::{dot, mean};

/// Per-article weight used by weighted author search.
pub trait ArticleWeight: Send + Sync {
    fn weight(&self, article: &Article) -> f32;
}

impl<F> ArticleWeight for F
where
    F: Fn(&Article) -> f32 + Send + Sync,
{
    fn weight(&self, article: &Article) -> f32 {
        self(article)
    }
}

/// Every article counts once.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformWeight;

impl ArticleWeight for UniformWeight {
    fn weight(&self, _article: &Article) -> f32 {
        1.0
    }
}

/// `1 + ln(1 + citations)`; articles without a known count weigh 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct CitationWeight;

impl ArticleWeight for CitationWeight {
    fn weight(&self, article: &Article) -> f32 {
        let citations = article.citation_count().unwrap_or(0) as f32;
        1.0 + citations.ln_1p()
    }
}

/// Configuration selector for the built-in weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightingKind {
    #[default]
    Uniform,
    Citations,
}

impl WeightingKind {
    #[must_use]
    pub fn into_weight(self) -> Arc<dyn ArticleWeight> {
        match self {
            Self::Uniform => Arc::new(UniformWeight),
            Self::Citations => Arc::new(CitationWeight),
        }
    }
}

/// Reshapes raw similarities before they are summed.
///
/// Similarities under `min_similarity` contribute nothing; the rest are
/// raised to `exponent`, which sharpens the gap between strongly and weakly
/// relevant articles. The default (no cutoff, exponent 1) is the plain sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceShaping {
    pub min_similarity: Option<f32>,
    pub exponent: i32,
}

impl Default for RelevanceShaping {
    fn default() -> Self {
        Self {
            min_similarity: None,
            exponent: 1,
        }
    }
}

impl RelevanceShaping {
    #[must_use]
    pub fn apply(&self, similarity: f32) -> f32 {
        match self.min_similarity {
            Some(min) if similarity < min => 0.0,
            _ => similarity.powi(self.exponent),
        }
    }
}

/// Ranked author from weighted search.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorScore {
    pub author_id: AuthorId,
    pub score: f32,
}

/// Derives author-level vectors and scores from article embeddings.
#[derive(Clone)]
pub struct Aggregator {
    weight: Arc<dyn ArticleWeight>,
    shaping: RelevanceShaping,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Arc::new(UniformWeight), RelevanceShaping::default())
    }
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("weight", &"<dyn ArticleWeight>")
            .field("shaping", &self.shaping)
            .finish()
    }
}

impl Aggregator {
    pub fn new(weight: Arc<dyn ArticleWeight>, shaping: RelevanceShaping) -> Self {
        Self { weight, shaping }
    }

    /// Same shaping, different weight.
    #[must_use]
    pub fn with_weight(&self, weight: Arc<dyn ArticleWeight>) -> Self {
        Self {
            weight,
            shaping: self.shaping,
        }
    }

    #[must_use]
    pub fn shaping(&self) -> RelevanceShaping {
        self.shaping
    }

    /// Unweighted mean of the author's article embeddings.
    pub fn centroid(&self, catalog: &Catalog, author: &Author) -> StoreResult<Vec<f32>> {
        let embeddings: Vec<&[f32]> = catalog
            .articles_of(author)
            .map(Article::embedding)
            .collect();
        if embeddings.is_empty() {
            return Err(StoreError::EmptyAuthor {
                author_id: author.id().to_string(),
            });
        }
        Ok(mean(&embeddings)?)
    }

    /// Ranks every author by weighted summed article similarity.
    ///
    /// Authors without articles score 0. Equal scores keep catalog order.
    pub fn weighted_search_author(
        &self,
        catalog: &Catalog,
        query: &[f32],
        top_k: usize,
    ) -> StoreResult<Vec<AuthorScore>> {
        if top_k == 0 {
            return Err(StoreError::InvalidTopK(top_k));
        }

        let mut scored = Vec::with_capacity(catalog.author_count());
        for (position, author) in catalog.authors().enumerate() {
            let mut score = 0.0f32;
            for article in catalog.articles_of(author) {
                let similarity = dot(query, article.embedding())?;
                score += self.shaping.apply(similarity) * self.weight.weight(article);
            }
            scored.push((position, author.id(), score));
        }

        scored.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(_, author_id, score)| AuthorScore {
                author_id: author_id.clone(),
                score,
            })
            .collect())
    }
}

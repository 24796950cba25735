//! Citation count enrichment from a bibliographic source.
//!
//! Lookups run on the worker pool; results are applied to the catalog
//! afterwards. A lookup that returns a count overwrites the stored one. A
//! lookup that finds nothing, or fails, leaves the stored count as it was,
//! so a transient outage never erases known data.

use thiserror::Error;

use crate::ingest::WorkerPool;
use crate::records::{ArticleId, Catalog};

/// Failure of a single lookup.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Citation lookup for '{article_id}' failed: {reason}")]
pub struct LookupError {
    pub article_id: String,
    pub reason: String,
}

impl LookupError {
    pub fn new(article_id: &ArticleId, reason: impl Into<String>) -> Self {
        Self {
            article_id: article_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Source of citation counts, e.g. a DOI registry client.
pub trait CitationSource: Send + Sync {
    /// `Ok(None)` means the source has no count for this article.
    fn lookup_citations(&self, article_id: &ArticleId) -> Result<Option<u32>, LookupError>;
}

impl<F> CitationSource for F
where
    F: Fn(&ArticleId) -> Result<Option<u32>, LookupError> + Send + Sync,
{
    fn lookup_citations(&self, article_id: &ArticleId) -> Result<Option<u32>, LookupError> {
        self(article_id)
    }
}

/// Outcome of one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichReport {
    /// Articles whose count was overwritten.
    pub updated: usize,
    /// Articles the source had no count for.
    pub unchanged: usize,
    pub failures: Vec<LookupError>,
}

/// Looks up every id on the pool. Output order matches `ids`.
pub fn lookup_all(
    pool: &WorkerPool,
    source: &dyn CitationSource,
    ids: Vec<ArticleId>,
) -> Vec<(ArticleId, Result<Option<u32>, LookupError>)> {
    pool.map(ids, |id| {
        let result = source.lookup_citations(&id);
        (id, result)
    })
}

/// Writes lookup results into the catalog.
///
/// Articles removed from the catalog since the lookup started are skipped.
pub fn apply_lookups(
    catalog: &mut Catalog,
    lookups: Vec<(ArticleId, Result<Option<u32>, LookupError>)>,
) -> EnrichReport {
    let mut report = EnrichReport::default();
    for (id, result) in lookups {
        match result {
            Ok(Some(count)) => {
                if catalog.set_citation_count(&id, Some(count)).is_ok() {
                    report.updated += 1;
                } else {
                    tracing::debug!("Article '{id}' left the catalog during enrichment");
                }
            }
            Ok(None) => report.unchanged += 1,
            Err(error) => {
                tracing::warn!("{error}");
                report.failures.push(error);
            }
        }
    }
    tracing::info!(
        "Citation enrichment: {} updated, {} unchanged, {} failed",
        report.updated,
        report.unchanged,
        report.failures.len()
    );
    report
}

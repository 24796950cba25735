//! Top-k inner-product indexes over (identity, vector, payload) entries.
//!
//! Indexes follow a bulk-load-then-index lifecycle: [`VectorIndex::insert_batch`]
//! stages entries, [`VectorIndex::build`] snapshots the staged set into search
//! structures. Searches only ever see the last built snapshot, so a batch
//! inserted after a build stays invisible until the next build.
//!
//! Two strategies share the contract:
//!
//! - [`FlatIndex`] scans every row of a contiguous matrix. Exact.
//! - [`IvfIndex`] partitions rows into k-means lists and scans only the
//!   `nprobe` lists whose centroids are closest to the query. Recall drops
//!   when a true neighbor sits in an unprobed list; ordering, `top_k` and
//!   tie-breaking still hold for the candidates it does scan. With
//!   `nprobe >= nlist` every list is scanned and results equal [`FlatIndex`].
//!
//! Ranking is by descending inner product. Equal scores keep insertion order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::vector::clustering::kmeans_clustering;
use crate::vector::math::{cosine_similarity, dot_unchecked};
use crate::vector::{VectorDimension, VectorError};

/// Minimum number of IVF lists.
const MIN_CLUSTERS: usize = 1;

/// Maximum number of IVF lists.
const MAX_CLUSTERS: usize = 100;

/// Queryable fields stored next to a vector.
pub type Payload = BTreeMap<String, String>;

/// One row handed to an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

impl IndexEntry {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            payload: Payload::new(),
        }
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

/// Index strategy selector used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Flat,
    Ivf,
}

/// Tuning knobs for [`IvfIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvfParams {
    /// Number of lists; `None` picks `ceil(sqrt(n))` clamped to `[1, 100]`.
    pub nlist: Option<usize>,
    /// Number of lists scanned per query.
    pub nprobe: usize,
    /// Seed for k-means initialization.
    pub seed: u64,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            nlist: None,
            nprobe: 4,
            seed: 0x5eed,
        }
    }
}

/// Common contract of every index strategy.
pub trait VectorIndex: Send + Sync + fmt::Debug {
    /// Dimension every entry and query must have.
    fn dimension(&self) -> VectorDimension;

    /// Stages entries, replacing any staged entry with the same identity in
    /// place. The whole batch is validated first; a rejected batch leaves
    /// the index untouched.
    fn insert_batch(&mut self, entries: Vec<IndexEntry>) -> Result<(), VectorError>;

    /// Discards the current search structures and rebuilds them from the
    /// staged entries.
    fn build(&mut self) -> Result<(), VectorError>;

    /// Returns at most `top_k` hits from the last build, best first.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, VectorError>;

    /// Drops all staged entries. The built snapshot is kept until the next
    /// build.
    fn clear(&mut self);

    /// Number of staged entries.
    fn len(&self) -> usize;

    /// Number of entries visible to search.
    fn indexed_len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the staged entry set wholesale and builds.
    fn rebuild(&mut self, entries: Vec<IndexEntry>) -> Result<(), VectorError> {
        for entry in &entries {
            self.dimension().validate_vector(&entry.vector)?;
        }
        self.clear();
        self.insert_batch(entries)?;
        self.build()
    }
}

/// Creates an empty index of the requested strategy.
#[must_use]
pub fn create_index(
    kind: IndexKind,
    dimension: VectorDimension,
    ivf: IvfParams,
) -> Box<dyn VectorIndex> {
    match kind {
        IndexKind::Flat => Box::new(FlatIndex::new(dimension)),
        IndexKind::Ivf => Box::new(IvfIndex::new(dimension, ivf)),
    }
}

/// Insertion-ordered staging area shared by both strategies.
#[derive(Debug, Default)]
struct EntrySet {
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

impl EntrySet {
    fn upsert_batch(
        &mut self,
        dimension: VectorDimension,
        entries: Vec<IndexEntry>,
    ) -> Result<(), VectorError> {
        for entry in &entries {
            dimension.validate_vector(&entry.vector)?;
        }
        for entry in entries {
            match self.positions.get(&entry.id) {
                Some(&position) => self.entries[position] = entry,
                None => {
                    self.positions.insert(entry.id.clone(), self.entries.len());
                    self.entries.push(entry);
                }
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    /// Copies the staged entries into an immutable row-major snapshot.
    fn snapshot(&self, dimension: VectorDimension) -> Snapshot {
        let mut matrix = Vec::with_capacity(self.entries.len() * dimension.get());
        let mut ids = Vec::with_capacity(self.entries.len());
        let mut payloads = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            matrix.extend_from_slice(&entry.vector);
            ids.push(entry.id.clone());
            payloads.push(entry.payload.clone());
        }
        Snapshot {
            dimension: dimension.get(),
            matrix,
            ids,
            payloads,
        }
    }
}

/// Built rows, in insertion order.
#[derive(Debug, Default)]
struct Snapshot {
    dimension: usize,
    matrix: Vec<f32>,
    ids: Vec<String>,
    payloads: Vec<Payload>,
}

impl Snapshot {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.matrix[start..start + self.dimension]
    }

    /// Scores the given rows and returns the best `top_k` as hits.
    fn rank(
        &self,
        query: &[f32],
        positions: impl Iterator<Item = usize>,
        top_k: usize,
    ) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = positions
            .map(|position| (position, dot_unchecked(query, self.row(position))))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(position, score)| SearchHit {
                id: self.ids[position].clone(),
                score,
                payload: self.payloads[position].clone(),
            })
            .collect()
    }
}

fn validate_query(
    dimension: VectorDimension,
    query: &[f32],
    top_k: usize,
) -> Result<(), VectorError> {
    if top_k == 0 {
        return Err(VectorError::InvalidTopK(top_k));
    }
    dimension.validate_vector(query)
}

/// Exact brute-force index. O(n·D) per query.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: VectorDimension,
    staged: EntrySet,
    built: Snapshot,
}

impl FlatIndex {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            staged: EntrySet::default(),
            built: Snapshot::default(),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn insert_batch(&mut self, entries: Vec<IndexEntry>) -> Result<(), VectorError> {
        self.staged.upsert_batch(self.dimension, entries)
    }

    fn build(&mut self) -> Result<(), VectorError> {
        self.built = self.staged.snapshot(self.dimension);
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, VectorError> {
        validate_query(self.dimension, query, top_k)?;
        Ok(self.built.rank(query, 0..self.built.len(), top_k))
    }

    fn clear(&mut self) {
        self.staged.clear();
    }

    fn len(&self) -> usize {
        self.staged.entries.len()
    }

    fn indexed_len(&self) -> usize {
        self.built.len()
    }
}

/// Inverted-file index: rows partitioned into k-means lists.
#[derive(Debug)]
pub struct IvfIndex {
    dimension: VectorDimension,
    params: IvfParams,
    staged: EntrySet,
    built: Snapshot,
    /// Unit-length list centroids.
    centroids: Vec<Vec<f32>>,
    /// Row positions per list, ascending.
    lists: Vec<Vec<usize>>,
}

impl IvfIndex {
    #[must_use]
    pub fn new(dimension: VectorDimension, params: IvfParams) -> Self {
        Self {
            dimension,
            params,
            staged: EntrySet::default(),
            built: Snapshot::default(),
            centroids: Vec::new(),
            lists: Vec::new(),
        }
    }

    /// Number of lists produced by the last build.
    #[must_use]
    pub fn nlist(&self) -> usize {
        self.lists.len()
    }

    /// Centroids of the last build, for inspection.
    #[must_use]
    pub fn as_centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    fn target_lists(&self, n: usize) -> usize {
        let k = self
            .params
            .nlist
            .unwrap_or_else(|| (n as f32).sqrt().ceil() as usize);
        k.clamp(MIN_CLUSTERS, MAX_CLUSTERS).min(n)
    }
}

impl VectorIndex for IvfIndex {
    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn insert_batch(&mut self, entries: Vec<IndexEntry>) -> Result<(), VectorError> {
        self.staged.upsert_batch(self.dimension, entries)
    }

    fn build(&mut self) -> Result<(), VectorError> {
        let snapshot = self.staged.snapshot(self.dimension);

        if snapshot.len() == 0 {
            self.built = snapshot;
            self.centroids.clear();
            self.lists.clear();
            return Ok(());
        }

        let rows: Vec<&[f32]> = (0..snapshot.len()).map(|i| snapshot.row(i)).collect();
        let k = self.target_lists(rows.len());
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let clustering = kmeans_clustering(&rows, k, &mut rng)
            .map_err(|e| VectorError::ClusteringFailed(e.to_string()))?;

        let mut lists = vec![Vec::new(); clustering.centroids.len()];
        for (position, cluster) in clustering.assignments.iter().enumerate() {
            lists[cluster.index()].push(position);
        }

        tracing::debug!(
            "IVF build: {} rows into {} lists ({} iterations)",
            rows.len(),
            lists.len(),
            clustering.iterations
        );

        self.centroids = clustering.centroids;
        self.lists = lists;
        self.built = snapshot;
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, VectorError> {
        self.search_probing(query, top_k, self.params.nprobe)
    }

    fn clear(&mut self) {
        self.staged.clear();
    }

    fn len(&self) -> usize {
        self.staged.entries.len()
    }

    fn indexed_len(&self) -> usize {
        self.built.len()
    }
}

impl IvfIndex {
    /// Searches with an explicit number of lists to search instead of the configured one.
    pub fn search_probing(
        &self,
        query: &[f32],
        top_k: usize,
        nprobe: usize,
    ) -> Result<Vec<SearchHit>, VectorError> {
        validate_query(self.dimension, query, top_k)?;

        if self.centroids.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked_lists: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, centroid)| (i, cosine_similarity(query, centroid)))
            .collect();
        ranked_lists.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let candidates = ranked_lists
            .iter()
            .take(nprobe.max(1))
            .flat_map(|(list, _)| self.lists[*list].iter().copied());

        Ok(self.built.rank(query, candidates, top_k))
    }
}

/// Thread-safe handle around a boxed index.
///
/// Writers (`insert_batch`, `build`, `rebuild`, `replace`) take the exclusive lock and
/// are serialized. Searches share the read lock, so a reader observes either
/// the snapshot before a build or the one after it.
#[derive(Clone)]
pub struct SharedIndex {
    inner: Arc<RwLock<Box<dyn VectorIndex>>>,
}

impl SharedIndex {
    pub fn new(index: Box<dyn VectorIndex>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    pub fn insert_batch(&self, entries: Vec<IndexEntry>) -> Result<(), VectorError> {
        self.inner.write().insert_batch(entries)
    }

    pub fn build(&self) -> Result<(), VectorError> {
        self.inner.write().build()
    }

    pub fn rebuild(&self, entries: Vec<IndexEntry>) -> Result<(), VectorError> {
        self.inner.write().rebuild(entries)
    }

    /// Swaps in an index built elsewhere and returns the previous one.
    pub fn replace(&self, index: Box<dyn VectorIndex>) -> Box<dyn VectorIndex> {
        std::mem::replace(&mut *self.inner.write(), index)
    }

    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, VectorError> {
        self.inner.read().search(query, top_k)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn indexed_len(&self) -> usize {
        self.inner.read().indexed_len()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.inner.read().dimension()
    }
}

impl fmt::Debug for SharedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_read() {
            Some(index) => write!(f, "SharedIndex {{ index: {index:?} }}"),
            None => write!(f, "SharedIndex {{ <locked> }}"),
        }
    }
}

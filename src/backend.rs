//! Remote vector index backends.
//!
//! A backend hosts named collections with a fixed schema and follows the
//! usual vector-database lifecycle: create the collection, insert records,
//! flush them, build an index, then search. The store publishes its article
//! and author collections through [`IndexBackend`] when a backend handle is
//! supplied; it never reaches for a global client.
//!
//! [`InMemoryBackend`] implements the trait on top of [`crate::vector`]
//! indexes. Inserted records stay invisible until flushed, and flushed
//! records stay invisible until an index is (re)built.
//!
//! Publishing writes into a staging collection and renames it over the live
//! one only once every collection of the batch is indexed, so a failed
//! publish leaves the previous collections searchable.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::{MAX_ID_LENGTH, MAX_LABEL_LENGTH, MAX_TITLE_LENGTH};
use crate::vector::{
    FlatIndex, IndexEntry, IndexKind, IvfIndex, IvfParams, Payload, SearchHit, VectorDimension,
    VectorError, VectorIndex,
};

/// Name of the primary key field in every collection.
pub const ID_FIELD: &str = "id";

/// Name of the vector field in every collection.
pub const EMBEDDING_FIELD: &str = "embedding";

/// Collection holding one row per article.
pub const ARTICLE_COLLECTION: &str = "articles";

/// Collection holding one centroid row per author.
pub const AUTHOR_COLLECTION: &str = "authors";

/// Appended to a collection name while a publish fills it.
pub const STAGING_SUFFIX: &str = "__staging";

/// Errors reported by index backends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Collection '{0}' already exists")]
    CollectionExists(String),

    #[error("Collection '{0}' does not exist")]
    UnknownCollection(String),

    #[error("Record '{id}' does not match the schema of '{collection}': {reason}")]
    SchemaViolation {
        collection: String,
        id: String,
        reason: String,
    },

    #[error(
        "Collection '{0}' has no index\nSuggestion: Call create_index after flushing inserted records"
    )]
    IndexNotBuilt(String),

    #[error("Unknown output field '{field}' for collection '{collection}'")]
    UnknownField { collection: String, field: String },

    #[error("Index error: {0}")]
    Vector(#[from] VectorError),

    /// Transport or server failure of a remote deployment.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Field value types a collection can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Variable length string.
    Text { max_length: usize },
    /// Dense float vector.
    Vector { dimension: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub primary: bool,
}

impl FieldSchema {
    pub fn text(name: impl Into<String>, max_length: usize) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Text { max_length },
            primary: false,
        }
    }

    pub fn vector(name: impl Into<String>, dimension: VectorDimension) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Vector {
                dimension: dimension.get(),
            },
            primary: false,
        }
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }
}

/// Named set of fields. Exactly one text field is primary and exactly one
/// field is a vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl CollectionSchema {
    /// `id`, `embedding`, `title`, `author_id`.
    pub fn articles(dimension: VectorDimension) -> Self {
        Self {
            name: ARTICLE_COLLECTION.to_string(),
            fields: vec![
                FieldSchema::text(ID_FIELD, MAX_ID_LENGTH).primary(),
                FieldSchema::vector(EMBEDDING_FIELD, dimension),
                FieldSchema::text("title", MAX_TITLE_LENGTH),
                FieldSchema::text("author_id", MAX_ID_LENGTH),
            ],
        }
    }

    /// `id`, `embedding`, `name`, `email`, `community`.
    pub fn authors(dimension: VectorDimension) -> Self {
        Self {
            name: AUTHOR_COLLECTION.to_string(),
            fields: vec![
                FieldSchema::text(ID_FIELD, MAX_ID_LENGTH).primary(),
                FieldSchema::vector(EMBEDDING_FIELD, dimension),
                FieldSchema::text("name", MAX_LABEL_LENGTH),
                FieldSchema::text("email", MAX_LABEL_LENGTH),
                FieldSchema::text("community", MAX_LABEL_LENGTH),
            ],
        }
    }

    fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Dimension of the vector field.
    fn dimension(&self) -> Result<VectorDimension, BackendError> {
        let dimension = self.fields.iter().find_map(|f| match f.field_type {
            FieldType::Vector { dimension } => Some(dimension),
            FieldType::Text { .. } => None,
        });
        match dimension {
            Some(d) => Ok(VectorDimension::new(d)?),
            None => Err(BackendError::SchemaViolation {
                collection: self.name.clone(),
                id: String::new(),
                reason: "schema has no vector field".to_string(),
            }),
        }
    }

    fn validate(&self) -> Result<(), BackendError> {
        let primaries = self.fields.iter().filter(|f| f.primary).count();
        let vectors = self
            .fields
            .iter()
            .filter(|f| matches!(f.field_type, FieldType::Vector { .. }))
            .count();
        if primaries != 1 || vectors != 1 {
            return Err(BackendError::SchemaViolation {
                collection: self.name.clone(),
                id: String::new(),
                reason: format!(
                    "expected one primary and one vector field, found {primaries} and {vectors}"
                ),
            });
        }
        self.dimension().map(|_| ())
    }

    /// Checks one record against the scalar fields. The vector is checked
    /// by the index itself.
    fn check_record(&self, record: &BackendRecord) -> Result<(), BackendError> {
        let violation = |reason: String| BackendError::SchemaViolation {
            collection: self.name.clone(),
            id: record.id.clone(),
            reason,
        };

        for (name, value) in &record.fields {
            match self.field(name).map(|f| f.field_type) {
                Some(FieldType::Text { max_length }) if value.chars().count() > max_length => {
                    return Err(violation(format!(
                        "field '{name}' exceeds {max_length} characters"
                    )));
                }
                Some(FieldType::Text { .. }) => {}
                Some(FieldType::Vector { .. }) | None => {
                    return Err(violation(format!("'{name}' is not a text field")));
                }
            }
        }
        Ok(())
    }
}

/// One row sent to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    /// Scalar fields by name.
    pub fields: Payload,
}

impl BackendRecord {
    pub fn new(id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            embedding,
            fields: Payload::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

impl From<IndexEntry> for BackendRecord {
    fn from(entry: IndexEntry) -> Self {
        Self {
            id: entry.id,
            embedding: entry.vector,
            fields: entry.payload,
        }
    }
}

/// Index parameters for [`IndexBackend::create_index`]. The metric is
/// always inner product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexParams {
    pub kind: IndexKind,
    pub ivf: IvfParams,
}

/// Per-query parameters for [`IndexBackend::search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchParams {
    /// Overrides the number of lists searched in an IVF index for this query.
    pub nprobe: Option<usize>,
}

/// Vector database operations used to publish and query collections.
pub trait IndexBackend: Send + Sync {
    fn has_collection(&self, name: &str) -> Result<bool, BackendError>;

    fn create_collection(&self, schema: CollectionSchema) -> Result<(), BackendError>;

    fn drop_collection(&self, name: &str) -> Result<(), BackendError>;

    /// Renames `from` to `to`, replacing any collection already named `to`.
    fn rename_collection(&self, from: &str, to: &str) -> Result<(), BackendError>;

    /// Queues records; they become durable only after [`IndexBackend::flush`].
    /// Returns the number of records accepted.
    fn insert(&self, collection: &str, records: Vec<BackendRecord>) -> Result<usize, BackendError>;

    fn flush(&self, collection: &str) -> Result<(), BackendError>;

    /// Builds or rebuilds the collection index over flushed records.
    fn create_index(&self, collection: &str, params: IndexParams) -> Result<(), BackendError>;

    /// Top-k search returning only the requested scalar fields.
    fn search(
        &self,
        collection: &str,
        query: &[f32],
        params: SearchParams,
        top_k: usize,
        output_fields: &[&str],
    ) -> Result<Vec<SearchHit>, BackendError>;
}

enum CollectionIndex {
    Flat(FlatIndex),
    Ivf(IvfIndex),
}

impl CollectionIndex {
    fn create(dimension: VectorDimension, params: IndexParams) -> Self {
        match params.kind {
            IndexKind::Flat => Self::Flat(FlatIndex::new(dimension)),
            IndexKind::Ivf => Self::Ivf(IvfIndex::new(dimension, params.ivf)),
        }
    }

    fn as_index_mut(&mut self) -> &mut dyn VectorIndex {
        match self {
            Self::Flat(index) => index,
            Self::Ivf(index) => index,
        }
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        params: SearchParams,
    ) -> Result<Vec<SearchHit>, VectorError> {
        match (self, params.nprobe) {
            (Self::Ivf(index), Some(nprobe)) => index.search_probing(query, top_k, nprobe),
            (Self::Ivf(index), None) => index.search(query, top_k),
            (Self::Flat(index), _) => index.search(query, top_k),
        }
    }
}

struct Collection {
    schema: CollectionSchema,
    dimension: VectorDimension,
    pending: Vec<BackendRecord>,
    flushed: Vec<BackendRecord>,
    /// Primary key to position in `flushed`.
    positions: HashMap<String, usize>,
    index: Option<CollectionIndex>,
}

impl Collection {
    fn new(schema: CollectionSchema) -> Result<Self, BackendError> {
        schema.validate()?;
        Ok(Self {
            dimension: schema.dimension()?,
            schema,
            pending: Vec::new(),
            flushed: Vec::new(),
            positions: HashMap::new(),
            index: None,
        })
    }

    /// Moves pending records into the flushed set, replacing by primary key.
    fn flush(&mut self) {
        for record in self.pending.drain(..) {
            match self.positions.get(&record.id) {
                Some(&position) => self.flushed[position] = record,
                None => {
                    self.positions.insert(record.id.clone(), self.flushed.len());
                    self.flushed.push(record);
                }
            }
        }
    }

    fn build_index(&mut self, params: IndexParams) -> Result<(), BackendError> {
        let mut index = CollectionIndex::create(self.dimension, params);
        let entries = self
            .flushed
            .iter()
            .map(|r| IndexEntry {
                id: r.id.clone(),
                vector: r.embedding.clone(),
                payload: r.fields.clone(),
            })
            .collect();
        index.as_index_mut().rebuild(entries)?;
        self.index = Some(index);
        Ok(())
    }
}

/// Process-local [`IndexBackend`].
#[derive(Default)]
pub struct InMemoryBackend {
    collections: Mutex<HashMap<String, Collection>>,
}

impl fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let collections = self.collections.lock();
        let mut names: Vec<&String> = collections.keys().collect();
        names.sort();
        f.debug_struct("InMemoryBackend")
            .field("collections", &names)
            .finish()
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of flushed records in a collection.
    pub fn flushed_len(&self, name: &str) -> Result<usize, BackendError> {
        self.with_collection(name, |c| Ok(c.flushed.len()))
    }

    fn with_collection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Collection) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let mut collections = self.collections.lock();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| BackendError::UnknownCollection(name.to_string()))?;
        f(collection)
    }
}

impl IndexBackend for InMemoryBackend {
    fn has_collection(&self, name: &str) -> Result<bool, BackendError> {
        Ok(self.collections.lock().contains_key(name))
    }

    fn create_collection(&self, schema: CollectionSchema) -> Result<(), BackendError> {
        let mut collections = self.collections.lock();
        if collections.contains_key(&schema.name) {
            return Err(BackendError::CollectionExists(schema.name));
        }
        let name = schema.name.clone();
        collections.insert(name, Collection::new(schema)?);
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<(), BackendError> {
        self.collections
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BackendError::UnknownCollection(name.to_string()))
    }

    fn rename_collection(&self, from: &str, to: &str) -> Result<(), BackendError> {
        let mut collections = self.collections.lock();
        let mut collection = collections
            .remove(from)
            .ok_or_else(|| BackendError::UnknownCollection(from.to_string()))?;
        collection.schema.name = to.to_string();
        if collections.insert(to.to_string(), collection).is_some() {
            tracing::debug!("Collection '{from}' replaced '{to}'");
        }
        Ok(())
    }

    fn insert(&self, collection: &str, records: Vec<BackendRecord>) -> Result<usize, BackendError> {
        self.with_collection(collection, |c| {
            for record in &records {
                c.dimension.validate_vector(&record.embedding)?;
                c.schema.check_record(record)?;
            }
            let accepted = records.len();
            c.pending.extend(records);
            Ok(accepted)
        })
    }

    fn flush(&self, collection: &str) -> Result<(), BackendError> {
        self.with_collection(collection, |c| {
            c.flush();
            Ok(())
        })
    }

    fn create_index(&self, collection: &str, params: IndexParams) -> Result<(), BackendError> {
        self.with_collection(collection, |c| {
            c.build_index(params)?;
            tracing::debug!(
                "Indexed {} records in backend collection '{collection}'",
                c.flushed.len()
            );
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        query: &[f32],
        params: SearchParams,
        top_k: usize,
        output_fields: &[&str],
    ) -> Result<Vec<SearchHit>, BackendError> {
        self.with_collection(collection, |c| {
            for field in output_fields {
                if c.schema.field(field).is_none() {
                    return Err(BackendError::UnknownField {
                        collection: collection.to_string(),
                        field: (*field).to_string(),
                    });
                }
            }
            let index = c
                .index
                .as_ref()
                .ok_or_else(|| BackendError::IndexNotBuilt(collection.to_string()))?;

            let mut hits = index.search(query, top_k, params)?;
            for hit in &mut hits {
                hit.payload
                    .retain(|name, _| output_fields.contains(&name.as_str()));
            }
            Ok(hits)
        })
    }
}

/// Replaces a collection with `records` and indexes it.
pub fn publish_collection(
    backend: &dyn IndexBackend,
    schema: CollectionSchema,
    records: Vec<BackendRecord>,
    params: IndexParams,
) -> Result<usize, BackendError> {
    let inserted = publish_collections(backend, vec![(schema, records)], params)?;
    Ok(inserted.into_iter().sum())
}

/// Replaces several collections at once. Returns the records inserted per
/// collection, in input order.
///
/// Every collection is created, filled, flushed and indexed under its
/// staging name first. The live collections are only replaced once all of
/// them are ready; on failure the staging collections are dropped and the
/// live ones stay as they were.
pub fn publish_collections(
    backend: &dyn IndexBackend,
    collections: Vec<(CollectionSchema, Vec<BackendRecord>)>,
    params: IndexParams,
) -> Result<Vec<usize>, BackendError> {
    let mut staged: Vec<(String, String)> = Vec::with_capacity(collections.len());
    let mut inserted = Vec::with_capacity(collections.len());

    for (schema, records) in collections {
        let live = schema.name.clone();
        let staging = format!("{live}{STAGING_SUFFIX}");
        staged.push((staging.clone(), live));
        match stage_collection(backend, schema, &staging, records, params) {
            Ok(count) => inserted.push(count),
            Err(error) => {
                tracing::warn!("Publishing '{staging}' failed, live collections kept: {error}");
                for (staging, _) in &staged {
                    if let Err(cleanup) = drop_if_present(backend, staging) {
                        tracing::warn!("Could not drop '{staging}': {cleanup}");
                    }
                }
                return Err(error);
            }
        }
    }

    for ((staging, live), count) in staged.iter().zip(&inserted) {
        backend.rename_collection(staging, live)?;
        tracing::info!("Published {count} records to backend collection '{live}'");
    }
    Ok(inserted)
}

fn stage_collection(
    backend: &dyn IndexBackend,
    mut schema: CollectionSchema,
    staging: &str,
    records: Vec<BackendRecord>,
    params: IndexParams,
) -> Result<usize, BackendError> {
    drop_if_present(backend, staging)?;
    schema.name = staging.to_string();
    backend.create_collection(schema)?;
    let inserted = backend.insert(staging, records)?;
    backend.flush(staging)?;
    backend.create_index(staging, params)?;
    Ok(inserted)
}

fn drop_if_present(backend: &dyn IndexBackend, name: &str) -> Result<(), BackendError> {
    if backend.has_collection(name)? {
        backend.drop_collection(name)?;
    }
    Ok(())
}

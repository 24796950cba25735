//! Author and article records, the catalog that links them, and their
//! on-disk form.

mod catalog;
mod model;
mod persist;
pub mod text;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use catalog::Catalog;
pub use model::{
    Article, ArticleId, ArticleRecord, Author, AuthorId, AuthorRecord, MAX_ID_LENGTH,
    MAX_LABEL_LENGTH, MAX_TITLE_LENGTH,
};
pub use persist::{LoadReport, RecordStore};

/// The two searchable entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Article,
    Author,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Article => f.write_str("article"),
            Self::Author => f.write_str("author"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "article" | "articles" => Ok(Self::Article),
            "author" | "authors" => Ok(Self::Author),
            other => Err(format!("unknown entity kind '{other}', expected article or author")),
        }
    }
}

/// What to do when an incoming record reuses an existing identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacePolicy {
    /// Keep the existing record and report `DuplicateIdentity`.
    #[default]
    Reject,
    /// Last write wins.
    Replace,
}

/// One record that could not be loaded, validated or inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub kind: EntityKind,
    /// Identity as it appeared in the source, possibly invalid.
    pub id: String,
    pub error: StoreError,
}

impl RecordFailure {
    pub fn new(kind: EntityKind, id: impl Into<String>, error: StoreError) -> Self {
        Self {
            kind,
            id: id.into(),
            error,
        }
    }
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.kind, self.id, self.error)
    }
}

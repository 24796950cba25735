//! Strongly typed author and article records.
//!
//! Records are validated when they are created from their persisted form
//! ([`AuthorRecord`], [`ArticleRecord`]). Changing a field goes through a
//! `with_*` function that consumes the record and returns a new validated
//! one; nothing mutates fields in place.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::records::text::to_plain_text;
use crate::vector::VectorDimension;

/// Longest author or article identity, in characters.
pub const MAX_ID_LENGTH: usize = 256;

/// Longest article title, in characters.
pub const MAX_TITLE_LENGTH: usize = 1024;

/// Longest author display name, email or community label, in characters.
pub const MAX_LABEL_LENGTH: usize = 256;

fn check_length(id: &str, field: &str, value: &str, max: usize) -> StoreResult<()> {
    let length = value.chars().count();
    if length > max {
        return Err(StoreError::InvalidRecord {
            id: id.to_string(),
            reason: format!("{field} has {length} characters, at most {max} are allowed"),
        });
    }
    Ok(())
}

/// Identity of an article, typically a DOI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(String);

/// Identity of an author, typically an ORCID iD.
///
/// Author identities name files on disk, so path separators are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(String);

impl ArticleId {
    pub fn new(id: impl Into<String>) -> StoreResult<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidRecord {
                id,
                reason: "article identity is empty".to_string(),
            });
        }
        check_length(trimmed, "article identity", trimmed, MAX_ID_LENGTH)?;
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AuthorId {
    pub fn new(id: impl Into<String>) -> StoreResult<Self> {
        let id = id.into();
        let trimmed = id.trim();
        let reason = if trimmed.is_empty() {
            Some("author identity is empty")
        } else if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
            Some("author identity must not contain path separators")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(StoreError::InvalidRecord {
                id,
                reason: reason.to_string(),
            });
        }
        check_length(trimmed, "author identity", trimmed, MAX_ID_LENGTH)?;
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted shape of one article, embedded in its author's file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    #[serde(alias = "id")]
    pub doi: String,
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub cited_by: Option<u32>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    /// Owning author; only read for standalone article ingestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

/// Persisted shape of one author: attributes plus owned articles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    #[serde(alias = "orcid")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "community_name")]
    pub community: Option<String>,
    #[serde(default)]
    pub articles: Vec<ArticleRecord>,
}

/// A validated article.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    id: ArticleId,
    author_id: AuthorId,
    title: String,
    abstract_text: String,
    embedding: Vec<f32>,
    citation_count: Option<u32>,
    publication_year: Option<i32>,
}

impl Article {
    /// Validates a persisted article owned by `author_id`.
    ///
    /// The abstract is reduced to plain text; the embedding must match
    /// `dimension`.
    pub fn from_record(
        record: ArticleRecord,
        author_id: AuthorId,
        dimension: VectorDimension,
    ) -> StoreResult<Self> {
        let id = ArticleId::new(record.doi)?;
        let title = validate_title(&id, &record.title)?;
        dimension.validate_vector(&record.embedding)?;

        Ok(Self {
            id,
            author_id,
            title,
            abstract_text: to_plain_text(&record.abstract_text),
            embedding: record.embedding,
            citation_count: record.cited_by,
            publication_year: record.publication_year,
        })
    }

    #[must_use]
    pub fn id(&self) -> &ArticleId {
        &self.id
    }

    #[must_use]
    pub fn author_id(&self) -> &AuthorId {
        &self.author_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn abstract_text(&self) -> &str {
        &self.abstract_text
    }

    #[must_use]
    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    #[must_use]
    pub fn citation_count(&self) -> Option<u32> {
        self.citation_count
    }

    #[must_use]
    pub fn publication_year(&self) -> Option<i32> {
        self.publication_year
    }

    /// Overwrites the citation count.
    #[must_use]
    pub fn with_citation_count(self, citation_count: Option<u32>) -> Self {
        Self {
            citation_count,
            ..self
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> StoreResult<Self> {
        let title = validate_title(&self.id, &title.into())?;
        Ok(Self { title, ..self })
    }

    pub fn with_embedding(
        self,
        embedding: Vec<f32>,
        dimension: VectorDimension,
    ) -> StoreResult<Self> {
        dimension.validate_vector(&embedding)?;
        Ok(Self { embedding, ..self })
    }

    #[must_use]
    pub fn to_record(&self) -> ArticleRecord {
        ArticleRecord {
            doi: self.id.0.clone(),
            title: self.title.clone(),
            abstract_text: self.abstract_text.clone(),
            embedding: self.embedding.clone(),
            cited_by: self.citation_count,
            publication_year: self.publication_year,
            author_id: None,
        }
    }
}

fn validate_title(id: &ArticleId, title: &str) -> StoreResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::InvalidRecord {
            id: id.0.clone(),
            reason: "article title is empty".to_string(),
        });
    }
    check_length(&id.0, "title", title, MAX_TITLE_LENGTH)?;
    Ok(title.to_string())
}

/// A validated author. The article list is maintained by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    id: AuthorId,
    first_name: String,
    last_name: String,
    email: Option<String>,
    community: Option<String>,
    articles: Vec<ArticleId>,
}

fn validate_email(id: &AuthorId, email: Option<String>) -> StoreResult<Option<String>> {
    let Some(email) = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    check_length(&id.0, "email", &email, MAX_LABEL_LENGTH)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(Some(email)),
        _ => Err(StoreError::InvalidRecord {
            id: id.0.clone(),
            reason: format!("malformed email address '{email}'"),
        }),
    }
}

fn validate_community(id: &AuthorId, community: Option<String>) -> StoreResult<Option<String>> {
    let community = community
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(label) = &community {
        check_length(&id.0, "community", label, MAX_LABEL_LENGTH)?;
    }
    Ok(community)
}

fn validate_name(id: &AuthorId, first_name: &str, last_name: &str) -> StoreResult<()> {
    if first_name.is_empty() && last_name.is_empty() {
        return Err(StoreError::InvalidRecord {
            id: id.0.clone(),
            reason: "author has no name".to_string(),
        });
    }
    let display = format!("{first_name} {last_name}");
    check_length(&id.0, "name", display.trim(), MAX_LABEL_LENGTH)
}

impl Author {
    /// Validates the author attributes of a persisted record. Articles are
    /// handled separately by [`Author::split_record`].
    pub fn from_record(record: &AuthorRecord) -> StoreResult<Self> {
        let id = AuthorId::new(record.id.clone())?;
        let first_name = record.first_name.trim().to_string();
        let last_name = record.last_name.trim().to_string();
        validate_name(&id, &first_name, &last_name)?;
        let email = validate_email(&id, record.email.clone())?;
        let community = validate_community(&id, record.community.clone())?;

        Ok(Self {
            first_name,
            last_name,
            email,
            community,
            articles: Vec::new(),
            id,
        })
    }

    #[must_use]
    pub fn id(&self) -> &AuthorId {
        &self.id
    }

    #[must_use]
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    #[must_use]
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    /// "First Last", or whichever half is present.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    #[must_use]
    pub fn community(&self) -> Option<&str> {
        self.community.as_deref()
    }

    /// Owned article identities, in insertion order.
    #[must_use]
    pub fn articles(&self) -> &[ArticleId] {
        &self.articles
    }

    pub fn with_email(self, email: Option<String>) -> StoreResult<Self> {
        let email = validate_email(&self.id, email)?;
        Ok(Self { email, ..self })
    }

    pub fn with_community(self, community: Option<String>) -> StoreResult<Self> {
        let community = validate_community(&self.id, community)?;
        Ok(Self { community, ..self })
    }

    pub fn with_name(
        self,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> StoreResult<Self> {
        let first_name = first_name.into().trim().to_string();
        let last_name = last_name.into().trim().to_string();
        validate_name(&self.id, &first_name, &last_name)?;
        Ok(Self {
            first_name,
            last_name,
            ..self
        })
    }

    pub(crate) fn articles_mut(&mut self) -> &mut Vec<ArticleId> {
        &mut self.articles
    }

    /// Same attributes, article list taken from `other`.
    pub(crate) fn with_articles_of(self, other: &Author) -> Self {
        Self {
            articles: other.articles.clone(),
            ..self
        }
    }

    /// Persisted form with the given articles embedded.
    #[must_use]
    pub fn to_record<'a>(&self, articles: impl IntoIterator<Item = &'a Article>) -> AuthorRecord {
        AuthorRecord {
            id: self.id.0.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            community: self.community.clone(),
            articles: articles.into_iter().map(Article::to_record).collect(),
        }
    }

    /// Splits a persisted record into the validated author and one result
    /// per embedded article, in file order.
    pub fn split_record(
        record: AuthorRecord,
        dimension: VectorDimension,
    ) -> StoreResult<(Self, Vec<(String, StoreResult<Article>)>)> {
        let author = Self::from_record(&record)?;
        let articles = record
            .articles
            .into_iter()
            .map(|article| {
                let raw_id = article.doi.clone();
                (
                    raw_id,
                    Article::from_record(article, author.id.clone(), dimension),
                )
            })
            .collect();
        Ok((author, articles))
    }
}

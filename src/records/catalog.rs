//! The referentially consistent set of loaded authors and articles.
//!
//! The catalog is the only place that links articles to authors. Every
//! mutation keeps two invariants:
//!
//! - each article's `author_id` names an author in the catalog;
//! - each author's article list is exactly the set of articles naming it,
//!   in insertion order.
//!
//! Iteration order is insertion order for both entity types, which is what
//! gives index builds and weighted author ranking a deterministic tie-break.

use std::collections::HashMap;

use crate::error::{StoreError, StoreResult};
use crate::records::{
    Article, ArticleId, Author, AuthorId, AuthorRecord, EntityKind, RecordFailure, ReplacePolicy,
};

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    authors: HashMap<AuthorId, Author>,
    author_order: Vec<AuthorId>,
    articles: HashMap<ArticleId, Article>,
    article_order: Vec<ArticleId>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn author(&self, id: &AuthorId) -> Option<&Author> {
        self.authors.get(id)
    }

    #[must_use]
    pub fn article(&self, id: &ArticleId) -> Option<&Article> {
        self.articles.get(id)
    }

    /// Authors in insertion order.
    pub fn authors(&self) -> impl Iterator<Item = &Author> {
        self.author_order.iter().filter_map(|id| self.authors.get(id))
    }

    /// Articles in insertion order.
    pub fn articles(&self) -> impl Iterator<Item = &Article> {
        self.article_order
            .iter()
            .filter_map(|id| self.articles.get(id))
    }

    /// Articles owned by `author`, in the author's list order.
    pub fn articles_of<'a>(&'a self, author: &'a Author) -> impl Iterator<Item = &'a Article> {
        author
            .articles()
            .iter()
            .filter_map(|id| self.articles.get(id))
    }

    #[must_use]
    pub fn author_count(&self) -> usize {
        self.authors.len()
    }

    #[must_use]
    pub fn article_count(&self) -> usize {
        self.articles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }

    /// Inserts or replaces an author's attributes.
    ///
    /// On replace the existing article list is preserved; use
    /// [`Catalog::insert_author_with_articles`] for wholesale replacement.
    pub fn insert_author(&mut self, author: Author, policy: ReplacePolicy) -> StoreResult<()> {
        match self.authors.get(author.id()) {
            Some(existing) => {
                if policy == ReplacePolicy::Reject {
                    return Err(StoreError::DuplicateIdentity {
                        kind: EntityKind::Author,
                        id: author.id().to_string(),
                    });
                }
                let author = author.with_articles_of(existing);
                self.authors.insert(author.id().clone(), author);
            }
            None => {
                let mut author = author;
                author.articles_mut().clear();
                self.author_order.push(author.id().clone());
                self.authors.insert(author.id().clone(), author);
            }
        }
        Ok(())
    }

    /// Inserts an author together with the articles its record carries.
    ///
    /// A rejected author rejects the whole package. Otherwise each article is
    /// inserted on its own and failures are returned per article. Replacing
    /// an author also drops its previous articles that the new package no
    /// longer lists.
    pub fn insert_author_with_articles(
        &mut self,
        author: Author,
        articles: Vec<Article>,
        policy: ReplacePolicy,
    ) -> StoreResult<Vec<RecordFailure>> {
        let author_id = author.id().clone();
        let existed = self.authors.contains_key(&author_id);
        self.insert_author(author, policy)?;

        if existed {
            let keep: Vec<&ArticleId> = articles.iter().map(Article::id).collect();
            let stale: Vec<ArticleId> = self.authors[&author_id]
                .articles()
                .iter()
                .filter(|id| !keep.contains(id))
                .cloned()
                .collect();
            for id in stale {
                self.remove_article(&id);
            }
        }

        let mut failures = Vec::new();
        for article in articles {
            let id = article.id().to_string();
            if let Err(error) = self.insert_article(article, policy) {
                failures.push(RecordFailure::new(EntityKind::Article, id, error));
            }
        }
        Ok(failures)
    }

    /// Inserts or replaces a single article.
    ///
    /// The owning author must already be present. On replace the article
    /// keeps its position; if the owner changed, the identity moves to the
    /// end of the new owner's list.
    pub fn insert_article(&mut self, article: Article, policy: ReplacePolicy) -> StoreResult<()> {
        if !self.authors.contains_key(article.author_id()) {
            return Err(StoreError::DanglingReference {
                article_id: article.id().to_string(),
                author_id: article.author_id().to_string(),
            });
        }

        let previous_owner = match self.articles.get(article.id()) {
            Some(existing) => {
                if policy == ReplacePolicy::Reject {
                    return Err(StoreError::DuplicateIdentity {
                        kind: EntityKind::Article,
                        id: article.id().to_string(),
                    });
                }
                Some(existing.author_id().clone())
            }
            None => None,
        };

        match previous_owner {
            Some(owner) if owner == *article.author_id() => {}
            Some(owner) => {
                if let Some(previous) = self.authors.get_mut(&owner) {
                    previous.articles_mut().retain(|id| id != article.id());
                }
                self.push_to_owner(&article);
            }
            None => {
                self.article_order.push(article.id().clone());
                self.push_to_owner(&article);
            }
        }

        self.articles.insert(article.id().clone(), article);
        Ok(())
    }

    fn push_to_owner(&mut self, article: &Article) {
        if let Some(owner) = self.authors.get_mut(article.author_id()) {
            owner.articles_mut().push(article.id().clone());
        }
    }

    fn remove_article(&mut self, id: &ArticleId) -> Option<Article> {
        let article = self.articles.remove(id)?;
        self.article_order.retain(|existing| existing != id);
        if let Some(owner) = self.authors.get_mut(article.author_id()) {
            owner.articles_mut().retain(|existing| existing != id);
        }
        Some(article)
    }

    /// Overwrites an article's citation count.
    pub fn set_citation_count(
        &mut self,
        id: &ArticleId,
        citation_count: Option<u32>,
    ) -> StoreResult<()> {
        let article = self
            .articles
            .remove(id)
            .ok_or_else(|| StoreError::UnknownIdentity {
                kind: EntityKind::Article,
                id: id.to_string(),
            })?;
        self.articles
            .insert(id.clone(), article.with_citation_count(citation_count));
        Ok(())
    }

    /// Persisted form of one author with its articles.
    #[must_use]
    pub fn author_record(&self, id: &AuthorId) -> Option<AuthorRecord> {
        let author = self.authors.get(id)?;
        Some(author.to_record(self.articles_of(author)))
    }

    /// Verifies both referential invariants; returns the first violation.
    pub fn check_integrity(&self) -> StoreResult<()> {
        for article in self.articles() {
            let owns = self
                .authors
                .get(article.author_id())
                .is_some_and(|author| author.articles().contains(article.id()));
            if !owns {
                return Err(StoreError::DanglingReference {
                    article_id: article.id().to_string(),
                    author_id: article.author_id().to_string(),
                });
            }
        }
        for author in self.authors() {
            for id in author.articles() {
                let named = self
                    .articles
                    .get(id)
                    .is_some_and(|article| article.author_id() == author.id());
                if !named {
                    return Err(StoreError::UnknownIdentity {
                        kind: EntityKind::Article,
                        id: id.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

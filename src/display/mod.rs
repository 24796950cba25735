//! Terminal output for the CLI.
//!
//! Renders search results, store statistics and ingestion failures as
//! tables.

pub mod tables;

pub use tables::{
    TableBuilder, create_article_table, create_author_table, create_failure_table,
    create_stats_table,
};

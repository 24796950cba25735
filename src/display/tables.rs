//! Table formatting utilities for structured output.

use comfy_table::{
    Attribute, Cell, CellAlignment, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::ingest::IngestReport;
use crate::records::RecordFailure;
use crate::store::{ArticleHit, AuthorHit, StoreStats};

/// Longest title shown before truncation.
const MAX_TITLE_CHARS: usize = 72;

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<Cell>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

fn rank_cell(rank: usize) -> Cell {
    Cell::new(rank).set_alignment(CellAlignment::Right)
}

fn score_cell(score: f32) -> Cell {
    Cell::new(format!("{score:.4}")).set_alignment(CellAlignment::Right)
}

/// Ranked article hits.
pub fn create_article_table(hits: &[ArticleHit]) -> String {
    hits.iter()
        .enumerate()
        .fold(
            TableBuilder::new().set_headers(vec![
                "#", "Score", "Article", "Title", "Author", "Cited by",
            ]),
            |table, (i, hit)| {
                let article = &hit.article;
                table.add_row(vec![
                    rank_cell(i + 1),
                    score_cell(hit.score),
                    Cell::new(article.id()),
                    Cell::new(truncate(article.title(), MAX_TITLE_CHARS)),
                    Cell::new(article.author_id()),
                    Cell::new(
                        article
                            .citation_count()
                            .map_or_else(|| "-".to_string(), |n| n.to_string()),
                    )
                    .set_alignment(CellAlignment::Right),
                ])
            },
        )
        .build()
}

/// Ranked author hits.
pub fn create_author_table(hits: &[AuthorHit]) -> String {
    hits.iter()
        .enumerate()
        .fold(
            TableBuilder::new().set_headers(vec![
                "#",
                "Score",
                "Author",
                "Name",
                "Community",
                "Articles",
            ]),
            |table, (i, hit)| {
                let author = &hit.author;
                table.add_row(vec![
                    rank_cell(i + 1),
                    score_cell(hit.score),
                    Cell::new(author.id()),
                    Cell::new(author.display_name()),
                    Cell::new(author.community().unwrap_or("-")),
                    Cell::new(author.articles().len()).set_alignment(CellAlignment::Right),
                ])
            },
        )
        .build()
}

/// Store counts plus the outcome of the ingestion that filled it.
pub fn create_stats_table(stats: &StoreStats, report: &IngestReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        Cell::new("Metric").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);

    table.add_row(vec!["Dimension".to_string(), stats.dimension.to_string()]);
    table.add_row(vec!["Index".to_string(), format!("{:?}", stats.index_kind)]);
    table.add_row(vec!["Authors".to_string(), stats.authors.to_string()]);
    table.add_row(vec!["Articles".to_string(), stats.articles.to_string()]);
    table.add_row(vec![
        "Indexed articles".to_string(),
        stats.indexed_articles.to_string(),
    ]);
    table.add_row(vec![
        "Indexed authors".to_string(),
        stats
            .indexed_authors
            .map_or_else(|| "disabled".to_string(), |n| n.to_string()),
    ]);

    let (failures, color) = if report.is_clean() {
        ("0".to_string(), Color::Green)
    } else {
        (report.failures.len().to_string(), Color::Yellow)
    };
    table.add_row(vec![
        Cell::new("Ingestion failures"),
        Cell::new(failures).fg(color).add_attribute(Attribute::Bold),
    ]);

    table.to_string()
}

/// One row per rejected record.
pub fn create_failure_table(failures: &[RecordFailure]) -> String {
    failures
        .iter()
        .fold(
            TableBuilder::new().set_headers(vec!["Kind", "Identity", "Code", "Reason"]),
            |table, failure| {
                table.add_row(vec![
                    Cell::new(failure.kind),
                    Cell::new(&failure.id),
                    Cell::new(failure.error.status_code()).fg(Color::Yellow),
                    Cell::new(truncate(&failure.error.to_string(), MAX_TITLE_CHARS)),
                ])
            },
        )
        .build()
}

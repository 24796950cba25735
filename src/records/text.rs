//! Minimal cleanup for abstracts delivered as JATS XML or with inline LaTeX.

use std::sync::LazyLock;

use regex::Regex;

static XML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid regex"));
static INLINE_LATEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$.*?\$").expect("Invalid regex"));
static BACKSLASH_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[^ ]+").expect("Invalid regex"));
static CURLY_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{.*?\}").expect("Invalid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex"));

/// Strips markup from an abstract and collapses whitespace.
///
/// Order matters: tags become spaces first, then LaTeX spans, backslash
/// commands and brace groups are dropped.
#[must_use]
pub fn to_plain_text(text: &str) -> String {
    let text = XML_TAG.replace_all(text, " ");
    let text = INLINE_LATEX.replace_all(&text, "");
    let text = BACKSLASH_WORD.replace_all(&text, "");
    let text = CURLY_GROUP.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

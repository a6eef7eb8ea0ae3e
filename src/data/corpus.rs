//! Training corpus: the built-in question/answer strings and file loading.

use std::path::Path;

use crate::error::{CharnnError, CharnnResult};

/// Question/answer pairs the model is trained on by default.
pub const DEFAULT_CORPUS: &[&str] = &[
    "Q: What is gravity? A: Gravity is a force that attracts objects toward each other.",
    "Q: How do I design a chair? A: Start with a stable base, then add a seat and backrest.",
    "Q: What is 2+2? A: 4",
    "Q: Who wrote Romeo and Juliet? A: William Shakespeare.",
    "Q: What is the capital of France? A: Paris.",
];

/// Separator placed between corpus entries.
pub const DEFAULT_SEPARATOR: &str = " ";

/// Concatenate corpus entries with `separator` between each pair.
#[must_use]
pub fn join_corpus<S: AsRef<str>>(entries: &[S], separator: &str) -> String {
    entries
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(separator)
}

/// The default corpus joined with the default separator.
#[must_use]
pub fn default_text() -> String {
    join_corpus(DEFAULT_CORPUS, DEFAULT_SEPARATOR)
}

/// Load corpus entries from a text file, one entry per non-empty line.
///
/// # Errors
///
/// `Io` if the file cannot be read.
pub fn load_corpus(path: &Path) -> CharnnResult<Vec<String>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Fail with `EmptyCorpus` if `text` cannot yield a training example.
///
/// # Errors
///
/// `EmptyCorpus` when `text` has fewer than `window + 1` characters.
pub fn ensure_trainable(text: &str, window: usize) -> CharnnResult<()> {
    let chars = text.chars().count();
    if chars < window + 1 {
        return Err(CharnnError::EmptyCorpus { chars, window });
    }
    Ok(())
}

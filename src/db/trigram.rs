//! Trigram text distance, exposed to SQL as `trigram_distance(text, query)`

use std::collections::HashSet;

use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;

/// Lower-cased trigrams of every word, each word padded as `"  word "`
#[must_use]
pub fn trigrams(text: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars().flat_map(char::to_lowercase))
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            out.insert(window.iter().collect());
        }
    }
    out
}

/// Share of the query's trigrams that also occur in `text`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(text: &str, query: &str) -> f64 {
    let query = trigrams(query);
    if query.is_empty() {
        return 0.0;
    }
    let text = trigrams(text);
    let shared = query.intersection(&text).count();
    shared as f64 / query.len() as f64
}

/// `1 - similarity`; missing text is maximally distant
#[must_use]
pub fn distance(text: Option<&str>, query: &str) -> f64 {
    text.map_or(1.0, |t| 1.0 - similarity(t, query))
}

/// Register `trigram_distance` on a connection
///
/// # Errors
///
/// Returns error if `SQLite` rejects the function
pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "trigram_distance",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            let query: Option<String> = ctx.get(1)?;
            Ok(distance(text.as_deref(), query.as_deref().unwrap_or_default()))
        },
    )
}

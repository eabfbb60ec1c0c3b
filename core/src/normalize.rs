//! Text normalization shared by storage and search.
//!
//! Every piece of free text (titles, descriptions, ingredient names, search
//! queries) goes through [`normalize_text`] before it touches the database, so
//! "Crème brûlée" and "creme brulee" compare equal under SQLite's ASCII
//! case-insensitive `LIKE`.

use deunicode::deunicode;

/// Transliterate to plain ASCII and trim surrounding whitespace.
#[must_use]
pub fn normalize_text(input: &str) -> String {
    deunicode(input).trim().to_string()
}

/// Normalized, lowercased ingredient name.
#[must_use]
pub fn normalize_ingredient_name(input: &str) -> String {
    normalize_text(input).to_lowercase()
}

/// Escape `LIKE` metacharacters; pair with `ESCAPE '\'` in the statement.
#[must_use]
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Substring pattern: `%query%`.
#[must_use]
pub fn contains_pattern(query: &str) -> String {
    let escaped = escape_like(&normalize_text(query));
    format!("%{escaped}%")
}

/// Token pattern: `%tok1%tok2%...%`.
///
/// The tokens must appear in order, with anything in between.
#[must_use]
pub fn token_pattern(query: &str) -> String {
    let normalized = normalize_text(query);
    let tokens: Vec<String> = normalized.split_whitespace().map(escape_like).collect();
    format!("%{}%", tokens.join("%"))
}

//! Input cleanup for symptom queries and output cleanup for model answers.

use std::sync::LazyLock;

use regex::Regex;

use super::RagError;

/// Maximum symptom query length in characters.
pub const MAX_QUERY_CHARS: usize = 2_000;

/// Validate and clean a symptom query before it reaches the model.
///
/// Strips invisible and control characters, then trims. The wording itself is
/// passed through unchanged. Empty or over-long queries are rejected.
pub fn sanitize_query(raw_query: &str) -> Result<String, RagError> {
    let text = remove_invisible_unicode(raw_query);
    let text = remove_control_characters(&text);
    let text = text.trim().to_string();

    if text.is_empty() {
        return Err(RagError::InvalidQuery("Symptoms must not be empty".into()));
    }
    let chars = text.chars().count();
    if chars > MAX_QUERY_CHARS {
        return Err(RagError::InvalidQuery(format!(
            "Symptoms must be at most {MAX_QUERY_CHARS} characters (got {chars})"
        )));
    }

    Ok(text)
}

/// Remove bracketed reference markers (`[1]`, `[2][3]`, `[1, 4]`) and trim.
pub fn strip_reference_markers(text: &str) -> String {
    static REFERENCE_MARKERS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t]*(?:\[\d+(?:\s*,\s*\d+)*\])+").unwrap());

    REFERENCE_MARKERS.replace_all(text, "").trim().to_string()
}

fn remove_invisible_unicode(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(
                *c,
                '\u{200B}'..='\u{200F}'
                | '\u{202A}'..='\u{202E}'
                | '\u{2060}'..='\u{2064}'
                | '\u{2066}'..='\u{2069}'
                | '\u{FEFF}'
                | '\u{00AD}'
            )
        })
        .collect()
}

/// Control characters except newline and tab.
fn remove_control_characters(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

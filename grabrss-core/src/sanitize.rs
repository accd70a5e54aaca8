//! Text clean-up applied to feed titles and categories before they are
//! stored or handed to the download queue.

const ILLEGAL_NAME_CHARS: &[char] = &['\\', '/', '<', '>', '?', '*', ':', '|', '"'];

/// Normalizes feed-supplied text: control characters become spaces, runs of
/// whitespace collapse to one space, and the result is trimmed.
pub fn normalize_text(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turns a title into something usable as a job/folder name.
pub fn sanitize_foldername(title: &str) -> String {
    let cleaned: String = normalize_text(title)
        .chars()
        .map(|c| if ILLEGAL_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

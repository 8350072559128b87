//! Citation formatting for retrieved-passage metadata.
//!
//! Raw corpus titles arrive as file names ("2019.Building.Trust.pdf"); the
//! formatter cleans them up, de-duplicates, caps the list, and falls back to
//! a count-based note when no title is usable.

use crate::pipeline::ScoredPassage;

/// Maximum citations rendered before the overflow summary kicks in.
const MAX_CITATIONS: usize = 3;

/// Builds the "Sources:" block appended to relevant answers. Empty string
/// when there is nothing to cite.
pub fn citation_block(passages: &[ScoredPassage]) -> String {
    if passages.is_empty() {
        return String::new();
    }

    let mut seen = Vec::new();
    let mut lines = Vec::new();
    for scored in passages {
        let passage = &scored.passage;
        let Some(raw_title) = passage.title.as_deref().filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        let title = clean_title(raw_title);
        if title.is_empty() || seen.contains(&title) {
            continue;
        }
        seen.push(title.clone());

        let mut line = format!("- {title}");
        if let Some(year) = extract_year(raw_title) {
            line.push_str(&format!(" ({year})"));
        }
        if let Some(source) = passage.source.as_deref().filter(|s| !s.trim().is_empty()) {
            line.push_str(&format!(" [View Document]({source})"));
        }
        lines.push(line);
    }

    if lines.is_empty() {
        // Unusable titles: fall back to a generic count-based note.
        return format!(
            "\n\nDrawn from {} document{} in the collection.",
            passages.len(),
            if passages.len() == 1 { "" } else { "s" }
        );
    }

    let overflow = lines.len().saturating_sub(MAX_CITATIONS);
    lines.truncate(MAX_CITATIONS);
    let mut block = String::from("\n\nSources:\n");
    block.push_str(&lines.join("\n"));
    if overflow > 0 {
        block.push_str(&format!("\n- +{overflow} more"));
    }
    block
}

/// Compact single-line variant for short-form output.
pub fn citation_line(passages: &[ScoredPassage]) -> String {
    let mut titles = Vec::new();
    for scored in passages {
        let Some(raw) = scored.passage.title.as_deref().filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        let title = clean_title(raw);
        if !title.is_empty() && !titles.contains(&title) {
            titles.push(title);
        }
    }
    if titles.is_empty() {
        return String::new();
    }
    let overflow = titles.len().saturating_sub(MAX_CITATIONS);
    titles.truncate(MAX_CITATIONS);
    let mut line = format!("\n\nSources: {}", titles.join(" | "));
    if overflow > 0 {
        line.push_str(&format!(" | +{overflow} more"));
    }
    line
}

/// Strips file extensions, a leading "20xx." year prefix, and separator dots.
fn clean_title(title: &str) -> String {
    let mut cleaned = title.trim().to_string();
    for ext in [".pdf", ".docx", ".txt", ".md"] {
        if cleaned.to_lowercase().ends_with(ext) {
            cleaned.truncate(cleaned.len() - ext.len());
            break;
        }
    }
    if extract_year(&cleaned)
        .map(|year| cleaned.starts_with(&format!("{year}.")))
        .unwrap_or(false)
    {
        cleaned = cleaned[5..].to_string();
    }
    // File-name style dot separators read better as spaces.
    if cleaned.contains('.') && !cleaned.contains(' ') {
        cleaned = cleaned.replace('.', " ");
    }
    cleaned.trim_matches([' ', '.']).to_string()
}

/// First "20xx" year found in the text, if any.
fn extract_year(text: &str) -> Option<u32> {
    let bytes = text.as_bytes();
    for window_start in 0..bytes.len().saturating_sub(3) {
        let window = &bytes[window_start..window_start + 4];
        if window[0] == b'2' && window[1] == b'0' && window[2].is_ascii_digit() && window[3].is_ascii_digit() {
            let boundary_ok = bytes
                .get(window_start + 4)
                .map(|b| !b.is_ascii_digit())
                .unwrap_or(true)
                && (window_start == 0 || !bytes[window_start - 1].is_ascii_digit());
            if boundary_ok {
                return std::str::from_utf8(window).ok()?.parse().ok();
            }
        }
    }
    None
}

//! Layered pagination over already-converted page text.
//!
//! Layers run in a fixed order: headings, section, paragraph range, character
//! window. Each layer sees the previous layer's output, and the first three can
//! stop the pipeline with a notice instead of content.

use serde::{Deserialize, Serialize};

pub const NO_HEADINGS_NOTICE: &str = "No headings found in the content.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationOptions {
    pub start_char: Option<usize>,
    pub max_length: Option<usize>,
    pub section: Option<String>,
    pub paragraph_range: Option<String>,
    #[serde(default)]
    pub read_headings: bool,
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

impl PaginationOptions {
    fn has_character_window(&self) -> bool {
        self.start_char.is_some() || self.max_length.is_some()
    }
}

/// Where to resume when the character window cut text off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Continuation {
    pub next_start: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub text: String,
    pub continuation: Option<Continuation>,
}

impl Page {
    fn whole(text: String) -> Self {
        Self {
            text,
            continuation: None,
        }
    }
}

/// Heading depth for lines like `## Title` (1-6 markers then whitespace).
fn heading_level(line: &str) -> Option<usize> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    match line[hashes..].chars().next() {
        Some(c) if c.is_whitespace() => Some(hashes),
        _ => None,
    }
}

pub fn extract_headings(content: &str) -> String {
    let headings: Vec<&str> = content
        .split('\n')
        .filter(|l| heading_level(l).is_some())
        .collect();
    if headings.is_empty() {
        return NO_HEADINGS_NOTICE.to_string();
    }
    headings.join("\n")
}

/// The first heading whose text contains `heading` (case-insensitive), through
/// to the next heading of equal or shallower depth.
pub fn extract_section(content: &str, heading: &str) -> Option<String> {
    let needle = heading.to_lowercase();
    let lines: Vec<&str> = content.split('\n').collect();

    let (start, level) = lines.iter().enumerate().find_map(|(i, l)| {
        let level = heading_level(l)?;
        l[level..]
            .to_lowercase()
            .contains(&needle)
            .then_some((i, level))
    })?;

    let end = lines[start + 1..]
        .iter()
        .position(|l| heading_level(l).is_some_and(|d| d <= level))
        .map(|off| start + 1 + off)
        .unwrap_or(lines.len());

    Some(lines[start..end].join("\n"))
}

fn parse_range(range: &str) -> Option<(usize, Option<Option<usize>>)> {
    let (first, rest) = match range.split_once('-') {
        Some((a, b)) => (a, Some(b)),
        None => (range, None),
    };
    if first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: usize = first.parse().ok()?;
    let end = match rest {
        None => None,
        Some("") => Some(None),
        Some(m) if m.bytes().all(|b| b.is_ascii_digit()) => Some(Some(m.parse().ok()?)),
        Some(_) => return None,
    };
    Some((n, end))
}

/// Paragraphs are blank-line separated and 1-based: `"3"`, `"3-"`, `"2-4"`.
pub fn extract_paragraph_range(content: &str, range: &str) -> Option<String> {
    let paragraphs: Vec<&str> = content
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .collect();

    let (n, end) = parse_range(range.trim())?;
    let start = n.checked_sub(1)?;
    if start >= paragraphs.len() {
        return None;
    }

    let picked = match end {
        None => paragraphs[start].to_string(),
        Some(None) => paragraphs[start..].join("\n\n"),
        Some(Some(m)) => {
            let stop = m.min(paragraphs.len());
            if stop <= start {
                return None;
            }
            paragraphs[start..stop].join("\n\n")
        }
    };
    (!picked.is_empty()).then_some(picked)
}

/// Slice by character (not byte) offsets. A zero `max_length` means "no limit".
pub fn apply_character_pagination(
    content: &str,
    start_char: usize,
    max_length: Option<usize>,
) -> String {
    let len = content.chars().count();
    if start_char >= len {
        return String::new();
    }
    let take = match max_length.filter(|m| *m > 0) {
        Some(m) => m.min(len - start_char),
        None => len - start_char,
    };
    content.chars().skip(start_char).take(take).collect()
}

pub fn apply_pagination(content: &str, opts: &PaginationOptions) -> Page {
    if opts.read_headings {
        return Page::whole(extract_headings(content));
    }

    let mut text = content.to_string();

    // A blank section or range counts as unset.
    if let Some(section) = non_blank(opts.section.as_deref()) {
        match extract_section(&text, section) {
            Some(s) => text = s,
            None => {
                return Page::whole(format!(
                    "Section \"{section}\" not found in the content."
                ))
            }
        }
    }

    if let Some(range) = non_blank(opts.paragraph_range.as_deref()) {
        match extract_paragraph_range(&text, range) {
            Some(p) => text = p,
            None => {
                return Page::whole(format!(
                    "Paragraph range \"{range}\" is invalid or out of bounds."
                ))
            }
        }
    }

    if !opts.has_character_window() {
        return Page::whole(text);
    }

    let start = opts.start_char.unwrap_or(0);
    let total = text.chars().count();
    let continuation = opts.max_length.filter(|m| *m > 0).and_then(|m| {
        let next_start = start.saturating_add(m);
        (start < total && next_start < total).then(|| Continuation {
            next_start,
            remaining: total - next_start,
        })
    });
    Page {
        text: apply_character_pagination(&text, start, opts.max_length),
        continuation,
    }
}

use std::io::Cursor;

use webread_core::{ContentExtractor, MarkdownConverter};

/// Line width handed to html2text. Wide enough that headings and most
/// paragraphs stay on one line.
const TEXT_WIDTH: usize = 400;

/// Convert HTML to readable text with `#`-prefixed headings.
pub fn html_to_text(html: &str, width: usize) -> Result<String, String> {
    // html2text expects bytes; Cursor avoids allocating a second large buffer.
    html2text::from_read(Cursor::new(html.as_bytes()), width).map_err(|e| e.to_string())
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max_chars` of the document with whitespace collapsed.
pub fn html_preview(html: &str, max_chars: usize) -> String {
    let flat = norm_ws(html);
    let mut out: String = flat.chars().take(max_chars).collect();
    if flat.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

fn class_or_id_lc(el: &html_scraper::ElementRef) -> String {
    let mut out = String::new();
    if let Some(c) = el.value().attr("class") {
        out.push_str(c);
        out.push(' ');
    }
    if let Some(i) = el.value().attr("id") {
        out.push_str(i);
    }
    out.to_ascii_lowercase()
}

fn is_boilerplate_container(el: &html_scraper::ElementRef) -> bool {
    let s = class_or_id_lc(el);
    if s.is_empty() {
        return false;
    }
    [
        "nav",
        "menu",
        "sidebar",
        "footer",
        "header",
        "banner",
        "cookie",
        "consent",
        "advert",
        "promo",
        "subscribe",
        "newsletter",
    ]
    .iter()
    .any(|bad| s.contains(bad))
}

fn text_chars(el: &html_scraper::ElementRef) -> usize {
    el.text().map(|t| t.trim().chars().count()).sum()
}

fn link_text_chars(el: &html_scraper::ElementRef, links: &html_scraper::Selector) -> usize {
    el.select(links).map(|a| text_chars(&a)).sum()
}

/// Main-content picker: scores `article`/`main`/`section`/`div` blocks by dense
/// non-link text and returns the winner's HTML so headings survive conversion.
#[derive(Debug, Clone)]
pub struct ScraperExtractor {
    /// Candidate elements inspected before giving up (bounds work on huge pages).
    pub max_elems: usize,
    /// Blocks with less text than this are ignored.
    pub min_text_chars: usize,
}

impl Default for ScraperExtractor {
    fn default() -> Self {
        Self {
            max_elems: 20_000,
            min_text_chars: 20,
        }
    }
}

impl ContentExtractor for ScraperExtractor {
    fn extract_main(&self, html: &str) -> Result<Option<String>, String> {
        let doc = html_scraper::Html::parse_document(html);
        let blocks = html_scraper::Selector::parse("article, main, section, div")
            .map_err(|e| format!("selector: {e}"))?;
        let links =
            html_scraper::Selector::parse("a").map_err(|e| format!("selector: {e}"))?;

        let mut best_score: i64 = 0;
        let mut best: Option<String> = None;
        for el in doc.select(&blocks).take(self.max_elems.max(1)) {
            if is_boilerplate_container(&el) {
                continue;
            }
            let txt = text_chars(&el);
            if txt < self.min_text_chars {
                continue;
            }
            let link_txt = link_text_chars(&el, &links);
            let mut score = txt as i64 - 2 * link_txt as i64;
            match el.value().name() {
                "article" => score += 500,
                "main" => score += 300,
                _ => {}
            }
            if link_txt > txt / 2 {
                score -= 500;
            }
            if score > best_score {
                best_score = score;
                best = Some(el.html());
            }
        }
        Ok(best)
    }
}

#[derive(Debug, Clone)]
pub struct Html2TextConverter {
    pub width: usize,
}

impl Default for Html2TextConverter {
    fn default() -> Self {
        Self { width: TEXT_WIDTH }
    }
}

impl MarkdownConverter for Html2TextConverter {
    fn to_markdown(&self, html: &str) -> Result<String, String> {
        let text = html_to_text(html, self.width)?;
        // Trailing whitespace on every line makes blank-line paragraph splitting flaky.
        Ok(text
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string())
    }
}

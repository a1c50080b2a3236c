//! Markdown catalog parser.
//!
//! Turns the free-for.dev README into a [`CatalogSnapshot`] with a single
//! forward pass over trimmed lines. The pass is a small state machine:
//!
//! ```text
//! SkippingPreamble ──## Title──▶ InCategory ◀──## Title──┐
//!        │                          │                     │
//!        └──## Table of Contents──▶ InTableOfContents ────┤
//!        └──## Contributing|Credits|License──▶ InExcludedSection
//! ```
//!
//! Everything inside a category that is not a bulleted link line is
//! narrative prose and is ignored. Extraction is best-effort: a line that
//! does not yield a well-formed link produces no record, never an error.

use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use crate::error::{CatalogError, Result};
use crate::models::{CatalogSnapshot, Category, ServiceRecord};

const HEADING_MARKER: &str = "## ";
const TABLE_OF_CONTENTS: &str = "Table of Contents";
const EXCLUDED_SECTIONS: [&str; 3] = ["Contributing", "Credits", "License"];

/// Bullet (`*` or `-`) followed by a `[text](target)` link; captures the
/// link text, the target, and everything after the closing parenthesis.
static SERVICE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[*-]\s*\[([^\]]+)\]\(([^)]+)\)(.*)$").expect("service line pattern")
});

static LEADING_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-–—]\s*").expect("leading dash pattern"));

/// Ordered first-match-wins quota patterns applied to the free-tier text.
static LIMITATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\d+[,\d]*\s*(?:requests?|calls?|invocations?|executions?|operations?)(?:/(?:month|day|hour|min))?",
        r"(?i)\d+[,\d]*\s*(?:MB|GB|TB|KB)",
        r"(?i)\d+[,\d]*\s*(?:users?|projects?|apps?|sites?)",
        r"(?i)limited to\s+[^.]+",
        r"(?i)up to\s+[^.]+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("limitation pattern"))
    .collect()
});

/// Ordered keyword → tag rules, matched case-insensitively against the
/// whole source line.
const TAG_RULES: &[(&[&str], &str)] = &[
    (&["api"], "api"),
    (&["free"], "free"),
    (&["open source", "open-source"], "open-source"),
    (&["cloud"], "cloud"),
    (&["database", "db"], "database"),
    (&["hosting"], "hosting"),
    (&["monitoring"], "monitoring"),
    (&["testing"], "testing"),
    (&["email"], "email"),
    (&["storage"], "storage"),
    (&["serverless"], "serverless"),
    (&["ci/cd", "cicd"], "cicd"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    SkippingPreamble,
    InTableOfContents,
    InExcludedSection,
    InCategory,
}

/// Stateless markdown-to-catalog parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogParser;

impl CatalogParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw markdown document into a snapshot.
    ///
    /// Fails only when `raw` is empty or whitespace-only. Categories that
    /// accumulate no services are dropped.
    pub fn parse(&self, raw: &str) -> Result<CatalogSnapshot> {
        if raw.trim().is_empty() {
            return Err(CatalogError::Parse("document is empty".to_string()));
        }

        let mut categories: Vec<Category> = Vec::new();
        let mut current: Option<Category> = None;
        let mut state = ParseState::SkippingPreamble;
        let mut skipped_lines = 0usize;

        for line in raw.lines().map(str::trim) {
            if let Some(title) = line.strip_prefix(HEADING_MARKER) {
                flush(&mut categories, current.take());
                let title = title.trim();
                state = if title == TABLE_OF_CONTENTS {
                    ParseState::InTableOfContents
                } else if EXCLUDED_SECTIONS.contains(&title) {
                    ParseState::InExcludedSection
                } else {
                    current = Some(Category {
                        name: title.to_string(),
                        services: Vec::new(),
                    });
                    ParseState::InCategory
                };
                continue;
            }

            if state != ParseState::InCategory || !is_bullet(line) {
                continue;
            }

            if let Some(category) = current.as_mut() {
                match parse_service_line(line, &category.name) {
                    Some(record) => category.services.push(record),
                    None => skipped_lines += 1,
                }
            }
        }
        flush(&mut categories, current.take());

        let snapshot = CatalogSnapshot::new(categories, Utc::now(), digest(raw));
        tracing::debug!(
            categories = snapshot.categories.len(),
            services = snapshot.services.len(),
            skipped_lines,
            "parsed catalog document"
        );
        Ok(snapshot)
    }
}

fn flush(categories: &mut Vec<Category>, category: Option<Category>) {
    if let Some(category) = category {
        if !category.services.is_empty() {
            categories.push(category);
        }
    }
}

fn is_bullet(line: &str) -> bool {
    line.starts_with('*') || line.starts_with('-')
}

fn digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract one service record from a bulleted link line.
pub fn parse_service_line(line: &str, category: &str) -> Option<ServiceRecord> {
    let caps = SERVICE_LINE.captures(line)?;
    let name = caps.get(1)?.as_str().trim();
    let url = caps.get(2)?.as_str().trim();
    if name.is_empty() || url.is_empty() {
        return None;
    }

    let remainder = caps.get(3).map_or("", |m| m.as_str()).trim();
    let (head, tail) = split_summary(remainder);
    let description = LEADING_DASH.replace(head, "").trim().to_string();
    let free_tier = match tail {
        Some(tail) => tail.trim().to_string(),
        None => description.clone(),
    };

    let (description, free_tier) = match (description.is_empty(), free_tier.is_empty()) {
        (true, false) => (free_tier.clone(), free_tier),
        (false, true) => (description.clone(), description),
        _ => (description, free_tier),
    };

    let tags = extract_tags(line);
    let limitation = extract_limitation(&free_tier);

    Some(ServiceRecord {
        name: name.to_string(),
        url: url.to_string(),
        description,
        free_tier,
        category: category.to_string(),
        limitation,
        tags: if tags.is_empty() { None } else { Some(tags) },
    })
}

/// Split at the first spaced em or en dash.
fn split_summary(text: &str) -> (&str, Option<&str>) {
    let delimiter = [" — ", " – "]
        .iter()
        .filter_map(|d| text.find(d).map(|idx| (idx, d.len())))
        .min_by_key(|(idx, _)| *idx);

    match delimiter {
        Some((idx, len)) => (&text[..idx], Some(&text[idx + len..])),
        None => (text, None),
    }
}

/// Infer tags from keywords in the full source line.
pub fn extract_tags(line: &str) -> Vec<String> {
    let lower = line.to_lowercase();
    let mut tags: Vec<String> = Vec::new();
    for (keywords, tag) in TAG_RULES {
        if keywords.iter().any(|k| lower.contains(k)) && !tags.iter().any(|t| t == tag) {
            tags.push((*tag).to_string());
        }
    }
    tags
}

/// The literal text matched by the first quota pattern that applies.
pub fn extract_limitation(text: &str) -> Option<String> {
    LIMITATION_PATTERNS
        .iter()
        .find_map(|p| p.find(text))
        .map(|m| m.as_str().to_string())
}

//! Record normalization.
//!
//! Rewrites raw collector tuples into the canonical shape: strips honorific
//! titles from researcher names, maps source role strings onto a canonical
//! vocabulary, derives seniority bands, and coerces year strings. Failure is
//! per-record (`CatalogError::MalformedRecord`), never per-batch, so a caller
//! may skip-and-log bad rows without aborting a source.

use crate::error::{CatalogError, Result};
use crate::record::{Level, NormalizedRecord, PublicationKind, RawRecord, RoleOutcome};
use regex::Regex;
use std::sync::LazyLock;

/// Honorific/academic titles stripped from the front of researcher names.
/// Longest forms first so "Associate Professor" wins over "Professor".
const NAME_TITLES: &[&str] = &[
    "Emeritus Professor",
    "Professor Emeritus",
    "Scientia Professor",
    "Professor Scientia",
    "Associate Professor",
    "Professor",
    "Prof.",
    "Prof",
    "Lecturer",
    "EmPr",
    "AsPr",
    "Mrs.",
    "Mrs",
    "Dr.",
    "Dr",
    "Ms.",
    "Ms",
    "Mr.",
    "Mr",
];

/// Canonical role vocabulary: (source form, canonical form).
/// Matched longest-alternative-first so "Senior Lecturer" is never
/// misclassified as "Lecturer".
const ROLE_MAP: &[(&str, &str)] = &[
    ("Professorial Fellow", "Professorial Fellow"),
    ("Professor Emeritus", "Professor Emeritus"),
    ("Emeritus Professor", "Professor Emeritus"),
    ("Associate Professor", "Associate Professor"),
    ("Associate Lecturer", "Associate Lecturer"),
    ("Associate Prof", "Associate Professor"),
    ("Senior Lecturer", "Senior Lecturer"),
    ("Lecturer (A)", "Associate Lecturer"),
    ("Senior Fellow", "Senior Fellow"),
    ("Professor", "Professor"),
    ("Lecturer", "Lecturer"),
    ("Fellow", "Fellow"),
];

/// Teaching-only designations; a record carrying one is excluded outright.
const ROLE_BLACKLIST: &[&str] = &[
    "Education-Focused",
    "Education Focused",
    "Education Focussed",
    "Teaching-Focused",
    "Teaching Focused",
    "Teaching Focussed",
];

static NAME_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alts: Vec<String> = NAME_TITLES.iter().map(|t| regex::escape(t)).collect();
    Regex::new(&format!(r"(?i)^(?:{})\.?\s+", alts.join("|"))).expect("title pattern compiles")
});

static ROLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Append a trailing boundary only to alternatives ending in a word
    // character; "Lecturer (A)" ends in ')' where `\b` can never hold.
    let alts: Vec<String> = ROLE_MAP
        .iter()
        .map(|(src, _)| {
            let escaped = regex::escape(src);
            if src.ends_with(|c: char| c.is_alphanumeric()) {
                format!(r"{}\b", escaped)
            } else {
                escaped
            }
        })
        .collect();
    Regex::new(&format!(r"(?i)\b(?:{})", alts.join("|"))).expect("role pattern compiles")
});

static BLACKLIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alts: Vec<String> = ROLE_BLACKLIST.iter().map(|t| regex::escape(t)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alts.join("|"))).expect("blacklist pattern compiles")
});

/// Derive the seniority band from a canonical role.
fn level_for_role(role: &str) -> Option<Level> {
    match role {
        "Associate Lecturer" => Some(Level::A),
        "Lecturer" | "Fellow" => Some(Level::B),
        "Senior Lecturer" | "Senior Fellow" => Some(Level::C),
        "Associate Professor" => Some(Level::D),
        "Professor" | "Professorial Fellow" | "Professor Emeritus" => Some(Level::E),
        _ => None,
    }
}

/// Strip leading honorific titles from a researcher name.
///
/// Sources stack titles inconsistently ("Emeritus Professor Dr. Jane Smith"),
/// so stripping loops until no leading title remains.
pub fn clean_name(raw: &str) -> String {
    let mut name = raw.trim();
    loop {
        match NAME_TITLE_RE.find(name) {
            Some(m) => name = name[m.end()..].trim_start(),
            None => break,
        }
    }
    name.trim().to_string()
}

/// Map a raw role string (plus the raw name, as a fallback carrier of
/// "Professor"/"Associate Professor") onto a [`RoleOutcome`].
pub fn classify_role(role_text: &str, raw_name: &str) -> RoleOutcome {
    if !role_text.is_empty() && BLACKLIST_RE.is_match(role_text) {
        return RoleOutcome::Excluded;
    }

    let canonical = ROLE_RE
        .find(role_text)
        .and_then(|m| canonical_role(m.as_str()))
        // Some sources only carry the rank inside the name string.
        .or_else(|| {
            let lower = raw_name.to_lowercase();
            if lower.contains("associate professor") {
                Some("Associate Professor")
            } else if lower.contains("professor") {
                Some("Professor")
            } else {
                None
            }
        });

    match canonical {
        Some(role) => match level_for_role(role) {
            Some(level) => RoleOutcome::Recognized {
                role: role.to_string(),
                level,
            },
            None => RoleOutcome::Unknown,
        },
        None => RoleOutcome::Unknown,
    }
}

fn canonical_role(matched: &str) -> Option<&'static str> {
    let lower = matched.to_lowercase();
    ROLE_MAP
        .iter()
        .find(|(src, _)| src.to_lowercase() == lower)
        .map(|(_, canonical)| *canonical)
}

fn empty_to_none(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalize a single raw record.
///
/// Required fields: title, type, researcher name, profile URL. A record
/// missing any of them fails with `MalformedRecord`; year strings that are
/// not purely numeric silently become `None`.
pub fn normalize_record(raw: &RawRecord) -> Result<NormalizedRecord> {
    for (field, value) in [
        ("title", &raw.title),
        ("type", &raw.kind),
        ("researcher name", &raw.researcher_name),
        ("profile URL", &raw.profile_url),
    ] {
        if value.trim().is_empty() {
            return Err(CatalogError::MalformedRecord(format!(
                "missing required field '{}' (title={:?}, researcher={:?})",
                field, raw.title, raw.researcher_name
            )));
        }
    }

    let year = {
        let trimmed = raw.year.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            trimmed.parse::<i32>().ok()
        } else {
            None
        }
    };

    Ok(NormalizedRecord {
        title: raw.title.trim().to_string(),
        year,
        kind: PublicationKind::from_source(&raw.kind),
        journal: empty_to_none(&raw.journal),
        article_url: empty_to_none(&raw.article_url),
        researcher_name: clean_name(&raw.researcher_name),
        profile_url: raw.profile_url.trim().to_string(),
        role: classify_role(raw.role.trim(), &raw.researcher_name),
        field: empty_to_none(&raw.field),
        author_count: None,
    })
}

/// Normalize a batch. Each element carries its own result so the caller can
/// skip-and-log malformed rows without losing the rest of the batch.
pub fn normalize(raw: &[RawRecord]) -> Vec<Result<NormalizedRecord>> {
    raw.iter().map(normalize_record).collect()
}

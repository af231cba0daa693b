//! Record shapes and shared vocabulary.
//!
//! `RawRecord` is the fixed-arity tuple produced by the per-site collector
//! adapters; `NormalizedRecord` is the canonical shape the ingestor consumes.

use serde::{Deserialize, Serialize};

/// Raw publication tuple as returned by a collector adapter.
///
/// Absent optional values are empty strings, never omitted positions.
/// Column order matches the collector CSV layout:
/// Title, Year, Type, Journal Name, Article URL, Researcher Name,
/// Profile URL, Job Title, Field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Journal Name")]
    pub journal: String,
    #[serde(rename = "Article URL")]
    pub article_url: String,
    #[serde(rename = "Researcher Name")]
    pub researcher_name: String,
    #[serde(rename = "Profile URL")]
    pub profile_url: String,
    #[serde(rename = "Job Title")]
    pub role: String,
    #[serde(rename = "Field")]
    pub field: String,
}

/// Normalized publication type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationKind {
    JournalArticle,
    ConferencePaper,
    BookChapter,
    Thesis,
    WorkingPaper,
    Other,
}

impl PublicationKind {
    /// Map a source-specific type string onto the shared vocabulary.
    ///
    /// Some sources append a trailing " ›" breadcrumb artifact; it is
    /// stripped before matching.
    pub fn from_source(raw: &str) -> Self {
        let cleaned = raw.trim().trim_end_matches(" ›").trim().to_lowercase();
        match cleaned.as_str() {
            "journal article" | "article" | "contribution to journal" | "review article" => {
                Self::JournalArticle
            }
            "conference paper" | "conference contribution" | "paper" => Self::ConferencePaper,
            "book chapter" | "chapter" | "chapter in book" => Self::BookChapter,
            "thesis" | "doctoral thesis" | "phd thesis" => Self::Thesis,
            "working paper" | "preprint" | "discussion paper" => Self::WorkingPaper,
            _ => Self::Other,
        }
    }

    /// Stable string form stored in the canonical store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JournalArticle => "journal_article",
            Self::ConferencePaper => "conference_paper",
            Self::BookChapter => "book_chapter",
            Self::Thesis => "thesis",
            Self::WorkingPaper => "working_paper",
            Self::Other => "other",
        }
    }

    /// Inverse of [`as_str`](Self::as_str); unknown strings map to `Other`.
    pub fn from_str_stored(s: &str) -> Self {
        match s {
            "journal_article" => Self::JournalArticle,
            "conference_paper" => Self::ConferencePaper,
            "book_chapter" => Self::BookChapter,
            "thesis" => Self::Thesis,
            "working_paper" => Self::WorkingPaper,
            _ => Self::Other,
        }
    }
}

/// Seniority band derived from the canonical role.
///
/// Ordered A (associate lecturer) through E (professor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    A,
    B,
    C,
    D,
    E,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
        }
    }

    pub fn from_str_stored(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "E" => Some(Self::E),
            _ => None,
        }
    }
}

/// Outcome of role normalization for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleOutcome {
    /// Role matched the canonical vocabulary.
    Recognized { role: String, level: Level },
    /// Role carries a blacklisted (teaching-only) designation; the ingestor
    /// skips the record entirely.
    Excluded,
    /// Role text did not match any known form.
    Unknown,
}

/// Canonical record shape consumed by the ingestor.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub title: String,
    pub year: Option<i32>,
    pub kind: PublicationKind,
    pub journal: Option<String>,
    pub article_url: Option<String>,
    pub researcher_name: String,
    pub profile_url: String,
    pub role: RoleOutcome,
    pub field: Option<String>,
    pub author_count: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_source() {
        assert_eq!(
            PublicationKind::from_source("Journal Article"),
            PublicationKind::JournalArticle
        );
        assert_eq!(
            PublicationKind::from_source("Contribution to journal"),
            PublicationKind::JournalArticle
        );
        assert_eq!(
            PublicationKind::from_source("Conference contribution"),
            PublicationKind::ConferencePaper
        );
        assert_eq!(PublicationKind::from_source("Chapter"), PublicationKind::BookChapter);
        assert_eq!(PublicationKind::from_source("Mystery"), PublicationKind::Other);
    }

    #[test]
    fn test_kind_strips_breadcrumb_artifact() {
        assert_eq!(
            PublicationKind::from_source("Journal Article ›"),
            PublicationKind::JournalArticle
        );
    }

    #[test]
    fn test_kind_round_trip() {
        let kinds = [
            PublicationKind::JournalArticle,
            PublicationKind::ConferencePaper,
            PublicationKind::BookChapter,
            PublicationKind::Thesis,
            PublicationKind::WorkingPaper,
            PublicationKind::Other,
        ];
        for k in kinds {
            assert_eq!(PublicationKind::from_str_stored(k.as_str()), k);
        }
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::A < Level::E);
        assert_eq!(Level::from_str_stored("C"), Some(Level::C));
        assert_eq!(Level::from_str_stored("Z"), None);
    }
}

//! Derived statistics and their process-lifetime cache.
//!
//! Researcher and university snapshots are computed from the canonical store
//! on first request and held until an ingestion, resolution, or catalog write
//! invalidates them. The cache is an explicit handle owned by the caller, not
//! module state; rebuilding fully replaces the cached value, so a redundant
//! concurrent rebuild wastes work but never corrupts.

use crate::error::Result;
use crate::store::{Journal, Store};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// Ranking tiers counted as "top tier" in aggregates.
const TOP_TIERS: &[&str] = &["A*", "A"];

/// Per-researcher derived metrics.
#[derive(Debug, Clone, Serialize)]
pub struct ResearcherStats {
    pub id: i64,
    pub name: String,
    pub university: String,
    pub field: Option<String>,
    pub level: Option<String>,
    pub total_articles: usize,
    pub top_tier: usize,
    pub avg_impact: f64,
    pub avg_impact_5y: f64,
    pub avg_citation_share: f64,
}

/// Per-field slice of a university's aggregate.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldBreakdown {
    pub num_researchers: usize,
    pub total_articles: usize,
    pub avg_articles: f64,
}

/// Per-university derived metrics.
#[derive(Debug, Clone, Serialize)]
pub struct UniversityStats {
    pub name: String,
    pub num_researchers: usize,
    pub total_articles: usize,
    pub top_tier: usize,
    pub avg_impact: f64,
    pub avg_impact_5y: f64,
    pub avg_articles: f64,
    pub fields: BTreeMap<String, FieldBreakdown>,
}

/// Explicit cache handle for both statistics views.
#[derive(Default)]
pub struct StatsCache {
    researcher: Mutex<Option<Arc<Vec<ResearcherStats>>>>,
    university: Mutex<Option<Arc<Vec<UniversityStats>>>>,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop both snapshots. Called after every store write that could affect
    /// counts or ranking tiers.
    pub fn invalidate(&self) {
        *lock(&self.researcher) = None;
        *lock(&self.university) = None;
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Average of the collected values; empty collections yield 0, never an error.
fn avg(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        round2(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Researcher-view snapshot, computed on cache miss.
///
/// A miss rebuilds both views from one pass over the store, so the sibling
/// view is populated as a side effect.
pub fn researcher_stats(store: &Store, cache: &StatsCache) -> Result<Arc<Vec<ResearcherStats>>> {
    if let Some(cached) = lock(&cache.researcher).as_ref() {
        return Ok(Arc::clone(cached));
    }

    let (researcher, university) = build_snapshots(store)?;
    let snapshot = Arc::new(researcher);
    *lock(&cache.researcher) = Some(Arc::clone(&snapshot));
    *lock(&cache.university) = Some(Arc::new(university));
    Ok(snapshot)
}

/// University-view snapshot, computed on cache miss. Same rebuild-both rule
/// as [`researcher_stats`].
pub fn university_stats(store: &Store, cache: &StatsCache) -> Result<Arc<Vec<UniversityStats>>> {
    if let Some(cached) = lock(&cache.university).as_ref() {
        return Ok(Arc::clone(cached));
    }

    let (researcher, university) = build_snapshots(store)?;
    let snapshot = Arc::new(university);
    *lock(&cache.university) = Some(Arc::clone(&snapshot));
    *lock(&cache.researcher) = Some(Arc::new(researcher));
    Ok(snapshot)
}

/// Build both views from a single load of researchers, publications and
/// journals.
fn build_snapshots(store: &Store) -> Result<(Vec<ResearcherStats>, Vec<UniversityStats>)> {
    let researchers = store.researchers()?;
    let publications = store.publications(None)?;
    let journals: HashMap<i64, Journal> =
        store.journals()?.into_iter().map(|j| (j.id, j)).collect();

    let university_of: HashMap<i64, String> = researchers
        .iter()
        .map(|r| (r.id, r.university.clone()))
        .collect();

    let mut pubs_by_researcher: HashMap<i64, Vec<usize>> = HashMap::new();
    for (idx, p) in publications.iter().enumerate() {
        pubs_by_researcher.entry(p.researcher_id).or_default().push(idx);
    }

    let mut researcher_list = Vec::with_capacity(researchers.len());
    for r in researchers {
        let indices = pubs_by_researcher.remove(&r.id).unwrap_or_default();
        let mut top_tier = 0;
        let mut jif = Vec::new();
        let mut jif5 = Vec::new();
        let mut citation = Vec::new();
        for idx in &indices {
            let p = &publications[*idx];
            let Some(journal) = p.journal_id.and_then(|id| journals.get(&id)) else {
                // Unresolved publications contribute to counts only.
                continue;
            };
            if journal.rank.as_deref().is_some_and(|t| TOP_TIERS.contains(&t)) {
                top_tier += 1;
            }
            // A journal lacking a metric is excluded from that average,
            // not treated as zero.
            if let Some(v) = journal.impact_factor {
                jif.push(v);
            }
            if let Some(v) = journal.impact_factor_5y {
                jif5.push(v);
            }
            if let Some(v) = journal.citation_share {
                citation.push(v);
            }
        }
        researcher_list.push(ResearcherStats {
            id: r.id,
            name: r.name,
            university: r.university,
            field: r.field,
            level: r.level,
            total_articles: indices.len(),
            top_tier,
            avg_impact: avg(&jif),
            avg_impact_5y: avg(&jif5),
            avg_citation_share: avg(&citation),
        });
    }

    #[derive(Default)]
    struct Accumulator {
        num_researchers: usize,
        total_articles: usize,
        top_tier: usize,
        jif: Vec<f64>,
        jif5: Vec<f64>,
        fields: BTreeMap<String, FieldBreakdown>,
    }

    let mut unis: BTreeMap<String, Accumulator> = BTreeMap::new();
    for r in &researcher_list {
        let acc = unis.entry(r.university.clone()).or_default();
        acc.num_researchers += 1;
        acc.total_articles += r.total_articles;
        acc.top_tier += r.top_tier;
        if let Some(field) = &r.field {
            let fb = acc.fields.entry(field.clone()).or_default();
            fb.num_researchers += 1;
            fb.total_articles += r.total_articles;
        }
    }

    // University impact averages run over publications, not over researcher
    // averages, so prolific authors weigh in proportionally.
    for p in &publications {
        let Some(uni) = university_of.get(&p.researcher_id) else {
            continue;
        };
        let Some(journal) = p.journal_id.and_then(|id| journals.get(&id)) else {
            continue;
        };
        if let Some(acc) = unis.get_mut(uni) {
            if let Some(v) = journal.impact_factor {
                acc.jif.push(v);
            }
            if let Some(v) = journal.impact_factor_5y {
                acc.jif5.push(v);
            }
        }
    }

    let university_list = unis
        .into_iter()
        .map(|(name, mut acc)| {
            for fb in acc.fields.values_mut() {
                fb.avg_articles = if fb.num_researchers == 0 {
                    0.0
                } else {
                    round2(fb.total_articles as f64 / fb.num_researchers as f64)
                };
            }
            UniversityStats {
                name,
                avg_articles: if acc.num_researchers == 0 {
                    0.0
                } else {
                    round2(acc.total_articles as f64 / acc.num_researchers as f64)
                },
                num_researchers: acc.num_researchers,
                total_articles: acc.total_articles,
                top_tier: acc.top_tier,
                avg_impact: avg(&acc.jif),
                avg_impact_5y: avg(&acc.jif5),
                fields: acc.fields,
            }
        })
        .collect();

    Ok((researcher_list, university_list))
}

// === Presentation-time sorting and ranking ===

/// Sort keys for the researcher view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearcherSortKey {
    TotalArticles,
    TopTier,
    AvgImpact,
    AvgImpact5y,
    AvgCitationShare,
}

impl ResearcherSortKey {
    pub fn value(&self, s: &ResearcherStats) -> f64 {
        match self {
            Self::TotalArticles => s.total_articles as f64,
            Self::TopTier => s.top_tier as f64,
            Self::AvgImpact => s.avg_impact,
            Self::AvgImpact5y => s.avg_impact_5y,
            Self::AvgCitationShare => s.avg_citation_share,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "total_articles" => Some(Self::TotalArticles),
            "top_tier" => Some(Self::TopTier),
            "avg_impact" => Some(Self::AvgImpact),
            "avg_impact_5y" => Some(Self::AvgImpact5y),
            "avg_citation_share" => Some(Self::AvgCitationShare),
            _ => None,
        }
    }
}

/// Sort keys for the university view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniversitySortKey {
    NumResearchers,
    TotalArticles,
    TopTier,
    AvgImpact,
    AvgImpact5y,
    AvgArticles,
}

impl UniversitySortKey {
    pub fn value(&self, s: &UniversityStats) -> f64 {
        match self {
            Self::NumResearchers => s.num_researchers as f64,
            Self::TotalArticles => s.total_articles as f64,
            Self::TopTier => s.top_tier as f64,
            Self::AvgImpact => s.avg_impact,
            Self::AvgImpact5y => s.avg_impact_5y,
            Self::AvgArticles => s.avg_articles,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "num_researchers" => Some(Self::NumResearchers),
            "total_articles" => Some(Self::TotalArticles),
            "top_tier" => Some(Self::TopTier),
            "avg_impact" => Some(Self::AvgImpact),
            "avg_impact_5y" => Some(Self::AvgImpact5y),
            "avg_articles" => Some(Self::AvgArticles),
            _ => None,
        }
    }
}

/// An entry paired with its competition rank.
#[derive(Debug, Clone, Serialize)]
pub struct Ranked<T> {
    pub rank: usize,
    #[serde(flatten)]
    pub entry: T,
}

/// Sort descending by `key` and assign competition ranks: ties share the
/// lower ordinal, the next distinct value resumes at its ordinal position
/// ([10, 10, 8, 5] ranks to [1, 1, 3, 4]).
pub fn rank_by<T: Clone>(items: &[T], key: impl Fn(&T) -> f64) -> Vec<Ranked<T>> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| {
        key(b)
            .partial_cmp(&key(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut out = Vec::with_capacity(sorted.len());
    let mut prev_value = f64::NAN;
    let mut prev_rank = 0;
    for (i, item) in sorted.into_iter().enumerate() {
        let value = key(item);
        let rank = if value == prev_value { prev_rank } else { i + 1 };
        prev_value = value;
        prev_rank = rank;
        out.push(Ranked {
            rank,
            entry: item.clone(),
        });
    }
    out
}

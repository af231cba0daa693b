//! Journal resolution.
//!
//! Fuzzy-matches each publication's scraped journal name against the
//! reference catalog and writes the resolved link. Non-forced runs only
//! consider unlinked publications, so repeated calls after every ingestion
//! converge instead of re-scanning settled matches; `force` resets the
//! selected links first and re-matches from scratch (the policy after a
//! catalog change).

use crate::error::Result;
use crate::similarity::token_set_ratio;
use crate::stats::StatsCache;
use crate::store::Store;
use serde::Serialize;
use tracing::{debug, info};

/// Default similarity threshold. Deliberately strict so unrelated journals
/// are never merged; lower it only for exploratory runs.
pub const DEFAULT_THRESHOLD: u8 = 95;

/// Counters reported by one resolve call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    /// Publications examined (after the skip rules).
    pub processed: usize,
    /// Publications that gained a journal link this call.
    pub matched: usize,
}

/// Resolve journal links for all publications, optionally restricted to one
/// institution's researchers.
pub fn resolve(
    store: &Store,
    cache: &StatsCache,
    threshold: u8,
    force: bool,
    university: Option<&str>,
) -> Result<ResolveReport> {
    // The candidate set is the whole catalog; build it once per call.
    let journals = store.journals()?;
    let mut report = ResolveReport::default();
    let mut links_changed = false;

    if force {
        let cleared = store.clear_journal_links(university)?;
        if cleared > 0 {
            links_changed = true;
        }
        debug!(cleared, "reset journal links before forced re-match");
    }

    let publications = store.publications(university)?;
    info!(
        total = publications.len(),
        threshold, force, "matching journal names against reference catalog"
    );

    for publication in &publications {
        // Already settled (only possible in this run when forced, or in a
        // prior run when not).
        if publication.journal_id.is_some() {
            continue;
        }
        let Some(journal_name) = publication.journal_name.as_deref() else {
            continue;
        };
        report.processed += 1;

        // Stable candidate order (catalog id) keeps tie-breaks deterministic
        // across forced reruns.
        let mut best: Option<(&crate::store::Journal, u8)> = None;
        for candidate in &journals {
            let score = token_set_ratio(journal_name, &candidate.name);
            let improves = match best {
                Some((_, s)) => score > s,
                None => true,
            };
            if improves {
                best = Some((candidate, score));
            }
        }

        if let Some((journal, score)) = best {
            if score >= threshold {
                store.set_journal(publication.id, Some(journal.id))?;
                links_changed = true;
                report.matched += 1;
                debug!(
                    publication = %publication.title,
                    journal = %journal.name,
                    score,
                    "linked journal"
                );
            }
            // Below threshold: a non-match, not an error. The link stays
            // absent rather than storing a low-confidence guess.
        }
    }

    if links_changed {
        cache.invalidate();
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Level, PublicationKind};
    use crate::store::{NewJournal, NewPublication, NewResearcher};

    fn seed(store: &Store, university: &str, journal_name: Option<&str>, title: &str) -> i64 {
        let rid = match store
            .researcher_by_key("Jane Smith", university)
            .expect("query")
        {
            Some(r) => r.id,
            None => store
                .insert_researcher(&NewResearcher {
                    name: "Jane Smith",
                    university,
                    profile_url: None,
                    role: Some("Lecturer"),
                    level: Some(Level::B),
                    field: None,
                })
                .expect("insert researcher"),
        };
        store
            .insert_publication(&NewPublication {
                title,
                year: Some(2020),
                kind: PublicationKind::JournalArticle,
                journal_name,
                url: None,
                author_count: None,
                researcher_id: rid,
            })
            .expect("insert publication")
    }

    fn catalog(store: &Store, names: &[&str]) {
        let entries: Vec<NewJournal> = names
            .iter()
            .map(|n| NewJournal {
                name: n.to_string(),
                rank: Some("A".to_string()),
                publisher: None,
                issn: None,
                eissn: None,
                field_code: None,
                year_inception: None,
            })
            .collect();
        store.replace_journal_catalog(&entries).expect("import");
    }

    #[test]
    fn test_exact_name_matches_at_default_threshold() {
        let store = Store::open_in_memory().expect("open");
        catalog(&store, &["Journal of Finance"]);
        seed(&store, "UA", Some("Journal of Finance"), "Paper one");
        let cache = StatsCache::new();
        let report = resolve(&store, &cache, DEFAULT_THRESHOLD, false, None).expect("resolve");
        assert_eq!(report.processed, 1);
        assert_eq!(report.matched, 1);
        let pubs = store.publications(None).expect("query");
        assert!(pubs[0].journal_id.is_some());
    }

    #[test]
    fn test_abbreviated_name_threshold_window() {
        // "J. of Finance" resolves at 90 but not at 99.
        let store = Store::open_in_memory().expect("open");
        catalog(&store, &["Journal of Finance"]);
        seed(&store, "UA", Some("J. of Finance"), "Paper one");
        let cache = StatsCache::new();

        let strict = resolve(&store, &cache, 99, false, None).expect("resolve");
        assert_eq!(strict.matched, 0);

        let loose = resolve(&store, &cache, 90, false, None).expect("resolve");
        assert_eq!(loose.matched, 1);
    }

    #[test]
    fn test_absent_journal_name_is_skipped() {
        let store = Store::open_in_memory().expect("open");
        catalog(&store, &["Journal of Finance"]);
        seed(&store, "UA", None, "Paper one");
        let cache = StatsCache::new();
        let report = resolve(&store, &cache, 90, false, None).expect("resolve");
        assert_eq!(report.processed, 0);
        assert_eq!(report.matched, 0);
    }

    #[test]
    fn test_nonforced_second_run_matches_nothing_new() {
        let store = Store::open_in_memory().expect("open");
        catalog(&store, &["Journal of Finance"]);
        seed(&store, "UA", Some("Journal of Finance"), "Paper one");
        seed(&store, "UA", Some("Obscure Review Nobody Catalogued"), "Paper two");
        let cache = StatsCache::new();

        let first = resolve(&store, &cache, DEFAULT_THRESHOLD, false, None).expect("resolve");
        assert_eq!(first.matched, 1);

        // Converged: matched rows are skipped, unmatched rows stay unmatched.
        let second = resolve(&store, &cache, DEFAULT_THRESHOLD, false, None).expect("resolve");
        assert_eq!(second.matched, 0);
        assert_eq!(second.processed, 1);
    }

    #[test]
    fn test_forced_rerun_is_deterministic() {
        let store = Store::open_in_memory().expect("open");
        catalog(&store, &["Journal of Finance", "Journal of Banking"]);
        seed(&store, "UA", Some("Journal of Finance"), "Paper one");
        let cache = StatsCache::new();

        resolve(&store, &cache, DEFAULT_THRESHOLD, true, None).expect("resolve");
        let first: Vec<Option<i64>> = store
            .publications(None)
            .expect("query")
            .iter()
            .map(|p| p.journal_id)
            .collect();

        resolve(&store, &cache, DEFAULT_THRESHOLD, true, None).expect("resolve");
        let second: Vec<Option<i64>> = store
            .publications(None)
            .expect("query")
            .iter()
            .map(|p| p.journal_id)
            .collect();
        assert_eq!(first, second);
        assert!(first[0].is_some());
    }

    #[test]
    fn test_force_discards_prior_links_before_matching() {
        let store = Store::open_in_memory().expect("open");
        catalog(&store, &["Journal of Finance"]);
        let pid = seed(&store, "UA", Some("Unmatchable Name"), "Paper one");
        let jid = store
            .journal_by_name("Journal of Finance")
            .expect("query")
            .expect("exists")
            .id;
        // Simulate a stale link from an earlier, looser run.
        store.set_journal(pid, Some(jid)).expect("link");

        let cache = StatsCache::new();
        resolve(&store, &cache, DEFAULT_THRESHOLD, true, None).expect("resolve");
        let pubs = store.publications(None).expect("query");
        assert_eq!(pubs[0].journal_id, None);
    }

    #[test]
    fn test_institution_filter_limits_scope() {
        let store = Store::open_in_memory().expect("open");
        catalog(&store, &["Journal of Finance"]);
        seed(&store, "UA", Some("Journal of Finance"), "UA paper");
        seed(&store, "MU", Some("Journal of Finance"), "MU paper");
        let cache = StatsCache::new();

        let report =
            resolve(&store, &cache, DEFAULT_THRESHOLD, false, Some("UA")).expect("resolve");
        assert_eq!(report.matched, 1);

        let pubs = store.publications(None).expect("query");
        let ua = pubs.iter().find(|p| p.title == "UA paper").expect("present");
        let mu = pubs.iter().find(|p| p.title == "MU paper").expect("present");
        assert!(ua.journal_id.is_some());
        assert!(mu.journal_id.is_none());
    }

    #[test]
    fn test_empty_catalog_matches_nothing() {
        let store = Store::open_in_memory().expect("open");
        seed(&store, "UA", Some("Journal of Finance"), "Paper one");
        let cache = StatsCache::new();
        let report = resolve(&store, &cache, DEFAULT_THRESHOLD, false, None).expect("resolve");
        assert_eq!(report.processed, 1);
        assert_eq!(report.matched, 0);
    }
}

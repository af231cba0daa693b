//! Upsert engine.
//!
//! Merges normalized records into the canonical store. Re-ingesting an
//! identical batch is a no-op apart from the role/level/field last-write-wins
//! rule: sources are authoritative snapshots, not append-only history.

use crate::error::Result;
use crate::record::{NormalizedRecord, RoleOutcome};
use crate::stats::StatsCache;
use crate::store::{NewPublication, NewResearcher, Store};
use serde::Serialize;
use tracing::debug;

/// Counters reported by one ingest call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub researchers_created: usize,
    pub researchers_updated: usize,
    pub publications_created: usize,
    pub skipped_excluded: usize,
}

/// Merge `records` into the store under the given institution.
///
/// Records whose role normalization was [`RoleOutcome::Excluded`] are skipped
/// outright; this is a deliberate filter, not a failure. An
/// [`RoleOutcome::Unknown`] role is not an exclusion: the researcher is
/// ingested with no role or level, and a later source may fill them in.
/// Every write invalidates both statistics views through `cache`.
pub fn ingest(
    store: &Store,
    cache: &StatsCache,
    records: &[NormalizedRecord],
    university: &str,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for record in records {
        let (role, level) = match &record.role {
            RoleOutcome::Excluded => {
                debug!(researcher = %record.researcher_name, "skipping excluded role");
                report.skipped_excluded += 1;
                continue;
            }
            RoleOutcome::Recognized { role, level } => (Some(role.as_str()), Some(*level)),
            RoleOutcome::Unknown => (None, None),
        };

        let researcher_id = match store.researcher_by_key(&record.researcher_name, university)? {
            Some(existing) => {
                let level_str = level.map(|l| l.as_str().to_string());
                if existing.role.as_deref() != role
                    || existing.level != level_str
                    || existing.field != record.field
                {
                    store.update_researcher(existing.id, role, level, record.field.as_deref())?;
                    cache.invalidate();
                    report.researchers_updated += 1;
                }
                existing.id
            }
            None => {
                let id = store.insert_researcher(&NewResearcher {
                    name: &record.researcher_name,
                    university,
                    profile_url: Some(&record.profile_url),
                    role,
                    level,
                    field: record.field.as_deref(),
                })?;
                cache.invalidate();
                report.researchers_created += 1;
                id
            }
        };

        // Publications are immutable once ingested; only the resolver may
        // later write the journal link.
        if store.publication_by_key(&record.title, researcher_id)?.is_none() {
            store.insert_publication(&NewPublication {
                title: &record.title,
                year: record.year,
                kind: record.kind,
                journal_name: record.journal.as_deref(),
                url: record.article_url.as_deref(),
                author_count: record.author_count,
                researcher_id,
            })?;
            cache.invalidate();
            report.publications_created += 1;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_record;
    use crate::record::RawRecord;

    fn jane_record() -> RawRecord {
        RawRecord {
            title: "Title A".to_string(),
            year: "2020".to_string(),
            kind: "Journal Article".to_string(),
            journal: "Journal of Finance".to_string(),
            article_url: "http://x".to_string(),
            researcher_name: "Dr. Jane Smith".to_string(),
            profile_url: "http://p1".to_string(),
            role: "Senior Lecturer".to_string(),
            field: "Finance".to_string(),
        }
    }

    fn normalized(raw: &RawRecord) -> NormalizedRecord {
        normalize_record(raw).expect("valid record")
    }

    #[test]
    fn test_first_ingest_creates_rows() {
        let store = Store::open_in_memory().expect("open");
        let cache = StatsCache::new();
        let report =
            ingest(&store, &cache, &[normalized(&jane_record())], "UA").expect("ingest");
        assert_eq!(report.researchers_created, 1);
        assert_eq!(report.publications_created, 1);

        let r = store
            .researcher_by_key("Jane Smith", "UA")
            .expect("query")
            .expect("exists");
        assert_eq!(r.role.as_deref(), Some("Senior Lecturer"));
        assert_eq!(r.level.as_deref(), Some("C"));
        let pubs = store.publications(None).expect("query");
        assert_eq!(pubs.len(), 1);
        assert_eq!(pubs[0].year, Some(2020));
        assert_eq!(pubs[0].journal_id, None);
    }

    #[test]
    fn test_reingest_is_idempotent() {
        let store = Store::open_in_memory().expect("open");
        let cache = StatsCache::new();
        let records = [normalized(&jane_record())];
        ingest(&store, &cache, &records, "UA").expect("first ingest");
        let second = ingest(&store, &cache, &records, "UA").expect("second ingest");
        assert_eq!(second, IngestReport::default());
        assert_eq!(store.researchers().expect("query").len(), 1);
        assert_eq!(store.publications(None).expect("query").len(), 1);
    }

    #[test]
    fn test_role_change_updates_in_place() {
        let store = Store::open_in_memory().expect("open");
        let cache = StatsCache::new();
        ingest(&store, &cache, &[normalized(&jane_record())], "UA").expect("ingest");

        let mut promoted = jane_record();
        promoted.role = "Professor".to_string();
        let report = ingest(&store, &cache, &[normalized(&promoted)], "UA").expect("ingest");
        assert_eq!(report.researchers_created, 0);
        assert_eq!(report.researchers_updated, 1);
        assert_eq!(report.publications_created, 0);

        let r = store
            .researcher_by_key("Jane Smith", "UA")
            .expect("query")
            .expect("exists");
        assert_eq!(r.role.as_deref(), Some("Professor"));
        assert_eq!(r.level.as_deref(), Some("E"));
    }

    #[test]
    fn test_excluded_role_skips_record_entirely() {
        let store = Store::open_in_memory().expect("open");
        let cache = StatsCache::new();
        let mut raw = jane_record();
        raw.role = "Lecturer (Education-Focused)".to_string();
        let report = ingest(&store, &cache, &[normalized(&raw)], "UA").expect("ingest");
        assert_eq!(report.skipped_excluded, 1);
        assert_eq!(report.researchers_created, 0);
        assert!(store.researchers().expect("query").is_empty());
        assert!(store.publications(None).expect("query").is_empty());
    }

    #[test]
    fn test_unrecognized_role_ingests_with_null_role() {
        let store = Store::open_in_memory().expect("open");
        let cache = StatsCache::new();
        let mut raw = jane_record();
        raw.role = "Casual Tutor".to_string();
        let report = ingest(&store, &cache, &[normalized(&raw)], "UA").expect("ingest");
        // Only blacklisted designations are excluded; an unmatched role
        // still produces the researcher, just without role/level.
        assert_eq!(report.researchers_created, 1);
        assert_eq!(report.skipped_excluded, 0);

        let r = store
            .researcher_by_key("Jane Smith", "UA")
            .expect("query")
            .expect("exists");
        assert_eq!(r.role, None);
        assert_eq!(r.level, None);
    }

    #[test]
    fn test_publications_immutable_after_ingest() {
        let store = Store::open_in_memory().expect("open");
        let cache = StatsCache::new();
        ingest(&store, &cache, &[normalized(&jane_record())], "UA").expect("ingest");

        // Same title, different year: existing row stays untouched.
        let mut changed = jane_record();
        changed.year = "2021".to_string();
        ingest(&store, &cache, &[normalized(&changed)], "UA").expect("ingest");
        let pubs = store.publications(None).expect("query");
        assert_eq!(pubs.len(), 1);
        assert_eq!(pubs[0].year, Some(2020));
    }

    #[test]
    fn test_same_name_different_university_is_distinct() {
        let store = Store::open_in_memory().expect("open");
        let cache = StatsCache::new();
        let records = [normalized(&jane_record())];
        ingest(&store, &cache, &records, "UA").expect("ingest UA");
        let report = ingest(&store, &cache, &records, "MU").expect("ingest MU");
        assert_eq!(report.researchers_created, 1);
        assert_eq!(store.researchers().expect("query").len(), 2);
    }

    #[test]
    fn test_ingest_invalidates_stats_cache() {
        let store = Store::open_in_memory().expect("open");
        let cache = StatsCache::new();
        let before = crate::stats::researcher_stats(&store, &cache).expect("stats");
        assert!(before.is_empty());

        ingest(&store, &cache, &[normalized(&jane_record())], "UA").expect("ingest");
        let after = crate::stats::researcher_stats(&store, &cache).expect("stats");
        assert_eq!(after.len(), 1);
    }
}

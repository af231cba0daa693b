//! Pipeline orchestration.
//!
//! Drives each source through produce -> normalize -> ingest -> resolve,
//! sequentially and with per-source failure isolation: one source blowing up
//! is logged and the remaining sources still run. Progress is reported after
//! every source, success or not, so a poller always reaches 100%.
//!
//! `RunHandle` is the shared state between a background run and its poller:
//! progress (-1..100, -1 meaning aborted with a fatal error), a terminal
//! message, the accumulated log lines, and single-run exclusivity.

use crate::error::{CatalogError, Result};
use crate::ingest::{ingest, IngestReport};
use crate::normalize::normalize;
use crate::record::RawRecord;
use crate::resolve::{resolve, ResolveReport};
use crate::stats::StatsCache;
use crate::store::Store;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

/// A raw-record producer for one institution. Collector adapters implement
/// this; the pipeline treats them as black boxes.
pub trait Source: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &str;
    /// Institution whose records this source produces.
    fn university(&self) -> &str;
    /// Produce the full raw record set for this source.
    fn produce(&self) -> Result<Vec<RawRecord>>;
}

/// Per-source state machine, surfaced in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Pending,
    Producing,
    Normalizing,
    Ingesting,
    Resolving,
    Done,
    Failed,
}

impl SourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Producing => "producing",
            Self::Normalizing => "normalizing",
            Self::Ingesting => "ingesting",
            Self::Resolving => "resolving",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Aggregate outcome of a full run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub sources_total: usize,
    pub sources_failed: usize,
    pub records_skipped: usize,
    pub ingest: IngestReport,
    pub resolve: ResolveReport,
    /// (source name, error description) for each failed source.
    pub failures: Vec<(String, String)>,
}

/// Orchestrates a full run over the canonical store.
pub struct Pipeline<'a> {
    store: &'a Store,
    cache: &'a StatsCache,
    threshold: u8,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a Store, cache: &'a StatsCache, threshold: u8) -> Self {
        Self {
            store,
            cache,
            threshold,
        }
    }

    /// Run every source sequentially.
    ///
    /// `progress` is invoked after each source with `(done / total) * 100`,
    /// on success and on failure alike. `log` receives the cumulative
    /// human-readable lines an external poller displays.
    pub fn run_all(
        &self,
        sources: &[Box<dyn Source>],
        progress: &mut dyn FnMut(i32),
        log: &mut dyn FnMut(&str),
    ) -> RunSummary {
        let mut summary = RunSummary {
            sources_total: sources.len(),
            ..RunSummary::default()
        };

        for (idx, source) in sources.iter().enumerate() {
            let outcome = self.run_source(source.as_ref(), &mut summary, log);
            if let Err(e) = outcome {
                error!(source = source.name(), error = %e, "source failed");
                log(&format!(
                    "[{}] {}: {}",
                    source.name(),
                    SourceState::Failed.as_str(),
                    e
                ));
                summary.sources_failed += 1;
                summary.failures.push((source.name().to_string(), e.to_string()));
            }
            // Progress always advances, even for a failed source.
            let pct = (((idx + 1) as f64 / sources.len() as f64) * 100.0) as i32;
            progress(pct);
        }

        summary
    }

    fn run_source(
        &self,
        source: &dyn Source,
        summary: &mut RunSummary,
        log: &mut dyn FnMut(&str),
    ) -> Result<()> {
        let name = source.name();
        let mut state = SourceState::Pending;
        log(&format!("[{}] {}", name, state.as_str()));

        state = SourceState::Producing;
        log(&format!("[{}] {}", name, state.as_str()));
        let raw = source.produce()?;
        log(&format!("[{}] produced {} raw records", name, raw.len()));

        state = SourceState::Normalizing;
        log(&format!("[{}] {}", name, state.as_str()));
        let mut records = Vec::with_capacity(raw.len());
        for result in normalize(&raw) {
            match result {
                Ok(record) => records.push(record),
                // Malformed rows are skipped, not fatal for the source.
                Err(e) => {
                    warn!(source = name, error = %e, "skipping malformed record");
                    log(&format!("[{}] skipped: {}", name, e));
                    summary.records_skipped += 1;
                }
            }
        }

        state = SourceState::Ingesting;
        log(&format!("[{}] {}", name, state.as_str()));
        let ingest_report = ingest(self.store, self.cache, &records, source.university())?;
        log(&format!(
            "[{}] ingested: {} researchers created, {} updated, {} publications created, {} excluded",
            name,
            ingest_report.researchers_created,
            ingest_report.researchers_updated,
            ingest_report.publications_created,
            ingest_report.skipped_excluded
        ));

        state = SourceState::Resolving;
        log(&format!("[{}] {}", name, state.as_str()));
        let resolve_report = resolve(
            self.store,
            self.cache,
            self.threshold,
            false,
            Some(source.university()),
        )?;
        log(&format!(
            "[{}] resolved: {} matched of {} processed",
            name, resolve_report.matched, resolve_report.processed
        ));

        state = SourceState::Done;
        log(&format!("[{}] {}", name, state.as_str()));
        info!(source = name, state = state.as_str(), "source complete");

        summary.ingest.researchers_created += ingest_report.researchers_created;
        summary.ingest.researchers_updated += ingest_report.researchers_updated;
        summary.ingest.publications_created += ingest_report.publications_created;
        summary.ingest.skipped_excluded += ingest_report.skipped_excluded;
        summary.resolve.processed += resolve_report.processed;
        summary.resolve.matched += resolve_report.matched;
        Ok(())
    }
}

/// A source backed by a collector-produced raw CSV file.
///
/// Column layout is the collector contract: Title, Year, Type, Journal Name,
/// Article URL, Researcher Name, Profile URL, Job Title, Field.
pub struct CsvSource {
    name: String,
    university: String,
    path: PathBuf,
}

impl CsvSource {
    pub fn new(university: impl Into<String>, path: PathBuf) -> Self {
        let university = university.into();
        Self {
            name: university.clone(),
            university,
            path,
        }
    }
}

impl Source for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn university(&self) -> &str {
        &self.university
    }

    fn produce(&self) -> Result<Vec<RawRecord>> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut records = Vec::new();
        for row in reader.deserialize::<RawRecord>() {
            records.push(row?);
        }
        Ok(records)
    }
}

// === Background run handle ===

/// Poller-visible status of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    /// -1 aborted, otherwise 0..=100.
    pub progress: i32,
    pub message: String,
    /// RFC 3339 start time of the current (or last) run.
    pub started_at: Option<String>,
    pub logs: Vec<String>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            progress: 0,
            message: "Not started".to_string(),
            started_at: None,
            logs: Vec::new(),
        }
    }
}

/// Shared handle for the single background pipeline run.
///
/// Exclusivity lives in the handle's state rather than in thread bookkeeping:
/// a trigger while a run is active is rejected, never queued.
#[derive(Default)]
pub struct RunHandle {
    status: Mutex<RunStatus>,
    active: AtomicBool,
}

impl RunHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the handle for a new run. Fails with `ConcurrentRun` if a run
    /// is already active.
    pub fn try_begin(&self) -> Result<()> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CatalogError::ConcurrentRun);
        }
        *self.lock() = RunStatus {
            progress: 0,
            message: "Run started".to_string(),
            started_at: Some(chrono::Local::now().to_rfc3339()),
            logs: Vec::new(),
        };
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn log(&self, line: impl Into<String>) {
        self.lock().logs.push(line.into());
    }

    pub fn set_progress(&self, pct: i32) {
        self.lock().progress = pct;
    }

    /// Terminal success (possibly with per-source failures in the logs).
    pub fn finish(&self, message: impl Into<String>) {
        {
            let mut status = self.lock();
            status.message = message.into();
        }
        self.active.store(false, Ordering::SeqCst);
    }

    /// Terminal fatal failure: progress becomes -1 by convention.
    pub fn fail(&self, message: impl Into<String>) {
        {
            let mut status = self.lock();
            status.progress = -1;
            status.message = message.into();
        }
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn status(&self) -> RunStatus {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    struct FakeSource {
        name: String,
        records: Vec<RawRecord>,
        fail: bool,
    }

    impl FakeSource {
        fn ok(name: &str, records: Vec<RawRecord>) -> Box<dyn Source> {
            Box::new(Self {
                name: name.to_string(),
                records,
                fail: false,
            })
        }

        fn failing(name: &str) -> Box<dyn Source> {
            Box::new(Self {
                name: name.to_string(),
                records: Vec::new(),
                fail: true,
            })
        }
    }

    impl Source for FakeSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn university(&self) -> &str {
            &self.name
        }

        fn produce(&self) -> Result<Vec<RawRecord>> {
            if self.fail {
                Err(CatalogError::Config("site unreachable".to_string()))
            } else {
                Ok(self.records.clone())
            }
        }
    }

    fn record(title: &str, researcher: &str) -> RawRecord {
        RawRecord {
            title: title.to_string(),
            year: "2020".to_string(),
            kind: "Journal Article".to_string(),
            journal: "Journal of Finance".to_string(),
            article_url: "http://x".to_string(),
            researcher_name: researcher.to_string(),
            profile_url: "http://p1".to_string(),
            role: "Lecturer".to_string(),
            field: "Finance".to_string(),
        }
    }

    #[test]
    fn test_run_all_progress_reaches_100_despite_failure() {
        let store = Store::open_in_memory().expect("open");
        let cache = StatsCache::new();
        let pipeline = Pipeline::new(&store, &cache, 95);
        let sources = vec![
            FakeSource::ok("UA", vec![record("Paper one", "Jane Smith")]),
            FakeSource::failing("MU"),
            FakeSource::ok("ANU", vec![record("Paper two", "Kim Lee")]),
        ];

        let mut seen = Vec::new();
        let mut logs = Vec::new();
        let summary = pipeline.run_all(
            &sources,
            &mut |pct| seen.push(pct),
            &mut |line| logs.push(line.to_string()),
        );

        assert_eq!(seen, vec![33, 66, 100]);
        assert_eq!(summary.sources_failed, 1);
        assert_eq!(summary.failures[0].0, "MU");
        // The failing source does not block the later one.
        assert_eq!(summary.ingest.researchers_created, 2);
        assert_eq!(store.researchers().expect("query").len(), 2);
        assert!(logs.iter().any(|l| l.contains("[UA] pending")));
        assert!(logs.iter().any(|l| l.contains("[MU] failed")));
        assert!(logs.iter().any(|l| l.contains("[ANU] done")));
    }

    #[test]
    fn test_malformed_records_are_skipped_not_fatal() {
        let store = Store::open_in_memory().expect("open");
        let cache = StatsCache::new();
        let pipeline = Pipeline::new(&store, &cache, 95);

        let mut bad = record("Bad paper", "Jane Smith");
        bad.title = String::new();
        let sources = vec![FakeSource::ok(
            "UA",
            vec![record("Good paper", "Jane Smith"), bad],
        )];

        let mut logs = Vec::new();
        let summary = pipeline.run_all(&sources, &mut |_| {}, &mut |l| logs.push(l.to_string()));
        assert_eq!(summary.sources_failed, 0);
        assert_eq!(summary.records_skipped, 1);
        assert_eq!(summary.ingest.publications_created, 1);
        assert!(logs.iter().any(|l| l.contains("skipped")));
    }

    #[test]
    fn test_csv_source_round_trip() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(
            b"Title,Year,Type,Journal Name,Article URL,Researcher Name,Profile URL,Job Title,Field\n\
              Title A,2020,Journal Article,Journal of Finance,http://x,Dr. Jane Smith,http://p1,Senior Lecturer,Finance\n",
        )
        .expect("write");

        let source = CsvSource::new("UA", file.path().to_path_buf());
        let records = source.produce().expect("produce");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Title A");
        assert_eq!(records[0].researcher_name, "Dr. Jane Smith");
        assert_eq!(records[0].role, "Senior Lecturer");
    }

    #[test]
    fn test_run_handle_rejects_concurrent_begin() {
        let handle = RunHandle::new();
        handle.try_begin().expect("first begin");
        assert!(matches!(
            handle.try_begin(),
            Err(CatalogError::ConcurrentRun)
        ));
        handle.finish("Completed");
        // A finished handle accepts the next run.
        handle.try_begin().expect("begin after finish");
    }

    #[test]
    fn test_run_handle_failure_convention() {
        let handle = RunHandle::new();
        handle.try_begin().expect("begin");
        handle.log("something went wrong");
        handle.fail("An error occurred: boom");
        let status = handle.status();
        assert_eq!(status.progress, -1);
        assert!(status.message.contains("boom"));
        assert_eq!(status.logs, vec!["something went wrong".to_string()]);
        assert!(!handle.is_active());
    }

    #[test]
    fn test_run_handle_begin_resets_status() {
        let handle = RunHandle::new();
        handle.try_begin().expect("begin");
        handle.set_progress(50);
        handle.log("old line");
        handle.finish("Completed");

        handle.try_begin().expect("second begin");
        let status = handle.status();
        assert_eq!(status.progress, 0);
        assert!(status.logs.is_empty());
        assert!(status.started_at.is_some());
    }
}

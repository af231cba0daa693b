//! Administrative reference-file imports and the master export.
//!
//! Three CSV inputs maintain the reference data around the pipeline: the
//! ranked-journal catalog (full replacement), an impact-metrics file keyed by
//! ISSN (patches metrics without touching tier or identity), and a staff
//! field-override file keyed by researcher name. All of them invalidate the
//! statistics cache.

use crate::error::{CatalogError, Result};
use crate::stats::StatsCache;
use crate::store::{NewJournal, Store};
use csv::StringRecord;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Counters for a journal-catalog import.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CatalogImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Counters for a keyed patch import (impact metrics, staff fields).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PatchReport {
    pub updated: usize,
    pub unmatched: usize,
}

struct Columns {
    header: StringRecord,
}

impl Columns {
    fn new(header: &StringRecord) -> Self {
        let trimmed: StringRecord = header.iter().map(str::trim).collect();
        Self { header: trimmed }
    }

    /// First of `names` present in the header, else an error naming them.
    fn require(&self, names: &[&str]) -> Result<usize> {
        self.find(names).ok_or_else(|| {
            CatalogError::Config(format!("reference file missing column {:?}", names))
        })
    }

    fn find(&self, names: &[&str]) -> Option<usize> {
        self.header
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
    }
}

fn cell<'a>(record: &'a StringRecord, idx: usize) -> Option<&'a str> {
    record.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

/// Import the ranked-journal catalog, replacing the journal table wholesale.
///
/// Expected columns: Journal Title, rating, Publisher, ISSN, ISSN Online,
/// FoR, Year Inception. Rows without a title are skipped with a warning.
pub fn import_journal_catalog<P: AsRef<Path>>(
    store: &Store,
    cache: &StatsCache,
    path: P,
) -> Result<CatalogImportReport> {
    let mut reader = csv::Reader::from_path(path)?;
    let columns = Columns::new(reader.headers()?);
    let title = columns.require(&["Journal Title", "Title"])?;
    let rating = columns.find(&["rating", "2022 rating", "Rating"]);
    let publisher = columns.find(&["Publisher"]);
    let issn = columns.find(&["ISSN"]);
    let eissn = columns.find(&["ISSN Online", "eISSN"]);
    let field_code = columns.find(&["FoR"]);
    let inception = columns.find(&["Year Inception", "Year of Inception"]);

    let mut entries = Vec::new();
    let mut report = CatalogImportReport::default();
    for row in reader.records() {
        let row = row?;
        let Some(name) = cell(&row, title) else {
            warn!("skipping catalog row without a journal title");
            report.skipped += 1;
            continue;
        };
        entries.push(NewJournal {
            name: name.to_string(),
            rank: rating.and_then(|i| cell(&row, i)).map(str::to_string),
            publisher: publisher.and_then(|i| cell(&row, i)).map(str::to_string),
            issn: issn.and_then(|i| cell(&row, i)).map(str::to_string),
            eissn: eissn.and_then(|i| cell(&row, i)).map(str::to_string),
            field_code: field_code.and_then(|i| cell(&row, i)).and_then(|v| v.parse().ok()),
            year_inception: inception.and_then(|i| cell(&row, i)).and_then(|v| v.parse().ok()),
        });
    }

    report.imported = store.replace_journal_catalog(&entries)?;
    cache.invalidate();
    info!(
        imported = report.imported,
        skipped = report.skipped,
        "journal catalog replaced"
    );
    Ok(report)
}

/// Patch impact metrics onto existing journals, keyed by ISSN or eISSN.
///
/// Expected columns: ISSN, JIF, JIF 5 Years, Citation Percentage. Rows whose
/// key matches no catalog entry are counted as unmatched, not errors.
pub fn import_impact_metrics<P: AsRef<Path>>(
    store: &Store,
    cache: &StatsCache,
    path: P,
) -> Result<PatchReport> {
    let mut reader = csv::Reader::from_path(path)?;
    let columns = Columns::new(reader.headers()?);
    let issn = columns.require(&["ISSN", "eISSN"])?;
    let jif = columns.find(&["JIF", "Impact Factor"]);
    let jif5 = columns.find(&["JIF 5 Years", "5 Year JIF", "JIF5"]);
    let citation = columns.find(&["Citation Percentage", "% Citations", "Citation %"]);

    let mut report = PatchReport::default();
    for row in reader.records() {
        let row = row?;
        let Some(key) = cell(&row, issn) else {
            report.unmatched += 1;
            continue;
        };
        let parse = |idx: Option<usize>| idx.and_then(|i| cell(&row, i)).and_then(|v| v.parse::<f64>().ok());
        let n = store.patch_impact_metrics(key, parse(jif), parse(jif5), parse(citation))?;
        if n > 0 {
            report.updated += n;
        } else {
            report.unmatched += 1;
        }
    }

    if report.updated > 0 {
        cache.invalidate();
    }
    info!(
        updated = report.updated,
        unmatched = report.unmatched,
        "impact metrics patched"
    );
    Ok(report)
}

/// Patch field-of-research overrides onto researchers, keyed by name.
///
/// Expected columns: Researcher Name (or Name), Field.
pub fn import_staff_fields<P: AsRef<Path>>(
    store: &Store,
    cache: &StatsCache,
    path: P,
) -> Result<PatchReport> {
    let mut reader = csv::Reader::from_path(path)?;
    let columns = Columns::new(reader.headers()?);
    let name = columns.require(&["Researcher Name", "Name"])?;
    let field = columns.require(&["Field", "FoR"])?;

    let mut report = PatchReport::default();
    for row in reader.records() {
        let row = row?;
        let (Some(name), Some(field)) = (cell(&row, name), cell(&row, field)) else {
            report.unmatched += 1;
            continue;
        };
        let n = store.patch_researcher_field(name, field)?;
        if n > 0 {
            report.updated += n;
        } else {
            report.unmatched += 1;
        }
    }

    if report.updated > 0 {
        cache.invalidate();
    }
    info!(
        updated = report.updated,
        unmatched = report.unmatched,
        "staff fields patched"
    );
    Ok(report)
}

/// Write the master spreadsheet (publication x researcher x journal join) as
/// CSV. Returns the number of rows written.
pub fn export_master<W: Write>(store: &Store, writer: W) -> Result<usize> {
    let rows = store.master_rows()?;
    let mut wtr = csv::Writer::from_writer(writer);
    for row in &rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

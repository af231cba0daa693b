//! SQLite canonical store.
//!
//! The authoritative Researcher/Publication/Journal dataset. Uniqueness is
//! enforced at the schema level: one researcher per (name, university), one
//! publication per (title, researcher), one journal per canonical name.
//! Thread-safe via an internal mutex on the connection.

use crate::error::Result;
use crate::record::{Level, PublicationKind};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A researcher row from the canonical store.
#[derive(Debug, Clone, Serialize)]
pub struct Researcher {
    pub id: i64,
    pub name: String,
    pub university: String,
    pub profile_url: Option<String>,
    pub role: Option<String>,
    pub level: Option<String>,
    pub field: Option<String>,
}

/// A publication row from the canonical store.
#[derive(Debug, Clone, Serialize)]
pub struct Publication {
    pub id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub kind: String,
    pub journal_name: Option<String>,
    pub url: Option<String>,
    pub author_count: Option<i32>,
    pub researcher_id: i64,
    pub journal_id: Option<i64>,
}

/// A journal reference-catalog row.
#[derive(Debug, Clone, Serialize)]
pub struct Journal {
    pub id: i64,
    pub name: String,
    pub rank: Option<String>,
    pub publisher: Option<String>,
    pub issn: Option<String>,
    pub eissn: Option<String>,
    pub field_code: Option<i32>,
    pub year_inception: Option<i32>,
    pub impact_factor: Option<f64>,
    pub impact_factor_5y: Option<f64>,
    pub citation_share: Option<f64>,
}

/// Fields for a new researcher row.
#[derive(Debug, Clone)]
pub struct NewResearcher<'a> {
    pub name: &'a str,
    pub university: &'a str,
    pub profile_url: Option<&'a str>,
    pub role: Option<&'a str>,
    pub level: Option<Level>,
    pub field: Option<&'a str>,
}

/// Fields for a new publication row.
#[derive(Debug, Clone)]
pub struct NewPublication<'a> {
    pub title: &'a str,
    pub year: Option<i32>,
    pub kind: PublicationKind,
    pub journal_name: Option<&'a str>,
    pub url: Option<&'a str>,
    pub author_count: Option<i32>,
    pub researcher_id: i64,
}

/// Fields for a journal catalog entry.
#[derive(Debug, Clone)]
pub struct NewJournal {
    pub name: String,
    pub rank: Option<String>,
    pub publisher: Option<String>,
    pub issn: Option<String>,
    pub eissn: Option<String>,
    pub field_code: Option<i32>,
    pub year_inception: Option<i32>,
}

/// One row of the master spreadsheet export: publication joined with its
/// researcher and (when resolved) its journal.
#[derive(Debug, Clone, Serialize)]
pub struct MasterRow {
    pub title: String,
    pub year: Option<i32>,
    pub kind: String,
    pub journal_name: Option<String>,
    pub url: Option<String>,
    pub researcher: String,
    pub university: String,
    pub role: Option<String>,
    pub level: Option<String>,
    pub field: Option<String>,
    pub matched_journal: Option<String>,
    pub journal_rank: Option<String>,
    pub impact_factor: Option<f64>,
}

/// SQLite-backed canonical store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if necessary) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store. Used by tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS researchers (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                university TEXT NOT NULL,
                profile_url TEXT,
                role TEXT,
                level TEXT,
                field TEXT,
                UNIQUE(name, university)
            );

            CREATE TABLE IF NOT EXISTS journals (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                rank TEXT,
                publisher TEXT,
                issn TEXT,
                eissn TEXT,
                field_code INTEGER,
                year_inception INTEGER,
                impact_factor REAL,
                impact_factor_5y REAL,
                citation_share REAL
            );

            CREATE TABLE IF NOT EXISTS publications (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                year INTEGER,
                kind TEXT NOT NULL,
                journal_name TEXT,
                url TEXT,
                author_count INTEGER,
                researcher_id INTEGER NOT NULL REFERENCES researchers(id) ON DELETE CASCADE,
                journal_id INTEGER REFERENCES journals(id) ON DELETE SET NULL,
                UNIQUE(title, researcher_id)
            );

            CREATE INDEX IF NOT EXISTS idx_publications_researcher
                ON publications(researcher_id);
            CREATE INDEX IF NOT EXISTS idx_publications_journal
                ON publications(journal_id);
            CREATE INDEX IF NOT EXISTS idx_researchers_university
                ON researchers(university);

            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Researchers ===

    /// Look up a researcher by natural key (name, university).
    pub fn researcher_by_key(&self, name: &str, university: &str) -> Result<Option<Researcher>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, name, university, profile_url, role, level, field
                 FROM researchers WHERE name = ?1 AND university = ?2",
                params![name, university],
                researcher_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_researcher(&self, new: &NewResearcher<'_>) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO researchers (name, university, profile_url, role, level, field)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.name,
                new.university,
                new.profile_url,
                new.role,
                new.level.map(|l| l.as_str()),
                new.field
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Last-write-wins update of the mutable researcher attributes.
    pub fn update_researcher(
        &self,
        id: i64,
        role: Option<&str>,
        level: Option<Level>,
        field: Option<&str>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE researchers SET role = ?1, level = ?2, field = ?3 WHERE id = ?4",
            params![role, level.map(|l| l.as_str()), field, id],
        )?;
        Ok(())
    }

    pub fn researchers(&self) -> Result<Vec<Researcher>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, university, profile_url, role, level, field
             FROM researchers ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], researcher_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Patch the field-of-research attribute for every researcher with the
    /// given name. Returns the number of rows updated.
    pub fn patch_researcher_field(&self, name: &str, field: &str) -> Result<usize> {
        let n = self.conn().execute(
            "UPDATE researchers SET field = ?1 WHERE name = ?2",
            params![field, name],
        )?;
        Ok(n)
    }

    /// Administrative full reset of one institution's data: deletes its
    /// researchers and (via cascade) their publications.
    pub fn reset_university(&self, university: &str) -> Result<usize> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM publications WHERE researcher_id IN
               (SELECT id FROM researchers WHERE university = ?1)",
            params![university],
        )?;
        let n = conn.execute(
            "DELETE FROM researchers WHERE university = ?1",
            params![university],
        )?;
        Ok(n)
    }

    // === Publications ===

    /// Look up a publication by natural key (title, researcher).
    pub fn publication_by_key(&self, title: &str, researcher_id: i64) -> Result<Option<Publication>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, title, year, kind, journal_name, url, author_count,
                        researcher_id, journal_id
                 FROM publications WHERE title = ?1 AND researcher_id = ?2",
                params![title, researcher_id],
                publication_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_publication(&self, new: &NewPublication<'_>) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO publications
               (title, year, kind, journal_name, url, author_count, researcher_id, journal_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)",
            params![
                new.title,
                new.year,
                new.kind.as_str(),
                new.journal_name,
                new.url,
                new.author_count,
                new.researcher_id
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All publications, optionally restricted to one institution's researchers.
    pub fn publications(&self, university: Option<&str>) -> Result<Vec<Publication>> {
        let conn = self.conn();
        let mut rows = Vec::new();
        match university {
            Some(uni) => {
                let mut stmt = conn.prepare(
                    "SELECT p.id, p.title, p.year, p.kind, p.journal_name, p.url,
                            p.author_count, p.researcher_id, p.journal_id
                     FROM publications p
                     JOIN researchers r ON r.id = p.researcher_id
                     WHERE r.university = ?1
                     ORDER BY p.id",
                )?;
                for row in stmt.query_map(params![uni], publication_from_row)? {
                    rows.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, title, year, kind, journal_name, url, author_count,
                            researcher_id, journal_id
                     FROM publications ORDER BY id",
                )?;
                for row in stmt.query_map([], publication_from_row)? {
                    rows.push(row?);
                }
            }
        }
        Ok(rows)
    }

    /// Set or clear a publication's resolved journal link.
    pub fn set_journal(&self, publication_id: i64, journal_id: Option<i64>) -> Result<()> {
        self.conn().execute(
            "UPDATE publications SET journal_id = ?1 WHERE id = ?2",
            params![journal_id, publication_id],
        )?;
        Ok(())
    }

    /// Discard resolved journal links, optionally only for one institution.
    /// Returns the number of links cleared.
    pub fn clear_journal_links(&self, university: Option<&str>) -> Result<usize> {
        let conn = self.conn();
        let n = match university {
            Some(uni) => conn.execute(
                "UPDATE publications SET journal_id = NULL
                 WHERE journal_id IS NOT NULL AND researcher_id IN
                   (SELECT id FROM researchers WHERE university = ?1)",
                params![uni],
            )?,
            None => conn.execute(
                "UPDATE publications SET journal_id = NULL WHERE journal_id IS NOT NULL",
                [],
            )?,
        };
        Ok(n)
    }

    // === Journals ===

    pub fn journals(&self) -> Result<Vec<Journal>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, rank, publisher, issn, eissn, field_code,
                    year_inception, impact_factor, impact_factor_5y, citation_share
             FROM journals ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], journal_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn journal_by_name(&self, name: &str) -> Result<Option<Journal>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, name, rank, publisher, issn, eissn, field_code,
                        year_inception, impact_factor, impact_factor_5y, citation_share
                 FROM journals WHERE name = ?1",
                params![name],
                journal_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Replace the journal reference catalog wholesale.
    ///
    /// Existing publication links would dangle against the new catalog, so
    /// they are cleared first; callers re-run the resolver afterwards.
    pub fn replace_journal_catalog(&self, entries: &[NewJournal]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("UPDATE publications SET journal_id = NULL", [])?;
        tx.execute("DELETE FROM journals", [])?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO journals
                   (name, rank, publisher, issn, eissn, field_code, year_inception)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for j in entries {
                inserted += stmt.execute(params![
                    j.name,
                    j.rank,
                    j.publisher,
                    j.issn,
                    j.eissn,
                    j.field_code,
                    j.year_inception
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Patch impact metrics onto the journal matching the given ISSN or
    /// eISSN. Ranking tier and identity are never touched. Returns the number
    /// of rows updated.
    pub fn patch_impact_metrics(
        &self,
        issn: &str,
        impact_factor: Option<f64>,
        impact_factor_5y: Option<f64>,
        citation_share: Option<f64>,
    ) -> Result<usize> {
        let n = self.conn().execute(
            "UPDATE journals
             SET impact_factor = COALESCE(?1, impact_factor),
                 impact_factor_5y = COALESCE(?2, impact_factor_5y),
                 citation_share = COALESCE(?3, citation_share)
             WHERE issn = ?4 OR eissn = ?4",
            params![impact_factor, impact_factor_5y, citation_share, issn],
        )?;
        Ok(n)
    }

    // === Export ===

    /// Joined rows for the master spreadsheet download.
    pub fn master_rows(&self) -> Result<Vec<MasterRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT p.title, p.year, p.kind, p.journal_name, p.url,
                    r.name, r.university, r.role, r.level, r.field,
                    j.name, j.rank, j.impact_factor
             FROM publications p
             JOIN researchers r ON r.id = p.researcher_id
             LEFT JOIN journals j ON j.id = p.journal_id
             ORDER BY r.university, r.name, p.title",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MasterRow {
                    title: row.get(0)?,
                    year: row.get(1)?,
                    kind: row.get(2)?,
                    journal_name: row.get(3)?,
                    url: row.get(4)?,
                    researcher: row.get(5)?,
                    university: row.get(6)?,
                    role: row.get(7)?,
                    level: row.get(8)?,
                    field: row.get(9)?,
                    matched_journal: row.get(10)?,
                    journal_rank: row.get(11)?,
                    impact_factor: row.get(12)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn researcher_from_row(row: &Row<'_>) -> rusqlite::Result<Researcher> {
    Ok(Researcher {
        id: row.get(0)?,
        name: row.get(1)?,
        university: row.get(2)?,
        profile_url: row.get(3)?,
        role: row.get(4)?,
        level: row.get(5)?,
        field: row.get(6)?,
    })
}

fn publication_from_row(row: &Row<'_>) -> rusqlite::Result<Publication> {
    Ok(Publication {
        id: row.get(0)?,
        title: row.get(1)?,
        year: row.get(2)?,
        kind: row.get(3)?,
        journal_name: row.get(4)?,
        url: row.get(5)?,
        author_count: row.get(6)?,
        researcher_id: row.get(7)?,
        journal_id: row.get(8)?,
    })
}

fn journal_from_row(row: &Row<'_>) -> rusqlite::Result<Journal> {
    Ok(Journal {
        id: row.get(0)?,
        name: row.get(1)?,
        rank: row.get(2)?,
        publisher: row.get(3)?,
        issn: row.get(4)?,
        eissn: row.get(5)?,
        field_code: row.get(6)?,
        year_inception: row.get(7)?,
        impact_factor: row.get(8)?,
        impact_factor_5y: row.get(9)?,
        citation_share: row.get(10)?,
    })
}

//! # pubcat
//!
//! Academic publication catalog: ingestion, deduplication, journal
//! resolution and ranking statistics.
//!
//! ## Modules
//!
//! - [`record`] - Raw/normalized record shapes and shared vocabulary
//! - [`normalize`] - Name, role and year normalization
//! - [`store`] - SQLite canonical store (researchers, publications, journals)
//! - [`ingest`] - Idempotent upsert engine
//! - [`similarity`] - Token-set fuzzy scoring
//! - [`resolve`] - Journal name resolution against the reference catalog
//! - [`stats`] - Derived statistics and their cache
//! - [`catalog`] - Reference-file imports and the master export
//! - [`pipeline`] - Per-source orchestration and the background run handle
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pubcat::{ingest, normalize, resolve, stats, store::Store};
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = Store::open("catalog.db")?;
//!     let cache = stats::StatsCache::new();
//!     let records: Vec<pubcat::record::RawRecord> = Vec::new();
//!     let normalized: Vec<_> = normalize::normalize(&records)
//!         .into_iter()
//!         .filter_map(Result::ok)
//!         .collect();
//!     let report = ingest::ingest(&store, &cache, &normalized, "UA")?;
//!     println!("created {} publications", report.publications_created);
//!     resolve::resolve(&store, &cache, resolve::DEFAULT_THRESHOLD, false, Some("UA"))?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod resolve;
pub mod similarity;
pub mod stats;
pub mod store;

pub use error::{CatalogError, Result};

//! pubcat - Academic publication catalog pipeline
//!
//! Ingests scraped publication records into a canonical store, resolves
//! journal names against a ranked reference catalog, and serves derived
//! researcher/university statistics.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! pubcat ingest UA_data.csv --university UA --db catalog.db
//! pubcat match-journals --db catalog.db --threshold 95
//! pubcat stats --view researchers --sort-by total_articles --db catalog.db
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! pubcat serve --port 3000 --db catalog.db --sources ./sources
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use clap::{Parser, Subcommand};
use pubcat::catalog;
use pubcat::ingest::ingest;
use pubcat::normalize::normalize;
use pubcat::pipeline::{CsvSource, Pipeline, RunHandle, RunStatus, Source};
use pubcat::resolve::{resolve, DEFAULT_THRESHOLD};
use pubcat::stats::{
    self, ResearcherSortKey, ResearcherStats, StatsCache, UniversitySortKey, UniversityStats,
};
use pubcat::store::Store;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Academic publication catalog - ingestion and ranking pipeline
#[derive(Parser)]
#[command(name = "pubcat")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Path to the canonical store
    #[arg(long, global = true, default_value = "catalog.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a raw collector CSV for one institution
    Ingest {
        /// Raw record CSV (collector column layout)
        file: PathBuf,

        /// Institution the records belong to
        #[arg(short, long)]
        university: String,

        /// Skip journal resolution after the ingest
        #[arg(long)]
        no_resolve: bool,

        /// Similarity threshold for resolution (0-100)
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: u8,
    },

    /// Fuzzy-match publication journal names against the reference catalog
    MatchJournals {
        /// Similarity threshold (0-100)
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: u8,

        /// Discard existing links and re-match from scratch
        #[arg(long)]
        force: bool,

        /// Restrict to one institution
        #[arg(long)]
        university: Option<String>,
    },

    /// Replace the journal reference catalog from a ranked-journal CSV
    ImportJournals {
        /// Catalog CSV (Journal Title, rating, Publisher, ISSN, ...)
        file: PathBuf,
    },

    /// Patch impact metrics onto the catalog, keyed by ISSN
    ImportMetrics {
        /// Metrics CSV (ISSN, JIF, JIF 5 Years, Citation Percentage)
        file: PathBuf,
    },

    /// Patch researcher field-of-research overrides, keyed by name
    ImportFields {
        /// Overrides CSV (Researcher Name, Field)
        file: PathBuf,
    },

    /// Print ranked derived statistics
    Stats {
        /// View: researchers or universities
        #[arg(long, default_value = "researchers", value_parser = ["researchers", "universities"])]
        view: String,

        /// Sort key (view-specific, e.g. total_articles, avg_impact)
        #[arg(long)]
        sort_by: Option<String>,
    },

    /// Write the master spreadsheet (publications x researchers x journals)
    Export {
        /// Output CSV path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Administrative reset: delete one institution's researchers and publications
    Reset {
        /// Institution to wipe
        #[arg(long)]
        university: String,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Directory of per-institution raw CSV sources for full runs
        #[arg(long, default_value = "./sources")]
        sources: PathBuf,

        /// Similarity threshold for resolution during full runs
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: u8,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let store = Store::open(&cli.db).context("Failed to open canonical store")?;
    let cache = StatsCache::new();

    match cli.command {
        Commands::Ingest {
            file,
            university,
            no_resolve,
            threshold,
        } => run_ingest(&store, &cache, &file, &university, !no_resolve, threshold),
        Commands::MatchJournals {
            threshold,
            force,
            university,
        } => {
            let report = resolve(&store, &cache, threshold, force, university.as_deref())?;
            println!(
                "Matched {} of {} processed publications",
                report.matched, report.processed
            );
            Ok(())
        }
        Commands::ImportJournals { file } => {
            let report = catalog::import_journal_catalog(&store, &cache, &file)?;
            println!(
                "Imported {} journals ({} rows skipped)",
                report.imported, report.skipped
            );
            Ok(())
        }
        Commands::ImportMetrics { file } => {
            let report = catalog::import_impact_metrics(&store, &cache, &file)?;
            println!(
                "Patched {} journals ({} rows unmatched)",
                report.updated, report.unmatched
            );
            Ok(())
        }
        Commands::ImportFields { file } => {
            let report = catalog::import_staff_fields(&store, &cache, &file)?;
            println!(
                "Patched {} researchers ({} rows unmatched)",
                report.updated, report.unmatched
            );
            Ok(())
        }
        Commands::Stats { view, sort_by } => run_stats(&store, &cache, &view, sort_by.as_deref()),
        Commands::Export { output } => {
            let written = match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    catalog::export_master(&store, file)?
                }
                None => catalog::export_master(&store, std::io::stdout())?,
            };
            info!(rows = written, "master export complete");
            Ok(())
        }
        Commands::Reset { university } => {
            let removed = store.reset_university(&university)?;
            cache.invalidate();
            println!("Removed {} researchers from {}", removed, university);
            Ok(())
        }
        Commands::Serve {
            port,
            host,
            sources,
            threshold,
        } => run_server(store, cache, host, port, sources, threshold).await,
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

fn run_ingest(
    store: &Store,
    cache: &StatsCache,
    file: &Path,
    university: &str,
    run_resolve: bool,
    threshold: u8,
) -> Result<()> {
    let source = CsvSource::new(university, file.to_path_buf());
    let raw = source.produce()?;
    println!("Read {} raw records from {}", raw.len(), file.display());

    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for result in normalize(&raw) {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                error!(error = %e, "skipping malformed record");
                skipped += 1;
            }
        }
    }

    let report = ingest(store, cache, &records, university)?;
    println!(
        "Ingested: {} researchers created, {} updated, {} publications created, {} excluded, {} malformed",
        report.researchers_created,
        report.researchers_updated,
        report.publications_created,
        report.skipped_excluded,
        skipped
    );

    if run_resolve {
        let resolved = resolve(store, cache, threshold, false, Some(university))?;
        println!(
            "Resolved: {} matched of {} processed",
            resolved.matched, resolved.processed
        );
    }
    Ok(())
}

fn run_stats(store: &Store, cache: &StatsCache, view: &str, sort_by: Option<&str>) -> Result<()> {
    match view {
        "researchers" => {
            let key = sort_by
                .map(|s| {
                    ResearcherSortKey::parse(s)
                        .with_context(|| format!("Unknown researcher sort key: {}", s))
                })
                .transpose()?
                .unwrap_or(ResearcherSortKey::TotalArticles);
            let snapshot = stats::researcher_stats(store, cache)?;
            let ranked = stats::rank_by(&snapshot, |r| key.value(r));
            for row in &ranked {
                println!(
                    "{:>4}. {} ({}) articles={} top_tier={} avg_impact={}",
                    row.rank,
                    row.entry.name,
                    row.entry.university,
                    row.entry.total_articles,
                    row.entry.top_tier,
                    row.entry.avg_impact
                );
            }
        }
        "universities" => {
            let key = sort_by
                .map(|s| {
                    UniversitySortKey::parse(s)
                        .with_context(|| format!("Unknown university sort key: {}", s))
                })
                .transpose()?
                .unwrap_or(UniversitySortKey::NumResearchers);
            let snapshot = stats::university_stats(store, cache)?;
            let ranked = stats::rank_by(&snapshot, |u| key.value(u));
            for row in &ranked {
                println!(
                    "{:>4}. {} researchers={} articles={} top_tier={} avg_impact={}",
                    row.rank,
                    row.entry.name,
                    row.entry.num_researchers,
                    row.entry.total_articles,
                    row.entry.top_tier,
                    row.entry.avg_impact
                );
            }
        }
        other => anyhow::bail!("Invalid view: {}", other),
    }
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

struct AppState {
    store: Store,
    cache: StatsCache,
    handle: Arc<RunHandle>,
    sources_dir: PathBuf,
    threshold: u8,
}

async fn run_server(
    store: Store,
    cache: StatsCache,
    host: String,
    port: u16,
    sources_dir: PathBuf,
    threshold: u8,
) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let app_state = Arc::new(AppState {
        store,
        cache,
        handle: Arc::new(RunHandle::new()),
        sources_dir,
        threshold,
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/researchers", get(researchers_handler))
        .route("/universities", get(universities_handler))
        .route("/admin/run-pipeline", post(run_pipeline_handler))
        .route("/admin/pipeline-status", get(pipeline_status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    sort_by: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatsResponse<T> {
    sort_by: String,
    count: usize,
    results: Vec<stats::Ranked<T>>,
}

/// Ranked researcher statistics
async fn researchers_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse<ResearcherStats>>, (StatusCode, String)> {
    let key = match query.sort_by.as_deref() {
        Some(s) => ResearcherSortKey::parse(s)
            .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Unknown sort key: {}", s)))?,
        None => ResearcherSortKey::TotalArticles,
    };
    let snapshot = stats::researcher_stats(&state.store, &state.cache)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let results = stats::rank_by(&snapshot, |r| key.value(r));
    Ok(Json(StatsResponse {
        sort_by: query.sort_by.unwrap_or_else(|| "total_articles".to_string()),
        count: results.len(),
        results,
    }))
}

/// Ranked university statistics
async fn universities_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse<UniversityStats>>, (StatusCode, String)> {
    let key = match query.sort_by.as_deref() {
        Some(s) => UniversitySortKey::parse(s)
            .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Unknown sort key: {}", s)))?,
        None => UniversitySortKey::NumResearchers,
    };
    let snapshot = stats::university_stats(&state.store, &state.cache)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let results = stats::rank_by(&snapshot, |u| key.value(u));
    Ok(Json(StatsResponse {
        sort_by: query.sort_by.unwrap_or_else(|| "num_researchers".to_string()),
        count: results.len(),
        results,
    }))
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    message: String,
}

/// Start a full pipeline run in the background.
///
/// Returns 202 on acceptance; 409 if a run is already active (concurrent
/// triggers are rejected outright, never queued).
async fn run_pipeline_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<TriggerResponse>) {
    if state.handle.try_begin().is_err() {
        return (
            StatusCode::CONFLICT,
            Json(TriggerResponse {
                message: "Pipeline is already running.".to_string(),
            }),
        );
    }

    let task_state = Arc::clone(&state);
    let task_handle = Arc::clone(&state.handle);
    tokio::task::spawn_blocking(move || {
        run_guarded(&task_handle, move || run_pipeline_task(task_state));
    });

    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            message: "Pipeline started".to_string(),
        }),
    )
}

/// Poll endpoint for progress, terminal message and log lines.
async fn pipeline_status_handler(State(state): State<Arc<AppState>>) -> Json<RunStatus> {
    Json(state.handle.status())
}

/// Run the task body, turning a panic into a failed run. Without this a
/// panicking task would leave the handle claimed and every later trigger
/// would be rejected as a concurrent run.
fn run_guarded(handle: &RunHandle, task: impl FnOnce()) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
        handle.fail("An error occurred: pipeline run aborted unexpectedly");
    }
}

/// Body of the background pipeline run; owns the handle lifecycle.
fn run_pipeline_task(state: Arc<AppState>) {
    let handle = Arc::clone(&state.handle);
    let sources = match discover_sources(&state.sources_dir) {
        Ok(sources) if !sources.is_empty() => sources,
        Ok(_) => {
            handle.fail(format!(
                "An error occurred: no source CSVs in {}",
                state.sources_dir.display()
            ));
            return;
        }
        Err(e) => {
            handle.fail(format!("An error occurred: {}", e));
            return;
        }
    };

    let pipeline = Pipeline::new(&state.store, &state.cache, state.threshold);
    let summary = pipeline.run_all(
        &sources,
        &mut |pct| handle.set_progress(pct),
        &mut |line| handle.log(line),
    );

    if summary.sources_failed > 0 {
        handle.log(format!(
            "Completed with {} source failure(s)",
            summary.sources_failed
        ));
    }
    handle.finish("Completed successfully!");
    info!(
        sources = summary.sources_total,
        failed = summary.sources_failed,
        "pipeline run complete"
    );
}

/// One source per `*.csv` file in the directory; the file stem names the
/// institution. Sorted for a stable run order.
fn discover_sources(dir: &Path) -> pubcat::Result<Vec<Box<dyn Source>>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    paths.sort();

    let mut sources: Vec<Box<dyn Source>> = Vec::with_capacity(paths.len());
    for path in paths {
        let university = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.trim_end_matches("_data").to_string())
            .ok_or_else(|| {
                pubcat::CatalogError::Config(format!("unreadable source name: {}", path.display()))
            })?;
        sources.push(Box::new(CsvSource::new(university, path)));
    }
    Ok(sources)
}

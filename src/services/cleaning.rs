//! Concurrent record cleaning.
//!
//! A batch of raw records is split into contiguous chunks, one worker task per
//! chunk validates its records, and accepted rows are written to
//! `cleaned_weather`. SQLite allows one writer at a time, so every worker
//! takes a shared write lock and commits its chunk in a single transaction.
//! Readers see either none or all of a chunk's rows.
//!
//! Workers are joined as a fixed set. No result is reported until every
//! worker has finished. A worker that cannot write its chunk is reported as a
//! `ChunkFailure`, separately from records rejected by validation.

use futures::future::join_all;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::{now_timestamp, queries, schema};
use crate::errors::AppError;
use crate::services::validator::{validate_record, RawRecord, TempRange, ValidatedObservation};

/// Per-chunk counts. `cleaned + skipped` always equals the chunk length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningOutcome {
    pub cleaned: usize,
    pub skipped: usize,
}

impl CleaningOutcome {
    pub fn merge(self, other: CleaningOutcome) -> CleaningOutcome {
        CleaningOutcome {
            cleaned: self.cleaned + other.cleaned,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// A chunk whose worker hit an infrastructure failure. None of its rows were kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub records: usize,
    pub error: String,
}

/// Merged result of one cleaning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningSummary {
    /// Length of the original batch.
    pub total: usize,
    pub cleaned: usize,
    pub skipped: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

impl CleaningSummary {
    pub fn failed_records(&self) -> usize {
        self.failed_chunks.iter().map(|f| f.records).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty()
    }
}

/// Split `records` into exactly `workers` contiguous chunks, order preserved.
///
/// Every chunk but the last takes `ceil(n / workers)` records (fewer once the
/// input runs out), and the last chunk takes whatever remains. Trailing chunks
/// may be empty when `n < workers`. A `workers` of 0 is treated as 1.
/// One chunk is built per worker, so callers bound `workers`.
pub fn partition(records: Vec<RawRecord>, workers: usize) -> Vec<Vec<RawRecord>> {
    let workers = workers.max(1);
    let n = records.len();
    let chunk_size = n.div_ceil(workers);

    let mut chunks = Vec::new();
    let mut rest = records.into_iter();
    for _ in 0..workers - 1 {
        chunks.push(rest.by_ref().take(chunk_size).collect());
    }
    chunks.push(rest.collect());
    chunks
}

/// Validate one chunk and persist its accepted records.
///
/// Validation runs without the lock. The write lock is then held for the
/// chunk's single insert transaction.
pub async fn clean_chunk(
    pool: &SqlitePool,
    write_lock: &Mutex<()>,
    chunk: &[RawRecord],
    range: TempRange,
) -> Result<CleaningOutcome, sqlx::Error> {
    let mut accepted: Vec<ValidatedObservation> = Vec::with_capacity(chunk.len());
    let mut skipped = 0;

    for record in chunk {
        match validate_record(record, range) {
            Ok(obs) => accepted.push(obs),
            Err(rejection) => {
                tracing::debug!("Skipping record {:?}: {}", record.city, rejection);
                skipped += 1;
            }
        }
    }

    if !accepted.is_empty() {
        let _guard = write_lock.lock().await;
        let mut tx = pool.begin().await?;
        for obs in &accepted {
            queries::insert_cleaned_record(&mut tx, obs).await?;
        }
        tx.commit().await?;
    }

    Ok(CleaningOutcome {
        cleaned: accepted.len(),
        skipped,
    })
}

/// Clean a whole batch with `workers` parallel workers.
///
/// Returns `Err` only when the destination table cannot be created. Worker
/// failures are reported in `CleaningSummary::failed_chunks`, and sibling
/// chunks still complete.
pub async fn clean_and_store(
    pool: &SqlitePool,
    records: Vec<RawRecord>,
    workers: usize,
    range: TempRange,
) -> Result<CleaningSummary, AppError> {
    schema::ensure_cleaned_table(pool).await?;

    let total = records.len();
    // More workers than records only adds empty chunks.
    let workers = workers.clamp(1, total.max(1));
    let chunks = partition(records, workers);
    let write_lock = Arc::new(Mutex::new(()));

    let mut handles = Vec::new();
    for (chunk_index, chunk) in chunks.into_iter().enumerate() {
        if chunk.is_empty() {
            continue;
        }
        let pool = pool.clone();
        let write_lock = write_lock.clone();
        let len = chunk.len();
        let handle = tokio::spawn(async move {
            clean_chunk(&pool, &write_lock, &chunk, range).await
        });
        handles.push((chunk_index, len, handle));
    }

    tracing::debug!(
        "Cleaning {} records with {} active workers",
        total,
        handles.len()
    );

    let (meta, futures): (Vec<_>, Vec<_>) = handles
        .into_iter()
        .map(|(index, len, handle)| ((index, len), handle))
        .unzip();
    let results = join_all(futures).await;

    let mut merged = CleaningOutcome::default();
    let mut failed_chunks = Vec::new();
    for ((chunk_index, records), joined) in meta.into_iter().zip(results) {
        let error = match joined {
            Ok(Ok(outcome)) => {
                merged = merged.merge(outcome);
                continue;
            }
            Ok(Err(e)) => format!("store write failed: {}", e),
            Err(e) => format!("worker aborted: {}", e),
        };
        tracing::error!(
            "Cleaning worker for chunk {} ({} records) failed: {}",
            chunk_index,
            records,
            error
        );
        failed_chunks.push(ChunkFailure {
            chunk_index,
            records,
            error,
        });
    }

    let summary = CleaningSummary {
        total,
        cleaned: merged.cleaned,
        skipped: merged.skipped,
        failed_chunks,
    };

    tracing::info!(
        "Cleaning complete: {} total, {} cleaned, {} skipped, {} failed chunks",
        summary.total,
        summary.cleaned,
        summary.skipped,
        summary.failed_chunks.len(),
    );

    Ok(summary)
}

/// Append the run to `cleaning_log` and return its `run_id`.
///
/// A run with failed chunks is not logged: the table has no column for
/// unprocessed records, so its counts would not add up to `total`.
pub async fn log_cleaning_run(
    pool: &SqlitePool,
    summary: &CleaningSummary,
) -> Result<Option<i64>, AppError> {
    if !summary.is_complete() {
        tracing::warn!(
            "Cleaning run not logged: {} of {} records were not processed",
            summary.failed_records(),
            summary.total
        );
        return Ok(None);
    }

    schema::ensure_cleaning_log_table(pool).await?;
    let run_id = queries::insert_cleaning_log(
        pool,
        &now_timestamp(),
        summary.total as i64,
        summary.cleaned as i64,
        summary.skipped as i64,
    )
    .await?;
    tracing::info!("Recorded cleaning run {}", run_id);
    Ok(Some(run_id))
}

/// A small messy batch for demos and smoke runs.
pub fn sample_batch() -> Vec<RawRecord> {
    vec![
        RawRecord::new("  Tokyo ", " 29.5 ", " Sunny "),
        RawRecord::new("Chennai", "N/A", "  Cloudy"),
        RawRecord::new("London", "15C", "Rainy "),
        RawRecord::new("", "25.3", "Clear"),
        RawRecord::new("Kolkata", " 42 ", ""),
        RawRecord::new("Delhi", "38.2", "Hazy"),
        RawRecord::new("Mumbai", "", "Humid"),
        RawRecord::new("Auckland", "17", "Windy"),
    ]
}

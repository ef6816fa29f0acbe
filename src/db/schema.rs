//! Idempotent table creation.
//!
//! Every statement is `CREATE TABLE IF NOT EXISTS`, so each job can call the
//! `ensure_*` function for the tables it touches on every run.

use sqlx::SqlitePool;

/// Tables written by the ingestion job.
pub async fn ensure_ingest_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS weather (
            city TEXT,
            date TEXT,
            state TEXT,
            temp REAL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS last_updated (
            city TEXT PRIMARY KEY,
            last_fetch TEXT
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn ensure_cleaned_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS cleaned_weather (
            city TEXT,
            temperature REAL,
            condition TEXT
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn ensure_cleaning_log_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS cleaning_log (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT,
            total_records INTEGER,
            cleaned INTEGER,
            skipped INTEGER
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn ensure_daily_summary_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS daily_summary (
            city TEXT,
            date TEXT,
            avg_temp REAL,
            min_temp REAL,
            max_temp REAL,
            category TEXT,
            PRIMARY KEY (city, date)
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn ensure_all(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    ensure_ingest_tables(pool).await?;
    ensure_cleaned_table(pool).await?;
    ensure_cleaning_log_table(pool).await?;
    ensure_daily_summary_table(pool).await?;
    Ok(())
}

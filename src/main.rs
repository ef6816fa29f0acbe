// Weather Pipeline v0.1
use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod logging;
mod routes;
mod services;

use config::AppConfig;
use errors::AppError;
use services::scheduler::{JobContext, SchedulerState, SharedSchedulerState};
use services::validator::RawRecord;
use services::wttr::WttrClient;

/// Weather Pipeline API: OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Weather Pipeline API",
        version = "0.1.0",
        description = "Scheduled weather ingestion from wttr.in, parallel cleaning of \
            raw records, daily per-city summaries, CSV export and text reports, \
            all persisted to a local SQLite store.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Scheduler", description = "Background job scheduler status"),
        (name = "Summaries", description = "Daily summaries, city freshness and cleaning runs"),
    ),
    paths(
        routes::health::health_check,
        routes::scheduler::get_scheduler_status,
        routes::summaries::list_summaries,
        routes::summaries::list_freshness,
        routes::summaries::list_cleaning_runs,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            services::scheduler::SchedulerState,
            services::scheduler::JobStatus,
            services::scheduler::JobKind,
            db::models::DailySummary,
            db::models::CityFreshness,
            db::models::CleaningRunLog,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[derive(Parser)]
#[command(
    name = "weather-pipeline",
    about = "Weather ingestion, cleaning and reporting pipeline"
)]
struct Cli {
    /// JSON config file. Falls back to PIPELINE_CONFIG, then environment variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the HTTP API (default).
    Serve,
    /// Fetch every configured city once.
    Ingest,
    /// Clean a batch of raw records in parallel, log the run and write a report.
    Clean {
        /// JSON array of {city, temperature, condition}. Defaults to a built-in sample batch.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Worker count. Defaults to the configured worker_count.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Recompute the daily summary table.
    Summarize,
    /// Export the weather table to CSV.
    Export,
    /// Write a text report from the cleaned records.
    Report,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    // Dropped on return, which flushes the file log.
    let _log_guard = logging::init_logging(Path::new(&config.log_dir));

    match run(cli.command.unwrap_or(Commands::Serve), config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(severity = "critical", "{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, AppError> {
    match path {
        Some(path) => AppConfig::from_file(path),
        None => match std::env::var("PIPELINE_CONFIG") {
            Ok(path) => AppConfig::from_file(Path::new(&path)),
            Err(_) => AppConfig::from_env(),
        },
    }
}

async fn run(command: Commands, config: AppConfig) -> Result<(), AppError> {
    let pool = db::connect(&config.db_path).await?;
    db::schema::ensure_all(&pool).await?;
    tracing::info!("Store ready at {}", config.db_path);

    let output_folder = PathBuf::from(&config.output_folder);
    let thresholds = config.temperature_thresholds;

    match command {
        Commands::Serve => serve(pool, config).await,
        Commands::Ingest => {
            let client = WttrClient::new(&config.weather_base_url, config.request_timeout())?;
            let ctx = JobContext::from_config(pool, client, &config);
            services::ingest::run_ingestion(&ctx.pool, &ctx.client, &ctx.ingest).await?;
            Ok(())
        }
        Commands::Clean { input, workers } => {
            let records = match input {
                Some(path) => read_raw_records(&path)?,
                None => services::cleaning::sample_batch(),
            };
            let workers = resolve_workers(workers, &config)?;
            let summary =
                services::cleaning::clean_and_store(&pool, records, workers, config.temp_range())
                    .await?;
            services::cleaning::log_cleaning_run(&pool, &summary).await?;
            services::report::generate_weather_report(&pool, &thresholds, &output_folder).await?;
            if !summary.is_complete() {
                return Err(AppError::Internal(format!(
                    "{} of {} records were not processed",
                    summary.failed_records(),
                    summary.total
                )));
            }
            Ok(())
        }
        Commands::Summarize => {
            services::summary::update_daily_summary(&pool, &thresholds).await?;
            Ok(())
        }
        Commands::Export => {
            services::export::export_weather_csv(
                &pool,
                &output_folder,
                &thresholds,
                chrono::Local::now().date_naive(),
            )
            .await?;
            Ok(())
        }
        Commands::Report => {
            services::report::generate_weather_report(&pool, &thresholds, &output_folder).await?;
            Ok(())
        }
    }
}

/// `--workers` gets the same bounds as the configured `worker_count`.
fn resolve_workers(flag: Option<usize>, config: &AppConfig) -> Result<usize, AppError> {
    match flag {
        Some(workers) => config::check_worker_count(workers),
        None => Ok(config.worker_count),
    }
}

fn read_raw_records(path: &Path) -> Result<Vec<RawRecord>, AppError> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| {
        AppError::Config(format!("Invalid record batch {}: {}", path.display(), e))
    })
}

async fn serve(pool: sqlx::SqlitePool, config: AppConfig) -> Result<(), AppError> {
    let client = WttrClient::new(&config.weather_base_url, config.request_timeout())?;
    let jobs = services::scheduler::default_jobs(&config, chrono::Utc::now())?;
    let ctx = JobContext::from_config(pool.clone(), client, &config);

    // Create shared scheduler state and spawn the background scheduler
    let scheduler_state: SharedSchedulerState = Arc::new(RwLock::new(SchedulerState::new()));
    tokio::spawn(services::scheduler::run_scheduler(
        ctx,
        jobs,
        scheduler_state.clone(),
    ));

    // CORS: read-only API
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET])
        .allow_headers(Any);

    let store_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/summaries", get(routes::summaries::list_summaries))
        .route(
            "/api/v1/cities/freshness",
            get(routes::summaries::list_freshness),
        )
        .route(
            "/api/v1/cleaning/runs",
            get(routes::summaries::list_cleaning_runs),
        )
        .with_state(pool);

    let scheduler_routes = Router::new()
        .route(
            "/api/v1/scheduler/status",
            get(routes::scheduler::get_scheduler_status),
        )
        .with_state(scheduler_state);

    let app = Router::new()
        .merge(store_routes)
        .merge(scheduler_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["weather-pipeline"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_clean_flags() {
        let cli = Cli::try_parse_from([
            "weather-pipeline",
            "clean",
            "--input",
            "batch.json",
            "--workers",
            "3",
            "--config",
            "pipeline.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("pipeline.json")));
        match cli.command {
            Some(Commands::Clean { input, workers }) => {
                assert_eq!(input, Some(PathBuf::from("batch.json")));
                assert_eq!(workers, Some(3));
            }
            _ => panic!("expected clean"),
        }
    }

    #[test]
    fn test_resolve_workers() {
        let config = AppConfig::default();
        assert_eq!(resolve_workers(None, &config).unwrap(), config.worker_count);
        assert_eq!(resolve_workers(Some(2), &config).unwrap(), 2);
        assert!(matches!(resolve_workers(Some(0), &config), Err(AppError::Config(_))));
        assert!(matches!(
            resolve_workers(Some(1_000_000_000), &config),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_read_raw_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"[{"city":" Tokyo ","temperature":"29.5","condition":"Sunny"},{"city":"Oslo"}]"#,
        )
        .unwrap();

        let records = read_raw_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], RawRecord::new(" Tokyo ", "29.5", "Sunny"));
        assert_eq!(records[1].temperature, "");
    }

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/health",
            "/api/v1/scheduler/status",
            "/api/v1/summaries",
            "/api/v1/cities/freshness",
            "/api/v1/cleaning/runs",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}

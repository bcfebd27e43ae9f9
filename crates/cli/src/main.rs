//! Natours CLI: dev-data maintenance and configuration checks.
//!
//! - `import --file <path>`: create every tour in a JSON array through the
//!   same validation path as the HTTP API.
//! - `delete`: remove every tour.
//! - `check-config`: print the resolved configuration with secrets masked.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use natours_app::TourService;
use natours_db::{redact_credentials, Database};
use natours_kernel::settings::Settings;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "natours-cli")]
#[command(about = "Manage natours dev data and configuration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import tours from a JSON array
    Import {
        /// Path to the JSON file
        #[arg(long, default_value = "dev-data/tours-simple.json")]
        file: PathBuf,
    },
    /// Delete every tour
    Delete,
    /// Print the resolved configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().with_context(|| "failed to load natours settings")?;
    natours_telemetry::init(&settings.telemetry)?;

    match cli.command {
        Commands::CheckConfig => check_config(&settings),
        Commands::Import { file } => {
            let raw = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let tours: Vec<Value> = serde_json::from_slice(&raw)
                .with_context(|| format!("{} is not a JSON array of tours", file.display()))?;
            with_tours(&settings, |service| import(service, tours)).await
        }
        Commands::Delete => {
            with_tours(&settings, |service| async move {
                let deleted = service.delete_all().await?;
                println!("Data successfully deleted ({deleted} tours)");
                Ok::<_, anyhow::Error>(())
            })
            .await
        }
    }
}

/// Run `op` against the tours collection, closing the store afterwards.
async fn with_tours<F, Fut>(settings: &Settings, op: F) -> anyhow::Result<()>
where
    F: FnOnce(TourService) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let connection_string = settings.database.connection_string()?;
    let db = Database::connect(&connection_string)
        .await
        .context("failed to connect to database")?;
    let service = TourService::open(&db)
        .await
        .context("failed to open tours collection")?;

    let outcome = op(service).await;
    db.close().await.context("failed to close database")?;
    outcome
}

async fn import(service: TourService, tours: Vec<Value>) -> anyhow::Result<()> {
    let total = tours.len();
    let mut failed = 0usize;

    for (index, tour) in tours.into_iter().enumerate() {
        let Value::Object(body) = tour else {
            tracing::warn!(index, "skipping entry that is not an object");
            failed += 1;
            continue;
        };
        if let Err(err) = service.create(&body).await {
            let name = body.get("name").and_then(Value::as_str).unwrap_or("<unnamed>");
            tracing::warn!(index, tour = name, error = %err, "tour rejected");
            failed += 1;
        }
    }

    println!("Data successfully loaded ({} of {total} tours)", total - failed);
    if failed == total && total > 0 {
        bail!("no tours could be imported");
    }
    Ok(())
}

fn check_config(settings: &Settings) -> anyhow::Result<()> {
    let database = match settings.database.connection_string() {
        Ok(url) => redact_credentials(&url),
        Err(err) => format!("<invalid: {err}>"),
    };
    let report = json!({
        "environment": format!("{:?}", settings.environment).to_lowercase(),
        "server": {
            "host": settings.server.host,
            "port": settings.server.port,
            "request_timeout_ms": settings.server.request_timeout_ms,
        },
        "database": { "url": database },
        "telemetry": {
            "log_format": format!("{:?}", settings.telemetry.log_format).to_lowercase(),
            "log_level": settings.telemetry.log_level,
        },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

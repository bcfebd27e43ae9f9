use anyhow::Context;
use natours_app::register_all;
use natours_db::Database;
use natours_kernel::{settings::Settings, InitCtx, ModuleRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load natours settings")?;
    natours_telemetry::init(&settings.telemetry)?;

    let connection_string = settings
        .database
        .connection_string()
        .context("failed to assemble database connection string")?;

    tracing::info!(
        env = ?settings.environment,
        db = %natours_db::redact_credentials(&connection_string),
        "natours-app bootstrap starting"
    );

    let db = Database::connect(&connection_string)
        .await
        .context("failed to connect to database")?;

    let mut registry = ModuleRegistry::new();
    register_all(&mut registry);

    let ctx = InitCtx {
        settings: &settings,
        db: &db,
    };
    registry.open_collections(&db).await?;
    registry.init_modules(&ctx).await?;
    registry.start_modules(&ctx).await?;

    let served =
        natours_http::start_server(&registry, &settings, natours_http::shutdown_signal()).await;
    if let Err(err) = &served {
        tracing::error!(error = ?err, "server stopped unexpectedly; shutting down");
    }

    let stopped = registry.stop_modules().await;
    if let Err(err) = &stopped {
        tracing::error!(error = ?err, "failed to stop modules");
    }
    db.close().await.context("failed to close database")?;

    tracing::info!("natours-app shut down");
    served.and(stopped)
}

//! Brewtab ledger server binary

use anyhow::Context;
use brewtab_ledger::Config;
use brewtab_reconciliation::{Cadence, DailySchedule, RecurringTask};
use brewtab_sync::BrewtabService;
use tracing_subscriber::EnvFilter;

fn load_config() -> anyhow::Result<Config> {
    let config = match std::env::var("BREWTAB_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?
            .with_env_overrides()?,
        Err(_) => Config::from_env()?,
    };
    Ok(config)
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if log_format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.log_format);

    tracing::info!(
        service = %config.service_name,
        data_dir = %config.data_dir.display(),
        "Starting Brewtab ledger server"
    );

    let service = BrewtabService::open(config.clone())
        .await
        .context("Failed to open ledger")?;

    let health = service.health().await;
    tracing::info!(storage = health.storage, cache = %health.cache, "Ledger opened");

    let audit_task = if config.audit.enabled {
        let schedule = DailySchedule::parse(&config.audit.run_at)?;
        tracing::info!(run_at = %schedule.run_at(), "Consistency audit scheduled");
        Some(RecurringTask::start(
            service.auditor().clone(),
            Cadence::Daily(schedule),
        ))
    } else {
        tracing::info!("Consistency audit disabled");
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down Brewtab ledger server");

    if let Some(task) = audit_task {
        task.stop().await?;
    }

    Ok(())
}

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use quote_batch::config::{AppConfig, CliArgs};
use quote_batch::core::scheduler::Trigger;
use quote_batch::utils::error::{BatchError, ErrorSeverity};
use quote_batch::utils::logger;
use quote_batch::utils::monitor::SystemMonitor;
use quote_batch::utils::validation::{redact, Validate};
use quote_batch::{adapters, BatchStatus, JobLauncher, QuoteMaintenanceJob, Scheduler};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 載入 TOML 配置 (日誌格式取決於配置，因此先載入)
    let mut config = match AppConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "❌ Failed to load config file '{}': {}",
                args.config.display(),
                e
            );
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    if let Some(monitor) = args.monitor {
        config.monitoring.enabled = monitor;
    }

    logger::init_logger(args.verbose, config.monitoring.json_logs);

    tracing::info!("🚀 Starting quote-batch");
    tracing::info!("📁 Configuration loaded from: {}", args.config.display());

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - the database will not be touched");
        if let Err(e) = perform_dry_run(&config) {
            exit_with(&e);
        }
        return Ok(());
    }

    let store = match adapters::connect(&config.database).await {
        Ok(store) => store,
        Err(e) => exit_with(&e),
    };

    let monitor_enabled = config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let factory = Arc::new(QuoteMaintenanceJob::new(store, config.job_settings()));
    let launcher = Arc::new(
        JobLauncher::new(factory).with_monitor(SystemMonitor::new(monitor_enabled)),
    );

    if args.run_once {
        let execution = launcher.launch().await;
        let code = match &execution {
            Some(execution) => {
                println!("{}", serde_json::to_string_pretty(&execution.summary())?);
                if execution.status == BatchStatus::Completed {
                    0
                } else {
                    1
                }
            }
            None => 1,
        };
        std::process::exit(code);
    }

    if !config.schedule.enabled {
        tracing::warn!("⏸️ Schedule is disabled; use --run-once to run the job manually");
        return Ok(());
    }

    let mut scheduler = config
        .triggers()?
        .into_iter()
        .fold(Scheduler::new(launcher.clone()), Scheduler::trigger);
    scheduler.start();

    shutdown_signal().await?;
    tracing::info!("🛑 Shutdown signal received, waiting for running jobs");

    scheduler.stop().await;
    if let Some(monitor) = launcher.monitor() {
        monitor.log_final_stats();
    }

    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl+C")
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => result,
        result = terminate => result,
    }
}

/// 根據錯誤嚴重程度決定退出碼
fn exit_with(e: &BatchError) -> ! {
    tracing::error!(
        "❌ quote-batch failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}

fn display_config_summary(config: &AppConfig, args: &CliArgs) {
    tracing::info!("📋 Configuration Summary:");
    tracing::info!("  Database: {}", redact(&config.database.url));
    tracing::info!(
        "  Chunk size: {}, page size: {}",
        config.batch.chunk_size,
        config.batch.page_size
    );
    tracing::info!(
        "  Opt-out after: {}, delete after: {}",
        config.retention.stale_after,
        config.retention.delete_after
    );
    tracing::info!(
        "  Schedule: {}",
        if config.schedule.enabled { "enabled" } else { "disabled" }
    );
    tracing::info!("  Monitoring: {}", config.monitoring_enabled());
    if args.verbose {
        tracing::debug!("Full configuration: {:?}", config);
    }
}

fn perform_dry_run(config: &AppConfig) -> Result<(), BatchError> {
    let now = Utc::now();
    let stale_cutoff = config.retention.stale_after.cutoff(now)?;
    let delete_cutoff = config.retention.delete_after.cutoff(now)?;

    println!("🔍 Dry run at {}", now);
    println!(
        "  updateOptInStep: opt_in -> false where {} <= created_time < {}",
        delete_cutoff, stale_cutoff
    );
    println!(
        "  deleteOldQuotesStep: delete where created_time < {}",
        delete_cutoff
    );

    for trigger in config.triggers()? {
        match &trigger {
            Trigger::Cron(expr) => match expr.next_after(now) {
                Some(next) => println!("  ⏰ {} next fires at {}", trigger, next),
                None => println!("  ⏰ {} never fires", trigger),
            },
            Trigger::FixedRate(_) => println!("  ⏰ {} fires on start", trigger),
        }
    }

    Ok(())
}

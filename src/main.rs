mod analyzer;
mod api;
mod auth;
mod cli;
mod config;
mod db;
mod mailer;
mod reporter;
mod scheduler;

use crate::api::ApiState;
use crate::cli::{Cli, Commands, ConfigCommands};
use crate::config::Config;
use crate::db::Database;
use crate::reporter::WeeklyReporter;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Service => {
            let config = prepare_config()?;
            run_service(config).await
        }
        Commands::Report { date } => handle_report(date).await,
        Commands::Status => handle_status(),
        Commands::Config { command } => handle_config_command(command),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let shown = if Config::is_secret_key(&key) {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {shown}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_or_default_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_status() -> Result<()> {
    let config = load_or_default_config()?;
    let database = Database::open(&config.db_path)?;
    let users = database.list_users()?;
    let mailer = mailer::from_config(&config)?;

    println!("DeepFocus status");
    println!("- config: {}", Config::config_path()?.display());
    println!("- database: {}", config.db_path.display());
    println!("- registered_users: {}", users.len());
    println!("- api: http://{}:{}", config.api_host, config.api_port);
    if config.reports_enabled {
        println!(
            "- weekly_reports: {} at {} (cron: {})",
            config.report_weekday,
            config.report_time,
            scheduler::cron_from_config(&config)?
        );
    } else {
        println!("- weekly_reports: disabled");
    }
    println!("- mailer: {}", mailer.describe());

    database.close()
}

async fn handle_report(date: Option<String>) -> Result<()> {
    let config = prepare_config()?;
    let today = parse_optional_date(date)?;

    let database = Arc::new(Database::open(&config.db_path)?);
    let mailer = mailer::from_config(&config)?;
    let reporter = WeeklyReporter::new(Arc::clone(&database), mailer, &config.mail_from);

    let summary = reporter.run(today).await?;
    drop(reporter);

    println!("Weekly reports for the week ending {today}");
    println!("- sent: {}", summary.sent);
    println!("- skipped: {}", summary.skipped);
    println!("- failed: {}", summary.failed);

    close_database(database);
    Ok(())
}

async fn run_service(config: Config) -> Result<()> {
    let database = Arc::new(Database::open(&config.db_path)?);
    let mailer = mailer::from_config(&config)?;
    let reporter = Arc::new(WeeklyReporter::new(
        Arc::clone(&database),
        mailer,
        &config.mail_from,
    ));
    let state = ApiState::new(&config, Arc::clone(&database), Arc::clone(&reporter))?;

    let shared_config = Arc::new(config);
    let api_config = Arc::clone(&shared_config);
    let schedule_fallback = Arc::clone(&shared_config);
    let scheduler_reporter = Arc::clone(&reporter);
    let reports_enabled = shared_config.reports_enabled;

    info!(mailer = %reporter.mailer_description(), "DeepFocus service started");

    let scheduler_task = async move {
        if !reports_enabled {
            info!("weekly reports disabled");
            return std::future::pending::<Result<()>>().await;
        }

        scheduler::run_cron_scheduler(
            move || {
                let runtime = Config::load().unwrap_or_else(|_| (*schedule_fallback).clone());
                scheduler::cron_from_config(&runtime)
            },
            move |date| {
                let reporter = Arc::clone(&scheduler_reporter);
                async move {
                    let summary = reporter.run(date).await?;
                    info!(
                        sent = summary.sent,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        "weekly report batch finished"
                    );
                    Ok(())
                }
            },
        )
        .await
    };

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(error) => {
                warn!(error = %error, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
    };

    let outcome = tokio::select! {
        api_result = api::run_server(api_config, state, shutdown) => api_result,
        scheduler_result = scheduler_task => scheduler_result,
    };

    drop(reporter);
    close_database(database);

    outcome
}

fn close_database(database: Arc<Database>) {
    match Arc::try_unwrap(database) {
        Ok(database) => {
            if let Err(error) = database.close() {
                warn!(error = %error, "failed to close database cleanly");
            }
        }
        Err(_) => warn!("database still referenced at shutdown; leaving it to drop"),
    }
}

fn parse_optional_date(input: Option<String>) -> Result<NaiveDate> {
    input
        .as_deref()
        .map(|date| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date format: {date}. Example: 2026-01-28"))
        })
        .transpose()?
        .map_or_else(|| Ok(Local::now().date_naive()), Ok)
}

/// Loads the config, filling in first-run values and persisting them.
fn prepare_config() -> Result<Config> {
    let mut config = load_or_default_config()?;
    if config.ensure_bootstrap_files()? {
        config.save()?;
        info!(path = %Config::config_path()?.display(), "generated signing secret");
    }
    Ok(config)
}

fn load_or_default_config() -> Result<Config> {
    let path = Config::config_path()?;
    if path.exists() {
        return Config::load_from(&path);
    }

    let mut config = Config::default();
    config.ensure_bootstrap_files()?;
    config.save_to(&path)?;
    Ok(config)
}

mod cli;
mod client;
mod config;
mod envfile;
mod error;
mod model;
#[cfg(test)]
mod testing;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, EnvCommands};
use client::SpeachesClient;
use config::{Config, FileConfig, Overrides};
use envfile::{EnvFile, Severity};
use model::{Backoff, ModelId, PrefetchReport, PrefetchStatus, Prefetcher};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let file = FileConfig::load(cli.config.as_deref()).context("Failed to read config file")?;

    // A server started with API_KEY in ./.env expects the same key from us.
    let api_key = config::api_key_override(cli.api_key.clone(), Path::new(".env"))
        .context("Failed to read ./.env")?;

    let overrides = Overrides {
        base_url: cli.base_url.clone(),
        api_key,
        timeout_secs: cli.timeout,
        retries: cli.retries,
    };

    let config = Config::resolve(file, overrides)?;
    tracing::debug!("Using server at {}", config.base_url);
    Ok(config)
}

fn print_report(report: &PrefetchReport) {
    for outcome in &report.outcomes {
        match &outcome.status {
            PrefetchStatus::Downloaded => println!("✓ {} (downloaded)", outcome.model),
            PrefetchStatus::AlreadyPresent => println!("✓ {} (already present)", outcome.model),
            PrefetchStatus::Failed { reason } => {
                println!("✗ {} after {} attempt(s): {}", outcome.model, outcome.attempts, reason)
            }
            PrefetchStatus::Skipped => println!("- {} (skipped)", outcome.model),
        }
    }

    let failures = report.failures();
    if failures == 0 {
        println!("\nAll {} model(s) ready on {}", report.outcomes.len(), report.base_url);
    } else {
        println!("\n{} of {} model(s) failed", failures, report.outcomes.len());
    }
}

async fn pull(
    config: &Config,
    models: Vec<ModelId>,
    wait: Option<u64>,
    fail_fast: bool,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let client = SpeachesClient::new(config)?;

    if let Some(secs) = wait {
        tracing::info!("Waiting up to {}s for {}", secs, client.base_url());
        client.wait_until_healthy(Duration::from_secs(secs)).await?;
    }

    let models = if models.is_empty() {
        config.models.clone()
    } else {
        models
    };

    let backoff = Backoff {
        initial: config.retry_backoff,
        ..Backoff::default()
    };
    let report = Prefetcher::new(&client, config.retries)
        .with_backoff(backoff)
        .fail_fast(fail_fast)
        .run(&models)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn list(config: &Config, json: bool) -> anyhow::Result<ExitCode> {
    let client = SpeachesClient::new(config)?;
    let models = client
        .list_models()
        .await
        .with_context(|| format!("Failed to list models on {}", client.base_url()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else if models.is_empty() {
        println!("No models registered.");
        println!("Use 'speaches-bootstrap pull <org/name>' to download one.");
    } else {
        for model in models {
            match model.task {
                Some(task) => println!("  {}  ({})", model.id, task),
                None => println!("  {}", model.id),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn verify(config: &Config, models: Vec<ModelId>) -> anyhow::Result<ExitCode> {
    let client = SpeachesClient::new(config)?;
    let models = if models.is_empty() {
        config.models.clone()
    } else {
        models
    };

    let results = model::check_available(&client, &models)
        .await
        .with_context(|| format!("Failed to list models on {}", client.base_url()))?;

    let mut missing = 0;
    for (model, present) in &results {
        if *present {
            println!("✓ {}", model);
        } else {
            missing += 1;
            println!("✗ {} (not registered)", model);
        }
    }

    if missing > 0 {
        println!("\n{} of {} model(s) missing; run `speaches-bootstrap pull`", missing, results.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn env_command(action: EnvCommands) -> anyhow::Result<ExitCode> {
    match action {
        EnvCommands::Init { path, force } => {
            EnvFile::init(&path, force)?;
            println!("✓ Wrote {}", path.display());
            println!("  Set {} before running `docker compose up`.", envfile::CHAT_COMPLETION_API_KEY);
        }

        EnvCommands::Set { key, value, path } => {
            let mut env = match EnvFile::load_optional(&path)? {
                Some(env) => env,
                None => EnvFile::parse(&path, ""),
            };
            env.set(&key, &value)?;
            env.save()
                .with_context(|| format!("Failed to write {}", env.path().display()))?;
            println!("✓ {} updated in {}", key, path.display());
        }

        EnvCommands::Check { path } => {
            let env = EnvFile::load(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let issues = env.check();

            if issues.is_empty() {
                println!("✓ {} looks good", path.display());
                return Ok(ExitCode::SUCCESS);
            }

            for issue in &issues {
                let label = match issue.severity {
                    Severity::Warning => "warning",
                    Severity::Error => "error",
                };
                if issue.line > 0 {
                    println!("{}:{}: {}: {}", path.display(), issue.line, label, issue.message);
                } else {
                    println!("{}: {}: {}", path.display(), label, issue.message);
                }
            }

            if issues.iter().any(|i| i.severity == Severity::Error) {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let mut cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.default_log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = cli.command.take().unwrap_or(Commands::Pull {
        models: Vec::new(),
        wait: None,
        fail_fast: false,
        json: false,
    });

    match command {
        Commands::Pull {
            models,
            wait,
            fail_fast,
            json,
        } => pull(&load_config(&cli)?, models, wait, fail_fast, json).await,

        Commands::List { json } => list(&load_config(&cli)?, json).await,

        Commands::Verify { models } => verify(&load_config(&cli)?, models).await,

        Commands::Health => {
            let client = SpeachesClient::new(&load_config(&cli)?)?;
            client
                .health()
                .await
                .with_context(|| format!("Server at {} is not healthy", client.base_url()))?;
            println!("✓ {} is up", client.base_url());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Env { action } => env_command(action),
    }
}

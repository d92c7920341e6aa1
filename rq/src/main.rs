//! rq - rpcqueue command line
//!
//! Prints the effective queue configuration and runs synthetic workloads
//! through the scheduler.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use rpcqueue::cli::{Cli, Command, SimulateArgs};
use rpcqueue::config::Config;
use rpcqueue::simulate::{SimulationReport, run_simulation};

/// Pick the log level: CLI --log-level > config file > default (WARN)
fn resolve_log_level(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> tracing::Level {
    match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to WARN", s);
                tracing::Level::WARN
            }
        },
        None => tracing::Level::WARN,
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let level = resolve_log_level(cli_log_level, config_log_level);

    // Logs go to stderr so stdout stays clean for YAML and JSON output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Config => {
            debug!("main: matched Config command");
            cmd_config(&config)
        }
        Command::Simulate(args) => {
            debug!(?args, "main: matched Simulate command");
            cmd_simulate(&config, &args).await
        }
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", config.to_yaml()?);
    Ok(())
}

async fn cmd_simulate(config: &Config, args: &SimulateArgs) -> Result<()> {
    debug!(?args, "cmd_simulate: called");
    let options = args.apply(config.queue.clone());
    let report = run_simulation(options, args.plan())
        .await
        .context("Failed to run simulation")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    let options = &report.options;
    println!(
        "{} concurrency={} interval={}ms interval-cap={} carryover={}",
        "Queue".bold(),
        options.concurrency,
        options.interval_ms,
        options.interval_cap,
        options.carryover_concurrency_count
    );
    println!();
    println!("{:>5}  {:>9}  {:>9}  {}", "TASK", "START", "FINISH", "OUTCOME");

    for task in &report.tasks {
        let started = task
            .started_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        let outcome = if task.ok {
            task.outcome.green()
        } else {
            task.outcome.red()
        };
        println!(
            "{:>5}  {:>9}  {:>9}  {}",
            task.index,
            started,
            format!("{}ms", task.finished_ms),
            outcome
        );
    }

    println!();
    let summary = format!(
        "{} tasks in {}ms, {} failed, peak concurrency {}",
        report.tasks.len(),
        report.total_ms,
        report.failed,
        report.stats.peak_concurrent
    );
    if report.failed == 0 {
        println!("{} {}", "✓".green(), summary);
    } else {
        println!("{} {}", "✗".yellow(), summary.dimmed());
    }
}

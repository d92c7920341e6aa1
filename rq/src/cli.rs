//! CLI command definitions and subcommands

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::debug;

use crate::domain::Priority;
use crate::scheduler::QueueOptions;
use crate::simulate::SimulationPlan;

/// rpcqueue - bounded, rate-limited request scheduling
#[derive(Debug, Parser)]
#[command(
    name = "rq",
    version,
    about = "Inspect queue configuration and simulate scheduled workloads"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the effective configuration as YAML
    Config,

    /// Run a synthetic workload through a scheduler and report its timeline
    Simulate(SimulateArgs),
}

/// Arguments for `rq simulate`; queue flags override the loaded config
#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Number of tasks to submit
    #[arg(short, long, default_value = "8")]
    pub tasks: usize,

    /// Milliseconds each task runs
    #[arg(short, long = "work-ms", default_value = "50")]
    pub work_ms: u64,

    /// Make every n-th task fail
    #[arg(long = "fail-every")]
    pub fail_every: Option<usize>,

    /// Priority for every submitted task (low, normal, high, critical)
    #[arg(short, long, default_value = "normal")]
    pub priority: Priority,

    /// Maximum tasks running at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Rate limit window in milliseconds (0 disables rate limiting)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Tasks started per window
    #[arg(long = "interval-cap")]
    pub interval_cap: Option<usize>,

    /// Do not count still-running tasks against a new window
    #[arg(long = "no-carryover")]
    pub no_carryover: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl SimulateArgs {
    /// Layer command-line overrides on top of `base`
    pub fn apply(&self, base: QueueOptions) -> QueueOptions {
        debug!(?base, "SimulateArgs::apply: called");
        QueueOptions {
            auto_start: true,
            concurrency: self.concurrency.unwrap_or(base.concurrency),
            interval_ms: self.interval.unwrap_or(base.interval_ms),
            interval_cap: self.interval_cap.unwrap_or(base.interval_cap),
            carryover_concurrency_count: base.carryover_concurrency_count && !self.no_carryover,
        }
    }

    pub fn plan(&self) -> SimulationPlan {
        SimulationPlan {
            tasks: self.tasks,
            work: Duration::from_millis(self.work_ms),
            fail_every: self.fail_every,
            priority: self.priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulate_args(args: &[&str]) -> SimulateArgs {
        let argv = ["rq", "simulate"].iter().chain(args.iter());
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Simulate(args) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_with_globals() {
        let cli = Cli::try_parse_from(["rq", "config", "-c", "/tmp/rq.yml", "--log-level", "debug"]).unwrap();
        assert!(matches!(cli.command, Command::Config));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/rq.yml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_simulate_defaults() {
        let args = simulate_args(&[]);
        assert_eq!(args.tasks, 8);
        assert_eq!(args.work_ms, 50);
        assert_eq!(args.priority, Priority::Normal);
        assert!(args.fail_every.is_none());
        assert!(!args.json);

        // No overrides keeps the config values, but always starts
        let base = QueueOptions {
            auto_start: false,
            concurrency: 3,
            ..Default::default()
        };
        let options = args.apply(base);
        assert!(options.auto_start);
        assert_eq!(options.concurrency, 3);
        assert!(options.carryover_concurrency_count);
    }

    #[test]
    fn test_simulate_overrides() {
        let args = simulate_args(&[
            "--tasks",
            "3",
            "--work-ms",
            "10",
            "--fail-every",
            "2",
            "--priority",
            "High",
            "--concurrency",
            "4",
            "--interval",
            "1000",
            "--interval-cap",
            "5",
            "--no-carryover",
            "--json",
        ]);

        let options = args.apply(QueueOptions::default());
        assert_eq!(options.concurrency, 4);
        assert_eq!(options.interval_ms, 1000);
        assert_eq!(options.interval_cap, 5);
        assert!(!options.carryover_concurrency_count);

        let plan = args.plan();
        assert_eq!(plan.tasks, 3);
        assert_eq!(plan.work, Duration::from_millis(10));
        assert_eq!(plan.fail_every, Some(2));
        assert_eq!(plan.priority, Priority::High);
        assert!(args.json);
    }

    #[test]
    fn test_invalid_priority_rejected() {
        assert!(Cli::try_parse_from(["rq", "simulate", "--priority", "urgent"]).is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["rq"]).is_err());
    }
}

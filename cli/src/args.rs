//! CLI command definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// How the final result is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report
    Text,
    /// Machine-readable summary
    Json,
}

/// CLI arguments for taskpilot
#[derive(Parser, Debug)]
#[command(name = "taskpilot")]
#[command(author, version, about = "Autonomous task agent: perceive, plan, execute, reflect")]
#[command(long_about = r#"
taskpilot takes a task in natural language, breaks it into a dependency-ordered
plan and works through it one action per cycle, reflecting on each result and
revising the plan when something goes wrong.

Configuration files are loaded from (in priority order):
1. TASKPILOT_* environment variables (e.g. TASKPILOT_AGENT__MAX_ITERATIONS=20)
2. --config <path>          Explicit config file
3. ./taskpilot.toml         Project-level config
4. ~/.config/taskpilot/config.toml   Global config

Example:
  taskpilot run "Write a CLI that greets the user by name"
  taskpilot run "Add a /health endpoint" -r "use axum" -r "add a test" -vv
  taskpilot config
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace); RUST_LOG wins when set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one task until it completes, fails, or Ctrl-C stops it
    Run(RunArgs),
    /// Show configuration file locations and the effective configuration
    Config,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// What the agent should accomplish
    pub description: String,

    /// Additional requirement (can be specified multiple times)
    #[arg(short, long = "requirement", value_name = "TEXT")]
    pub requirements: Vec<String>,

    /// Directory the agent reads and writes (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub project_root: Option<PathBuf>,

    /// Also write diagnostic logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Append lifecycle events as JSON lines to this file
    #[arg(long, value_name = "PATH")]
    pub event_log: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Suppress per-event progress lines
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "taskpilot",
            "run",
            "Build a greeter",
            "-r",
            "use clap",
            "--requirement",
            "add tests",
            "-vv",
            "--no-config",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.no_config);
        let Command::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run.description, "Build a greeter");
        assert_eq!(run.requirements, vec!["use clap", "add tests"]);
        assert_eq!(run.output, OutputFormat::Text);
    }

    #[test]
    fn test_run_requires_description() {
        assert!(Cli::try_parse_from(["taskpilot", "run"]).is_err());
        assert!(matches!(
            Cli::try_parse_from(["taskpilot", "config"]).unwrap().command,
            Command::Config
        ));
    }
}

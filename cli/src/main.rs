//! CLI entrypoint for taskpilot
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod args;
mod console;

use anyhow::{Context, Result, bail};
use args::{Cli, Command, OutputFormat, RunArgs};
use clap::Parser;
use console::ConsoleNotifier;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use taskpilot_application::{
    CompletionService, CompositeNotifier, ExecutionContext, Executor, LifecycleNotifier,
    MemoryStore, RunTaskUseCase, TaskOrchestrator,
};
use taskpilot_domain::TaskStatus;
use taskpilot_infrastructure::{
    ConfigLoader, FileConfig, HttpBrowser, JsonFilePersistence, JsonlEventLog, LocalComputer,
    LocalFileSystem, TermFrequencyIndex, build_backend,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref()).context("Failed to load configuration")?
    };
    if let Err(e) = config.validate() {
        bail!("Invalid configuration: {}", e);
    }

    match cli.command {
        Command::Config => {
            ConfigLoader::print_config_sources();
            println!();
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(args) => {
            let log_file = args.log_file.as_deref().or(config.logging.file.as_deref());
            let _guard = init_tracing(cli.verbose, log_file);
            run(args, config).await
        }
    }
}

/// RUST_LOG wins; otherwise `-v` picks the level. The returned guard must
/// outlive the run so buffered file output is flushed.
fn init_tracing(verbose: u8, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    });

    let file = log_file.and_then(|path| {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: cannot open log file {}: {}", path.display(), e);
                None
            }
        }
    });
    let (file_layer, guard) = match file {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

async fn run(args: RunArgs, config: FileConfig) -> Result<ExitCode> {
    info!("Starting taskpilot");

    let project_root = match &args.project_root {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let project_root = project_root
        .canonicalize()
        .with_context(|| format!("Project root not found: {}", project_root.display()))?;

    // === Dependency Injection ===
    let settings = config.completion.to_settings()?;
    let backend = build_backend(&settings)?;
    let completion = Arc::new(CompletionService::new(
        backend,
        config.completion.to_retry_policy(),
    ));

    let mut memory = MemoryStore::new().with_vector_index(Arc::new(TermFrequencyIndex::new()));
    if config.memory.persist {
        match config.memory.resolve_directory() {
            Some(dir) => {
                let persistence = JsonFilePersistence::new(&dir)?;
                info!(directory = %dir.display(), "Persisting memory");
                memory = memory.with_persistence(Arc::new(persistence));
            }
            None => warn!("No data directory available; memory is not persisted"),
        }
    }

    let mut context = ExecutionContext::new(completion, Arc::new(memory))
        .with_file_system(Arc::new(LocalFileSystem::new(&project_root)))
        .with_config(config.agent.to_agent_config()?);
    match HttpBrowser::new() {
        Ok(browser) => context = context.with_browser(Arc::new(browser)),
        Err(e) => warn!(error = %e, "Browsing disabled"),
    }
    if config.computer.enabled {
        let computer =
            LocalComputer::new(&project_root).with_timeout(config.computer.command_timeout());
        context = context.with_computer(Arc::new(computer));
    }

    let executor = Arc::new(Executor::with_default_handlers(config.computer.to_guard()?));

    let mut notifiers: Vec<Arc<dyn LifecycleNotifier>> = Vec::new();
    if !args.quiet {
        notifiers.push(Arc::new(ConsoleNotifier));
    }
    if let Some(path) = args.event_log.as_ref().or(config.logging.event_log.as_ref()) {
        match JsonlEventLog::new(path) {
            Some(log) => notifiers.push(Arc::new(log)),
            None => warn!(path = %path.display(), "Event log disabled"),
        }
    }

    let use_case = RunTaskUseCase::new(context, executor)
        .with_perception(config.perception.to_perception_config())
        .with_notifier(Arc::new(CompositeNotifier::new(notifiers)));
    let orchestrator = Arc::new(TaskOrchestrator::new(
        use_case,
        config.orchestrator.to_orchestrator_config(),
    ));
    let sweeper = orchestrator.spawn_idle_sweeper();

    let task_id = orchestrator.submit(args.description.clone(), args.requirements.clone())?;

    // `wait` owns the run handle once polled, so keep the same future
    // across a Ctrl-C and let the loop wind down on its own.
    let wait = orchestrator.wait(&task_id);
    tokio::pin!(wait);
    let result = tokio::select! {
        result = &mut wait => result,
        _ = tokio::signal::ctrl_c() => {
            let history = orchestrator.stop(&task_id)?;
            eprintln!("Stopping after {} recorded action(s)...", history.len());
            wait.await
        }
    };

    orchestrator.shutdown().await;
    let _ = sweeper.await;
    orchestrator.memory().flush().await;

    let output = result?;
    match args.output {
        OutputFormat::Text => println!("{}", console::render_report(&output)),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&console::render_json(&output))?;
            println!("{}", json);
        }
    }

    Ok(if output.task.status == TaskStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

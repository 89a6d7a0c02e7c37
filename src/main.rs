use anyhow::{Context, Result};
use provision::cli::commands::{FactsCommand, RunCommand, ValidateCommand};
use provision::cli::output::*;
use provision::cli::{Cli, Command};
use provision::core::{
    config::PipelineConfig, ExecutionContext, ExecutionStatus, FileLoader, StartupFacts,
    VariableStore,
};
use provision::execution::{ExecutionEngine, ExecutionEvent};
use provision::host::{OutputLine, ShellExecutor};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Facts(cmd) => show_facts(cmd).await?,
    }

    Ok(())
}

async fn detect_facts(cmd: &RunCommand) -> StartupFacts {
    let mut facts = StartupFacts::detect().await;
    if let Some(platform) = cmd.platform {
        facts.platform = platform;
    }
    if let Some(gpu) = cmd.gpu {
        facts.gpu = gpu;
    }
    if let Some(arch) = &cmd.arch {
        facts = facts.with_arch(arch.clone());
    }
    facts
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let path = Path::new(&cmd.file);
    let loader = FileLoader::new();
    let mut pipeline = loader
        .load_path(path)
        .with_context(|| format!("Failed to load pipeline {}", cmd.file))?;

    println!("{} Loaded pipeline: {}", INFO, style(&pipeline.name).bold());

    let facts = detect_facts(cmd).await;
    let root = pipeline
        .source_dir()
        .map(Path::to_path_buf)
        .context("Pipeline has no source directory")?;

    let mut overrides = VariableStore::new();
    for (key, value) in &cmd.var {
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
        overrides.set(key.clone(), value.clone());
    }
    let mut ctx = ExecutionContext::new(facts, root).with_variables(overrides);

    let progress = create_progress_bar(pipeline.steps.len());

    let mut shell = ShellExecutor::new();
    if !cmd.quiet {
        let pb = progress.clone();
        shell = shell.with_output_sink(Arc::new(move |line: OutputLine| {
            pb.println(format_output_line(&line));
        }));
    }

    let mut engine = ExecutionEngine::new(shell, Arc::new(loader));

    let pb = progress.clone();
    engine.add_event_handler(move |event: ExecutionEvent| {
        match &event {
            ExecutionEvent::StepStarted { step } if step.depth == 0 => {
                pb.set_message(step.name.clone());
            }
            ExecutionEvent::StepSucceeded { step }
            | ExecutionEvent::StepSkipped { step, .. }
            | ExecutionEvent::StepFailedSoft { step, .. }
            | ExecutionEvent::StepFailed { step, .. }
                if step.depth == 0 =>
            {
                pb.set_position(step.index as u64 + 1);
            }
            _ => {}
        }
        if let Some(line) = format_execution_event(&event) {
            pb.println(line);
        }
    });

    // Ctrl-C stops the run before the next step
    let abort = engine.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, aborting after the current step");
            abort.store(true, Ordering::SeqCst);
        }
    });

    let report = match &cmd.from_step {
        Some(label) => engine.execute_from(&mut pipeline, &mut ctx, label).await?,
        None => engine.execute(&mut pipeline, &mut ctx).await,
    };
    progress.finish_and_clear();

    if let Some(report_path) = &cmd.report {
        let json = report.to_json().context("Failed to serialize run report")?;
        std::fs::write(report_path, json)
            .with_context(|| format!("Failed to write report to {}", report_path.display()))?;
        println!(
            "{} Report written to {}",
            INFO,
            style(report_path.display()).dim()
        );
    }

    println!("\n{}", format_report_summary(&report));

    if report.is_success() {
        return Ok(());
    }
    match report.status {
        ExecutionStatus::Aborted => std::process::exit(130),
        _ => {
            if let Some(failure) = &report.failure {
                error!("{}", failure.message);
            }
            std::process::exit(1);
        }
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let result = PipelineConfig::from_file(&cmd.file).and_then(|config| {
        let pipeline = config.to_pipeline()?;
        Ok((config, pipeline))
    });

    match result {
        Ok((config, pipeline)) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&pipeline.name).bold());
            println!("  Steps: {}", style(pipeline.steps.len()).cyan());
            println!("  Variables: {}", style(pipeline.variables.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn show_facts(cmd: &FactsCommand) -> Result<()> {
    let facts = StartupFacts::detect().await;
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&facts)?);
    } else {
        println!("{} Startup facts", INFO);
        println!("{}", format_facts(&facts));
    }
    Ok(())
}

//! CLI output formatting

use crate::{
    core::{ExecutionStatus, StartupFacts},
    execution::{ExecutionEvent, RunReport, StepRef},
    host::OutputLine,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar for the top-level steps
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let progress_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(progress_style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::NotStarted => style("NOT STARTED").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Aborted => style("ABORTED").yellow().to_string(),
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn step_name(step: &StepRef) -> String {
    if step.depth == 0 {
        step.name.clone()
    } else {
        format!("{}/{}", step.pipeline, step.name)
    }
}

/// Format an execution event for display
///
/// Returns `None` for events that only drive the progress bar.
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline,
            depth,
            total_steps,
        } => format!(
            "{}{} Starting pipeline {} ({} steps, {})",
            indent(*depth),
            ROCKET,
            style(pipeline).bold(),
            total_steps,
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StepStarted { step } => format!(
            "{}{} {} {}",
            indent(step.depth),
            SPINNER,
            style(step_name(step)).cyan(),
            style(step.method).dim()
        ),
        ExecutionEvent::StepSkipped { step, reason } => format!(
            "{}{} {} skipped: {}",
            indent(step.depth),
            SKIP,
            style(step_name(step)).dim(),
            style(reason).dim()
        ),
        ExecutionEvent::StepSucceeded { step } => format!(
            "{}{} {}",
            indent(step.depth),
            CHECK,
            style(step_name(step)).green()
        ),
        ExecutionEvent::StepFailedSoft { step, error } => format!(
            "{}{} {} failed, continuing: {}",
            indent(step.depth),
            WARN,
            style(step_name(step)).yellow(),
            style(error).dim()
        ),
        ExecutionEvent::StepFailed { step, error } => format!(
            "{}{} {}: {}",
            indent(step.depth),
            CROSS,
            style(step_name(step)).red(),
            style(error).dim()
        ),
        ExecutionEvent::CommandStarted { step, command } => format!(
            "{}  {} {}",
            indent(step.depth),
            style("$").dim(),
            style(command).bold()
        ),
        ExecutionEvent::CommandFinished { exit_code: 0, .. } => return None,
        ExecutionEvent::CommandFinished {
            step, exit_code, ..
        } => format!(
            "{}  {}",
            indent(step.depth),
            style(format!("exit code {}", exit_code)).red()
        ),
        ExecutionEvent::Log { step, message } => {
            format!("{}{} {}", indent(step.depth), INFO, message)
        }
        ExecutionEvent::Jumped { step, target } => format!(
            "{}{} {} → {}",
            indent(step.depth),
            INFO,
            style(step_name(step)).dim(),
            style(target).cyan()
        ),
        ExecutionEvent::PipelineFinished {
            pipeline,
            depth,
            status,
            ..
        } => {
            if *depth == 0 {
                return None;
            }
            format!(
                "{}{} {} {}",
                indent(*depth),
                INFO,
                style(pipeline).bold(),
                format_status(*status)
            )
        }
    };
    Some(line)
}

/// Format one streamed line of command output
pub fn format_output_line(line: &OutputLine) -> String {
    match line {
        OutputLine::Stdout(text) => format!("    {}", style(text).dim()),
        OutputLine::Stderr(text) => format!("    {}", style(text).yellow().dim()),
    }
}

/// Keep the last `max_lines` lines of `output`
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let kept = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            kept
        )
    }
}

/// Format the startup facts
pub fn format_facts(facts: &StartupFacts) -> String {
    format!(
        "  Platform: {}\n  GPU: {}\n  Arch: {}",
        style(facts.platform).cyan(),
        style(facts.gpu).cyan(),
        style(&facts.arch).cyan()
    )
}

/// Format the closing summary of a run
pub fn format_report_summary(report: &RunReport) -> String {
    let icon = match report.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Aborted => WARN,
        _ => CROSS,
    };
    let mut summary = format!(
        "{} {} {} ({} succeeded, {} skipped, {} failed soft)",
        icon,
        style(&report.pipeline).bold(),
        format_status(report.status),
        report.succeeded_steps().len(),
        report.skipped_steps().len(),
        report.failed_soft_steps().len()
    );

    if let Some(failure) = &report.failure {
        summary.push_str(&format!(
            "\n  Step: {}\n  Error: {}",
            style(step_name(&failure.step)).red(),
            failure.message
        ));
        if let Some(command) = &failure.command {
            summary.push_str(&format!("\n  Command: {}", style(command).bold()));
        }
        if let Some(output) = &failure.output {
            if !output.trim().is_empty() {
                summary.push_str(&format!("\n  Output:\n{}", format_output(output, 20)));
            }
        }
    }
    summary
}

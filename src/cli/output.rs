//! Handles all user-facing output for the CLI.
//!
//! Pretty-printing, colouring and JSON generation live here so every subcommand
//! reports in the same way.

use std::io::{self, IsTerminal, Write};

use serde::Serialize;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::build::{BuildGraph, BuildReport, TargetStatus};
use crate::cli::args::OutputFormat;
use crate::errors::NgmakeError;
use crate::macros::{MacroProvenance, MacroTable};

/// One target as printed by `ngmake expand`.
#[derive(Debug, Clone, Serialize)]
pub struct ExpandedTarget {
    pub target: String,
    pub deps: Vec<String>,
    pub phony: bool,
    pub commands: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// CORE OUTPUT FUNCTIONS
// ============================================================================

/// Prints the per-target results of a build followed by a summary line.
pub fn print_report(report: &BuildReport, format: OutputFormat) -> io::Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    let mut out = stdout();
    for unresolved in &report.unresolved {
        paint(&mut out, Color::Yellow, "warning")?;
        writeln!(out, ": rule skipped: {unresolved}")?;
    }
    for outcome in &report.outcomes {
        paint(&mut out, status_colour(outcome.status), &format!("{:>10}", outcome.status.label()))?;
        writeln!(out, " {}", outcome.target)?;
        if let Some(detail) = &outcome.detail {
            writeln!(out, "           {detail}")?;
        }
        if let Some(NgmakeError::BuildFailed { output, .. }) = outcome.error.as_deref() {
            for line in output.lines() {
                writeln!(out, "           | {line}")?;
            }
        }
    }

    let summary = format!(
        "{} built, {} up to date, {} failed, {} blocked",
        report.count(TargetStatus::Built),
        report.count(TargetStatus::UpToDate),
        report.count(TargetStatus::Failed),
        report.count(TargetStatus::Blocked),
    );
    let colour = if report.success() { Color::Green } else { Color::Red };
    paint(&mut out, colour, &summary)?;
    writeln!(out)
}

/// Prints expanded targets as `target: deps` followed by indented commands.
pub fn print_expansion(targets: &[ExpandedTarget], format: OutputFormat) -> io::Result<()> {
    if format == OutputFormat::Json {
        return print_json(&targets);
    }

    let mut out = stdout();
    for target in targets {
        paint(&mut out, Color::Cyan, &target.target)?;
        write!(out, ":")?;
        for dep in &target.deps {
            write!(out, " {dep}")?;
        }
        if target.phony {
            write!(out, " (phony)")?;
        }
        writeln!(out)?;
        if let Some(error) = &target.error {
            paint(&mut out, Color::Red, "    error")?;
            writeln!(out, ": {error}")?;
        }
        for command in &target.commands {
            writeln!(out, "    {}", command.join(" "))?;
        }
    }
    Ok(())
}

/// Lists targets that have a rule.
pub fn print_targets(graph: &BuildGraph) -> io::Result<()> {
    let mut out = stdout();
    for node in graph.nodes().iter().filter(|n| !n.is_leaf()) {
        write!(out, "{}", node.name)?;
        if node.phony {
            paint(&mut out, Color::Magenta, " [phony]")?;
        }
        if node.broken.is_some() {
            paint(&mut out, Color::Red, " [broken]")?;
        }
        writeln!(out)?;
    }
    for unresolved in graph.unresolved() {
        paint(&mut out, Color::Yellow, "unresolved")?;
        writeln!(out, " {} ({}): {}", unresolved.rule, unresolved.origin, unresolved.error)?;
    }
    Ok(())
}

/// Lists macros in name order with every clause.
pub fn print_macros(macros: &MacroTable) -> io::Result<()> {
    let mut out = stdout();
    for def in macros.definitions() {
        let tag = match def.provenance {
            MacroProvenance::Builtin => "builtin",
            MacroProvenance::Module => "module",
            MacroProvenance::User => "user",
        };
        paint(&mut out, Color::Blue, &format!("{tag:>8}"))?;
        writeln!(out, " {}", def.signature())?;
    }
    Ok(())
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn stdout() -> StandardStream {
    let choice = if io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

fn paint(out: &mut StandardStream, colour: Color, text: &str) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(colour)).set_bold(true))?;
    write!(out, "{text}")?;
    out.reset()
}

fn status_colour(status: TargetStatus) -> Color {
    match status {
        TargetStatus::Built => Color::Green,
        TargetStatus::UpToDate | TargetStatus::Source => Color::White,
        TargetStatus::Failed => Color::Red,
        TargetStatus::Blocked => Color::Yellow,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    println!("{text}");
    Ok(())
}

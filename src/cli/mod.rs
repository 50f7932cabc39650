//! The ngmake command-line interface.
//!
//! Parses arguments, installs logging, loads the build description and dispatches to
//! the subcommand handlers. Every failure ends the process with exit code 1.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::build::{
    expand_action, AlwaysStale, BuildGraph, CommandRunner, DryRunRunner, FreshnessOracle,
    FsOracle, ProcessRunner, Scheduler,
};
use crate::cli::args::{Command, NgmakeArgs, OutputFormat, SourceArgs};
use crate::cli::output::ExpandedTarget;
use crate::config::BuildConfig;
use crate::errors::{print_error, NgmakeResult};
use crate::loader::{Loader, Program};
use crate::makefile;

pub mod args;
pub mod output;

/// The main entry point for the CLI.
pub fn run() {
    let args = NgmakeArgs::parse();
    init_logging(args.verbose);

    match dispatch(args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            print_error(e);
            process::exit(1);
        }
    }
}

/// Installs a stderr subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Runs one subcommand; `Ok(false)` means it ran but the build did not succeed.
fn dispatch(args: NgmakeArgs) -> NgmakeResult<bool> {
    let mut config = match &args.config {
        Some(path) => BuildConfig::load(path)?,
        None => BuildConfig::default(),
    };
    apply_source_overrides(&mut config, args.command.source());
    let program = load_program(args.command.source(), &config)?;

    match args.command {
        Command::Build {
            source,
            targets,
            jobs,
            timeout,
            dry_run,
            always_make,
            format,
        } => {
            if let Some(jobs) = jobs {
                config.jobs = jobs;
            }
            if timeout.is_some() {
                config.command_timeout_secs = timeout;
            }
            let request = BuildRequest {
                targets,
                dry_run,
                always_make,
                format,
            };
            handle_build(&program, &config, &source, request)
        }
        Command::Expand {
            targets, format, ..
        } => handle_expand(&program, &config, &targets, format),
        Command::Makefile { .. } => {
            let graph = BuildGraph::build(&program, config.max_depth)?;
            print!("{}", makefile::render(&program, &graph, config.max_depth));
            Ok(true)
        }
        Command::Targets { .. } => {
            let graph = BuildGraph::build(&program, config.max_depth)?;
            output::print_targets(&graph).map_err(stdout_error)?;
            Ok(true)
        }
        Command::Macros { .. } => {
            output::print_macros(&program.macros).map_err(stdout_error)?;
            Ok(true)
        }
    }
}

// ============================================================================
// SUBCOMMAND HANDLERS
// ============================================================================

struct BuildRequest {
    targets: Vec<String>,
    dry_run: bool,
    always_make: bool,
    format: OutputFormat,
}

fn handle_build(
    program: &Program,
    config: &BuildConfig,
    source: &SourceArgs,
    request: BuildRequest,
) -> NgmakeResult<bool> {
    let graph = BuildGraph::build(program, config.max_depth)?;
    let root = base_dir(&source.file);

    let runner: Box<dyn CommandRunner> = if request.dry_run {
        Box::new(DryRunRunner)
    } else {
        Box::new(ProcessRunner::new(config.shell.clone()).with_workdir(&root))
    };
    let oracle: Box<dyn FreshnessOracle> = if request.always_make {
        Box::new(AlwaysStale)
    } else {
        Box::new(FsOracle::new(&root))
    };

    let targets = if request.targets.is_empty() {
        vec![config.default_target.clone()]
    } else {
        request.targets
    };

    let report = Scheduler::new(program, &graph, runner.as_ref(), oracle.as_ref())
        .with_options(config.build_options())
        .run(&targets);
    output::print_report(&report, request.format).map_err(stdout_error)?;
    Ok(report.success())
}

fn handle_expand(
    program: &Program,
    config: &BuildConfig,
    targets: &[String],
    format: OutputFormat,
) -> NgmakeResult<bool> {
    let graph = BuildGraph::build(program, config.max_depth)?;
    let selected: Vec<usize> = if targets.is_empty() {
        (0..graph.nodes().len()).collect()
    } else {
        graph.plan(targets)?
    };

    let mut ok = true;
    let mut expanded = Vec::new();
    for index in selected {
        let node = &graph.nodes()[index];
        let Some(rule) = graph.rule_for(program, node) else {
            continue;
        };
        let mut entry = ExpandedTarget {
            target: node.name.clone(),
            deps: node.deps.clone(),
            phony: node.phony,
            commands: vec![],
            error: None,
        };
        let result = match &node.broken {
            Some(error) => Err(error.to_string()),
            None => expand_action(program, node, rule, config.max_depth).map_err(|e| e.to_string()),
        };
        match result {
            Ok(commands) => entry.commands = commands,
            Err(message) => {
                ok = false;
                entry.error = Some(message);
            }
        }
        expanded.push(entry);
    }

    output::print_expansion(&expanded, format).map_err(stdout_error)?;
    Ok(ok)
}

// ============================================================================
// HELPERS
// ============================================================================

fn apply_source_overrides(config: &mut BuildConfig, source: &SourceArgs) {
    if let Some(depth) = source.max_depth {
        config.max_depth = depth;
    }
    config.search_paths.extend(source.search_paths.iter().cloned());
}

fn load_program(source: &SourceArgs, config: &BuildConfig) -> NgmakeResult<Program> {
    Loader::new()
        .with_search_paths(config.search_paths.iter().cloned())
        .with_max_depth(config.max_depth)
        .load_file(&source.file)
}

/// Directory commands run in and file times are resolved against.
fn base_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn stdout_error(e: std::io::Error) -> crate::errors::NgmakeError {
    crate::errors::NgmakeError::io("<stdout>", e)
}

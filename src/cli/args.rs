//! Command-line arguments and subcommands for the ngmake CLI.
//!
//! Declared with `clap`'s derive API.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "ngmake",
    version,
    about = "A declarative build tool with a term-rewriting macro language."
)]
pub struct NgmakeArgs {
    /// Raise log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// JSON configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Where to read the build description from.
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Build description to load.
    #[arg(short = 'f', long = "file", default_value = "Ngmakefile")]
    pub file: PathBuf,

    /// Extra directory searched for imported modules; may be repeated.
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    pub search_paths: Vec<PathBuf>,

    /// Bound on nested macro invocations.
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build targets and their dependencies.
    Build {
        #[command(flatten)]
        source: SourceArgs,

        /// Targets to build; defaults to the configured default target.
        targets: Vec<String>,

        /// Number of targets built in parallel.
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Per-command timeout in seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Print commands instead of running them.
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Treat every target as out of date.
        #[arg(short = 'B', long)]
        always_make: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the expanded dependencies and commands of targets.
    Expand {
        #[command(flatten)]
        source: SourceArgs,

        /// Targets to expand; all of them when omitted.
        targets: Vec<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the build description as a GNU Makefile.
    Makefile {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// List all targets.
    Targets {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// List all macros with their clauses.
    Macros {
        #[command(flatten)]
        source: SourceArgs,
    },
}

impl Command {
    pub fn source(&self) -> &SourceArgs {
        match self {
            Command::Build { source, .. }
            | Command::Expand { source, .. }
            | Command::Makefile { source }
            | Command::Targets { source }
            | Command::Macros { source } => source,
        }
    }
}

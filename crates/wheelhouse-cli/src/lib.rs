//! wheelhouse - resolve and install Python wheels
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Command-line front end over `wheelhouse-core`.
//!
//! # Overview
//!
//! `wheelhouse resolve` computes the closure of a set of requirements
//! against one or more package indexes and prints (or locks) it.
//! `wheelhouse install` additionally downloads and unpacks the wheels.
//! `freeze` and `list` read lockfiles back.
//!
//! Configuration comes from `config.toml` (see [`wheelhouse_core::config`]);
//! flags given on the command line win over it.

pub mod cmd;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use wheelhouse_core::InstallOptions;

#[derive(Debug, Parser)]
#[command(name = "wheelhouse")]
#[command(author, version, about = "wheelhouse - resolve and install Python wheels")]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log resolver decisions
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by `resolve` and `install`.
#[derive(Debug, Clone, Args)]
pub struct ResolveArgs {
    /// Requirements, e.g. `requests>=2` or `pkg @ https://host/pkg-1.0-py3-none-any.whl`
    #[arg(required = true)]
    pub requirements: Vec<String>,
    /// Index to query; repeat to try several in order
    #[arg(long = "index-url", short = 'i')]
    pub index_urls: Vec<String>,
    /// Extra constraint applied to every requirement of the same name
    #[arg(long = "constraint", short = 'c')]
    pub constraints: Vec<String>,
    /// Collect every failure instead of stopping at the first
    #[arg(long)]
    pub keep_going: bool,
    /// Do not resolve dependencies
    #[arg(long)]
    pub no_deps: bool,
    /// Allow pre-release versions
    #[arg(long)]
    pub pre: bool,
    /// Replace already installed versions that conflict
    #[arg(long)]
    pub reinstall: bool,
    /// Lockfile of packages that are already available
    #[arg(long)]
    pub baseline: Option<PathBuf>,
}

impl ResolveArgs {
    pub fn install_options(&self) -> InstallOptions {
        InstallOptions {
            keep_going: self.keep_going,
            include_deps: !self.no_deps,
            pre: self.pre,
            reinstall: self.reinstall,
            index_urls: (!self.index_urls.is_empty()).then(|| self.index_urls.clone()),
            constraints: self.constraints.clone(),
            ..InstallOptions::default()
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve requirements and print the result
    Resolve {
        #[command(flatten)]
        args: ResolveArgs,
        /// Write the resolution as a lockfile
        #[arg(long)]
        lock: Option<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Resolve, download and unpack requirements
    Install {
        #[command(flatten)]
        args: ResolveArgs,
        /// Directory to unpack wheels into
        #[arg(long, short = 't')]
        target: Option<PathBuf>,
        /// Write the frozen environment to this lockfile
        #[arg(long)]
        lock: Option<PathBuf>,
    },
    /// Print a lockfile restamped for the configured environment
    Freeze {
        /// Lockfile to read; defaults to the configured baseline
        #[arg(long)]
        baseline: Option<PathBuf>,
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// List the packages recorded in a lockfile
    List {
        /// Lockfile to read
        lock: PathBuf,
    },
}

//! Command-line interface for armforge.
//!
//! # Commands
//!
//! - `synth` - synthesize an app document into a cloud assembly
//! - `build` - build the app's functions without synthesizing templates
//! - `cache` - inspect or clean the function build cache
//!
//! # Examples
//!
//! ```bash
//! # Synthesize into ./armforge.out
//! armforge synth app.yaml
//!
//! # Strict, compact output into a custom directory
//! armforge synth app.yaml --outdir cdk.out --strict --compact
//!
//! # Build functions only, eight at a time
//! armforge build app.yaml --concurrency 8
//!
//! # Remove cache entries whose key contains "3fa9"
//! armforge cache clean --pattern 3fa9
//! ```
//!
//! Settings come from defaults, then the optional project file
//! (`armforge.toml` or `--config`), then command-line flags.

mod build;
mod cache;
mod synth;

pub use build::BuildCommand;
pub use cache::{CacheCommand, CacheSubcommand};
pub use synth::SynthCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{BuilderConfig, ProjectConfig};
use crate::functions::{EsbuildCompiler, FunctionBuilder};

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub no_progress: bool,
}

impl GlobalOptions {
    /// Whether progress indicators should be drawn.
    pub fn progress(&self) -> bool {
        !self.quiet && !self.no_progress
    }
}

/// Synthesize construct trees into ARM templates and build function artifacts.
#[derive(Parser, Debug)]
#[command(name = "armforge", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Project configuration file (defaults to ./armforge.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize an app into templates, function artifacts and a manifest
    Synth(SynthCommand),
    /// Build the app's functions
    Build(BuildCommand),
    /// Manage the function build cache
    Cache(CacheCommand),
}

impl Cli {
    /// Run the parsed command.
    pub async fn execute(self) -> Result<()> {
        init_logging(self.log_filter());

        let project = ProjectConfig::load_with_optional(self.config.as_deref()).await?;
        let globals = GlobalOptions {
            quiet: self.quiet,
            no_progress: self.no_progress,
        };

        match self.command {
            Commands::Synth(cmd) => cmd.execute(&project, &globals).await,
            Commands::Build(cmd) => cmd.execute(&project, &globals).await,
            Commands::Cache(cmd) => cmd.execute(&project, &globals).await,
        }
    }

    /// Filter directive used when `RUST_LOG` is not set.
    fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// `default_filter`.
fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// A builder backed by the esbuild found on this machine.
async fn esbuild_builder(config: BuilderConfig) -> Result<FunctionBuilder> {
    let compiler = EsbuildCompiler::locate().await?;
    Ok(FunctionBuilder::new(config, Arc::new(compiler)))
}

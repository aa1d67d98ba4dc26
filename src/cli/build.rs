//! `armforge build`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::{GlobalOptions, esbuild_builder};
use crate::config::{BuilderConfig, CacheConfig, ProjectConfig};
use crate::construct::{ConstructKind, ConstructNode, load_app};
use crate::functions::{BuildOutcome, FunctionDescriptor};
use crate::utils::progress::progress_bar;

/// Build every function of an app document.
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// App document (YAML or JSON)
    pub app: PathBuf,

    /// Maximum number of builds in flight
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Neither read nor write the build cache
    #[arg(long)]
    pub no_cache: bool,

    /// Stop starting new builds after the first failure
    #[arg(long)]
    pub fail_fast: bool,
}

impl BuildCommand {
    pub fn builder_config(&self, project: &ProjectConfig) -> BuilderConfig {
        let mut config = project.builder_config();
        if let Some(concurrency) = self.concurrency {
            config = config.concurrency(concurrency);
        }
        if self.no_cache {
            config.cache = CacheConfig {
                enabled: false,
                ..config.cache
            };
        }
        config.fail_fast |= self.fail_fast;
        config
    }

    pub async fn execute(self, project: &ProjectConfig, globals: &GlobalOptions) -> Result<()> {
        let tree = load_app(&self.app).await?;
        let mut descriptors = Vec::new();
        collect_functions(&tree, &mut descriptors);
        if descriptors.is_empty() {
            if !globals.quiet {
                println!("No functions to build");
            }
            return Ok(());
        }

        let progress = progress_bar(descriptors.len() as u64, "Building", globals.progress());
        let mut builder = esbuild_builder(self.builder_config(project))
            .await?
            .with_progress(progress.clone());

        let outcome = builder.build_all_settled(&descriptors).await;
        progress.finish_and_clear();
        let outcome = outcome?;

        if !globals.quiet {
            print_outcome(&outcome);
            let stats = builder.stats();
            println!(
                "{} built, {} cached, {} failed ({:.0}% cache hit rate)",
                stats.cache_misses,
                stats.cache_hits,
                stats.failures,
                stats.hit_rate * 100.0
            );
        }
        outcome.into_result().map(|_| ())
    }
}

fn collect_functions(node: &ConstructNode, out: &mut Vec<FunctionDescriptor>) {
    if let ConstructKind::Function(descriptor) = &node.kind {
        out.push(descriptor.clone());
    }
    for child in &node.children {
        collect_functions(child, out);
    }
}

fn print_outcome(outcome: &BuildOutcome) {
    for built in outcome.artifacts.values() {
        let cached = if built.cache_hit { " [cached]" } else { "" };
        println!(
            "{} {} {:.1} KB ({}){cached}",
            "✓".green(),
            built.descriptor.name.bold(),
            built.artifact.size_kb(),
            built.strategy
        );
    }
    for failure in &outcome.failures {
        println!("{} {}: {}", "✗".red(), failure.function_name.bold(), failure.message);
    }
}

//! `armforge synth`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::{GlobalOptions, esbuild_builder};
use crate::config::{ProjectConfig, SynthesisOptions};
use crate::construct::{ConstructKind, ConstructNode, load_app};
use crate::synth::validation::ValidationLevel;
use crate::synth::{SynthesisResult, Synthesizer};
use crate::utils::progress::spinner;

/// Synthesize an app document into a cloud assembly.
#[derive(Args, Debug)]
pub struct SynthCommand {
    /// App document (YAML or JSON)
    pub app: PathBuf,

    /// Output directory
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Treat validation warnings as errors
    #[arg(long)]
    pub strict: bool,

    /// Skip the validation phase
    #[arg(long)]
    pub skip_validation: bool,

    /// Write compact JSON instead of pretty-printed JSON
    #[arg(long)]
    pub compact: bool,

    /// Never split templates into linked templates
    #[arg(long)]
    pub no_linked_templates: bool,

    /// Size ceiling for a single template, in bytes
    #[arg(long, value_name = "BYTES")]
    pub max_template_size: Option<usize>,

    /// Validation depth
    #[arg(long, value_enum)]
    pub level: Option<ValidationLevel>,
}

impl SynthCommand {
    /// Layer command-line flags over the project options.
    pub fn options(&self, project: &ProjectConfig) -> SynthesisOptions {
        let mut options = project.synthesis_options();
        if let Some(outdir) = &self.outdir {
            options.outdir.clone_from(outdir);
        }
        options.strict |= self.strict;
        options.skip_validation |= self.skip_validation;
        if self.compact {
            options.pretty_print = false;
        }
        if self.no_linked_templates {
            options.enable_linked_templates = false;
        }
        if let Some(size) = self.max_template_size {
            options.max_template_size = size;
        }
        if let Some(level) = self.level {
            options.validation_level = level;
        }
        options
    }

    pub async fn execute(self, project: &ProjectConfig, globals: &GlobalOptions) -> Result<()> {
        let options = self.options(project);
        let tree = load_app(&self.app).await?;

        let mut synthesizer = Synthesizer::new(options);
        if has_functions(&tree) {
            synthesizer = synthesizer.with_builder(esbuild_builder(project.builder_config()).await?);
        }

        let progress = spinner("Synthesizing", globals.progress());
        let result = synthesizer.synthesize(&tree).await;
        progress.finish_and_clear();
        let result = result?;

        if !globals.quiet {
            print_summary(&result, synthesizer.options());
        }
        Ok(())
    }
}

fn has_functions(node: &ConstructNode) -> bool {
    matches!(node.kind, ConstructKind::Function(_)) || node.children.iter().any(has_functions)
}

fn print_summary(result: &SynthesisResult, options: &SynthesisOptions) {
    for stack in &result.manifest.stacks {
        let linked = if stack.linked_templates.is_empty() {
            String::new()
        } else {
            format!(", {} linked template(s)", stack.linked_templates.len())
        };
        println!(
            "{} {} ({} resource(s){linked})",
            "✓".green(),
            stack.template_file.bold(),
            stack.resource_count
        );
    }
    for function in &result.manifest.functions {
        let cached = if function.cache_hit { " [cached]" } else { "" };
        println!(
            "{} {} -> {} ({}){cached}",
            "✓".green(),
            function.function_name.bold(),
            function.artifact,
            function.strategy
        );
    }
    let warnings: usize = result.reports.values().map(|r| r.warnings.len()).sum();
    if warnings > 0 {
        println!("{} {warnings} validation warning(s)", "!".yellow());
    }
    println!("Assembly written to {}", options.outdir.display().to_string().cyan());
}

//! `armforge cache`

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use super::GlobalOptions;
use crate::config::ProjectConfig;
use crate::functions::BuildCache;

/// Inspect or clean the function build cache.
#[derive(Args, Debug)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheSubcommand {
    /// Show entry count, size and age range
    Stats,
    /// Remove cache entries
    Clean {
        /// Only remove entries whose key contains this text
        #[arg(long)]
        pattern: Option<String>,
    },
}

impl CacheCommand {
    pub async fn execute(self, project: &ProjectConfig, globals: &GlobalOptions) -> Result<()> {
        // keys are never computed here, so the toolchain version is irrelevant
        let cache = BuildCache::new(project.cache_config(), "");

        match self.command {
            CacheSubcommand::Stats => {
                let stats = cache.stats().await?;
                println!("Cache directory: {}", cache.cache_dir().display().to_string().cyan());
                println!("Entries:         {}", stats.entries);
                println!("Total size:      {}", format_size(stats.total_size));
                if let (Some(oldest), Some(newest)) = (stats.oldest_entry, stats.newest_entry) {
                    println!("Oldest entry:    {}", oldest.format("%Y-%m-%d %H:%M:%S UTC"));
                    println!("Newest entry:    {}", newest.format("%Y-%m-%d %H:%M:%S UTC"));
                }
            }
            CacheSubcommand::Clean { pattern } => {
                let removed = cache.invalidate(pattern.as_deref()).await?;
                if !globals.quiet {
                    println!("{} Removed {removed} cache entr{}", "✓".green(), if removed == 1 { "y" } else { "ies" });
                }
            }
        }
        Ok(())
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{bytes} B") } else { format!("{size:.1} {}", UNITS[unit]) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(1_073_741_824), "1.0 GB");
    }
}

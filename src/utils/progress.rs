//! Progress indicators for long-running CLI commands.
//!
//! Bars are hidden when progress is disabled, either by the caller
//! (`--no-progress`, `--quiet`) or by setting `ARMFORGE_NO_PROGRESS`, so
//! callers can drive them unconditionally.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const NO_PROGRESS_ENV: &str = "ARMFORGE_NO_PROGRESS";

fn progress_disabled(enabled: bool) -> bool {
    !enabled || std::env::var_os(NO_PROGRESS_ENV).is_some()
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
}

/// A bar counting `len` steps, labelled with `prefix`.
pub fn progress_bar(len: u64, prefix: &'static str, enabled: bool) -> ProgressBar {
    if progress_disabled(enabled) {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    bar.set_style(bar_style());
    bar.set_prefix(prefix);
    bar
}

/// A ticking spinner showing `message`.
pub fn spinner(message: impl Into<String>, enabled: bool) -> ProgressBar {
    if progress_disabled(enabled) {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(spinner_style());
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_bars_are_hidden() {
        let bar = progress_bar(10, "build", false);
        assert!(bar.is_hidden());
        bar.inc(3);
        assert_eq!(bar.position(), 3);

        assert!(spinner("working", false).is_hidden());
    }
}

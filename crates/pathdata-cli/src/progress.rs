//! Terminal feedback for long-running commands.
//!
//! A [`Feedback`] wraps an optional indicatif bar. Under `--quiet` there is
//! no bar and every call is a no-op, so commands never branch on quiet
//! themselves.

use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;
use std::time::Duration;

const SPINNER_TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg}";
const COUNTER_TEMPLATE: &str = "{msg} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)";

/// How a command ended, as shown on the final line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Warning,
    Failure,
}

impl Outcome {
    fn glyph(self) -> &'static str {
        match self {
            Outcome::Success => "✓",
            Outcome::Warning => "!",
            Outcome::Failure => "✗",
        }
    }

    fn template(self) -> &'static str {
        match self {
            Outcome::Success => "{prefix:.green} {msg}",
            Outcome::Warning => "{prefix:.yellow} {msg}",
            Outcome::Failure => "{prefix:.red} {msg}",
        }
    }
}

/// Spinner or counter bar, absent when quiet
pub struct Feedback {
    bar: Option<ProgressBar>,
}

impl Feedback {
    /// Indeterminate spinner for builds and imports
    pub fn spinner(message: &str, quiet: bool) -> Self {
        if quiet {
            return Self::silent();
        }
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner().tick_chars(SPINNER_TICKS);
        bar.set_style(
            style
                .clone()
                .template(SPINNER_TEMPLATE)
                .unwrap_or(style),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar: Some(bar) }
    }

    /// Bar counting `total` identifiers
    pub fn counter(total: u64, message: &str, quiet: bool) -> Self {
        if quiet {
            return Self::silent();
        }
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template(COUNTER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        bar.set_style(style);
        bar.set_message(message.to_string());
        Self { bar: Some(bar) }
    }

    pub fn silent() -> Self {
        Self { bar: None }
    }

    pub fn set_message(&self, message: impl Into<Cow<'static, str>>) {
        if let Some(ref bar) = self.bar {
            bar.set_message(message);
        }
    }

    pub fn set_position(&self, position: u64) {
        if let Some(ref bar) = self.bar {
            bar.set_position(position);
        }
    }

    pub fn success(self, message: &str) {
        self.finish(Outcome::Success, message);
    }

    pub fn warn(self, message: &str) {
        self.finish(Outcome::Warning, message);
    }

    pub fn fail(self, message: &str) {
        self.finish(Outcome::Failure, message);
    }

    /// Remove the bar without a final line
    pub fn clear(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }

    fn finish(self, outcome: Outcome, message: &str) {
        let Some(bar) = self.bar else {
            return;
        };
        if let Ok(style) = ProgressStyle::default_spinner().template(outcome.template()) {
            bar.set_style(style);
        }
        bar.set_prefix(outcome.glyph());
        bar.finish_with_message(message.to_string());
    }
}

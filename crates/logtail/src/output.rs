//! Terminal helpers: color detection and the setup spinner.

use std::io::{self, IsTerminal};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use logtail_core::StatusIndicator;

use crate::cli::ColorMode;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

// ── Spinner ──────────────────────────────────────────────────────────

/// Spinner on stderr while the session is set up.
///
/// Falls back to plain stderr lines when stderr is not a terminal, and
/// prints nothing in quiet mode.
pub struct SpinnerStatus {
    bar: Option<ProgressBar>,
    quiet: bool,
    color: bool,
}

impl SpinnerStatus {
    pub fn new(quiet: bool, color: bool) -> Self {
        Self {
            bar: None,
            quiet,
            color,
        }
    }

    fn spinner(message: &str) -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            bar.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
        }
        bar.set_message(message.to_owned());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    fn close(&mut self, line: String) {
        match self.bar.take() {
            Some(bar) => bar.finish_with_message(line),
            None => eprintln!("{line}"),
        }
    }
}

impl StatusIndicator for SpinnerStatus {
    fn begin(&mut self, message: &str) {
        if self.quiet {
            return;
        }
        if io::stderr().is_terminal() {
            self.bar = Some(Self::spinner(message));
        } else {
            eprintln!("{message}");
        }
    }

    fn finish(&mut self, message: &str) {
        if self.quiet {
            return;
        }
        let line = if self.color {
            message.green().to_string()
        } else {
            message.to_owned()
        };
        self.close(line);
    }

    fn fail(&mut self, message: &str) {
        if self.quiet {
            return;
        }
        let line = if self.color {
            format!("✗ {message}").red().to_string()
        } else {
            format!("✗ {message}")
        };
        self.close(line);
    }
}

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};

use riglauncher_core::{DecisionSink, ProgressSink};

/// Terminal-facing progress sink: styled status lines plus a byte-level
/// progress bar while a download is in flight.
pub struct TerminalRenderer {
    bar: Option<ProgressBar>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self { bar: None }
    }

    fn finish_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl ProgressSink for TerminalRenderer {
    fn status(&mut self, message: &str) {
        self.finish_bar();
        let style = status_style();
        println!("{}::{} {message}", style.render(), style.render_reset());
    }

    fn download_progress(&mut self, bytes_so_far: u64, total_size: u64) {
        let bar = self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(total_size.max(1));
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {msg:<10} [{bar:20.cyan/blue}] {bytes}/{total_bytes}",
            ) {
                bar.set_style(style.progress_chars("=>-"));
            }
            bar.set_message("download");
            bar
        });
        bar.set_length(total_size.max(1));
        bar.set_position(bytes_so_far.min(total_size));
        if bytes_so_far >= total_size {
            self.finish_bar();
        }
    }
}

impl Drop for TerminalRenderer {
    fn drop(&mut self) {
        self.finish_bar();
    }
}

fn status_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

/// Decision sink bound to stdin prompts.
///
/// With `assume_yes` every confirmation answers yes and the install-path
/// prompt declines; non-interactive runs are expected to pass the path as a
/// flag instead.
pub struct StdinDecisions {
    assume_yes: bool,
}

impl StdinDecisions {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl DecisionSink for StdinDecisions {
    fn confirm(&mut self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{prompt} [y/N] ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }

    fn choose_install_path(&mut self, prompt: &str) -> Option<PathBuf> {
        if self.assume_yes {
            return None;
        }
        print!("{prompt}: ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return None;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(PathBuf::from(trimmed))
    }
}

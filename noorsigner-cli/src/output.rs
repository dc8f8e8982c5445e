#![forbid(unsafe_code)]

use std::time::Duration;

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};

pub struct Output {
    term: Term,
}

impl Output {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }

    pub fn success(&self, msg: &str) {
        let _ = self
            .term
            .write_line(&format!("{} {}", style("✓").green().bold(), msg));
    }

    pub fn error(&self, msg: &str) {
        let _ = self
            .term
            .write_line(&format!("{} {}", style("✗").red().bold(), msg));
    }

    pub fn warn(&self, msg: &str) {
        let _ = self
            .term
            .write_line(&format!("{} {}", style("!").yellow().bold(), msg));
    }

    pub fn info(&self, msg: &str) {
        let _ = self.term.write_line(msg);
    }

    pub fn header(&self, msg: &str) {
        let _ = self.term.write_line(&format!("\n{}", style(msg).bold()));
    }

    pub fn field(&self, label: &str, value: &str) {
        let _ = self
            .term
            .write_line(&format!("  {}: {}", style(label).dim(), value));
    }

    pub fn key_field(&self, label: &str, value: &str) {
        let _ = self.term.write_line(&format!(
            "  {}: {}",
            style(label).dim(),
            style(value).yellow()
        ));
    }

    pub fn newline(&self) {
        let _ = self.term.write_line("");
    }

    pub fn spinner(&self, msg: &str) -> Spinner {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        Spinner { pb }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

use std::io::{self, Write};

use serde::Serialize;

use crate::retrieve::{ProgressEvent, ProgressSink, RetrieveSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

/// Prints progress lines to stdout when verbose.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleOutput {
    pub verbose: bool,
}

impl ConsoleOutput {
    pub fn section(&self, title: &str) {
        if self.verbose {
            println!("\n{title}");
        }
    }

    pub fn print_summary(&self, summary: &RetrieveSummary, display_target: &str) {
        if self.verbose {
            println!(
                "{} archive(s), {} file(s) written, {} merged",
                summary.archives, summary.files_written, summary.files_merged
            );
        }
        println!("Results written to {display_target}");
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        if !self.verbose {
            return;
        }
        match event.elapsed {
            Some(elapsed) => println!("{} ({:.2}s)", event.message, elapsed.as_secs_f64()),
            None => println!("{}", event.message),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RetrieveSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

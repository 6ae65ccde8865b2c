//! Output formatting module for vmfleet
//!
//! Provides colored terminal output and a JSON mode for scripting.

use colored::Colorize;
use is_terminal::IsTerminal;
use std::io;
use std::time::Instant;

use vmfleet::azure::VmInstance;
use vmfleet::exec::{ExecReport, ExecSummary};

/// Per-host outcome category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    /// Command exited zero
    Ok,
    /// Command exited non-zero
    Failed,
    /// Tunnel or ssh could not be established
    Unreachable,
}

impl HostStatus {
    /// Categorize an execution report
    pub fn of(report: &ExecReport) -> Self {
        if report.error.is_some() {
            HostStatus::Unreachable
        } else if report.exit_code == 0 {
            HostStatus::Ok
        } else {
            HostStatus::Failed
        }
    }

    /// Get the colored string representation
    pub fn colored_string(&self) -> String {
        match self {
            HostStatus::Ok => "ok".green().to_string(),
            HostStatus::Failed => "failed".red().bold().to_string(),
            HostStatus::Unreachable => "unreachable".red().bold().to_string(),
        }
    }

    /// Get the plain string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Ok => "ok",
            HostStatus::Failed => "failed",
            HostStatus::Unreachable => "unreachable",
        }
    }
}

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// JSON output mode
    json_mode: bool,
    /// Verbosity level
    verbosity: u8,
    /// Start time for duration reporting
    start_time: Instant,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, json_mode: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR and non-terminal stdout
        let use_color =
            use_color && std::env::var("NO_COLOR").is_err() && io::stdout().is_terminal();

        Self {
            use_color,
            json_mode,
            verbosity,
            start_time: Instant::now(),
        }
    }

    /// Whether JSON mode is active
    pub fn is_json(&self) -> bool {
        self.json_mode
    }

    fn paint(&self, text: &str, color: fn(&str) -> colored::ColoredString) -> String {
        if self.use_color {
            color(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Print an informational line
    pub fn info(&self, message: &str) {
        if !self.json_mode {
            println!("{}", message);
        }
    }

    /// Print a debug line (verbosity >= 2)
    pub fn debug(&self, message: &str) {
        if !self.json_mode && self.verbosity >= 2 {
            eprintln!("{}", self.paint(message, |s| s.dimmed()));
        }
    }

    /// Print a warning line
    pub fn warn(&self, message: &str) {
        if !self.json_mode {
            eprintln!("{}", self.paint(&format!("WARNING: {}", message), |s| s.yellow()));
        }
    }

    /// Print an error line
    pub fn error(&self, message: &str) {
        eprintln!("{}", self.paint(&format!("ERROR: {}", message), |s| s.red()));
    }

    /// Print a section banner
    pub fn banner(&self, title: &str) {
        if !self.json_mode {
            let line = format!("{} {}", title, "*".repeat(60_usize.saturating_sub(title.len())));
            println!("\n{}", self.paint(&line, |s| s.bold()));
        }
    }

    /// Print one VM row for the list command
    pub fn vm_row(&self, vm: &VmInstance) {
        let state = vm.power_state();
        let state_str = if self.use_color {
            if state.is_running() {
                state.to_string().green().to_string()
            } else {
                state.to_string().yellow().to_string()
            }
        } else {
            state.to_string()
        };

        println!(
            "{:<24} {:<20} {:<14} {}",
            vm.name,
            vm.resource_group,
            state_str,
            vm.primary_private_ip().unwrap_or("-"),
        );
    }

    /// Print the outcome of one host task, with output indented below
    pub fn host_result(&self, report: &ExecReport) {
        let status = HostStatus::of(report);
        let status_str = if self.use_color {
            status.colored_string()
        } else {
            status.as_str().to_string()
        };

        println!(
            "{}: [{}] rc={} ({:.1}s)",
            report.host,
            status_str,
            report.exit_code,
            report.duration.as_secs_f64()
        );

        if let Some(error) = &report.error {
            println!("    {}", self.paint(error, |s| s.red()));
        }
        for line in report.stdout.lines() {
            println!("    {}", line);
        }
        if status != HostStatus::Ok {
            for line in report.stderr.lines() {
                println!("    {}", self.paint(line, |s| s.red()));
            }
        }
    }

    /// Print the final recap across all hosts
    pub fn recap(&self, reports: &[ExecReport]) {
        let summary = ExecSummary::from_reports(reports);
        self.banner("FLEET RECAP");
        println!(
            "{} : ok={} failed={} unreachable={} ({:.1}s total)",
            self.paint("hosts", |s| s.bold()),
            self.paint(&summary.ok.to_string(), |s| s.green()),
            self.paint(&summary.failed.to_string(), |s| s.red()),
            self.paint(&summary.unreachable.to_string(), |s| s.red()),
            self.start_time.elapsed().as_secs_f64(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report(exit_code: i32, error: Option<&str>) -> ExecReport {
        ExecReport {
            host: "web-01".to_string(),
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_host_status_categories() {
        assert_eq!(HostStatus::of(&report(0, None)), HostStatus::Ok);
        assert_eq!(HostStatus::of(&report(2, None)), HostStatus::Failed);
        assert_eq!(
            HostStatus::of(&report(-1, Some("no tunnel"))),
            HostStatus::Unreachable
        );
    }

    #[test]
    fn test_host_status_strings() {
        assert_eq!(HostStatus::Ok.as_str(), "ok");
        assert_eq!(HostStatus::Failed.as_str(), "failed");
        assert_eq!(HostStatus::Unreachable.as_str(), "unreachable");
    }
}

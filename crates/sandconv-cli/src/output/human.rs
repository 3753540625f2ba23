//! Human-readable output formatter with colors and styling.

use std::path::Path;

use anyhow::Result;
use console::Term;
use console::style;
use sandconv_core::PipelineReport;
use sandconv_core::process::SubprocessOutcome;
use sandconv_core::security::ValidationVerdict;

use super::formatter::OutputFormatter;

pub struct HumanFormatter {
    verbose: bool,
    quiet: bool,
    use_colors: bool,
    term: Term,
    err_term: Term,
}

impl HumanFormatter {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            use_colors: console::colors_enabled(),
            term: Term::stdout(),
            err_term: Term::stderr(),
        }
    }

    fn format_size(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.1} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.1} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.1} KB", bytes as f64 / KB as f64)
        } else {
            format!("{bytes} B")
        }
    }

    fn format_number(n: usize) -> String {
        let s = n.to_string();
        let mut result = String::new();
        let mut count = 0;

        for c in s.chars().rev() {
            if count == 3 {
                result.push(',');
                count = 0;
            }
            result.push(c);
            count += 1;
        }

        result.chars().rev().collect()
    }

    fn header(&self, message: &str) {
        if self.use_colors {
            let _ = self
                .term
                .write_line(&format!("{} {message}", style("✓").green().bold()));
        } else {
            let _ = self.term.write_line(message);
        }
    }

    fn line(&self, label: &str, value: impl std::fmt::Display) {
        let _ = self.term.write_line(&format!("  {label:<18}{value}"));
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_conversion_result(&self, output_path: &Path, report: &PipelineReport) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        self.header(&format!("Converted: {}", output_path.display()));
        let _ = self.term.write_line("");
        self.line("Files extracted:", Self::format_number(report.files_extracted));
        self.line("Extracted size:", Self::format_size(report.bytes_extracted));
        self.line("Output files:", Self::format_number(report.output_files));
        self.line("Output size:", Self::format_size(report.output_bytes));

        if report.converter_attempts > 1 {
            self.line("Converter attempts:", report.converter_attempts);
        }

        if self.verbose {
            self.line("Workspace:", &report.workspace_id);
            for timing in &report.stages {
                self.line(&format!("{}:", timing.stage), format!("{:?}", timing.elapsed));
            }
            self.line("Duration:", format!("{:?}", report.duration));
        }

        if !report.warnings.is_empty() {
            let _ = self.term.write_line("");
            if self.use_colors {
                let _ = self
                    .term
                    .write_line(&format!("{}", style("Warnings:").yellow().bold()));
            } else {
                let _ = self.term.write_line("Warnings:");
            }
            for warning in &report.warnings {
                let _ = self.term.write_line(&format!("  - {warning}"));
            }
        }

        Ok(())
    }

    fn format_validation_result(&self, archive: &Path, verdict: &ValidationVerdict) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        self.header(&format!("Archive accepted: {}", archive.display()));
        self.line("Filename:", &verdict.sanitized_name);
        self.line("Entries:", Self::format_number(verdict.entry_count));
        self.line("Declared size:", Self::format_size(verdict.declared_size));
        if self.verbose {
            self.line("Size ceiling:", Self::format_size(verdict.decompressed_ceiling));
        }

        Ok(())
    }

    fn format_probe_result(&self, binary: &Path, outcome: &SubprocessOutcome) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        self.header(&format!("Converter available: {}", binary.display()));
        let version = outcome.stdout.text();
        let version = version.trim();
        if !version.is_empty() {
            self.line("Version:", version);
        }
        if self.verbose {
            self.line("Elapsed:", format!("{:?}", outcome.elapsed));
        }

        Ok(())
    }

    fn format_sweep_result(&self, base_dir: &Path, removed: usize) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        self.header(&format!(
            "Removed {} orphaned workspace(s) from {}",
            Self::format_number(removed),
            base_dir.display()
        ));

        Ok(())
    }

    fn format_error(&self, error: &anyhow::Error) {
        // Always show errors, even in quiet mode
        if self.use_colors {
            let _ = self
                .err_term
                .write_line(&format!("{} {error:?}", style("ERROR:").red().bold()));
        } else {
            let _ = self.err_term.write_line(&format!("ERROR: {error:?}"));
        }
    }

    fn format_warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        if self.use_colors {
            let _ = self
                .err_term
                .write_line(&format!("{} {message}", style("⚠").yellow().bold()));
        } else {
            let _ = self.err_term.write_line(&format!("WARNING: {message}"));
        }
    }
}

//! JSON output formatter for machine-readable results.

use std::io::Write;
use std::io::{self};
use std::path::Path;

use anyhow::Result;
use sandconv_core::PipelineReport;
use sandconv_core::process::SubprocessOutcome;
use sandconv_core::security::ValidationVerdict;
use serde::Serialize;

use super::formatter::JsonOutput;
use super::formatter::OutputFormatter;

pub struct JsonFormatter {
    operation: &'static str,
}

impl JsonFormatter {
    pub const fn new(operation: &'static str) -> Self {
        Self { operation }
    }

    fn output<T: Serialize>(value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        writeln!(io::stdout(), "{json}")?;
        Ok(())
    }
}

#[derive(Serialize)]
struct StageOutput {
    stage: &'static str,
    elapsed_ms: u128,
}

impl OutputFormatter for JsonFormatter {
    fn format_conversion_result(&self, output_path: &Path, report: &PipelineReport) -> Result<()> {
        #[derive(Serialize)]
        struct ConversionOutput<'a> {
            output_path: String,
            workspace_id: &'a str,
            filename: &'a str,
            upload_bytes: u64,
            files_extracted: usize,
            bytes_extracted: u64,
            converter_attempts: u32,
            output_files: usize,
            output_bytes: u64,
            stages: Vec<StageOutput>,
            duration_ms: u128,
            warnings: &'a [String],
        }

        let data = ConversionOutput {
            output_path: output_path.display().to_string(),
            workspace_id: &report.workspace_id,
            filename: &report.filename,
            upload_bytes: report.upload_bytes,
            files_extracted: report.files_extracted,
            bytes_extracted: report.bytes_extracted,
            converter_attempts: report.converter_attempts,
            output_files: report.output_files,
            output_bytes: report.output_bytes,
            stages: report
                .stages
                .iter()
                .map(|timing| StageOutput {
                    stage: timing.stage.as_str(),
                    elapsed_ms: timing.elapsed.as_millis(),
                })
                .collect(),
            duration_ms: report.duration.as_millis(),
            warnings: &report.warnings,
        };

        Self::output(&JsonOutput::success("convert", data))
    }

    fn format_validation_result(&self, archive: &Path, verdict: &ValidationVerdict) -> Result<()> {
        #[derive(Serialize)]
        struct ValidationOutput<'a> {
            archive: String,
            sanitized_name: &'a str,
            entry_count: usize,
            declared_size: u64,
            decompressed_ceiling: u64,
        }

        let data = ValidationOutput {
            archive: archive.display().to_string(),
            sanitized_name: &verdict.sanitized_name,
            entry_count: verdict.entry_count,
            declared_size: verdict.declared_size,
            decompressed_ceiling: verdict.decompressed_ceiling,
        };

        Self::output(&JsonOutput::success("validate", data))
    }

    fn format_probe_result(&self, binary: &Path, outcome: &SubprocessOutcome) -> Result<()> {
        #[derive(Serialize)]
        struct ProbeOutput {
            binary: String,
            exit_code: Option<i32>,
            version: String,
            attempts: u32,
            elapsed_ms: u128,
        }

        let data = ProbeOutput {
            binary: binary.display().to_string(),
            exit_code: outcome.exit_code,
            version: outcome.stdout.text().trim().to_string(),
            attempts: outcome.attempts,
            elapsed_ms: outcome.elapsed.as_millis(),
        };

        Self::output(&JsonOutput::success("probe", data))
    }

    fn format_sweep_result(&self, base_dir: &Path, removed: usize) -> Result<()> {
        #[derive(Serialize)]
        struct SweepOutput {
            base_dir: String,
            removed: usize,
        }

        let data = SweepOutput {
            base_dir: base_dir.display().to_string(),
            removed,
        };

        Self::output(&JsonOutput::success("sweep", data))
    }

    fn format_error(&self, error: &anyhow::Error) {
        let output = JsonOutput::error(self.operation, format!("{error:#}"));
        let _ = Self::output(&output);
    }

    fn format_warning(&self, message: &str) {
        #[derive(Serialize)]
        struct WarningData<'a> {
            message: &'a str,
        }

        let output = JsonOutput::success("warning", WarningData { message });
        let _ = Self::output(&output);
    }
}

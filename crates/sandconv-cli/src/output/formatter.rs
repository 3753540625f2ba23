//! Output formatter trait for CLI results.

use std::path::Path;

use anyhow::Result;
use sandconv_core::PipelineReport;
use sandconv_core::process::SubprocessOutcome;
use sandconv_core::security::ValidationVerdict;
use serde::Serialize;

/// Common output formatter trait
pub trait OutputFormatter {
    /// Format a finished conversion
    fn format_conversion_result(&self, output_path: &Path, report: &PipelineReport) -> Result<()>;

    /// Format a validation verdict
    fn format_validation_result(&self, archive: &Path, verdict: &ValidationVerdict) -> Result<()>;

    /// Format a converter probe
    fn format_probe_result(&self, binary: &Path, outcome: &SubprocessOutcome) -> Result<()>;

    /// Format an orphan sweep
    fn format_sweep_result(&self, base_dir: &Path, removed: usize) -> Result<()>;

    /// Format error message
    fn format_error(&self, error: &anyhow::Error);

    /// Format warning message
    fn format_warning(&self, message: &str);
}

/// Generic JSON output structure
#[derive(Debug, Serialize)]
pub struct JsonOutput<T> {
    pub operation: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn success(operation: impl Into<String>, data: T) -> Self {
        Self {
            operation: operation.into(),
            status: Status::Success,
            data: Some(data),
            error: None,
        }
    }
}

impl JsonOutput<()> {
    pub fn error(operation: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            status: Status::Error,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_output_omits_data() {
        let output = JsonOutput::error("convert", "boom");
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
        assert!(json.get("data").is_none());
    }
}

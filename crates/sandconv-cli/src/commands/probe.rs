//! Probe command implementation.

use anyhow::Result;
use sandconv_core::Pipeline;
use tracing::debug;

use crate::cli::ProbeArgs;
use crate::error::convert_pipeline_error;
use crate::output::OutputFormatter;

pub async fn execute(args: &ProbeArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    let config = args.config();
    let binary = config.converter.binary.clone();
    debug!(binary = %binary.display(), "probing converter");

    let pipeline = Pipeline::new(config).map_err(|e| convert_pipeline_error(e, &binary))?;
    let outcome = pipeline
        .probe_converter()
        .await
        .map_err(|e| convert_pipeline_error(e, &binary))?;

    formatter.format_probe_result(&binary, &outcome)?;

    Ok(())
}

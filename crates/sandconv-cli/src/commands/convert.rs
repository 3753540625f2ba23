//! Convert command implementation.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use sandconv_core::Pipeline;
use sandconv_core::UploadedArchive;
use tracing::info;

use super::check_upload_size;
use super::upload_name;
use crate::cli::ConvertArgs;
use crate::error::add_archive_context;
use crate::output::OutputFormatter;

pub async fn execute(args: &ConvertArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.archive));

    if output_path.exists() && !args.force {
        bail!(
            "Output file '{}' already exists\nHINT: Use --force to overwrite it.",
            output_path.display()
        );
    }

    let config = args.config();
    let metadata = tokio::fs::metadata(&args.archive)
        .await
        .with_context(|| format!("failed to read archive '{}'", args.archive.display()))?;
    check_upload_size(&args.archive, metadata.len(), &config.limits)?;

    let bytes = tokio::fs::read(&args.archive)
        .await
        .with_context(|| format!("failed to read archive '{}'", args.archive.display()))?;
    let upload = UploadedArchive::new(upload_name(args.filename.as_deref(), &args.archive), bytes);

    let pipeline = add_archive_context(Pipeline::new(config), &args.archive)?;
    let output = add_archive_context(pipeline.run(upload).await, &args.archive)?;

    tokio::fs::write(&output_path, output.archive.bytes())
        .await
        .with_context(|| format!("failed to write '{}'", output_path.display()))?;
    info!(
        output = %output_path.display(),
        bytes = output.archive.len(),
        "converted archive written"
    );

    formatter.format_conversion_result(&output_path, &output.report)?;

    Ok(())
}

fn default_output_path(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map_or_else(|| "archive".into(), |s| s.to_string_lossy());
    archive.with_file_name(format!("{stem}-converted.zip"))
}

//! Validate command implementation.

use anyhow::Context;
use anyhow::Result;
use sandconv_core::Pipeline;
use sandconv_core::UploadedArchive;

use super::check_upload_size;
use super::upload_name;
use crate::cli::ValidateArgs;
use crate::error::add_archive_context;
use crate::output::OutputFormatter;

pub fn execute(args: &ValidateArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    let config = args.config();
    let read_error = || format!("failed to read archive '{}'", args.archive.display());

    let metadata = std::fs::metadata(&args.archive).with_context(read_error)?;
    check_upload_size(&args.archive, metadata.len(), &config.limits)?;

    let bytes = std::fs::read(&args.archive).with_context(read_error)?;
    let upload = UploadedArchive::new(upload_name(args.filename.as_deref(), &args.archive), bytes);

    let pipeline = add_archive_context(Pipeline::new(config), &args.archive)?;
    let verdict = add_archive_context(pipeline.validate(&upload), &args.archive)?;

    formatter.format_validation_result(&args.archive, &verdict)?;

    Ok(())
}

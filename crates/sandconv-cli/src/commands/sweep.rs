//! Sweep command implementation.

use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use sandconv_core::Pipeline;
use tracing::debug;

use crate::cli::SweepArgs;
use crate::output::OutputFormatter;

pub fn execute(args: &SweepArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    let config = args.config();
    let base_dir = config.workspace.base_dir.clone();

    if !base_dir.is_dir() {
        formatter.format_warning(&format!(
            "workspace base '{}' does not exist, nothing to sweep",
            base_dir.display()
        ));
        return formatter.format_sweep_result(&base_dir, 0);
    }

    let pipeline = Pipeline::new(config)
        .with_context(|| format!("invalid workspace settings for '{}'", base_dir.display()))?;
    debug!(base = %base_dir.display(), min_age = args.min_age, "sweeping workspaces");
    let removed = pipeline
        .workspaces()
        .sweep_orphans(Duration::from_secs(args.min_age));

    formatter.format_sweep_result(&base_dir, removed)?;

    Ok(())
}

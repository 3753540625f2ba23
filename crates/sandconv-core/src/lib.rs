//! Sandboxed conversion of uploaded documentation archives.
//!
//! `sandconv-core` takes an untrusted ZIP upload, validates it, extracts it
//! into a private per-request workspace, runs an external converter under
//! supervision, and packages the converter's Markdown output into a new
//! archive. The workspace is removed whether the run succeeds or fails.
//!
//! Protection covers path traversal, zip bombs, symlink entries, nested
//! archives, hostile filenames, shell injection through converter arguments,
//! environment leakage into the converter, and runaway converter processes.
//!
//! # Examples
//!
//! ```no_run
//! use sandconv_core::Pipeline;
//! use sandconv_core::SandboxConfig;
//! use sandconv_core::UploadedArchive;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::new(SandboxConfig::default())?;
//! let upload = UploadedArchive::new("MyKit.doccarchive.zip", std::fs::read("upload.zip")?);
//!
//! let output = pipeline.run(upload).await?;
//! println!("Converted {} files", output.report.output_files);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod copy;
pub mod error;
pub mod extraction;
pub mod packaging;
pub mod pipeline;
pub mod process;
pub mod report;
pub mod security;
pub mod types;
pub mod workspace;

#[doc(hidden)]
pub mod test_utils;

// Re-export main API types
pub use config::ArchiveLimits;
pub use config::ConverterConfig;
pub use config::SandboxConfig;
pub use config::WorkspaceConfig;
pub use error::ErrorKind;
pub use error::FilenameIssue;
pub use error::PipelineError;
pub use error::Result;
pub use error::Violation;
pub use packaging::OutputArchive;
pub use pipeline::Pipeline;
pub use pipeline::PipelineOutput;
pub use pipeline::PipelineStage;
pub use report::ExtractionReport;
pub use report::PipelineReport;

// Re-export types module for easier access
pub use types::SafePath;
pub use types::SandboxRoot;
pub use types::UploadedArchive;

//! Type-safe wrappers for pipeline inputs and extraction paths.
//!
//! Security-relevant types are validated upon construction and cannot be
//! created from raw types without going through validation.

pub mod safe_path;
pub mod sandbox_root;
pub mod upload;

pub use safe_path::SafePath;
pub use sandbox_root::SandboxRoot;
pub use upload::UploadedArchive;

//! Archive extraction into a sandbox root.

pub mod engine;
pub mod writer;

pub use engine::SecureExtractor;

//! Security validation modules.

pub mod filename;
pub mod quota;
pub mod signature;
pub mod validator;
pub mod zipbomb;

pub use filename::sanitize_filename;
pub use quota::QuotaTracker;
pub use signature::check_signature;
pub use validator::ArchiveValidator;
pub use validator::ValidationVerdict;
pub use validator::check_entry_name;
pub use validator::is_symlink_mode;
pub use zipbomb::check_decompressed_total;
pub use zipbomb::decompressed_ceiling;

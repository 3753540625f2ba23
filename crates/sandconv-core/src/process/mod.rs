//! Supervised execution of the external converter.

pub mod command;
pub mod env;
pub mod outcome;
pub mod supervisor;

pub use command::ConvertFlag;
pub use command::ConverterCommand;
pub use command::InfoFlag;
pub use command::validate_argument;
pub use env::sanitize_environment;
pub use outcome::CapturedOutput;
pub use outcome::SubprocessOutcome;
pub use supervisor::ProcessSupervisor;

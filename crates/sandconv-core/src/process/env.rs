//! Environment filtering for the converter process.

use std::ffi::OsStr;

use tracing::debug;

use crate::ConverterConfig;

/// Keeps only allow-listed variables with safe values.
///
/// A variable is forwarded only if its name is on
/// [`ConverterConfig::allowed_env`], both name and value are valid UTF-8, and
/// the value has no NUL byte and fits within `max_env_value_len` bytes.
/// Values are never logged.
///
/// # Examples
///
/// ```
/// use sandconv_core::ConverterConfig;
/// use sandconv_core::process::sanitize_environment;
///
/// let config = ConverterConfig::default();
/// let env = sanitize_environment(
///     [("PATH", "/usr/bin"), ("AWS_SECRET_ACCESS_KEY", "hunter2")],
///     &config,
/// );
/// assert_eq!(env, vec![("PATH".to_string(), "/usr/bin".to_string())]);
/// ```
pub fn sanitize_environment<I, K, V>(vars: I, config: &ConverterConfig) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let mut kept = Vec::new();

    for (key, value) in vars {
        let (Some(key), Some(value)) = (key.as_ref().to_str(), value.as_ref().to_str()) else {
            continue;
        };
        if !config.is_env_allowed(key) {
            continue;
        }
        if value.contains('\0') || value.len() > config.max_env_value_len {
            debug!(variable = key, "dropping environment variable with unsafe value");
            continue;
        }
        kept.push((key.to_string(), value.to_string()));
    }

    kept
}

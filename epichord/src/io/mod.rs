//! On-disk record formats and the path-safety check shared by both readers.

pub mod sequence_file;
pub mod tempo_file;

use crate::error::CommandError;

/// Refuse any path that doesn't begin with the configured prefix. The
/// original source leaves the matching `unlink()` calls commented out, so
/// files are treated as consumable input, never deleted.
pub fn check_path_prefix(path: &str, required_prefix: &str) -> Result<(), CommandError> {
    if path.starts_with(required_prefix) {
        Ok(())
    } else {
        Err(CommandError::InvalidPathPrefix {
            path: path.to_string(),
            required_prefix: required_prefix.to_string(),
        })
    }
}

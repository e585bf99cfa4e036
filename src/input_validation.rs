//! Validation of user-entered names
//!
//! Bookmark names double as descriptor file names and file/folder names are
//! created verbatim on the real filesystem, so both go through the same
//! checks before any mutation happens.

use crate::error::{BookmarkError, Result};

const MAX_NAME_LENGTH: usize = 255;

#[cfg(windows)]
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Validate a single path segment entered by the user.
///
/// Rejects empty input, path separators, control characters and the `.`/`..`
/// pseudo entries.
pub fn validate_file_name(name: &str) -> Result<()> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(BookmarkError::Validation("name cannot be empty".to_string()));
    }

    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(BookmarkError::Validation(format!(
            "name too long: {} bytes (max: {MAX_NAME_LENGTH})",
            trimmed.len()
        )));
    }

    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(BookmarkError::Validation(format!(
            "name must not contain path separators: '{trimmed}'"
        )));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(BookmarkError::Validation(
            "name contains control characters".to_string(),
        ));
    }

    if trimmed == "." || trimmed == ".." {
        return Err(BookmarkError::Validation(format!(
            "'{trimmed}' is not a valid name"
        )));
    }

    #[cfg(windows)]
    if trimmed.contains(RESERVED_CHARS) {
        return Err(BookmarkError::Validation(format!(
            "name contains reserved characters: '{trimmed}'"
        )));
    }

    Ok(())
}

/// Validate a bookmark display name. Same rules as file names since the
/// descriptor file is named after it.
pub fn validate_bookmark_name(name: &str) -> Result<()> {
    validate_file_name(name)
}

//! Input validation for render requests.
//!
//! Validates artifact content before any context interaction:
//!
//! - **Empty content** - Nothing to paint; rejected outright
//! - **Null bytes** - Could truncate downstream string handling
//! - **Oversize content** - Bounds memory held per render
//! - **Empty artifact id** - Events would be unroutable
//!
//! ## Example
//!
//! ```ignore
//! use renderbox_sandbox::validate::{validate_content, validate_artifact_id};
//!
//! assert!(validate_content("<p>hi</p>", MAX_CONTENT_BYTES).is_ok());
//! assert!(validate_content("", MAX_CONTENT_BYTES).is_err());
//! assert!(validate_artifact_id("artifact-1").is_err() == false);
//! ```

use thiserror::Error;

/// Default upper bound on artifact content size.
pub const MAX_CONTENT_BYTES: usize = 2 * 1024 * 1024;

/// Validation error for render inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("content cannot be empty")]
    EmptyContent,

    #[error("null byte in content")]
    NullByte,

    #[error("content too large: {len} bytes (max {max})")]
    ContentTooLarge { len: usize, max: usize },

    #[error("artifact id cannot be empty")]
    EmptyArtifactId,
}

/// Validate artifact content against the configured size bound.
pub fn validate_content(content: &str, max_bytes: usize) -> Result<(), ValidationError> {
    if content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    if content.contains('\0') {
        return Err(ValidationError::NullByte);
    }
    if content.len() > max_bytes {
        return Err(ValidationError::ContentTooLarge {
            len: content.len(),
            max: max_bytes,
        });
    }
    Ok(())
}

/// Validate an artifact identifier.
pub fn validate_artifact_id(artifact_id: &str) -> Result<(), ValidationError> {
    if artifact_id.is_empty() {
        return Err(ValidationError::EmptyArtifactId);
    }
    if artifact_id.contains('\0') {
        return Err(ValidationError::NullByte);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_valid() {
        assert!(validate_content("<p>hi</p>", MAX_CONTENT_BYTES).is_ok());
    }

    #[test]
    fn content_empty() {
        assert_eq!(
            validate_content("", MAX_CONTENT_BYTES),
            Err(ValidationError::EmptyContent)
        );
    }

    #[test]
    fn content_null_byte() {
        assert_eq!(
            validate_content("a\0b", MAX_CONTENT_BYTES),
            Err(ValidationError::NullByte)
        );
    }

    #[test]
    fn content_oversize() {
        let big = "x".repeat(9);
        assert_eq!(
            validate_content(&big, 8),
            Err(ValidationError::ContentTooLarge { len: 9, max: 8 })
        );
    }

    #[test]
    fn artifact_id_empty() {
        assert_eq!(
            validate_artifact_id(""),
            Err(ValidationError::EmptyArtifactId)
        );
    }

    #[test]
    fn artifact_id_valid() {
        assert!(validate_artifact_id("artifact-42").is_ok());
    }
}

//! Frame decode errors.

use thiserror::Error;

/// Errors produced while decoding or encoding a wire frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The payload was not valid JSON for the expected shape.
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload was a JSON value without a string `type` field.
    #[error("frame has no `type` discriminant")]
    MissingType,
    /// The payload decoded, but as a different frame kind.
    #[error("expected `{expected}` frame, got `{found}`")]
    UnexpectedType {
        /// The discriminant the caller asked for.
        expected: &'static str,
        /// The discriminant actually present.
        found: String,
    },
}

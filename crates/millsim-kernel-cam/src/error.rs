//! Error types for toolpath planning.

use thiserror::Error;

use crate::ToolpathKind;

/// Errors that can occur while planning a toolpath.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CamError {
    /// Tool geometry is unusable.
    #[error("invalid tool: {0}")]
    InvalidTool(String),

    /// A machining parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Boundary has fewer than three vertices or no area.
    #[error("boundary must have at least 3 vertices and non-zero area")]
    EmptyBoundary,

    /// The operation kind has no planner.
    #[error("unsupported operation: {}", .0.name())]
    UnsupportedOperation(ToolpathKind),
}

/// Result type for planning operations.
pub type Result<T> = std::result::Result<T, CamError>;

//! Tool errors.
//!
//! Recoverable problems (bad input, upstream failures) are reported through
//! [`ToolResult::error`](super::ToolResult::error) so the model can react.
//! A [`ToolError`] means the tool itself could not run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    #[error("Tool execution failed: {0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

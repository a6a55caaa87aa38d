//! Utility modules for common functionality

mod string;

pub use string::{truncate_str, truncate_with_ellipsis};

//! searchcrabs
//!
//! A web-research agent served over the A2A protocol.

pub mod a2a;
pub mod brain;
pub mod cli;
pub mod config;
pub mod logging;
pub mod memory;
pub mod pricing;
pub mod utils;

#[cfg(test)]
mod tests;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Command line interface module
//!
//! Argument parsing plus the runner that loads the input artifact and configuration,
//! runs the push step and writes the resulting artifact.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::Runner;

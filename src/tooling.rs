//! Tooling & Integration Layer
//!
//! Command-line inspection of containers, usable against any store the
//! configuration layer can open.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};

//! Grinder CLI library
//!
//! Argument parsing, configuration loading and the command implementations
//! behind the `grind` binary.

pub mod cli;
pub mod commands;
pub mod config;

//! CLI module for wiremock-launcher - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands to run the fixture,
//! run a command against it, pre-fetch the jar, and probe a port.

pub mod commands;

pub use commands::Cli;

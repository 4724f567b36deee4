//! Managed child process
//!
//! Builds the `java -jar` command line and supervises the resulting process:
//! start, exit observation, and idempotent termination.

pub mod args;
pub mod supervisor;

pub use args::*;
pub use supervisor::*;

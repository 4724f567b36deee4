//! wiremock-launcher - WireMock standalone as a managed test fixture
//!
//! Downloads the standalone jar once, launches it with `java`, waits until
//! its port accepts connections, and makes sure it is stopped again: at the
//! end of the run, or in watch mode on interrupt, host exit or a fault.

pub mod artifact;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod port;
pub mod process;

pub use error::{LauncherError, Result};

//! Artifact acquisition
//!
//! Resolves where the WireMock standalone jar lives (remotely and in the local
//! cache) and downloads it once when it is missing.

mod fetcher;
mod location;

pub use fetcher::*;
pub use location::*;

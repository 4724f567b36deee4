//! Fixture lifecycle: the `prepare` / `complete` runner hooks and the
//! watch-mode termination triggers.

pub mod controller;
pub mod triggers;

pub use controller::*;
pub use triggers::*;

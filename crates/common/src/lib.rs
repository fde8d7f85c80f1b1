//! Common types shared across crewline crates.
//!
//! Every crate reports failures through [`CrewError`] so that the engine
//! and the web boundary agree on which failures are retryable, which are
//! recoverable and which abort a run.

pub mod error;

pub use error::{CrewError, Result};

//! Data model shared by the process manager crates.
//!
//! Everything here is plain data: a [`Command`] describes a job, a [`Message`] is one leveled unit of output,
//! a [`JobResult`] is the terminal snapshot of a run and a [`Startup`] is one entry of a boot batch.
mod error;
pub use error::ModelError;

mod domain;
pub use domain::*;

mod kind;
pub use kind::*;

mod startup;
pub use startup::{After, Startup};

//! Boot ordering and readiness gating.
//!
//! ```text
//!  Vec<Startup> ─► StartupTree (weights, errors) ─► slice(init, net)  ─► run_slice ─┐
//!                                                  slice(net, boot)  ─► run_slice ─┤ cohorts run
//!                                                  slice(boot, END)  ─► run_slice ─┘ one after another
//! ```
//!
//! ## Rules
//! - A broken entry (cycle, unknown dependency) is reported and dropped; the rest of the batch boots.
//! - Inside a cohort every entry starts concurrently and blocks on its dependency keys.
//! - Keys needed but not provided by the cohort are released `true` up front.
//! - A cohort step returns once every entry released its key.
mod cohort;
mod state;
mod tree;

pub use state::StateMachine;
pub use tree::StartupTree;

use thiserror::Error;

/// Errors found while ordering a boot batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootError {
    #[error("entry '{key}': cyclic dependency ({})", chain.join(" -> "))]
    Cyclic { key: String, chain: Vec<String> },

    #[error("entry '{key}': unknown dependency '{dependency}'")]
    UnknownDependency { key: String, dependency: String },

    #[error("entry '{key}': dependency '{dependency}' is broken")]
    BrokenDependency { key: String, dependency: String },

    #[error("duplicate entry key '{0}'")]
    DuplicateKey(String),

    #[error("entry for '{0}' has no key")]
    MissingKey(String),
}

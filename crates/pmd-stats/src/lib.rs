//! Statsd-style aggregation of per-job samples.
//!
//! Samples use the `key:value|type[|@rate]` line format:
//!
//! | type | kind      | flush behaviour                     |
//! |------|-----------|-------------------------------------|
//! | `g`  | gauge     | `+v`/`-v` deltas or absolute set; kept across flushes |
//! | `c`  | counter   | sum; reset to 0                     |
//! | `ms` | timer     | mean of samples; reset              |
//! | `s`  | set       | number of distinct values; reset    |
//! | `kv` | key-value | last value; reset to 0              |
//!
//! [`Aggregator`] is the synchronous core, [`Statsd`] runs one aggregator on its own task and
//! hands every [`Snapshot`] to a flush handler.
mod aggregate;
mod aggregator;
mod error;
mod sample;
mod snapshot;
mod statsd;

pub use aggregate::Kind;
pub use aggregator::Aggregator;
pub use error::StatsError;
pub use sample::Sample;
pub use snapshot::Snapshot;
pub use statsd::{FlushHandler, Statsd};

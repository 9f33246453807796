//! Output stream protocol.
//!
//! Each line of a process' stdout/stderr is one of:
//!
//! ```text
//!   N::content          single message at level N
//!   N:::first line      opens a multi-line message at level N
//!   ...                 appended verbatim
//!   :::                 closes it
//!   anything else       message at the stream's default level
//! ```
//!
//! Empty lines are skipped. A multi-line message still open at EOF is discarded.
mod buffer;
mod consumer;
mod parser;

pub use buffer::RingBuffer;
pub use consumer::Consumer;
pub use parser::Parser;

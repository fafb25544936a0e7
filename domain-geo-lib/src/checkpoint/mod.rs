//! Checkpoint log handling.
//!
//! The checkpoint log is an append-only file holding one matched domain per
//! line. It is written while the pool runs and read back on the next run to
//! carry earlier matches forward and to find where to resume.

/// Reading a previous run's log into a [`ResumeState`](crate::ResumeState)
pub mod reader;

/// Appending matches during a run
pub mod writer;

pub use reader::{parse_checkpoint, read_checkpoint};
pub use writer::MatchSink;

//! Multi-session frame receive harness.
//!
//! Every session pulls frames from its own pipeline on a dedicated thread,
//! optionally keeps the latest few in a memory-mapped circular dump file and
//! counts what it got. [`controller::run`] drives a whole run.

pub mod controller;
pub mod dump;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod worker;

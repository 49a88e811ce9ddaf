//! Deferred batching for invalidation-sensitive work.
//!
//! A [`RunLoop`] groups synchronous work into batches. Work scheduled inside a
//! batch is held in named [`Queue`]s and drained when the outermost batch
//! closes. [`RunLoop::schedule_once`] collapses repeated requests with the same
//! [`TaskKey`] into one task, which is what turns many `recompute` calls in one
//! turn into a single invalidation.

mod queue;
mod run_loop;

pub use queue::{Queue, TaskKey};
pub use run_loop::{DEFAULT_MAX_FLUSH_TASKS, FlushReport, RunLoop, RunLoopConfig, RunLoopError};

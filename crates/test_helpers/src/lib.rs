//! Utilities for driving a [`RunLoop`] from tests.

use trellis_destroyable::Destroyable;
use trellis_runloop::{FlushReport, Queue, RunLoop};

/// Installs a `tracing` subscriber writing through the test harness.
/// Safe to call from every test.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Runs `f` in its own batch and flushes it.
#[track_caller]
pub fn run_task<R>(run_loop: &RunLoop, f: impl FnOnce() -> R) -> R {
	run_loop.run(f).expect("run loop overflowed")
}

/// Destroys `target` in its own batch, so teardown has finished on return.
#[track_caller]
pub fn run_destroy(run_loop: &RunLoop, target: Option<&Destroyable>) {
	if let Some(target) = target {
		run_loop.run(|| target.destroy(run_loop)).expect("run loop overflowed").expect("destroy failed");
	}
}

/// Schedules `f` for the next flush and returns without running it.
pub fn run_task_next<F>(run_loop: &RunLoop, f: F)
where
	F: FnOnce() + Send + 'static,
{
	run_loop.schedule(Queue::Actions, f);
}

/// Flushes until nothing is pending and returns the merged report.
#[track_caller]
pub fn run_loop_settled(run_loop: &RunLoop) -> FlushReport {
	assert!(!run_loop.is_in_batch(), "run_loop_settled called inside a batch");
	let mut total = FlushReport::default();
	while run_loop.has_pending() {
		let report = run_loop.flush().expect("run loop overflowed");
		total.executed += report.executed;
		total.coalesced += report.coalesced;
	}
	total
}

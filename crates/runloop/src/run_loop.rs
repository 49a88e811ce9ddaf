use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::queue::{QUEUE_COUNT, Queue, TaskKey};

/// Default cap on tasks executed by one flush.
pub const DEFAULT_MAX_FLUSH_TASKS: usize = 10_000;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
	key: Option<TaskKey>,
	task: Task,
}

#[derive(Default)]
struct State {
	depth: usize,
	flushing: bool,
	queues: [VecDeque<Scheduled>; QUEUE_COUNT],
	pending_keys: FxHashSet<(Queue, TaskKey)>,
	coalesced: usize,
}

impl State {
	fn pop_next(&mut self) -> Option<Scheduled> {
		for queue in Queue::ALL {
			if let Some(scheduled) = self.queues[queue.index()].pop_front() {
				if let Some(key) = scheduled.key {
					self.pending_keys.remove(&(queue, key));
				}
				return Some(scheduled);
			}
		}
		None
	}

	fn pending(&self) -> usize {
		self.queues.iter().map(VecDeque::len).sum()
	}

	fn clear(&mut self) -> usize {
		let dropped = self.pending();
		for queue in &mut self.queues {
			queue.clear();
		}
		self.pending_keys.clear();
		dropped
	}
}

/// Run-loop limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLoopConfig {
	/// Tasks one flush may execute before it is treated as runaway.
	pub max_flush_tasks: usize,
}

impl Default for RunLoopConfig {
	fn default() -> Self {
		Self {
			max_flush_tasks: DEFAULT_MAX_FLUSH_TASKS,
		}
	}
}

/// Outcome of one [`RunLoop::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
	/// Tasks executed.
	pub executed: usize,
	/// `schedule_once` calls absorbed by an already pending task since the last flush.
	pub coalesced: usize,
}

/// Run-loop failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunLoopError {
	/// A flush kept producing work past the configured cap.
	#[error("run loop flush exceeded {limit} tasks; dropped {dropped} pending tasks")]
	Overflow { limit: usize, dropped: usize },
}

/// Cooperative batching scheduler.
///
/// Work scheduled while a batch is open is deferred until the outermost batch
/// closes, then drained queue by queue. Cloning yields another handle to the
/// same loop.
#[derive(Clone)]
pub struct RunLoop {
	state: Arc<Mutex<State>>,
	config: RunLoopConfig,
}

impl Default for RunLoop {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for RunLoop {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("RunLoop")
			.field("depth", &state.depth)
			.field("flushing", &state.flushing)
			.field("pending", &state.pending())
			.field("config", &self.config)
			.finish()
	}
}

impl RunLoop {
	/// Creates a run loop with default limits.
	pub fn new() -> Self {
		Self::with_config(RunLoopConfig::default())
	}

	/// Creates a run loop with explicit limits.
	pub fn with_config(config: RunLoopConfig) -> Self {
		Self {
			state: Arc::new(Mutex::new(State::default())),
			config,
		}
	}

	/// Returns the active limits.
	pub fn config(&self) -> RunLoopConfig {
		self.config
	}

	/// Returns true while a batch is open or a flush is running.
	pub fn is_in_batch(&self) -> bool {
		self.state.lock().depth > 0
	}

	/// Returns true if any task is waiting for a flush.
	pub fn has_pending(&self) -> bool {
		self.state.lock().pending() > 0
	}

	/// Returns true if both handles drive the same loop.
	pub fn ptr_eq(&self, other: &RunLoop) -> bool {
		Arc::ptr_eq(&self.state, &other.state)
	}

	/// Opens a batch, runs `f`, and closes it.
	///
	/// Closing the outermost batch flushes every queue.
	pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R, RunLoopError> {
		self.run_reported(f).map(|(result, _)| result)
	}

	/// Like [`RunLoop::run`], also returning what the closing flush did.
	///
	/// The report is empty when this batch was nested in another.
	pub fn run_reported<R>(&self, f: impl FnOnce() -> R) -> Result<(R, FlushReport), RunLoopError> {
		let batch = BatchGuard::open(self);
		let result = f();
		let report = if batch.close() { self.flush()? } else { FlushReport::default() };
		Ok((result, report))
	}

	/// Runs `f` inside the current batch, opening one if none is active.
	pub fn join<R>(&self, f: impl FnOnce() -> R) -> Result<R, RunLoopError> {
		if self.is_in_batch() { Ok(f()) } else { self.run(f) }
	}

	/// Appends `task` to `queue`.
	pub fn schedule<F>(&self, queue: Queue, task: F)
	where
		F: FnOnce() + Send + 'static,
	{
		tracing::trace!(queue = queue.as_str(), "runloop.schedule");
		self.state.lock().queues[queue.index()].push_back(Scheduled {
			key: None,
			task: Box::new(task),
		});
	}

	/// Appends `task` to `queue` unless a task with the same key is already pending there.
	///
	/// Returns true if the task was queued.
	pub fn schedule_once<F>(&self, queue: Queue, key: TaskKey, task: F) -> bool
	where
		F: FnOnce() + Send + 'static,
	{
		let mut state = self.state.lock();
		if !state.pending_keys.insert((queue, key)) {
			state.coalesced += 1;
			tracing::trace!(queue = queue.as_str(), namespace = key.namespace(), id = key.id(), "runloop.coalesce");
			return false;
		}
		tracing::trace!(queue = queue.as_str(), namespace = key.namespace(), id = key.id(), "runloop.schedule_once");
		state.queues[queue.index()].push_back(Scheduled {
			key: Some(key),
			task: Box::new(task),
		});
		true
	}

	/// Drains all queues in order.
	///
	/// After every task the drain restarts from the earliest non-empty queue,
	/// so invalidation scheduled by later work is applied before anything
	/// downstream of it. Inside an open batch this is a no-op; the outermost
	/// close flushes instead.
	pub fn flush(&self) -> Result<FlushReport, RunLoopError> {
		{
			let mut state = self.state.lock();
			if state.depth > 0 || state.flushing {
				return Ok(FlushReport::default());
			}
			state.flushing = true;
			state.depth += 1;
		}
		let _flush = FlushGuard { run_loop: self };

		let limit = self.config.max_flush_tasks;
		let mut executed = 0usize;
		loop {
			let next = self.state.lock().pop_next();
			let Some(scheduled) = next else {
				break;
			};
			if executed >= limit {
				let dropped = self.state.lock().clear() + 1;
				tracing::warn!(limit, dropped, "runloop.overflow");
				return Err(RunLoopError::Overflow { limit, dropped });
			}
			executed += 1;
			(scheduled.task)();
		}

		let coalesced = std::mem::take(&mut self.state.lock().coalesced);
		if executed > 0 {
			tracing::debug!(executed, coalesced, "runloop.flush");
		}
		Ok(FlushReport { executed, coalesced })
	}
}

/// Closes a batch on unwind.
struct BatchGuard<'a> {
	run_loop: &'a RunLoop,
}

impl<'a> BatchGuard<'a> {
	fn open(run_loop: &'a RunLoop) -> Self {
		run_loop.state.lock().depth += 1;
		Self { run_loop }
	}

	/// Closes the batch; returns true if it was the outermost one.
	fn close(self) -> bool {
		let outermost = {
			let mut state = self.run_loop.state.lock();
			state.depth = state.depth.saturating_sub(1);
			state.depth == 0
		};
		std::mem::forget(self);
		outermost
	}
}

impl Drop for BatchGuard<'_> {
	fn drop(&mut self) {
		let mut state = self.run_loop.state.lock();
		state.depth = state.depth.saturating_sub(1);
	}
}

struct FlushGuard<'a> {
	run_loop: &'a RunLoop,
}

impl Drop for FlushGuard<'_> {
	fn drop(&mut self) {
		let mut state = self.run_loop.state.lock();
		state.flushing = false;
		state.depth = state.depth.saturating_sub(1);
	}
}

//! Abstraction over the host framework's change-detection scheduler.
//!
//! Native API callbacks fire outside of the host framework's scheduling
//! context. Everything the runtime republishes to the host (ready
//! notifications, event envelopes, failures) goes through a [`Scheduler`], so
//! that a host can marshal the callback back into its own change-detection
//! cycle. Hosts that have no such cycle can use the [`InlineScheduler`].

use maybe_sync::{MaybeSend, MaybeSync};
use parking_lot::Mutex;

/// How a task should be marshalled into the host scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// The task may be batched with other coalesced tasks and run on the next
    /// scheduling tick. Relative order of coalesced tasks is preserved.
    Coalesced,
    /// The task must run as soon as the scheduler can execute it, ahead of
    /// any pending coalesced batch.
    Immediate,
}

/// A unit of work handed to a [`Scheduler`].
pub trait SchedulerTask: MaybeSend {
    /// Executes the task, consuming it.
    fn run(self: Box<Self>);
}

impl<F> SchedulerTask for F
where
    F: FnOnce() + MaybeSend,
{
    fn run(self: Box<Self>) {
        self()
    }
}

/// Re-entry point into the host framework's scheduling context.
pub trait Scheduler: MaybeSend + MaybeSync {
    /// Runs the given task in the host scheduling context.
    fn run(&self, mode: DispatchMode, task: Box<dyn SchedulerTask>);
}

/// Scheduler that executes every task immediately on the calling thread,
/// regardless of the requested mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn run(&self, _mode: DispatchMode, task: Box<dyn SchedulerTask>) {
        task.run();
    }
}

/// Scheduler that queues coalesced tasks until the host drains them.
///
/// [`DispatchMode::Immediate`] tasks still run inline. Coalesced tasks are
/// stored in arrival order and executed by [`QueueScheduler::flush`], which a
/// host would typically call once per change-detection tick.
#[derive(Default)]
pub struct QueueScheduler {
    queue: Mutex<Vec<Box<dyn SchedulerTask>>>,
}

impl QueueScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs all queued tasks in arrival order.
    pub fn flush(&self) {
        // Tasks are drained before running so that a task scheduling another
        // task does not deadlock on the queue lock.
        let batch: Vec<_> = std::mem::take(&mut *self.queue.lock());
        for task in batch {
            task.run();
        }
    }
}

impl Scheduler for QueueScheduler {
    fn run(&self, mode: DispatchMode, task: Box<dyn SchedulerTask>) {
        match mode {
            DispatchMode::Coalesced => self.queue.lock().push(task),
            DispatchMode::Immediate => task.run(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn inline_scheduler_runs_tasks_in_place() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        InlineScheduler.run(
            DispatchMode::Coalesced,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queue_scheduler_preserves_coalesced_order() {
        let scheduler = QueueScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            scheduler.run(
                DispatchMode::Coalesced,
                Box::new(move || order.lock().push(i)),
            );
        }
        assert_eq!(scheduler.pending(), 3);
        assert!(order.lock().is_empty());

        scheduler.flush();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn immediate_tasks_skip_the_queue() {
        let scheduler = QueueScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        scheduler.run(
            DispatchMode::Immediate,
            Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }
}

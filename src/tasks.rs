//! Serial task queue.
//!
//! Every stage expresses its work as a queue of [`Task`]s run one at a time
//! against a shared mutable context (the cache, the tree under construction,
//! progress counters). Execution is strictly serial: a task starts only after
//! the previous one has returned.
//!
//! ## Subtasks
//!
//! A task built with [`Task::spawning`] may enqueue further tasks while it
//! runs. Those subtasks are inserted at the **front** of the queue, in the
//! order they were enqueued, so they finish before any of the spawning task's
//! remaining siblings. Directory discovery uses this to walk a tree
//! depth-first without recursion:
//!
//! ```text
//! queue: [list /]                 → runs, spawns [list /a, list /b]
//! queue: [list /a, list /b]       → runs, spawns [copy /a/x]
//! queue: [copy /a/x, list /b]
//! ```
//!
//! ## Failure
//!
//! The first task to return `Err` stops the run; the remaining queue is
//! dropped unexecuted and the error is returned. Work already done is not
//! rolled back. Stages that want per-item isolation catch errors inside the
//! task and return `Ok`.

use std::collections::VecDeque;

type TaskFn<'a, C, T, E> = Box<dyn FnOnce(&mut C, &mut Subtasks<'a, C, T, E>) -> Result<T, E> + 'a>;

/// A deferred unit of work.
pub struct Task<'a, C, T, E> {
    run: TaskFn<'a, C, T, E>,
}

impl<'a, C, T, E> Task<'a, C, T, E> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut C) -> Result<T, E> + 'a,
    {
        Self {
            run: Box::new(move |ctx, _| f(ctx)),
        }
    }

    /// A task that may enqueue subtasks while running.
    pub fn spawning<F>(f: F) -> Self
    where
        F: FnOnce(&mut C, &mut Subtasks<'a, C, T, E>) -> Result<T, E> + 'a,
    {
        Self { run: Box::new(f) }
    }
}

/// Subtasks enqueued by a running task.
pub struct Subtasks<'a, C, T, E> {
    pending: Vec<Task<'a, C, T, E>>,
}

impl<'a, C, T, E> Subtasks<'a, C, T, E> {
    pub fn push(&mut self, task: Task<'a, C, T, E>) {
        self.pending.push(task);
    }
}

/// FIFO queue of tasks, consumed by [`TaskQueue::run_serially`].
pub struct TaskQueue<'a, C, T, E> {
    tasks: VecDeque<Task<'a, C, T, E>>,
}

impl<C, T, E> Default for TaskQueue<'_, C, T, E> {
    fn default() -> Self {
        Self {
            tasks: VecDeque::new(),
        }
    }
}

impl<'a, C, T, E> TaskQueue<'a, C, T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task<'a, C, T, E>) {
        self.tasks.push_back(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task in order, returning their results in execution order.
    ///
    /// Stops at the first error and returns it; later tasks never run.
    pub fn run_serially(mut self, ctx: &mut C) -> Result<Vec<T>, E> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(task) = self.tasks.pop_front() {
            let mut spawned = Subtasks {
                pending: Vec::new(),
            };
            results.push((task.run)(ctx, &mut spawned)?);
            for sub in spawned.pending.into_iter().rev() {
                self.tasks.push_front(sub);
            }
        }
        Ok(results)
    }
}

impl<'a, C, T, E> Extend<Task<'a, C, T, E>> for TaskQueue<'a, C, T, E> {
    fn extend<I: IntoIterator<Item = Task<'a, C, T, E>>>(&mut self, iter: I) {
        self.tasks.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Vec<&'static str>;

    fn logging(name: &'static str) -> Task<'static, Log, &'static str, String> {
        Task::new(move |log: &mut Log| {
            log.push(name);
            Ok(name)
        })
    }

    #[test]
    fn runs_in_enqueue_order() {
        let mut q = TaskQueue::new();
        q.push(logging("a"));
        q.push(logging("b"));
        q.push(logging("c"));

        let mut log = Log::new();
        let results = q.run_serially(&mut log).unwrap();
        assert_eq!(results, vec!["a", "b", "c"]);
        assert_eq!(log, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_queue_yields_no_results() {
        let q: TaskQueue<Log, (), String> = TaskQueue::new();
        assert!(q.is_empty());
        let mut log = Log::new();
        assert!(q.run_serially(&mut log).unwrap().is_empty());
    }

    #[test]
    fn first_error_stops_the_run() {
        let mut q = TaskQueue::new();
        q.push(logging("a"));
        q.push(Task::new(|_: &mut Log| Err("boom".to_string())));
        q.push(logging("never"));

        let mut log = Log::new();
        let err = q.run_serially(&mut log).unwrap_err();
        assert_eq!(err, "boom");
        assert_eq!(log, vec!["a"]);
    }

    #[test]
    fn subtasks_run_before_remaining_siblings() {
        let mut q = TaskQueue::new();
        q.push(Task::spawning(|log: &mut Log, subs| {
            log.push("parent");
            subs.push(logging("child-1"));
            subs.push(logging("child-2"));
            Ok("parent")
        }));
        q.push(logging("sibling"));

        let mut log = Log::new();
        q.run_serially(&mut log).unwrap();
        assert_eq!(log, vec!["parent", "child-1", "child-2", "sibling"]);
    }

    #[test]
    fn nested_subtasks_are_depth_first() {
        fn dir(name: &'static str, depth: u32) -> Task<'static, Log, (), String> {
            Task::spawning(move |log: &mut Log, subs| {
                log.push(name);
                if depth > 0 {
                    subs.push(dir("left", depth - 1));
                    subs.push(dir("right", depth - 1));
                }
                Ok(())
            })
        }

        let mut q = TaskQueue::new();
        q.push(dir("root", 2));
        let mut log = Log::new();
        q.run_serially(&mut log).unwrap();
        assert_eq!(
            log,
            vec!["root", "left", "left", "right", "right", "left", "right"]
        );
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        fn chain(n: u32) -> Task<'static, u32, (), String> {
            Task::spawning(move |count: &mut u32, subs| {
                *count += 1;
                if n > 0 {
                    subs.push(chain(n - 1));
                }
                Ok(())
            })
        }

        let mut q = TaskQueue::new();
        q.push(chain(100_000));
        let mut count = 0;
        q.run_serially(&mut count).unwrap();
        assert_eq!(count, 100_001);
    }

    #[test]
    fn extend_appends() {
        let mut q = TaskQueue::new();
        q.extend(vec![logging("a"), logging("b")]);
        assert_eq!(q.len(), 2);
    }
}

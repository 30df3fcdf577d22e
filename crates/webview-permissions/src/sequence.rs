use std::collections::VecDeque;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::Condvar;
use parking_lot::Mutex;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the single logical UI sequence that owns all grant and queue
/// state. Tasks posted here run in FIFO order whenever the owner drains the
/// sequence with [`Sequence::run_until_idle`].
///
/// Blocking work (path classification) runs on the rayon pool and its reply
/// is posted back onto the sequence; the worker side never touches shared
/// state directly.
#[derive(Clone, Default)]
pub struct Sequence {
    inner: Arc<SequenceInner>,
}

#[derive(Default)]
struct SequenceInner {
    state: Mutex<SequenceState>,
    wakeup: Condvar,
}

#[derive(Default)]
struct SequenceState {
    tasks: VecDeque<Task>,
    blocking_in_flight: usize,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_task(&self, task: impl FnOnce() + Send + 'static) {
        let mut state = self.inner.state.lock();
        state.tasks.push_back(Box::new(task));
        self.inner.wakeup.notify_all();
    }

    /// Runs `work` off the sequence and posts `reply` back onto it. The reply
    /// gets `None` when `work` panicked.
    pub fn post_blocking_task_and_reply<R, W, F>(&self, work: W, reply: F)
    where
        R: Send + 'static,
        W: FnOnce() -> R + Send + 'static,
        F: FnOnce(Option<R>) + Send + 'static,
    {
        self.inner.state.lock().blocking_in_flight += 1;
        let inner = self.inner.clone();
        rayon::spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(work)).ok();
            if result.is_none() {
                log::error!("Blocking task panicked");
            }
            let mut state = inner.state.lock();
            state.tasks.push_back(Box::new(move || reply(result)));
            state.blocking_in_flight -= 1;
            inner.wakeup.notify_all();
        });
    }

    /// Number of tasks waiting to run, not counting blocking work in flight.
    pub fn pending_tasks(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    /// Runs posted tasks, including ones posted while running, until the
    /// queue is empty and no blocking work is outstanding. Returns the number
    /// of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = {
                let mut state = self.inner.state.lock();
                loop {
                    if let Some(task) = state.tasks.pop_front() {
                        break Some(task);
                    }
                    if state.blocking_in_flight == 0 {
                        break None;
                    }
                    self.inner.wakeup.wait(&mut state);
                }
            };
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[test]
    fn tasks_run_in_post_order() {
        let sequence = Sequence::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            sequence.post_task(move || log.lock().push(i));
        }
        assert_eq!(sequence.pending_tasks(), 3);
        assert!(log.lock().is_empty());
        assert_eq!(sequence.run_until_idle(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn tasks_posted_while_running_are_drained() {
        let sequence = Sequence::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let (seq, c) = (sequence.clone(), counter.clone());
        sequence.post_task(move || {
            c.fetch_add(1, Ordering::SeqCst);
            let c = c.clone();
            seq.post_task(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert_eq!(sequence.run_until_idle(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn blocking_reply_lands_on_the_sequence() {
        let sequence = Sequence::new();
        let result = Arc::new(Mutex::new(None));
        let r = result.clone();
        sequence.post_blocking_task_and_reply(|| 6 * 7, move |v| *r.lock() = Some(v));
        assert_eq!(sequence.run_until_idle(), 1);
        assert_eq!(*result.lock(), Some(Some(42)));
    }

    #[test]
    fn panicking_blocking_work_still_replies() {
        let sequence = Sequence::new();
        let result = Arc::new(Mutex::new(None));
        let r = result.clone();
        sequence.post_blocking_task_and_reply(
            || -> u32 { panic!("path lookup failed") },
            move |v| *r.lock() = Some(v),
        );
        assert_eq!(sequence.run_until_idle(), 1);
        assert_eq!(*result.lock(), Some(None));
    }
}

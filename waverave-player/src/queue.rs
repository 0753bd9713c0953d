use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::SampleBuffer;

/// Default queue depth, in buffers.
pub const DEFAULT_MAX_BUFFERS: usize = 32;

/// A bounded, blocking FIFO of [`SampleBuffer`]s between the file reader and
/// the dispatcher.
///
/// [`push`][SampleQueue::push] waits while the queue is full, and
/// [`pop`][SampleQueue::pop] waits while it is empty. Both give up as soon as
/// the queue is cancelled. The producer marks the queue finished when it will
/// push nothing more, after which `pop` drains what's left and then returns
/// `None`.
///
/// The `finished` and `cancelled` flags only ever go from false to true.
pub struct SampleQueue {
    state: Mutex<QueueState>,
    not_full: Condvar,
    not_empty: Condvar,
    cancel_signal: Condvar,
    max_buffers: usize,
}

struct QueueState {
    buffers: VecDeque<SampleBuffer>,
    finished: bool,
    cancelled: bool,
}

impl SampleQueue {
    /// Create a queue holding at most `max_buffers` buffers.
    ///
    /// # Panics
    /// - If `max_buffers` is 0.
    pub fn new(max_buffers: usize) -> Self {
        assert!(max_buffers > 0);
        Self {
            state: Mutex::new(QueueState {
                buffers: VecDeque::with_capacity(max_buffers),
                finished: false,
                cancelled: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            cancel_signal: Condvar::new(),
            max_buffers,
        }
    }

    /// Append a buffer, waiting for space if the queue is full.
    ///
    /// Returns false, dropping the buffer, if the queue was cancelled before
    /// it could be enqueued.
    pub fn push(&self, buf: SampleBuffer) -> bool {
        let mut state = self.state.lock();
        while state.buffers.len() >= self.max_buffers && !state.cancelled {
            self.not_full.wait(&mut state);
        }
        if state.cancelled {
            return false;
        }
        state.buffers.push_back(buf);
        drop(state);
        self.not_empty.notify_one();
        true
    }

    /// Take the oldest buffer, waiting for one if the queue is empty.
    ///
    /// Returns `None` once the queue is cancelled, or once it is both
    /// finished and empty.
    pub fn pop(&self) -> Option<SampleBuffer> {
        self.pop_watched().0
    }

    /// Same as [`pop`][Self::pop], but also reports whether the caller had to
    /// wait on an empty queue for the producer.
    pub(crate) fn pop_watched(&self) -> (Option<SampleBuffer>, bool) {
        let mut state = self.state.lock();
        let mut starved = false;
        while state.buffers.is_empty() && !state.finished && !state.cancelled {
            starved = true;
            self.not_empty.wait(&mut state);
        }
        if state.cancelled {
            return (None, false);
        }
        let Some(buf) = state.buffers.pop_front() else {
            return (None, false);
        };
        drop(state);
        self.not_full.notify_one();
        (Some(buf), starved)
    }

    /// Mark that no more buffers will be pushed, waking every waiter.
    pub fn mark_finished(&self) {
        self.state.lock().finished = true;
        self.wake_all();
    }

    /// Cancel the queue, waking every waiter. Safe to call any number of
    /// times, from any thread.
    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.wake_all();
    }

    /// Wait up to `timeout` for the queue to be cancelled. Returns true if it
    /// was.
    pub fn wait_cancelled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.cancelled {
            if self.cancel_signal.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.cancelled
    }

    /// Current number of queued buffers.
    pub fn len(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Returns true if no buffers are queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().buffers.is_empty()
    }

    /// The most buffers this queue will hold.
    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }

    /// Returns true once the producer has marked the queue finished.
    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    /// Returns true once the queue has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    fn wake_all(&self) {
        self.not_full.notify_all();
        self.not_empty.notify_all();
        self.cancel_signal.notify_all();
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFERS)
    }
}

impl std::fmt::Debug for SampleQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SampleQueue")
            .field("len", &state.buffers.len())
            .field("max_buffers", &self.max_buffers)
            .field("finished", &state.finished)
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };
    use std::thread;

    use super::*;
    use crate::Sample;

    fn tagged(tag: usize) -> SampleBuffer {
        SampleBuffer::from(vec![Sample::new(tag as f32, 0.0)])
    }

    fn tag_of(buf: &SampleBuffer) -> usize {
        buf.samples()[0].re as usize
    }

    #[test]
    fn fifo_order() {
        let q = SampleQueue::new(4);
        for i in 0..4 {
            assert!(q.push(tagged(i)));
        }
        assert_eq!(q.len(), 4);
        for i in 0..4 {
            assert_eq!(tag_of(&q.pop().unwrap()), i);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn push_blocks_when_full() {
        let q = Arc::new(SampleQueue::new(2));
        q.push(tagged(0));
        q.push(tagged(1));

        let pushed = Arc::new(AtomicBool::new(false));
        let producer = {
            let q = q.clone();
            let pushed = pushed.clone();
            thread::spawn(move || {
                let ok = q.push(tagged(2));
                pushed.store(true, Ordering::Release);
                ok
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!pushed.load(Ordering::Acquire));
        assert_eq!(q.len(), 2);

        assert_eq!(tag_of(&q.pop().unwrap()), 0);
        assert!(producer.join().unwrap());
        assert!(pushed.load(Ordering::Acquire));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn finished_drains_then_ends() {
        let q = SampleQueue::new(4);
        q.push(tagged(7));
        q.mark_finished();
        assert!(q.is_finished());
        assert_eq!(tag_of(&q.pop().unwrap()), 7);
        assert!(q.pop().is_none());
        assert!(q.pop().is_none());
    }

    #[test]
    fn cancel_wakes_blocked_pop() {
        let q = Arc::new(SampleQueue::new(4));
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.pop())
        };
        thread::sleep(Duration::from_millis(20));
        q.cancel();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn cancel_wakes_blocked_push() {
        let q = Arc::new(SampleQueue::new(1));
        q.push(tagged(0));
        let producer = {
            let q = q.clone();
            thread::spawn(move || q.push(tagged(1)))
        };
        thread::sleep(Duration::from_millis(20));
        q.cancel();
        assert!(!producer.join().unwrap());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn cancelled_queue_refuses_everything() {
        let q = SampleQueue::new(4);
        q.push(tagged(0));
        q.cancel();
        q.cancel();
        assert!(q.is_cancelled());
        assert!(!q.push(tagged(1)));
        assert!(q.pop().is_none());
    }

    #[test]
    fn wait_cancelled_times_out() {
        let q = SampleQueue::new(4);
        let start = Instant::now();
        assert!(!q.wait_cancelled(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        q.cancel();
        assert!(q.wait_cancelled(Duration::from_secs(10)));
    }

    #[test]
    fn interleaved_threads_keep_order() {
        const COUNT: usize = 2000;
        let q = Arc::new(SampleQueue::new(3));
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..COUNT {
                    if i % 7 == 0 {
                        thread::yield_now();
                    }
                    if i % 97 == 0 {
                        thread::sleep(Duration::from_micros(200));
                    }
                    assert!(q.push(tagged(i)));
                    assert!(q.len() <= 3);
                }
                q.mark_finished();
            })
        };

        let mut next = 0;
        while let Some(buf) = q.pop() {
            assert_eq!(tag_of(&buf), next);
            assert!(q.len() <= 3);
            next += 1;
            if next % 5 == 0 {
                thread::yield_now();
            }
            if next % 131 == 0 {
                thread::sleep(Duration::from_micros(300));
            }
        }
        producer.join().unwrap();
        assert_eq!(next, COUNT);
    }
}

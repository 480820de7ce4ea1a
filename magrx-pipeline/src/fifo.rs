//! Bounded ring of magnitude buffers between the producer (SDR driver)
//! and the consumer (demodulator) threads.

use std::{
    collections::VecDeque,
    time::{
        Duration,
        Instant,
    },
};

use parking_lot::{
    Condvar,
    Mutex,
};

use crate::{
    BufferFlags,
    MagBuf,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FifoError {
    /// every buffer is enqueued or held by the consumer
    #[error("fifo is full")]
    Full,
    /// nothing was enqueued within the timeout
    #[error("fifo is empty")]
    Empty,
    /// [`SampleFifo::halt`] was called
    #[error("fifo is shut down")]
    Shutdown,
}

#[derive(Debug)]
struct FifoState {
    free: Vec<MagBuf>,
    queue: VecDeque<MagBuf>,
    /// tail of the most recently enqueued buffer, the overlap source for
    /// the next acquired buffer
    tail: Box<[u16]>,
    tail_valid: bool,
    halted: bool,
}

/// A bounded FIFO of reusable magnitude buffers.
///
/// Buffers cycle acquire → enqueue → dequeue → release. `acquire` fills
/// the overlap region from the previous buffer's tail (or zeroes it after
/// a discontinuity), so the producer only ever writes new samples behind
/// the overlap.
///
/// Consumers observe buffers in strict enqueue order.
#[derive(Debug)]
pub struct SampleFifo {
    state: Mutex<FifoState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    buffer_samples: usize,
    overlap: usize,
}

impl SampleFifo {
    /// `buffer_samples` is the number of new samples each buffer can hold
    /// in addition to its overlap region.
    pub fn new(capacity: usize, buffer_samples: usize, overlap: usize) -> Self {
        assert!(capacity > 0);

        let free = (0..capacity)
            .map(|_| MagBuf::new(overlap + buffer_samples, overlap))
            .collect();

        Self {
            state: Mutex::new(FifoState {
                free,
                queue: VecDeque::with_capacity(capacity),
                tail: vec![0u16; overlap].into_boxed_slice(),
                tail_valid: false,
                halted: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            buffer_samples,
            overlap,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// New samples each buffer can hold in addition to its overlap.
    pub fn buffer_samples(&self) -> usize {
        self.buffer_samples
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Number of buffers currently available to `acquire`.
    pub fn free_buffers(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Get a writable buffer, blocking up to `timeout` for one to free up.
    ///
    /// `dropped` is the number of samples lost immediately before this
    /// buffer; `overrun` marks a driver-reported gap. Either one zeroes
    /// the overlap region and marks the buffer `DISCONTINUOUS`; otherwise
    /// the previous buffer's tail is copied in.
    pub fn acquire(
        &self,
        timeout: Duration,
        dropped: u64,
        overrun: bool,
    ) -> Result<MagBuf, FifoError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if state.halted {
                return Err(FifoError::Shutdown);
            }

            if let Some(mut buf) = state.free.pop() {
                let discontinuous = dropped > 0 || overrun || !state.tail_valid;
                if discontinuous {
                    buf.data[..self.overlap].fill(0);
                }
                else {
                    buf.data[..self.overlap].copy_from_slice(&state.tail);
                }

                buf.valid_length = self.overlap;
                buf.dropped = dropped;
                buf.flags = if dropped > 0 || overrun {
                    BufferFlags::DISCONTINUOUS
                }
                else {
                    BufferFlags::empty()
                };
                buf.sample_timestamp = 0;
                buf.sys_timestamp = 0;
                buf.mean_level = 0.0;
                buf.mean_power = 0.0;

                return Ok(buf);
            }

            if timeout.is_zero() || self.not_full.wait_until(&mut state, deadline).timed_out() {
                return Err(FifoError::Full);
            }
        }
    }

    /// Publish a filled buffer to the consumer. The buffer is immutable
    /// until it comes back through `release`.
    pub fn enqueue(&self, buf: MagBuf) {
        let mut state = self.state.lock();

        debug_assert!(buf.valid_length >= self.overlap);
        debug_assert!(buf.valid_length <= buf.total_length());

        let valid = buf.valid_length;
        state
            .tail
            .copy_from_slice(&buf.data[valid - self.overlap..valid]);
        state.tail_valid = true;

        state.queue.push_back(buf);
        drop(state);
        self.not_empty.notify_one();
    }

    /// Take the oldest enqueued buffer, blocking up to `timeout`.
    ///
    /// Enqueued buffers still drain after `halt`; `Shutdown` is returned
    /// once the queue is empty.
    pub fn dequeue(&self, timeout: Duration) -> Result<MagBuf, FifoError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if let Some(buf) = state.queue.pop_front() {
                return Ok(buf);
            }

            if state.halted {
                return Err(FifoError::Shutdown);
            }

            if timeout.is_zero() || self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return Err(FifoError::Empty);
            }
        }
    }

    /// Return a dequeued buffer to the free pool.
    pub fn release(&self, buf: MagBuf) {
        let mut state = self.state.lock();
        state.free.push(buf);
        drop(state);
        self.not_full.notify_one();
    }

    /// Wake all waiters with `Shutdown`.
    pub fn halt(&self) {
        tracing::debug!("halting sample fifo");
        let mut state = self.state.lock();
        state.halted = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

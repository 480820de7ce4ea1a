//! Shared producer-side glue between a driver and the FIFO.
//!
//! Every driver feeds its raw blocks through one of these, so
//! timestamping, drop accounting and the FIFO-full policy exist exactly
//! once instead of drifting apart per driver.

use std::{
    sync::Arc,
    time::{
        Duration,
        SystemTime,
        UNIX_EPOCH,
    },
};

use magrx_pipeline::{
    Converter,
    FifoError,
    SampleFifo,
};

use crate::SdrError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// The FIFO was saturated; the block was discarded and accounted in
    /// the next enqueued buffer's `dropped` count.
    Dropped,
}

/// Converts raw blocks and enqueues them with correct metadata.
///
/// FIFO-full policy: once a block has to be dropped, further blocks keep
/// being dropped until at least half the ring is free again. The first
/// buffer enqueued after recovery carries the accumulated `dropped` count
/// and the `DISCONTINUOUS` flag.
pub struct SamplePump {
    fifo: Arc<SampleFifo>,
    converter: Converter,
    sample_rate: u32,
    sample_counter: u64,
    dropped_pending: u64,
    overrun_pending: bool,
    dropping: bool,
}

impl SamplePump {
    pub fn new(fifo: Arc<SampleFifo>, converter: Converter, sample_rate: u32) -> Self {
        Self {
            fifo,
            converter,
            sample_rate,
            sample_counter: 0,
            dropped_pending: 0,
            overrun_pending: false,
            dropping: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples pushed (including dropped ones) since stream start.
    pub fn sample_counter(&self) -> u64 {
        self.sample_counter
    }

    /// Record a driver-reported overrun; the next enqueued buffer is
    /// marked `DISCONTINUOUS`.
    pub fn note_overrun(&mut self) {
        self.overrun_pending = true;
    }

    /// Convert one raw block and enqueue it.
    ///
    /// Never blocks: when no buffer is free the block is dropped and
    /// accounted instead, so a stalled consumer can't stall the SDR.
    pub fn push(&mut self, raw: &[u8]) -> Result<PushOutcome, SdrError> {
        let samples = self.converter.samples_in(raw);
        if samples == 0 {
            return Ok(PushOutcome::Enqueued);
        }
        if samples > self.fifo.buffer_samples() {
            return Err(SdrError::BlockTooLarge {
                samples,
                capacity: self.fifo.buffer_samples(),
            });
        }

        // dropping hysteresis: wait for half the ring to clear
        if self.dropping && self.fifo.free_buffers() < self.fifo.capacity() / 2 {
            return Ok(self.account_dropped(samples));
        }

        let mut buf = match self.fifo.acquire(
            Duration::ZERO,
            self.dropped_pending,
            self.overrun_pending,
        ) {
            Ok(buf) => buf,
            Err(FifoError::Full) => return Ok(self.account_dropped(samples)),
            Err(err) => return Err(err.into()),
        };
        self.dropping = false;
        self.dropped_pending = 0;
        self.overrun_pending = false;

        buf.sample_timestamp = self.sample_counter;
        let block_ms = 1000 * samples as u64 / u64::from(self.sample_rate);
        buf.sys_timestamp = unix_millis().saturating_sub(block_ms);
        self.sample_counter += samples as u64;

        let overlap = buf.overlap;
        let aggregates = self
            .converter
            .convert(raw, &mut buf.data[overlap..overlap + samples]);
        buf.valid_length = overlap + samples;
        buf.mean_level = aggregates.level;
        buf.mean_power = aggregates.power;

        self.fifo.enqueue(buf);
        Ok(PushOutcome::Enqueued)
    }

    fn account_dropped(&mut self, samples: usize) -> PushOutcome {
        if !self.dropping {
            tracing::warn!("FIFO saturated, dropping samples");
        }
        self.dropping = true;
        self.dropped_pending += samples as u64;
        self.sample_counter += samples as u64;
        PushOutcome::Dropped
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

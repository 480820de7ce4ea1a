//! The magnitude pipeline: buffer model, bounded FIFO and raw-sample
//! conversion.
//!
//! An SDR driver produces raw IQ blocks; the [`Converter`] turns them into
//! 16-bit magnitudes inside buffers acquired from the [`SampleFifo`], and
//! the demodulator consumes them in enqueue order on its own thread.

mod converter;
mod fifo;

use bitflags::bitflags;

pub use crate::{
    converter::Converter,
    fifo::{
        FifoError,
        SampleFifo,
    },
};

/// Mode S preamble length in microseconds.
pub const MODE_S_PREAMBLE_US: u32 = 8;

/// Bits in the longest (DF17 etc.) Mode S message; 1 µs per bit.
pub const MODE_S_LONG_MSG_BITS: u32 = 112;

/// Default number of buffers in the FIFO ring.
pub const DEFAULT_FIFO_BUFFERS: usize = 12;

/// Samples copied from the tail of each buffer into the head of the next,
/// sized so a message starting near the end of a buffer can still be
/// demodulated in one piece.
pub fn overlap_samples(sample_rate: u32) -> usize {
    let overlap_us = u64::from(MODE_S_PREAMBLE_US + MODE_S_LONG_MSG_BITS + 16);
    (overlap_us * u64::from(sample_rate) / 1_000_000) as usize
}

/// Raw sample encodings accepted from SDR drivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SampleFormat {
    /// Interleaved unsigned 8-bit I/Q, 127.5 = zero.
    Uc8,
    /// Interleaved little-endian signed 16-bit I/Q, full scale ±32767.
    Sc16,
    /// Interleaved little-endian signed 16-bit I/Q, full scale ±2047.
    Sc16Q11,
    /// Little-endian signed 16-bit single channel.
    S16,
    /// Little-endian unsigned 16-bit single channel, excess-2048.
    U16O12,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::Uc8 => 2,
            SampleFormat::Sc16 | SampleFormat::Sc16Q11 => 4,
            SampleFormat::S16 | SampleFormat::U16O12 => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SampleFormat::Uc8 => "uc8",
            SampleFormat::Sc16 => "sc16",
            SampleFormat::Sc16Q11 => "sc16q11",
            SampleFormat::S16 => "s16",
            SampleFormat::U16O12 => "u16o12",
        }
    }
}

impl std::str::FromStr for SampleFormat {
    type Err = UnknownSampleFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uc8" => Ok(SampleFormat::Uc8),
            "sc16" => Ok(SampleFormat::Sc16),
            "sc16q11" => Ok(SampleFormat::Sc16Q11),
            "s16" => Ok(SampleFormat::S16),
            "u16o12" => Ok(SampleFormat::U16O12),
            _ => {
                Err(UnknownSampleFormat {
                    format: s.to_owned(),
                })
            }
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown sample format: {format}")]
pub struct UnknownSampleFormat {
    pub format: String,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        /// There is a gap in the sample stream immediately before this
        /// buffer; the demodulator must not correlate across it.
        const DISCONTINUOUS = 1 << 0;
    }
}

/// One magnitude buffer flowing through the FIFO.
///
/// Between `enqueue` and `release` the buffer belongs to the consumer and
/// is not touched by the producer.
#[derive(derive_more::Debug, PartialEq)]
pub struct MagBuf {
    /// magnitude samples; only `..valid_length` is meaningful
    #[debug(skip)]
    pub data: Box<[u16]>,

    /// leading samples copied from the previous buffer's tail
    pub overlap: usize,

    /// overlap plus freshly converted samples
    pub valid_length: usize,

    /// samples since stream start at the first *new* sample of this buffer.
    /// Exact and never resynchronized; see [`Self::timestamp_12mhz`] for
    /// the wire-clock form.
    pub sample_timestamp: u64,

    /// wall clock (ms since the unix epoch) at the first new sample
    pub sys_timestamp: u64,

    /// samples lost immediately before this buffer
    pub dropped: u64,

    pub flags: BufferFlags,

    /// mean magnitude of the new samples, 1.0 = full scale
    pub mean_level: f64,

    /// mean squared magnitude of the new samples, 1.0 = full scale
    pub mean_power: f64,
}

impl MagBuf {
    fn new(total_length: usize, overlap: usize) -> Self {
        Self {
            data: vec![0u16; total_length].into_boxed_slice(),
            overlap,
            valid_length: overlap,
            sample_timestamp: 0,
            sys_timestamp: 0,
            dropped: 0,
            flags: BufferFlags::empty(),
            mean_level: 0.0,
            mean_power: 0.0,
        }
    }

    pub fn total_length(&self) -> usize {
        self.data.len()
    }

    /// All valid samples including the overlap region.
    pub fn samples(&self) -> &[u16] {
        &self.data[..self.valid_length]
    }

    /// Only the samples that are new in this buffer.
    pub fn new_samples(&self) -> &[u16] {
        &self.data[self.overlap..self.valid_length]
    }

    /// The sample timestamp on the 12 MHz Mode S wire clock.
    pub fn timestamp_12mhz(&self, sample_rate: u32) -> u64 {
        self.sample_timestamp * 12_000_000 / u64::from(sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_covers_a_long_message() {
        // 2.4 MHz: 136 µs of samples
        assert_eq!(overlap_samples(2_400_000), 326);
        assert_eq!(overlap_samples(2_000_000), 272);
    }

    #[test]
    fn format_names_round_trip() {
        for format in [
            SampleFormat::Uc8,
            SampleFormat::Sc16,
            SampleFormat::Sc16Q11,
            SampleFormat::S16,
            SampleFormat::U16O12,
        ] {
            assert_eq!(format.name().parse::<SampleFormat>().unwrap(), format);
        }
        assert!("iq32".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn wire_clock_conversion() {
        let mut buf = MagBuf::new(64, 0);
        buf.sample_timestamp = 2_400_000;
        assert_eq!(buf.timestamp_12mhz(2_400_000), 12_000_000);
    }
}

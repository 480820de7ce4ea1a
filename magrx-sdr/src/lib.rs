//! The narrow SDR driver contract and the drivers that implement it.
//!
//! Drivers stream raw IQ blocks into a [`SamplePump`], which owns the
//! converter and FIFO plumbing (timestamps, drop accounting, overlap).
//! Gain control is a separate, thread-safe handle so the adaptive
//! controller can adjust gain from the consumer thread while the driver
//! streams.

pub mod ifile;
mod pump;

use std::sync::{
    Arc,
    atomic::AtomicBool,
};

use magrx_pipeline::{
    FifoError,
    SampleFormat,
};

pub use crate::{
    ifile::{
        FileSdr,
        FileSdrConfig,
    },
    pump::{
        PushOutcome,
        SamplePump,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum SdrError {
    #[error("unknown SDR driver: {name}")]
    UnknownDriver { name: String },
    #[error("driver configuration error: {message}")]
    Config { message: String },
    #[error("SDR i/o failed")]
    Io(#[from] std::io::Error),
    #[error("raw block of {samples} samples exceeds the buffer size ({capacity})")]
    BlockTooLarge { samples: usize, capacity: usize },
    #[error(transparent)]
    Fifo(#[from] FifoError),
}

/// Discrete gain ladder of an SDR, adjustable while streaming.
///
/// Steps are a contiguous `0..=max_step()` range; dB values increase with
/// the step index. All methods must be callable from any thread; drivers
/// serialize hardware access internally. Implementations that round a
/// requested step to a coarser hardware step must still report the
/// requested step as current until a new request is made, so a controller
/// stepping one-by-one can't live-lock on unrepresentable steps.
pub trait GainControl: Send + Sync {
    /// Highest valid gain step.
    fn max_step(&self) -> i32;

    fn current_step(&self) -> i32;

    /// Request a gain step, clamped to the ladder; returns the step now in
    /// effect.
    fn set_step(&self, step: i32) -> Result<i32, SdrError>;

    /// Gain in dB at `step`; out-of-range steps clamp to the ladder ends.
    fn step_db(&self, step: i32) -> f32;
}

/// The driver contract: configure, open, stream, close.
///
/// `run` blocks on SDR i/o until the stream ends, an error occurs, or
/// `shutdown` is observed between blocks.
pub trait SdrDriver: Send {
    fn sample_format(&self) -> SampleFormat;

    fn open(&mut self) -> Result<(), SdrError>;

    fn run(&mut self, pump: &mut SamplePump, shutdown: &AtomicBool) -> Result<(), SdrError>;

    fn close(&mut self);

    /// `None` when the hardware has no controllable gain; the adaptive
    /// controller disables itself in that case.
    fn gain_control(&self) -> Option<Arc<dyn GainControl>> {
        None
    }
}

/// Per-driver configuration, selected by driver name at startup.
#[derive(Clone, Debug, Default)]
pub struct SdrConfig {
    pub ifile: Option<FileSdrConfig>,
}

/// Look up a driver by name and construct it from its config section.
pub fn open_by_name(name: &str, config: &SdrConfig) -> Result<Box<dyn SdrDriver>, SdrError> {
    match name {
        "ifile" => {
            let ifile = config.ifile.clone().ok_or_else(|| {
                SdrError::Config {
                    message: "ifile driver selected without a capture file".to_owned(),
                }
            })?;
            Ok(Box::new(FileSdr::new(ifile)))
        }
        _ => {
            Err(SdrError::UnknownDriver {
                name: name.to_owned(),
            })
        }
    }
}

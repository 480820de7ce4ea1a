//! Adaptive gain control.
//!
//! Two cooperating loops watch the magnitude stream on a ~1 s block
//! cadence and steer the SDR's gain ladder through the driver's
//! [`GainControl`](magrx_sdr::GainControl) handle:
//!
//! - the *dynamic range* loop estimates the noise floor from a magnitude
//!   percentile and scans for the highest gain that still leaves the
//!   configured dynamic range above the noise, and
//! - the *burst* loop watches for runs of loud-but-undecoded message-length
//!   bursts (a clipping receiver) and temporarily backs the gain off until
//!   reception is quiet again.
//!
//! All state lives on the consumer thread; the demodulator feeds samples
//! in via [`AdaptiveController::update`] after each buffer.

mod controller;

pub use crate::controller::{
    AdaptiveController,
    AdaptiveStats,
    RangeState,
};

/// Samples above this magnitude (-3 dBFS) are "loud" for burst detection.
pub const LOUD_SAMPLE_THRESHOLD: u16 = 46395;

/// Burst windows per second; also the divisor that sizes the window.
pub const BURST_WINDOWS_PER_SECOND: u32 = 25_000;

#[derive(Debug, thiserror::Error)]
pub enum AdaptiveError {
    /// blocks are `sample_rate / 25000 * 25000` samples; rates that are
    /// not a 25 kHz multiple would drift off the 1 s cadence
    #[error("sample rate {sample_rate} Hz is not a multiple of 25 kHz")]
    UnsupportedSampleRate { sample_rate: u32 },
    #[error("noise percentile {percentile} is outside 1..=99")]
    InvalidPercentile { percentile: u32 },
    #[error("smoothing factor {alpha} is outside 0..=1")]
    InvalidAlpha { alpha: f64 },
}

/// A successfully decoded message span, as reported by the demodulator.
#[derive(Clone, Copy, Debug)]
pub struct DecodedMessage {
    /// linear power of the decoded signal, 1.0 = full scale
    pub signal_level: f64,
}

/// Tunables for both control loops. The defaults match a mid-range
/// receiver; everything is exposed as a command line option.
#[derive(Clone, Debug)]
pub struct AdaptiveConfig {
    pub burst_control: bool,
    pub range_control: bool,

    /// lower/upper bounds (in dB) imposed on the driver's gain ladder
    pub min_gain_db: f32,
    pub max_gain_db: f32,

    /// dynamic range (dB) that must stay available above the noise floor
    pub range_target_db: f64,
    /// percentile of the magnitude histogram used as the noise estimate
    pub range_percentile: u32,
    /// EMA smoothing factor for the noise estimate
    pub range_alpha: f64,
    /// blocks to wait after a scan gain change, letting the EMA settle
    pub range_scan_delay: u32,
    /// blocks between idle-state rescans
    pub range_rescan_delay: u32,

    /// EMA smoothing factor for the burst counters
    pub burst_alpha: f64,
    /// smoothed undecoded-burst rate above which a block counts as loud
    pub burst_loud_rate: f64,
    /// smoothed loud-decode rate below which a block counts as quiet
    pub burst_quiet_rate: f64,
    /// consecutive loud blocks before gain is reduced
    pub burst_loud_runlength: u32,
    /// consecutive quiet blocks before gain is restored
    pub burst_quiet_runlength: u32,
    /// blocks between burst-loop gain changes
    pub burst_change_delay: u32,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            burst_control: false,
            range_control: false,
            min_gain_db: 0.0,
            max_gain_db: 60.0,
            range_target_db: 30.0,
            range_percentile: 40,
            range_alpha: 0.1,
            range_scan_delay: 10,
            range_rescan_delay: 300,
            burst_alpha: 0.1,
            burst_loud_rate: 25.0,
            burst_quiet_rate: 5.0,
            burst_loud_runlength: 3,
            burst_quiet_runlength: 10,
            burst_change_delay: 5,
        }
    }
}

impl AdaptiveConfig {
    pub(crate) fn validate(&self) -> Result<(), AdaptiveError> {
        if !(1..=99).contains(&self.range_percentile) {
            return Err(AdaptiveError::InvalidPercentile {
                percentile: self.range_percentile,
            });
        }
        for alpha in [self.range_alpha, self.burst_alpha] {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(AdaptiveError::InvalidAlpha { alpha });
            }
        }
        Ok(())
    }
}

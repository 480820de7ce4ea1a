//! The adaptive controller proper: block scheduling, burst and noise
//! measurement, and the two control loops.

use std::sync::Arc;

use magrx_sdr::GainControl;

use crate::{
    AdaptiveConfig,
    AdaptiveError,
    BURST_WINDOWS_PER_SECOND,
    DecodedMessage,
    LOUD_SAMPLE_THRESHOLD,
};

/// Dynamic range scanner state. At most one scan direction is active at a
/// time; burst control only acts while the scanner is idle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeState {
    ScanUp,
    ScanDown,
    Idle,
}

/// Read-only counters the controller maintains alongside its decisions.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdaptiveStats {
    /// at least one block boundary has been processed
    pub valid: bool,
    /// smoothed noise floor estimate in dBFS
    pub noise_dbfs: f64,
    /// total loud-but-undecoded bursts seen
    pub loud_undecoded: u64,
    /// total decoded messages above the loud threshold
    pub loud_decoded: u64,
    /// blocks processed so far
    pub blocks: u64,
    /// blocks spent with burst control holding the gain down
    pub gain_reduced_blocks: u64,
}

pub struct AdaptiveController {
    config: AdaptiveConfig,
    gain: Option<Arc<dyn GainControl>>,

    // effective enables after probing the driver
    burst_control: bool,
    range_control: bool,

    // gain limits as ladder steps, derived from the configured dB range
    gain_min: i32,
    gain_max: i32,
    // dB deltas to the neighboring steps, refreshed on every gain change
    gain_up_db: f32,
    gain_down_db: f32,

    block_size: usize,
    block_remaining: usize,

    burst_window_size: usize,
    burst_window_remaining: usize,
    burst_window_counter: usize,
    burst_runlength: u32,
    burst_block_counter: u32,
    burst_block_loud_decodes: u32,
    burst_smoothed: f64,
    burst_loud_decodes_smoothed: f64,
    burst_change_delay: u32,
    burst_loud_threshold: f64,
    burst_loud_blocks: u32,
    burst_quiet_blocks: u32,
    burst_suppressing: bool,
    burst_orig_gain: i32,

    range_radix: Box<[u32]>,
    range_counter: u64,
    range_smoothed: f64,
    range_state: RangeState,
    range_delay: u32,

    stats: AdaptiveStats,
}

impl AdaptiveController {
    pub fn new(
        config: AdaptiveConfig,
        gain: Option<Arc<dyn GainControl>>,
        sample_rate: u32,
    ) -> Result<Self, AdaptiveError> {
        let mut burst_control = config.burst_control;
        let mut range_control = config.range_control;

        // without a gain ladder there is nothing to control
        if gain.is_none() && (burst_control || range_control) {
            tracing::warn!(
                "adaptive gain control requested, but the SDR has no gain control; ignored"
            );
            burst_control = false;
            range_control = false;
        }
        let gain = if burst_control || range_control {
            gain
        }
        else {
            None
        };

        let enabled = burst_control || range_control;
        if enabled {
            config.validate()?;
            if sample_rate % BURST_WINDOWS_PER_SECOND != 0 {
                return Err(AdaptiveError::UnsupportedSampleRate { sample_rate });
            }
        }

        let burst_window_size = (sample_rate / BURST_WINDOWS_PER_SECOND) as usize;
        let block_size = burst_window_size * BURST_WINDOWS_PER_SECOND as usize;

        let mut controller = Self {
            burst_control,
            range_control,
            gain_min: 0,
            gain_max: 0,
            gain_up_db: 0.0,
            gain_down_db: 0.0,
            block_size,
            block_remaining: block_size,
            burst_window_size,
            burst_window_remaining: burst_window_size,
            burst_window_counter: 0,
            burst_runlength: 0,
            burst_block_counter: 0,
            burst_block_loud_decodes: 0,
            burst_smoothed: 0.0,
            burst_loud_decodes_smoothed: 0.0,
            burst_change_delay: config.burst_change_delay,
            burst_loud_threshold: 0.0,
            burst_loud_blocks: 0,
            burst_quiet_blocks: 0,
            burst_suppressing: false,
            burst_orig_gain: 0,
            range_radix: if range_control {
                vec![0u32; 65536].into_boxed_slice()
            }
            else {
                Box::default()
            },
            range_counter: 0,
            range_smoothed: 0.0,
            // burst control waits for an idle scanner, so without range
            // control the scanner parks in Idle from the start
            range_state: if range_control {
                RangeState::ScanUp
            }
            else {
                RangeState::Idle
            },
            range_delay: config.range_scan_delay,
            stats: AdaptiveStats::default(),
            config,
            gain,
        };

        if let Some(gain) = controller.gain.clone() {
            let max_step = gain.max_step();

            // map the configured dB limits onto ladder steps
            controller.gain_min = 0;
            while controller.gain_min < max_step
                && gain.step_db(controller.gain_min) < controller.config.min_gain_db
            {
                controller.gain_min += 1;
            }
            controller.gain_max = max_step;
            while controller.gain_max > controller.gain_min
                && gain.step_db(controller.gain_max) > controller.config.max_gain_db
            {
                controller.gain_max -= 1;
            }

            tracing::info!(
                min_step = controller.gain_min,
                min_db = gain.step_db(controller.gain_min),
                max_step = controller.gain_max,
                max_db = gain.step_db(controller.gain_max),
                "adaptive gain control enabled"
            );
            if controller.range_control {
                tracing::info!(
                    target_db = controller.config.range_target_db,
                    "dynamic range control enabled"
                );
            }
            if controller.burst_control {
                tracing::info!("burst control enabled");
            }

            controller.set_gain(
                gain.current_step(),
                "constraining gain to adaptive gain limits",
            );
            controller.gain_changed();
        }

        Ok(controller)
    }

    pub fn enabled(&self) -> bool {
        self.burst_control || self.range_control
    }

    pub fn stats(&self) -> &AdaptiveStats {
        &self.stats
    }

    pub fn range_state(&self) -> RangeState {
        self.range_state
    }

    /// Feed samples into the controller. Any number of samples may be
    /// passed; block boundaries are handled internally.
    ///
    /// `decoded` marks the span as a successfully decoded message: it is
    /// excluded from burst/noise statistics and only counts toward the
    /// loud-decode rate.
    pub fn update(&mut self, mut samples: &[u16], decoded: Option<&DecodedMessage>) {
        if !self.enabled() {
            return;
        }

        // process up to each block boundary, then the completed block
        while samples.len() >= self.block_remaining {
            let (head, rest) = samples.split_at(self.block_remaining);
            self.update_single(head, decoded);
            samples = rest;

            self.end_of_block();
            self.block_remaining = self.block_size;
        }

        if !samples.is_empty() {
            self.update_single(samples, decoded);
            self.block_remaining -= samples.len();
        }
    }

    /// Samples that are guaranteed not to cross a block boundary.
    fn update_single(&mut self, samples: &[u16], decoded: Option<&DecodedMessage>) {
        match decoded {
            Some(message) => {
                if message.signal_level >= self.burst_loud_threshold {
                    self.burst_block_loud_decodes += 1;
                }
                self.burst_skip(samples.len());
            }
            None => {
                self.burst_update(samples);
                self.range_update(samples);
            }
        }
    }

    //
    // burst measurement
    //

    /// Advance the burst-window state over a decoded span without counting
    /// its (loud) samples.
    fn burst_skip(&mut self, mut length: usize) {
        if !self.burst_control {
            return;
        }

        // first window
        if length < self.burst_window_remaining {
            self.burst_window_remaining -= length;
            return;
        }

        // skip the remainder of the first window, dispatch it
        let counter = self.burst_window_counter;
        self.burst_end_of_window(counter);
        length -= self.burst_window_remaining;

        // skip all remaining complete windows, dispatch each of them
        let mut windows = length / self.burst_window_size;
        let samples = windows * self.burst_window_size;
        while windows > 0 {
            self.burst_end_of_window(0);
            windows -= 1;
        }
        length -= samples;

        // final partial window
        self.burst_window_counter = 0;
        self.burst_window_remaining = self.burst_window_size - length;
    }

    /// Count loud samples across window boundaries. The samples will not
    /// cross a block boundary.
    fn burst_update(&mut self, samples: &[u16]) {
        if !self.burst_control {
            return;
        }

        // first window
        if samples.len() < self.burst_window_remaining {
            self.burst_window_counter += count_loud_samples(samples);
            self.burst_window_remaining -= samples.len();
            return;
        }

        // complete fill of the first, possibly partial, window
        let (head, mut rest) = samples.split_at(self.burst_window_remaining);
        let counter = self.burst_window_counter + count_loud_samples(head);
        self.burst_end_of_window(counter);

        // remaining complete windows
        while rest.len() >= self.burst_window_size {
            let (window, tail) = rest.split_at(self.burst_window_size);
            let counter = count_loud_samples(window);
            self.burst_end_of_window(counter);
            rest = tail;
        }

        // final partial window
        self.burst_window_counter = count_loud_samples(rest);
        self.burst_window_remaining = self.burst_window_size - rest.len();
    }

    /// A burst window ended with `counter` loud samples.
    fn burst_end_of_window(&mut self, counter: usize) {
        if counter > self.burst_window_size / 4 {
            // loud window, extend any run
            self.burst_runlength += 1;
        }
        else {
            // quiet window. A run of 2..=5 loud windows (80-200 µs) is the
            // right length for a message that did not decode; longer runs
            // are something else entirely.
            if (2..=5).contains(&self.burst_runlength) {
                self.burst_block_counter += 1;
            }
            self.burst_runlength = 0;
        }
    }

    //
    // noise measurement
    //

    fn range_update(&mut self, samples: &[u16]) {
        if !self.range_control {
            return;
        }

        self.range_counter += samples.len() as u64;
        for &mag in samples {
            // radix histogram; the percentile walk happens at end of block
            self.range_radix[usize::from(mag)] += 1;
        }
    }

    fn range_end_of_block(&mut self) {
        if !self.range_control {
            return;
        }
        if self.range_counter == 0 {
            // the whole block was decoded spans; keep the old estimate
            return;
        }

        // Nth percentile magnitude
        let count_n = self.range_counter * u64::from(self.config.range_percentile) / 100;
        let mut n = 0u64;
        let mut i = 0usize;
        while i < 65536 && n <= count_n {
            n += u64::from(self.range_radix[i]);
            i += 1;
        }
        let percentile_n = (i - 1) as u16;

        let alpha = self.config.range_alpha;
        self.range_smoothed =
            self.range_smoothed * (1.0 - alpha) + f64::from(percentile_n) * alpha;
        self.stats.noise_dbfs = if self.range_smoothed > 0.0 {
            20.0 * (self.range_smoothed / 65536.0).log10()
        }
        else {
            0.0
        };

        self.range_radix.fill(0);
        self.range_counter = 0;
    }

    fn burst_end_of_block(&mut self) {
        if !self.burst_control {
            return;
        }

        let alpha = self.config.burst_alpha;

        self.stats.loud_undecoded += u64::from(self.burst_block_counter);
        self.burst_smoothed =
            self.burst_smoothed * (1.0 - alpha) + f64::from(self.burst_block_counter) * alpha;
        self.burst_block_counter = 0;

        self.stats.loud_decoded += u64::from(self.burst_block_loud_decodes);
        self.burst_loud_decodes_smoothed = self.burst_loud_decodes_smoothed * (1.0 - alpha)
            + f64::from(self.burst_block_loud_decodes) * alpha;
        self.burst_block_loud_decodes = 0;
    }

    //
    // gain plumbing
    //

    fn current_gain(&self) -> i32 {
        self.gain.as_ref().map_or(0, |gain| gain.current_step())
    }

    /// Clamp and apply a gain step. Returns whether the effective gain
    /// changed; failures are logged and treated as "unchanged".
    fn set_gain(&mut self, step: i32, why: &str) -> bool {
        let Some(gain) = self.gain.as_ref() else {
            return false;
        };

        let step = step.clamp(self.gain_min, self.gain_max);
        let current = gain.current_step();
        if current == step {
            return false;
        }

        tracing::info!(
            old_step = current,
            old_db = gain.step_db(current),
            new_step = step,
            new_db = gain.step_db(step),
            why,
            "adaptive: changing gain"
        );

        match gain.set_step(step) {
            Ok(actual) => actual != current,
            Err(error) => {
                // no retry; the next block tick re-reads the current step
                tracing::warn!(%error, step, "adaptive: gain change failed");
                false
            }
        }
    }

    /// Refresh the per-step dB deltas and the loud-decode threshold after
    /// a gain change; the ladder may be non-uniform.
    fn gain_changed(&mut self) {
        let Some(gain) = self.gain.as_ref() else {
            return;
        };

        let current = gain.current_step();
        self.gain_up_db = gain.step_db(current + 1) - gain.step_db(current);
        self.gain_down_db = gain.step_db(current) - gain.step_db(current - 1);

        let loud_threshold_dbfs = -f64::from(self.gain_up_db) - 3.0;
        self.burst_loud_threshold = 10f64.powf(loud_threshold_dbfs / 10.0);
    }

    fn increase_gain(&mut self, why: &str) {
        if self.set_gain(self.current_gain() + 1, why) {
            self.gain_changed();
        }
    }

    fn decrease_gain(&mut self, why: &str) {
        if self.set_gain(self.current_gain() - 1, why) {
            self.gain_changed();
        }
    }

    //
    // control loops
    //

    fn end_of_block(&mut self) {
        self.range_end_of_block();
        self.burst_end_of_block();

        self.burst_control_update();
        self.range_control_update();

        self.stats.valid = true;
        self.stats.blocks += 1;
        if self.burst_suppressing {
            self.stats.gain_reduced_blocks += 1;
        }
    }

    fn burst_control_update(&mut self) {
        if !self.burst_control {
            return;
        }

        // suspended while a range scan is running
        if self.range_state != RangeState::Idle {
            return;
        }

        if self.burst_change_delay > 0 {
            self.burst_change_delay -= 1;
        }

        if self.burst_change_delay == 0 {
            if self.burst_smoothed > self.config.burst_loud_rate {
                self.burst_quiet_blocks = 0;
                self.burst_loud_blocks += 1;
            }
            else if self.burst_loud_decodes_smoothed < self.config.burst_quiet_rate {
                self.burst_loud_blocks = 0;
                self.burst_quiet_blocks += 1;
            }
            else {
                self.burst_loud_blocks = 0;
                self.burst_quiet_blocks = 0;
            }

            if self.burst_loud_blocks >= self.config.burst_loud_runlength {
                // the receiver is swamped; back the gain off
                if !self.burst_suppressing {
                    self.burst_suppressing = true;
                    self.burst_orig_gain = self.current_gain();
                }

                self.decrease_gain("saw a noisy period with many undecoded loud messages");
                self.burst_loud_blocks = 0;
                self.burst_change_delay = self.config.burst_change_delay;
            }

            if self.burst_suppressing
                && self.burst_quiet_blocks >= self.config.burst_quiet_runlength
            {
                // quiet again; walk back toward the original gain
                self.increase_gain("saw a quiet period with few loud messages");
                self.burst_quiet_blocks = 0;
                self.burst_change_delay = self.config.burst_change_delay;

                if self.current_gain() >= self.burst_orig_gain {
                    self.burst_suppressing = false;
                }
            }
        }
    }

    fn range_control_update(&mut self) {
        if !self.range_control {
            return;
        }

        if self.range_delay > 0 {
            self.range_delay -= 1;
        }

        let available_range = -20.0 * (self.range_smoothed / 65536.0).log10();
        let target = self.config.range_target_db;

        match self.range_state {
            RangeState::ScanUp => {
                if self.range_delay > 0 {
                    return;
                }

                if available_range < target {
                    // this gain fails the target; turn around
                    tracing::info!(
                        available_range,
                        target,
                        "available dynamic range below target, switching to downward scan"
                    );
                    self.decrease_gain("downwards dynamic range gain scan");
                    self.range_state = RangeState::ScanDown;
                    self.range_delay = self.config.range_scan_delay;
                    return;
                }

                if self.current_gain() >= self.gain_max {
                    tracing::info!("reached upper gain limit, halting dynamic range scan");
                    self.range_state = RangeState::Idle;
                    self.range_delay = self.config.range_rescan_delay;
                    return;
                }

                // this step is fine and there is more ladder to try
                self.increase_gain("upwards dynamic range scan");
                self.range_delay = self.config.range_scan_delay;
            }
            RangeState::ScanDown => {
                if self.range_delay > 0 {
                    return;
                }

                if available_range >= target {
                    tracing::info!(
                        available_range,
                        target,
                        "available dynamic range meets target, stopping downward scan"
                    );
                    self.range_state = RangeState::Idle;
                    self.range_delay = self.config.range_rescan_delay;
                    return;
                }

                if self.current_gain() <= self.gain_min {
                    tracing::info!("reached lower gain limit, halting dynamic range scan");
                    self.range_state = RangeState::Idle;
                    self.range_delay = self.config.range_rescan_delay;
                    return;
                }

                self.decrease_gain("downwards dynamic range gain scan");
                self.range_delay = self.config.range_scan_delay;
            }
            RangeState::Idle => {
                // noise surge fast path: react even while delaying
                if available_range + f64::from(self.gain_down_db) / 2.0 < target
                    && self.current_gain() > self.gain_min
                {
                    tracing::info!(
                        available_range,
                        target,
                        "noise floor surged, starting downward scan"
                    );
                    self.range_state = RangeState::ScanDown;
                    self.range_delay = self.config.range_scan_delay;
                    return;
                }

                if self.range_delay > 0 {
                    return;
                }

                // infrequently probe upwards: the noise floor may be
                // dominated by noise unrelated to the gain setting
                if available_range >= target && self.current_gain() < self.gain_max {
                    tracing::info!("starting periodic scan for headroom at increased gain");
                    self.increase_gain("upwards dynamic range scan");
                    self.range_state = RangeState::ScanUp;
                    self.range_delay = self.config.range_scan_delay;
                    return;
                }

                self.range_delay = self.config.range_rescan_delay;
            }
        }
    }
}

#[inline]
fn count_loud_samples(samples: &[u16]) -> usize {
    samples
        .iter()
        .filter(|&&mag| mag > LOUD_SAMPLE_THRESHOLD)
        .count()
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::AdaptiveConfig;

    struct TestGain {
        db_per_step: f32,
        max: i32,
        current: Mutex<i32>,
        set_calls: Mutex<Vec<i32>>,
    }

    impl TestGain {
        fn new(max: i32, db_per_step: f32, initial: i32) -> Arc<Self> {
            Arc::new(Self {
                db_per_step,
                max,
                current: Mutex::new(initial),
                set_calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<i32> {
            self.set_calls.lock().clone()
        }
    }

    impl GainControl for TestGain {
        fn max_step(&self) -> i32 {
            self.max
        }

        fn current_step(&self) -> i32 {
            *self.current.lock()
        }

        fn set_step(&self, step: i32) -> Result<i32, magrx_sdr::SdrError> {
            let step = step.clamp(0, self.max);
            *self.current.lock() = step;
            self.set_calls.lock().push(step);
            Ok(step)
        }

        fn step_db(&self, step: i32) -> f32 {
            step.clamp(0, self.max) as f32 * self.db_per_step
        }
    }

    /// 25 kHz: 1-sample windows, 25000-sample blocks; cheap to drive
    const RANGE_TEST_RATE: u32 = 25_000;
    /// 100 kHz: 4-sample windows, 100000-sample blocks
    const BURST_TEST_RATE: u32 = 100_000;

    fn range_config() -> AdaptiveConfig {
        AdaptiveConfig {
            range_control: true,
            range_target_db: 30.0,
            range_alpha: 1.0,
            range_scan_delay: 0,
            range_rescan_delay: 5,
            max_gain_db: 6.0,
            ..AdaptiveConfig::default()
        }
    }

    fn burst_config() -> AdaptiveConfig {
        AdaptiveConfig {
            burst_control: true,
            burst_alpha: 1.0,
            burst_loud_rate: 10.0,
            burst_quiet_rate: 5.0,
            burst_loud_runlength: 2,
            burst_quiet_runlength: 2,
            burst_change_delay: 0,
            max_gain_db: 9.0,
            ..AdaptiveConfig::default()
        }
    }

    /// -40 dBFS; leaves 40 dB of range
    const QUIET: u16 = 655;
    /// -20 dBFS; leaves 20 dB of range
    const NOISY: u16 = 6553;

    fn feed_block(controller: &mut AdaptiveController, value: u16) {
        let block = vec![value; controller.block_size];
        controller.update(&block, None);
    }

    /// A burst block: `bursts` runs of 3 loud windows each, well separated.
    fn burst_block(controller: &AdaptiveController, bursts: usize) -> Vec<u16> {
        let mut block = vec![0u16; controller.block_size];
        let burst_len = 3 * controller.burst_window_size;
        for i in 0..bursts {
            let start = i * 2000;
            block[start..start + burst_len].fill(60000);
        }
        block
    }

    #[test]
    fn rejects_unaligned_sample_rates() {
        let gain = TestGain::new(9, 1.0, 5);
        let result = AdaptiveController::new(range_config(), Some(gain), 2_500_001);
        assert!(matches!(
            result,
            Err(AdaptiveError::UnsupportedSampleRate { .. })
        ));
    }

    #[test]
    fn rejects_bad_percentile() {
        let gain = TestGain::new(9, 1.0, 5);
        let config = AdaptiveConfig {
            range_percentile: 100,
            ..range_config()
        };
        let result = AdaptiveController::new(config, Some(gain), RANGE_TEST_RATE);
        assert!(matches!(result, Err(AdaptiveError::InvalidPercentile { .. })));
    }

    #[test]
    fn disables_itself_without_gain_control() {
        let mut controller =
            AdaptiveController::new(range_config(), None, RANGE_TEST_RATE).unwrap();
        assert!(!controller.enabled());

        // harmless no-op
        feed_block(&mut controller, QUIET);
        assert!(!controller.stats().valid);
    }

    #[test]
    fn startup_clamps_gain_into_the_configured_range() {
        let gain = TestGain::new(9, 1.0, 9);
        let _controller =
            AdaptiveController::new(range_config(), Some(gain.clone()), RANGE_TEST_RATE)
                .unwrap();
        // max_gain_db = 6.0 caps the ladder at step 6
        assert_eq!(gain.current_step(), 6);
    }

    #[test]
    fn scan_up_walks_to_the_gain_limit_and_idles() {
        let gain = TestGain::new(9, 1.0, 3);
        let mut controller =
            AdaptiveController::new(range_config(), Some(gain.clone()), RANGE_TEST_RATE)
                .unwrap();
        assert_eq!(controller.range_state(), RangeState::ScanUp);

        let mut blocks = 0;
        for _ in 0..30 {
            feed_block(&mut controller, QUIET);
            blocks += 1;
            if controller.range_state() == RangeState::Idle {
                break;
            }
        }

        assert_eq!(controller.range_state(), RangeState::Idle);
        assert_eq!(gain.current_step(), 6);

        // at most one gain change per block, all within the clamp range
        let calls = gain.calls();
        assert!(calls.len() <= blocks);
        assert!(calls.iter().all(|&step| (0..=6).contains(&step)));

        // no scan-down was ever triggered
        assert!(calls.windows(2).all(|pair| pair[1] > pair[0]));
    }

    #[test]
    fn noise_surge_interrupts_the_idle_delay() {
        let gain = TestGain::new(9, 1.0, 3);
        let mut controller =
            AdaptiveController::new(range_config(), Some(gain.clone()), RANGE_TEST_RATE)
                .unwrap();

        for _ in 0..10 {
            feed_block(&mut controller, QUIET);
            if controller.range_state() == RangeState::Idle {
                break;
            }
        }
        assert_eq!(controller.range_state(), RangeState::Idle);
        assert!(controller.range_delay > 0);

        // 10 dB over target: the idle fast path reacts on the very first
        // end of block, delay or not
        feed_block(&mut controller, NOISY);
        assert_eq!(controller.range_state(), RangeState::ScanDown);

        // gain steps down while the noise persists
        let before = gain.current_step();
        feed_block(&mut controller, NOISY);
        assert_eq!(gain.current_step(), before - 1);
        feed_block(&mut controller, NOISY);
        assert_eq!(gain.current_step(), before - 2);

        // once the range target is met again, the scanner idles
        feed_block(&mut controller, QUIET);
        assert_eq!(controller.range_state(), RangeState::Idle);
    }

    #[test]
    fn scan_down_stops_at_the_lower_gain_limit() {
        let gain = TestGain::new(9, 1.0, 1);
        let config = AdaptiveConfig {
            range_rescan_delay: 1000,
            ..range_config()
        };
        let mut controller =
            AdaptiveController::new(config, Some(gain.clone()), RANGE_TEST_RATE).unwrap();

        // hopeless noise floor: scanning down never reaches the target
        for _ in 0..10 {
            feed_block(&mut controller, NOISY);
        }

        assert_eq!(gain.current_step(), 0);
        assert_eq!(controller.range_state(), RangeState::Idle);
    }

    #[test]
    fn noise_ema_converges_like_an_ema() {
        let gain = TestGain::new(9, 1.0, 5);
        let config = AdaptiveConfig {
            range_alpha: 0.25,
            range_scan_delay: 1000, // hold the scanner still
            ..range_config()
        };
        let mut controller =
            AdaptiveController::new(config, Some(gain), RANGE_TEST_RATE).unwrap();

        let percentile = 1000.0f64;
        let blocks = 20;
        for _ in 0..blocks {
            feed_block(&mut controller, 1000);
        }

        let bound = percentile * (1.0 - 0.25f64).powi(blocks) + 1e-9;
        assert!(
            (controller.range_smoothed - percentile).abs() <= bound,
            "smoothed {} not within {} of {}",
            controller.range_smoothed,
            bound,
            percentile
        );
    }

    #[test]
    fn percentile_tracks_the_noise_floor() {
        let gain = TestGain::new(9, 1.0, 5);
        let config = AdaptiveConfig {
            range_scan_delay: 1000,
            ..range_config()
        };
        let mut controller =
            AdaptiveController::new(config, Some(gain), RANGE_TEST_RATE).unwrap();

        // 60% quiet, 40% loud; the 40th percentile lands in the quiet mass
        let mut block = vec![100u16; controller.block_size];
        let loud_from = controller.block_size * 6 / 10;
        block[loud_from..].fill(50_000);
        controller.update(&block, None);

        assert_eq!(controller.range_smoothed, 100.0);
        assert!(controller.stats().noise_dbfs < -50.0);
    }

    #[test]
    fn chunking_does_not_change_the_statistics() {
        let gain = TestGain::new(9, 1.0, 5);
        let config = AdaptiveConfig {
            burst_control: true,
            range_control: true,
            ..range_config()
        };

        let mut one_call =
            AdaptiveController::new(config.clone(), Some(gain), BURST_TEST_RATE).unwrap();
        let gain2 = TestGain::new(9, 1.0, 5);
        let mut chunked =
            AdaptiveController::new(config, Some(gain2), BURST_TEST_RATE).unwrap();

        // almost a whole block, bursts included, stopping short of the
        // boundary so the raw counters stay inspectable
        let mut data = burst_block(&one_call, 40);
        data.truncate(one_call.block_size - 1);

        one_call.update(&data, None);
        for chunk in data.chunks(997) {
            chunked.update(chunk, None);
        }

        assert_eq!(one_call.burst_window_counter, chunked.burst_window_counter);
        assert_eq!(
            one_call.burst_window_remaining,
            chunked.burst_window_remaining
        );
        assert_eq!(one_call.burst_runlength, chunked.burst_runlength);
        assert_eq!(one_call.burst_block_counter, chunked.burst_block_counter);
        assert_eq!(one_call.range_counter, chunked.range_counter);
        assert_eq!(one_call.block_remaining, chunked.block_remaining);
    }

    #[test]
    fn decoded_spans_advance_windows_without_counting_bursts() {
        let gain = TestGain::new(9, 1.0, 5);
        let mut controller =
            AdaptiveController::new(burst_config(), Some(gain), BURST_TEST_RATE).unwrap();

        // a loud decoded message straddling several windows
        let loud = vec![60000u16; 3 * controller.burst_window_size];
        let strong_decode = DecodedMessage { signal_level: 1.0 };
        controller.update(&loud, Some(&strong_decode));

        // window state advanced
        assert_eq!(
            controller.burst_window_remaining,
            controller.burst_window_size
        );
        // a quiet window would flush any run; there must be none
        controller.update(&vec![0u16; controller.burst_window_size], None);
        assert_eq!(controller.burst_block_counter, 0);
        assert_eq!(controller.burst_block_loud_decodes, 1);
    }

    #[test]
    fn quiet_decodes_do_not_count_as_loud() {
        let gain = TestGain::new(9, 1.0, 5);
        let mut controller =
            AdaptiveController::new(burst_config(), Some(gain), BURST_TEST_RATE).unwrap();

        let weak_decode = DecodedMessage {
            signal_level: 1e-6,
        };
        controller.update(&vec![0u16; 64], Some(&weak_decode));
        assert_eq!(controller.burst_block_loud_decodes, 0);
    }

    #[test]
    fn burst_runlength_band_is_two_to_five_windows() {
        let gain = TestGain::new(9, 1.0, 5);

        for (loud_windows, counted) in
            [(1u32, 0u32), (2, 1), (3, 1), (5, 1), (6, 0), (7, 0)]
        {
            let mut controller =
                AdaptiveController::new(burst_config(), Some(gain.clone()), BURST_TEST_RATE)
                    .unwrap();

            for _ in 0..loud_windows {
                controller.update(&vec![60000u16; controller.burst_window_size], None);
            }
            // quiet window terminates the run
            controller.update(&vec![0u16; controller.burst_window_size], None);

            assert_eq!(
                controller.burst_block_counter, counted,
                "run of {loud_windows} loud windows"
            );
        }
    }

    #[test]
    fn skip_dispatches_every_complete_window() {
        let gain = TestGain::new(9, 1.0, 5);
        let mut one_call =
            AdaptiveController::new(burst_config(), Some(gain.clone()), BURST_TEST_RATE)
                .unwrap();
        let mut split =
            AdaptiveController::new(burst_config(), Some(gain), BURST_TEST_RATE).unwrap();

        let window = one_call.burst_window_size;
        let prime = vec![60000u16; 2 * window];
        one_call.update(&prime, None);
        split.update(&prime, None);

        // a decoded span covering exactly two windows, fed whole vs split
        let decoded = DecodedMessage { signal_level: 1.0 };
        one_call.update(&vec![0u16; 2 * window], Some(&decoded));
        split.update(&vec![0u16; window], Some(&decoded));
        split.update(&vec![0u16; window], Some(&decoded));

        assert_eq!(one_call.burst_window_remaining, split.burst_window_remaining);
        assert_eq!(one_call.burst_window_counter, split.burst_window_counter);
        assert_eq!(one_call.burst_runlength, split.burst_runlength);
        assert_eq!(one_call.burst_block_counter, split.burst_block_counter);
    }

    #[test]
    fn burst_storm_suppresses_gain_once_per_change_delay() {
        let gain = TestGain::new(9, 1.0, 5);
        let config = AdaptiveConfig {
            burst_change_delay: 3,
            ..burst_config()
        };
        let mut controller =
            AdaptiveController::new(config, Some(gain.clone()), BURST_TEST_RATE).unwrap();

        // burst storms: 50 undecoded bursts per block
        let block = burst_block(&controller, 50);

        // the initial change delay has to run down first
        for _ in 0..3 {
            controller.update(&block, None);
            assert!(!controller.burst_suppressing);
        }

        // two consecutive loud blocks trip the loud runlength
        controller.update(&block, None);
        controller.update(&block, None);
        assert!(controller.burst_suppressing);
        assert_eq!(gain.current_step(), 4);
        assert_eq!(controller.burst_orig_gain, 5);

        // change delay armed: further storms are ignored for 3 blocks
        controller.update(&block, None);
        controller.update(&block, None);
        assert_eq!(gain.current_step(), 4);

        controller.update(&block, None);
        controller.update(&block, None);
        assert_eq!(gain.current_step(), 3);
    }

    #[test]
    fn quiet_recovery_restores_the_original_gain() {
        let gain = TestGain::new(9, 1.0, 5);
        let mut controller =
            AdaptiveController::new(burst_config(), Some(gain.clone()), BURST_TEST_RATE)
                .unwrap();

        let storm = burst_block(&controller, 50);
        controller.update(&storm, None);
        controller.update(&storm, None);
        assert!(controller.burst_suppressing);
        assert_eq!(gain.current_step(), 4);

        // quiet blocks with no loud decodes
        let quiet = vec![0u16; controller.block_size];
        controller.update(&quiet, None);
        controller.update(&quiet, None);

        assert_eq!(gain.current_step(), 5);
        assert!(!controller.burst_suppressing);
        assert!(controller.stats().gain_reduced_blocks >= 2);
    }

    #[test]
    fn gain_set_failures_are_ignored_not_retried() {
        struct FailingGain {
            current: Mutex<i32>,
        }

        impl GainControl for FailingGain {
            fn max_step(&self) -> i32 {
                9
            }

            fn current_step(&self) -> i32 {
                *self.current.lock()
            }

            fn set_step(&self, step: i32) -> Result<i32, magrx_sdr::SdrError> {
                Err(magrx_sdr::SdrError::Config {
                    message: format!("step {step} rejected"),
                })
            }

            fn step_db(&self, step: i32) -> f32 {
                step.clamp(0, 9) as f32
            }
        }

        let gain = Arc::new(FailingGain {
            current: Mutex::new(3),
        });
        let mut controller =
            AdaptiveController::new(range_config(), Some(gain), RANGE_TEST_RATE).unwrap();

        // scans keep re-evaluating each block; the failure never wedges
        // the state machine or panics
        for _ in 0..5 {
            feed_block(&mut controller, QUIET);
        }
        assert_eq!(controller.current_gain(), 3);
    }
}

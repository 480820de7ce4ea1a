use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    thread,
    time::Duration,
};

use clap::Parser;
use color_eyre::eyre::{
    Error,
    bail,
};
use magrx_adaptive::{
    AdaptiveConfig,
    AdaptiveController,
};
use magrx_dsp::{
    DspDispatcher,
    wisdom,
};
use magrx_pipeline::{
    Converter,
    DEFAULT_FIFO_BUFFERS,
    FifoError,
    SampleFifo,
    SampleFormat,
    overlap_samples,
};
use magrx_sdr::{
    FileSdrConfig,
    SamplePump,
    SdrConfig,
    open_by_name,
};

/// New samples per FIFO buffer; ~55 ms at 2.4 MHz.
const MAG_BUF_SAMPLES: usize = 0x20000;

#[derive(Debug, Parser)]
#[command(name = "magrx", about = "Mode S magnitude front end with adaptive gain")]
struct Args {
    /// SDR driver to use
    #[arg(long, default_value = "ifile")]
    sdr: String,

    /// raw IQ capture file for the ifile driver
    #[arg(long)]
    iq_file: Option<PathBuf>,

    /// raw sample format (uc8, sc16, sc16q11, s16, u16o12)
    #[arg(long, default_value = "uc8")]
    format: SampleFormat,

    /// sample rate in Hz
    #[arg(long, default_value_t = 2_400_000)]
    sample_rate: u32,

    /// pace file playback at the capture's real-time rate
    #[arg(long)]
    throttle: bool,

    /// restart file playback at end of file
    #[arg(long)]
    loop_file: bool,

    /// DSP wisdom file with preferred kernel implementations
    #[arg(long)]
    wisdom: Option<PathBuf>,

    /// number of buffers in the magnitude FIFO
    #[arg(long, default_value_t = DEFAULT_FIFO_BUFFERS)]
    fifo_buffers: usize,

    /// enable the adaptive burst control loop
    #[arg(long)]
    adaptive_burst_control: bool,

    /// enable the adaptive dynamic range control loop
    #[arg(long)]
    adaptive_range_control: bool,

    /// lowest gain (dB) adaptive control may select
    #[arg(long, default_value_t = 0.0)]
    adaptive_min_gain_db: f32,

    /// highest gain (dB) adaptive control may select
    #[arg(long, default_value_t = 60.0)]
    adaptive_max_gain_db: f32,

    /// required dynamic range above the noise floor, in dB
    #[arg(long, default_value_t = 30.0)]
    adaptive_range_target: f64,

    /// percentile (1-99) used as the noise floor estimate
    #[arg(long, default_value_t = 40)]
    adaptive_range_percentile: u32,

    /// noise EMA smoothing factor (0-1)
    #[arg(long, default_value_t = 0.1)]
    adaptive_range_alpha: f64,

    /// blocks between dynamic range scan steps
    #[arg(long, default_value_t = 10)]
    adaptive_range_scan_delay: u32,

    /// blocks between idle rescans
    #[arg(long, default_value_t = 300)]
    adaptive_range_rescan_delay: u32,

    /// burst EMA smoothing factor (0-1)
    #[arg(long, default_value_t = 0.1)]
    adaptive_burst_alpha: f64,

    /// smoothed undecoded-burst rate that makes a block "loud"
    #[arg(long, default_value_t = 25.0)]
    adaptive_burst_loud_rate: f64,

    /// smoothed loud-decode rate below which a block is "quiet"
    #[arg(long, default_value_t = 5.0)]
    adaptive_burst_quiet_rate: f64,

    /// consecutive loud blocks before gain is reduced
    #[arg(long, default_value_t = 3)]
    adaptive_burst_loud_runlength: u32,

    /// consecutive quiet blocks before gain is restored
    #[arg(long, default_value_t = 10)]
    adaptive_burst_quiet_runlength: u32,

    /// blocks between burst-loop gain changes
    #[arg(long, default_value_t = 5)]
    adaptive_burst_change_delay: u32,
}

impl Args {
    fn adaptive_config(&self) -> AdaptiveConfig {
        AdaptiveConfig {
            burst_control: self.adaptive_burst_control,
            range_control: self.adaptive_range_control,
            min_gain_db: self.adaptive_min_gain_db,
            max_gain_db: self.adaptive_max_gain_db,
            range_target_db: self.adaptive_range_target,
            range_percentile: self.adaptive_range_percentile,
            range_alpha: self.adaptive_range_alpha,
            range_scan_delay: self.adaptive_range_scan_delay,
            range_rescan_delay: self.adaptive_range_rescan_delay,
            burst_alpha: self.adaptive_burst_alpha,
            burst_loud_rate: self.adaptive_burst_loud_rate,
            burst_quiet_rate: self.adaptive_burst_quiet_rate,
            burst_loud_runlength: self.adaptive_burst_loud_runlength,
            burst_quiet_runlength: self.adaptive_burst_quiet_runlength,
            burst_change_delay: self.adaptive_burst_change_delay,
        }
    }
}

fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let dsp = Arc::new(DspDispatcher::new());
    if let Some(path) = &args.wisdom {
        if let Err(error) = wisdom::load(&dsp, path) {
            tracing::warn!(%error, "wisdom not loaded, keeping default kernel ranking");
        }
    }

    let sdr_config = SdrConfig {
        ifile: args.iq_file.clone().map(|path| {
            let mut config = FileSdrConfig::new(path, args.format, args.sample_rate);
            config.throttle = args.throttle;
            config.loop_playback = args.loop_file;
            config.block_samples = MAG_BUF_SAMPLES;
            config
        }),
    };

    let mut driver = open_by_name(&args.sdr, &sdr_config)?;
    driver.open()?;

    if args.fifo_buffers < 2 {
        bail!("--fifo-buffers must be at least 2");
    }

    let overlap = overlap_samples(args.sample_rate);
    let fifo = Arc::new(SampleFifo::new(args.fifo_buffers, MAG_BUF_SAMPLES, overlap));
    let converter = Converter::new(driver.sample_format(), dsp.clone());
    let mut pump = SamplePump::new(fifo.clone(), converter, args.sample_rate);

    let mut adaptive = AdaptiveController::new(
        args.adaptive_config(),
        driver.gain_control(),
        args.sample_rate,
    )?;

    let shutdown = Arc::new(AtomicBool::new(false));

    // producer: the driver streams raw blocks through the pump until EOF,
    // error, or shutdown
    let producer = thread::spawn({
        let fifo = fifo.clone();
        let shutdown = shutdown.clone();
        move || {
            if let Err(error) = driver.run(&mut pump, &shutdown) {
                tracing::error!(%error, "SDR stream terminated");
            }
            driver.close();
            shutdown.store(true, Ordering::Relaxed);
            fifo.halt();
        }
    });

    // consumer: this is where a demodulator would sit; we feed the
    // adaptive controller and log per-buffer aggregates
    let mut buffers = 0u64;
    loop {
        match fifo.dequeue(Duration::from_millis(100)) {
            Ok(buf) => {
                adaptive.update(buf.new_samples(), None);

                buffers += 1;
                if buffers % 64 == 0 {
                    tracing::info!(
                        buffers,
                        sample_timestamp = buf.sample_timestamp,
                        mean_level = buf.mean_level,
                        mean_power = buf.mean_power,
                        dropped = buf.dropped,
                        noise_dbfs = adaptive.stats().noise_dbfs,
                        "pipeline status"
                    );
                }

                fifo.release(buf);
            }
            Err(FifoError::Empty) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    producer.join().expect("producer thread panicked");

    let stats = adaptive.stats();
    tracing::info!(
        buffers,
        blocks = stats.blocks,
        noise_dbfs = stats.noise_dbfs,
        loud_decoded = stats.loud_decoded,
        loud_undecoded = stats.loud_undecoded,
        "stream finished"
    );

    Ok(())
}

//! Raw IQ capture playback driver.
//!
//! Streams a recorded capture file through the regular producer path, so
//! the whole pipeline can run without SDR hardware. Optionally throttled
//! to the capture's real-time rate. There is no gain ladder, so adaptive
//! gain control disables itself on this driver.

use std::{
    fs::File,
    io::{
        Read,
        Seek,
        SeekFrom,
    },
    path::PathBuf,
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
    time::{
        Duration,
        Instant,
    },
};

use magrx_pipeline::SampleFormat;

use crate::{
    SamplePump,
    SdrDriver,
    SdrError,
};

#[derive(Clone, Debug)]
pub struct FileSdrConfig {
    pub path: PathBuf,
    pub format: SampleFormat,
    pub sample_rate: u32,
    /// pace playback at the capture's real-time rate instead of free-running
    pub throttle: bool,
    /// restart from the beginning at end of file
    pub loop_playback: bool,
    /// samples per block pushed into the pipeline
    pub block_samples: usize,
}

impl FileSdrConfig {
    pub fn new(path: PathBuf, format: SampleFormat, sample_rate: u32) -> Self {
        Self {
            path,
            format,
            sample_rate,
            throttle: false,
            loop_playback: false,
            // ~54 ms at 2.4 MHz
            block_samples: 0x20000,
        }
    }
}

pub struct FileSdr {
    config: FileSdrConfig,
    file: Option<File>,
}

impl FileSdr {
    pub fn new(config: FileSdrConfig) -> Self {
        Self { config, file: None }
    }
}

impl SdrDriver for FileSdr {
    fn sample_format(&self) -> SampleFormat {
        self.config.format
    }

    fn open(&mut self) -> Result<(), SdrError> {
        tracing::debug!(path = %self.config.path.display(), "opening capture file");
        self.file = Some(File::open(&self.config.path)?);
        Ok(())
    }

    fn run(&mut self, pump: &mut SamplePump, shutdown: &AtomicBool) -> Result<(), SdrError> {
        let Some(file) = self.file.as_mut() else {
            return Err(SdrError::Config {
                message: "ifile driver was not opened".to_owned(),
            });
        };

        let block_bytes = self.config.block_samples * self.config.format.bytes_per_sample();
        let block_duration = Duration::from_secs_f64(
            self.config.block_samples as f64 / f64::from(self.config.sample_rate),
        );

        let mut block = vec![0u8; block_bytes];
        let mut next_block_at = Instant::now() + block_duration;

        while !shutdown.load(Ordering::Relaxed) {
            let mut filled = 0;
            while filled < block.len() {
                let n = file.read(&mut block[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }

            if filled == 0 {
                if !self.config.loop_playback {
                    tracing::info!("capture file exhausted");
                    return Ok(());
                }
                file.seek(SeekFrom::Start(0))?;
                continue;
            }

            pump.push(&block[..filled])?;

            if self.config.throttle {
                let now = Instant::now();
                if next_block_at > now {
                    std::thread::sleep(next_block_at - now);
                }
                next_block_at += block_duration;
            }
        }

        Ok(())
    }

    fn close(&mut self) {
        self.file = None;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        sync::Arc,
    };

    use magrx_dsp::DspDispatcher;
    use magrx_pipeline::{
        Converter,
        SampleFifo,
    };

    use super::*;

    #[test]
    fn plays_a_capture_through_the_pipeline() {
        let mut capture = tempfile::NamedTempFile::new().unwrap();
        // 192 full-scale UC8 samples
        capture
            .write_all(&[255u8, 128].repeat(192))
            .unwrap();

        let mut config = FileSdrConfig::new(
            capture.path().to_owned(),
            SampleFormat::Uc8,
            2_400_000,
        );
        config.block_samples = 64;

        let fifo = Arc::new(SampleFifo::new(4, 64, 8));
        let converter = Converter::new(SampleFormat::Uc8, Arc::new(DspDispatcher::new()));
        let mut pump = SamplePump::new(fifo.clone(), converter, config.sample_rate);

        let mut driver = FileSdr::new(config);
        driver.open().unwrap();
        driver.run(&mut pump, &AtomicBool::new(false)).unwrap();
        driver.close();

        for expected_timestamp in [0u64, 64, 128] {
            let buf = fifo.dequeue(Duration::from_millis(100)).unwrap();
            assert_eq!(buf.sample_timestamp, expected_timestamp);
            assert_eq!(buf.new_samples(), &[65535u16; 64][..]);
            fifo.release(buf);
        }
    }

    #[test]
    fn missing_file_fails_at_open() {
        let mut driver = FileSdr::new(FileSdrConfig::new(
            PathBuf::from("/nonexistent/capture.bin"),
            SampleFormat::Uc8,
            2_400_000,
        ));
        assert!(matches!(driver.open(), Err(SdrError::Io(_))));
    }

    #[test]
    fn shutdown_flag_stops_playback() {
        let mut capture = tempfile::NamedTempFile::new().unwrap();
        capture.write_all(&[128u8; 4096]).unwrap();

        let mut config = FileSdrConfig::new(
            capture.path().to_owned(),
            SampleFormat::Uc8,
            2_400_000,
        );
        config.block_samples = 16;
        config.loop_playback = true;

        let fifo = Arc::new(SampleFifo::new(2, 16, 0));
        let converter = Converter::new(SampleFormat::Uc8, Arc::new(DspDispatcher::new()));
        let mut pump = SamplePump::new(fifo.clone(), converter, config.sample_rate);

        let mut driver = FileSdr::new(config);
        driver.open().unwrap();

        // already-set shutdown: run returns without pushing anything
        driver
            .run(&mut pump, &AtomicBool::new(true))
            .unwrap();
        assert_eq!(fifo.free_buffers(), 2);
    }
}

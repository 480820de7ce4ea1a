//! Raw IQ bytes → magnitude samples, via the dispatched DSP kernels.

use std::sync::Arc;

use magrx_dsp::{
    DspDispatcher,
    MeanPower,
    Sc16Sample,
    Uc8Sample,
};

use crate::SampleFormat;

/// Converts one raw sample block at a time into magnitudes, producing the
/// mean level/power of the converted samples as a side effect.
///
/// UC8 goes through the fused magnitude+power kernel; the 16-bit formats
/// convert first and aggregate with `mean_power_u16` afterwards.
#[derive(Clone)]
pub struct Converter {
    format: SampleFormat,
    dsp: Arc<DspDispatcher>,
    /// bounce buffer for raw blocks that aren't 2-byte aligned
    scratch: Vec<u16>,
}

impl Converter {
    pub fn new(format: SampleFormat, dsp: Arc<DspDispatcher>) -> Self {
        Self {
            format,
            dsp,
            scratch: Vec::new(),
        }
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.format.bytes_per_sample()
    }

    /// Number of whole samples in `raw`; trailing partial samples are
    /// dropped.
    pub fn samples_in(&self, raw: &[u8]) -> usize {
        raw.len() / self.format.bytes_per_sample()
    }

    /// Convert `raw` into `output`, which must hold at least
    /// [`Self::samples_in`] samples. Returns the aggregates of the
    /// converted samples.
    pub fn convert(&mut self, raw: &[u8], output: &mut [u16]) -> MeanPower {
        let samples = self.samples_in(raw);
        let raw = &raw[..samples * self.format.bytes_per_sample()];
        let output = &mut output[..samples];

        let dsp = Arc::clone(&self.dsp);
        match self.format {
            SampleFormat::Uc8 => {
                let input: &[Uc8Sample] = bytemuck::cast_slice(raw);
                return dsp.magnitude_power_uc8(input, output);
            }
            SampleFormat::Sc16 => {
                let words = align_to_u16(&mut self.scratch, raw);
                let input: &[Sc16Sample] = bytemuck::cast_slice(words);
                dsp.magnitude_sc16(input, output);
            }
            SampleFormat::Sc16Q11 => {
                let words = align_to_u16(&mut self.scratch, raw);
                let input: &[Sc16Sample] = bytemuck::cast_slice(words);
                dsp.magnitude_sc16q11(input, output);
            }
            SampleFormat::S16 => {
                let words = align_to_u16(&mut self.scratch, raw);
                let input: &[i16] = bytemuck::cast_slice(words);
                dsp.magnitude_s16(input, output);
            }
            SampleFormat::U16O12 => {
                let words = align_to_u16(&mut self.scratch, raw);
                dsp.magnitude_u16o12(words, output);
            }
        }

        dsp.mean_power_u16(output)
    }
}

/// View `raw` as native u16 words, bouncing through `scratch` if the slice
/// isn't 2-byte aligned. The byte order is preserved; the kernels handle
/// endianness themselves.
fn align_to_u16<'a>(scratch: &'a mut Vec<u16>, raw: &'a [u8]) -> &'a [u16] {
    match bytemuck::try_cast_slice(raw) {
        Ok(words) => words,
        Err(_) => {
            scratch.clear();
            scratch.extend(
                raw.chunks_exact(2)
                    .map(|pair| u16::from_ne_bytes([pair[0], pair[1]])),
            );
            &scratch[..]
        }
    }
}

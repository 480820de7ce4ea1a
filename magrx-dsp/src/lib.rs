//! DSP kernels for the magnitude front end.
//!
//! Every operation (magnitude conversion, mean power, boxcar average,
//! preamble correlation) exists in several functionally equivalent
//! implementations: portable scalar code, unrolled and lookup-table
//! variants, and SIMD builds where the target supports them. A
//! [`DspDispatcher`] holds one registry per operation and resolves each
//! handle to a concrete function on first call; the ranking can be
//! overridden offline with a [wisdom file](wisdom).

pub mod cpu;
mod dispatch;
pub mod kernels;
mod registry;
pub mod tables;
pub mod wisdom;

use bytemuck::{
    Pod,
    Zeroable,
};

pub use crate::{
    dispatch::DspDispatcher,
    registry::{
        Kernel,
        KernelHandle,
    },
};

/// Interleaved unsigned 8-bit IQ sample, 127.5 = zero.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct Uc8Sample {
    /// I: in-phase / real component
    pub i: u8,
    /// Q: quadrature / imaginary component
    pub q: u8,
}

impl Default for Uc8Sample {
    fn default() -> Self {
        Self { i: 128, q: 128 }
    }
}

impl Uc8Sample {
    /// Index into the 256×256 magnitude lookup table: `(Q << 8) | I`.
    #[inline(always)]
    pub fn table_index(&self) -> usize {
        (usize::from(self.q) << 8) | usize::from(self.i)
    }
}

/// Interleaved little-endian signed 16-bit IQ sample.
///
/// The components are stored as read off the wire; use [`Self::i`] and
/// [`Self::q`] to get host-order values.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Sc16Sample {
    i_le: i16,
    q_le: i16,
}

impl Sc16Sample {
    pub fn new(i: i16, q: i16) -> Self {
        Self {
            i_le: i.to_le(),
            q_le: q.to_le(),
        }
    }

    #[inline(always)]
    pub fn i(&self) -> i16 {
        i16::from_le(self.i_le)
    }

    #[inline(always)]
    pub fn q(&self) -> i16 {
        i16::from_le(self.q_le)
    }
}

/// Aggregates produced alongside a magnitude conversion.
///
/// `level` is the mean magnitude and `power` the mean squared magnitude of
/// the converted samples, both normalized so that 1.0 = full scale.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeanPower {
    pub level: f64,
    pub power: f64,
}

/// fn-pointer signatures of the dispatched operations
pub type MagnitudeUc8Fn = fn(&[Uc8Sample], &mut [u16]);
pub type MagnitudePowerUc8Fn = fn(&[Uc8Sample], &mut [u16]) -> MeanPower;
pub type MagnitudeSc16Fn = fn(&[Sc16Sample], &mut [u16]);
pub type MagnitudeS16Fn = fn(&[i16], &mut [u16]);
pub type MagnitudeU16Fn = fn(&[u16], &mut [u16]);
pub type MeanPowerU16Fn = fn(&[u16]) -> MeanPower;
pub type BoxcarU16Fn = fn(&[u16], usize, &mut [u16]);
pub type PreambleU16Fn = fn(&[u16], usize, &mut [u16]);

//! The per-operation dispatch table.
//!
//! One [`Kernel`] handle per operation, each with an ordered registry of
//! implementations for the target architecture. Selection happens on the
//! first call through the handle; [`wisdom`](crate::wisdom) can re-rank
//! registries and force re-selection.
//!
//! The `*_aligned` twins carry the same registries but a stricter calling
//! contract: input and output slices must start on a 32-byte boundary.
//! Violating that is not UB with the current kernels, which tolerate any
//! alignment, but callers must not rely on it.

use crate::{
    BoxcarU16Fn,
    MagnitudePowerUc8Fn,
    MagnitudeS16Fn,
    MagnitudeSc16Fn,
    MagnitudeU16Fn,
    MagnitudeUc8Fn,
    MeanPower,
    MeanPowerU16Fn,
    PreambleU16Fn,
    Sc16Sample,
    Uc8Sample,
    registry::{
        Kernel,
        KernelHandle,
    },
};

macro_rules! dispatcher {
    ($(
        $(#[$doc:meta])*
        $op:ident: $sig:ty = $entries:path, fn($($arg:ident: $ty:ty),*) $(-> $ret:ty)?;
    )*) => {
        /// Holds one resolved-on-first-call handle per DSP operation.
        ///
        /// Construct once at startup and share by reference; all methods
        /// take `&self` and are safe to call from multiple threads.
        pub struct DspDispatcher {
            $( $op: Kernel<$sig>, )*
        }

        impl DspDispatcher {
            pub fn new() -> Self {
                Self {
                    $( $op: Kernel::new(stringify!($op), $entries()), )*
                }
            }

            $(
                $(#[$doc])*
                pub fn $op(&self, $($arg: $ty),*) $(-> $ret)? {
                    (self.$op.get())($($arg),*)
                }
            )*

            /// All dispatchable operation names, in registry declaration
            /// order.
            pub fn operation_names(&self) -> &'static [&'static str] {
                &[$(stringify!($op)),*]
            }

            /// Access an operation's registry by name, e.g. for wisdom
            /// handling.
            pub fn kernel(&self, op: &str) -> Option<&dyn KernelHandle> {
                match op {
                    $(stringify!($op) => Some(&self.$op),)*
                    _ => None,
                }
            }
        }

        impl Default for DspDispatcher {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

dispatcher! {
    /// Convert UC8 IQ samples to 16-bit magnitudes.
    magnitude_uc8: MagnitudeUc8Fn = entries::magnitude_uc8, fn(input: &[Uc8Sample], output: &mut [u16]);
    magnitude_uc8_aligned: MagnitudeUc8Fn = entries::magnitude_uc8, fn(input: &[Uc8Sample], output: &mut [u16]);
    /// Convert UC8 IQ samples and return the mean level/power of the
    /// converted block.
    magnitude_power_uc8: MagnitudePowerUc8Fn = entries::magnitude_power_uc8, fn(input: &[Uc8Sample], output: &mut [u16]) -> MeanPower;
    magnitude_power_uc8_aligned: MagnitudePowerUc8Fn = entries::magnitude_power_uc8, fn(input: &[Uc8Sample], output: &mut [u16]) -> MeanPower;
    /// Convert full-scale SC16 IQ samples to magnitudes.
    magnitude_sc16: MagnitudeSc16Fn = entries::magnitude_sc16, fn(input: &[Sc16Sample], output: &mut [u16]);
    magnitude_sc16_aligned: MagnitudeSc16Fn = entries::magnitude_sc16, fn(input: &[Sc16Sample], output: &mut [u16]);
    /// Convert SC16Q11 IQ samples (±2047 = full scale) to magnitudes.
    magnitude_sc16q11: MagnitudeSc16Fn = entries::magnitude_sc16q11, fn(input: &[Sc16Sample], output: &mut [u16]);
    magnitude_sc16q11_aligned: MagnitudeSc16Fn = entries::magnitude_sc16q11, fn(input: &[Sc16Sample], output: &mut [u16]);
    /// Convert signed 16-bit single-channel samples to magnitudes.
    magnitude_s16: MagnitudeS16Fn = entries::magnitude_s16, fn(input: &[i16], output: &mut [u16]);
    magnitude_s16_aligned: MagnitudeS16Fn = entries::magnitude_s16, fn(input: &[i16], output: &mut [u16]);
    /// Convert U16O12 (excess-2048) single-channel samples to magnitudes.
    magnitude_u16o12: MagnitudeU16Fn = entries::magnitude_u16o12, fn(input: &[u16], output: &mut [u16]);
    magnitude_u16o12_aligned: MagnitudeU16Fn = entries::magnitude_u16o12, fn(input: &[u16], output: &mut [u16]);
    /// Mean level and mean power of a magnitude buffer.
    mean_power_u16: MeanPowerU16Fn = entries::mean_power_u16, fn(input: &[u16]) -> MeanPower;
    mean_power_u16_aligned: MeanPowerU16Fn = entries::mean_power_u16, fn(input: &[u16]) -> MeanPower;
    /// Boxcar moving average over a magnitude buffer.
    boxcar_u16: BoxcarU16Fn = entries::boxcar_u16, fn(input: &[u16], window: usize, output: &mut [u16]);
    boxcar_u16_aligned: BoxcarU16Fn = entries::boxcar_u16, fn(input: &[u16], window: usize, output: &mut [u16]);
    /// Preamble correlation scores over a magnitude buffer.
    preamble_u16: PreambleU16Fn = entries::preamble_u16, fn(input: &[u16], halfbit: usize, output: &mut [u16]);
    preamble_u16_aligned: PreambleU16Fn = entries::preamble_u16, fn(input: &[u16], halfbit: usize, output: &mut [u16]);
}

/// Ranked registry construction, one mix per target architecture. Each
/// list is ordered fastest-first; generic entries double as fallbacks
/// behind the capability-gated ones.
mod entries {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    use crate::cpu;
    #[cfg(target_arch = "aarch64")]
    use crate::kernels::neon;
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    use crate::kernels::x86;
    use crate::{
        BoxcarU16Fn,
        MagnitudePowerUc8Fn,
        MagnitudeS16Fn,
        MagnitudeSc16Fn,
        MagnitudeU16Fn,
        MagnitudeUc8Fn,
        MeanPowerU16Fn,
        PreambleU16Fn,
        kernels,
        registry::KernelEntry,
    };

    pub(super) fn magnitude_uc8() -> Vec<KernelEntry<MagnitudeUc8Fn>> {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        return vec![
            KernelEntry::gated(
                "lookup_unroll_4_x86_avx2",
                "x86_avx2",
                x86::magnitude_uc8_lookup_unroll_4 as MagnitudeUc8Fn,
                cpu::supports_avx2,
            ),
            KernelEntry::new(
                "lookup_unroll_4_generic",
                "generic",
                kernels::magnitude_uc8::lookup_unroll_4,
            ),
            KernelEntry::gated(
                "lookup_x86_avx2",
                "x86_avx2",
                x86::magnitude_uc8_lookup,
                cpu::supports_avx2,
            ),
            KernelEntry::gated(
                "exact_x86_avx2",
                "x86_avx2",
                x86::magnitude_uc8_exact,
                cpu::supports_avx2,
            ),
            KernelEntry::gated(
                "approx_x86_avx2",
                "x86_avx2",
                x86::magnitude_uc8_approx,
                cpu::supports_avx2,
            ),
            KernelEntry::new("lookup_generic", "generic", kernels::magnitude_uc8::lookup),
            KernelEntry::new("exact_generic", "generic", kernels::magnitude_uc8::exact),
            KernelEntry::new("approx_generic", "generic", kernels::magnitude_uc8::approx),
        ];

        #[cfg(target_arch = "aarch64")]
        return vec![
            KernelEntry::new(
                "lookup_unroll_4_generic",
                "generic",
                kernels::magnitude_uc8::lookup_unroll_4 as MagnitudeUc8Fn,
            ),
            KernelEntry::new("lookup_generic", "generic", kernels::magnitude_uc8::lookup),
            KernelEntry::gated(
                "neon_approx_aarch64_neon",
                "aarch64_neon",
                neon::magnitude_uc8_neon_approx,
                crate::cpu::supports_neon,
            ),
            KernelEntry::new("exact_generic", "generic", kernels::magnitude_uc8::exact),
            KernelEntry::new("approx_generic", "generic", kernels::magnitude_uc8::approx),
        ];

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
        return vec![
            KernelEntry::new(
                "lookup_generic",
                "generic",
                kernels::magnitude_uc8::lookup as MagnitudeUc8Fn,
            ),
            KernelEntry::new(
                "lookup_unroll_4_generic",
                "generic",
                kernels::magnitude_uc8::lookup_unroll_4,
            ),
            KernelEntry::new("exact_generic", "generic", kernels::magnitude_uc8::exact),
            KernelEntry::new("approx_generic", "generic", kernels::magnitude_uc8::approx),
        ];
    }

    pub(super) fn magnitude_power_uc8() -> Vec<KernelEntry<MagnitudePowerUc8Fn>> {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        return vec![
            KernelEntry::gated(
                "lookup_unroll_4_x86_avx2",
                "x86_avx2",
                x86::magnitude_power_uc8_lookup_unroll_4 as MagnitudePowerUc8Fn,
                cpu::supports_avx2,
            ),
            KernelEntry::new(
                "lookup_unroll_4_generic",
                "generic",
                kernels::magnitude_power_uc8::lookup_unroll_4,
            ),
            KernelEntry::gated(
                "lookup_x86_avx2",
                "x86_avx2",
                x86::magnitude_power_uc8_lookup,
                cpu::supports_avx2,
            ),
            KernelEntry::new(
                "lookup_generic",
                "generic",
                kernels::magnitude_power_uc8::lookup,
            ),
            KernelEntry::new(
                "twopass_generic",
                "generic",
                kernels::magnitude_power_uc8::twopass,
            ),
        ];

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        return vec![
            KernelEntry::new(
                "lookup_unroll_4_generic",
                "generic",
                kernels::magnitude_power_uc8::lookup_unroll_4 as MagnitudePowerUc8Fn,
            ),
            KernelEntry::new(
                "lookup_generic",
                "generic",
                kernels::magnitude_power_uc8::lookup,
            ),
            KernelEntry::new(
                "twopass_generic",
                "generic",
                kernels::magnitude_power_uc8::twopass,
            ),
        ];
    }

    pub(super) fn magnitude_sc16() -> Vec<KernelEntry<MagnitudeSc16Fn>> {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        return vec![
            KernelEntry::gated(
                "exact_u32_x86_avx2",
                "x86_avx2",
                x86::magnitude_sc16_exact_u32 as MagnitudeSc16Fn,
                cpu::supports_avx2,
            ),
            KernelEntry::new(
                "exact_u32_generic",
                "generic",
                kernels::magnitude_sc16::exact_u32,
            ),
            KernelEntry::gated(
                "exact_float_x86_avx2",
                "x86_avx2",
                x86::magnitude_sc16_exact_float,
                cpu::supports_avx2,
            ),
            KernelEntry::new(
                "exact_float_generic",
                "generic",
                kernels::magnitude_sc16::exact_float,
            ),
        ];

        #[cfg(target_arch = "aarch64")]
        return vec![
            KernelEntry::gated(
                "neon_approx_aarch64_neon",
                "aarch64_neon",
                neon::magnitude_sc16_neon_approx as MagnitudeSc16Fn,
                crate::cpu::supports_neon,
            ),
            KernelEntry::new(
                "exact_u32_generic",
                "generic",
                kernels::magnitude_sc16::exact_u32,
            ),
            KernelEntry::new(
                "exact_float_generic",
                "generic",
                kernels::magnitude_sc16::exact_float,
            ),
        ];

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
        return vec![
            KernelEntry::new(
                "exact_u32_generic",
                "generic",
                kernels::magnitude_sc16::exact_u32 as MagnitudeSc16Fn,
            ),
            KernelEntry::new(
                "exact_float_generic",
                "generic",
                kernels::magnitude_sc16::exact_float,
            ),
        ];
    }

    pub(super) fn magnitude_sc16q11() -> Vec<KernelEntry<MagnitudeSc16Fn>> {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        return vec![
            KernelEntry::gated(
                "lookup_unroll_4_x86_avx2",
                "x86_avx2",
                x86::magnitude_sc16q11_lookup_unroll_4 as MagnitudeSc16Fn,
                cpu::supports_avx2,
            ),
            KernelEntry::new(
                "lookup_unroll_4_generic",
                "generic",
                kernels::magnitude_sc16::q11_lookup_unroll_4,
            ),
            KernelEntry::new(
                "lookup_generic",
                "generic",
                kernels::magnitude_sc16::q11_lookup,
            ),
            KernelEntry::gated(
                "exact_x86_avx2",
                "x86_avx2",
                x86::magnitude_sc16q11_exact,
                cpu::supports_avx2,
            ),
            KernelEntry::new(
                "exact_generic",
                "generic",
                kernels::magnitude_sc16::q11_exact,
            ),
        ];

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        return vec![
            KernelEntry::new(
                "lookup_unroll_4_generic",
                "generic",
                kernels::magnitude_sc16::q11_lookup_unroll_4 as MagnitudeSc16Fn,
            ),
            KernelEntry::new(
                "lookup_generic",
                "generic",
                kernels::magnitude_sc16::q11_lookup,
            ),
            KernelEntry::new(
                "exact_generic",
                "generic",
                kernels::magnitude_sc16::q11_exact,
            ),
        ];
    }

    pub(super) fn magnitude_s16() -> Vec<KernelEntry<MagnitudeS16Fn>> {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        return vec![
            KernelEntry::gated(
                "exact_u32_x86_avx2",
                "x86_avx2",
                x86::magnitude_s16_exact_u32 as MagnitudeS16Fn,
                cpu::supports_avx2,
            ),
            KernelEntry::new(
                "exact_u32_generic",
                "generic",
                kernels::magnitude_s16::exact_u32,
            ),
            KernelEntry::new(
                "exact_unroll_4_generic",
                "generic",
                kernels::magnitude_s16::exact_unroll_4,
            ),
        ];

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        return vec![
            KernelEntry::new(
                "exact_u32_generic",
                "generic",
                kernels::magnitude_s16::exact_u32 as MagnitudeS16Fn,
            ),
            KernelEntry::new(
                "exact_unroll_4_generic",
                "generic",
                kernels::magnitude_s16::exact_unroll_4,
            ),
        ];
    }

    pub(super) fn magnitude_u16o12() -> Vec<KernelEntry<MagnitudeU16Fn>> {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        return vec![
            KernelEntry::gated(
                "lookup_unroll_4_x86_avx2",
                "x86_avx2",
                x86::magnitude_u16o12_lookup_unroll_4 as MagnitudeU16Fn,
                cpu::supports_avx2,
            ),
            KernelEntry::new(
                "lookup_unroll_4_generic",
                "generic",
                kernels::magnitude_u16o12::lookup_unroll_4,
            ),
            KernelEntry::gated(
                "exact_unroll_4_x86_avx2",
                "x86_avx2",
                x86::magnitude_u16o12_exact_unroll_4,
                cpu::supports_avx2,
            ),
            KernelEntry::new(
                "lookup_generic",
                "generic",
                kernels::magnitude_u16o12::lookup,
            ),
            KernelEntry::new(
                "exact_unroll_4_generic",
                "generic",
                kernels::magnitude_u16o12::exact_unroll_4,
            ),
            KernelEntry::new("exact_generic", "generic", kernels::magnitude_u16o12::exact),
        ];

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        return vec![
            KernelEntry::new(
                "lookup_generic",
                "generic",
                kernels::magnitude_u16o12::lookup as MagnitudeU16Fn,
            ),
            KernelEntry::new(
                "lookup_unroll_4_generic",
                "generic",
                kernels::magnitude_u16o12::lookup_unroll_4,
            ),
            KernelEntry::new("exact_generic", "generic", kernels::magnitude_u16o12::exact),
            KernelEntry::new(
                "exact_unroll_4_generic",
                "generic",
                kernels::magnitude_u16o12::exact_unroll_4,
            ),
        ];
    }

    pub(super) fn mean_power_u16() -> Vec<KernelEntry<MeanPowerU16Fn>> {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        return vec![
            KernelEntry::gated(
                "u64_x86_avx2",
                "x86_avx2",
                x86::mean_power_u16_u64 as MeanPowerU16Fn,
                cpu::supports_avx2,
            ),
            KernelEntry::new("u64_generic", "generic", kernels::mean_power_u16::u64),
            KernelEntry::new("u32_generic", "generic", kernels::mean_power_u16::u32),
            KernelEntry::new("float_generic", "generic", kernels::mean_power_u16::float),
        ];

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        return vec![
            KernelEntry::new(
                "u64_generic",
                "generic",
                kernels::mean_power_u16::u64 as MeanPowerU16Fn,
            ),
            KernelEntry::new("u32_generic", "generic", kernels::mean_power_u16::u32),
            KernelEntry::new("float_generic", "generic", kernels::mean_power_u16::float),
        ];
    }

    pub(super) fn boxcar_u16() -> Vec<KernelEntry<BoxcarU16Fn>> {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        return vec![
            KernelEntry::gated(
                "u32_x86_avx2",
                "x86_avx2",
                x86::boxcar_u16_u32 as BoxcarU16Fn,
                cpu::supports_avx2,
            ),
            KernelEntry::new("u32_generic", "generic", kernels::boxcar_u16::u32),
        ];

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        return vec![KernelEntry::new(
            "u32_generic",
            "generic",
            kernels::boxcar_u16::u32 as BoxcarU16Fn,
        )];
    }

    pub(super) fn preamble_u16() -> Vec<KernelEntry<PreambleU16Fn>> {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        return vec![
            KernelEntry::gated(
                "u32_single_x86_avx2",
                "x86_avx2",
                x86::preamble_u16_u32_single as PreambleU16Fn,
                cpu::supports_avx2,
            ),
            KernelEntry::gated(
                "u32_separate_x86_avx2",
                "x86_avx2",
                x86::preamble_u16_u32_separate,
                cpu::supports_avx2,
            ),
            KernelEntry::new(
                "u32_single_generic",
                "generic",
                kernels::preamble_u16::u32_single,
            ),
            KernelEntry::new(
                "u32_separate_generic",
                "generic",
                kernels::preamble_u16::u32_separate,
            ),
        ];

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        return vec![
            KernelEntry::new(
                "u32_single_generic",
                "generic",
                kernels::preamble_u16::u32_single as PreambleU16Fn,
            ),
            KernelEntry::new(
                "u32_separate_generic",
                "generic",
                kernels::preamble_u16::u32_separate,
            ),
        ];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_resolves_each_handle() {
        let dsp = DspDispatcher::new();
        assert_eq!(dsp.kernel("magnitude_uc8").unwrap().selected_name(), None);

        let input = [Uc8Sample { i: 255, q: 128 }; 37];
        let mut output = [0u16; 37];
        dsp.magnitude_uc8(&input, &mut output);

        assert!(
            dsp.kernel("magnitude_uc8")
                .unwrap()
                .selected_name()
                .is_some()
        );
        assert!(output[0] > 60000);
    }

    #[test]
    fn every_operation_has_a_usable_registry() {
        let dsp = DspDispatcher::new();

        let uc8 = [Uc8Sample::default(); 64];
        let sc16 = [Sc16Sample::new(100, -100); 64];
        let s16 = [-100i16; 64];
        let u16o12 = [2048u16; 64];
        let mut mags = [0u16; 64];

        dsp.magnitude_uc8(&uc8, &mut mags);
        dsp.magnitude_uc8_aligned(&uc8, &mut mags);
        let _ = dsp.magnitude_power_uc8(&uc8, &mut mags);
        let _ = dsp.magnitude_power_uc8_aligned(&uc8, &mut mags);
        dsp.magnitude_sc16(&sc16, &mut mags);
        dsp.magnitude_sc16q11(&sc16, &mut mags);
        dsp.magnitude_s16(&s16, &mut mags);
        dsp.magnitude_u16o12(&u16o12, &mut mags);
        let _ = dsp.mean_power_u16(&mags);
        let scratch = mags;
        dsp.boxcar_u16(&scratch, 4, &mut mags);
        dsp.preamble_u16(&scratch, 2, &mut mags);

        for &op in dsp.operation_names() {
            assert!(dsp.kernel(op).is_some());
        }
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[test]
    fn avx2_host_prefers_the_unrolled_avx2_lookup() {
        use crate::cpu;

        if !cpu::supports_avx2() {
            return;
        }

        let dsp = DspDispatcher::new();
        let input = [Uc8Sample::default(); 8];
        let mut output = [0u16; 8];
        dsp.magnitude_uc8(&input, &mut output);

        assert_eq!(
            dsp.kernel("magnitude_uc8").unwrap().selected_name(),
            Some("lookup_unroll_4_x86_avx2")
        );
    }
}

//! AVX2 builds of the portable kernels.
//!
//! These are the same scalar bodies recompiled inside
//! `#[target_feature(enable = "avx2")]` wrappers, which lets the compiler
//! vectorize the loops with 256-bit operations. The registry gates them on
//! [`cpu::supports_avx2`]; the asserts catch a mis-ranked registry.

use crate::{
    MeanPower,
    Sc16Sample,
    Uc8Sample,
    cpu,
    kernels::{
        boxcar_u16,
        magnitude_power_uc8,
        magnitude_s16,
        magnitude_sc16,
        magnitude_u16o12,
        magnitude_uc8,
        mean_power_u16,
        preamble_u16,
    },
};

macro_rules! avx2_build {
    ($(
        fn $name:ident($($arg:ident: $ty:ty),*) $(-> $ret:ty)? = $body:path;
    )*) => {$(
        pub fn $name($($arg: $ty),*) $(-> $ret)? {
            assert!(cpu::supports_avx2(), "avx2 kernel selected without avx2 support");

            #[target_feature(enable = "avx2")]
            unsafe fn vectorized($($arg: $ty),*) $(-> $ret)? {
                $body($($arg),*)
            }

            // safety: the avx2 probe above passed
            unsafe { vectorized($($arg),*) }
        }
    )*};
}

avx2_build! {
    fn magnitude_uc8_lookup(input: &[Uc8Sample], output: &mut [u16]) = magnitude_uc8::lookup;
    fn magnitude_uc8_lookup_unroll_4(input: &[Uc8Sample], output: &mut [u16]) = magnitude_uc8::lookup_unroll_4;
    fn magnitude_uc8_exact(input: &[Uc8Sample], output: &mut [u16]) = magnitude_uc8::exact;
    fn magnitude_uc8_approx(input: &[Uc8Sample], output: &mut [u16]) = magnitude_uc8::approx;
    fn magnitude_power_uc8_lookup(input: &[Uc8Sample], output: &mut [u16]) -> MeanPower = magnitude_power_uc8::lookup;
    fn magnitude_power_uc8_lookup_unroll_4(input: &[Uc8Sample], output: &mut [u16]) -> MeanPower = magnitude_power_uc8::lookup_unroll_4;
    fn magnitude_sc16_exact_u32(input: &[Sc16Sample], output: &mut [u16]) = magnitude_sc16::exact_u32;
    fn magnitude_sc16_exact_float(input: &[Sc16Sample], output: &mut [u16]) = magnitude_sc16::exact_float;
    fn magnitude_sc16q11_exact(input: &[Sc16Sample], output: &mut [u16]) = magnitude_sc16::q11_exact;
    fn magnitude_sc16q11_lookup_unroll_4(input: &[Sc16Sample], output: &mut [u16]) = magnitude_sc16::q11_lookup_unroll_4;
    fn magnitude_s16_exact_u32(input: &[i16], output: &mut [u16]) = magnitude_s16::exact_u32;
    fn magnitude_u16o12_exact_unroll_4(input: &[u16], output: &mut [u16]) = magnitude_u16o12::exact_unroll_4;
    fn magnitude_u16o12_lookup_unroll_4(input: &[u16], output: &mut [u16]) = magnitude_u16o12::lookup_unroll_4;
    fn mean_power_u16_u64(input: &[u16]) -> MeanPower = mean_power_u16::u64;
    fn boxcar_u16_u32(input: &[u16], window: usize, output: &mut [u16]) = boxcar_u16::u32;
    fn preamble_u16_u32_single(input: &[u16], halfbit: usize, output: &mut [u16]) = preamble_u16::u32_single;
    fn preamble_u16_u32_separate(input: &[u16], halfbit: usize, output: &mut [u16]) = preamble_u16::u32_separate;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avx2_builds_match_generic_bit_exactly() {
        if !cpu::supports_avx2() {
            return;
        }

        let mut state = 0x7f4a7c15u32;
        let input: Vec<Uc8Sample> = (0..8191)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                Uc8Sample {
                    i: (state >> 8) as u8,
                    q: (state >> 20) as u8,
                }
            })
            .collect();

        let mut generic = vec![0u16; input.len()];
        let mut avx2 = vec![0u16; input.len()];

        magnitude_uc8::exact(&input, &mut generic);
        magnitude_uc8_exact(&input, &mut avx2);
        assert_eq!(generic, avx2);

        let expected = magnitude_power_uc8::lookup(&input, &mut generic);
        let fused = magnitude_power_uc8_lookup(&input, &mut avx2);
        assert_eq!(generic, avx2);
        assert_eq!(expected, fused);

        assert_eq!(mean_power_u16::u64(&generic), mean_power_u16_u64(&avx2));

        let mut boxcar_generic = vec![0u16; generic.len()];
        let mut boxcar_avx2 = vec![0u16; generic.len()];
        boxcar_u16::u32(&generic, 16, &mut boxcar_generic);
        boxcar_u16_u32(&avx2, 16, &mut boxcar_avx2);
        assert_eq!(boxcar_generic, boxcar_avx2);
    }
}

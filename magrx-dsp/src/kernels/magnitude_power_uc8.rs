//! Fused UC8 magnitude conversion that also produces the mean level and
//! mean power of the converted samples.
//!
//! Observationally equivalent to `magnitude_uc8` followed by
//! `mean_power_u16` over the output.

use crate::{
    MeanPower,
    Uc8Sample,
    kernels::{
        magnitude_uc8,
        mean_power_u16,
    },
    tables,
};

/// Two separate passes over the data, reusing the single-purpose kernels.
#[inline(always)]
pub fn twopass(input: &[Uc8Sample], output: &mut [u16]) -> MeanPower {
    magnitude_uc8::lookup_unroll_4(input, output);
    mean_power_u16::u64(&output[..input.len()])
}

#[inline(always)]
pub fn lookup(input: &[Uc8Sample], output: &mut [u16]) -> MeanPower {
    if input.is_empty() {
        return MeanPower::default();
    }

    let table = tables::uc8_mag_table();

    let mut sum_level = 0u64;
    let mut sum_power = 0u64;
    for (sample, out) in input.iter().zip(output.iter_mut()) {
        let mag = table[sample.table_index()];
        *out = mag;
        sum_level += u64::from(mag);
        sum_power += u64::from(u32::from(mag) * u32::from(mag));
    }

    let len = input.len() as f64;
    MeanPower {
        level: sum_level as f64 / 65536.0 / len,
        power: sum_power as f64 / 65536.0 / 65536.0 / len,
    }
}

#[inline(always)]
pub fn lookup_unroll_4(input: &[Uc8Sample], output: &mut [u16]) -> MeanPower {
    if input.is_empty() {
        return MeanPower::default();
    }

    let table = tables::uc8_mag_table();

    let mut sum_level = 0u64;
    let mut sum_power = 0u64;

    let len4 = input.len() & !3;
    for (quad, out) in input[..len4]
        .chunks_exact(4)
        .zip(output[..len4].chunks_exact_mut(4))
    {
        let mag0 = table[quad[0].table_index()];
        let mag1 = table[quad[1].table_index()];
        let mag2 = table[quad[2].table_index()];
        let mag3 = table[quad[3].table_index()];

        out[0] = mag0;
        out[1] = mag1;
        out[2] = mag2;
        out[3] = mag3;

        sum_level += u64::from(mag0) + u64::from(mag1) + u64::from(mag2) + u64::from(mag3);
        sum_power += u64::from(u32::from(mag0) * u32::from(mag0))
            + u64::from(u32::from(mag1) * u32::from(mag1))
            + u64::from(u32::from(mag2) * u32::from(mag2))
            + u64::from(u32::from(mag3) * u32::from(mag3));
    }

    for (sample, out) in input[len4..].iter().zip(output[len4..].iter_mut()) {
        let mag = table[sample.table_index()];
        *out = mag;
        sum_level += u64::from(mag);
        sum_power += u64::from(u32::from(mag) * u32::from(mag));
    }

    let len = input.len() as f64;
    MeanPower {
        level: sum_level as f64 / 65536.0 / len,
        power: sum_power as f64 / 65536.0 / 65536.0 / len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(len: usize) -> Vec<Uc8Sample> {
        let mut state = 0x1234abcdu32;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                Uc8Sample {
                    i: (state >> 8) as u8,
                    q: (state >> 20) as u8,
                }
            })
            .collect()
    }

    #[test]
    fn fused_variants_match_twopass() {
        let input = noise(4097);

        let mut expected_mags = vec![0u16; input.len()];
        let expected = twopass(&input, &mut expected_mags);

        let mut mags = vec![0u16; input.len()];
        assert_eq!(lookup(&input, &mut mags), expected);
        assert_eq!(mags, expected_mags);

        let mut mags = vec![0u16; input.len()];
        assert_eq!(lookup_unroll_4(&input, &mut mags), expected);
        assert_eq!(mags, expected_mags);
    }
}

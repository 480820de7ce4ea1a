//! Convert little-endian U16O12 (excess-2048) single-channel samples to
//! magnitudes.
//!
//! Raw 2048 is zero signal; 1 and 4095 are ±2047, i.e. full scale.

use crate::tables::{
    self,
    u16o12_scale,
};

#[inline(always)]
pub fn exact(input: &[u16], output: &mut [u16]) {
    for (sample, out) in input.iter().zip(output.iter_mut()) {
        *out = u16o12_scale(u16::from_le(*sample));
    }
}

#[inline(always)]
pub fn exact_unroll_4(input: &[u16], output: &mut [u16]) {
    let len4 = input.len() & !3;
    for (quad, out) in input[..len4]
        .chunks_exact(4)
        .zip(output[..len4].chunks_exact_mut(4))
    {
        out[0] = u16o12_scale(u16::from_le(quad[0]));
        out[1] = u16o12_scale(u16::from_le(quad[1]));
        out[2] = u16o12_scale(u16::from_le(quad[2]));
        out[3] = u16o12_scale(u16::from_le(quad[3]));
    }

    for (sample, out) in input[len4..].iter().zip(output[len4..].iter_mut()) {
        *out = u16o12_scale(u16::from_le(*sample));
    }
}

#[inline(always)]
pub fn lookup(input: &[u16], output: &mut [u16]) {
    let table = tables::u16o12_mag_table();

    for (sample, out) in input.iter().zip(output.iter_mut()) {
        *out = table[usize::from(u16::from_le(*sample))];
    }
}

#[inline(always)]
pub fn lookup_unroll_4(input: &[u16], output: &mut [u16]) {
    let table = tables::u16o12_mag_table();

    let len4 = input.len() & !3;
    for (quad, out) in input[..len4]
        .chunks_exact(4)
        .zip(output[..len4].chunks_exact_mut(4))
    {
        let mag0 = table[usize::from(u16::from_le(quad[0]))];
        let mag1 = table[usize::from(u16::from_le(quad[1]))];
        let mag2 = table[usize::from(u16::from_le(quad[2]))];
        let mag3 = table[usize::from(u16::from_le(quad[3]))];

        out[0] = mag0;
        out[1] = mag1;
        out[2] = mag2;
        out[3] = mag3;
    }

    for (sample, out) in input[len4..].iter().zip(output[len4..].iter_mut()) {
        *out = table[usize::from(u16::from_le(*sample))];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_matches_exact_for_all_inputs() {
        let input: Vec<u16> = (0..=65535u16).collect();
        let mut from_exact = vec![0u16; input.len()];
        let mut from_lookup = vec![0u16; input.len()];

        exact(&input, &mut from_exact);
        lookup(&input, &mut from_lookup);
        assert_eq!(from_exact, from_lookup);
    }

    #[test]
    fn unrolled_variants_match_plain() {
        let input: Vec<u16> = (0..4099u32).map(|x| (x * 16 % 65536) as u16).collect();
        let mut plain = vec![0u16; input.len()];
        let mut unrolled = vec![0u16; input.len()];

        exact(&input, &mut plain);
        exact_unroll_4(&input, &mut unrolled);
        assert_eq!(plain, unrolled);

        lookup_unroll_4(&input, &mut unrolled);
        assert_eq!(plain, unrolled);
    }
}

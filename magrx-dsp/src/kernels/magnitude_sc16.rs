//! Convert little-endian SC16 and SC16Q11 IQ samples to magnitudes.
//!
//! SC16 treats the full signed 16-bit range as full scale; SC16Q11 is a
//! Q11 fixed-point format where ±2047 is full scale.

use crate::{
    Sc16Sample,
    tables,
};

#[inline(always)]
pub fn exact_u32(input: &[Sc16Sample], output: &mut [u16]) {
    for (sample, out) in input.iter().zip(output.iter_mut()) {
        let i = u32::from(sample.i().unsigned_abs());
        let q = u32::from(sample.q().unsigned_abs());

        let magsq = i * i + q * q;
        let mag = ((magsq as f32).sqrt() * 2.0).min(65535.0);

        *out = mag as u16;
    }
}

#[inline(always)]
pub fn exact_float(input: &[Sc16Sample], output: &mut [u16]) {
    for (sample, out) in input.iter().zip(output.iter_mut()) {
        let i = f32::from(sample.i().unsigned_abs()) * 2.0;
        let q = f32::from(sample.q().unsigned_abs()) * 2.0;

        let magsq = i * i + q * q;
        let mag = magsq.sqrt().min(65535.0);

        *out = mag as u16;
    }
}

#[inline(always)]
pub fn q11_exact(input: &[Sc16Sample], output: &mut [u16]) {
    for (sample, out) in input.iter().zip(output.iter_mut()) {
        let i = f32::from(sample.i());
        let q = f32::from(sample.q());

        let magsq = i * i + q * q;
        let mag = (magsq.sqrt() * 65536.0 / 2048.0).min(65535.0);

        *out = (mag + 0.5) as u16;
    }
}

#[inline(always)]
pub fn q11_lookup(input: &[Sc16Sample], output: &mut [u16]) {
    let table = tables::sc16q11_mag_table();

    for (sample, out) in input.iter().zip(output.iter_mut()) {
        *out = table[q11_table_index(sample)];
    }
}

#[inline(always)]
pub fn q11_lookup_unroll_4(input: &[Sc16Sample], output: &mut [u16]) {
    let table = tables::sc16q11_mag_table();

    let len4 = input.len() & !3;
    for (quad, out) in input[..len4]
        .chunks_exact(4)
        .zip(output[..len4].chunks_exact_mut(4))
    {
        let mag0 = table[q11_table_index(&quad[0])];
        let mag1 = table[q11_table_index(&quad[1])];
        let mag2 = table[q11_table_index(&quad[2])];
        let mag3 = table[q11_table_index(&quad[3])];

        out[0] = mag0;
        out[1] = mag1;
        out[2] = mag2;
        out[3] = mag3;
    }

    for (sample, out) in input[len4..].iter().zip(output[len4..].iter_mut()) {
        *out = table[q11_table_index(sample)];
    }
}

/// Clamp |I| and |Q| to 11 bits and form the `(Q << 11) | I` table index.
/// Values past ±2047 are out of range for Q11 and saturate.
#[inline(always)]
fn q11_table_index(sample: &Sc16Sample) -> usize {
    let i = sample.i().unsigned_abs().min(2047) as usize;
    let q = sample.q().unsigned_abs().min(2047) as usize;
    (q << 11) | i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep() -> Vec<Sc16Sample> {
        let values = [
            -32768i16, -32767, -23170, -2048, -2047, -1024, -33, -1, 0, 1, 47, 1023, 2047, 2048,
            23169, 32767,
        ];
        values
            .iter()
            .flat_map(|&i| values.iter().map(move |&q| Sc16Sample::new(i, q)))
            .collect()
    }

    #[test]
    fn u32_and_float_variants_agree() {
        let input = sweep();
        let mut from_u32 = vec![0u16; input.len()];
        let mut from_float = vec![0u16; input.len()];

        exact_u32(&input, &mut from_u32);
        exact_float(&input, &mut from_float);

        for (sample, (a, b)) in input.iter().zip(from_u32.iter().zip(&from_float)) {
            assert!(a.abs_diff(*b) <= 1, "sample {sample:?}: {a} vs {b}");
        }
    }

    #[test]
    fn full_scale_single_axis() {
        let input = [Sc16Sample::new(i16::MIN, 0), Sc16Sample::new(0, 32767)];
        let mut output = [0u16; 2];
        exact_u32(&input, &mut output);
        assert_eq!(output[0], 65535);
        assert_eq!(output[1], 65534);
    }

    #[test]
    fn q11_lookup_matches_exact_within_q11_range() {
        let input: Vec<Sc16Sample> = (-2047i16..=2047)
            .step_by(7)
            .flat_map(|i| [-2047i16, -1024, -1, 0, 3, 800, 2047].map(move |q| Sc16Sample::new(i, q)))
            .collect();

        let mut from_exact = vec![0u16; input.len()];
        let mut from_lookup = vec![0u16; input.len()];
        q11_exact(&input, &mut from_exact);
        q11_lookup(&input, &mut from_lookup);

        for (sample, (a, b)) in input.iter().zip(from_exact.iter().zip(&from_lookup)) {
            assert!(a.abs_diff(*b) <= 1, "sample {sample:?}: exact {a} vs lookup {b}");
        }
    }

    #[test]
    fn q11_unrolled_matches_plain() {
        let input = sweep();
        let mut plain = vec![0u16; input.len()];
        let mut unrolled = vec![0u16; input.len()];

        q11_lookup(&input, &mut plain);
        q11_lookup_unroll_4(&input, &mut unrolled);
        assert_eq!(plain, unrolled);
    }
}

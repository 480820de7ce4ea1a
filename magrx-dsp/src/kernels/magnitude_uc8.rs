//! Convert UC8 IQ samples to unsigned 16-bit magnitudes.

use crate::{
    Uc8Sample,
    tables,
};

/// Table-driven conversion. Bit-exact against the reference formula
/// `round(clamp(sqrt(((i-127.5)/127.5)² + ((q-127.5)/127.5)²), 0, 1) * 65535)`.
#[inline(always)]
pub fn lookup(input: &[Uc8Sample], output: &mut [u16]) {
    let table = tables::uc8_mag_table();

    for (sample, out) in input.iter().zip(output.iter_mut()) {
        *out = table[sample.table_index()];
    }
}

#[inline(always)]
pub fn lookup_unroll_4(input: &[Uc8Sample], output: &mut [u16]) {
    let table = tables::uc8_mag_table();

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
    }

    for (sample, out) in input[len4..].iter().zip(output[len4..].iter_mut()) {
        *out = table[sample.table_index()];
    }
}

/// Direct float evaluation. May differ from [`lookup`] by 1 LSB because it
/// truncates instead of rounding.
#[inline(always)]
pub fn exact(input: &[Uc8Sample], output: &mut [u16]) {
    for (sample, out) in input.iter().zip(output.iter_mut()) {
        let i = f32::from(sample.i) - 127.5;
        let q = f32::from(sample.q) - 127.5;

        let magsq = i * i + q * q;
        let mag = (magsq.sqrt() * 65535.0 / 127.5).min(65535.0);

        *out = mag as u16;
    }
}

/// Alpha-max-plus-beta-min magnitude estimate, ~4% worst-case error but
/// monotonic in |I| + |Q|.
#[inline(always)]
pub fn approx(input: &[Uc8Sample], output: &mut [u16]) {
    for (sample, out) in input.iter().zip(output.iter_mut()) {
        let i = (f32::from(sample.i) - 127.5).abs();
        let q = (f32::from(sample.q) - 127.5).abs();

        let minval = i.min(q);
        let maxval = i.max(q);

        let approx = if minval < 0.4142135 * maxval {
            (0.99 * maxval + 0.197 * minval) * 65535.0 / 127.5
        }
        else {
            (0.84 * maxval + 0.561 * minval) * 65535.0 / 127.5
        };

        *out = approx.min(65535.0) as u16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_inputs() -> Vec<Uc8Sample> {
        (0..=255u8)
            .flat_map(|q| (0..=255u8).map(move |i| Uc8Sample { i, q }))
            .collect()
    }

    fn reference(sample: &Uc8Sample) -> u16 {
        let i = (f64::from(sample.i) - 127.5) / 127.5;
        let q = (f64::from(sample.q) - 127.5) / 127.5;
        let mag = (i * i + q * q).sqrt().clamp(0.0, 1.0);
        (mag * 65535.0).round() as u16
    }

    #[test]
    fn lookup_matches_reference_for_all_inputs() {
        let input = all_inputs();
        let mut output = vec![0u16; input.len()];
        lookup(&input, &mut output);

        for (sample, out) in input.iter().zip(&output) {
            assert_eq!(*out, reference(sample), "sample {sample:?}");
        }
    }

    #[test]
    fn unrolled_lookup_matches_plain_lookup() {
        let input = all_inputs();
        let mut plain = vec![0u16; input.len()];
        let mut unrolled = vec![0u16; input.len()];

        lookup(&input, &mut plain);
        lookup_unroll_4(&input, &mut unrolled);
        assert_eq!(plain, unrolled);

        // odd lengths exercise the scalar tail
        let mut short = vec![0u16; 7];
        lookup_unroll_4(&input[..7], &mut short);
        assert_eq!(short, plain[..7]);
    }

    #[test]
    fn exact_is_within_one_lsb_of_lookup() {
        let input = all_inputs();
        let mut from_lookup = vec![0u16; input.len()];
        let mut from_exact = vec![0u16; input.len()];

        lookup(&input, &mut from_lookup);
        exact(&input, &mut from_exact);

        for (sample, (a, b)) in input.iter().zip(from_lookup.iter().zip(&from_exact)) {
            assert!(
                i32::from(*a).abs_diff(i32::from(*b)) <= 1,
                "sample {sample:?}: lookup {a} vs exact {b}"
            );
        }
    }

    #[test]
    fn approx_stays_within_coarse_error_band() {
        let input = all_inputs();
        let mut from_exact = vec![0u16; input.len()];
        let mut from_approx = vec![0u16; input.len()];

        exact(&input, &mut from_exact);
        approx(&input, &mut from_approx);

        for (sample, (a, b)) in input.iter().zip(from_exact.iter().zip(&from_approx)) {
            // alpha-max-beta-min is good to ~4% of full scale
            assert!(
                i32::from(*a).abs_diff(i32::from(*b)) <= 2700,
                "sample {sample:?}: exact {a} vs approx {b}"
            );
        }
    }
}

//! Equally-weighted moving average (boxcar) over a magnitude buffer.
//!
//! `output[i] = floor(sum(input[i..i + window]) / window)` for
//! `0 <= i <= len - window`; later output slots are left untouched. The
//! window slides incrementally (add head, subtract tail), so the cost is
//! O(len) regardless of window size.

#[inline(always)]
pub fn u32(input: &[u16], window: usize, output: &mut [u16]) {
    if window == 0 || input.len() < window {
        return;
    }

    let window_u32 = window as u32;

    // sum of the first complete window
    let mut running_sum: u32 = input[..window].iter().map(|&mag| u32::from(mag)).sum();
    output[0] = (running_sum / window_u32) as u16;

    let mut out = 1;
    for (head, tail) in input[window..].iter().zip(input.iter()) {
        // running_sum covers input[out - 1 .. out - 1 + window]
        running_sum = running_sum + u32::from(*head) - u32::from(*tail);
        output[out] = (running_sum / window_u32) as u16;
        out += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(len: usize) -> Vec<u16> {
        let mut state = 0x9e3779b9u32;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                (state >> 16) as u16
            })
            .collect()
    }

    fn naive(input: &[u16], window: usize) -> Vec<u16> {
        (0..=input.len() - window)
            .map(|i| {
                let sum: u32 = input[i..i + window].iter().map(|&mag| u32::from(mag)).sum();
                (sum / window as u32) as u16
            })
            .collect()
    }

    #[test]
    fn incremental_matches_naive_sum() {
        let input = noise(4096);
        for window in [1, 2, 7, 16, 48, 96] {
            let mut output = vec![0u16; input.len()];
            u32(&input, window, &mut output);
            let expected = naive(&input, window);
            assert_eq!(&output[..expected.len()], &expected[..], "window {window}");
        }
    }

    #[test]
    fn short_input_writes_nothing() {
        let input = noise(7);
        let mut output = vec![0xffffu16; 7];
        u32(&input, 8, &mut output);
        assert_eq!(output, vec![0xffffu16; 7]);
    }
}

//! Mean level and mean power of a magnitude buffer, normalized so that
//! 1.0 = full scale.

use crate::MeanPower;

#[inline(always)]
pub fn float(input: &[u16]) -> MeanPower {
    if input.is_empty() {
        return MeanPower::default();
    }

    let mut sum_level = 0.0f64;
    let mut sum_power = 0.0f64;
    for &mag in input {
        let mag = f64::from(mag);
        sum_level += mag;
        sum_power += mag * mag;
    }

    let len = input.len() as f64;
    MeanPower {
        level: sum_level / 65536.0 / len,
        power: sum_power / 65536.0 / 65536.0 / len,
    }
}

#[inline(always)]
pub fn u64(input: &[u16]) -> MeanPower {
    if input.is_empty() {
        return MeanPower::default();
    }

    let mut sum_level = 0u64;
    let mut sum_power = 0u64;
    for &mag in input {
        let mag = u64::from(mag);
        sum_level += mag;
        sum_power += mag * mag;
    }

    let len = input.len() as f64;
    MeanPower {
        level: sum_level as f64 / 65536.0 / len,
        power: sum_power as f64 / 65536.0 / 65536.0 / len,
    }
}

/// u32 accumulators folded into u64 every 2¹⁴ samples so neither sum can
/// overflow.
#[inline(always)]
pub fn u32(input: &[u16]) -> MeanPower {
    if input.is_empty() {
        return MeanPower::default();
    }

    let mut sum_level = 0u64;
    let mut sum_power = 0u64;
    for chunk in input.chunks(1 << 14) {
        let mut chunk_level = 0u32;
        let mut chunk_power = 0u64;
        for &mag in chunk {
            let mag = u32::from(mag);
            chunk_level += mag;
            chunk_power += u64::from(mag * mag);
        }
        sum_level += u64::from(chunk_level);
        sum_power += chunk_power;
    }

    let len = input.len() as f64;
    MeanPower {
        level: sum_level as f64 / 65536.0 / len,
        power: sum_power as f64 / 65536.0 / 65536.0 / len,
    }
}

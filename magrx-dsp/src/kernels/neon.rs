//! Hand-written NEON ports of the alpha-max-plus-beta-min magnitude
//! approximation, in Q15 fixed point.
//!
//! `result = 0.99·max + 0.197·min` when `min < 0.4142135·max`, otherwise
//! `0.84·max + 0.561·min`, with max/min over |I| and |Q|.

use std::arch::aarch64::*;

use crate::{
    Sc16Sample,
    Uc8Sample,
    cpu,
};

const C_099: i16 = (0.99 * 32768.0) as i16;
const C_0197: i16 = (0.197 * 32768.0) as i16;
const C_084: i16 = (0.84 * 32768.0) as i16;
const C_0561: i16 = (0.561 * 32768.0) as i16;
const C_04142: i16 = (0.4142135 * 32768.0) as i16;

pub fn magnitude_uc8_neon_approx(input: &[Uc8Sample], output: &mut [u16]) {
    assert!(cpu::supports_neon(), "neon kernel selected without neon support");
    unsafe { uc8_neon_approx(input, output) }
}

#[target_feature(enable = "neon")]
unsafe fn uc8_neon_approx(input: &[Uc8Sample], output: &mut [u16]) {
    unsafe {
        let offset = vdupq_n_u16((127.5 * 256.0) as u16);
        let constants0 = vld1_s16([C_099, C_0197, C_084, C_0561].as_ptr());
        let constants1 = vld1_s16([C_04142, 0, 0, 0].as_ptr());

        let mut in_ptr = input.as_ptr() as *const u8;
        let mut out_ptr = output.as_mut_ptr();

        let mut len8 = input.len() >> 3;
        while len8 > 0 {
            let iq = vld2_u8(in_ptr);

            // widen to 16 bits, convert to signed
            let i_u16 = vshll_n_u8::<8>(iq.0);
            let q_u16 = vshll_n_u8::<8>(iq.1);
            let i_s16 = vreinterpretq_s16_u16(vsubq_u16(i_u16, offset));
            let q_s16 = vreinterpretq_s16_u16(vsubq_u16(q_u16, offset));

            let absi = vabsq_s16(i_s16);
            let absq = vabsq_s16(q_s16);
            let minval = vminq_s16(absi, absq);
            let maxval = vmaxq_s16(absi, absq);

            let threshold = vqdmulhq_lane_s16::<0>(maxval, constants1);
            let lt_res = vqaddq_s16(
                vqrdmulhq_lane_s16::<0>(maxval, constants0),
                vqrdmulhq_lane_s16::<1>(minval, constants0),
            );
            let ge_res = vqaddq_s16(
                vqrdmulhq_lane_s16::<2>(maxval, constants0),
                vqrdmulhq_lane_s16::<3>(minval, constants0),
            );
            let selector = vcgeq_s16(minval, threshold);
            let result = vreinterpretq_u16_s16(vbslq_s16(selector, ge_res, lt_res));
            let result2 = vqshlq_n_u16::<1>(result);

            vst1q_u16(out_ptr, result2);

            in_ptr = in_ptr.add(16);
            out_ptr = out_ptr.add(8);
            len8 -= 1;
        }

        let mut len1 = input.len() & 7;
        while len1 > 0 {
            let iq = vld2_dup_u8(in_ptr);

            let i_u16 = vget_low_u16(vshll_n_u8::<8>(iq.0));
            let q_u16 = vget_low_u16(vshll_n_u8::<8>(iq.1));
            let i_s16 = vreinterpret_s16_u16(vsub_u16(i_u16, vget_low_u16(offset)));
            let q_s16 = vreinterpret_s16_u16(vsub_u16(q_u16, vget_low_u16(offset)));

            let absi = vabs_s16(i_s16);
            let absq = vabs_s16(q_s16);
            let minval = vmin_s16(absi, absq);
            let maxval = vmax_s16(absi, absq);

            let threshold = vqdmulh_lane_s16::<0>(maxval, constants1);
            let lt_res = vqadd_s16(
                vqrdmulh_lane_s16::<0>(maxval, constants0),
                vqrdmulh_lane_s16::<1>(minval, constants0),
            );
            let ge_res = vqadd_s16(
                vqrdmulh_lane_s16::<2>(maxval, constants0),
                vqrdmulh_lane_s16::<3>(minval, constants0),
            );
            let selector = vcge_s16(minval, threshold);
            let result = vreinterpret_u16_s16(vbsl_s16(selector, ge_res, lt_res));
            let result2 = vqshl_n_u16::<1>(result);

            vst1_lane_u16::<0>(out_ptr, result2);

            in_ptr = in_ptr.add(2);
            out_ptr = out_ptr.add(1);
            len1 -= 1;
        }
    }
}

pub fn magnitude_sc16_neon_approx(input: &[Sc16Sample], output: &mut [u16]) {
    assert!(cpu::supports_neon(), "neon kernel selected without neon support");
    unsafe { sc16_neon_approx(input, output) }
}

#[target_feature(enable = "neon")]
unsafe fn sc16_neon_approx(input: &[Sc16Sample], output: &mut [u16]) {
    unsafe {
        let constants0 = vld1_s16([C_099, C_0197, C_084, C_0561].as_ptr());
        let constants1 = vld1_s16([C_04142, 0, 0, 0].as_ptr());

        let mut in_ptr = input.as_ptr() as *const i16;
        let mut out_ptr = output.as_mut_ptr();

        let mut len8 = input.len() >> 3;
        while len8 > 0 {
            let iq = vld2q_s16(in_ptr);

            let absi = vqabsq_s16(iq.0);
            let absq = vqabsq_s16(iq.1);
            let minval = vminq_s16(absi, absq);
            let maxval = vmaxq_s16(absi, absq);

            let threshold = vqrdmulhq_lane_s16::<0>(maxval, constants1);
            let selector = vcgeq_s16(minval, threshold);
            let lt_res = vqaddq_s16(
                vqrdmulhq_lane_s16::<0>(maxval, constants0),
                vqrdmulhq_lane_s16::<1>(minval, constants0),
            );
            let ge_res = vqaddq_s16(
                vqrdmulhq_lane_s16::<2>(maxval, constants0),
                vqrdmulhq_lane_s16::<3>(minval, constants0),
            );
            let result = vreinterpretq_u16_s16(vbslq_s16(selector, ge_res, lt_res));
            let result2 = vshlq_n_u16::<1>(result);

            vst1q_u16(out_ptr, result2);

            in_ptr = in_ptr.add(16);
            out_ptr = out_ptr.add(8);
            len8 -= 1;
        }

        let mut len1 = input.len() & 7;
        while len1 > 0 {
            let iq = vld2_dup_s16(in_ptr);

            let absi = vqabs_s16(iq.0);
            let absq = vqabs_s16(iq.1);
            let minval = vmin_s16(absi, absq);
            let maxval = vmax_s16(absi, absq);

            let threshold = vqrdmulh_lane_s16::<0>(maxval, constants1);
            let selector = vcge_s16(minval, threshold);
            let lt_res = vqadd_s16(
                vqrdmulh_lane_s16::<0>(maxval, constants0),
                vqrdmulh_lane_s16::<1>(minval, constants0),
            );
            let ge_res = vqadd_s16(
                vqrdmulh_lane_s16::<2>(maxval, constants0),
                vqrdmulh_lane_s16::<3>(minval, constants0),
            );
            let result = vreinterpret_u16_s16(vbsl_s16(selector, ge_res, lt_res));
            let result2 = vshl_n_u16::<1>(result);

            vst1_lane_u16::<0>(out_ptr, result2);

            in_ptr = in_ptr.add(2);
            out_ptr = out_ptr.add(1);
            len1 -= 1;
        }
    }
}

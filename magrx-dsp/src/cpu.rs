//! CPU capability probes used to gate SIMD kernel registry entries.
//!
//! Each probe is cached after the first query and is safe to call before
//! any dispatch has happened. Unknown platforms report `false` for
//! everything, which forces the generic kernel path.

use std::sync::OnceLock;

static AVX: OnceLock<bool> = OnceLock::new();
static AVX2: OnceLock<bool> = OnceLock::new();

pub fn supports_avx() -> bool {
    *AVX.get_or_init(|| {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            std::arch::is_x86_feature_detected!("avx")
        }
        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        {
            false
        }
    })
}

pub fn supports_avx2() -> bool {
    *AVX2.get_or_init(|| {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            std::arch::is_x86_feature_detected!("avx2")
        }
        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        {
            false
        }
    })
}

/// NEON is architecturally guaranteed on aarch64.
pub fn supports_neon() -> bool {
    cfg!(target_arch = "aarch64")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_are_stable() {
        assert_eq!(supports_avx(), supports_avx());
        assert_eq!(supports_avx2(), supports_avx2());
        assert_eq!(supports_neon(), supports_neon());
    }

    #[test]
    fn avx2_implies_avx() {
        if supports_avx2() {
            assert!(supports_avx());
        }
    }
}

//! Scalar operations implementing ARM floating-point semantics that have no
//! exact x86-64 equivalent. These back the per-lane fallback paths of the
//! vector emitter. Lane errors accumulate into an FPSR word; nothing here
//! raises host exceptions.

use crate::fp::info::*;
use crate::fp::nan::*;
use crate::fp::rounding::RoundingMode;
use crate::fp::{Fpcr, FPSR_DZC, FPSR_IOC, FPSR_IXC};

// ---------------------------------------------------------------------------
// FPToFixed
// ---------------------------------------------------------------------------

/// Round `mant * 2^exp` (magnitude; `sign` carried separately) to an
/// `ibits`-wide integer with `fbits` fraction bits, saturating. The work is
/// done in integer arithmetic so every rounding mode is exact.
fn round_and_saturate(
    sign: bool,
    mant: u64,
    exp: i32,
    fbits: u32,
    ibits: u32,
    unsigned: bool,
    rounding: RoundingMode,
    fpsr: &mut u32,
) -> u64 {
    let max: i128 = if unsigned {
        (1i128 << ibits) - 1
    } else {
        (1i128 << (ibits - 1)) - 1
    };
    let min: i128 = if unsigned { 0 } else { -(1i128 << (ibits - 1)) };
    let mask: u64 = if ibits == 64 { !0 } else { (1u64 << ibits) - 1 };

    if mant == 0 {
        return 0;
    }

    let e = exp + fbits as i32;
    let mut inexact = false;

    let int: u128 = if e >= 0 {
        if e > 74 {
            // Far beyond any representable integer.
            *fpsr |= FPSR_IOC;
            return (if sign { min } else { max }) as u64 & mask;
        }
        (mant as u128) << e
    } else {
        let sh = (-e) as u32;
        let (int, round_bit, sticky) = if sh > 117 {
            (0u128, 0u32, true)
        } else {
            let full = mant as u128;
            let int = full >> sh;
            let round_bit = ((full >> (sh - 1)) & 1) as u32;
            let below = if sh >= 2 { full & ((1u128 << (sh - 1)) - 1) } else { 0 };
            (int, round_bit, below != 0)
        };

        let increment = match rounding {
            RoundingMode::ToNearestTieEven => round_bit == 1 && (sticky || int & 1 == 1),
            RoundingMode::TowardsPlusInfinity => !sign && (round_bit == 1 || sticky),
            RoundingMode::TowardsMinusInfinity => sign && (round_bit == 1 || sticky),
            RoundingMode::TowardsZero => false,
            RoundingMode::ToNearestTieAwayFromZero => round_bit == 1,
        };
        if round_bit == 1 || sticky {
            inexact = true;
        }
        if increment { int + 1 } else { int }
    };

    let value: i128 = if sign { -(int as i128) } else { int as i128 };
    if value > max {
        *fpsr |= FPSR_IOC;
        return max as u64 & mask;
    }
    if value < min {
        *fpsr |= FPSR_IOC;
        return min as u64 & mask;
    }
    if inexact {
        *fpsr |= FPSR_IXC;
    }
    value as u64 & mask
}

/// FPToFixed for a single-precision lane: convert to a 32-bit integer with
/// `fbits` fraction bits. NaN converts to 0 and raises IOC; out-of-range
/// values saturate and raise IOC.
pub fn to_fixed32(
    bits: u32,
    fbits: u32,
    unsigned: bool,
    rounding: RoundingMode,
    fpsr: &mut u32,
) -> u32 {
    let sign = bits & F32_SIGN_MASK != 0;
    let exp_raw = (bits >> 23) & 0xFF;
    let frac = bits & F32_MANT_MASK;

    if exp_raw == 0xFF {
        *fpsr |= FPSR_IOC;
        if frac != 0 {
            return 0; // NaN
        }
        return if unsigned {
            if sign { 0 } else { u32::MAX }
        } else if sign {
            0x8000_0000
        } else {
            0x7FFF_FFFF
        };
    }

    let (mant, exp) = if exp_raw == 0 {
        (frac as u64, -126 - 23)
    } else {
        ((frac | (1 << 23)) as u64, exp_raw as i32 - 127 - 23)
    };
    round_and_saturate(sign, mant, exp, fbits, 32, unsigned, rounding, fpsr) as u32
}

/// FPToFixed for a double-precision lane: convert to a 64-bit integer.
pub fn to_fixed64(
    bits: u64,
    fbits: u32,
    unsigned: bool,
    rounding: RoundingMode,
    fpsr: &mut u32,
) -> u64 {
    let sign = bits & F64_SIGN_MASK != 0;
    let exp_raw = ((bits >> 52) & 0x7FF) as u32;
    let frac = bits & F64_MANT_MASK;

    if exp_raw == 0x7FF {
        *fpsr |= FPSR_IOC;
        if frac != 0 {
            return 0;
        }
        return if unsigned {
            if sign { 0 } else { u64::MAX }
        } else if sign {
            0x8000_0000_0000_0000
        } else {
            0x7FFF_FFFF_FFFF_FFFF
        };
    }

    let (mant, exp) = if exp_raw == 0 {
        (frac, -1022 - 52)
    } else {
        (frac | (1 << 52), exp_raw as i32 - 1023 - 52)
    };
    round_and_saturate(sign, mant, exp, fbits, 64, unsigned, rounding, fpsr)
}

// ---------------------------------------------------------------------------
// FPMulAdd
// ---------------------------------------------------------------------------

/// Fused multiply-add `addend + op1 * op2` with ARM NaN rules: a quiet-NaN
/// addend with a {∞, 0} product yields the Default-NaN, as does 0 × ∞.
pub fn mul_add32(addend: u32, op1: u32, op2: u32, fpcr: Fpcr, fpsr: &mut u32) -> u32 {
    let inf_zero = (f32_is_inf(op1) && f32_is_zero(op2)) || (f32_is_zero(op1) && f32_is_inf(op2));

    if f32_is_qnan(addend) && inf_zero {
        *fpsr |= FPSR_IOC;
        return F32_DEFAULT_NAN;
    }
    if let Some(nan) = process_nans3_32(addend, op1, op2) {
        if f32_is_snan(addend) || f32_is_snan(op1) || f32_is_snan(op2) {
            *fpsr |= FPSR_IOC;
        }
        return if fpcr.dn() { F32_DEFAULT_NAN } else { nan };
    }
    if inf_zero {
        *fpsr |= FPSR_IOC;
        return F32_DEFAULT_NAN;
    }

    // Exact product in f64, one rounding into f64, final rounding into f32.
    let result = f64::mul_add(
        f32::from_bits(op1) as f64,
        f32::from_bits(op2) as f64,
        f32::from_bits(addend) as f64,
    ) as f32;
    if result.is_nan() {
        // inf + (-inf)
        *fpsr |= FPSR_IOC;
        return F32_DEFAULT_NAN;
    }
    result.to_bits()
}

pub fn mul_add64(addend: u64, op1: u64, op2: u64, fpcr: Fpcr, fpsr: &mut u32) -> u64 {
    let inf_zero = (f64_is_inf(op1) && f64_is_zero(op2)) || (f64_is_zero(op1) && f64_is_inf(op2));

    if f64_is_qnan(addend) && inf_zero {
        *fpsr |= FPSR_IOC;
        return F64_DEFAULT_NAN;
    }
    if let Some(nan) = process_nans3_64(addend, op1, op2) {
        if f64_is_snan(addend) || f64_is_snan(op1) || f64_is_snan(op2) {
            *fpsr |= FPSR_IOC;
        }
        return if fpcr.dn() { F64_DEFAULT_NAN } else { nan };
    }
    if inf_zero {
        *fpsr |= FPSR_IOC;
        return F64_DEFAULT_NAN;
    }

    let result = f64::mul_add(f64::from_bits(op1), f64::from_bits(op2), f64::from_bits(addend));
    if result.is_nan() {
        *fpsr |= FPSR_IOC;
        return F64_DEFAULT_NAN;
    }
    result.to_bits()
}

// ---------------------------------------------------------------------------
// Reciprocal / reciprocal-square-root estimates and fused steps
// ---------------------------------------------------------------------------

pub fn recip_estimate32(bits: u32, fpcr: Fpcr, fpsr: &mut u32) -> u32 {
    if f32_is_nan(bits) {
        if f32_is_snan(bits) {
            *fpsr |= FPSR_IOC;
        }
        return if fpcr.dn() { F32_DEFAULT_NAN } else { f32_quiet(bits) };
    }
    if f32_is_inf(bits) {
        return bits & F32_SIGN_MASK; // signed zero
    }
    if f32_is_zero(bits) {
        *fpsr |= FPSR_DZC;
        return (bits & F32_SIGN_MASK) | F32_EXP_MASK; // signed infinity
    }
    (1.0f32 / f32::from_bits(bits)).to_bits()
}

pub fn recip_estimate64(bits: u64, fpcr: Fpcr, fpsr: &mut u32) -> u64 {
    if f64_is_nan(bits) {
        if f64_is_snan(bits) {
            *fpsr |= FPSR_IOC;
        }
        return if fpcr.dn() { F64_DEFAULT_NAN } else { f64_quiet(bits) };
    }
    if f64_is_inf(bits) {
        return bits & F64_SIGN_MASK;
    }
    if f64_is_zero(bits) {
        *fpsr |= FPSR_DZC;
        return (bits & F64_SIGN_MASK) | F64_EXP_MASK;
    }
    (1.0f64 / f64::from_bits(bits)).to_bits()
}

/// FPRecipStepFused: `2.0 - op1 * op2`, with `0 × ∞` defined as exactly 2.0.
pub fn recip_step_fused32(op1: u32, op2: u32, fpcr: Fpcr, fpsr: &mut u32) -> u32 {
    if let Some(nan) = process_nans32(op1, op2) {
        if f32_is_snan(op1) || f32_is_snan(op2) {
            *fpsr |= FPSR_IOC;
        }
        return if fpcr.dn() { F32_DEFAULT_NAN } else { nan };
    }
    let zero_inf = (f32_is_zero(op1) && f32_is_inf(op2)) || (f32_is_inf(op1) && f32_is_zero(op2));
    if zero_inf {
        return 2.0f32.to_bits();
    }
    let result = f64::mul_add(
        -(f32::from_bits(op1) as f64),
        f32::from_bits(op2) as f64,
        2.0,
    ) as f32;
    if result.is_nan() {
        *fpsr |= FPSR_IOC;
        return F32_DEFAULT_NAN;
    }
    result.to_bits()
}

pub fn recip_step_fused64(op1: u64, op2: u64, fpcr: Fpcr, fpsr: &mut u32) -> u64 {
    if let Some(nan) = process_nans64(op1, op2) {
        if f64_is_snan(op1) || f64_is_snan(op2) {
            *fpsr |= FPSR_IOC;
        }
        return if fpcr.dn() { F64_DEFAULT_NAN } else { nan };
    }
    let zero_inf = (f64_is_zero(op1) && f64_is_inf(op2)) || (f64_is_inf(op1) && f64_is_zero(op2));
    if zero_inf {
        return 2.0f64.to_bits();
    }
    let result = f64::mul_add(-f64::from_bits(op1), f64::from_bits(op2), 2.0);
    if result.is_nan() {
        *fpsr |= FPSR_IOC;
        return F64_DEFAULT_NAN;
    }
    result.to_bits()
}

pub fn rsqrt_estimate32(bits: u32, fpcr: Fpcr, fpsr: &mut u32) -> u32 {
    if f32_is_nan(bits) {
        if f32_is_snan(bits) {
            *fpsr |= FPSR_IOC;
        }
        return if fpcr.dn() { F32_DEFAULT_NAN } else { f32_quiet(bits) };
    }
    if f32_is_zero(bits) {
        *fpsr |= FPSR_DZC;
        return (bits & F32_SIGN_MASK) | F32_EXP_MASK;
    }
    if bits & F32_SIGN_MASK != 0 {
        // Negative (including -inf): invalid.
        *fpsr |= FPSR_IOC;
        return F32_DEFAULT_NAN;
    }
    if f32_is_inf(bits) {
        return 0;
    }
    (1.0f32 / f32::from_bits(bits).sqrt()).to_bits()
}

pub fn rsqrt_estimate64(bits: u64, fpcr: Fpcr, fpsr: &mut u32) -> u64 {
    if f64_is_nan(bits) {
        if f64_is_snan(bits) {
            *fpsr |= FPSR_IOC;
        }
        return if fpcr.dn() { F64_DEFAULT_NAN } else { f64_quiet(bits) };
    }
    if f64_is_zero(bits) {
        *fpsr |= FPSR_DZC;
        return (bits & F64_SIGN_MASK) | F64_EXP_MASK;
    }
    if bits & F64_SIGN_MASK != 0 {
        *fpsr |= FPSR_IOC;
        return F64_DEFAULT_NAN;
    }
    if f64_is_inf(bits) {
        return 0;
    }
    (1.0f64 / f64::from_bits(bits).sqrt()).to_bits()
}

/// FPRSqrtStepFused: `(3.0 - op1 * op2) / 2.0`, with `0 × ∞` defined as 1.5.
pub fn rsqrt_step_fused32(op1: u32, op2: u32, fpcr: Fpcr, fpsr: &mut u32) -> u32 {
    if let Some(nan) = process_nans32(op1, op2) {
        if f32_is_snan(op1) || f32_is_snan(op2) {
            *fpsr |= FPSR_IOC;
        }
        return if fpcr.dn() { F32_DEFAULT_NAN } else { nan };
    }
    let zero_inf = (f32_is_zero(op1) && f32_is_inf(op2)) || (f32_is_inf(op1) && f32_is_zero(op2));
    if zero_inf {
        return 1.5f32.to_bits();
    }
    let result = (f64::mul_add(
        -(f32::from_bits(op1) as f64),
        f32::from_bits(op2) as f64,
        3.0,
    ) / 2.0) as f32;
    if result.is_nan() {
        *fpsr |= FPSR_IOC;
        return F32_DEFAULT_NAN;
    }
    result.to_bits()
}

pub fn rsqrt_step_fused64(op1: u64, op2: u64, fpcr: Fpcr, fpsr: &mut u32) -> u64 {
    if let Some(nan) = process_nans64(op1, op2) {
        if f64_is_snan(op1) || f64_is_snan(op2) {
            *fpsr |= FPSR_IOC;
        }
        return if fpcr.dn() { F64_DEFAULT_NAN } else { nan };
    }
    let zero_inf = (f64_is_zero(op1) && f64_is_inf(op2)) || (f64_is_inf(op1) && f64_is_zero(op2));
    if zero_inf {
        return 1.5f64.to_bits();
    }
    let result = f64::mul_add(-f64::from_bits(op1), f64::from_bits(op2), 3.0) / 2.0;
    if result.is_nan() {
        *fpsr |= FPSR_IOC;
        return F64_DEFAULT_NAN;
    }
    result.to_bits()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RZ: RoundingMode = RoundingMode::TowardsZero;

    #[test]
    fn test_to_fixed32_basic() {
        let mut fpsr = 0;
        assert_eq!(to_fixed32(1.5f32.to_bits(), 0, false, RZ, &mut fpsr), 1);
        assert_eq!(fpsr & FPSR_IXC, FPSR_IXC);

        let mut fpsr = 0;
        assert_eq!(to_fixed32((-1.5f32).to_bits(), 0, false, RZ, &mut fpsr), -1i32 as u32);
    }

    #[test]
    fn test_to_fixed32_saturates() {
        // 2^31 as f32 is out of range for i32.
        let mut fpsr = 0;
        assert_eq!(to_fixed32(2147483648.0f32.to_bits(), 0, false, RZ, &mut fpsr), 0x7FFF_FFFF);
        assert_eq!(fpsr & FPSR_IOC, FPSR_IOC);

        // -2^31 - 1 rounds (as f32) to exactly -2^31, which fits.
        let mut fpsr = 0;
        assert_eq!(to_fixed32((-2147483649.0f32).to_bits(), 0, false, RZ, &mut fpsr), 0x8000_0000);
        assert_eq!(fpsr & FPSR_IOC, 0);
    }

    #[test]
    fn test_to_fixed32_nan_is_zero_with_ioc() {
        let mut fpsr = 0;
        assert_eq!(to_fixed32(0x7FC0_0000, 0, false, RZ, &mut fpsr), 0);
        assert_eq!(fpsr & FPSR_IOC, FPSR_IOC);
    }

    #[test]
    fn test_to_fixed32_unsigned_clamps_negative() {
        let mut fpsr = 0;
        assert_eq!(to_fixed32((-1.0f32).to_bits(), 0, true, RZ, &mut fpsr), 0);
        assert_eq!(fpsr & FPSR_IOC, FPSR_IOC);
    }

    #[test]
    fn test_to_fixed32_fbits_scaling() {
        // 1.5 with one fraction bit is the fixed-point value 3.
        let mut fpsr = 0;
        assert_eq!(to_fixed32(1.5f32.to_bits(), 1, false, RZ, &mut fpsr), 3);
        assert_eq!(fpsr, 0);
    }

    #[test]
    fn test_to_fixed32_rounding_modes() {
        let bits = 1.5f32.to_bits();
        let mut fpsr = 0;
        assert_eq!(to_fixed32(bits, 0, false, RoundingMode::ToNearestTieEven, &mut fpsr), 2);
        assert_eq!(to_fixed32(bits, 0, false, RoundingMode::TowardsPlusInfinity, &mut fpsr), 2);
        assert_eq!(to_fixed32(bits, 0, false, RoundingMode::TowardsMinusInfinity, &mut fpsr), 1);
        assert_eq!(to_fixed32(bits, 0, false, RoundingMode::ToNearestTieAwayFromZero, &mut fpsr), 2);

        let bits = 2.5f32.to_bits();
        assert_eq!(to_fixed32(bits, 0, false, RoundingMode::ToNearestTieEven, &mut fpsr), 2);
        assert_eq!(to_fixed32(bits, 0, false, RoundingMode::ToNearestTieAwayFromZero, &mut fpsr), 3);

        let bits = (-1.5f32).to_bits();
        assert_eq!(
            to_fixed32(bits, 0, false, RoundingMode::TowardsMinusInfinity, &mut fpsr),
            -2i32 as u32
        );
        assert_eq!(
            to_fixed32(bits, 0, false, RoundingMode::TowardsPlusInfinity, &mut fpsr),
            -1i32 as u32
        );
    }

    #[test]
    fn test_to_fixed64_limits() {
        let mut fpsr = 0;
        // 2^63 as f64 saturates signed 64.
        assert_eq!(
            to_fixed64(9_223_372_036_854_775_808.0f64.to_bits(), 0, false, RZ, &mut fpsr),
            0x7FFF_FFFF_FFFF_FFFF
        );
        assert_eq!(fpsr & FPSR_IOC, FPSR_IOC);

        let mut fpsr = 0;
        assert_eq!(
            to_fixed64((-9_223_372_036_854_775_808.0f64).to_bits(), 0, false, RZ, &mut fpsr),
            0x8000_0000_0000_0000
        );
        assert_eq!(fpsr & FPSR_IOC, 0);
    }

    #[test]
    fn test_mul_add32_fma_nan_corner() {
        // QNaN addend with an inf×0 product gives the Default-NaN.
        let qnan = 0x7FC1_1111;
        let inf = f32::INFINITY.to_bits();
        let zero = 0.0f32.to_bits();
        let mut fpsr = 0;
        assert_eq!(mul_add32(qnan, inf, zero, Fpcr::default(), &mut fpsr), F32_DEFAULT_NAN);
        assert_eq!(fpsr & FPSR_IOC, FPSR_IOC);

        // QNaN addend with an ordinary product propagates the addend.
        let one = 1.0f32.to_bits();
        let mut fpsr = 0;
        assert_eq!(mul_add32(qnan, one, one, Fpcr::default(), &mut fpsr), qnan);
        // Under DN it becomes the Default-NaN instead.
        assert_eq!(mul_add32(qnan, one, one, Fpcr::new(1 << 25), &mut fpsr), F32_DEFAULT_NAN);
    }

    #[test]
    fn test_mul_add32_plain_arithmetic() {
        let mut fpsr = 0;
        let r = mul_add32(
            2.0f32.to_bits(),
            3.0f32.to_bits(),
            4.0f32.to_bits(),
            Fpcr::default(),
            &mut fpsr,
        );
        assert_eq!(f32::from_bits(r), 14.0);
        assert_eq!(fpsr, 0);
    }

    #[test]
    fn test_recip_step_fused_special() {
        let zero = 0.0f32.to_bits();
        let inf = f32::INFINITY.to_bits();
        let mut fpsr = 0;
        let r = recip_step_fused32(zero, inf, Fpcr::default(), &mut fpsr);
        assert_eq!(f32::from_bits(r), 2.0);

        let r = rsqrt_step_fused32(inf, zero, Fpcr::default(), &mut fpsr);
        assert_eq!(f32::from_bits(r), 1.5);
    }

    #[test]
    fn test_recip_estimate_edges() {
        let mut fpsr = 0;
        // 1/∞ = +0, 1/-∞ = -0
        assert_eq!(recip_estimate32(f32::INFINITY.to_bits(), Fpcr::default(), &mut fpsr), 0);
        assert_eq!(
            recip_estimate32(f32::NEG_INFINITY.to_bits(), Fpcr::default(), &mut fpsr),
            0x8000_0000
        );
        // 1/0 = ∞ with DZC
        let r = recip_estimate32(0, Fpcr::default(), &mut fpsr);
        assert!(f32::from_bits(r).is_infinite());
        assert_eq!(fpsr & FPSR_DZC, FPSR_DZC);
    }

    #[test]
    fn test_rsqrt_estimate_negative_is_default_nan() {
        let mut fpsr = 0;
        let r = rsqrt_estimate32((-1.0f32).to_bits(), Fpcr::default(), &mut fpsr);
        assert_eq!(r, F32_DEFAULT_NAN);
        assert_eq!(fpsr & FPSR_IOC, FPSR_IOC);
    }

    proptest! {
        /// Round-trip law: any i32 that survives an exact trip through f32
        /// converts back to itself under round-towards-zero.
        #[test]
        fn prop_s32_to_float_round_trips(value: i32) {
            let as_float = value as f32;
            prop_assume!(as_float as i64 == value as i64);
            let mut fpsr = 0;
            let back = to_fixed32(as_float.to_bits(), 0, false, RZ, &mut fpsr);
            prop_assert_eq!(back as i32, value);
            prop_assert_eq!(fpsr, 0);
        }

        /// Same law at 64 bits through f64.
        #[test]
        fn prop_s64_to_double_round_trips(value: i64) {
            let as_float = value as f64;
            prop_assume!(as_float as i128 == value as i128);
            let mut fpsr = 0;
            let back = to_fixed64(as_float.to_bits(), 0, false, RZ, &mut fpsr);
            prop_assert_eq!(back as i64, value);
            prop_assert_eq!(fpsr, 0);
        }

        /// ToFixed under round-towards-zero agrees with Rust's saturating
        /// float→int cast for ordinary values.
        #[test]
        fn prop_to_fixed32_matches_cast(value: f32) {
            prop_assume!(!value.is_nan());
            let mut fpsr = 0;
            let ours = to_fixed32(value.to_bits(), 0, false, RZ, &mut fpsr) as i32;
            prop_assert_eq!(ours, value as i32);
        }
    }
}

//! Lane conversions between floating-point vectors and integer vectors.
//!
//! Float → fixed-point always dispatches through a lookup table of scalar
//! helpers keyed on `(fbits, rounding)`; the table is the authoritative
//! semantics (NaN → 0 with IOC, saturation with IOC). Integer → float uses
//! native conversions where they exist and magic-number arithmetic where
//! they do not, with AVX-512 fast tiers.

use std::collections::HashMap;
use std::sync::OnceLock;

use iced_x86::code_asm::*;

use crate::backend::x64::block_of_code::CpuFeatures;
use crate::backend::x64::emit_context::EmitContext;
use crate::backend::x64::emit_fp_vector::{
    emit_two_op_fallback, FallbackTwoOp32, FallbackTwoOp64,
};
use crate::backend::x64::nan_fixup::{VectorArray32, VectorArray64};
use crate::backend::x64::reg_alloc::RegAlloc;
use crate::backend::x64::EmitResult;
use crate::fp::op::{to_fixed32, to_fixed64};
use crate::fp::rounding::RoundingMode;
use crate::ir::inst::Inst;
use crate::ir::value::InstRef;

// ---------------------------------------------------------------------------
// FPVectorToSignedFixed / FPVectorToUnsignedFixed
// ---------------------------------------------------------------------------

unsafe extern "C" fn to_fixed_lanes32<const FBITS: u32, const ROUNDING: u8, const UNSIGNED: bool>(
    result: *mut VectorArray32,
    input: *const VectorArray32,
    _fpcr: u32,
    fpsr: *mut u32,
) {
    let result = &mut *result;
    let input = &*input;
    let rounding = RoundingMode::from_u8(ROUNDING);
    let mut flags = 0;
    for i in 0..4 {
        result[i] = to_fixed32(input[i], FBITS, UNSIGNED, rounding, &mut flags);
    }
    *fpsr |= flags;
}

unsafe extern "C" fn to_fixed_lanes64<const FBITS: u32, const ROUNDING: u8, const UNSIGNED: bool>(
    result: *mut VectorArray64,
    input: *const VectorArray64,
    _fpcr: u32,
    fpsr: *mut u32,
) {
    let result = &mut *result;
    let input = &*input;
    let rounding = RoundingMode::from_u8(ROUNDING);
    let mut flags = 0;
    for i in 0..2 {
        result[i] = to_fixed64(input[i], FBITS, UNSIGNED, rounding, &mut flags);
    }
    *fpsr |= flags;
}

macro_rules! fill_to_fixed32 {
    ($map:ident, $unsigned:literal, $($fb:literal),* $(,)?) => {
        $(
            $map.insert(($fb as u32, RoundingMode::ToNearestTieEven),
                to_fixed_lanes32::<$fb, 0, $unsigned> as FallbackTwoOp32);
            $map.insert(($fb as u32, RoundingMode::TowardsPlusInfinity),
                to_fixed_lanes32::<$fb, 1, $unsigned> as FallbackTwoOp32);
            $map.insert(($fb as u32, RoundingMode::TowardsMinusInfinity),
                to_fixed_lanes32::<$fb, 2, $unsigned> as FallbackTwoOp32);
            $map.insert(($fb as u32, RoundingMode::TowardsZero),
                to_fixed_lanes32::<$fb, 3, $unsigned> as FallbackTwoOp32);
            $map.insert(($fb as u32, RoundingMode::ToNearestTieAwayFromZero),
                to_fixed_lanes32::<$fb, 4, $unsigned> as FallbackTwoOp32);
        )*
    };
}

macro_rules! fill_to_fixed64 {
    ($map:ident, $unsigned:literal, $($fb:literal),* $(,)?) => {
        $(
            $map.insert(($fb as u32, RoundingMode::ToNearestTieEven),
                to_fixed_lanes64::<$fb, 0, $unsigned> as FallbackTwoOp64);
            $map.insert(($fb as u32, RoundingMode::TowardsPlusInfinity),
                to_fixed_lanes64::<$fb, 1, $unsigned> as FallbackTwoOp64);
            $map.insert(($fb as u32, RoundingMode::TowardsMinusInfinity),
                to_fixed_lanes64::<$fb, 2, $unsigned> as FallbackTwoOp64);
            $map.insert(($fb as u32, RoundingMode::TowardsZero),
                to_fixed_lanes64::<$fb, 3, $unsigned> as FallbackTwoOp64);
            $map.insert(($fb as u32, RoundingMode::ToNearestTieAwayFromZero),
                to_fixed_lanes64::<$fb, 4, $unsigned> as FallbackTwoOp64);
        )*
    };
}

type Lut32 = HashMap<(u32, RoundingMode), FallbackTwoOp32>;
type Lut64 = HashMap<(u32, RoundingMode), FallbackTwoOp64>;

/// The `(fbits, rounding)` fallback table for 32-bit lanes. Built once per
/// signedness over the full cartesian product; a missing key is a
/// programming error.
fn to_fixed_lut32(unsigned: bool) -> &'static Lut32 {
    static SIGNED: OnceLock<Lut32> = OnceLock::new();
    static UNSIGNED: OnceLock<Lut32> = OnceLock::new();

    if unsigned {
        UNSIGNED.get_or_init(|| {
            let mut map = Lut32::new();
            fill_to_fixed32!(map, true,
                0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
                16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31,
            );
            map
        })
    } else {
        SIGNED.get_or_init(|| {
            let mut map = Lut32::new();
            fill_to_fixed32!(map, false,
                0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
                16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31,
            );
            map
        })
    }
}

fn to_fixed_lut64(unsigned: bool) -> &'static Lut64 {
    static SIGNED: OnceLock<Lut64> = OnceLock::new();
    static UNSIGNED: OnceLock<Lut64> = OnceLock::new();

    if unsigned {
        UNSIGNED.get_or_init(|| {
            let mut map = Lut64::new();
            fill_to_fixed64!(map, true,
                0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
                16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31,
                32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47,
                48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63,
            );
            map
        })
    } else {
        SIGNED.get_or_init(|| {
            let mut map = Lut64::new();
            fill_to_fixed64!(map, false,
                0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
                16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31,
                32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47,
                48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63,
            );
            map
        })
    }
}

fn to_fixed_key(inst: &Inst) -> (u32, RoundingMode) {
    let fbits = inst.arg(1).get_u8() as u32;
    let rounding = RoundingMode::from_u8(inst.arg(2).get_u8());
    (fbits, rounding)
}

fn emit_to_fixed32(
    ctx: &EmitContext,
    ra: &mut RegAlloc,
    inst_ref: InstRef,
    inst: &Inst,
    unsigned: bool,
) -> EmitResult {
    let key = to_fixed_key(inst);
    let func = *to_fixed_lut32(unsigned)
        .get(&key)
        .unwrap_or_else(|| panic!("no ToFixed fallback for {:?}", key));
    emit_two_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

fn emit_to_fixed64(
    ctx: &EmitContext,
    ra: &mut RegAlloc,
    inst_ref: InstRef,
    inst: &Inst,
    unsigned: bool,
) -> EmitResult {
    let key = to_fixed_key(inst);
    let func = *to_fixed_lut64(unsigned)
        .get(&key)
        .unwrap_or_else(|| panic!("no ToFixed fallback for {:?}", key));
    emit_two_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

pub fn emit_fp_vector_to_signed_fixed32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_to_fixed32(ctx, ra, inst_ref, inst, false)
}

pub fn emit_fp_vector_to_signed_fixed64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_to_fixed64(ctx, ra, inst_ref, inst, false)
}

pub fn emit_fp_vector_to_unsigned_fixed32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_to_fixed32(ctx, ra, inst_ref, inst, true)
}

pub fn emit_fp_vector_to_unsigned_fixed64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_to_fixed64(ctx, ra, inst_ref, inst, true)
}

// ---------------------------------------------------------------------------
// Integer → float
// ---------------------------------------------------------------------------

fn mconst_load(ra: &mut RegAlloc, lower: u64, upper: u64) -> Result<AsmRegisterXmm, iced_x86::IcedError> {
    let tmp = ra.scratch_xmm();
    let constant = ra.code.mconst(lower, upper);
    ra.code.asm.movups(tmp, constant)?;
    Ok(tmp)
}

pub fn emit_fp_vector_s32_to_single(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let xmm = ra.use_scratch_xmm(&mut args[0]);
    ra.code.asm.cvtdq2ps(xmm, xmm)?;
    ra.define_value(inst_ref, xmm);
    Ok(())
}

pub fn emit_fp_vector_s64_to_double(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let xmm = ra.use_scratch_xmm(&mut args[0]);

    if ra.code.does_cpu_support(CpuFeatures::AVX512VL | CpuFeatures::AVX512DQ) {
        ra.code.asm.vcvtqq2pd(xmm, xmm)?;
    } else if ra.code.does_cpu_support(CpuFeatures::SSE41) {
        let xmm_tmp = ra.scratch_xmm();
        let tmp = ra.scratch_gpr();

        // First quadword
        ra.code.asm.movq(tmp, xmm)?;
        ra.code.asm.cvtsi2sd(xmm, tmp)?;

        // Second quadword
        ra.code.asm.pextrq(tmp, xmm, 1)?;
        ra.code.asm.cvtsi2sd(xmm_tmp, tmp)?;

        // Combine
        ra.code.asm.unpcklpd(xmm, xmm_tmp)?;
    } else {
        let high_xmm = ra.scratch_xmm();
        let xmm_tmp = ra.scratch_xmm();
        let tmp = ra.scratch_gpr();

        // First quadword
        ra.code.asm.movhlps(high_xmm, xmm)?;
        ra.code.asm.movq(tmp, xmm)?;
        ra.code.asm.cvtsi2sd(xmm, tmp)?;

        // Second quadword
        ra.code.asm.movq(tmp, high_xmm)?;
        ra.code.asm.cvtsi2sd(xmm_tmp, tmp)?;

        // Combine
        ra.code.asm.unpcklpd(xmm, xmm_tmp)?;
    }

    ra.define_value(inst_ref, xmm);
    Ok(())
}

/// Unsigned 32-bit lanes to single precision via magic exponents: the low
/// and high 16-bit halves get exponents 2^23 and 2^39 attached, the combined
/// bias is cancelled with one subtraction and the halves are re-added.
pub fn emit_fp_vector_u32_to_single(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let xmm = ra.use_scratch_xmm(&mut args[0]);

    if ra.code.does_cpu_support(CpuFeatures::AVX512DQ | CpuFeatures::AVX512VL) {
        ra.code.asm.vcvtudq2ps(xmm, xmm)?;
    } else {
        let mem_4b000000 = mconst_load(ra, 0x4B00_0000_4B00_0000, 0x4B00_0000_4B00_0000)?;
        let mem_53000000 = mconst_load(ra, 0x5300_0000_5300_0000, 0x5300_0000_5300_0000)?;
        let mem_d3000080 = mconst_load(ra, 0xD300_0080_D300_0080, 0xD300_0080_D300_0080)?;

        if ra.code.does_cpu_support(CpuFeatures::AVX) {
            let tmp = ra.scratch_xmm();
            ra.code.asm.vpblendw(tmp, xmm, mem_4b000000, 0b1010_1010)?;
            ra.code.asm.vpsrld(xmm, xmm, 16)?;
            ra.code.asm.vpblendw(xmm, xmm, mem_53000000, 0b1010_1010)?;
            ra.code.asm.vaddps(xmm, xmm, mem_d3000080)?;
            ra.code.asm.vaddps(xmm, tmp, xmm)?;
        } else {
            let mask = mconst_load(ra, 0x0000_FFFF_0000_FFFF, 0x0000_FFFF_0000_FFFF)?;
            ra.code.asm.pand(mask, xmm)?;
            ra.code.asm.por(mask, mem_4b000000)?;
            ra.code.asm.psrld(xmm, 16)?;
            ra.code.asm.por(xmm, mem_53000000)?;
            ra.code.asm.addps(xmm, mem_d3000080)?;
            ra.code.asm.addps(xmm, mask)?;
        }
    }

    if ctx.fpscr_rmode() == RoundingMode::TowardsMinusInfinity {
        let sign_clear = mconst_load(ra, 0x7FFF_FFFF_7FFF_FFFF, 0x7FFF_FFFF_7FFF_FFFF)?;
        ra.code.asm.pand(xmm, sign_clear)?;
    }

    ra.define_value(inst_ref, xmm);
    Ok(())
}

/// Unsigned 64-bit lanes to double precision: interleave each lane's 32-bit
/// halves with the magic exponents 2^52 and 2^84, subtract the combined bias
/// and sum.
pub fn emit_fp_vector_u64_to_double(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let xmm = ra.use_scratch_xmm(&mut args[0]);

    if ra.code.does_cpu_support(CpuFeatures::AVX512DQ | CpuFeatures::AVX512VL) {
        ra.code.asm.vcvtuqq2pd(xmm, xmm)?;
    } else {
        let unpack_reg = mconst_load(ra, 0x4530_0000_4330_0000, 0)?;
        let subtrahend_reg = mconst_load(ra, 0x4330_0000_0000_0000, 0x4530_0000_0000_0000)?;
        let tmp1 = ra.scratch_xmm();

        if ra.code.does_cpu_support(CpuFeatures::AVX) {
            ra.code.asm.vunpcklps(tmp1, xmm, unpack_reg)?;
            ra.code.asm.vsubpd(tmp1, tmp1, subtrahend_reg)?;

            ra.code.asm.vpermilps(xmm, xmm, 0b0100_1110)?;

            ra.code.asm.vunpcklps(xmm, xmm, unpack_reg)?;
            ra.code.asm.vsubpd(xmm, xmm, subtrahend_reg)?;

            ra.code.asm.vhaddpd(xmm, tmp1, xmm)?;
        } else {
            let tmp2 = ra.scratch_xmm();

            ra.code.asm.pshufd(tmp1, xmm, 0b0100_1110)?;

            ra.code.asm.punpckldq(xmm, unpack_reg)?;
            ra.code.asm.subpd(xmm, subtrahend_reg)?;
            ra.code.asm.pshufd(tmp2, xmm, 0b0100_1110)?;
            ra.code.asm.addpd(xmm, tmp2)?;

            ra.code.asm.punpckldq(tmp1, unpack_reg)?;
            ra.code.asm.subpd(tmp1, subtrahend_reg)?;

            ra.code.asm.pshufd(tmp2, tmp1, 0b0100_1110)?;
            ra.code.asm.addpd(tmp2, tmp1)?;

            ra.code.asm.unpcklpd(xmm, tmp2)?;
        }
    }

    if ctx.fpscr_rmode() == RoundingMode::TowardsMinusInfinity {
        let sign_clear = mconst_load(ra, 0x7FFF_FFFF_FFFF_FFFF, 0x7FFF_FFFF_FFFF_FFFF)?;
        ra.code.asm.pand(xmm, sign_clear)?;
    }

    ra.define_value(inst_ref, xmm);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lut_covers_full_cartesian_product() {
        assert_eq!(to_fixed_lut32(false).len(), 32 * 5);
        assert_eq!(to_fixed_lut32(true).len(), 32 * 5);
        assert_eq!(to_fixed_lut64(false).len(), 64 * 5);
        assert_eq!(to_fixed_lut64(true).len(), 64 * 5);
    }

    #[test]
    fn test_lut_fallback_semantics() {
        // Boundary scenario: [2^31, -2^31-1, NaN, 1.5], towards-zero, fbits 0.
        let func = *to_fixed_lut32(false)
            .get(&(0, RoundingMode::TowardsZero))
            .unwrap();
        let input: VectorArray32 = [
            2147483648.0f32.to_bits(),
            (-2147483649.0f32).to_bits(),
            0x7FC0_0000,
            1.5f32.to_bits(),
        ];
        let mut result = [0u32; 4];
        let mut fpsr = 0u32;
        unsafe { func(&mut result, &input, 0, &mut fpsr) };
        assert_eq!(result, [0x7FFF_FFFF, 0x8000_0000, 0, 1]);
        assert_eq!(fpsr & crate::fp::FPSR_IOC, crate::fp::FPSR_IOC);
    }

    #[test]
    fn test_lut_scaled_fbits() {
        let func = *to_fixed_lut32(false)
            .get(&(8, RoundingMode::ToNearestTieEven))
            .unwrap();
        let input: VectorArray32 = [1.0f32.to_bits(), 0, 0, 0];
        let mut result = [0u32; 4];
        let mut fpsr = 0u32;
        unsafe { func(&mut result, &input, 0, &mut fpsr) };
        assert_eq!(result[0], 256);
    }
}

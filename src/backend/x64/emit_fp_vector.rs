//! x86-64 emission of the floating-point vector IR opcodes.
//!
//! Every opcode picks a tier based on host features and the accuracy the
//! block's FPSCR demands:
//!  - native SSE/AVX when the host's NaN behavior is acceptable or Default-NaN
//!    mode rewrites all NaNs anyway;
//!  - native plus a cold fix-up call when NaN propagation must match the
//!    architecture bit-for-bit;
//!  - a scalar per-lane helper when no exact SIMD sequence exists.

use iced_x86::code_asm::*;
use iced_x86::IcedError;

use crate::backend::x64::abi;
use crate::backend::x64::block_of_code::CpuFeatures;
use crate::backend::x64::emit_context::EmitContext;
use crate::backend::x64::hostloc::{HostLoc, IntoHostLoc};
use crate::backend::x64::jit_state::A32JitState;
use crate::backend::x64::nan_fixup::*;
use crate::backend::x64::reg_alloc::RegAlloc;
use crate::backend::x64::EmitResult;
use crate::fp::op;
use crate::fp::Fpcr;
use crate::ir::inst::Inst;
use crate::ir::value::InstRef;

/// Lane precision of an FP vector opcode. The set is closed: every
/// precision-dependent instruction choice dispatches through here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prec {
    F32,
    F64,
}

impl Prec {
    pub fn default_nan_const(self) -> (u64, u64) {
        match self {
            Prec::F32 => (0x7FC0_0000_7FC0_0000, 0x7FC0_0000_7FC0_0000),
            Prec::F64 => (0x7FF8_0000_0000_0000, 0x7FF8_0000_0000_0000),
        }
    }

    pub fn cmpordp(self, asm: &mut CodeAssembler, a: AsmRegisterXmm, b: AsmRegisterXmm) -> Result<(), IcedError> {
        match self {
            Prec::F32 => asm.cmpordps(a, b),
            Prec::F64 => asm.cmpordpd(a, b),
        }
    }

    pub fn cmpunordp(self, asm: &mut CodeAssembler, a: AsmRegisterXmm, b: AsmRegisterXmm) -> Result<(), IcedError> {
        match self {
            Prec::F32 => asm.cmpunordps(a, b),
            Prec::F64 => asm.cmpunordpd(a, b),
        }
    }

    pub fn cmpneqp(self, asm: &mut CodeAssembler, a: AsmRegisterXmm, b: AsmRegisterXmm) -> Result<(), IcedError> {
        match self {
            Prec::F32 => asm.cmpneqps(a, b),
            Prec::F64 => asm.cmpneqpd(a, b),
        }
    }

    pub fn maxp(self, asm: &mut CodeAssembler, a: AsmRegisterXmm, b: AsmRegisterXmm) -> Result<(), IcedError> {
        match self {
            Prec::F32 => asm.maxps(a, b),
            Prec::F64 => asm.maxpd(a, b),
        }
    }

    pub fn minp(self, asm: &mut CodeAssembler, a: AsmRegisterXmm, b: AsmRegisterXmm) -> Result<(), IcedError> {
        match self {
            Prec::F32 => asm.minps(a, b),
            Prec::F64 => asm.minpd(a, b),
        }
    }

    pub fn vcmpeqp(self, asm: &mut CodeAssembler, d: AsmRegisterXmm, a: AsmRegisterXmm, b: AsmRegisterXmm) -> Result<(), IcedError> {
        match self {
            Prec::F32 => asm.vcmpeqps(d, a, b),
            Prec::F64 => asm.vcmpeqpd(d, a, b),
        }
    }

    pub fn vandp(self, asm: &mut CodeAssembler, d: AsmRegisterXmm, a: AsmRegisterXmm, b: AsmRegisterXmm) -> Result<(), IcedError> {
        match self {
            Prec::F32 => asm.vandps(d, a, b),
            Prec::F64 => asm.vandpd(d, a, b),
        }
    }

    pub fn vorp(self, asm: &mut CodeAssembler, d: AsmRegisterXmm, a: AsmRegisterXmm, b: AsmRegisterXmm) -> Result<(), IcedError> {
        match self {
            Prec::F32 => asm.vorps(d, a, b),
            Prec::F64 => asm.vorpd(d, a, b),
        }
    }

    pub fn vmaxp(self, asm: &mut CodeAssembler, d: AsmRegisterXmm, a: AsmRegisterXmm, b: AsmRegisterXmm) -> Result<(), IcedError> {
        match self {
            Prec::F32 => asm.vmaxps(d, a, b),
            Prec::F64 => asm.vmaxpd(d, a, b),
        }
    }

    pub fn vminp(self, asm: &mut CodeAssembler, d: AsmRegisterXmm, a: AsmRegisterXmm, b: AsmRegisterXmm) -> Result<(), IcedError> {
        match self {
            Prec::F32 => asm.vminps(d, a, b),
            Prec::F64 => asm.vminpd(d, a, b),
        }
    }

    pub fn vblendvp(self, asm: &mut CodeAssembler, d: AsmRegisterXmm, a: AsmRegisterXmm, b: AsmRegisterXmm, mask: AsmRegisterXmm) -> Result<(), IcedError> {
        match self {
            Prec::F32 => asm.vblendvps(d, a, b, mask),
            Prec::F64 => asm.vblendvpd(d, a, b, mask),
        }
    }
}

/// Load a 128-bit constant into a scratch register. Pool slots are not
/// alignment-guaranteed, hence movups.
fn mconst_load(ra: &mut RegAlloc, lower: u64, upper: u64) -> Result<AsmRegisterXmm, IcedError> {
    let tmp = ra.scratch_xmm();
    let constant = ra.code.mconst(lower, upper);
    ra.code.asm.movups(tmp, constant)?;
    Ok(tmp)
}

// ---------------------------------------------------------------------------
// Fallback helper signatures
// ---------------------------------------------------------------------------

pub(crate) type FallbackTwoOp32 =
    unsafe extern "C" fn(*mut VectorArray32, *const VectorArray32, u32, *mut u32);
pub(crate) type FallbackTwoOp64 =
    unsafe extern "C" fn(*mut VectorArray64, *const VectorArray64, u32, *mut u32);
pub(crate) type FallbackThreeOp32 = unsafe extern "C" fn(
    *mut VectorArray32,
    *const VectorArray32,
    *const VectorArray32,
    u32,
    *mut u32,
);
pub(crate) type FallbackThreeOp64 = unsafe extern "C" fn(
    *mut VectorArray64,
    *const VectorArray64,
    *const VectorArray64,
    u32,
    *mut u32,
);
pub(crate) type FallbackFourOp32 = unsafe extern "C" fn(
    *mut VectorArray32,
    *const VectorArray32,
    *const VectorArray32,
    *const VectorArray32,
    u32,
    *mut u32,
);
pub(crate) type FallbackFourOp64 = unsafe extern "C" fn(
    *mut VectorArray64,
    *const VectorArray64,
    *const VectorArray64,
    *const VectorArray64,
    u32,
    *mut u32,
);

// ---------------------------------------------------------------------------
// NaN mask test + cold fix-up call
// ---------------------------------------------------------------------------

/// Test `nan_mask`; if any lane observed a NaN, branch to cold code that
/// spills `xmms` (result first) to the stack, calls `nan_handler` with a
/// pointer to the array block, reloads the result and branches back.
fn handle_nans(
    ra: &mut RegAlloc,
    xmms: &[AsmRegisterXmm],
    nan_mask: AsmRegisterXmm,
    nan_handler: usize,
) -> EmitResult {
    if ra.code.does_cpu_support(CpuFeatures::SSE41) {
        ra.code.asm.ptest(nan_mask, nan_mask)?;
    } else {
        let bitmask = ra.scratch_gpr().hostloc().to_reg32();
        ra.code.asm.movmskps(bitmask, nan_mask)?;
        ra.code.asm.test(bitmask, bitmask)?;
    }

    let nan = ra.code.asm.create_label();
    let mut end = ra.code.asm.create_label();

    ra.code.asm.jnz(nan)?;
    ra.code.asm.set_label(&mut end)?;

    let result = xmms[0];
    let saved: Vec<AsmRegisterXmm> = xmms.to_vec();
    let shadow = abi::ABI_SHADOW_SPACE;
    let param1 = abi::ABI_PARAMS[0].to_reg64();

    ra.code.far_code(move |asm| {
        let mut nan = nan;
        asm.set_label(&mut nan)?;

        // Keep the stack 16-byte aligned at the call: 8 bytes of padding
        // plus an odd number of GPR pushes.
        asm.sub(rsp, 8)?;
        abi::push_caller_save_except(asm, Some(result))?;

        let stack_space = saved.len() * 16;
        asm.sub(rsp, (stack_space + shadow) as i32)?;
        for (i, &reg) in saved.iter().enumerate() {
            asm.movaps(xmmword_ptr(rsp + (shadow + i * 16) as i32), reg)?;
        }
        asm.lea(param1, qword_ptr(rsp + shadow as i32))?;

        asm.mov(rax, nan_handler as u64)?;
        asm.call(rax)?;

        asm.movaps(result, xmmword_ptr(rsp + shadow as i32))?;
        asm.add(rsp, (stack_space + shadow) as i32)?;
        abi::pop_caller_save_except(asm, Some(result))?;
        asm.add(rsp, 8)?;
        asm.jmp(end)?;
        Ok(())
    });

    Ok(())
}

// ---------------------------------------------------------------------------
// Generic two-tier emission for 2- and 3-operand vector ops
// ---------------------------------------------------------------------------

/// Emit a two-operand vector op (`result = op(a, b)`).
///
/// Fast path when host NaN behavior is acceptable (optionally followed by
/// the Default-NaN rewrite); otherwise the accurate path computes a
/// `cmpunord` mask over inputs and output and patches NaN lanes in cold code.
pub(crate) fn emit_three_op_vector_operation<'a, F>(
    ctx: &EmitContext,
    ra: &mut RegAlloc<'a>,
    inst_ref: InstRef,
    inst: &Inst,
    prec: Prec,
    nan_handler: usize,
    op: F,
) -> EmitResult
where
    F: FnOnce(&mut RegAlloc<'a>, AsmRegisterXmm, AsmRegisterXmm) -> EmitResult,
{
    if !ctx.accurate_nan() || ctx.fpscr_dn() {
        let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
        let xmm_a = ra.use_scratch_xmm(&mut args[0]);
        let xmm_b = ra.use_xmm(&mut args[1]);

        op(ra, xmm_a, xmm_b)?;

        if ctx.fpscr_dn() {
            emit_default_nan_fixup(ra, prec, xmm_a)?;
        }

        ra.define_value(inst_ref, xmm_a);
        return Ok(());
    }

    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());

    let result = ra.scratch_xmm();
    let xmm_a = ra.use_xmm(&mut args[0]);
    let xmm_b = ra.use_xmm(&mut args[1]);
    let nan_mask = ra.scratch_xmm();

    ra.code.asm.movaps(nan_mask, xmm_b)?;
    ra.code.asm.movaps(result, xmm_a)?;
    prec.cmpunordp(&mut ra.code.asm, nan_mask, xmm_a)?;
    op(ra, result, xmm_b)?;
    prec.cmpunordp(&mut ra.code.asm, nan_mask, result)?;

    handle_nans(ra, &[result, xmm_a, xmm_b], nan_mask, nan_handler)?;

    ra.define_value(inst_ref, result);
    Ok(())
}

/// Emit a three-operand vector op (`result = op(a, b, c)`, with `a` doubling
/// as the result register in the fused-multiply-add style).
pub(crate) fn emit_four_op_vector_operation<'a, F>(
    ctx: &EmitContext,
    ra: &mut RegAlloc<'a>,
    inst_ref: InstRef,
    inst: &Inst,
    prec: Prec,
    nan_handler: usize,
    op: F,
) -> EmitResult
where
    F: FnOnce(&mut RegAlloc<'a>, AsmRegisterXmm, AsmRegisterXmm, AsmRegisterXmm) -> EmitResult,
{
    if !ctx.accurate_nan() || ctx.fpscr_dn() {
        let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
        let xmm_a = ra.use_scratch_xmm(&mut args[0]);
        let xmm_b = ra.use_xmm(&mut args[1]);
        let xmm_c = ra.use_xmm(&mut args[2]);

        op(ra, xmm_a, xmm_b, xmm_c)?;

        if ctx.fpscr_dn() {
            emit_default_nan_fixup(ra, prec, xmm_a)?;
        }

        ra.define_value(inst_ref, xmm_a);
        return Ok(());
    }

    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());

    let result = ra.scratch_xmm();
    let xmm_a = ra.use_xmm(&mut args[0]);
    let xmm_b = ra.use_xmm(&mut args[1]);
    let xmm_c = ra.use_xmm(&mut args[2]);
    let nan_mask = ra.scratch_xmm();

    ra.code.asm.movaps(nan_mask, xmm_b)?;
    ra.code.asm.movaps(result, xmm_a)?;
    prec.cmpunordp(&mut ra.code.asm, nan_mask, xmm_a)?;
    prec.cmpunordp(&mut ra.code.asm, nan_mask, xmm_c)?;
    op(ra, result, xmm_b, xmm_c)?;
    prec.cmpunordp(&mut ra.code.asm, nan_mask, result)?;

    handle_nans(ra, &[result, xmm_a, xmm_b, xmm_c], nan_mask, nan_handler)?;

    ra.define_value(inst_ref, result);
    Ok(())
}

/// The Default-NaN rewrite: `ord = cmpord(a, a)`, keep ordered lanes of `a`,
/// and merge the architectural Default-NaN into the rest.
fn emit_default_nan_fixup(ra: &mut RegAlloc, prec: Prec, xmm_a: AsmRegisterXmm) -> EmitResult {
    let nan_mask = ra.scratch_xmm();
    let tmp = ra.scratch_xmm();
    ra.code.asm.pcmpeqw(tmp, tmp)?;
    ra.code.asm.movaps(nan_mask, xmm_a)?;
    prec.cmpordp(&mut ra.code.asm, nan_mask, nan_mask)?;
    ra.code.asm.andps(xmm_a, nan_mask)?;
    ra.code.asm.xorps(nan_mask, tmp)?;
    let (lower, upper) = prec.default_nan_const();
    let constant = ra.code.mconst(lower, upper);
    ra.code.asm.movups(tmp, constant)?;
    ra.code.asm.andps(nan_mask, tmp)?;
    ra.code.asm.orps(xmm_a, nan_mask)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Scalar per-lane fallbacks: spill operands, call, reload
// ---------------------------------------------------------------------------

/// One-input scalar fallback:
/// `fn(result, arg1, fpcr, &mut fpsr)` over lane arrays.
pub(crate) fn emit_two_op_fallback(
    ctx: &EmitContext,
    ra: &mut RegAlloc,
    inst_ref: InstRef,
    inst: &Inst,
    func: usize,
) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let arg1 = ra.use_xmm(&mut args[0]);
    ra.host_call(None, &mut [None, None, None, None]);

    let shadow = abi::ABI_SHADOW_SPACE;
    let stack_space = 2 * 16;
    ra.alloc_stack_space(stack_space + shadow);

    let asm = &mut ra.code.asm;
    asm.movaps(xmmword_ptr(rsp + (shadow + 16) as i32), arg1)?;
    asm.lea(abi::ABI_PARAMS[0].to_reg64(), qword_ptr(rsp + shadow as i32))?;
    asm.lea(abi::ABI_PARAMS[1].to_reg64(), qword_ptr(rsp + (shadow + 16) as i32))?;
    asm.mov(abi::ABI_PARAMS[2].to_reg32(), ctx.fpcr().bits())?;
    asm.lea(
        abi::ABI_PARAMS[3].to_reg64(),
        qword_ptr(r15 + A32JitState::offset_of_fpsr_exc() as i32),
    )?;

    ra.code.call_function(func)?;

    let result = HostLoc::Xmm(0);
    ra.code.asm.movaps(result.to_xmm(), xmmword_ptr(rsp + shadow as i32))?;

    ra.release_stack_space(stack_space + shadow);
    ra.define_value(inst_ref, result);
    Ok(())
}

/// Two-input scalar fallback:
/// `fn(result, arg1, arg2, fpcr, &mut fpsr)` over lane arrays.
#[cfg(not(windows))]
pub(crate) fn emit_three_op_fallback(
    ctx: &EmitContext,
    ra: &mut RegAlloc,
    inst_ref: InstRef,
    inst: &Inst,
    func: usize,
) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let arg1 = ra.use_xmm(&mut args[0]);
    let arg2 = ra.use_xmm(&mut args[1]);
    ra.host_call(None, &mut [None, None, None, None]);

    let stack_space = 3 * 16;
    ra.alloc_stack_space(stack_space);

    let asm = &mut ra.code.asm;
    asm.movaps(xmmword_ptr(rsp + 16), arg1)?;
    asm.movaps(xmmword_ptr(rsp + 32), arg2)?;
    asm.lea(abi::ABI_PARAMS[0].to_reg64(), qword_ptr(rsp))?;
    asm.lea(abi::ABI_PARAMS[1].to_reg64(), qword_ptr(rsp + 16))?;
    asm.lea(abi::ABI_PARAMS[2].to_reg64(), qword_ptr(rsp + 32))?;
    asm.mov(abi::ABI_PARAMS[3].to_reg32(), ctx.fpcr().bits())?;
    asm.lea(
        abi::ABI_PARAMS[4].to_reg64(),
        qword_ptr(r15 + A32JitState::offset_of_fpsr_exc() as i32),
    )?;

    ra.code.call_function(func)?;

    let result = HostLoc::Xmm(0);
    ra.code.asm.movaps(result.to_xmm(), xmmword_ptr(rsp))?;

    ra.release_stack_space(stack_space);
    ra.define_value(inst_ref, result);
    Ok(())
}

#[cfg(windows)]
pub(crate) fn emit_three_op_fallback(
    ctx: &EmitContext,
    ra: &mut RegAlloc,
    inst_ref: InstRef,
    inst: &Inst,
    func: usize,
) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let arg1 = ra.use_xmm(&mut args[0]);
    let arg2 = ra.use_xmm(&mut args[1]);
    ra.host_call(None, &mut [None, None, None, None]);

    let shadow = abi::ABI_SHADOW_SPACE;
    let stack_space = 4 * 16;
    ra.alloc_stack_space(stack_space + shadow);

    let asm = &mut ra.code.asm;
    asm.movaps(xmmword_ptr(rsp + (shadow + 32) as i32), arg1)?;
    asm.movaps(xmmword_ptr(rsp + (shadow + 48) as i32), arg2)?;
    asm.lea(abi::ABI_PARAMS[0].to_reg64(), qword_ptr(rsp + (shadow + 16) as i32))?;
    asm.lea(abi::ABI_PARAMS[1].to_reg64(), qword_ptr(rsp + (shadow + 32) as i32))?;
    asm.lea(abi::ABI_PARAMS[2].to_reg64(), qword_ptr(rsp + (shadow + 48) as i32))?;
    asm.mov(abi::ABI_PARAMS[3].to_reg32(), ctx.fpcr().bits())?;
    // Fifth parameter goes on the stack, above the shadow space.
    asm.lea(rax, qword_ptr(r15 + A32JitState::offset_of_fpsr_exc() as i32))?;
    asm.mov(qword_ptr(rsp + 32), rax)?;

    ra.code.call_function(func)?;

    let result = HostLoc::Xmm(0);
    ra.code.asm.movaps(result.to_xmm(), xmmword_ptr(rsp + (shadow + 16) as i32))?;

    ra.release_stack_space(stack_space + shadow);
    ra.define_value(inst_ref, result);
    Ok(())
}

/// Three-input scalar fallback:
/// `fn(result, arg1, arg2, arg3, fpcr, &mut fpsr)` over lane arrays.
#[cfg(not(windows))]
pub(crate) fn emit_four_op_fallback(
    ctx: &EmitContext,
    ra: &mut RegAlloc,
    inst_ref: InstRef,
    inst: &Inst,
    func: usize,
) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let arg1 = ra.use_xmm(&mut args[0]);
    let arg2 = ra.use_xmm(&mut args[1]);
    let arg3 = ra.use_xmm(&mut args[2]);
    ra.host_call(None, &mut [None, None, None, None]);

    let stack_space = 4 * 16;
    ra.alloc_stack_space(stack_space);

    let asm = &mut ra.code.asm;
    asm.movaps(xmmword_ptr(rsp + 16), arg1)?;
    asm.movaps(xmmword_ptr(rsp + 32), arg2)?;
    asm.movaps(xmmword_ptr(rsp + 48), arg3)?;
    asm.lea(abi::ABI_PARAMS[0].to_reg64(), qword_ptr(rsp))?;
    asm.lea(abi::ABI_PARAMS[1].to_reg64(), qword_ptr(rsp + 16))?;
    asm.lea(abi::ABI_PARAMS[2].to_reg64(), qword_ptr(rsp + 32))?;
    asm.lea(abi::ABI_PARAMS[3].to_reg64(), qword_ptr(rsp + 48))?;
    asm.mov(abi::ABI_PARAMS[4].to_reg32(), ctx.fpcr().bits())?;
    asm.lea(
        abi::ABI_PARAMS[5].to_reg64(),
        qword_ptr(r15 + A32JitState::offset_of_fpsr_exc() as i32),
    )?;

    ra.code.call_function(func)?;

    let result = HostLoc::Xmm(0);
    ra.code.asm.movaps(result.to_xmm(), xmmword_ptr(rsp))?;

    ra.release_stack_space(stack_space);
    ra.define_value(inst_ref, result);
    Ok(())
}

#[cfg(windows)]
pub(crate) fn emit_four_op_fallback(
    ctx: &EmitContext,
    ra: &mut RegAlloc,
    inst_ref: InstRef,
    inst: &Inst,
    func: usize,
) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let arg1 = ra.use_xmm(&mut args[0]);
    let arg2 = ra.use_xmm(&mut args[1]);
    let arg3 = ra.use_xmm(&mut args[2]);
    ra.host_call(None, &mut [None, None, None, None]);

    let shadow = abi::ABI_SHADOW_SPACE;
    let stack_space = 5 * 16;
    ra.alloc_stack_space(stack_space + shadow);

    let asm = &mut ra.code.asm;
    asm.movaps(xmmword_ptr(rsp + (shadow + 32) as i32), arg1)?;
    asm.movaps(xmmword_ptr(rsp + (shadow + 48) as i32), arg2)?;
    asm.movaps(xmmword_ptr(rsp + (shadow + 64) as i32), arg3)?;
    asm.lea(abi::ABI_PARAMS[0].to_reg64(), qword_ptr(rsp + (shadow + 16) as i32))?;
    asm.lea(abi::ABI_PARAMS[1].to_reg64(), qword_ptr(rsp + (shadow + 32) as i32))?;
    asm.lea(abi::ABI_PARAMS[2].to_reg64(), qword_ptr(rsp + (shadow + 48) as i32))?;
    asm.lea(abi::ABI_PARAMS[3].to_reg64(), qword_ptr(rsp + (shadow + 64) as i32))?;
    // Fifth and sixth parameters go on the stack, above the shadow space.
    asm.mov(qword_ptr(rsp + 32), ctx.fpcr().bits())?;
    asm.lea(rax, qword_ptr(r15 + A32JitState::offset_of_fpsr_exc() as i32))?;
    asm.mov(qword_ptr(rsp + 40), rax)?;

    ra.code.call_function(func)?;

    let result = HostLoc::Xmm(0);
    ra.code.asm.movaps(result.to_xmm(), xmmword_ptr(rsp + (shadow + 16) as i32))?;

    ra.release_stack_space(stack_space + shadow);
    ra.define_value(inst_ref, result);
    Ok(())
}

// ---------------------------------------------------------------------------
// FPVectorAbs / FPVectorNeg — pure bitwise ops
// ---------------------------------------------------------------------------

fn emit_abs(ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst, mask: u64) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let a = ra.use_scratch_xmm(&mut args[0]);
    let mask_reg = mconst_load(ra, mask, mask)?;
    ra.code.asm.pand(a, mask_reg)?;
    ra.define_value(inst_ref, a);
    Ok(())
}

fn emit_neg(ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst, mask: u64) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let a = ra.use_scratch_xmm(&mut args[0]);
    let mask_reg = mconst_load(ra, mask, mask)?;
    ra.code.asm.pxor(a, mask_reg)?;
    ra.define_value(inst_ref, a);
    Ok(())
}

pub fn emit_fp_vector_abs16(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_abs(ra, inst_ref, inst, 0x7FFF_7FFF_7FFF_7FFF)
}

pub fn emit_fp_vector_abs32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_abs(ra, inst_ref, inst, 0x7FFF_FFFF_7FFF_FFFF)
}

pub fn emit_fp_vector_abs64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_abs(ra, inst_ref, inst, 0x7FFF_FFFF_FFFF_FFFF)
}

pub fn emit_fp_vector_neg16(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_neg(ra, inst_ref, inst, 0x8000_8000_8000_8000)
}

pub fn emit_fp_vector_neg32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_neg(ra, inst_ref, inst, 0x8000_0000_8000_0000)
}

pub fn emit_fp_vector_neg64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_neg(ra, inst_ref, inst, 0x8000_0000_0000_0000)
}

// ---------------------------------------------------------------------------
// FPVectorAdd / Sub / Mul / Div
// ---------------------------------------------------------------------------

pub fn emit_fp_vector_add32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F32, nan_fixup_default32 as usize,
        |ra, a, b| Ok(ra.code.asm.addps(a, b)?))
}

pub fn emit_fp_vector_add64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F64, nan_fixup_default64 as usize,
        |ra, a, b| Ok(ra.code.asm.addpd(a, b)?))
}

pub fn emit_fp_vector_sub32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F32, nan_fixup_default32 as usize,
        |ra, a, b| Ok(ra.code.asm.subps(a, b)?))
}

pub fn emit_fp_vector_sub64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F64, nan_fixup_default64 as usize,
        |ra, a, b| Ok(ra.code.asm.subpd(a, b)?))
}

pub fn emit_fp_vector_mul32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F32, nan_fixup_default32 as usize,
        |ra, a, b| Ok(ra.code.asm.mulps(a, b)?))
}

pub fn emit_fp_vector_mul64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F64, nan_fixup_default64 as usize,
        |ra, a, b| Ok(ra.code.asm.mulpd(a, b)?))
}

pub fn emit_fp_vector_div32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F32, nan_fixup_default32 as usize,
        |ra, a, b| Ok(ra.code.asm.divps(a, b)?))
}

pub fn emit_fp_vector_div64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F64, nan_fixup_default64 as usize,
        |ra, a, b| Ok(ra.code.asm.divpd(a, b)?))
}

// ---------------------------------------------------------------------------
// FPVectorMax / FPVectorMin — signed-zero aware
// ---------------------------------------------------------------------------

/// x86 treats +0 and -0 as equal in max/min; ARM requires MAX(+0,-0) = +0 and
/// MIN(+0,-0) = -0. ANDing (for max) or ORing (for min) the operands of
/// x86-equal lanes produces the architecturally correct zero, selected over
/// the native result by the equality mask.
fn emit_fp_vector_max_min(
    ctx: &EmitContext,
    ra: &mut RegAlloc,
    inst_ref: InstRef,
    inst: &Inst,
    prec: Prec,
    is_max: bool,
) -> EmitResult {
    let nan_handler = match prec {
        Prec::F32 => nan_fixup_default32 as usize,
        Prec::F64 => nan_fixup_default64 as usize,
    };
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, prec, nan_handler, |ra, result, xmm_b| {
        let mask = ra.scratch_xmm();
        let combined = ra.scratch_xmm();

        if ra.code.does_cpu_support(CpuFeatures::AVX) {
            prec.vcmpeqp(&mut ra.code.asm, mask, result, xmm_b)?;
            if is_max {
                prec.vandp(&mut ra.code.asm, combined, result, xmm_b)?;
                prec.vmaxp(&mut ra.code.asm, result, result, xmm_b)?;
            } else {
                prec.vorp(&mut ra.code.asm, combined, result, xmm_b)?;
                prec.vminp(&mut ra.code.asm, result, result, xmm_b)?;
            }
            prec.vblendvp(&mut ra.code.asm, result, result, combined, mask)?;
        } else {
            ra.code.asm.movaps(mask, result)?;
            ra.code.asm.movaps(combined, result)?;
            prec.cmpneqp(&mut ra.code.asm, mask, xmm_b)?;

            if is_max {
                ra.code.asm.andps(combined, xmm_b)?;
                prec.maxp(&mut ra.code.asm, result, xmm_b)?;
            } else {
                ra.code.asm.orps(combined, xmm_b)?;
                prec.minp(&mut ra.code.asm, result, xmm_b)?;
            }

            ra.code.asm.andps(result, mask)?;
            ra.code.asm.andnps(mask, combined)?;
            ra.code.asm.orps(result, mask)?;
        }
        Ok(())
    })
}

pub fn emit_fp_vector_max32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_fp_vector_max_min(ctx, ra, inst_ref, inst, Prec::F32, true)
}

pub fn emit_fp_vector_max64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_fp_vector_max_min(ctx, ra, inst_ref, inst, Prec::F64, true)
}

pub fn emit_fp_vector_min32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_fp_vector_max_min(ctx, ra, inst_ref, inst, Prec::F32, false)
}

pub fn emit_fp_vector_min64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_fp_vector_max_min(ctx, ra, inst_ref, inst, Prec::F64, false)
}

// ---------------------------------------------------------------------------
// FPVectorMulAdd — FMA tier or exact scalar fallback
// ---------------------------------------------------------------------------

unsafe extern "C" fn fallback_mul_add32(
    result: *mut VectorArray32,
    addend: *const VectorArray32,
    op1: *const VectorArray32,
    op2: *const VectorArray32,
    fpcr: u32,
    fpsr: *mut u32,
) {
    let result = &mut *result;
    let addend = &*addend;
    let op1 = &*op1;
    let op2 = &*op2;
    let mut flags = 0;
    for i in 0..4 {
        result[i] = op::mul_add32(addend[i], op1[i], op2[i], Fpcr::new(fpcr), &mut flags);
    }
    *fpsr |= flags;
}

unsafe extern "C" fn fallback_mul_add64(
    result: *mut VectorArray64,
    addend: *const VectorArray64,
    op1: *const VectorArray64,
    op2: *const VectorArray64,
    fpcr: u32,
    fpsr: *mut u32,
) {
    let result = &mut *result;
    let addend = &*addend;
    let op1 = &*op1;
    let op2 = &*op2;
    let mut flags = 0;
    for i in 0..2 {
        result[i] = op::mul_add64(addend[i], op1[i], op2[i], Fpcr::new(fpcr), &mut flags);
    }
    *fpsr |= flags;
}

pub fn emit_fp_vector_mul_add32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    if ra.code.does_cpu_support(CpuFeatures::FMA) {
        return emit_four_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F32, nan_fixup_fma32 as usize,
            |ra, a, b, c| Ok(ra.code.asm.vfmadd231ps(a, b, c)?));
    }
    let func: FallbackFourOp32 = fallback_mul_add32;
    emit_four_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

pub fn emit_fp_vector_mul_add64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    if ra.code.does_cpu_support(CpuFeatures::FMA) {
        return emit_four_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F64, nan_fixup_fma64 as usize,
            |ra, a, b, c| Ok(ra.code.asm.vfmadd231pd(a, b, c)?));
    }
    let func: FallbackFourOp64 = fallback_mul_add64;
    emit_four_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

// ---------------------------------------------------------------------------
// FPVectorPairedAdd / FPVectorPairedAddLower
// ---------------------------------------------------------------------------

pub fn emit_fp_vector_paired_add32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F32, nan_fixup_paired32 as usize,
        |ra, a, b| Ok(ra.code.asm.haddps(a, b)?))
}

pub fn emit_fp_vector_paired_add64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F64, nan_fixup_paired64 as usize,
        |ra, a, b| Ok(ra.code.asm.haddpd(a, b)?))
}

pub fn emit_fp_vector_paired_add_lower32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F32, nan_fixup_paired_lower32 as usize,
        |ra, result, xmm_b| {
            let zero = ra.scratch_xmm();
            ra.code.asm.xorps(zero, zero)?;
            ra.code.asm.punpcklqdq(result, xmm_b)?;
            ra.code.asm.haddps(result, zero)?;
            Ok(())
        })
}

pub fn emit_fp_vector_paired_add_lower64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    emit_three_op_vector_operation(ctx, ra, inst_ref, inst, Prec::F64, nan_fixup_paired_lower64 as usize,
        |ra, result, xmm_b| {
            let zero = ra.scratch_xmm();
            ra.code.asm.xorps(zero, zero)?;
            ra.code.asm.punpcklqdq(result, xmm_b)?;
            ra.code.asm.haddpd(result, zero)?;
            Ok(())
        })
}

// ---------------------------------------------------------------------------
// Reciprocal / reciprocal-square-root estimates and fused steps
// ---------------------------------------------------------------------------

macro_rules! define_two_op_lanes {
    ($name:ident, $array:ty, $count:expr, $op:path) => {
        unsafe extern "C" fn $name(
            result: *mut $array,
            operand: *const $array,
            fpcr: u32,
            fpsr: *mut u32,
        ) {
            let result = &mut *result;
            let operand = &*operand;
            let mut flags = 0;
            for i in 0..$count {
                result[i] = $op(operand[i], Fpcr::new(fpcr), &mut flags);
            }
            *fpsr |= flags;
        }
    };
}

macro_rules! define_three_op_lanes {
    ($name:ident, $array:ty, $count:expr, $op:path) => {
        unsafe extern "C" fn $name(
            result: *mut $array,
            op1: *const $array,
            op2: *const $array,
            fpcr: u32,
            fpsr: *mut u32,
        ) {
            let result = &mut *result;
            let op1 = &*op1;
            let op2 = &*op2;
            let mut flags = 0;
            for i in 0..$count {
                result[i] = $op(op1[i], op2[i], Fpcr::new(fpcr), &mut flags);
            }
            *fpsr |= flags;
        }
    };
}

define_two_op_lanes!(fallback_recip_estimate32, VectorArray32, 4, op::recip_estimate32);
define_two_op_lanes!(fallback_recip_estimate64, VectorArray64, 2, op::recip_estimate64);
define_two_op_lanes!(fallback_rsqrt_estimate32, VectorArray32, 4, op::rsqrt_estimate32);
define_two_op_lanes!(fallback_rsqrt_estimate64, VectorArray64, 2, op::rsqrt_estimate64);
define_three_op_lanes!(fallback_recip_step32, VectorArray32, 4, op::recip_step_fused32);
define_three_op_lanes!(fallback_recip_step64, VectorArray64, 2, op::recip_step_fused64);
define_three_op_lanes!(fallback_rsqrt_step32, VectorArray32, 4, op::rsqrt_step_fused32);
define_three_op_lanes!(fallback_rsqrt_step64, VectorArray64, 2, op::rsqrt_step_fused64);

pub fn emit_fp_vector_recip_estimate32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let func: FallbackTwoOp32 = fallback_recip_estimate32;
    emit_two_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

pub fn emit_fp_vector_recip_estimate64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let func: FallbackTwoOp64 = fallback_recip_estimate64;
    emit_two_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

pub fn emit_fp_vector_recip_step_fused32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let func: FallbackThreeOp32 = fallback_recip_step32;
    emit_three_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

pub fn emit_fp_vector_recip_step_fused64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let func: FallbackThreeOp64 = fallback_recip_step64;
    emit_three_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

pub fn emit_fp_vector_rsqrt_estimate32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let func: FallbackTwoOp32 = fallback_rsqrt_estimate32;
    emit_two_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

pub fn emit_fp_vector_rsqrt_estimate64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let func: FallbackTwoOp64 = fallback_rsqrt_estimate64;
    emit_two_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

pub fn emit_fp_vector_rsqrt_step_fused32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let func: FallbackThreeOp32 = fallback_rsqrt_step32;
    emit_three_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

pub fn emit_fp_vector_rsqrt_step_fused64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let func: FallbackThreeOp64 = fallback_rsqrt_step64;
    emit_three_op_fallback(ctx, ra, inst_ref, inst, func as usize)
}

// ---------------------------------------------------------------------------
// FPVectorEqual / Greater / GreaterEqual
//
// The native compares already match ARM: any NaN operand compares false and
// produces an all-zero lane mask.
// ---------------------------------------------------------------------------

pub fn emit_fp_vector_equal32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let a = ra.use_scratch_xmm(&mut args[0]);
    let b = ra.use_xmm(&mut args[1]);
    ra.code.asm.cmpeqps(a, b)?;
    ra.define_value(inst_ref, a);
    Ok(())
}

pub fn emit_fp_vector_equal64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let a = ra.use_scratch_xmm(&mut args[0]);
    let b = ra.use_xmm(&mut args[1]);
    ra.code.asm.cmpeqpd(a, b)?;
    ra.define_value(inst_ref, a);
    Ok(())
}

pub fn emit_fp_vector_greater32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    // a > b computed as b < a.
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let a = ra.use_xmm(&mut args[0]);
    let b = ra.use_scratch_xmm(&mut args[1]);
    ra.code.asm.cmpltps(b, a)?;
    ra.define_value(inst_ref, b);
    Ok(())
}

pub fn emit_fp_vector_greater64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let a = ra.use_xmm(&mut args[0]);
    let b = ra.use_scratch_xmm(&mut args[1]);
    ra.code.asm.cmpltpd(b, a)?;
    ra.define_value(inst_ref, b);
    Ok(())
}

pub fn emit_fp_vector_greater_equal32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let a = ra.use_xmm(&mut args[0]);
    let b = ra.use_scratch_xmm(&mut args[1]);
    ra.code.asm.cmpleps(b, a)?;
    ra.define_value(inst_ref, b);
    Ok(())
}

pub fn emit_fp_vector_greater_equal64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let a = ra.use_xmm(&mut args[0]);
    let b = ra.use_scratch_xmm(&mut args[1]);
    ra.code.asm.cmplepd(b, a)?;
    ra.define_value(inst_ref, b);
    Ok(())
}

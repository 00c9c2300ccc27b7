//! IR block → x86-64 driver.
//!
//! Walks live instructions, dispatches each opcode to its emitter, then
//! lowers the terminal. The backend covers the floating-point vector opcodes
//! and the vector register accesses they need; anything else reports
//! `EmitError::Unsupported` so the layer above can fall back to the
//! interpreter.

use iced_x86::code_asm::*;

use crate::backend::x64::block_of_code::{CodeBuffer, CpuFeatures, ExecutableBlock};
use crate::backend::x64::emit_context::EmitContext;
use crate::backend::x64::emit_fp_vector as fpv;
use crate::backend::x64::emit_fp_vector_convert as fpc;
use crate::backend::x64::jit_state::A32JitState;
use crate::backend::x64::reg_alloc::RegAlloc;
use crate::backend::x64::{EmitError, EmitResult};
use crate::ir::block::Block;
use crate::ir::cond::Cond;
use crate::ir::inst::Inst;
use crate::ir::location::LocationDescriptor;
use crate::ir::opcode::Opcode;
use crate::ir::terminal::Terminal;
use crate::ir::value::InstRef;

/// Compile an IR block into executable host code.
pub fn compile_ir_block(
    block: &Block,
    ctx: &EmitContext,
    features: CpuFeatures,
) -> Result<ExecutableBlock, EmitError> {
    assert!(!block.terminal.is_invalid(), "block has no terminal");

    let mut code = CodeBuffer::new(features)?;
    code.emit_prologue()?;

    {
        let inst_info = block
            .instructions
            .iter()
            .map(|inst| (inst.use_count, inst.return_type().bit_width()))
            .collect();
        let mut ra = RegAlloc::new_default(&mut code, inst_info);

        for (i, inst) in block.instructions.iter().enumerate() {
            if inst.is_tombstone() {
                continue;
            }
            // Results nobody consumes need no code (run dead-code
            // elimination first for a clean block).
            if inst.use_count == 0 && !inst.has_side_effects() {
                continue;
            }
            emit_inst(ctx, &mut ra, InstRef(i as u32), inst)?;
            ra.end_of_alloc_scope();
        }

        ra.assert_no_more_uses();
    }

    emit_terminal(&mut code, &block.terminal)?;
    code.finalize()
}

fn emit_inst(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    match inst.opcode {
        Opcode::Void => Ok(()),
        Opcode::Identity => {
            let args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
            ra.define_value_from_arg(inst_ref, &args[0]);
            Ok(())
        }

        Opcode::A32GetVector => emit_a32_get_vector(ra, inst_ref, inst),
        Opcode::A32SetVector => emit_a32_set_vector(ra, inst_ref, inst),

        Opcode::FPVectorAbs16 => fpv::emit_fp_vector_abs16(ctx, ra, inst_ref, inst),
        Opcode::FPVectorAbs32 => fpv::emit_fp_vector_abs32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorAbs64 => fpv::emit_fp_vector_abs64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorNeg16 => fpv::emit_fp_vector_neg16(ctx, ra, inst_ref, inst),
        Opcode::FPVectorNeg32 => fpv::emit_fp_vector_neg32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorNeg64 => fpv::emit_fp_vector_neg64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorAdd32 => fpv::emit_fp_vector_add32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorAdd64 => fpv::emit_fp_vector_add64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorSub32 => fpv::emit_fp_vector_sub32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorSub64 => fpv::emit_fp_vector_sub64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorMul32 => fpv::emit_fp_vector_mul32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorMul64 => fpv::emit_fp_vector_mul64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorDiv32 => fpv::emit_fp_vector_div32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorDiv64 => fpv::emit_fp_vector_div64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorMax32 => fpv::emit_fp_vector_max32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorMax64 => fpv::emit_fp_vector_max64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorMin32 => fpv::emit_fp_vector_min32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorMin64 => fpv::emit_fp_vector_min64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorMulAdd32 => fpv::emit_fp_vector_mul_add32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorMulAdd64 => fpv::emit_fp_vector_mul_add64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorPairedAdd32 => fpv::emit_fp_vector_paired_add32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorPairedAdd64 => fpv::emit_fp_vector_paired_add64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorPairedAddLower32 => {
            fpv::emit_fp_vector_paired_add_lower32(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorPairedAddLower64 => {
            fpv::emit_fp_vector_paired_add_lower64(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorRecipEstimate32 => {
            fpv::emit_fp_vector_recip_estimate32(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorRecipEstimate64 => {
            fpv::emit_fp_vector_recip_estimate64(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorRecipStepFused32 => {
            fpv::emit_fp_vector_recip_step_fused32(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorRecipStepFused64 => {
            fpv::emit_fp_vector_recip_step_fused64(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorRSqrtEstimate32 => {
            fpv::emit_fp_vector_rsqrt_estimate32(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorRSqrtEstimate64 => {
            fpv::emit_fp_vector_rsqrt_estimate64(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorRSqrtStepFused32 => {
            fpv::emit_fp_vector_rsqrt_step_fused32(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorRSqrtStepFused64 => {
            fpv::emit_fp_vector_rsqrt_step_fused64(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorEqual32 => fpv::emit_fp_vector_equal32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorEqual64 => fpv::emit_fp_vector_equal64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorGreater32 => fpv::emit_fp_vector_greater32(ctx, ra, inst_ref, inst),
        Opcode::FPVectorGreater64 => fpv::emit_fp_vector_greater64(ctx, ra, inst_ref, inst),
        Opcode::FPVectorGreaterEqual32 => {
            fpv::emit_fp_vector_greater_equal32(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorGreaterEqual64 => {
            fpv::emit_fp_vector_greater_equal64(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorS32ToSingle => fpc::emit_fp_vector_s32_to_single(ctx, ra, inst_ref, inst),
        Opcode::FPVectorS64ToDouble => fpc::emit_fp_vector_s64_to_double(ctx, ra, inst_ref, inst),
        Opcode::FPVectorU32ToSingle => fpc::emit_fp_vector_u32_to_single(ctx, ra, inst_ref, inst),
        Opcode::FPVectorU64ToDouble => fpc::emit_fp_vector_u64_to_double(ctx, ra, inst_ref, inst),
        Opcode::FPVectorToSignedFixed32 => {
            fpc::emit_fp_vector_to_signed_fixed32(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorToSignedFixed64 => {
            fpc::emit_fp_vector_to_signed_fixed64(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorToUnsignedFixed32 => {
            fpc::emit_fp_vector_to_unsigned_fixed32(ctx, ra, inst_ref, inst)
        }
        Opcode::FPVectorToUnsignedFixed64 => {
            fpc::emit_fp_vector_to_unsigned_fixed64(ctx, ra, inst_ref, inst)
        }

        opcode => Err(EmitError::Unsupported(opcode)),
    }
}

fn emit_a32_get_vector(ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let reg = inst.arg(0).get_ext_reg();
    let offset = A32JitState::ext_reg_offset(reg) as i32;
    let result = ra.scratch_xmm();
    if reg.is_quad() {
        ra.code.asm.movaps(result, xmmword_ptr(r15 + offset))?;
    } else {
        assert!(reg.is_double(), "vector access must name a D or Q register");
        ra.code.asm.movsd_2(result, qword_ptr(r15 + offset))?;
    }
    ra.define_value(inst_ref, result);
    Ok(())
}

fn emit_a32_set_vector(ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) -> EmitResult {
    let reg = inst.arg(0).get_ext_reg();
    let offset = A32JitState::ext_reg_offset(reg) as i32;
    let mut args = ra.get_argument_info(inst_ref, &inst.args, inst.num_args());
    let value = ra.use_xmm(&mut args[1]);
    if reg.is_quad() {
        ra.code.asm.movaps(xmmword_ptr(r15 + offset), value)?;
    } else {
        assert!(reg.is_double(), "vector access must name a D or Q register");
        ra.code.asm.movsd_2(qword_ptr(r15 + offset), value)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Terminals
// ---------------------------------------------------------------------------

fn emit_terminal(code: &mut CodeBuffer, terminal: &Terminal) -> EmitResult {
    match terminal {
        Terminal::Invalid => panic!("emitting an invalid terminal"),
        Terminal::ReturnToDispatch => code.emit_epilogue(),
        Terminal::Interpret { next } => emit_set_pc_and_return(code, *next),
        // Block linking is owned by the cache layer; without it both link
        // forms behave as a PC update plus return to the dispatcher.
        Terminal::LinkBlock { next } => emit_set_pc_and_return(code, *next),
        Terminal::LinkBlockFast { next } => emit_set_pc_and_return(code, *next),
        Terminal::If { cond, then_, else_ } => {
            let mut taken = code.asm.create_label();
            emit_cond_branch(code, *cond, taken)?;
            emit_terminal(code, else_)?;
            code.asm.set_label(&mut taken)?;
            emit_terminal(code, then_)?;
            Ok(())
        }
    }
}

fn emit_set_pc_and_return(code: &mut CodeBuffer, next: LocationDescriptor) -> EmitResult {
    let pc = (next.value() & 0xFFFF_FFFF) as u32;
    code.asm
        .mov(dword_ptr(r15 + A32JitState::reg_offset(15) as i32), pc)?;
    code.emit_epilogue()
}

/// Branch to `taken` when `cond` holds on the guest NZCV flags.
/// N is bit 31, Z bit 30, C bit 29, V bit 28 of the loaded word.
fn emit_cond_branch(code: &mut CodeBuffer, cond: Cond, taken: CodeLabel) -> EmitResult {
    let asm = &mut code.asm;
    asm.mov(eax, dword_ptr(r15 + A32JitState::offset_of_cpsr_nzcv() as i32))?;

    // ecx = eax ^ (eax << 3) puts N^V in bit 31.
    let mut compute_nv = |asm: &mut CodeAssembler| -> Result<(), iced_x86::IcedError> {
        asm.mov(ecx, eax)?;
        asm.shl(ecx, 3)?;
        asm.xor(ecx, eax)?;
        Ok(())
    };

    match cond {
        Cond::EQ => {
            asm.bt(eax, 30)?;
            asm.jc(taken)?;
        }
        Cond::NE => {
            asm.bt(eax, 30)?;
            asm.jnc(taken)?;
        }
        Cond::CS => {
            asm.bt(eax, 29)?;
            asm.jc(taken)?;
        }
        Cond::CC => {
            asm.bt(eax, 29)?;
            asm.jnc(taken)?;
        }
        Cond::MI => {
            asm.bt(eax, 31)?;
            asm.jc(taken)?;
        }
        Cond::PL => {
            asm.bt(eax, 31)?;
            asm.jnc(taken)?;
        }
        Cond::VS => {
            asm.bt(eax, 28)?;
            asm.jc(taken)?;
        }
        Cond::VC => {
            asm.bt(eax, 28)?;
            asm.jnc(taken)?;
        }
        Cond::HI => {
            // C set and Z clear
            let mut skip = asm.create_label();
            asm.bt(eax, 29)?;
            asm.jnc(skip)?;
            asm.bt(eax, 30)?;
            asm.jnc(taken)?;
            asm.set_label(&mut skip)?;
            asm.nop()?;
        }
        Cond::LS => {
            // C clear or Z set
            asm.bt(eax, 29)?;
            asm.jnc(taken)?;
            asm.bt(eax, 30)?;
            asm.jc(taken)?;
        }
        Cond::GE => {
            compute_nv(asm)?;
            asm.bt(ecx, 31)?;
            asm.jnc(taken)?;
        }
        Cond::LT => {
            compute_nv(asm)?;
            asm.bt(ecx, 31)?;
            asm.jc(taken)?;
        }
        Cond::GT => {
            // Z clear and N == V
            let mut skip = asm.create_label();
            asm.bt(eax, 30)?;
            asm.jc(skip)?;
            compute_nv(asm)?;
            asm.bt(ecx, 31)?;
            asm.jnc(taken)?;
            asm.set_label(&mut skip)?;
            asm.nop()?;
        }
        Cond::LE => {
            // Z set or N != V
            asm.bt(eax, 30)?;
            asm.jc(taken)?;
            compute_nv(asm)?;
            asm.bt(ecx, 31)?;
            asm.jc(taken)?;
        }
        Cond::AL | Cond::NV => {
            asm.jmp(taken)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[cfg(target_arch = "x86_64")]
mod tests {
    use super::*;
    use crate::frontend::thumb::fpscr::FPSCR;
    use crate::frontend::thumb::types::ExtReg;
    use crate::ir::a32_emitter::A32IREmitter;
    use crate::ir::location::A32LocationDescriptor;

    const DN: u32 = 1 << 25;

    fn run_block(
        fpscr: u32,
        state: &mut A32JitState,
        build: impl FnOnce(&mut A32IREmitter),
    ) {
        let loc = A32LocationDescriptor::new(0x1000, true, FPSCR::new(fpscr));
        let mut block = Block::new(loc.to_location());
        {
            let mut ir = A32IREmitter::new(&mut block, loc);
            build(&mut ir);
            ir.set_term(Terminal::ReturnToDispatch);
        }
        state.set_fpscr(fpscr);
        let ctx = EmitContext::new(loc);
        let compiled = compile_ir_block(&block, &ctx, CpuFeatures::detect()).unwrap();
        unsafe { compiled.entry()(state) };
    }

    fn f32x4(values: [f32; 4]) -> (u64, u64) {
        let b: [u32; 4] = values.map(f32::to_bits);
        (
            b[0] as u64 | ((b[1] as u64) << 32),
            b[2] as u64 | ((b[3] as u64) << 32),
        )
    }

    fn to_f32x4(q: (u64, u64)) -> [u32; 4] {
        [
            q.0 as u32,
            (q.0 >> 32) as u32,
            q.1 as u32,
            (q.1 >> 32) as u32,
        ]
    }

    fn binary_op(
        fpscr: u32,
        a: (u64, u64),
        b: (u64, u64),
        build: impl FnOnce(&mut A32IREmitter, crate::ir::value::Value, crate::ir::value::Value) -> crate::ir::value::Value,
    ) -> [u32; 4] {
        let mut state = A32JitState::new();
        state.set_q(0, a.0, a.1);
        state.set_q(1, b.0, b.1);
        run_block(fpscr, &mut state, |ir| {
            let a = ir.get_vector(ExtReg::Q0);
            let b = ir.get_vector(ExtReg::Q1);
            let r = build(ir, a, b);
            ir.set_vector(ExtReg::Q2, r);
        });
        to_f32x4(state.q(2))
    }

    #[test]
    fn test_vector_add32() {
        let r = binary_op(
            0,
            f32x4([1.0, 2.0, 3.0, 4.0]),
            f32x4([10.0, 20.0, 30.0, 40.0]),
            |ir, a, b| ir.ir().fp_vector_add(32, a, b),
        );
        assert_eq!(r.map(f32::from_bits), [11.0, 22.0, 33.0, 44.0]);
    }

    #[test]
    fn test_vector_add32_accurate_nan_propagates_operand() {
        // Host addps would produce its own quiet NaN; the fix-up path must
        // substitute the operand NaN, payload intact.
        let qnan = 0x7FC1_2345;
        let mut a = f32x4([1.0, 2.0, 3.0, 4.0]);
        a.0 = (a.0 & 0xFFFF_FFFF_0000_0000) | qnan as u64;
        let r = binary_op(0, a, f32x4([1.0, 1.0, 1.0, 1.0]), |ir, a, b| {
            ir.ir().fp_vector_add(32, a, b)
        });
        assert_eq!(r[0], qnan);
        assert_eq!(f32::from_bits(r[1]), 3.0);
    }

    #[test]
    fn test_signed_zero_max_min() {
        let pz = f32x4([0.0, 0.0, 0.0, 0.0]);
        let nz = f32x4([-0.0, -0.0, -0.0, -0.0]);

        let max = binary_op(0, pz, nz, |ir, a, b| ir.ir().fp_vector_max(32, a, b));
        for lane in max {
            assert_eq!(lane, 0.0f32.to_bits(), "MAX(+0,-0) must be +0");
        }

        let min = binary_op(0, pz, nz, |ir, a, b| ir.ir().fp_vector_min(32, a, b));
        for lane in min {
            assert_eq!(lane, (-0.0f32).to_bits(), "MIN(+0,-0) must be -0");
        }
    }

    #[test]
    fn test_max_ordinary_values() {
        let r = binary_op(
            0,
            f32x4([1.0, -5.0, 7.5, 0.0]),
            f32x4([2.0, -6.0, 7.0, 1.0]),
            |ir, a, b| ir.ir().fp_vector_max(32, a, b),
        );
        assert_eq!(r.map(f32::from_bits), [2.0, -5.0, 7.5, 1.0]);
    }

    #[test]
    fn test_default_nan_on_division() {
        // FPCR.DN=1: every NaN result lane is exactly 0x7FC00000.
        let a = {
            let mut v = f32x4([1.0, 0.0, 0.0, f32::INFINITY]);
            v.0 = (v.0 & 0xFFFF_FFFF) | ((0x7FA1_2345u64) << 32); // signaling NaN lane 1
            v
        };
        let b = f32x4([0.0, 1.0, 0.0, 0.0]);
        let r = binary_op(DN, a, b, |ir, a, b| ir.ir().fp_vector_div(32, a, b));

        assert_eq!(f32::from_bits(r[0]), f32::INFINITY); // 1/0
        assert_eq!(r[1], 0x7FC0_0000); // NaN / 1
        assert_eq!(r[2], 0x7FC0_0000); // 0/0
        assert_eq!(f32::from_bits(r[3]), f32::INFINITY); // inf/0
    }

    #[test]
    fn test_mul_add_nan_corner() {
        let qnan = 0x7FC1_0000u32;
        let run = |fpscr: u32, b_val: f32, c_val: f32| {
            let mut state = A32JitState::new();
            state.set_q(0, qnan as u64, 0);
            state.set_q(1, b_val.to_bits() as u64, 0);
            state.set_q(2, c_val.to_bits() as u64, 0);
            run_block(fpscr, &mut state, |ir| {
                let a = ir.get_vector(ExtReg::Q0);
                let b = ir.get_vector(ExtReg::Q1);
                let c = ir.get_vector(ExtReg::Q2);
                let r = ir.ir().fp_vector_mul_add(32, a, b, c);
                ir.set_vector(ExtReg::Q3, r);
            });
            to_f32x4(state.q(3))[0]
        };

        // QNaN addend with inf * 0 product: Default-NaN.
        assert_eq!(run(0, f32::INFINITY, 0.0), 0x7FC0_0000);
        // QNaN addend with an ordinary product: unchanged without DN...
        assert_eq!(run(0, 1.0, 1.0), qnan);
        // ...and Default-NaN with DN.
        assert_eq!(run(DN, 1.0, 1.0), 0x7FC0_0000);
    }

    #[test]
    fn test_to_signed_fixed_clamps_and_flags() {
        let mut state = A32JitState::new();
        let input = [
            2147483648.0f32.to_bits(),
            (-2147483649.0f32).to_bits(),
            0x7FC0_0000,
            1.5f32.to_bits(),
        ];
        state.set_q(
            0,
            input[0] as u64 | ((input[1] as u64) << 32),
            input[2] as u64 | ((input[3] as u64) << 32),
        );
        run_block(0, &mut state, |ir| {
            let a = ir.get_vector(ExtReg::Q0);
            let r = ir.ir().fp_vector_to_signed_fixed(32, a, 0, 3);
            ir.set_vector(ExtReg::Q1, r);
        });
        assert_eq!(to_f32x4(state.q(1)), [0x7FFF_FFFF, 0x8000_0000, 0, 1]);
        // NaN conversion raised IOC.
        assert_eq!(state.fpsr_exc & crate::fp::FPSR_IOC, crate::fp::FPSR_IOC);
    }

    #[test]
    fn test_s32_to_single() {
        let mut state = A32JitState::new();
        let input: [i32; 4] = [1, -1, 123456, i32::MIN];
        let bits = input.map(|v| v as u32);
        state.set_q(
            0,
            bits[0] as u64 | ((bits[1] as u64) << 32),
            bits[2] as u64 | ((bits[3] as u64) << 32),
        );
        run_block(0, &mut state, |ir| {
            let a = ir.get_vector(ExtReg::Q0);
            let r = ir.ir().fp_vector_s32_to_single(a);
            ir.set_vector(ExtReg::Q1, r);
        });
        let out = to_f32x4(state.q(1)).map(f32::from_bits);
        assert_eq!(out, [1.0, -1.0, 123456.0, -2147483648.0]);
    }

    #[test]
    fn test_u32_to_single_magic_numbers() {
        let mut state = A32JitState::new();
        let input: [u32; 4] = [0, 1, 0x8000_0000, u32::MAX];
        state.set_q(
            0,
            input[0] as u64 | ((input[1] as u64) << 32),
            input[2] as u64 | ((input[3] as u64) << 32),
        );
        run_block(0, &mut state, |ir| {
            let a = ir.get_vector(ExtReg::Q0);
            let r = ir.ir().fp_vector_u32_to_single(a);
            ir.set_vector(ExtReg::Q1, r);
        });
        let out = to_f32x4(state.q(1)).map(f32::from_bits);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 1.0);
        assert_eq!(out[2], 2147483648.0);
        assert_eq!(out[3], u32::MAX as f32);
    }

    #[test]
    fn test_u64_to_double_magic_numbers() {
        let mut state = A32JitState::new();
        state.set_q(0, 1, u64::MAX);
        run_block(0, &mut state, |ir| {
            let a = ir.get_vector(ExtReg::Q0);
            let r = ir.ir().fp_vector_u64_to_double(a);
            ir.set_vector(ExtReg::Q1, r);
        });
        let (lo, hi) = state.q(1);
        assert_eq!(f64::from_bits(lo), 1.0);
        assert_eq!(f64::from_bits(hi), u64::MAX as f64);
    }

    #[test]
    fn test_s64_to_double() {
        let mut state = A32JitState::new();
        state.set_q(0, (-2i64) as u64, 1234567890123i64 as u64);
        run_block(0, &mut state, |ir| {
            let a = ir.get_vector(ExtReg::Q0);
            let r = ir.ir().fp_vector_s64_to_double(a);
            ir.set_vector(ExtReg::Q1, r);
        });
        let (lo, hi) = state.q(1);
        assert_eq!(f64::from_bits(lo), -2.0);
        assert_eq!(f64::from_bits(hi), 1234567890123.0);
    }

    #[test]
    fn test_paired_add32() {
        let r = binary_op(
            0,
            f32x4([1.0, 2.0, 3.0, 4.0]),
            f32x4([5.0, 6.0, 7.0, 8.0]),
            |ir, a, b| ir.ir().fp_vector_paired_add(32, a, b),
        );
        assert_eq!(r.map(f32::from_bits), [3.0, 7.0, 11.0, 15.0]);
    }

    #[test]
    fn test_recip_estimate32() {
        let mut state = A32JitState::new();
        state.set_q(0, f32x4([2.0, 4.0, f32::INFINITY, 0.5]).0, f32x4([2.0, 4.0, f32::INFINITY, 0.5]).1);
        run_block(0, &mut state, |ir| {
            let a = ir.get_vector(ExtReg::Q0);
            let r = ir.ir().fp_vector_recip_estimate(32, a);
            ir.set_vector(ExtReg::Q1, r);
        });
        let out = to_f32x4(state.q(1)).map(f32::from_bits);
        assert_eq!(out[0], 0.5);
        assert_eq!(out[1], 0.25);
        assert_eq!(out[2], 0.0);
        assert_eq!(out[3], 2.0);
    }

    #[test]
    fn test_vector_equal_and_greater() {
        let eq = binary_op(
            0,
            f32x4([1.0, 2.0, f32::NAN, 4.0]),
            f32x4([1.0, 3.0, f32::NAN, 4.0]),
            |ir, a, b| ir.ir().fp_vector_equal(32, a, b),
        );
        assert_eq!(eq, [!0, 0, 0, !0]);

        let gt = binary_op(
            0,
            f32x4([2.0, 2.0, f32::NAN, 5.0]),
            f32x4([1.0, 3.0, 1.0, 5.0]),
            |ir, a, b| ir.ir().fp_vector_greater(32, a, b),
        );
        assert_eq!(gt, [!0, 0, 0, 0]);
    }

    #[test]
    fn test_abs_and_neg() {
        let mut state = A32JitState::new();
        let (lo, hi) = f32x4([-1.0, 2.0, -0.0, -4.0]);
        state.set_q(0, lo, hi);
        run_block(0, &mut state, |ir| {
            let a = ir.get_vector(ExtReg::Q0);
            let abs = ir.ir().fp_vector_abs(32, a);
            ir.set_vector(ExtReg::Q1, abs);
            let neg = ir.ir().fp_vector_neg(32, a);
            ir.set_vector(ExtReg::Q2, neg);
        });
        assert_eq!(to_f32x4(state.q(1)).map(f32::from_bits), [1.0, 2.0, 0.0, 4.0]);
        assert_eq!(to_f32x4(state.q(2)).map(f32::from_bits), [1.0, -2.0, 0.0, 4.0]);
    }

    #[test]
    fn test_native_and_fallback_agree_on_nan_free_inputs() {
        // The accurate SIMD path and the scalar fallback must agree
        // bit-for-bit when no NaN is involved: MulAdd has both tiers.
        let a = f32x4([1.5, -2.25, 1000.0, 0.125]);
        let b = f32x4([3.0, 4.0, -5.0, 6.0]);
        let c = f32x4([0.5, 0.25, 2.0, -8.0]);

        let run = |features: CpuFeatures| {
            let loc = A32LocationDescriptor::new(0x1000, true, FPSCR::new(0));
            let mut block = Block::new(loc.to_location());
            {
                let mut ir = A32IREmitter::new(&mut block, loc);
                let va = ir.get_vector(ExtReg::Q0);
                let vb = ir.get_vector(ExtReg::Q1);
                let vc = ir.get_vector(ExtReg::Q2);
                let r = ir.ir().fp_vector_mul_add(32, va, vb, vc);
                ir.set_vector(ExtReg::Q3, r);
                ir.set_term(Terminal::ReturnToDispatch);
            }
            let ctx = EmitContext::new(loc);
            let compiled = compile_ir_block(&block, &ctx, features).unwrap();
            let mut state = A32JitState::new();
            state.set_q(0, a.0, a.1);
            state.set_q(1, b.0, b.1);
            state.set_q(2, c.0, c.1);
            unsafe { compiled.entry()(&mut state) };
            state.q(3)
        };

        // Scalar fallback (no FMA reported) vs. native tier (host features).
        let fallback = run(CpuFeatures::detect() & !CpuFeatures::FMA);
        let native = run(CpuFeatures::detect());
        assert_eq!(fallback, native);
    }

    #[test]
    fn test_if_terminal_selects_pc_by_flags() {
        let loc = A32LocationDescriptor::new(0x1000, true, FPSCR::new(0));
        let mut block = Block::new(loc.to_location());
        block.set_terminal(Terminal::if_then_else(
            Cond::EQ,
            Terminal::link_block(loc.set_pc(0x2000).to_location()),
            Terminal::link_block(loc.set_pc(0x3000).to_location()),
        ));
        let ctx = EmitContext::new(loc);
        let compiled = compile_ir_block(&block, &ctx, CpuFeatures::detect()).unwrap();

        let mut state = A32JitState::new();
        state.cpsr_nzcv = 1 << 30; // Z set
        unsafe { compiled.entry()(&mut state) };
        assert_eq!(state.regs[15], 0x2000);

        let mut state = A32JitState::new();
        state.cpsr_nzcv = 0;
        unsafe { compiled.entry()(&mut state) };
        assert_eq!(state.regs[15], 0x3000);
    }

    #[test]
    fn test_unsupported_opcode_reports_error() {
        let loc = A32LocationDescriptor::new(0x1000, true, FPSCR::new(0));
        let mut block = Block::new(loc.to_location());
        {
            let mut ir = A32IREmitter::new(&mut block, loc);
            let r0 = ir.get_register(crate::frontend::thumb::types::Reg::R0);
            ir.set_register(crate::frontend::thumb::types::Reg::R1, r0);
            ir.set_term(Terminal::ReturnToDispatch);
        }
        let ctx = EmitContext::new(loc);
        let err = compile_ir_block(&block, &ctx, CpuFeatures::detect()).unwrap_err();
        assert!(matches!(err, EmitError::Unsupported(_)));
    }
}

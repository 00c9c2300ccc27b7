use crate::frontend::thumb::decoder::{Matcher, Thumb16Id};
use crate::frontend::thumb::types::{Reg, ShiftType};
use crate::ir::a32_emitter::A32IREmitter;
use crate::ir::terminal::Terminal;
use crate::ir::value::Value;

use super::helpers::{emit_imm_shift, sign_extend};

/// Dispatch a decoded Thumb-16 instruction to its handler.
/// Returns true to continue translating the block.
pub fn translate_thumb16(ir: &mut A32IREmitter, matcher: &Matcher, opcode: u16) -> bool {
    use Thumb16Id::*;
    let f = matcher.extract(opcode);
    match matcher.id {
        LSL_imm => thumb16_shift_imm(ir, ShiftType::LSL, f[0], reg(f[1]), reg(f[2])),
        LSR_imm => thumb16_shift_imm(ir, ShiftType::LSR, f[0], reg(f[1]), reg(f[2])),
        ASR_imm => thumb16_shift_imm(ir, ShiftType::ASR, f[0], reg(f[1]), reg(f[2])),
        ADD_reg_t1 => thumb16_add_reg(ir, reg(f[0]), reg(f[1]), reg(f[2])),
        SUB_reg => thumb16_sub_reg(ir, reg(f[0]), reg(f[1]), reg(f[2])),
        ADD_imm_t1 => thumb16_add_imm(ir, f[0], reg(f[1]), reg(f[2])),
        SUB_imm_t1 => thumb16_sub_imm(ir, f[0], reg(f[1]), reg(f[2])),
        MOV_imm => thumb16_mov_imm(ir, reg(f[0]), f[1]),
        CMP_imm => thumb16_cmp_imm(ir, reg(f[0]), f[1]),
        ADD_imm_t2 => thumb16_add_imm(ir, f[1], reg(f[0]), reg(f[0])),
        SUB_imm_t2 => thumb16_sub_imm(ir, f[1], reg(f[0]), reg(f[0])),
        AND_reg => thumb16_and_reg(ir, reg(f[0]), reg(f[1])),
        EOR_reg => thumb16_eor_reg(ir, reg(f[0]), reg(f[1])),
        LSL_reg => thumb16_shift_reg(ir, ShiftType::LSL, reg(f[0]), reg(f[1])),
        LSR_reg => thumb16_shift_reg(ir, ShiftType::LSR, reg(f[0]), reg(f[1])),
        ASR_reg => thumb16_shift_reg(ir, ShiftType::ASR, reg(f[0]), reg(f[1])),
        ADC_reg => thumb16_adc_reg(ir, reg(f[0]), reg(f[1])),
        SBC_reg => thumb16_sbc_reg(ir, reg(f[0]), reg(f[1])),
        ROR_reg => thumb16_shift_reg(ir, ShiftType::ROR, reg(f[0]), reg(f[1])),
        TST_reg => thumb16_tst_reg(ir, reg(f[0]), reg(f[1])),
        RSB_imm => thumb16_rsb_imm(ir, reg(f[0]), reg(f[1])),
        CMP_reg_t1 => thumb16_cmp_reg(ir, reg(f[0]), reg(f[1])),
        CMN_reg => thumb16_cmn_reg(ir, reg(f[0]), reg(f[1])),
        ORR_reg => thumb16_orr_reg(ir, reg(f[0]), reg(f[1])),
        MUL_reg => thumb16_mul_reg(ir, reg(f[0]), reg(f[1])),
        BIC_reg => thumb16_bic_reg(ir, reg(f[0]), reg(f[1])),
        MVN_reg => thumb16_mvn_reg(ir, reg(f[0]), reg(f[1])),
        ADD_reg_t2 => thumb16_add_reg_t2(ir, f[0] != 0, reg(f[1]), reg(f[2])),
        CMP_reg_t2 => thumb16_cmp_reg_t2(ir, f[0] != 0, reg(f[1]), reg(f[2])),
        MOV_reg => thumb16_mov_reg(ir, f[0] != 0, reg(f[1]), reg(f[2])),
        BX => thumb16_bx(ir, reg(f[0])),
        BLX_reg => thumb16_blx_reg(ir, reg(f[0])),
        LDR_literal => thumb16_ldr_literal(ir, reg(f[0]), f[1]),
        STR_reg => thumb16_str_reg(ir, reg(f[0]), reg(f[1]), reg(f[2])),
        STRH_reg => thumb16_strh_reg(ir, reg(f[0]), reg(f[1]), reg(f[2])),
        STRB_reg => thumb16_strb_reg(ir, reg(f[0]), reg(f[1]), reg(f[2])),
        LDRSB_reg => thumb16_ldrsb_reg(ir, reg(f[0]), reg(f[1]), reg(f[2])),
        LDR_reg => thumb16_ldr_reg(ir, reg(f[0]), reg(f[1]), reg(f[2])),
        LDRH_reg => thumb16_ldrh_reg(ir, reg(f[0]), reg(f[1]), reg(f[2])),
        LDRB_reg => thumb16_ldrb_reg(ir, reg(f[0]), reg(f[1]), reg(f[2])),
        LDRSH_reg => thumb16_ldrsh_reg(ir, reg(f[0]), reg(f[1]), reg(f[2])),
        STR_imm_t1 => thumb16_str_imm(ir, f[0] << 2, reg(f[1]), reg(f[2])),
        LDR_imm_t1 => thumb16_ldr_imm(ir, f[0] << 2, reg(f[1]), reg(f[2])),
        STRB_imm => thumb16_strb_imm(ir, f[0], reg(f[1]), reg(f[2])),
        LDRB_imm => thumb16_ldrb_imm(ir, f[0], reg(f[1]), reg(f[2])),
        STRH_imm => thumb16_strh_imm(ir, f[0] << 1, reg(f[1]), reg(f[2])),
        LDRH_imm => thumb16_ldrh_imm(ir, f[0] << 1, reg(f[1]), reg(f[2])),
        STR_imm_t2 => thumb16_str_imm(ir, f[1] << 2, Reg::SP, reg(f[0])),
        LDR_imm_t2 => thumb16_ldr_imm(ir, f[1] << 2, Reg::SP, reg(f[0])),
        ADR => thumb16_adr(ir, reg(f[0]), f[1]),
        ADD_sp_t1 => thumb16_add_sp_t1(ir, reg(f[0]), f[1]),
        ADD_sp_t2 => thumb16_add_sp_t2(ir, f[0]),
        SUB_sp => thumb16_sub_sp(ir, f[0]),
        SXTH => thumb16_sxth(ir, reg(f[0]), reg(f[1])),
        SXTB => thumb16_sxtb(ir, reg(f[0]), reg(f[1])),
        UXTH => thumb16_uxth(ir, reg(f[0]), reg(f[1])),
        UXTB => thumb16_uxtb(ir, reg(f[0]), reg(f[1])),
        PUSH => thumb16_push(ir, f[0] != 0, f[1] as u16),
        POP => thumb16_pop(ir, f[0] != 0, f[1] as u16),
        REV => thumb16_rev(ir, reg(f[0]), reg(f[1])),
        REV16 => thumb16_rev16(ir, reg(f[0]), reg(f[1])),
        REVSH => thumb16_revsh(ir, reg(f[0]), reg(f[1])),
        STMIA => thumb16_stmia(ir, reg(f[0]), f[1] as u16),
        LDMIA => thumb16_ldmia(ir, reg(f[0]), f[1] as u16),
        UDF => thumb16_udf(ir),
        SVC => thumb16_svc(ir, f[0]),
        B_t1 => thumb16_b_cond(ir, f[0], f[1]),
        B_t2 => thumb16_b_uncond(ir, f[0]),
    }
}

/// Undefined encoding: hand the instruction to the interpreter and stop.
pub fn thumb16_udf(ir: &mut A32IREmitter) -> bool {
    let loc = ir.current_location.to_location();
    ir.set_term(Terminal::interpret(loc));
    false
}

/// Architecturally UNPREDICTABLE encoding. Must never execute silently.
fn unpredictable_instruction() -> bool {
    panic!("UNPREDICTABLE instruction encoding");
}

fn reg(field: u32) -> Reg {
    Reg::from_u32(field)
}

fn hi_reg(hi: bool, lo: Reg) -> Reg {
    if hi { Reg::from_u32(lo.number() as u32 + 8) } else { lo }
}

fn set_nz(ir: &mut A32IREmitter, result: Value) {
    let n = ir.ir().most_significant_bit(result);
    ir.set_n_flag(n);
    let z = ir.ir().is_zero(result);
    ir.set_z_flag(z);
}

fn set_nzcv(ir: &mut A32IREmitter, result: Value) {
    set_nz(ir, result);
    let carry = ir.ir().get_carry_from_op(result);
    ir.set_c_flag(carry);
    let overflow = ir.ir().get_overflow_from_op(result);
    ir.set_v_flag(overflow);
}

// --- Shift (immediate) ---

fn thumb16_shift_imm(ir: &mut A32IREmitter, shift_type: ShiftType, imm5: u32, m: Reg, d: Reg) -> bool {
    // LSLS/LSRS/ASRS <Rd>, <Rm>, #<imm5>
    let cpsr_c = ir.get_c_flag();
    let rm = ir.get_register(m);
    let (result, carry) = emit_imm_shift(ir, rm, shift_type, imm5, cpsr_c);
    ir.set_register(d, result);
    set_nz(ir, result);
    ir.set_c_flag(carry);
    true
}

// --- Add/subtract ---

fn thumb16_add_reg(ir: &mut A32IREmitter, m: Reg, n: Reg, d: Reg) -> bool {
    // ADDS <Rd>, <Rn>, <Rm>
    // Rd cannot encode R15.
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let result = ir.ir().add_with_carry(rn, rm, Value::ImmU1(false));
    ir.set_register(d, result);
    set_nzcv(ir, result);
    true
}

fn thumb16_sub_reg(ir: &mut A32IREmitter, m: Reg, n: Reg, d: Reg) -> bool {
    // SUBS <Rd>, <Rn>, <Rm>
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let result = ir.ir().sub_with_carry(rn, rm, Value::ImmU1(true));
    ir.set_register(d, result);
    set_nzcv(ir, result);
    true
}

fn thumb16_add_imm(ir: &mut A32IREmitter, imm32: u32, n: Reg, d: Reg) -> bool {
    // ADDS <Rd>, <Rn>, #<imm>
    let rn = ir.get_register(n);
    let result = ir.ir().add_with_carry(rn, Value::ImmU32(imm32), Value::ImmU1(false));
    ir.set_register(d, result);
    set_nzcv(ir, result);
    true
}

fn thumb16_sub_imm(ir: &mut A32IREmitter, imm32: u32, n: Reg, d: Reg) -> bool {
    // SUBS <Rd>, <Rn>, #<imm>
    let rn = ir.get_register(n);
    let result = ir.ir().sub_with_carry(rn, Value::ImmU32(imm32), Value::ImmU1(true));
    ir.set_register(d, result);
    set_nzcv(ir, result);
    true
}

fn thumb16_mov_imm(ir: &mut A32IREmitter, d: Reg, imm8: u32) -> bool {
    // MOVS <Rd>, #<imm8>
    // Rd cannot encode R15.
    let result = Value::ImmU32(imm8);
    ir.set_register(d, result);
    set_nz(ir, result);
    true
}

fn thumb16_cmp_imm(ir: &mut A32IREmitter, n: Reg, imm8: u32) -> bool {
    // CMP <Rn>, #<imm8>
    let rn = ir.get_register(n);
    let result = ir.ir().sub_with_carry(rn, Value::ImmU32(imm8), Value::ImmU1(true));
    set_nzcv(ir, result);
    true
}

// --- Data processing ---

fn thumb16_and_reg(ir: &mut A32IREmitter, m: Reg, d_n: Reg) -> bool {
    // ANDS <Rdn>, <Rm>
    let rn = ir.get_register(d_n);
    let rm = ir.get_register(m);
    let result = ir.ir().and_(rn, rm);
    ir.set_register(d_n, result);
    set_nz(ir, result);
    true
}

fn thumb16_eor_reg(ir: &mut A32IREmitter, m: Reg, d_n: Reg) -> bool {
    // EORS <Rdn>, <Rm>
    let rn = ir.get_register(d_n);
    let rm = ir.get_register(m);
    let result = ir.ir().eor(rn, rm);
    ir.set_register(d_n, result);
    set_nz(ir, result);
    true
}

fn thumb16_shift_reg(ir: &mut A32IREmitter, shift_type: ShiftType, m: Reg, d_n: Reg) -> bool {
    // LSLS/LSRS/ASRS/RORS <Rdn>, <Rm>
    // The shift amount is the bottom byte of Rm.
    let rm = ir.get_register(m);
    let shift_n = ir.ir().least_significant_byte(rm);
    let cpsr_c = ir.get_c_flag();
    let rn = ir.get_register(d_n);
    let result = match shift_type {
        ShiftType::LSL => ir.ir().logical_shift_left(rn, shift_n, cpsr_c),
        ShiftType::LSR => ir.ir().logical_shift_right(rn, shift_n, cpsr_c),
        ShiftType::ASR => ir.ir().arithmetic_shift_right(rn, shift_n, cpsr_c),
        ShiftType::ROR => ir.ir().rotate_right(rn, shift_n, cpsr_c),
    };
    ir.set_register(d_n, result);
    set_nz(ir, result);
    let carry = ir.ir().get_carry_from_op(result);
    ir.set_c_flag(carry);
    true
}

fn thumb16_adc_reg(ir: &mut A32IREmitter, m: Reg, d_n: Reg) -> bool {
    // ADCS <Rdn>, <Rm>
    let apsr_c = ir.get_c_flag();
    let rn = ir.get_register(d_n);
    let rm = ir.get_register(m);
    let result = ir.ir().add_with_carry(rn, rm, apsr_c);
    ir.set_register(d_n, result);
    set_nzcv(ir, result);
    true
}

fn thumb16_sbc_reg(ir: &mut A32IREmitter, m: Reg, d_n: Reg) -> bool {
    // SBCS <Rdn>, <Rm>
    let apsr_c = ir.get_c_flag();
    let rn = ir.get_register(d_n);
    let rm = ir.get_register(m);
    let result = ir.ir().sub_with_carry(rn, rm, apsr_c);
    ir.set_register(d_n, result);
    set_nzcv(ir, result);
    true
}

fn thumb16_tst_reg(ir: &mut A32IREmitter, m: Reg, n: Reg) -> bool {
    // TST <Rn>, <Rm>
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let result = ir.ir().and_(rn, rm);
    set_nz(ir, result);
    true
}

fn thumb16_rsb_imm(ir: &mut A32IREmitter, n: Reg, d: Reg) -> bool {
    // RSBS <Rd>, <Rn>, #0
    let rn = ir.get_register(n);
    let result = ir.ir().sub_with_carry(Value::ImmU32(0), rn, Value::ImmU1(true));
    ir.set_register(d, result);
    set_nzcv(ir, result);
    true
}

fn thumb16_cmp_reg(ir: &mut A32IREmitter, m: Reg, n: Reg) -> bool {
    // CMP <Rn>, <Rm>
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let result = ir.ir().sub_with_carry(rn, rm, Value::ImmU1(true));
    set_nzcv(ir, result);
    true
}

fn thumb16_cmn_reg(ir: &mut A32IREmitter, m: Reg, n: Reg) -> bool {
    // CMN <Rn>, <Rm>
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let result = ir.ir().add_with_carry(rn, rm, Value::ImmU1(false));
    set_nzcv(ir, result);
    true
}

fn thumb16_orr_reg(ir: &mut A32IREmitter, m: Reg, d_n: Reg) -> bool {
    // ORRS <Rdn>, <Rm>
    let rn = ir.get_register(d_n);
    let rm = ir.get_register(m);
    let result = ir.ir().or_(rm, rn);
    ir.set_register(d_n, result);
    set_nz(ir, result);
    true
}

fn thumb16_mul_reg(ir: &mut A32IREmitter, n: Reg, d_m: Reg) -> bool {
    // MULS <Rdm>, <Rn>, <Rdm>
    let rn = ir.get_register(n);
    let rm = ir.get_register(d_m);
    let result = ir.ir().mul(rn, rm);
    ir.set_register(d_m, result);
    set_nz(ir, result);
    true
}

fn thumb16_bic_reg(ir: &mut A32IREmitter, m: Reg, d_n: Reg) -> bool {
    // BICS <Rdn>, <Rm>
    let rn = ir.get_register(d_n);
    let rm = ir.get_register(m);
    let not_rm = ir.ir().not_(rm);
    let result = ir.ir().and_(rn, not_rm);
    ir.set_register(d_n, result);
    set_nz(ir, result);
    true
}

fn thumb16_mvn_reg(ir: &mut A32IREmitter, m: Reg, d: Reg) -> bool {
    // MVNS <Rd>, <Rm>
    let rm = ir.get_register(m);
    let result = ir.ir().not_(rm);
    ir.set_register(d, result);
    set_nz(ir, result);
    true
}

// --- Special data (high registers) ---

fn thumb16_add_reg_t2(ir: &mut A32IREmitter, d_n_hi: bool, m: Reg, d_n_lo: Reg) -> bool {
    let d_n = hi_reg(d_n_hi, d_n_lo);
    if d_n == Reg::PC && m == Reg::PC {
        return unpredictable_instruction();
    }
    // ADD <Rdn>, <Rm>
    let rn = ir.get_register(d_n);
    let rm = ir.get_register(m);
    let result = ir.ir().add_with_carry(rn, rm, Value::ImmU1(false));
    if d_n == Reg::PC {
        ir.alu_write_pc(result);
        // The target is data-dependent; stop compilation here.
        ir.set_term(Terminal::ReturnToDispatch);
        return false;
    }
    ir.set_register(d_n, result);
    true
}

fn thumb16_cmp_reg_t2(ir: &mut A32IREmitter, n_hi: bool, m: Reg, n_lo: Reg) -> bool {
    let n = hi_reg(n_hi, n_lo);
    if n < Reg::R8 && m < Reg::R8 {
        return unpredictable_instruction();
    }
    if n == Reg::PC || m == Reg::PC {
        return unpredictable_instruction();
    }
    // CMP <Rn>, <Rm>
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let result = ir.ir().sub_with_carry(rn, rm, Value::ImmU1(true));
    set_nzcv(ir, result);
    true
}

fn thumb16_mov_reg(ir: &mut A32IREmitter, d_hi: bool, m: Reg, d_lo: Reg) -> bool {
    let d = hi_reg(d_hi, d_lo);
    // MOV <Rd>, <Rm>
    let result = ir.get_register(m);
    if d == Reg::PC {
        ir.alu_write_pc(result);
        ir.set_term(Terminal::ReturnToDispatch);
        return false;
    }
    ir.set_register(d, result);
    true
}

// --- Branches ---

fn thumb16_bx(ir: &mut A32IREmitter, m: Reg) -> bool {
    // BX <Rm>
    let target = ir.get_register(m);
    ir.bx_write_pc(target);
    ir.set_term(Terminal::ReturnToDispatch);
    false
}

fn thumb16_blx_reg(ir: &mut A32IREmitter, m: Reg) -> bool {
    // BLX <Rm>
    let target = ir.get_register(m);
    let return_addr = ir.pc().wrapping_add(2) | 1; // Thumb bit
    ir.set_register(Reg::LR, Value::ImmU32(return_addr));
    ir.bx_write_pc(target);
    ir.set_term(Terminal::ReturnToDispatch);
    false
}

fn thumb16_b_cond(ir: &mut A32IREmitter, cond: u32, imm8: u32) -> bool {
    // B<cond> <label>
    let cond = crate::ir::cond::Cond::from_u8(cond as u8);
    let offset = sign_extend(imm8 << 1, 9) as i32;
    let target_pc = (ir.read_pc() as i32).wrapping_add(offset) as u32;

    let next = ir.current_location.advance_pc(2);
    let target = ir.current_location.set_pc(target_pc);

    ir.set_term(Terminal::if_then_else(
        cond,
        Terminal::link_block(target.to_location()),
        Terminal::link_block(next.to_location()),
    ));
    false
}

fn thumb16_b_uncond(ir: &mut A32IREmitter, imm11: u32) -> bool {
    // B <label>
    let offset = sign_extend(imm11 << 1, 12) as i32;
    let target_pc = (ir.read_pc() as i32).wrapping_add(offset) as u32;

    let target = ir.current_location.set_pc(target_pc);
    ir.set_term(Terminal::link_block(target.to_location()));
    false
}

// --- Load/store ---

fn thumb16_ldr_literal(ir: &mut A32IREmitter, t: Reg, imm8: u32) -> bool {
    // LDR <Rt>, <label>
    // Rt cannot encode R15.
    let imm32 = imm8 << 2;
    let address = ir.align_pc(4).wrapping_add(imm32);
    let data = ir.read_memory_32(Value::ImmU32(address));
    ir.set_register(t, data);
    true
}

fn thumb16_str_reg(ir: &mut A32IREmitter, m: Reg, n: Reg, t: Reg) -> bool {
    // STR <Rt>, [<Rn>, <Rm>]
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let address = ir.ir().add(rn, rm);
    let data = ir.get_register(t);
    ir.write_memory_32(address, data);
    true
}

fn thumb16_strh_reg(ir: &mut A32IREmitter, m: Reg, n: Reg, t: Reg) -> bool {
    // STRH <Rt>, [<Rn>, <Rm>]
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let address = ir.ir().add(rn, rm);
    let rt = ir.get_register(t);
    let data = ir.ir().least_significant_half(rt);
    ir.write_memory_16(address, data);
    true
}

fn thumb16_strb_reg(ir: &mut A32IREmitter, m: Reg, n: Reg, t: Reg) -> bool {
    // STRB <Rt>, [<Rn>, <Rm>]
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let address = ir.ir().add(rn, rm);
    let rt = ir.get_register(t);
    let data = ir.ir().least_significant_byte(rt);
    ir.write_memory_8(address, data);
    true
}

fn thumb16_ldrsb_reg(ir: &mut A32IREmitter, m: Reg, n: Reg, t: Reg) -> bool {
    // LDRSB <Rt>, [<Rn>, <Rm>]
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let address = ir.ir().add(rn, rm);
    let data = ir.read_memory_8(address);
    let extended = ir.ir().sign_extend_byte_to_word(data);
    ir.set_register(t, extended);
    true
}

fn thumb16_ldr_reg(ir: &mut A32IREmitter, m: Reg, n: Reg, t: Reg) -> bool {
    // LDR <Rt>, [<Rn>, <Rm>]
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let address = ir.ir().add(rn, rm);
    let data = ir.read_memory_32(address);
    ir.set_register(t, data);
    true
}

fn thumb16_ldrh_reg(ir: &mut A32IREmitter, m: Reg, n: Reg, t: Reg) -> bool {
    // LDRH <Rt>, [<Rn>, <Rm>]
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let address = ir.ir().add(rn, rm);
    let data = ir.read_memory_16(address);
    let extended = ir.ir().zero_extend_half_to_word(data);
    ir.set_register(t, extended);
    true
}

fn thumb16_ldrb_reg(ir: &mut A32IREmitter, m: Reg, n: Reg, t: Reg) -> bool {
    // LDRB <Rt>, [<Rn>, <Rm>]
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let address = ir.ir().add(rn, rm);
    let data = ir.read_memory_8(address);
    let extended = ir.ir().zero_extend_byte_to_word(data);
    ir.set_register(t, extended);
    true
}

fn thumb16_ldrsh_reg(ir: &mut A32IREmitter, m: Reg, n: Reg, t: Reg) -> bool {
    // LDRSH <Rt>, [<Rn>, <Rm>]
    let rn = ir.get_register(n);
    let rm = ir.get_register(m);
    let address = ir.ir().add(rn, rm);
    let data = ir.read_memory_16(address);
    let extended = ir.ir().sign_extend_half_to_word(data);
    ir.set_register(t, extended);
    true
}

fn thumb16_str_imm(ir: &mut A32IREmitter, imm32: u32, n: Reg, t: Reg) -> bool {
    // STR <Rt>, [<Rn>, #<imm>]
    let rn = ir.get_register(n);
    let address = ir.ir().add(rn, Value::ImmU32(imm32));
    let data = ir.get_register(t);
    ir.write_memory_32(address, data);
    true
}

fn thumb16_ldr_imm(ir: &mut A32IREmitter, imm32: u32, n: Reg, t: Reg) -> bool {
    // LDR <Rt>, [<Rn>, #<imm>]
    let rn = ir.get_register(n);
    let address = ir.ir().add(rn, Value::ImmU32(imm32));
    let data = ir.read_memory_32(address);
    ir.set_register(t, data);
    true
}

fn thumb16_strb_imm(ir: &mut A32IREmitter, imm5: u32, n: Reg, t: Reg) -> bool {
    // STRB <Rt>, [<Rn>, #<imm5>]
    let rn = ir.get_register(n);
    let address = ir.ir().add(rn, Value::ImmU32(imm5));
    let rt = ir.get_register(t);
    let data = ir.ir().least_significant_byte(rt);
    ir.write_memory_8(address, data);
    true
}

fn thumb16_ldrb_imm(ir: &mut A32IREmitter, imm5: u32, n: Reg, t: Reg) -> bool {
    // LDRB <Rt>, [<Rn>, #<imm5>]
    let rn = ir.get_register(n);
    let address = ir.ir().add(rn, Value::ImmU32(imm5));
    let data = ir.read_memory_8(address);
    let extended = ir.ir().zero_extend_byte_to_word(data);
    ir.set_register(t, extended);
    true
}

fn thumb16_strh_imm(ir: &mut A32IREmitter, imm32: u32, n: Reg, t: Reg) -> bool {
    // STRH <Rt>, [<Rn>, #<imm>]
    let rn = ir.get_register(n);
    let address = ir.ir().add(rn, Value::ImmU32(imm32));
    let rt = ir.get_register(t);
    let data = ir.ir().least_significant_half(rt);
    ir.write_memory_16(address, data);
    true
}

fn thumb16_ldrh_imm(ir: &mut A32IREmitter, imm32: u32, n: Reg, t: Reg) -> bool {
    // LDRH <Rt>, [<Rn>, #<imm>]
    let rn = ir.get_register(n);
    let address = ir.ir().add(rn, Value::ImmU32(imm32));
    let data = ir.read_memory_16(address);
    let extended = ir.ir().zero_extend_half_to_word(data);
    ir.set_register(t, extended);
    true
}

// --- Address generation ---

fn thumb16_adr(ir: &mut A32IREmitter, d: Reg, imm8: u32) -> bool {
    // ADR <Rd>, <label>
    let imm32 = imm8 << 2;
    let result = ir.align_pc(4).wrapping_add(imm32);
    ir.set_register(d, Value::ImmU32(result));
    true
}

fn thumb16_add_sp_t1(ir: &mut A32IREmitter, d: Reg, imm8: u32) -> bool {
    // ADD <Rd>, SP, #<imm>
    let imm32 = imm8 << 2;
    let sp = ir.get_register(Reg::SP);
    let result = ir.ir().add_with_carry(sp, Value::ImmU32(imm32), Value::ImmU1(false));
    ir.set_register(d, result);
    true
}

fn thumb16_add_sp_t2(ir: &mut A32IREmitter, imm7: u32) -> bool {
    // ADD SP, SP, #<imm>
    let imm32 = imm7 << 2;
    let sp = ir.get_register(Reg::SP);
    let result = ir.ir().add_with_carry(sp, Value::ImmU32(imm32), Value::ImmU1(false));
    ir.set_register(Reg::SP, result);
    true
}

fn thumb16_sub_sp(ir: &mut A32IREmitter, imm7: u32) -> bool {
    // SUB SP, SP, #<imm>
    let imm32 = imm7 << 2;
    let sp = ir.get_register(Reg::SP);
    let result = ir.ir().sub_with_carry(sp, Value::ImmU32(imm32), Value::ImmU1(true));
    ir.set_register(Reg::SP, result);
    true
}

// --- Extensions ---

fn thumb16_sxth(ir: &mut A32IREmitter, m: Reg, d: Reg) -> bool {
    // SXTH <Rd>, <Rm>
    let rm = ir.get_register(m);
    let half = ir.ir().least_significant_half(rm);
    let result = ir.ir().sign_extend_half_to_word(half);
    ir.set_register(d, result);
    true
}

fn thumb16_sxtb(ir: &mut A32IREmitter, m: Reg, d: Reg) -> bool {
    // SXTB <Rd>, <Rm>
    let rm = ir.get_register(m);
    let byte = ir.ir().least_significant_byte(rm);
    let result = ir.ir().sign_extend_byte_to_word(byte);
    ir.set_register(d, result);
    true
}

fn thumb16_uxth(ir: &mut A32IREmitter, m: Reg, d: Reg) -> bool {
    // UXTH <Rd>, <Rm>
    let rm = ir.get_register(m);
    let half = ir.ir().least_significant_half(rm);
    let result = ir.ir().zero_extend_half_to_word(half);
    ir.set_register(d, result);
    true
}

fn thumb16_uxtb(ir: &mut A32IREmitter, m: Reg, d: Reg) -> bool {
    // UXTB <Rd>, <Rm>
    let rm = ir.get_register(m);
    let byte = ir.ir().least_significant_byte(rm);
    let result = ir.ir().zero_extend_byte_to_word(byte);
    ir.set_register(d, result);
    true
}

// --- Push/pop, load/store multiple ---

fn thumb16_push(ir: &mut A32IREmitter, m_bit: bool, reg_list: u16) -> bool {
    // PUSH <registers>
    let count = reg_list.count_ones() + m_bit as u32;
    let sp = ir.get_register(Reg::SP);
    let new_sp = ir.ir().sub(sp, Value::ImmU32(count * 4));

    let mut address = new_sp;
    for i in 0..8u32 {
        if reg_list & (1 << i) != 0 {
            let value = ir.get_register(Reg::from_u32(i));
            ir.write_memory_32(address, value);
            address = ir.ir().add(address, Value::ImmU32(4));
        }
    }
    if m_bit {
        let lr = ir.get_register(Reg::LR);
        ir.write_memory_32(address, lr);
    }

    ir.set_register(Reg::SP, new_sp);
    true
}

fn thumb16_pop(ir: &mut A32IREmitter, p_bit: bool, reg_list: u16) -> bool {
    // POP <registers>
    let count = reg_list.count_ones() + p_bit as u32;
    let sp = ir.get_register(Reg::SP);

    let mut address = sp;
    for i in 0..8u32 {
        if reg_list & (1 << i) != 0 {
            let value = ir.read_memory_32(address);
            ir.set_register(Reg::from_u32(i), value);
            address = ir.ir().add(address, Value::ImmU32(4));
        }
    }

    if p_bit {
        let value = ir.read_memory_32(address);
        ir.load_write_pc(value);
    }

    let new_sp = ir.ir().add(sp, Value::ImmU32(count * 4));
    ir.set_register(Reg::SP, new_sp);

    if p_bit {
        ir.set_term(Terminal::ReturnToDispatch);
        return false;
    }
    true
}

fn thumb16_stmia(ir: &mut A32IREmitter, n: Reg, reg_list: u16) -> bool {
    // STMIA <Rn>!, <registers>
    let base = ir.get_register(n);
    let mut address = base;
    for i in 0..8u32 {
        if reg_list & (1 << i) != 0 {
            let value = ir.get_register(Reg::from_u32(i));
            ir.write_memory_32(address, value);
            address = ir.ir().add(address, Value::ImmU32(4));
        }
    }
    let count = reg_list.count_ones();
    let new_base = ir.ir().add(base, Value::ImmU32(count * 4));
    ir.set_register(n, new_base);
    true
}

fn thumb16_ldmia(ir: &mut A32IREmitter, n: Reg, reg_list: u16) -> bool {
    // LDMIA <Rn>!, <registers>
    let base = ir.get_register(n);
    let mut address = base;
    for i in 0..8u32 {
        if reg_list & (1 << i) != 0 {
            let value = ir.read_memory_32(address);
            ir.set_register(Reg::from_u32(i), value);
            address = ir.ir().add(address, Value::ImmU32(4));
        }
    }
    // Writeback unless Rn appears in the register list.
    if reg_list & (1 << n.number()) == 0 {
        let count = reg_list.count_ones();
        let new_base = ir.ir().add(base, Value::ImmU32(count * 4));
        ir.set_register(n, new_base);
    }
    true
}

// --- Reversal ---

fn thumb16_rev(ir: &mut A32IREmitter, m: Reg, d: Reg) -> bool {
    // REV <Rd>, <Rm>
    let rm = ir.get_register(m);
    let result = ir.ir().byte_reverse_word(rm);
    ir.set_register(d, result);
    true
}

fn thumb16_rev16(ir: &mut A32IREmitter, m: Reg, d: Reg) -> bool {
    // REV16 <Rd>, <Rm>: byte-reverse each halfword independently,
    // built from the ByteReverseHalf primitive.
    let rm = ir.get_register(m);
    let carry = Value::ImmU1(false);
    let shifted = ir.ir().logical_shift_right(rm, Value::ImmU8(16), carry);
    let upper_half = ir.ir().least_significant_half(shifted);
    let lower_half = ir.ir().least_significant_half(rm);
    let rev_upper = ir.ir().byte_reverse_half(upper_half);
    let rev_upper = ir.ir().zero_extend_half_to_word(rev_upper);
    let rev_lower = ir.ir().byte_reverse_half(lower_half);
    let rev_lower = ir.ir().zero_extend_half_to_word(rev_lower);
    let upper_shifted = ir.ir().logical_shift_left(rev_upper, Value::ImmU8(16), carry);
    let result = ir.ir().or_(upper_shifted, rev_lower);
    ir.set_register(d, result);
    true
}

fn thumb16_revsh(ir: &mut A32IREmitter, m: Reg, d: Reg) -> bool {
    // REVSH <Rd>, <Rm>
    let rm = ir.get_register(m);
    let half = ir.ir().least_significant_half(rm);
    let rev_half = ir.ir().byte_reverse_half(half);
    let result = ir.ir().sign_extend_half_to_word(rev_half);
    ir.set_register(d, result);
    true
}

// --- System ---

fn thumb16_svc(ir: &mut A32IREmitter, imm8: u32) -> bool {
    // SVC #<imm8>
    ir.call_supervisor(imm8);
    false
}

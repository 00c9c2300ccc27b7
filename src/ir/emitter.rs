use crate::ir::block::Block;
use crate::ir::opcode::Opcode;
use crate::ir::terminal::Terminal;
use crate::ir::value::Value;

/// Base IR emitter — the builder API for constructing IR blocks.
/// Wraps a Block and appends instructions to it. Constructors are typed:
/// each returns an SSA handle of the opcode's result type.
pub struct IREmitter<'a> {
    pub block: &'a mut Block,
}

impl<'a> IREmitter<'a> {
    pub fn new(block: &'a mut Block) -> Self {
        Self { block }
    }

    fn emit(&mut self, opcode: Opcode, args: &[Value]) -> Value {
        let r = self.block.append(opcode, args);
        Value::Inst(r)
    }

    fn emit_void(&mut self, opcode: Opcode, args: &[Value]) {
        self.block.append(opcode, args);
    }

    /// Set the block terminal.
    pub fn set_term(&mut self, terminal: Terminal) {
        self.block.set_terminal(terminal);
    }

    // --- Immediates ---

    pub fn imm1(&self, value: bool) -> Value { Value::ImmU1(value) }
    pub fn imm8(&self, value: u8) -> Value { Value::ImmU8(value) }
    pub fn imm16(&self, value: u16) -> Value { Value::ImmU16(value) }
    pub fn imm32(&self, value: u32) -> Value { Value::ImmU32(value) }
    pub fn imm64(&self, value: u64) -> Value { Value::ImmU64(value) }

    // --- Extraction / tests ---

    pub fn least_significant_half(&mut self, value: Value) -> Value {
        self.emit(Opcode::LeastSignificantHalf, &[value])
    }

    pub fn least_significant_byte(&mut self, value: Value) -> Value {
        self.emit(Opcode::LeastSignificantByte, &[value])
    }

    pub fn most_significant_bit(&mut self, value: Value) -> Value {
        self.emit(Opcode::MostSignificantBit, &[value])
    }

    pub fn is_zero(&mut self, value: Value) -> Value {
        self.emit(Opcode::IsZero32, &[value])
    }

    // --- Shifts (result carries a paired carry-out, read via GetCarryFromOp) ---

    pub fn logical_shift_left(&mut self, value: Value, shift: Value, carry_in: Value) -> Value {
        self.emit(Opcode::LogicalShiftLeft32, &[value, shift, carry_in])
    }

    pub fn logical_shift_right(&mut self, value: Value, shift: Value, carry_in: Value) -> Value {
        self.emit(Opcode::LogicalShiftRight32, &[value, shift, carry_in])
    }

    pub fn arithmetic_shift_right(&mut self, value: Value, shift: Value, carry_in: Value) -> Value {
        self.emit(Opcode::ArithmeticShiftRight32, &[value, shift, carry_in])
    }

    pub fn rotate_right(&mut self, value: Value, shift: Value, carry_in: Value) -> Value {
        self.emit(Opcode::RotateRight32, &[value, shift, carry_in])
    }

    pub fn rotate_right_extended(&mut self, value: Value, carry_in: Value) -> Value {
        self.emit(Opcode::RotateRightExtended, &[value, carry_in])
    }

    // --- ALU ---

    /// AddWithCarry(a, b, carry_in); carry/overflow via the FromOp pseudo-ops.
    pub fn add_with_carry(&mut self, a: Value, b: Value, carry_in: Value) -> Value {
        self.emit(Opcode::Add32, &[a, b, carry_in])
    }

    /// SubWithCarry(a, b, carry_in) == AddWithCarry(a, ~b, carry_in).
    pub fn sub_with_carry(&mut self, a: Value, b: Value, carry_in: Value) -> Value {
        self.emit(Opcode::Sub32, &[a, b, carry_in])
    }

    pub fn add(&mut self, a: Value, b: Value) -> Value {
        self.add_with_carry(a, b, Value::ImmU1(false))
    }

    pub fn sub(&mut self, a: Value, b: Value) -> Value {
        self.sub_with_carry(a, b, Value::ImmU1(true))
    }

    pub fn mul(&mut self, a: Value, b: Value) -> Value {
        self.emit(Opcode::Mul32, &[a, b])
    }

    pub fn and_(&mut self, a: Value, b: Value) -> Value {
        self.emit(Opcode::And32, &[a, b])
    }

    pub fn eor(&mut self, a: Value, b: Value) -> Value {
        self.emit(Opcode::Eor32, &[a, b])
    }

    pub fn or_(&mut self, a: Value, b: Value) -> Value {
        self.emit(Opcode::Or32, &[a, b])
    }

    pub fn not_(&mut self, a: Value) -> Value {
        self.emit(Opcode::Not32, &[a])
    }

    // --- Flags pseudo-ops ---

    pub fn get_carry_from_op(&mut self, value: Value) -> Value {
        self.emit(Opcode::GetCarryFromOp, &[value])
    }

    pub fn get_overflow_from_op(&mut self, value: Value) -> Value {
        self.emit(Opcode::GetOverflowFromOp, &[value])
    }

    // --- Extension ---

    pub fn sign_extend_byte_to_word(&mut self, a: Value) -> Value {
        self.emit(Opcode::SignExtendByteToWord, &[a])
    }

    pub fn sign_extend_half_to_word(&mut self, a: Value) -> Value {
        self.emit(Opcode::SignExtendHalfToWord, &[a])
    }

    pub fn zero_extend_byte_to_word(&mut self, a: Value) -> Value {
        self.emit(Opcode::ZeroExtendByteToWord, &[a])
    }

    pub fn zero_extend_half_to_word(&mut self, a: Value) -> Value {
        self.emit(Opcode::ZeroExtendHalfToWord, &[a])
    }

    // --- Byte reversal ---

    pub fn byte_reverse_word(&mut self, a: Value) -> Value {
        self.emit(Opcode::ByteReverseWord, &[a])
    }

    pub fn byte_reverse_half(&mut self, a: Value) -> Value {
        self.emit(Opcode::ByteReverseHalf, &[a])
    }

    // --- FP vector ---

    pub fn fp_vector_abs(&mut self, esize: usize, a: Value) -> Value {
        let op = match esize {
            16 => Opcode::FPVectorAbs16,
            32 => Opcode::FPVectorAbs32,
            64 => Opcode::FPVectorAbs64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a])
    }

    pub fn fp_vector_neg(&mut self, esize: usize, a: Value) -> Value {
        let op = match esize {
            16 => Opcode::FPVectorNeg16,
            32 => Opcode::FPVectorNeg32,
            64 => Opcode::FPVectorNeg64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a])
    }

    pub fn fp_vector_add(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorAdd32,
            64 => Opcode::FPVectorAdd64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_sub(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorSub32,
            64 => Opcode::FPVectorSub64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_mul(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorMul32,
            64 => Opcode::FPVectorMul64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_div(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorDiv32,
            64 => Opcode::FPVectorDiv64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_max(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorMax32,
            64 => Opcode::FPVectorMax64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_min(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorMin32,
            64 => Opcode::FPVectorMin64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    /// Fused multiply-add: addend + op1 * op2.
    pub fn fp_vector_mul_add(&mut self, esize: usize, addend: Value, op1: Value, op2: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorMulAdd32,
            64 => Opcode::FPVectorMulAdd64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[addend, op1, op2])
    }

    pub fn fp_vector_paired_add(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorPairedAdd32,
            64 => Opcode::FPVectorPairedAdd64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_paired_add_lower(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorPairedAddLower32,
            64 => Opcode::FPVectorPairedAddLower64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_recip_estimate(&mut self, esize: usize, a: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorRecipEstimate32,
            64 => Opcode::FPVectorRecipEstimate64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a])
    }

    pub fn fp_vector_recip_step_fused(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorRecipStepFused32,
            64 => Opcode::FPVectorRecipStepFused64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_rsqrt_estimate(&mut self, esize: usize, a: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorRSqrtEstimate32,
            64 => Opcode::FPVectorRSqrtEstimate64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a])
    }

    pub fn fp_vector_rsqrt_step_fused(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorRSqrtStepFused32,
            64 => Opcode::FPVectorRSqrtStepFused64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_equal(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorEqual32,
            64 => Opcode::FPVectorEqual64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_greater(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorGreater32,
            64 => Opcode::FPVectorGreater64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_greater_equal(&mut self, esize: usize, a: Value, b: Value) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorGreaterEqual32,
            64 => Opcode::FPVectorGreaterEqual64,
            _ => panic!("Invalid esize {}", esize),
        };
        self.emit(op, &[a, b])
    }

    pub fn fp_vector_s32_to_single(&mut self, a: Value) -> Value {
        self.emit(Opcode::FPVectorS32ToSingle, &[a])
    }

    pub fn fp_vector_s64_to_double(&mut self, a: Value) -> Value {
        self.emit(Opcode::FPVectorS64ToDouble, &[a])
    }

    pub fn fp_vector_u32_to_single(&mut self, a: Value) -> Value {
        self.emit(Opcode::FPVectorU32ToSingle, &[a])
    }

    pub fn fp_vector_u64_to_double(&mut self, a: Value) -> Value {
        self.emit(Opcode::FPVectorU64ToDouble, &[a])
    }

    pub fn fp_vector_to_signed_fixed(&mut self, esize: usize, a: Value, fbits: u8, rounding: u8) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorToSignedFixed32,
            64 => Opcode::FPVectorToSignedFixed64,
            _ => panic!("Invalid esize {}", esize),
        };
        assert!((fbits as usize) < esize, "fbits {} out of range for esize {}", fbits, esize);
        self.emit(op, &[a, Value::ImmU8(fbits), Value::ImmU8(rounding)])
    }

    pub fn fp_vector_to_unsigned_fixed(&mut self, esize: usize, a: Value, fbits: u8, rounding: u8) -> Value {
        let op = match esize {
            32 => Opcode::FPVectorToUnsignedFixed32,
            64 => Opcode::FPVectorToUnsignedFixed64,
            _ => panic!("Invalid esize {}", esize),
        };
        assert!((fbits as usize) < esize, "fbits {} out of range for esize {}", fbits, esize);
        self.emit(op, &[a, Value::ImmU8(fbits), Value::ImmU8(rounding)])
    }

    pub(crate) fn emit_raw(&mut self, opcode: Opcode, args: &[Value]) -> Value {
        self.emit(opcode, args)
    }

    pub(crate) fn emit_raw_void(&mut self, opcode: Opcode, args: &[Value]) {
        self.emit_void(opcode, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::location::LocationDescriptor;
    use crate::ir::value::InstRef;

    #[test]
    fn test_emitter_build_add() {
        let mut block = Block::new(LocationDescriptor(0x1000));
        {
            let mut e = IREmitter::new(&mut block);
            let a = e.imm32(5);
            let b = e.imm32(3);
            let carry = e.imm1(false);
            let _result = e.add_with_carry(a, b, carry);
        }
        assert_eq!(block.inst_count(), 1);
        assert_eq!(block.get(InstRef(0)).opcode, Opcode::Add32);
    }

    #[test]
    fn test_emitter_fp_vector_ops() {
        let mut block = Block::new(LocationDescriptor(0));
        {
            let mut e = IREmitter::new(&mut block);
            let a = e.imm64(0);
            let add = e.fp_vector_add(32, a, a);
            let _fix = e.fp_vector_to_signed_fixed(32, add, 0, 3);
        }
        assert_eq!(block.get(InstRef(0)).opcode, Opcode::FPVectorAdd32);
        assert_eq!(block.get(InstRef(1)).opcode, Opcode::FPVectorToSignedFixed32);
    }

    #[test]
    #[should_panic]
    fn test_emitter_rejects_bad_esize() {
        let mut block = Block::new(LocationDescriptor(0));
        let mut e = IREmitter::new(&mut block);
        let a = e.imm64(0);
        e.fp_vector_add(16, a, a);
    }
}

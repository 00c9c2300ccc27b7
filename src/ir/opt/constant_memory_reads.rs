use crate::callbacks::UserCallbacks;
use crate::ir::block::Block;
use crate::ir::opcode::Opcode;
use crate::ir::value::{InstRef, Value};

/// Fold loads from read-only guest memory into immediate constants.
///
/// For each memory read whose address is an immediate and which the callbacks
/// report as read-only, all uses of the load are replaced with the value read
/// at translation time; the load itself becomes dead. Also eliminates the
/// trivial dead store `SetCFlag(GetCFlag())`.
///
/// The pass walks instructions in order and never moves anything, so
/// side-effecting operations keep their relative order.
pub fn constant_memory_reads(block: &mut Block, cb: &dyn UserCallbacks) {
    for i in 0..block.instructions.len() {
        let inst_ref = InstRef(i as u32);
        if block.instructions[i].is_tombstone() {
            continue;
        }

        match block.instructions[i].opcode {
            Opcode::A32SetCFlag => {
                let arg = block.instructions[i].arg(0);
                if let Value::Inst(src) = arg {
                    if block.get(src).opcode == Opcode::A32GetCFlag {
                        block.invalidate(inst_ref);
                    }
                }
            }
            Opcode::A32ReadMemory8 => {
                if !block.instructions[i].are_all_args_immediates() {
                    continue;
                }
                let vaddr = block.instructions[i].arg(0).get_u32();
                if cb.is_read_only_memory(vaddr) {
                    let value = cb.memory_read_8(vaddr);
                    block.replace_uses_with(inst_ref, Value::ImmU8(value));
                }
            }
            Opcode::A32ReadMemory16 => {
                if !block.instructions[i].are_all_args_immediates() {
                    continue;
                }
                let vaddr = block.instructions[i].arg(0).get_u32();
                if cb.is_read_only_memory(vaddr) {
                    let value = cb.memory_read_16(vaddr);
                    block.replace_uses_with(inst_ref, Value::ImmU16(value));
                }
            }
            Opcode::A32ReadMemory32 => {
                if !block.instructions[i].are_all_args_immediates() {
                    continue;
                }
                let vaddr = block.instructions[i].arg(0).get_u32();
                if cb.is_read_only_memory(vaddr) {
                    let value = cb.memory_read_32(vaddr);
                    block.replace_uses_with(inst_ref, Value::ImmU32(value));
                }
            }
            Opcode::A32ReadMemory64 => {
                if !block.instructions[i].are_all_args_immediates() {
                    continue;
                }
                let vaddr = block.instructions[i].arg(0).get_u32();
                if cb.is_read_only_memory(vaddr) {
                    let value = cb.memory_read_64(vaddr);
                    block.replace_uses_with(inst_ref, Value::ImmU64(value));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::thumb::types::Reg;
    use crate::ir::location::LocationDescriptor;

    struct RomCallbacks;

    impl UserCallbacks for RomCallbacks {
        fn memory_read_8(&self, _vaddr: u32) -> u8 { 0xEF }
        fn memory_read_16(&self, _vaddr: u32) -> u16 { 0xBEEF }
        fn memory_read_32(&self, vaddr: u32) -> u32 {
            if vaddr == 0x8000 { 0xDEAD_BEEF } else { 0 }
        }
        fn memory_read_64(&self, _vaddr: u32) -> u64 { 0xDEAD_BEEF_DEAD_BEEF }
        fn is_read_only_memory(&self, vaddr: u32) -> bool {
            vaddr < 0x1_0000
        }
        fn call_svc(&mut self, _swi: u32) {}
    }

    struct RamCallbacks;

    impl UserCallbacks for RamCallbacks {
        fn memory_read_8(&self, _vaddr: u32) -> u8 { 0 }
        fn memory_read_16(&self, _vaddr: u32) -> u16 { 0 }
        fn memory_read_32(&self, _vaddr: u32) -> u32 { 0 }
        fn memory_read_64(&self, _vaddr: u32) -> u64 { 0 }
        fn call_svc(&mut self, _swi: u32) {}
    }

    #[test]
    fn test_fold_read_only_load() {
        let mut block = Block::new(LocationDescriptor(0));
        let load = block.append(Opcode::A32ReadMemory32, &[Value::ImmU32(0x8000)]);
        let store = block.append(
            Opcode::A32SetRegister,
            &[Value::ImmReg(Reg::R0), Value::Inst(load)],
        );

        constant_memory_reads(&mut block, &RomCallbacks);

        // All uses see the immediate; the load micro-op is dead.
        assert_eq!(block.get(store).args[1], Value::ImmU32(0xDEAD_BEEF));
        assert!(block.get(load).is_tombstone());
    }

    #[test]
    fn test_non_readonly_load_untouched() {
        let mut block = Block::new(LocationDescriptor(0));
        let load = block.append(Opcode::A32ReadMemory32, &[Value::ImmU32(0x8000)]);
        block.append(
            Opcode::A32SetRegister,
            &[Value::ImmReg(Reg::R0), Value::Inst(load)],
        );

        constant_memory_reads(&mut block, &RamCallbacks);
        assert!(!block.get(load).is_tombstone());
    }

    #[test]
    fn test_non_immediate_address_untouched() {
        let mut block = Block::new(LocationDescriptor(0));
        let base = block.append(Opcode::A32GetRegister, &[Value::ImmReg(Reg::R1)]);
        let load = block.append(Opcode::A32ReadMemory32, &[Value::Inst(base)]);
        block.append(
            Opcode::A32SetRegister,
            &[Value::ImmReg(Reg::R0), Value::Inst(load)],
        );

        constant_memory_reads(&mut block, &RomCallbacks);
        assert!(!block.get(load).is_tombstone());
    }

    #[test]
    fn test_set_c_flag_of_get_c_flag_is_invalidated() {
        let mut block = Block::new(LocationDescriptor(0));
        let c = block.append(Opcode::A32GetCFlag, &[]);
        let set = block.append(Opcode::A32SetCFlag, &[Value::Inst(c)]);

        constant_memory_reads(&mut block, &RamCallbacks);
        assert!(block.get(set).is_tombstone());
        assert_eq!(block.get(c).use_count, 0);
    }

    #[test]
    fn test_set_c_flag_of_other_value_kept() {
        let mut block = Block::new(LocationDescriptor(0));
        let r = block.append(Opcode::A32GetRegister, &[Value::ImmReg(Reg::R0)]);
        let bit = block.append(Opcode::MostSignificantBit, &[Value::Inst(r)]);
        let set = block.append(Opcode::A32SetCFlag, &[Value::Inst(bit)]);

        constant_memory_reads(&mut block, &RamCallbacks);
        assert!(!block.get(set).is_tombstone());
    }
}

use crate::ir::block::Block;
use crate::ir::value::Value;

/// Dead code elimination pass.
/// Iterates instructions in reverse order. Any instruction with no uses and
/// no side effects is tombstoned. Removing an instruction decrements use
/// counts for its arguments, potentially enabling further eliminations.
pub fn dead_code_elimination(block: &mut Block) {
    for i in (0..block.instructions.len()).rev() {
        let inst = &block.instructions[i];
        if inst.is_tombstone() {
            continue;
        }
        if inst.use_count == 0 && !inst.has_side_effects() {
            let num_args = inst.num_args();
            let arg_refs: Vec<_> = (0..num_args)
                .filter_map(|j| {
                    if let Value::Inst(r) = inst.args[j] { Some(r) } else { None }
                })
                .collect();

            block.instructions[i].tombstone();

            for arg_ref in &arg_refs {
                let target = &mut block.instructions[arg_ref.index()];
                if target.use_count > 0 {
                    target.use_count -= 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::thumb::types::Reg;
    use crate::ir::location::LocationDescriptor;
    use crate::ir::opcode::Opcode;

    #[test]
    fn test_dce_removes_unused() {
        let mut block = Block::new(LocationDescriptor(0));
        let _unused = block.append(Opcode::Add32, &[
            Value::ImmU32(1), Value::ImmU32(2), Value::ImmU1(false),
        ]);
        assert_eq!(block.live_inst_count(), 1);

        dead_code_elimination(&mut block);
        assert_eq!(block.live_inst_count(), 0);
    }

    #[test]
    fn test_dce_keeps_side_effects() {
        let mut block = Block::new(LocationDescriptor(0));
        block.append(Opcode::A32SetRegister, &[Value::ImmReg(Reg::R0), Value::ImmU32(1)]);
        dead_code_elimination(&mut block);
        assert_eq!(block.live_inst_count(), 1);
    }

    #[test]
    fn test_dce_cascades() {
        let mut block = Block::new(LocationDescriptor(0));
        let a = block.append(Opcode::A32GetRegister, &[Value::ImmReg(Reg::R0)]);
        let _b = block.append(Opcode::Not32, &[Value::Inst(a)]);

        assert_eq!(block.get(a).use_count, 1);
        dead_code_elimination(&mut block);
        // b removed first (unused), then a becomes unused and is removed
        assert_eq!(block.live_inst_count(), 0);
    }
}

use std::collections::HashMap;

use crate::ir::block::Block;
use crate::ir::value::Value;

/// Block verification pass. Checks structural invariants after translation
/// and optimization:
///  - the terminal has been set;
///  - argument references point at earlier instructions (SSA order);
///  - recorded use counts match actual uses.
///
/// Violations are programming errors and panic.
pub fn verification_pass(block: &Block) {
    assert!(!block.terminal.is_invalid(), "block has no terminal");

    let mut actual_uses: HashMap<usize, u32> = HashMap::new();

    for (i, inst) in block.instructions.iter().enumerate() {
        if inst.is_tombstone() {
            continue;
        }
        for j in 0..inst.num_args() {
            if let Value::Inst(r) = inst.args[j] {
                assert!(
                    r.index() < i,
                    "instruction %{} uses %{} before its definition",
                    i,
                    r.index()
                );
                *actual_uses.entry(r.index()).or_insert(0) += 1;
            }
        }
    }

    for (i, inst) in block.instructions.iter().enumerate() {
        if inst.is_tombstone() {
            continue;
        }
        let counted = actual_uses.get(&i).copied().unwrap_or(0);
        assert_eq!(
            inst.use_count, counted,
            "use count mismatch for %{}: recorded {}, actual {}",
            i, inst.use_count, counted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::thumb::types::Reg;
    use crate::ir::location::LocationDescriptor;
    use crate::ir::opcode::Opcode;
    use crate::ir::terminal::Terminal;

    #[test]
    fn test_verification_accepts_well_formed_block() {
        let mut block = Block::new(LocationDescriptor(0));
        let a = block.append(Opcode::A32GetRegister, &[Value::ImmReg(Reg::R0)]);
        let b = block.append(Opcode::Not32, &[Value::Inst(a)]);
        block.append(Opcode::A32SetRegister, &[Value::ImmReg(Reg::R1), Value::Inst(b)]);
        block.set_terminal(Terminal::ReturnToDispatch);

        verification_pass(&block);
    }

    #[test]
    #[should_panic(expected = "no terminal")]
    fn test_verification_rejects_missing_terminal() {
        let block = Block::new(LocationDescriptor(0));
        verification_pass(&block);
    }

    #[test]
    #[should_panic(expected = "use count mismatch")]
    fn test_verification_rejects_bad_use_count() {
        let mut block = Block::new(LocationDescriptor(0));
        let a = block.append(Opcode::A32GetRegister, &[Value::ImmReg(Reg::R0)]);
        block.append(Opcode::Not32, &[Value::Inst(a)]);
        block.get_mut(a).use_count = 7;
        block.set_terminal(Terminal::ReturnToDispatch);

        verification_pass(&block);
    }
}

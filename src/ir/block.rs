use std::fmt;

use crate::ir::inst::Inst;
use crate::ir::location::LocationDescriptor;
use crate::ir::opcode::Opcode;
use crate::ir::terminal::Terminal;
use crate::ir::value::{InstRef, Value};

/// An IR basic block: a sequence of instructions followed by a terminal.
/// Instructions are stored in a `Vec<Inst>` arena, indexed by `InstRef(u32)`.
/// Removal is done by tombstoning (setting opcode to Void).
#[derive(Debug, Clone)]
pub struct Block {
    /// The location this block represents.
    pub location: LocationDescriptor,
    /// Arena of instructions.
    pub instructions: Vec<Inst>,
    /// Block terminator.
    pub terminal: Terminal,
    /// Number of guest cycles this block represents.
    pub cycle_count: u64,
}

impl Block {
    /// Create a new empty block at the given location.
    pub fn new(location: LocationDescriptor) -> Self {
        Self {
            location,
            instructions: Vec::new(),
            terminal: Terminal::Invalid,
            cycle_count: 0,
        }
    }

    /// Append a new instruction with the given opcode and args, return its
    /// InstRef. Increments use_count for any InstRef arguments.
    pub fn append(&mut self, opcode: Opcode, args: &[Value]) -> InstRef {
        for arg in args {
            if let Value::Inst(r) = arg {
                self.instructions[r.index()].use_count += 1;
            }
        }
        let idx = self.instructions.len();
        self.instructions.push(Inst::new(opcode, args));
        InstRef(idx as u32)
    }

    /// Get an instruction by reference.
    pub fn get(&self, r: InstRef) -> &Inst {
        &self.instructions[r.index()]
    }

    /// Get a mutable instruction by reference.
    pub fn get_mut(&mut self, r: InstRef) -> &mut Inst {
        &mut self.instructions[r.index()]
    }

    /// Set the terminal instruction.
    pub fn set_terminal(&mut self, terminal: Terminal) {
        self.terminal = terminal;
    }

    /// Returns the number of non-tombstoned instructions.
    pub fn live_inst_count(&self) -> usize {
        self.instructions.iter().filter(|i| !i.is_tombstone()).count()
    }

    /// Returns the total number of instruction slots (including tombstones).
    pub fn inst_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Iterate over all live instructions with their InstRefs.
    pub fn iter_live(&self) -> impl Iterator<Item = (InstRef, &Inst)> {
        self.instructions.iter().enumerate()
            .filter(|(_, inst)| !inst.is_tombstone())
            .map(|(i, inst)| (InstRef(i as u32), inst))
    }

    /// Replace all uses of instruction `target` with `replacement`, adjust use
    /// counts, and tombstone the target. Used by optimization passes.
    pub fn replace_uses_with(&mut self, target: InstRef, replacement: Value) {
        // Decrement use counts of the target's own arguments
        let num_args = self.instructions[target.index()].num_args();
        for i in 0..num_args {
            if let Value::Inst(arg_ref) = self.instructions[target.index()].args[i] {
                if self.instructions[arg_ref.index()].use_count > 0 {
                    self.instructions[arg_ref.index()].use_count -= 1;
                }
            }
        }

        let mut replaced_count = 0u32;
        for inst in &mut self.instructions {
            for i in 0..inst.num_args() {
                if inst.args[i] == Value::Inst(target) {
                    inst.args[i] = replacement;
                    replaced_count += 1;
                }
            }
        }

        if let Value::Inst(new_ref) = replacement {
            self.instructions[new_ref.index()].use_count += replaced_count;
        }

        self.instructions[target.index()].use_count = 0;
        self.instructions[target.index()].tombstone();
    }

    /// Invalidate an instruction: drop its arguments' uses and tombstone it.
    /// Callers must know that nothing uses the instruction's result.
    pub fn invalidate(&mut self, target: InstRef) {
        let num_args = self.instructions[target.index()].num_args();
        for i in 0..num_args {
            if let Value::Inst(arg_ref) = self.instructions[target.index()].args[i] {
                if self.instructions[arg_ref.index()].use_count > 0 {
                    self.instructions[arg_ref.index()].use_count -= 1;
                }
            }
        }
        self.instructions[target.index()].use_count = 0;
        self.instructions[target.index()].tombstone();
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Block {} (cycles: {}):", self.location, self.cycle_count)?;
        for (r, inst) in self.iter_live() {
            if inst.return_type() != crate::ir::types::Type::Void {
                writeln!(f, "  {} = {}", r, inst)?;
            } else {
                writeln!(f, "  {}", inst)?;
            }
        }
        writeln!(f, "  terminal: {}", self.terminal)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::thumb::types::Reg;

    #[test]
    fn test_block_creation_and_append() {
        let mut block = Block::new(LocationDescriptor(0x1000));

        let r0 = block.append(Opcode::A32GetRegister, &[Value::ImmReg(Reg::R0)]);
        let r1 = block.append(Opcode::A32GetRegister, &[Value::ImmReg(Reg::R1)]);
        let add = block.append(
            Opcode::Add32,
            &[Value::Inst(r0), Value::Inst(r1), Value::ImmU1(false)],
        );
        block.append(Opcode::A32SetRegister, &[Value::ImmReg(Reg::R2), Value::Inst(add)]);

        assert_eq!(block.inst_count(), 4);
        assert_eq!(block.live_inst_count(), 4);
        assert_eq!(block.get(r0).use_count, 1);
        assert_eq!(block.get(r1).use_count, 1);
        assert_eq!(block.get(add).use_count, 1);

        let s = format!("{}", block);
        assert!(s.contains("Add32"));
        assert!(s.contains("A32GetRegister"));
    }

    #[test]
    fn test_replace_uses_with() {
        let mut block = Block::new(LocationDescriptor(0));
        let load = block.append(Opcode::A32ReadMemory32, &[Value::ImmU32(0x8000)]);
        let user = block.append(
            Opcode::Add32,
            &[Value::Inst(load), Value::ImmU32(1), Value::ImmU1(false)],
        );

        block.replace_uses_with(load, Value::ImmU32(0xDEAD_BEEF));

        assert!(block.get(load).is_tombstone());
        assert_eq!(block.get(user).args[0], Value::ImmU32(0xDEAD_BEEF));
    }

    #[test]
    fn test_invalidate() {
        let mut block = Block::new(LocationDescriptor(0));
        let c = block.append(Opcode::A32GetCFlag, &[]);
        let set = block.append(Opcode::A32SetCFlag, &[Value::Inst(c)]);
        assert_eq!(block.get(c).use_count, 1);

        block.invalidate(set);
        assert!(block.get(set).is_tombstone());
        assert_eq!(block.get(c).use_count, 0);
    }
}

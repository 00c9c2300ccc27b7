use std::collections::HashMap;

use iced_x86::code_asm::{xmmword_ptr, AsmMemoryOperand, CodeAssembler, CodeLabel};
use iced_x86::IcedError;

/// A pool of deduplicated 128-bit constants embedded in the code stream.
///
/// Each constant is referred to through a label; the pool's bytes are
/// emitted once per block, after the far-code region, and the references
/// resolve RIP-relative at assembly time. Slots have no alignment guarantee,
/// so consumers load them with movups.
pub struct ConstantPool {
    constants: HashMap<(u64, u64), CodeLabel>,
    order: Vec<((u64, u64), CodeLabel)>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            constants: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Get a memory operand addressing the 128-bit constant `(lower, upper)`,
    /// inserting it into the pool on first use.
    pub fn get_constant(
        &mut self,
        asm: &mut CodeAssembler,
        lower: u64,
        upper: u64,
    ) -> AsmMemoryOperand {
        let label = match self.constants.get(&(lower, upper)) {
            Some(&label) => label,
            None => {
                let label = asm.create_label();
                self.constants.insert((lower, upper), label);
                self.order.push(((lower, upper), label));
                label
            }
        };
        xmmword_ptr(label)
    }

    /// Number of constants currently pooled.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Emit the pool's bytes at the current position.
    pub fn emit(&mut self, asm: &mut CodeAssembler) -> Result<(), IcedError> {
        for ((lower, upper), label) in &mut self.order {
            let mut bytes = [0u8; 16];
            bytes[..8].copy_from_slice(&lower.to_le_bytes());
            bytes[8..].copy_from_slice(&upper.to_le_bytes());
            asm.set_label(label)?;
            asm.db(&bytes)?;
        }
        Ok(())
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_dedup() {
        let mut asm = CodeAssembler::new(64).unwrap();
        let mut pool = ConstantPool::new();
        pool.get_constant(&mut asm, 0x1234, 0x5678);
        pool.get_constant(&mut asm, 0x1234, 0x5678);
        assert_eq!(pool.len(), 1);
        pool.get_constant(&mut asm, 0xAAAA, 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_pool_emits_and_assembles() {
        let mut asm = CodeAssembler::new(64).unwrap();
        let mut pool = ConstantPool::new();
        let c = pool.get_constant(&mut asm, 0x0102_0304_0506_0708, 0x090A_0B0C_0D0E_0F10);
        asm.movups(iced_x86::code_asm::xmm0, c).unwrap();
        asm.ret().unwrap();
        pool.emit(&mut asm).unwrap();
        let bytes = asm.assemble(0x1000).unwrap();
        // movups + ret + 16 bytes of constant data
        assert!(bytes.len() > 16);
        assert!(bytes
            .windows(8)
            .any(|w| w == 0x0102_0304_0506_0708u64.to_le_bytes()));
    }
}

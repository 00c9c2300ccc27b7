pub mod abi;
pub mod block_of_code;
pub mod constant_pool;
pub mod emit;
pub mod emit_context;
pub mod emit_fp_vector;
pub mod emit_fp_vector_convert;
pub mod hostloc;
pub mod jit_state;
pub mod nan_fixup;
pub mod reg_alloc;
pub mod stack_layout;

use thiserror::Error;

use crate::ir::opcode::Opcode;

/// Environmental failures while emitting host code. Programming errors
/// (decode-table bugs, UNPREDICTABLE encodings) panic instead.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("assembler error: {0}")]
    Assembler(#[from] iced_x86::IcedError),
    #[error("opcode {0} is not implemented by the x64 backend")]
    Unsupported(Opcode),
    #[error("executable memory allocation failed")]
    Memory,
}

/// Result type of the emitters.
pub type EmitResult = Result<(), EmitError>;

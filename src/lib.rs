//! thumbjit — the core of a dynamic binary translator that executes guest
//! ARM Thumb code on x86-64 hosts.
//!
//! Two subsystems make up the crate:
//!
//! * a frontend that decodes Thumb-16 instructions through a precomputed
//!   mask/pattern table and translates them into an SSA-form micro-op IR,
//!   honoring ARM's condition-flag and program-counter semantics exactly
//!   ([`frontend`], [`ir`]);
//! * an x86-64 backend for the IR's floating-point vector operations that
//!   reproduces ARM IEEE-754 semantics (Default-NaN, signed-zero min/max,
//!   fused multiply-add NaN rules, fixed-point conversions) on top of
//!   SSE/AVX/FMA instructions whose native semantics differ ([`backend`]).
//!
//! The JIT cache, dispatcher, block linking and the interpreter are external
//! collaborators: the crate produces single compiled blocks and IR, and
//! reports anything it cannot compile so the caller can interpret instead.

pub mod backend;
pub mod callbacks;
pub mod fp;
pub mod frontend;
pub mod ir;

pub use backend::x64::block_of_code::CpuFeatures;
pub use backend::x64::emit::compile_ir_block;
pub use backend::x64::emit_context::EmitContext;
pub use backend::x64::jit_state::A32JitState;
pub use backend::x64::EmitError;
pub use callbacks::UserCallbacks;
pub use frontend::thumb::translate::translate_thumb;
pub use ir::location::A32LocationDescriptor;

use bitflags::bitflags;
use iced_x86::code_asm::*;
use iced_x86::IcedError;
use log::debug;

use crate::backend::x64::abi;
use crate::backend::x64::constant_pool::ConstantPool;
use crate::backend::x64::jit_state::A32JitState;
use crate::backend::x64::stack_layout::{StackLayout, FRAME_SIZE};
use crate::backend::x64::EmitError;

bitflags! {
    /// Host CPU features the emitter selects fast paths on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CpuFeatures: u32 {
        const SSE41    = 1 << 0;
        const AVX      = 1 << 1;
        const AVX512DQ = 1 << 2;
        const AVX512VL = 1 << 3;
        const FMA      = 1 << 4;
    }
}

impl CpuFeatures {
    /// Probe the running host.
    #[cfg(target_arch = "x86_64")]
    pub fn detect() -> Self {
        let mut features = CpuFeatures::empty();
        if is_x86_feature_detected!("sse4.1") {
            features |= CpuFeatures::SSE41;
        }
        if is_x86_feature_detected!("avx") {
            features |= CpuFeatures::AVX;
        }
        if is_x86_feature_detected!("avx512dq") {
            features |= CpuFeatures::AVX512DQ;
        }
        if is_x86_feature_detected!("avx512vl") {
            features |= CpuFeatures::AVX512VL;
        }
        if is_x86_feature_detected!("fma") {
            features |= CpuFeatures::FMA;
        }
        features
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub fn detect() -> Self {
        CpuFeatures::empty()
    }
}

type FarThunk = Box<dyn FnOnce(&mut CodeAssembler) -> Result<(), IcedError>>;

/// The host code buffer: an append-only assembler plus the block-scoped
/// extras emitted code needs — a literal pool, a far region for cold paths,
/// and the host feature set.
///
/// The assembler is a single stream, so "switching" to far code records a
/// deferred thunk instead; thunks run at finalization, after the block body
/// and before the literal pool. Hot code stays dense and labels may cross
/// regions.
pub struct CodeBuffer {
    pub asm: CodeAssembler,
    features: CpuFeatures,
    constants: ConstantPool,
    far_code: Vec<FarThunk>,
}

impl CodeBuffer {
    pub fn new(features: CpuFeatures) -> Result<Self, EmitError> {
        Ok(Self {
            asm: CodeAssembler::new(64)?,
            features,
            constants: ConstantPool::new(),
            far_code: Vec::new(),
        })
    }

    /// Runtime feature probe for tier selection.
    pub fn does_cpu_support(&self, features: CpuFeatures) -> bool {
        self.features.contains(features)
    }

    /// Embed a 128-bit constant in the literal pool, returning an addressable
    /// reference. The slot is not alignment-guaranteed: load through movups.
    pub fn mconst(&mut self, lower: u64, upper: u64) -> AsmMemoryOperand {
        self.constants.get_constant(&mut self.asm, lower, upper)
    }

    /// Queue cold code for the far region.
    pub fn far_code(
        &mut self,
        thunk: impl FnOnce(&mut CodeAssembler) -> Result<(), IcedError> + 'static,
    ) {
        self.far_code.push(Box::new(thunk));
    }

    /// Call an absolute host function pointer through RAX.
    pub fn call_function(&mut self, func: usize) -> Result<(), EmitError> {
        self.asm.mov(rax, func as u64)?;
        self.asm.call(rax)?;
        Ok(())
    }

    /// Block entry: save callee-saved registers, reserve the stack frame,
    /// adopt the guest MXCSR, and point R15 at the jit state.
    pub fn emit_prologue(&mut self) -> Result<(), EmitError> {
        for loc in abi::CALLEE_SAVE_GPRS {
            self.asm.push(loc.to_reg64())?;
        }
        self.asm.sub(rsp, FRAME_SIZE as i32)?;
        for (i, loc) in abi::CALLEE_SAVE_XMMS.iter().enumerate() {
            self.asm.movaps(
                xmmword_ptr(rsp + StackLayout::xmm_save_offset(i) as i32),
                loc.to_xmm(),
            )?;
        }
        self.asm.mov(r15, abi::ABI_PARAMS[0].to_reg64())?;
        self.asm.stmxcsr(dword_ptr(rsp + StackLayout::save_host_mxcsr_offset() as i32))?;
        self.asm.ldmxcsr(dword_ptr(r15 + A32JitState::offset_of_guest_mxcsr() as i32))?;
        Ok(())
    }

    /// Block exit: restore the host MXCSR and callee-saved state, return.
    pub fn emit_epilogue(&mut self) -> Result<(), EmitError> {
        self.asm.ldmxcsr(dword_ptr(rsp + StackLayout::save_host_mxcsr_offset() as i32))?;
        for (i, loc) in abi::CALLEE_SAVE_XMMS.iter().enumerate() {
            self.asm.movaps(
                loc.to_xmm(),
                xmmword_ptr(rsp + StackLayout::xmm_save_offset(i) as i32),
            )?;
        }
        self.asm.add(rsp, FRAME_SIZE as i32)?;
        for loc in abi::CALLEE_SAVE_GPRS.iter().rev() {
            self.asm.pop(loc.to_reg64())?;
        }
        self.asm.ret()?;
        Ok(())
    }

    /// Emit the far region and literal pool, assemble, and move the result
    /// into executable memory.
    pub fn finalize(mut self) -> Result<ExecutableBlock, EmitError> {
        for thunk in std::mem::take(&mut self.far_code) {
            thunk(&mut self.asm)?;
        }
        self.constants.emit(&mut self.asm)?;

        // Everything emitted is position-independent: label references are
        // RIP-relative and host calls go through absolute 64-bit immediates.
        // One assembly pass at a nominal base is therefore sufficient.
        let bytes = self.asm.assemble(0x10_0000)?;
        let mut block = ExecutableBlock::alloc(bytes.len())?;
        block.write_and_protect(&bytes)?;

        debug!("emitted {} bytes of host code", bytes.len());
        Ok(block)
    }
}

/// Entry point signature of a compiled block.
#[cfg(not(windows))]
pub type BlockEntry = unsafe extern "sysv64" fn(*mut A32JitState);
#[cfg(windows)]
pub type BlockEntry = unsafe extern "win64" fn(*mut A32JitState);

/// A page-aligned, executable allocation holding one compiled block.
#[derive(Debug)]
pub struct ExecutableBlock {
    ptr: *mut u8,
    capacity: usize,
    len: usize,
}

impl ExecutableBlock {
    fn alloc(len: usize) -> Result<Self, EmitError> {
        let page = 4096;
        let capacity = (len.max(1) + page - 1) & !(page - 1);

        #[cfg(unix)]
        let ptr = unsafe {
            let p = libc::mmap(
                std::ptr::null_mut(),
                capacity,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            if p == libc::MAP_FAILED {
                return Err(EmitError::Memory);
            }
            p as *mut u8
        };

        #[cfg(windows)]
        let ptr = unsafe {
            let p = VirtualAlloc(std::ptr::null_mut(), capacity, 0x3000 /* MEM_COMMIT|MEM_RESERVE */, 0x04 /* PAGE_READWRITE */);
            if p.is_null() {
                return Err(EmitError::Memory);
            }
            p as *mut u8
        };

        Ok(Self { ptr, capacity, len: 0 })
    }

    fn write_and_protect(&mut self, bytes: &[u8]) -> Result<(), EmitError> {
        assert!(bytes.len() <= self.capacity);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr, bytes.len());
        }
        self.len = bytes.len();

        #[cfg(unix)]
        unsafe {
            if libc::mprotect(self.ptr as *mut _, self.capacity, libc::PROT_READ | libc::PROT_EXEC) != 0 {
                return Err(EmitError::Memory);
            }
        }

        #[cfg(windows)]
        unsafe {
            let mut old = 0u32;
            if VirtualProtect(self.ptr as *mut _, self.capacity, 0x20 /* PAGE_EXECUTE_READ */, &mut old) == 0 {
                return Err(EmitError::Memory);
            }
        }

        Ok(())
    }

    /// The callee entry point.
    ///
    /// # Safety
    /// The jit state pointer passed to the entry function must be valid and
    /// the block must have been produced by `CodeBuffer::finalize`.
    pub unsafe fn entry(&self) -> BlockEntry {
        std::mem::transmute::<*mut u8, BlockEntry>(self.ptr)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl Drop for ExecutableBlock {
    fn drop(&mut self) {
        #[cfg(unix)]
        unsafe {
            libc::munmap(self.ptr as *mut _, self.capacity);
        }
        #[cfg(windows)]
        unsafe {
            VirtualFree(self.ptr as *mut _, 0, 0x8000 /* MEM_RELEASE */);
        }
    }
}

#[cfg(windows)]
extern "system" {
    fn VirtualAlloc(addr: *mut core::ffi::c_void, size: usize, alloc_type: u32, protect: u32) -> *mut core::ffi::c_void;
    fn VirtualProtect(addr: *mut core::ffi::c_void, size: usize, protect: u32, old: *mut u32) -> i32;
    fn VirtualFree(addr: *mut core::ffi::c_void, size: usize, free_type: u32) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_probe_runs() {
        let _ = CpuFeatures::detect();
    }

    #[test]
    fn test_prologue_epilogue_assemble() {
        let mut code = CodeBuffer::new(CpuFeatures::empty()).unwrap();
        code.emit_prologue().unwrap();
        code.emit_epilogue().unwrap();
        let block = code.finalize().unwrap();
        assert!(!block.is_empty());
        // Last byte of the epilogue is ret.
        assert_eq!(*block.as_bytes().last().unwrap(), 0xC3);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_empty_block_executes() {
        let mut code = CodeBuffer::new(CpuFeatures::detect()).unwrap();
        code.emit_prologue().unwrap();
        code.emit_epilogue().unwrap();
        let block = code.finalize().unwrap();

        let mut state = A32JitState::new();
        unsafe { block.entry()(&mut state) };
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_far_code_and_constants() {
        // Store a constant into the jit state's r0..r3 via a far-code round
        // trip: jump far, load, jump back.
        let mut code = CodeBuffer::new(CpuFeatures::detect()).unwrap();
        code.emit_prologue().unwrap();

        let mut far = code.asm.create_label();
        let mut back = code.asm.create_label();
        let cnst = code.mconst(0x1122_3344_5566_7788, 0x99AA_BBCC_DDEE_FF00);
        code.asm.jmp(far).unwrap();
        code.asm.set_label(&mut back).unwrap();
        code.asm
            .movups(xmmword_ptr(r15 + A32JitState::offset_of_regs() as i32), xmm0)
            .unwrap();
        code.emit_epilogue().unwrap();
        code.far_code(move |asm| {
            let mut far = far;
            let back = back;
            asm.set_label(&mut far)?;
            asm.movups(xmm0, cnst)?;
            asm.jmp(back)?;
            Ok(())
        });

        let block = code.finalize().unwrap();
        let mut state = A32JitState::new();
        unsafe { block.entry()(&mut state) };
        assert_eq!(state.regs[0], 0x5566_7788);
        assert_eq!(state.regs[1], 0x1122_3344);
        assert_eq!(state.regs[2], 0xDDEE_FF00);
        assert_eq!(state.regs[3], 0x99AA_BBCC);
    }
}

use iced_x86::code_asm::*;

/// Host location: abstracts GPRs, XMM registers, and spill slots for the
/// register allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostLoc {
    // General-purpose registers (0-15)
    Gpr(u8),
    // XMM registers (0-15)
    Xmm(u8),
    // Spill slot index
    Spill(u8),
}

const GPR64_TABLE: [AsmRegister64; 16] = [
    rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi,
    r8, r9, r10, r11, r12, r13, r14, r15,
];

const GPR32_TABLE: [AsmRegister32; 16] = [
    eax, ecx, edx, ebx, esp, ebp, esi, edi,
    r8d, r9d, r10d, r11d, r12d, r13d, r14d, r15d,
];

const GPR16_TABLE: [AsmRegister16; 16] = [
    ax, cx, dx, bx, sp, bp, si, di,
    r8w, r9w, r10w, r11w, r12w, r13w, r14w, r15w,
];

const GPR8_TABLE: [AsmRegister8; 16] = [
    al, cl, dl, bl, spl, bpl, sil, dil,
    r8b, r9b, r10b, r11b, r12b, r13b, r14b, r15b,
];

const XMM_TABLE: [AsmRegisterXmm; 16] = [
    xmm0, xmm1, xmm2, xmm3, xmm4, xmm5, xmm6, xmm7,
    xmm8, xmm9, xmm10, xmm11, xmm12, xmm13, xmm14, xmm15,
];

impl HostLoc {
    pub fn is_gpr(self) -> bool { matches!(self, HostLoc::Gpr(_)) }
    pub fn is_xmm(self) -> bool { matches!(self, HostLoc::Xmm(_)) }
    pub fn is_register(self) -> bool { self.is_gpr() || self.is_xmm() }
    pub fn is_spill(self) -> bool { matches!(self, HostLoc::Spill(_)) }

    /// Bit width of the location (64 for GPR, 128 for XMM/spill).
    pub fn bit_width(self) -> usize {
        match self {
            HostLoc::Gpr(_) => 64,
            HostLoc::Xmm(_) => 128,
            HostLoc::Spill(_) => 128,
        }
    }

    pub fn gpr_index(self) -> u8 {
        match self {
            HostLoc::Gpr(i) => i,
            _ => panic!("gpr_index called on non-GPR HostLoc"),
        }
    }

    pub fn xmm_index(self) -> u8 {
        match self {
            HostLoc::Xmm(i) => i,
            _ => panic!("xmm_index called on non-XMM HostLoc"),
        }
    }

    pub fn to_reg64(self) -> AsmRegister64 {
        GPR64_TABLE[self.gpr_index() as usize]
    }

    pub fn to_reg32(self) -> AsmRegister32 {
        GPR32_TABLE[self.gpr_index() as usize]
    }

    pub fn to_reg16(self) -> AsmRegister16 {
        GPR16_TABLE[self.gpr_index() as usize]
    }

    pub fn to_reg8(self) -> AsmRegister8 {
        GPR8_TABLE[self.gpr_index() as usize]
    }

    pub fn to_xmm(self) -> AsmRegisterXmm {
        XMM_TABLE[self.xmm_index() as usize]
    }
}

/// Conversion of a typed host register back to a `HostLoc`.
pub trait IntoHostLoc {
    fn hostloc(self) -> HostLoc;
}

impl IntoHostLoc for HostLoc {
    fn hostloc(self) -> HostLoc {
        self
    }
}

impl IntoHostLoc for AsmRegister64 {
    fn hostloc(self) -> HostLoc {
        let idx = GPR64_TABLE.iter().position(|&r| r == self)
            .expect("unknown GPR");
        HostLoc::Gpr(idx as u8)
    }
}

impl IntoHostLoc for AsmRegisterXmm {
    fn hostloc(self) -> HostLoc {
        let idx = XMM_TABLE.iter().position(|&r| r == self)
            .expect("unknown XMM register");
        HostLoc::Xmm(idx as u8)
    }
}

// Named GPR HostLoc constants
pub const HOST_RAX: HostLoc = HostLoc::Gpr(0);
pub const HOST_RCX: HostLoc = HostLoc::Gpr(1);
pub const HOST_RDX: HostLoc = HostLoc::Gpr(2);
pub const HOST_RBX: HostLoc = HostLoc::Gpr(3);
pub const HOST_RSP: HostLoc = HostLoc::Gpr(4);
pub const HOST_RBP: HostLoc = HostLoc::Gpr(5);
pub const HOST_RSI: HostLoc = HostLoc::Gpr(6);
pub const HOST_RDI: HostLoc = HostLoc::Gpr(7);
pub const HOST_R8:  HostLoc = HostLoc::Gpr(8);
pub const HOST_R9:  HostLoc = HostLoc::Gpr(9);
pub const HOST_R10: HostLoc = HostLoc::Gpr(10);
pub const HOST_R11: HostLoc = HostLoc::Gpr(11);
pub const HOST_R12: HostLoc = HostLoc::Gpr(12);
pub const HOST_R13: HostLoc = HostLoc::Gpr(13);
pub const HOST_R14: HostLoc = HostLoc::Gpr(14);
pub const HOST_R15: HostLoc = HostLoc::Gpr(15);

/// Available GPRs for register allocation.
/// Excludes RSP (stack pointer) and R15 (reserved for the jit state pointer).
pub const ANY_GPR: &[HostLoc] = &[
    HOST_RAX, HOST_RBX, HOST_RCX, HOST_RDX,
    HOST_RSI, HOST_RDI, HOST_RBP,
    HOST_R8, HOST_R9, HOST_R10, HOST_R11,
    HOST_R12, HOST_R13, HOST_R14,
];

/// Available XMM registers for register allocation.
/// Excludes XMM0, which host-call fallbacks use as the result sink.
pub const ANY_XMM: &[HostLoc] = &[
    HostLoc::Xmm(1),  HostLoc::Xmm(2),  HostLoc::Xmm(3),
    HostLoc::Xmm(4),  HostLoc::Xmm(5),  HostLoc::Xmm(6),
    HostLoc::Xmm(7),  HostLoc::Xmm(8),  HostLoc::Xmm(9),
    HostLoc::Xmm(10), HostLoc::Xmm(11), HostLoc::Xmm(12),
    HostLoc::Xmm(13), HostLoc::Xmm(14), HostLoc::Xmm(15),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostloc_classification() {
        assert!(HOST_RAX.is_gpr());
        assert!(!HOST_RAX.is_xmm());
        assert!(HostLoc::Xmm(1).is_xmm());
        assert!(HostLoc::Spill(0).is_spill());
        assert!(!HostLoc::Spill(0).is_register());
    }

    #[test]
    fn test_any_gpr_excludes_rsp_r15() {
        assert!(!ANY_GPR.contains(&HOST_RSP));
        assert!(!ANY_GPR.contains(&HOST_R15));
        assert_eq!(ANY_GPR.len(), 14);
    }

    #[test]
    fn test_any_xmm_excludes_xmm0() {
        assert!(!ANY_XMM.contains(&HostLoc::Xmm(0)));
        assert_eq!(ANY_XMM.len(), 15);
    }

    #[test]
    fn test_register_round_trip() {
        for i in 0..16u8 {
            assert_eq!(HostLoc::Gpr(i).to_reg64().hostloc(), HostLoc::Gpr(i));
            assert_eq!(HostLoc::Xmm(i).to_xmm().hostloc(), HostLoc::Xmm(i));
        }
    }
}

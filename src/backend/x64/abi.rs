use iced_x86::code_asm::*;
use iced_x86::IcedError;

use crate::backend::x64::hostloc::*;

/// System V x86-64 ABI (Linux/macOS).
///
/// Parameter registers: RDI, RSI, RDX, RCX, R8, R9
/// Return: RAX
/// Caller-saved: RAX, RCX, RDX, RDI, RSI, R8-R11, XMM0-XMM15
/// Callee-saved: RBX, RBP, R12-R15
#[cfg(not(windows))]
mod plat {
    use super::*;

    pub const ABI_RETURN: HostLoc = HOST_RAX;
    pub const ABI_PARAM_COUNT: usize = 6;
    pub const ABI_PARAMS: [HostLoc; ABI_PARAM_COUNT] = [
        HOST_RDI, HOST_RSI, HOST_RDX, HOST_RCX, HOST_R8, HOST_R9,
    ];
    pub const ABI_SHADOW_SPACE: usize = 0;

    pub const CALLER_SAVE_GPRS: &[HostLoc] = &[
        HOST_RAX, HOST_RCX, HOST_RDX, HOST_RDI, HOST_RSI,
        HOST_R8, HOST_R9, HOST_R10, HOST_R11,
    ];

    pub const CALLER_SAVE_XMMS: &[HostLoc] = &[
        HostLoc::Xmm(0), HostLoc::Xmm(1), HostLoc::Xmm(2), HostLoc::Xmm(3),
        HostLoc::Xmm(4), HostLoc::Xmm(5), HostLoc::Xmm(6), HostLoc::Xmm(7),
        HostLoc::Xmm(8), HostLoc::Xmm(9), HostLoc::Xmm(10), HostLoc::Xmm(11),
        HostLoc::Xmm(12), HostLoc::Xmm(13), HostLoc::Xmm(14), HostLoc::Xmm(15),
    ];

    pub const CALLEE_SAVE_GPRS: &[HostLoc] = &[
        HOST_RBX, HOST_RBP, HOST_R12, HOST_R13, HOST_R14, HOST_R15,
    ];

    pub const CALLEE_SAVE_XMMS: &[HostLoc] = &[];
}

/// Windows x64 ABI.
///
/// Parameter registers: RCX, RDX, R8, R9; 32 bytes of shadow space.
/// Caller-saved: RAX, RCX, RDX, R8-R11, XMM0-XMM5
/// Callee-saved: RBX, RBP, RDI, RSI, R12-R15, XMM6-XMM15
#[cfg(windows)]
mod plat {
    use super::*;

    pub const ABI_RETURN: HostLoc = HOST_RAX;
    pub const ABI_PARAM_COUNT: usize = 4;
    pub const ABI_PARAMS: [HostLoc; ABI_PARAM_COUNT] = [
        HOST_RCX, HOST_RDX, HOST_R8, HOST_R9,
    ];
    pub const ABI_SHADOW_SPACE: usize = 32;

    pub const CALLER_SAVE_GPRS: &[HostLoc] = &[
        HOST_RAX, HOST_RCX, HOST_RDX,
        HOST_R8, HOST_R9, HOST_R10, HOST_R11,
    ];

    pub const CALLER_SAVE_XMMS: &[HostLoc] = &[
        HostLoc::Xmm(0), HostLoc::Xmm(1), HostLoc::Xmm(2),
        HostLoc::Xmm(3), HostLoc::Xmm(4), HostLoc::Xmm(5),
    ];

    pub const CALLEE_SAVE_GPRS: &[HostLoc] = &[
        HOST_RBX, HOST_RBP, HOST_RSI, HOST_RDI,
        HOST_R12, HOST_R13, HOST_R14, HOST_R15,
    ];

    pub const CALLEE_SAVE_XMMS: &[HostLoc] = &[
        HostLoc::Xmm(6), HostLoc::Xmm(7), HostLoc::Xmm(8), HostLoc::Xmm(9),
        HostLoc::Xmm(10), HostLoc::Xmm(11), HostLoc::Xmm(12), HostLoc::Xmm(13),
        HostLoc::Xmm(14), HostLoc::Xmm(15),
    ];
}

pub use plat::*;

/// Get the nth ABI parameter register.
pub fn abi_param(n: usize) -> HostLoc {
    assert!(n < ABI_PARAM_COUNT, "ABI param index {} out of range", n);
    ABI_PARAMS[n]
}

/// Stack bytes reserved for caller-saved XMM registers by the helpers below.
const XMM_SAVE_SIZE: usize = CALLER_SAVE_XMMS.len() * 16;

/// Push all caller-saved registers around a helper call in cold code, leaving
/// out the XMM register designated as the call's output sink.
///
/// The caller is responsible for an odd number of quadwords of padding so the
/// stack stays 16-byte aligned at the eventual `call` (the caller-save GPR
/// count is odd on both ABIs).
pub fn push_caller_save_except(
    asm: &mut CodeAssembler,
    except: Option<AsmRegisterXmm>,
) -> Result<(), IcedError> {
    for loc in CALLER_SAVE_GPRS {
        asm.push(loc.to_reg64())?;
    }
    asm.sub(rsp, XMM_SAVE_SIZE as i32)?;
    for (i, loc) in CALLER_SAVE_XMMS.iter().enumerate() {
        let reg = loc.to_xmm();
        if Some(reg) == except {
            continue;
        }
        asm.movaps(xmmword_ptr(rsp + (i * 16) as i32), reg)?;
    }
    Ok(())
}

/// Undo `push_caller_save_except`.
pub fn pop_caller_save_except(
    asm: &mut CodeAssembler,
    except: Option<AsmRegisterXmm>,
) -> Result<(), IcedError> {
    for (i, loc) in CALLER_SAVE_XMMS.iter().enumerate() {
        let reg = loc.to_xmm();
        if Some(reg) == except {
            continue;
        }
        asm.movaps(reg, xmmword_ptr(rsp + (i * 16) as i32))?;
    }
    asm.add(rsp, XMM_SAVE_SIZE as i32)?;
    for loc in CALLER_SAVE_GPRS.iter().rev() {
        asm.pop(loc.to_reg64())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abi_params() {
        #[cfg(not(windows))]
        {
            assert_eq!(abi_param(0), HOST_RDI);
            assert_eq!(abi_param(1), HOST_RSI);
            assert_eq!(abi_param(2), HOST_RDX);
            assert_eq!(abi_param(3), HOST_RCX);
            assert_eq!(ABI_SHADOW_SPACE, 0);
        }
        #[cfg(windows)]
        {
            assert_eq!(abi_param(0), HOST_RCX);
            assert_eq!(abi_param(1), HOST_RDX);
            assert_eq!(ABI_SHADOW_SPACE, 32);
        }
    }

    #[test]
    fn test_callee_save_no_overlap_with_caller_save() {
        for reg in CALLEE_SAVE_GPRS {
            assert!(!CALLER_SAVE_GPRS.contains(reg));
        }
    }

    #[test]
    fn test_caller_save_gpr_count_is_odd() {
        // Alignment of the cold-path frames depends on this.
        assert_eq!(CALLER_SAVE_GPRS.len() % 2, 1);
    }
}

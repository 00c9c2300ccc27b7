/// Number of 128-bit spill slots for register allocation.
pub const SPILL_COUNT: usize = 64;

/// Stack frame layout used while a compiled block executes.
///
/// The prologue reserves this below the saved callee registers; RSP points at
/// its base for the duration of the block. Must be 16-byte aligned for XMM
/// spills.
#[repr(C, align(16))]
pub struct StackLayout {
    /// Spill area for register allocation (64 x 128-bit).
    pub spill: [[u64; 2]; SPILL_COUNT],
    /// Callee-saved XMM registers (Windows ABI only; unused elsewhere).
    pub xmm_save: [[u64; 2]; 10],
    /// Saved host MXCSR value while the guest MXCSR is live.
    pub save_host_mxcsr: u32,
    _pad: [u32; 3],
}

impl StackLayout {
    /// Byte offset of a spill slot from the base of the layout.
    pub const fn spill_offset(index: usize) -> usize {
        core::mem::offset_of!(StackLayout, spill) + index * 16
    }

    pub const fn xmm_save_offset(index: usize) -> usize {
        core::mem::offset_of!(StackLayout, xmm_save) + index * 16
    }

    pub const fn save_host_mxcsr_offset() -> usize {
        core::mem::offset_of!(StackLayout, save_host_mxcsr)
    }
}

/// Bytes the prologue subtracts from RSP. The extra 8 keeps RSP 16-byte
/// aligned within the block body given the callee-saved pushes.
pub const FRAME_SIZE: usize = core::mem::size_of::<StackLayout>() + 8;

const _: () = assert!(core::mem::size_of::<StackLayout>() % 16 == 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spill_slots_are_16_byte_strided() {
        assert_eq!(StackLayout::spill_offset(0), 0);
        assert_eq!(StackLayout::spill_offset(1) - StackLayout::spill_offset(0), 16);
        assert_eq!(StackLayout::spill_offset(0) % 16, 0);
    }

    #[test]
    fn test_frame_alignment_adjustment() {
        assert_eq!(FRAME_SIZE % 16, 8);
    }
}

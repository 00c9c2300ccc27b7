/// Guest environment callbacks.
///
/// The translator and optimization passes never touch guest memory directly;
/// everything goes through this trait so the embedder controls the address
/// space.
pub trait UserCallbacks {
    fn memory_read_8(&self, vaddr: u32) -> u8;
    fn memory_read_16(&self, vaddr: u32) -> u16;
    fn memory_read_32(&self, vaddr: u32) -> u32;
    fn memory_read_64(&self, vaddr: u32) -> u64;

    /// Whether `vaddr` lies in memory the guest cannot modify. Loads from
    /// read-only memory may be folded to constants at translation time.
    fn is_read_only_memory(&self, _vaddr: u32) -> bool {
        false
    }

    fn call_svc(&mut self, swi: u32);
}

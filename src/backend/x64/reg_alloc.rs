use iced_x86::code_asm::*;

use crate::backend::x64::abi;
use crate::backend::x64::block_of_code::CodeBuffer;
use crate::backend::x64::hostloc::*;
use crate::backend::x64::stack_layout::{StackLayout, SPILL_COUNT};
use crate::ir::inst::MAX_ARGS;
use crate::ir::types::Type;
use crate::ir::value::{InstRef, Value};

const NUM_GPRS: usize = 16;
const NON_SPILL_COUNT: usize = NUM_GPRS + 16; // 32
const TOTAL_HOSTLOC_COUNT: usize = NON_SPILL_COUNT + SPILL_COUNT;

fn hostloc_to_index(loc: HostLoc) -> usize {
    match loc {
        HostLoc::Gpr(i) => i as usize,
        HostLoc::Xmm(i) => NUM_GPRS + i as usize,
        HostLoc::Spill(i) => NON_SPILL_COUNT + i as usize,
    }
}

fn index_to_hostloc(index: usize) -> HostLoc {
    if index < NUM_GPRS {
        HostLoc::Gpr(index as u8)
    } else if index < NON_SPILL_COUNT {
        HostLoc::Xmm((index - NUM_GPRS) as u8)
    } else {
        HostLoc::Spill((index - NON_SPILL_COUNT) as u8)
    }
}

/// Tracks the state of a single host location (register or spill slot).
#[derive(Debug, Clone)]
struct HostLocInfo {
    /// How many times this location has been locked this scope.
    is_being_used_count: usize,
    /// Whether this location is a scratch register (write-locked).
    is_scratch: bool,
    /// Whether this location's value is on its last use.
    is_set_last_use: bool,

    /// Current argument references (from get_argument_info).
    current_references: usize,
    /// Accumulated uses counted so far.
    accumulated_uses: usize,
    /// Total expected uses (from IR use_count).
    total_uses: usize,

    /// IR values currently stored in this location.
    values: Vec<InstRef>,
    /// Maximum bit width of values stored here.
    max_bit_width: usize,
}

impl HostLocInfo {
    fn new() -> Self {
        Self {
            is_being_used_count: 0,
            is_scratch: false,
            is_set_last_use: false,
            current_references: 0,
            accumulated_uses: 0,
            total_uses: 0,
            values: Vec::new(),
            max_bit_width: 0,
        }
    }

    fn is_locked(&self) -> bool {
        self.is_being_used_count > 0
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty() && !self.is_scratch
    }

    fn is_last_use(&self) -> bool {
        self.is_set_last_use || self.accumulated_uses == self.total_uses
    }

    fn set_last_use(&mut self) {
        self.is_set_last_use = true;
    }

    fn read_lock(&mut self) {
        self.is_being_used_count += 1;
    }

    fn write_lock(&mut self) {
        self.is_scratch = true;
        self.is_being_used_count += 1;
    }

    fn add_arg_reference(&mut self) {
        self.current_references += 1;
        assert!(self.current_references <= self.total_uses, "too many arg references");
    }

    fn release_one(&mut self) {
        self.is_scratch = false;

        if self.is_being_used_count > 0 {
            self.is_being_used_count -= 1;
        }

        if !self.is_locked() {
            // Only an argument reference consumes a use; scratch/define
            // releases do not.
            if self.current_references > 0 {
                self.current_references -= 1;
                self.accumulated_uses += 1;
            }

            if self.is_last_use() && !self.values.is_empty() {
                self.values.clear();
                self.max_bit_width = 0;
                self.is_set_last_use = false;
                self.accumulated_uses = 0;
                self.total_uses = 0;
            }
        }
    }

    fn release_all(&mut self) {
        while self.is_locked() {
            self.release_one();
        }
    }

    fn contains_value(&self, inst: InstRef) -> bool {
        self.values.contains(&inst)
    }

    fn add_value(&mut self, inst: InstRef, bit_width: usize, total_uses: usize) {
        self.values.push(inst);
        self.total_uses += total_uses;
        if bit_width > self.max_bit_width {
            self.max_bit_width = bit_width;
        }
    }
}

/// An argument extracted from an IR instruction for register allocation.
pub struct Argument {
    /// Whether this argument has been allocated to a host location.
    pub allocated: bool,
    /// The IR value this argument represents.
    pub value: Value,
}

impl Argument {
    fn new() -> Self {
        Self {
            allocated: false,
            value: Value::Void,
        }
    }

    pub fn get_type(&self) -> Type {
        self.value.get_type()
    }

    pub fn is_immediate(&self) -> bool {
        self.value.is_immediate()
    }

    pub fn is_void(&self) -> bool {
        matches!(self.value, Value::Void)
    }

    pub fn get_immediate_u1(&self) -> bool {
        self.value.get_u1()
    }

    pub fn get_immediate_u8(&self) -> u8 {
        self.value.get_u8()
    }

    pub fn get_immediate_u32(&self) -> u32 {
        self.value.get_u32()
    }

    pub fn get_immediate_u64(&self) -> u64 {
        self.value.get_imm_as_u64()
    }
}

/// Array of arguments for an instruction (up to MAX_ARGS).
pub type ArgumentInfo = [Argument; MAX_ARGS];

/// Register allocator that maps IR values to x86-64 host registers.
///
/// Tracks which IR values live in which host locations (GPRs, XMMs, spill
/// slots), spills under pressure, and emits move/exchange instructions as
/// needed through the code buffer.
pub struct RegAlloc<'a> {
    /// The code buffer, for emitting spill/reload/move instructions.
    pub code: &'a mut CodeBuffer,
    /// Preferred GPR allocation order.
    gpr_order: Vec<HostLoc>,
    /// Preferred XMM allocation order.
    xmm_order: Vec<HostLoc>,
    /// Per-location state tracking.
    hostloc_info: Vec<HostLocInfo>,
    /// Extra stack space reserved around host calls.
    reserved_stack_space: usize,
    /// (use_count, return_type_bit_width) per instruction, indexed by InstRef.
    inst_info: Vec<(u32, usize)>,
}

impl<'a> RegAlloc<'a> {
    pub fn new(
        code: &'a mut CodeBuffer,
        gpr_order: Vec<HostLoc>,
        xmm_order: Vec<HostLoc>,
        inst_info: Vec<(u32, usize)>,
    ) -> Self {
        Self {
            code,
            gpr_order,
            xmm_order,
            hostloc_info: (0..TOTAL_HOSTLOC_COUNT).map(|_| HostLocInfo::new()).collect(),
            reserved_stack_space: 0,
            inst_info,
        }
    }

    /// Create with the default GPR/XMM ordering.
    pub fn new_default(code: &'a mut CodeBuffer, inst_info: Vec<(u32, usize)>) -> Self {
        Self::new(code, ANY_GPR.to_vec(), ANY_XMM.to_vec(), inst_info)
    }

    // -------------------------------------------------------------------
    // Argument info
    // -------------------------------------------------------------------

    /// Extract argument info for an instruction. Each non-immediate
    /// argument's host location gets its reference count bumped.
    pub fn get_argument_info(
        &mut self,
        _inst_ref: InstRef,
        args: &[Value],
        num_args: usize,
    ) -> ArgumentInfo {
        let mut ret: ArgumentInfo = std::array::from_fn(|_| Argument::new());
        for i in 0..num_args {
            let arg = args[i];
            ret[i].value = arg;
            if let Value::Inst(ref_inst) = arg {
                if let Some(loc) = self.value_location(ref_inst) {
                    self.loc_info_mut(loc).add_arg_reference();
                }
            }
        }
        ret
    }

    /// Check if a value is still live (present in some host location).
    pub fn is_value_live(&self, inst_ref: InstRef) -> bool {
        self.value_location(inst_ref).is_some()
    }

    // -------------------------------------------------------------------
    // Use — read-only access to a value
    // -------------------------------------------------------------------

    pub fn use_gpr(&mut self, arg: &mut Argument) -> AsmRegister64 {
        assert!(!arg.allocated, "argument already allocated");
        arg.allocated = true;
        let order = self.gpr_order.clone();
        self.use_impl(arg.value, &order).to_reg64()
    }

    pub fn use_xmm(&mut self, arg: &mut Argument) -> AsmRegisterXmm {
        assert!(!arg.allocated, "argument already allocated");
        arg.allocated = true;
        let order = self.xmm_order.clone();
        self.use_impl(arg.value, &order).to_xmm()
    }

    /// Use a value in a specific host location (read-only).
    pub fn use_loc(&mut self, arg: &mut Argument, host_loc: HostLoc) {
        assert!(!arg.allocated, "argument already allocated");
        arg.allocated = true;
        self.use_impl(arg.value, &[host_loc]);
    }

    // -------------------------------------------------------------------
    // UseScratch — read+write access (value is consumed)
    // -------------------------------------------------------------------

    pub fn use_scratch_gpr(&mut self, arg: &mut Argument) -> AsmRegister64 {
        assert!(!arg.allocated, "argument already allocated");
        arg.allocated = true;
        let order = self.gpr_order.clone();
        self.use_scratch_impl(arg.value, &order).to_reg64()
    }

    pub fn use_scratch_xmm(&mut self, arg: &mut Argument) -> AsmRegisterXmm {
        assert!(!arg.allocated, "argument already allocated");
        arg.allocated = true;
        let order = self.xmm_order.clone();
        self.use_scratch_impl(arg.value, &order).to_xmm()
    }

    /// Use a value as scratch in a specific host location.
    pub fn use_scratch(&mut self, arg: &mut Argument, host_loc: HostLoc) {
        assert!(!arg.allocated, "argument already allocated");
        arg.allocated = true;
        self.use_scratch_impl(arg.value, &[host_loc]);
    }

    // -------------------------------------------------------------------
    // Scratch — allocate a fresh register
    // -------------------------------------------------------------------

    pub fn scratch_gpr(&mut self) -> AsmRegister64 {
        let order = self.gpr_order.clone();
        self.scratch_impl(&order).to_reg64()
    }

    pub fn scratch_xmm(&mut self) -> AsmRegisterXmm {
        let order = self.xmm_order.clone();
        self.scratch_impl(&order).to_xmm()
    }

    /// Allocate a specific location as scratch.
    pub fn scratch_at(&mut self, desired: HostLoc) -> HostLoc {
        self.scratch_impl(&[desired])
    }

    // -------------------------------------------------------------------
    // DefineValue — bind an IR instruction's result to a host location
    // -------------------------------------------------------------------

    pub fn define_value(&mut self, inst_ref: InstRef, reg: impl IntoHostLoc) {
        self.define_value_impl(inst_ref, reg.hostloc());
    }

    /// Define an IR instruction's result from an argument (copy elision).
    pub fn define_value_from_arg(&mut self, inst_ref: InstRef, arg: &Argument) {
        if arg.value.is_immediate() {
            let order = self.gpr_order.clone();
            let loc = self.scratch_impl(&order);
            self.define_value_impl(inst_ref, loc);
            self.load_immediate(arg.value, loc);
        } else if let Value::Inst(use_ref) = arg.value {
            let loc = self
                .value_location(use_ref)
                .expect("used value must already be defined");
            self.define_value_impl(inst_ref, loc);
        }
    }

    /// Release a register (no longer locked by the current scope).
    pub fn release(&mut self, reg: impl IntoHostLoc) {
        let loc = reg.hostloc();
        self.loc_info_mut(loc).release_one();
    }

    // -------------------------------------------------------------------
    // HostCall — set up for calling a host function
    // -------------------------------------------------------------------

    /// Prepare for a host function call: place arguments in ABI parameter
    /// registers and spill every unlocked caller-saved register.
    /// If `result_def` is set, the return value (RAX) defines that inst.
    pub fn host_call(&mut self, result_def: Option<InstRef>, args: &mut [Option<&mut Argument>]) {
        self.scratch_impl(&[abi::ABI_RETURN]);
        if let Some(inst_ref) = result_def {
            self.define_value_impl(inst_ref, abi::ABI_RETURN);
        }

        for (i, arg_opt) in args.iter_mut().enumerate() {
            if i >= abi::ABI_PARAM_COUNT {
                break;
            }
            if let Some(arg) = arg_opt {
                if !arg.is_void() {
                    let loc = abi::ABI_PARAMS[i];
                    self.use_scratch(arg, loc);

                    // Zero-extend narrow arguments into the full register.
                    match arg.get_type() {
                        Type::U1 | Type::U8 => {
                            let _ = self.code.asm.movzx(loc.to_reg32(), loc.to_reg8());
                        }
                        Type::U16 => {
                            let _ = self.code.asm.movzx(loc.to_reg32(), loc.to_reg16());
                        }
                        Type::U32 => {
                            let _ = self.code.asm.mov(loc.to_reg32(), loc.to_reg32());
                        }
                        _ => {}
                    }
                }
            }
        }

        for (i, arg_opt) in args.iter().enumerate() {
            if i >= abi::ABI_PARAM_COUNT {
                break;
            }
            if arg_opt.is_none() {
                self.scratch_impl(&[abi::ABI_PARAMS[i]]);
            }
        }

        for &loc in abi::CALLER_SAVE_GPRS {
            if loc == abi::ABI_RETURN {
                continue;
            }
            if !self.loc_info(loc).is_locked() {
                self.scratch_impl(&[loc]);
            }
        }
        for &loc in abi::CALLER_SAVE_XMMS {
            if !self.loc_info(loc).is_locked() {
                self.scratch_impl(&[loc]);
            }
        }
    }

    // -------------------------------------------------------------------
    // Stack space management
    // -------------------------------------------------------------------

    /// Reserve additional stack space, e.g. a spill area for a helper call.
    /// Must be paired with `release_stack_space` on every path.
    pub fn alloc_stack_space(&mut self, size: usize) {
        assert!(size % 16 == 0, "stack reservations must preserve alignment");
        self.reserved_stack_space += size;
        let _ = self.code.asm.sub(rsp, size as i32);
    }

    pub fn release_stack_space(&mut self, size: usize) {
        assert!(self.reserved_stack_space >= size);
        self.reserved_stack_space -= size;
        let _ = self.code.asm.add(rsp, size as i32);
    }

    // -------------------------------------------------------------------
    // End of allocation scope
    // -------------------------------------------------------------------

    /// Release all locks. Called after each instruction's emission.
    pub fn end_of_alloc_scope(&mut self) {
        for info in &mut self.hostloc_info {
            info.release_all();
        }
    }

    /// Assert that no values remain live (end of block).
    pub fn assert_no_more_uses(&self) {
        for (i, info) in self.hostloc_info.iter().enumerate() {
            assert!(
                info.is_empty(),
                "host location {:?} still contains values at end of block",
                index_to_hostloc(i)
            );
        }
    }

    // -------------------------------------------------------------------
    // Internal: location lookup
    // -------------------------------------------------------------------

    pub fn value_location(&self, inst_ref: InstRef) -> Option<HostLoc> {
        for (i, info) in self.hostloc_info.iter().enumerate() {
            if info.contains_value(inst_ref) {
                return Some(index_to_hostloc(i));
            }
        }
        None
    }

    fn loc_info(&self, loc: HostLoc) -> &HostLocInfo {
        &self.hostloc_info[hostloc_to_index(loc)]
    }

    fn loc_info_mut(&mut self, loc: HostLoc) -> &mut HostLocInfo {
        &mut self.hostloc_info[hostloc_to_index(loc)]
    }

    // -------------------------------------------------------------------
    // Internal: core allocation logic
    // -------------------------------------------------------------------

    fn use_impl(&mut self, use_value: Value, desired_locations: &[HostLoc]) -> HostLoc {
        if use_value.is_immediate() {
            let scratch = self.scratch_impl(desired_locations);
            return self.load_immediate(use_value, scratch);
        }

        let use_ref = use_value.inst_ref();
        let current_location = self
            .value_location(use_ref)
            .expect("value must already be defined");
        let max_bit_width = self.loc_info(current_location).max_bit_width;

        if desired_locations.contains(&current_location) {
            self.loc_info_mut(current_location).read_lock();
            return current_location;
        }

        if self.loc_info(current_location).is_locked() {
            return self.use_scratch_impl(use_value, desired_locations);
        }

        let dest = self.select_a_register(desired_locations);
        if max_bit_width > dest.bit_width() {
            return self.use_scratch_impl(use_value, desired_locations);
        }

        if can_exchange(dest, current_location) {
            self.exchange(dest, current_location);
        } else {
            self.move_out_of_the_way(dest);
            self.move_value(dest, current_location);
        }
        self.loc_info_mut(dest).read_lock();
        dest
    }

    fn use_scratch_impl(&mut self, use_value: Value, desired_locations: &[HostLoc]) -> HostLoc {
        if use_value.is_immediate() {
            let scratch = self.scratch_impl(desired_locations);
            return self.load_immediate(use_value, scratch);
        }

        let use_ref = use_value.inst_ref();
        let current_location = self
            .value_location(use_ref)
            .expect("value must already be defined");
        let bit_width = self.get_value_bit_width(use_ref);

        if desired_locations.contains(&current_location)
            && !self.loc_info(current_location).is_locked()
        {
            if !self.loc_info(current_location).is_last_use() {
                self.move_out_of_the_way(current_location);
            } else {
                self.loc_info_mut(current_location).set_last_use();
            }
            self.loc_info_mut(current_location).write_lock();
            return current_location;
        }

        let dest = self.select_a_register(desired_locations);
        self.move_out_of_the_way(dest);
        self.copy_to_scratch(bit_width, dest, current_location);
        self.loc_info_mut(dest).write_lock();
        dest
    }

    fn scratch_impl(&mut self, desired_locations: &[HostLoc]) -> HostLoc {
        let location = self.select_a_register(desired_locations);
        self.move_out_of_the_way(location);
        self.loc_info_mut(location).write_lock();
        location
    }

    fn define_value_impl(&mut self, inst_ref: InstRef, host_loc: HostLoc) {
        assert!(
            self.value_location(inst_ref).is_none(),
            "{:?} has already been defined",
            inst_ref
        );
        let (use_count, bit_width) = self
            .inst_info
            .get(inst_ref.index())
            .copied()
            .unwrap_or((1, 64));
        self.loc_info_mut(host_loc).add_value(inst_ref, bit_width, use_count as usize);
    }

    // -------------------------------------------------------------------
    // Internal: register selection
    // -------------------------------------------------------------------

    /// Select the best available register: prefer unlocked and empty.
    fn select_a_register(&self, desired_locations: &[HostLoc]) -> HostLoc {
        for &loc in desired_locations {
            if !self.loc_info(loc).is_locked() && self.loc_info(loc).is_empty() {
                return loc;
            }
        }
        for &loc in desired_locations {
            if !self.loc_info(loc).is_locked() {
                return loc;
            }
        }
        panic!("all candidate registers have already been allocated");
    }

    // -------------------------------------------------------------------
    // Internal: immediate loading
    // -------------------------------------------------------------------

    fn load_immediate(&mut self, imm: Value, host_loc: HostLoc) -> HostLoc {
        assert!(imm.is_immediate(), "load_immediate called on non-immediate");

        if host_loc.is_gpr() {
            let imm_value = imm.get_imm_as_u64();
            if imm_value == 0 {
                let r32 = host_loc.to_reg32();
                let _ = self.code.asm.xor(r32, r32);
            } else {
                let _ = self.code.asm.mov(host_loc.to_reg64(), imm_value);
            }
            return host_loc;
        }

        if host_loc.is_xmm() {
            let reg = host_loc.to_xmm();
            let imm_value = imm.get_imm_as_u64();
            if imm_value == 0 {
                let _ = self.code.asm.xorps(reg, reg);
            } else {
                let _ = self.code.asm.mov(rax, imm_value);
                let _ = self.code.asm.movq(reg, rax);
            }
            return host_loc;
        }

        panic!("cannot load an immediate into a spill slot directly");
    }

    // -------------------------------------------------------------------
    // Internal: move / exchange / spill
    // -------------------------------------------------------------------

    fn move_value(&mut self, to: HostLoc, from: HostLoc) {
        let bit_width = self.loc_info(from).max_bit_width;

        assert!(self.loc_info(to).is_empty(), "destination must be empty");
        assert!(!self.loc_info(from).is_locked(), "source must not be locked");
        assert!(bit_width <= to.bit_width(), "value too wide for destination");

        if self.loc_info(from).is_empty() {
            return;
        }

        self.emit_move(bit_width, to, from);

        let from_info =
            std::mem::replace(&mut self.hostloc_info[hostloc_to_index(from)], HostLocInfo::new());
        self.hostloc_info[hostloc_to_index(to)] = from_info;
    }

    fn copy_to_scratch(&mut self, bit_width: usize, to: HostLoc, from: HostLoc) {
        assert!(self.loc_info(to).is_empty(), "destination must be empty");
        assert!(!self.loc_info(from).is_empty(), "source must not be empty");
        self.emit_move(bit_width, to, from);
    }

    fn exchange(&mut self, a: HostLoc, b: HostLoc) {
        assert!(!self.loc_info(a).is_locked() && !self.loc_info(b).is_locked());

        if self.loc_info(a).is_empty() {
            self.move_value(a, b);
            return;
        }
        if self.loc_info(b).is_empty() {
            self.move_value(b, a);
            return;
        }

        let _ = self.code.asm.xchg(a.to_reg64(), b.to_reg64());

        let idx_a = hostloc_to_index(a);
        let idx_b = hostloc_to_index(b);
        self.hostloc_info.swap(idx_a, idx_b);
    }

    fn move_out_of_the_way(&mut self, reg: HostLoc) {
        assert!(!self.loc_info(reg).is_locked(), "cannot displace a locked register");
        if !self.loc_info(reg).is_empty() {
            self.spill_register(reg);
        }
    }

    fn spill_register(&mut self, loc: HostLoc) {
        assert!(loc.is_register(), "only registers can be spilled");
        assert!(!self.loc_info(loc).is_empty(), "nothing to spill");
        assert!(!self.loc_info(loc).is_locked(), "cannot spill a locked register");

        let new_loc = self.find_free_spill();
        self.move_value(new_loc, loc);
    }

    fn find_free_spill(&self) -> HostLoc {
        for i in 0..SPILL_COUNT {
            let loc = HostLoc::Spill(i as u8);
            if self.loc_info(loc).is_empty() {
                return loc;
            }
        }
        panic!("all spill locations are full");
    }

    // -------------------------------------------------------------------
    // Internal: code emission helpers
    // -------------------------------------------------------------------

    fn spill_base_offset(&self, loc: HostLoc) -> i32 {
        let index = match loc {
            HostLoc::Spill(i) => i as usize,
            _ => panic!("spill offset of a non-spill location"),
        };
        (self.reserved_stack_space + StackLayout::spill_offset(index)) as i32
    }

    fn emit_move(&mut self, bit_width: usize, to: HostLoc, from: HostLoc) {
        match (to, from) {
            (HostLoc::Gpr(_), HostLoc::Gpr(_)) => {
                if bit_width == 64 {
                    let _ = self.code.asm.mov(to.to_reg64(), from.to_reg64());
                } else {
                    let _ = self.code.asm.mov(to.to_reg32(), from.to_reg32());
                }
            }
            (HostLoc::Xmm(_), HostLoc::Xmm(_)) => {
                let _ = self.code.asm.movaps(to.to_xmm(), from.to_xmm());
            }
            (HostLoc::Xmm(_), HostLoc::Gpr(_)) => {
                if bit_width == 64 {
                    let _ = self.code.asm.movq(to.to_xmm(), from.to_reg64());
                } else {
                    let _ = self.code.asm.movd(to.to_xmm(), from.to_reg32());
                }
            }
            (HostLoc::Gpr(_), HostLoc::Xmm(_)) => {
                if bit_width == 64 {
                    let _ = self.code.asm.movq(to.to_reg64(), from.to_xmm());
                } else {
                    let _ = self.code.asm.movd(to.to_reg32(), from.to_xmm());
                }
            }
            (HostLoc::Xmm(_), HostLoc::Spill(_)) => {
                let offset = self.spill_base_offset(from);
                match bit_width {
                    128 => { let _ = self.code.asm.movaps(to.to_xmm(), xmmword_ptr(rsp + offset)); }
                    64 => { let _ = self.code.asm.movsd_2(to.to_xmm(), qword_ptr(rsp + offset)); }
                    _ => { let _ = self.code.asm.movss(to.to_xmm(), dword_ptr(rsp + offset)); }
                }
            }
            (HostLoc::Spill(_), HostLoc::Xmm(_)) => {
                let offset = self.spill_base_offset(to);
                match bit_width {
                    128 => { let _ = self.code.asm.movaps(xmmword_ptr(rsp + offset), from.to_xmm()); }
                    64 => { let _ = self.code.asm.movsd_2(qword_ptr(rsp + offset), from.to_xmm()); }
                    _ => { let _ = self.code.asm.movss(dword_ptr(rsp + offset), from.to_xmm()); }
                }
            }
            (HostLoc::Gpr(_), HostLoc::Spill(_)) => {
                let offset = self.spill_base_offset(from);
                if bit_width == 64 {
                    let _ = self.code.asm.mov(to.to_reg64(), qword_ptr(rsp + offset));
                } else {
                    let _ = self.code.asm.mov(to.to_reg32(), dword_ptr(rsp + offset));
                }
            }
            (HostLoc::Spill(_), HostLoc::Gpr(_)) => {
                let offset = self.spill_base_offset(to);
                if bit_width == 64 {
                    let _ = self.code.asm.mov(qword_ptr(rsp + offset), from.to_reg64());
                } else {
                    let _ = self.code.asm.mov(dword_ptr(rsp + offset), from.to_reg32());
                }
            }
            _ => panic!("invalid move: {:?} -> {:?}", from, to),
        }
    }

    fn get_value_bit_width(&self, inst_ref: InstRef) -> usize {
        self.inst_info
            .get(inst_ref.index())
            .map(|&(_, width)| width)
            .unwrap_or(64)
    }
}

/// Only GPR<->GPR locations can be exchanged.
fn can_exchange(a: HostLoc, b: HostLoc) -> bool {
    a.is_gpr() && b.is_gpr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::x64::block_of_code::{CodeBuffer, CpuFeatures};

    fn code_buffer() -> CodeBuffer {
        CodeBuffer::new(CpuFeatures::empty()).unwrap()
    }

    #[test]
    fn test_hostloc_indexing_round_trip() {
        for i in 0..TOTAL_HOSTLOC_COUNT {
            let loc = index_to_hostloc(i);
            assert_eq!(hostloc_to_index(loc), i);
        }
    }

    #[test]
    fn test_hostloc_info_lifecycle() {
        let mut info = HostLocInfo::new();
        assert!(info.is_empty());
        assert!(!info.is_locked());

        info.add_value(InstRef(0), 64, 2);
        assert!(!info.is_empty());

        info.read_lock();
        assert!(info.is_locked());

        info.release_one();
        assert!(!info.is_locked());
        assert!(!info.is_empty());
    }

    #[test]
    fn test_hostloc_info_last_use_cleanup() {
        let mut info = HostLocInfo::new();
        info.add_value(InstRef(0), 64, 1);
        info.add_arg_reference();
        info.read_lock();
        info.release_one();
        assert!(info.is_empty(), "should be empty after last use");
    }

    #[test]
    fn test_define_and_use_value() {
        let mut code = code_buffer();
        let inst_info = vec![(1, 64), (0, 64)];
        let mut ra = RegAlloc::new_default(&mut code, inst_info);

        let scratch = ra.scratch_gpr();
        ra.define_value(InstRef(0), scratch);
        ra.end_of_alloc_scope();

        assert!(ra.is_value_live(InstRef(0)));

        let args = [Value::Inst(InstRef(0))];
        let mut arg_info = ra.get_argument_info(InstRef(1), &args, 1);
        let _used = ra.use_gpr(&mut arg_info[0]);
        ra.end_of_alloc_scope();

        // After the last use the value is cleaned up.
        assert!(!ra.is_value_live(InstRef(0)));
        ra.assert_no_more_uses();
    }

    #[test]
    fn test_spill_and_reload() {
        let mut code = code_buffer();
        let inst_info = vec![(2u32, 64usize); ANY_GPR.len() + 1];
        let mut ra = RegAlloc::new_default(&mut code, inst_info);

        for i in 0..ANY_GPR.len() {
            let scratch = ra.scratch_gpr();
            ra.define_value(InstRef(i as u32), scratch);
            ra.end_of_alloc_scope();
        }

        // One more allocation must spill something.
        let scratch = ra.scratch_gpr();
        ra.define_value(InstRef(ANY_GPR.len() as u32), scratch);
        ra.end_of_alloc_scope();

        for i in 0..=ANY_GPR.len() {
            assert!(ra.is_value_live(InstRef(i as u32)), "value {} lost", i);
        }
        let spilled = (0..=ANY_GPR.len())
            .filter(|&i| matches!(ra.value_location(InstRef(i as u32)), Some(HostLoc::Spill(_))))
            .count();
        assert!(spilled > 0);
    }

    #[test]
    fn test_use_scratch_displaces_live_value() {
        let mut code = code_buffer();
        // InstRef(0) has two uses; consuming it as scratch for the first use
        // must preserve a copy for the second.
        let inst_info = vec![(2, 128), (1, 128), (0, 128)];
        let mut ra = RegAlloc::new_default(&mut code, inst_info);

        let scratch = ra.scratch_xmm();
        ra.define_value(InstRef(0), scratch);
        ra.end_of_alloc_scope();

        let args = [Value::Inst(InstRef(0))];
        let mut arg_info = ra.get_argument_info(InstRef(1), &args, 1);
        let result = ra.use_scratch_xmm(&mut arg_info[0]);
        ra.define_value(InstRef(1), result);
        ra.end_of_alloc_scope();

        assert!(ra.is_value_live(InstRef(0)), "remaining use must survive");
        assert!(ra.is_value_live(InstRef(1)));
    }

    #[test]
    fn test_host_call_preserves_locked_args() {
        let mut code = code_buffer();
        let inst_info = vec![(1, 128)];
        let mut ra = RegAlloc::new_default(&mut code, inst_info);

        let scratch = ra.scratch_xmm();
        ra.define_value(InstRef(0), scratch);
        ra.end_of_alloc_scope();

        let args = [Value::Inst(InstRef(0))];
        let mut arg_info = ra.get_argument_info(InstRef(0), &args, 1);
        let arg_reg = ra.use_xmm(&mut arg_info[0]);
        ra.host_call(None, &mut [None, None, None, None]);
        // The locked argument register was not scratched away.
        assert_eq!(ra.value_location(InstRef(0)), Some(arg_reg.hostloc()));
        ra.end_of_alloc_scope();
    }

    #[test]
    fn test_stack_space_balance() {
        let mut code = code_buffer();
        let mut ra = RegAlloc::new_default(&mut code, vec![]);
        ra.alloc_stack_space(48);
        assert_eq!(ra.reserved_stack_space, 48);
        ra.release_stack_space(48);
        assert_eq!(ra.reserved_stack_space, 0);
    }
}

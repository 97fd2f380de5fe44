//! IR emitter: owns the module under construction.
//!
//! The emitter holds the guest register file (module globals plus
//! per-function alloca mirrors), the shadow-image global, the
//! address-to-block and address-to-instruction maps, the spill arena and the
//! pending indirect-jump/indirect-call fix-up lists that `finish_module`
//! consumes once at the end.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::types::{FloatType, IntType, PointerType};
use inkwell::values::{
    AnyValue, BasicValue, FunctionValue, GlobalValue, InstructionValue, IntValue, PointerValue,
};
use inkwell::AddressSpace;
use tracing::{debug, trace};

use crate::error::llvm_err;
use crate::obj::reloc::read_word;
use crate::options::TranslationOptions;
use crate::disasm::regs::{self, NUM_REG_SLOTS};
use crate::{Error, Result};

/// A per-function register mirror: the alloca plus its entry-block
/// initialization, kept so untouched mirrors can be erased afterwards.
struct Mirror<'ctx> {
    alloca: PointerValue<'ctx>,
    init_load: InstructionValue<'ctx>,
    init_store: InstructionValue<'ctx>,
    read: bool,
    written: bool,
}

struct IndirectCall<'ctx> {
    dummy: InstructionValue<'ctx>,
    src: IntValue<'ctx>,
    ret_pad: Option<BasicBlock<'ctx>>,
    addr: u64,
}

struct IndirectJump<'ctx> {
    dummy: InstructionValue<'ctx>,
    index: IntValue<'ctx>,
    /// `(jump-table guest address, entry count)`; `None` for a bare
    /// register jump, which dispatches over every known text target.
    table: Option<(u64, u32)>,
    addr: u64,
}

pub struct IrEmitter<'ctx> {
    pub ctx: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    pub opts: TranslationOptions,

    pub i1_t: IntType<'ctx>,
    pub i8_t: IntType<'ctx>,
    pub i16_t: IntType<'ctx>,
    pub i32_t: IntType<'ctx>,
    pub i64_t: IntType<'ctx>,
    pub f32_t: FloatType<'ctx>,
    pub f64_t: FloatType<'ctx>,
    pub ptr_t: PointerType<'ctx>,

    shadow_global: GlobalValue<'ctx>,
    pub shadow: Vec<u8>,
    stack_top: u64,

    reg_globals: Vec<Option<GlobalValue<'ctx>>>,
    dbl_globals: Vec<Option<GlobalValue<'ctx>>>,
    mirrors: BTreeMap<u32, Mirror<'ctx>>,
    dbl_mirrors: BTreeMap<u32, Mirror<'ctx>>,

    /// Guest address -> basic block, for the function being emitted
    /// (never cleared in one-region mode).
    pub bb_map: HashMap<u64, BasicBlock<'ctx>>,
    /// Every block ever created, for late indirect-jump resolution.
    block_archive: BTreeMap<u64, BasicBlock<'ctx>>,
    /// Guest address -> first IR instruction emitted for it.
    pub ins_map: BTreeMap<u64, InstructionValue<'ctx>>,
    /// Return-site address -> owning function's entry address.
    pub function_ret_map: BTreeMap<u64, u64>,

    pub cur_addr: u64,
    pub cur_fun_addr: u64,
    pub cur_block_addr: u64,
    cur_fn: Option<FunctionValue<'ctx>>,
    cur_fn_is_main: bool,

    /// Guest entry address -> translated function (multi-region).
    functions: BTreeMap<u64, FunctionValue<'ctx>>,
    main_addr: Option<u64>,
    region_fn: Option<FunctionValue<'ctx>>,
    region_entry_bb: Option<BasicBlock<'ctx>>,
    /// All guest function entry addresses.
    pub entries: BTreeSet<u64>,
    /// Addresses following a call, the one-region return-dispatch targets.
    call_return_addrs: BTreeSet<u64>,
    pending_returns: Vec<(u64, InstructionValue<'ctx>)>,

    indirect_calls: Vec<IndirectCall<'ctx>>,
    indirect_jumps: Vec<IndirectJump<'ctx>>,
    spill_slots: HashMap<(u64, u64), PointerValue<'ctx>>,
}

impl<'ctx> IrEmitter<'ctx> {
    pub fn new(
        ctx: &'ctx Context,
        opts: TranslationOptions,
        shadow: Vec<u8>,
        stack_top: u64,
    ) -> Self {
        let module = ctx.create_module("guest");
        let builder = ctx.create_builder();
        if let Some(triple) = &opts.triple {
            module.set_triple(&inkwell::targets::TargetTriple::create(triple));
        }

        let i8_t = ctx.i8_type();
        let shadow_ty = i8_t.array_type(shadow.len() as u32);
        let shadow_global = module.add_global(shadow_ty, None, "shadow_image");
        shadow_global.set_linkage(Linkage::Internal);

        Self {
            ctx,
            module,
            builder,
            opts,
            i1_t: ctx.bool_type(),
            i8_t,
            i16_t: ctx.i16_type(),
            i32_t: ctx.i32_type(),
            i64_t: ctx.i64_type(),
            f32_t: ctx.f32_type(),
            f64_t: ctx.f64_type(),
            ptr_t: ctx.ptr_type(AddressSpace::default()),
            shadow_global,
            shadow,
            stack_top,
            reg_globals: vec![None; NUM_REG_SLOTS],
            dbl_globals: vec![None; 32],
            mirrors: BTreeMap::new(),
            dbl_mirrors: BTreeMap::new(),
            bb_map: HashMap::new(),
            block_archive: BTreeMap::new(),
            ins_map: BTreeMap::new(),
            function_ret_map: BTreeMap::new(),
            cur_addr: 0,
            cur_fun_addr: 0,
            cur_block_addr: 0,
            cur_fn: None,
            cur_fn_is_main: false,
            functions: BTreeMap::new(),
            main_addr: None,
            region_fn: None,
            region_entry_bb: None,
            entries: BTreeSet::new(),
            call_return_addrs: BTreeSet::new(),
            pending_returns: Vec::new(),
            indirect_calls: Vec::new(),
            indirect_jumps: Vec::new(),
            spill_slots: HashMap::new(),
        }
    }

    fn mirrors_active(&self) -> bool {
        !self.opts.no_locals && !self.opts.one_region
    }

    pub fn cur_fn(&self) -> FunctionValue<'ctx> {
        self.cur_fn.expect("no function under construction")
    }

    // ── Register file ──

    fn reg_global(&mut self, directive: u32) -> GlobalValue<'ctx> {
        let slot = directive as usize;
        if let Some(g) = self.reg_globals[slot] {
            return g;
        }
        let g = self
            .module
            .add_global(self.i32_t, None, &format!("reg{directive}"));
        g.set_linkage(Linkage::Internal);
        g.set_initializer(&self.i32_t.const_zero());
        self.reg_globals[slot] = Some(g);
        g
    }

    fn dbl_global(&mut self, idx: u32) -> GlobalValue<'ctx> {
        if let Some(g) = self.dbl_globals[idx as usize] {
            return g;
        }
        let g = self
            .module
            .add_global(self.f64_t, None, &format!("dreg{idx}"));
        g.set_linkage(Linkage::Internal);
        g.set_initializer(&self.f64_t.const_zero());
        self.dbl_globals[idx as usize] = Some(g);
        g
    }

    /// Address of the cell for a non-zero directive register: the function's
    /// mirror when mirrors are active, the module global otherwise.
    pub fn reg_ptr(&mut self, directive: u32) -> PointerValue<'ctx> {
        debug_assert_ne!(directive, 0, "register 0 has no cell");
        if let Some(m) = self.mirrors.get(&directive) {
            m.alloca
        } else {
            self.reg_global(directive).as_pointer_value()
        }
    }

    pub fn dbl_reg_ptr(&mut self, idx: u32) -> PointerValue<'ctx> {
        if let Some(m) = self.dbl_mirrors.get(&idx) {
            m.alloca
        } else {
            self.dbl_global(idx).as_pointer_value()
        }
    }

    pub fn mark_read(&mut self, directive: u32) {
        if let Some(m) = self.mirrors.get_mut(&directive) {
            m.read = true;
        }
    }

    pub fn mark_written(&mut self, directive: u32) {
        if let Some(m) = self.mirrors.get_mut(&directive) {
            m.written = true;
        }
    }

    pub fn mark_dbl_read(&mut self, idx: u32) {
        if let Some(m) = self.dbl_mirrors.get_mut(&idx) {
            m.read = true;
        }
    }

    pub fn mark_dbl_written(&mut self, idx: u32) {
        if let Some(m) = self.dbl_mirrors.get_mut(&idx) {
            m.written = true;
        }
    }

    /// Integer value of the shadow-image base pointer.
    pub fn shadow_base(&self) -> IntValue<'ctx> {
        self.shadow_global
            .as_pointer_value()
            .const_to_int(self.i32_t)
    }

    /// External data symbol: an undefined global referenced by relocations.
    pub fn extern_symbol(&self, name: &str) -> GlobalValue<'ctx> {
        self.module
            .get_global(name)
            .unwrap_or_else(|| self.module.add_global(self.i32_t, None, name))
    }

    // ── Functions ──

    /// Declare one translated function per guest entry, ahead of emission,
    /// so direct and indirect calls can reference them in address order.
    pub fn declare_functions(&mut self, symbols: &[(u64, String)]) -> Result<()> {
        for (addr, name) in symbols {
            self.entries.insert(*addr);
            if name == "main" {
                self.main_addr = Some(*addr);
            }
        }
        if self.opts.one_region {
            let fn_ty = self.ctx.void_type().fn_type(&[self.i32_t.into()], false);
            let region = self.module.add_function("region", fn_ty, None);
            self.region_fn = Some(region);
            self.region_entry_bb = Some(self.ctx.append_basic_block(region, "entry"));
            if let Some(main_addr) = self.main_addr {
                self.build_one_region_main(region, main_addr)?;
            }
            return Ok(());
        }
        for (addr, name) in symbols {
            let f = if name == "main" {
                let ty = self
                    .i32_t
                    .fn_type(&[self.i32_t.into(), self.ptr_t.into()], false);
                self.module.add_function("main", ty, None)
            } else {
                let ty = self.ctx.void_type().fn_type(&[], false);
                let f = self.module.add_function(&format!("a{addr:x}"), ty, None);
                f.set_linkage(Linkage::Internal);
                f
            };
            self.functions.insert(*addr, f);
        }
        Ok(())
    }

    /// The host-callable `main` for one-region mode: marshal argc, set up the
    /// guest stack pointer and enter the region at main's guest address.
    fn build_one_region_main(
        &mut self,
        region: FunctionValue<'ctx>,
        main_addr: u64,
    ) -> Result<()> {
        let ty = self
            .i32_t
            .fn_type(&[self.i32_t.into(), self.ptr_t.into()], false);
        let main = self.module.add_function("main", ty, None);
        let bb = self.ctx.append_basic_block(main, "entry");
        self.builder.position_at_end(bb);
        let argc = main
            .get_nth_param(0)
            .ok_or_else(|| Error::Internal("main has no argc".into()))?
            .into_int_value();
        let a0 = self.reg_global(regs::A0).as_pointer_value();
        llvm_err(self.builder.build_store(a0, argc))?;
        let sp = self.reg_global(regs::SP).as_pointer_value();
        let top = self.i32_t.const_int(self.stack_top, false);
        llvm_err(self.builder.build_store(sp, top))?;
        let entry = self.i32_t.const_int(main_addr, false);
        llvm_err(self.builder.build_call(region, &[entry.into()], ""))?;
        let v0 = self.reg_global(regs::V0).as_pointer_value();
        let ret = llvm_err(self.builder.build_load(self.i32_t, v0, "ret"))?;
        llvm_err(self.builder.build_return(Some(&ret)))?;
        Ok(())
    }

    pub fn function_for(&self, addr: u64) -> Option<FunctionValue<'ctx>> {
        self.functions.get(&addr).copied()
    }

    pub fn start_function(&mut self, name: &str, addr: u64) -> Result<()> {
        debug!(name, addr, "starting function");
        self.cur_fun_addr = addr;
        self.cur_addr = addr;
        self.cur_block_addr = addr;
        self.cur_fn_is_main = name == "main";

        if self.opts.one_region {
            self.cur_fn = self.region_fn;
            let bb = self.create_bb(addr)?;
            // The previous symbol's trailing block must not fall into this
            // entry; an unterminated predecessor is closed off here.
            if let Some(prev) = self.builder.get_insert_block() {
                if prev.get_terminator().is_none() && prev != bb {
                    llvm_err(self.builder.build_unconditional_branch(bb))?;
                }
            }
            self.builder.position_at_end(bb);
            return Ok(());
        }

        let f = self
            .function_for(addr)
            .ok_or_else(|| Error::Internal(format!("no declaration for {name} at {addr:#x}")))?;
        self.cur_fn = Some(f);
        self.bb_map.clear();
        self.mirrors.clear();
        self.dbl_mirrors.clear();

        let entry = self.ctx.append_basic_block(f, "entry");
        self.builder.position_at_end(entry);
        self.bb_map.insert(addr, entry);
        self.block_archive.insert(addr, entry);

        if self.mirrors_active() {
            self.create_mirrors()?;
        }
        if self.cur_fn_is_main {
            let argc = f
                .get_nth_param(0)
                .ok_or_else(|| Error::Internal("main has no argc".into()))?
                .into_int_value();
            let a0 = self.reg_ptr(regs::A0);
            llvm_err(self.builder.build_store(a0, argc))?;
            self.mark_written(regs::A0);
            let sp = self.reg_ptr(regs::SP);
            let top = self.i32_t.const_int(self.stack_top, false);
            llvm_err(self.builder.build_store(sp, top))?;
            self.mark_written(regs::SP);
        }
        Ok(())
    }

    pub fn start_main_function(&mut self, addr: u64) -> Result<()> {
        self.start_function("main", addr)
    }

    /// Allocate the per-function register mirrors and load their initial
    /// values from the globals. Untouched mirrors are erased in
    /// `clean_regs`; mem2reg promotes the rest.
    fn create_mirrors(&mut self) -> Result<()> {
        for d in (1u32..32).chain(34..66).chain([regs::FCC]) {
            let g = self.reg_global(d).as_pointer_value();
            let alloca = llvm_err(self.builder.build_alloca(self.i32_t, &format!("r{d}")))?;
            let init = llvm_err(self.builder.build_load(self.i32_t, g, ""))?;
            let store = llvm_err(self.builder.build_store(alloca, init.into_int_value()))?;
            self.mirrors.insert(
                d,
                Mirror {
                    alloca,
                    init_load: init.as_instruction_value().ok_or_else(|| {
                        Error::Internal("register init load is not an instruction".into())
                    })?,
                    init_store: store,
                    read: false,
                    written: false,
                },
            );
        }
        for idx in 0..32 {
            let g = self.dbl_global(idx).as_pointer_value();
            let alloca = llvm_err(self.builder.build_alloca(self.f64_t, &format!("d{idx}")))?;
            let init = llvm_err(self.builder.build_load(self.f64_t, g, ""))?;
            let store = llvm_err(self.builder.build_store(alloca, init.into_float_value()))?;
            self.dbl_mirrors.insert(
                idx,
                Mirror {
                    alloca,
                    init_load: init.as_instruction_value().ok_or_else(|| {
                        Error::Internal("register init load is not an instruction".into())
                    })?,
                    init_store: store,
                    read: false,
                    written: false,
                },
            );
        }
        Ok(())
    }

    // ── Checkpoints ──

    /// Flush written register mirrors back to the globals. Runs before a
    /// call leaves the function and before `ret`.
    pub fn handle_function_exit_point(&mut self) -> Result<()> {
        if !self.mirrors_active() {
            return Ok(());
        }
        let written: Vec<u32> = self
            .mirrors
            .iter()
            .filter(|(_, m)| m.written)
            .map(|(d, _)| *d)
            .collect();
        for d in written {
            let alloca = self.mirrors[&d].alloca;
            let g = self.reg_global(d).as_pointer_value();
            let v = llvm_err(self.builder.build_load(self.i32_t, alloca, ""))?;
            llvm_err(self.builder.build_store(g, v.into_int_value()))?;
        }
        let written: Vec<u32> = self
            .dbl_mirrors
            .iter()
            .filter(|(_, m)| m.written)
            .map(|(d, _)| *d)
            .collect();
        for idx in written {
            let alloca = self.dbl_mirrors[&idx].alloca;
            let g = self.dbl_global(idx).as_pointer_value();
            let v = llvm_err(self.builder.build_load(self.f64_t, alloca, ""))?;
            llvm_err(self.builder.build_store(g, v.into_float_value()))?;
        }
        Ok(())
    }

    /// Reload every mirror from the globals after control returns.
    pub fn handle_function_entry_point(&mut self) -> Result<()> {
        if !self.mirrors_active() {
            return Ok(());
        }
        let gp: Vec<u32> = self.mirrors.keys().copied().collect();
        for d in gp {
            let alloca = self.mirrors[&d].alloca;
            let g = self.reg_global(d).as_pointer_value();
            let v = llvm_err(self.builder.build_load(self.i32_t, g, ""))?;
            llvm_err(self.builder.build_store(alloca, v.into_int_value()))?;
        }
        let dbl: Vec<u32> = self.dbl_mirrors.keys().copied().collect();
        for idx in dbl {
            let alloca = self.dbl_mirrors[&idx].alloca;
            let g = self.dbl_global(idx).as_pointer_value();
            let v = llvm_err(self.builder.build_load(self.f64_t, g, ""))?;
            llvm_err(self.builder.build_store(alloca, v.into_float_value()))?;
        }
        Ok(())
    }

    // ── Blocks ──

    /// One block per guest address; repeat requests return the same block.
    pub fn create_bb(&mut self, addr: u64) -> Result<BasicBlock<'ctx>> {
        if let Some(bb) = self.bb_map.get(&addr) {
            return Ok(*bb);
        }
        let f = self.cur_fn();
        let bb = self.ctx.append_basic_block(f, &format!("bb{addr:x}"));
        self.bb_map.insert(addr, bb);
        self.block_archive.insert(addr, bb);
        Ok(bb)
    }

    /// A backward branch must land on a block that already exists, split at
    /// the pinned first instruction of its target address.
    pub fn handle_back_edge(&mut self, addr: u64) -> Result<BasicBlock<'ctx>> {
        if let Some(bb) = self.bb_map.get(&addr) {
            return Ok(*bb);
        }
        Err(Error::UnmappedBranchTarget { addr })
    }

    /// Continue emission in the block for `addr`, closing the current block
    /// with a fall-through branch if it is still open.
    pub fn switch_to_block(&mut self, addr: u64) -> Result<()> {
        let bb = self.create_bb(addr)?;
        if self.builder.get_insert_block() != Some(bb) {
            if let Some(cur) = self.builder.get_insert_block() {
                if cur.get_terminator().is_none() {
                    llvm_err(self.builder.build_unconditional_branch(bb))?;
                }
            }
            self.builder.position_at_end(bb);
        }
        self.cur_block_addr = addr;
        Ok(())
    }

    // ── Memory ──

    /// Typed pointer to guest memory at the (32-bit) address `addr`:
    /// `shadow_base + addr`, or the address itself under `NoShadow`.
    pub fn access_shadow_memory(&mut self, addr: IntValue<'ctx>) -> Result<PointerValue<'ctx>> {
        if self.opts.no_shadow {
            return llvm_err(self.builder.build_int_to_ptr(addr, self.ptr_t, "hostptr"));
        }
        let base = self.shadow_global.as_pointer_value();
        let ptr = unsafe {
            llvm_err(self.builder.build_gep(self.i8_t, base, &[addr], "shadow"))?
        };
        Ok(ptr)
    }

    /// Slot in the spill arena for a unique `(reg, offset)` index.
    pub fn access_spill_memory(&mut self, idx: u64) -> PointerValue<'ctx> {
        let key = (if self.opts.one_region { 0 } else { self.cur_fun_addr }, idx);
        if let Some(p) = self.spill_slots.get(&key) {
            return *p;
        }
        let name = if self.opts.one_region {
            format!("spill_{idx}")
        } else {
            format!("spill_{:x}_{idx}", self.cur_fun_addr)
        };
        let g = self.module.add_global(self.i32_t, None, &name);
        g.set_linkage(Linkage::Internal);
        g.set_initializer(&self.i32_t.const_zero());
        let p = g.as_pointer_value();
        self.spill_slots.insert(key, p);
        p
    }

    // ── Calls and jumps ──

    /// The IR-visible address of a translated function: its guest entry.
    pub fn handle_get_function_addr(&mut self, addr: u64) -> IntValue<'ctx> {
        self.entries.insert(addr);
        self.i32_t.const_int(addr, false)
    }

    /// Direct call to the translated function at `target`.
    pub fn handle_local_call(&mut self, target: u64) -> Result<()> {
        let ret_addr = self.cur_addr + 4;
        if self.opts.one_region {
            // Calls are branches: set the return address and jump.
            let ra = self.reg_ptr(regs::RA);
            let ret = self.i32_t.const_int(ret_addr, false);
            llvm_err(self.builder.build_store(ra, ret))?;
            let bb = self.create_bb(target)?;
            llvm_err(self.builder.build_unconditional_branch(bb))?;
            self.call_return_addrs.insert(ret_addr);
            self.create_bb(ret_addr)?;
            return Ok(());
        }
        self.handle_function_exit_point()?;
        let f = match self.function_for(target) {
            Some(f) => f,
            None => {
                // A call into an address without a symbol still gets a
                // declaration; emission reaches it through its own symbol.
                let ty = self.ctx.void_type().fn_type(&[], false);
                let f = self
                    .module
                    .get_function(&format!("a{target:x}"))
                    .unwrap_or_else(|| {
                        self.module
                            .add_function(&format!("a{target:x}"), ty, None)
                    });
                self.functions.insert(target, f);
                self.entries.insert(target);
                f
            }
        };
        if f.count_params() > 0 {
            let zero = self.i32_t.const_zero();
            let null = self.ptr_t.const_null();
            llvm_err(self.builder.build_call(f, &[zero.into(), null.into()], ""))?;
        } else {
            llvm_err(self.builder.build_call(f, &[], ""))?;
        }
        self.handle_function_entry_point()?;
        Ok(())
    }

    /// Record an indirect call. The placeholder terminator is replaced by a
    /// dispatch over every known function entry in `finish_module`.
    pub fn add_indirect_call(&mut self, src: IntValue<'ctx>) -> Result<()> {
        let next = self.cur_addr + 4;
        if self.opts.one_region {
            let ra = self.reg_ptr(regs::RA);
            let ret = self.i32_t.const_int(next, false);
            llvm_err(self.builder.build_store(ra, ret))?;
            let dummy = llvm_err(self.builder.build_unreachable())?;
            self.call_return_addrs.insert(next);
            self.indirect_calls.push(IndirectCall {
                dummy,
                src,
                ret_pad: None,
                addr: self.cur_addr,
            });
            self.create_bb(next)?;
            return Ok(());
        }
        self.handle_function_exit_point()?;
        let pad = self
            .ctx
            .append_basic_block(self.cur_fn(), &format!("icall_ret_{:x}", self.cur_addr));
        let dummy = llvm_err(self.builder.build_unconditional_branch(pad))?;
        self.builder.position_at_end(pad);
        self.handle_function_entry_point()?;
        self.indirect_calls.push(IndirectCall {
            dummy,
            src,
            ret_pad: Some(pad),
            addr: self.cur_addr,
        });
        self.create_bb(next)?;
        Ok(())
    }

    /// Record an indirect jump (jump-table or bare register).
    pub fn add_indirect_jump(
        &mut self,
        index: IntValue<'ctx>,
        table: Option<(u64, u32)>,
    ) -> Result<()> {
        let dummy = llvm_err(self.builder.build_unreachable())?;
        self.indirect_jumps.push(IndirectJump {
            dummy,
            index,
            table,
            addr: self.cur_addr,
        });
        self.create_bb(self.cur_addr + 4)?;
        Ok(())
    }

    /// `jr ra`: flush mirrors and return. Main returns V0 to the host.
    pub fn handle_return(&mut self) -> Result<()> {
        self.function_ret_map.insert(self.cur_addr, self.cur_fun_addr);
        if self.opts.one_region {
            let dummy = llvm_err(self.builder.build_unreachable())?;
            self.pending_returns.push((self.cur_addr, dummy));
            self.create_bb(self.cur_addr + 4)?;
            return Ok(());
        }
        if self.cur_fn_is_main {
            let v0 = self.reg_ptr(regs::V0);
            self.mark_read(regs::V0);
            let v = llvm_err(self.builder.build_load(self.i32_t, v0, "exitcode"))?;
            llvm_err(self.builder.build_return(Some(&v.into_int_value())))?;
        } else {
            self.handle_function_exit_point()?;
            llvm_err(self.builder.build_return(None))?;
        }
        self.create_bb(self.cur_addr + 4)?;
        Ok(())
    }

    // ── Finalization ──

    /// Give every unterminated block a branch to the textually next block.
    /// Address-keyed blocks chain in address order; anonymous blocks (call
    /// return pads) chain to their layout successor.
    pub fn fix_bb_terminators(&mut self) -> Result<()> {
        let Some(func) = self.cur_fn else {
            return Ok(());
        };
        let mut addrs: Vec<u64> = self.bb_map.keys().copied().collect();
        addrs.sort_unstable();
        for (i, addr) in addrs.iter().enumerate() {
            let bb = self.bb_map[addr];
            if bb.get_terminator().is_some() {
                continue;
            }
            self.builder.position_at_end(bb);
            match addrs.get(i + 1) {
                Some(next) => {
                    let next_bb = self.bb_map[next];
                    llvm_err(self.builder.build_unconditional_branch(next_bb))?;
                }
                None => {
                    llvm_err(self.builder.build_unreachable())?;
                }
            }
        }
        for bb in func.get_basic_blocks() {
            if bb.get_terminator().is_some() {
                continue;
            }
            self.builder.position_at_end(bb);
            match bb.get_next_basic_block() {
                Some(next) => {
                    llvm_err(self.builder.build_unconditional_branch(next))?;
                }
                None => {
                    llvm_err(self.builder.build_unreachable())?;
                }
            }
        }
        Ok(())
    }

    /// Erase register mirrors the function never touched.
    pub fn clean_regs(&mut self) {
        for (_, m) in self
            .mirrors
            .iter()
            .chain(self.dbl_mirrors.iter())
            .filter(|(_, m)| !m.read && !m.written)
        {
            m.init_store.erase_from_basic_block();
            m.init_load.erase_from_basic_block();
            if let Some(alloca) = m.alloca.as_instruction_value() {
                alloca.erase_from_basic_block();
            }
        }
    }

    pub fn finish_function(&mut self) -> Result<()> {
        if self.opts.one_region {
            return Ok(());
        }
        self.clean_regs();
        self.fix_bb_terminators()?;
        if self.opts.debug_ir {
            eprintln!(
                "{}",
                self.cur_fn().print_to_string().to_string()
            );
        }
        Ok(())
    }

    /// Resolve every pending fix-up, patch the shadow image and (in
    /// one-region mode) build the entry and return dispatches.
    pub fn finish_module(&mut self, text_targets: &[(u64, u64)]) -> Result<()> {
        self.process_indirect_jumps(text_targets)?;
        self.process_indirect_calls()?;
        // Indirect-jump resolution may have rewritten shadow bytes; refresh
        // the initializer before anything prints the module.
        self.update_shadow_image();
        if self.opts.debug_ir && !self.opts.one_region {
            eprintln!("{}", self.module.print_to_string().to_string());
        }
        if self.opts.one_region {
            self.fix_entry_point()?;
            self.fix_bb_terminators()?;
            self.build_returns()?;
            if self.opts.debug_ir {
                eprintln!("{}", self.module.print_to_string().to_string());
            }
        }
        Ok(())
    }

    /// Patch text-target relocations into the shadow image, then replace
    /// each pending indirect-jump placeholder with a switch over its
    /// jump-table entries (or over all patched text targets for a bare
    /// register jump).
    fn process_indirect_jumps(&mut self, text_targets: &[(u64, u64)]) -> Result<()> {
        let mut patched = Vec::new();
        for (patch_addr, target) in text_targets {
            crate::obj::reloc::patch_word(&mut self.shadow, *patch_addr, *target as u32);
            patched.push(*target);
        }
        patched.sort_unstable();
        patched.dedup();

        let jumps = std::mem::take(&mut self.indirect_jumps);
        for j in jumps {
            let func = parent_function(j.dummy)?;
            let targets: Vec<u64> = match j.table {
                Some((jt, count)) => (0..count)
                    .map(|i| u64::from(read_word(&self.shadow, jt + 4 * u64::from(i))))
                    .collect(),
                None => patched.clone(),
            };
            let mut cases = Vec::new();
            let mut seen = BTreeSet::new();
            for t in targets {
                if !seen.insert(t) {
                    continue;
                }
                let Some(bb) = self.block_archive.get(&t) else {
                    return Err(Error::UnmappedBranchTarget { addr: t });
                };
                if bb.get_parent() != Some(func) {
                    continue;
                }
                cases.push((self.i32_t.const_int(t, false), *bb));
            }
            trace!(addr = j.addr, cases = cases.len(), "resolving indirect jump");
            let fail = self.ctx.append_basic_block(func, &format!("ijmp_fail_{:x}", j.addr));
            self.builder.position_at_end(fail);
            llvm_err(self.builder.build_unreachable())?;
            self.builder.position_before(&j.dummy);
            llvm_err(self.builder.build_switch(j.index, fail, &cases))?;
            j.dummy.erase_from_basic_block();
        }
        Ok(())
    }

    /// Replace each pending indirect-call placeholder with a dispatch from
    /// every known function entry address to a direct call (multi-region) or
    /// a branch to the entry block (one-region).
    fn process_indirect_calls(&mut self) -> Result<()> {
        let calls = std::mem::take(&mut self.indirect_calls);
        for c in calls {
            let func = parent_function(c.dummy)?;
            let fail = self
                .ctx
                .append_basic_block(func, &format!("icall_fail_{:x}", c.addr));
            self.builder.position_at_end(fail);
            llvm_err(self.builder.build_unreachable())?;

            let mut cases = Vec::new();
            if self.opts.one_region {
                let entries: Vec<u64> = self.entries.iter().copied().collect();
                for addr in entries {
                    if let Some(bb) = self.block_archive.get(&addr) {
                        cases.push((self.i32_t.const_int(addr, false), *bb));
                    }
                }
            } else {
                let pad = c
                    .ret_pad
                    .ok_or_else(|| Error::Internal("indirect call without return pad".into()))?;
                let funcs: Vec<(u64, FunctionValue<'ctx>)> =
                    self.functions.iter().map(|(a, f)| (*a, *f)).collect();
                for (addr, f) in funcs {
                    let bb = self
                        .ctx
                        .append_basic_block(func, &format!("icall_{:x}_{addr:x}", c.addr));
                    self.builder.position_at_end(bb);
                    if f.count_params() > 0 {
                        let zero = self.i32_t.const_zero();
                        let null = self.ptr_t.const_null();
                        llvm_err(self.builder.build_call(f, &[zero.into(), null.into()], ""))?;
                    } else {
                        llvm_err(self.builder.build_call(f, &[], ""))?;
                    }
                    llvm_err(self.builder.build_unconditional_branch(pad))?;
                    cases.push((self.i32_t.const_int(addr, false), bb));
                }
            }
            self.builder.position_before(&c.dummy);
            llvm_err(self.builder.build_switch(c.src, fail, &cases))?;
            c.dummy.erase_from_basic_block();
        }
        Ok(())
    }

    /// One-region entry block: dispatch on the entry-address parameter.
    fn fix_entry_point(&mut self) -> Result<()> {
        let region = self
            .region_fn
            .ok_or_else(|| Error::Internal("one-region mode without region function".into()))?;
        let entry_bb = self
            .region_entry_bb
            .ok_or_else(|| Error::Internal("region function has no entry block".into()))?;
        let param = region
            .get_nth_param(0)
            .ok_or_else(|| Error::Internal("region function has no parameter".into()))?
            .into_int_value();
        let fail = self.ctx.append_basic_block(region, "entry_fail");
        self.builder.position_at_end(fail);
        llvm_err(self.builder.build_unreachable())?;
        let mut cases = Vec::new();
        for addr in &self.entries {
            if let Some(bb) = self.block_archive.get(addr) {
                cases.push((self.i32_t.const_int(*addr, false), *bb));
            }
        }
        self.builder.position_at_end(entry_bb);
        llvm_err(self.builder.build_switch(param, fail, &cases))?;
        Ok(())
    }

    /// One-region returns: each recorded `jr ra` dispatches on RA over every
    /// known call-return address; main's return leaves the region.
    fn build_returns(&mut self) -> Result<()> {
        let returns = std::mem::take(&mut self.pending_returns);
        for (addr, dummy) in returns {
            let func = parent_function(dummy)?;
            self.builder.position_before(&dummy);
            let ra = self.reg_ptr(regs::RA);
            let v = llvm_err(self.builder.build_load(self.i32_t, ra, "ra"))?;
            let exit = self
                .ctx
                .append_basic_block(func, &format!("ret_exit_{addr:x}"));
            self.builder.position_at_end(exit);
            llvm_err(self.builder.build_return(None))?;
            let mut cases = Vec::new();
            for ret in &self.call_return_addrs {
                if let Some(bb) = self.block_archive.get(ret) {
                    cases.push((self.i32_t.const_int(*ret, false), *bb));
                }
            }
            self.builder.position_before(&dummy);
            llvm_err(self.builder.build_switch(v.into_int_value(), exit, &cases))?;
            dummy.erase_from_basic_block();
        }
        Ok(())
    }

    /// Write the final shadow-image bytes into the global's initializer.
    pub fn update_shadow_image(&mut self) {
        let init = self.ctx.const_string(&self.shadow, false);
        self.shadow_global.set_initializer(&init);
    }

    /// Hand the finished module to the caller.
    pub fn take_module(self) -> Module<'ctx> {
        self.module
    }
}

fn parent_function(instr: InstructionValue<'_>) -> Result<FunctionValue<'_>> {
    instr
        .get_parent()
        .and_then(|bb| bb.get_parent())
        .ok_or_else(|| Error::Internal("placeholder instruction has no parent".into()))
}

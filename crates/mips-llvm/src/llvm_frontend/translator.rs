//! The instruction-lowering core: one handler per decoded opcode.
//!
//! Operand resolvers turn decoded operands into IR values, honoring pending
//! relocations at the current decode address; handlers emit the semantic
//! effect through the emitter. Register 0 reads as constant zero and
//! swallows writes.

use inkwell::basic_block::BasicBlock;
use inkwell::values::{FloatValue, IntValue, PointerValue};
use inkwell::{FloatPredicate, IntPredicate};
use tracing::{trace, warn};

use crate::disasm::regs::{conv_to_directive, conv_to_directive_dbl, FCC, RA};
use crate::disasm::{DecodedInst, Opcode, Operand, INSN_SIZE};
use crate::error::llvm_err;
use crate::obj::reloc::RelocationReader;
use crate::obj::{is_lo16, R_MICROMIPS_LO16};
use crate::{Error, Result};

use super::emitter::IrEmitter;
use super::syscalls;

/// Pending low half of an `LDI`; the next instruction must be the `LDIHI`.
struct LdiPending<'ctx> {
    dst: Option<(u32, PointerValue<'ctx>)>,
    low: IntValue<'ctx>,
    addr: u64,
}

pub struct InstTranslator<'a, 'ctx> {
    pub em: IrEmitter<'ctx>,
    pub relocs: &'a RelocationReader<'a>,
    ldi: Option<LdiPending<'ctx>>,
}

impl<'a, 'ctx> InstTranslator<'a, 'ctx> {
    pub fn new(em: IrEmitter<'ctx>, relocs: &'a RelocationReader<'a>) -> Self {
        Self {
            em,
            relocs,
            ldi: None,
        }
    }

    pub fn into_emitter(self) -> IrEmitter<'ctx> {
        self.em
    }

    // ── Operand resolvers ──

    /// ALU source: a register cell load, or an immediate with any pending
    /// HI16/LO16 relocation folded in.
    fn alu_src(&mut self, op: Operand) -> Result<IntValue<'ctx>> {
        match op {
            Operand::Reg(r) => {
                let d = conv_to_directive(r);
                if d == 0 {
                    return Ok(self.em.i32_t.const_zero());
                }
                let cell = self.em.reg_ptr(d);
                self.em.mark_read(d);
                let v = llvm_err(self.em.builder.build_load(self.em.i32_t, cell, ""))?;
                Ok(v.into_int_value())
            }
            Operand::Imm(imm) => self.imm_src(imm),
        }
    }

    fn imm_src(&mut self, imm: i64) -> Result<IntValue<'ctx>> {
        let Some(rr) = self.relocs.resolve(self.em.cur_addr, false) else {
            return Ok(self.em.i32_t.const_int(imm as u64, false));
        };
        if crate::obj::is_hilo16(rr.rtype) {
            if rr.is_func_addr {
                // The immediate pair materializes a function address.
                let v = self.em.handle_get_function_addr(rr.value);
                return Ok(if is_lo16(rr.rtype) {
                    v
                } else {
                    self.em.i32_t.const_zero()
                });
            }
            let v0 = if rr.undefined {
                let sym = self.em.extern_symbol(&rr.symbol);
                let host = sym.as_pointer_value().const_to_int(self.em.i32_t);
                let off = self.em.i32_t.const_int(imm as u64, false);
                llvm_err(self.em.builder.build_int_add(host, off, ""))?
            } else {
                self.em
                    .i32_t
                    .const_int(rr.value.wrapping_add(imm as u64) & 0xffff_ffff, false)
            };
            let v1 = if self.em.opts.no_shadow {
                let shadow = self.em.shadow_base();
                llvm_err(self.em.builder.build_int_add(v0, shadow, ""))?
            } else if rr.undefined {
                let shadow = self.em.shadow_base();
                llvm_err(self.em.builder.build_int_sub(v0, shadow, ""))?
            } else {
                v0
            };
            // The high half is carried by the fused-immediate pair.
            return Ok(if is_lo16(rr.rtype) {
                v1
            } else {
                self.em.i32_t.const_zero()
            });
        }
        if rr.is_func_addr {
            let v = self.em.handle_get_function_addr(rr.value);
            return Ok(if is_lo16(rr.rtype) {
                v
            } else {
                self.em.i32_t.const_zero()
            });
        }
        Ok(self.em.i32_t.const_int(imm as u64, false))
    }

    /// ALU destination cell; `None` for the hard-wired zero register.
    fn alu_dst(&mut self, op: Operand) -> Result<Option<(u32, PointerValue<'ctx>)>> {
        let r = op.reg()?;
        let d = conv_to_directive(r);
        if d == 0 {
            return Ok(None);
        }
        Ok(Some((d, self.em.reg_ptr(d))))
    }

    fn store_gp(&mut self, dst: Option<(u32, PointerValue<'ctx>)>, v: IntValue<'ctx>) -> Result<()> {
        if let Some((d, cell)) = dst {
            llvm_err(self.em.builder.build_store(cell, v))?;
            self.em.mark_written(d);
        }
        Ok(())
    }

    fn float_src(&mut self, op: Operand) -> Result<FloatValue<'ctx>> {
        let r = op.reg()?;
        let d = conv_to_directive(r);
        let cell = self.em.reg_ptr(d);
        self.em.mark_read(d);
        let raw = llvm_err(self.em.builder.build_load(self.em.i32_t, cell, ""))?;
        let v = llvm_err(self.em.builder.build_bit_cast(
            raw.into_int_value(),
            self.em.f32_t,
            "",
        ))?;
        Ok(v.into_float_value())
    }

    fn float_dst(&mut self, op: Operand) -> Result<(u32, PointerValue<'ctx>)> {
        let r = op.reg()?;
        let d = conv_to_directive(r);
        Ok((d, self.em.reg_ptr(d)))
    }

    fn store_float(&mut self, dst: (u32, PointerValue<'ctx>), v: FloatValue<'ctx>) -> Result<()> {
        llvm_err(self.em.builder.build_store(dst.1, v))?;
        self.em.mark_written(dst.0);
        Ok(())
    }

    fn double_src(&mut self, op: Operand) -> Result<FloatValue<'ctx>> {
        let r = op.reg()?;
        let idx = conv_to_directive_dbl(r);
        let cell = self.em.dbl_reg_ptr(idx);
        self.em.mark_dbl_read(idx);
        let v = llvm_err(self.em.builder.build_load(self.em.f64_t, cell, ""))?;
        Ok(v.into_float_value())
    }

    fn double_dst(&mut self, op: Operand) -> Result<(u32, PointerValue<'ctx>)> {
        let r = op.reg()?;
        let idx = conv_to_directive_dbl(r);
        Ok((idx, self.em.dbl_reg_ptr(idx)))
    }

    fn store_double(&mut self, dst: (u32, PointerValue<'ctx>), v: FloatValue<'ctx>) -> Result<()> {
        llvm_err(self.em.builder.build_store(dst.1, v))?;
        self.em.mark_dbl_written(dst.0);
        Ok(())
    }

    /// Split a double into its 32-bit halves (little-endian).
    fn save_double(&mut self, v: FloatValue<'ctx>) -> Result<(IntValue<'ctx>, IntValue<'ctx>)> {
        let bits = llvm_err(self.em.builder.build_bit_cast(v, self.em.i64_t, ""))?;
        let bits = bits.into_int_value();
        let shifted = llvm_err(self.em.builder.build_right_shift(
            bits,
            self.em.i64_t.const_int(32, false),
            false,
            "",
        ))?;
        let hi = llvm_err(self.em.builder.build_int_truncate(shifted, self.em.i32_t, ""))?;
        let lo = llvm_err(self.em.builder.build_int_truncate(bits, self.em.i32_t, ""))?;
        Ok((lo, hi))
    }

    /// Memory operand `(reg, imm)`: a typed shadow pointer for the requested
    /// width. 32-bit SP/FP accesses redirect to the spill arena under
    /// aggressive stack optimization.
    fn mem_operand(
        &mut self,
        base_op: Operand,
        off_op: Operand,
        width: u32,
        offset: i64,
    ) -> Result<PointerValue<'ctx>> {
        let base_reg = conv_to_directive(base_op.reg()?);
        if self.em.opts.aggr_optimize_stack
            && !self.em.opts.no_locals
            && (base_reg == 29 || base_reg == 30)
            && width == 32
        {
            return self.spilled_operand(base_op, off_op);
        }
        let imm = off_op.imm()?;
        let idx = if let Some(rr) = self.relocs.hilo_at(self.em.cur_addr) {
            if !is_lo16(rr.rtype) {
                return Err(Error::UnmappedRelocation(rr.rtype));
            }
            let v0 = if rr.undefined {
                let sym = self.em.extern_symbol(&rr.symbol);
                let host = sym.as_pointer_value().const_to_int(self.em.i32_t);
                let off = self.em.i32_t.const_int(imm as u64, false);
                llvm_err(self.em.builder.build_int_add(host, off, ""))?
            } else {
                self.em
                    .i32_t
                    .const_int(rr.value.wrapping_add(imm as u64) & 0xffff_ffff, false)
            };
            if self.em.opts.no_shadow {
                let shadow = self.em.shadow_base();
                llvm_err(self.em.builder.build_int_add(v0, shadow, ""))?
            } else if rr.undefined {
                let shadow = self.em.shadow_base();
                llvm_err(self.em.builder.build_int_sub(v0, shadow, ""))?
            } else {
                v0
            }
        } else {
            self.em
                .i32_t
                .const_int((imm + offset) as u64 & 0xffff_ffff, false)
        };
        let base = if base_reg == 0 {
            self.em.i32_t.const_zero()
        } else {
            let cell = self.em.reg_ptr(base_reg);
            self.em.mark_read(base_reg);
            llvm_err(self.em.builder.build_load(self.em.i32_t, cell, ""))?.into_int_value()
        };
        let addr = llvm_err(self.em.builder.build_int_add(base, idx, ""))?;
        self.em.access_shadow_memory(addr)
    }

    /// FP memory operand: `(reg, imm)` or the indexed `(reg, reg)` form.
    fn fp_mem_operand(&mut self, base_op: Operand, off_op: Operand) -> Result<PointerValue<'ctx>> {
        match off_op {
            Operand::Imm(_) => self.mem_operand(base_op, off_op, 64, 0),
            Operand::Reg(r2) => {
                let base_reg = conv_to_directive(base_op.reg()?);
                let idx_reg = conv_to_directive(r2);
                let base = if base_reg == 0 {
                    self.em.i32_t.const_zero()
                } else {
                    let cell = self.em.reg_ptr(base_reg);
                    self.em.mark_read(base_reg);
                    llvm_err(self.em.builder.build_load(self.em.i32_t, cell, ""))?
                        .into_int_value()
                };
                let idx = if idx_reg == 0 {
                    self.em.i32_t.const_zero()
                } else {
                    let cell = self.em.reg_ptr(idx_reg);
                    self.em.mark_read(idx_reg);
                    llvm_err(self.em.builder.build_load(self.em.i32_t, cell, ""))?
                        .into_int_value()
                };
                let addr = llvm_err(self.em.builder.build_int_add(base, idx, ""))?;
                self.em.access_shadow_memory(addr)
            }
        }
    }

    /// Spill-arena slot for a `[sp/fp + imm]` access; FP offsets live in a
    /// disjoint range.
    fn spilled_operand(&mut self, base_op: Operand, off_op: Operand) -> Result<PointerValue<'ctx>> {
        if !self.em.opts.stack_redirection() {
            return self.mem_operand_direct(base_op, off_op);
        }
        let base_reg = conv_to_directive(base_op.reg()?);
        if base_reg != 29 && base_reg != 30 {
            return Err(Error::InvalidOperand(
                "spilled operand base must be SP or FP".into(),
            ));
        }
        let mut idx = off_op.imm()?;
        if base_reg == 30 {
            idx += 1_000_000;
        }
        Ok(self.em.access_spill_memory(idx as u64))
    }

    /// The non-redirected `(reg, imm)` path, for the spill fallback.
    fn mem_operand_direct(
        &mut self,
        base_op: Operand,
        off_op: Operand,
    ) -> Result<PointerValue<'ctx>> {
        let imm = off_op.imm()?;
        let base_reg = conv_to_directive(base_op.reg()?);
        let idx = self.em.i32_t.const_int(imm as u64 & 0xffff_ffff, false);
        let base = if base_reg == 0 {
            self.em.i32_t.const_zero()
        } else {
            let cell = self.em.reg_ptr(base_reg);
            self.em.mark_read(base_reg);
            llvm_err(self.em.builder.build_load(self.em.i32_t, cell, ""))?.into_int_value()
        };
        let addr = llvm_err(self.em.builder.build_int_add(base, idx, ""))?;
        self.em.access_shadow_memory(addr)
    }

    /// `addiu dst, sp/fp, imm` under stack optimization takes the address of
    /// a spill slot instead of a guest-stack address.
    fn get_spilled_address(
        &mut self,
        src: Operand,
        off: Operand,
        dst: Operand,
    ) -> Result<bool> {
        if !self.em.opts.stack_redirection() {
            return Ok(false);
        }
        let (Operand::Reg(src_r), Operand::Imm(mut imm), Operand::Reg(dst_r)) = (src, off, dst)
        else {
            return Ok(false);
        };
        let src_d = conv_to_directive(src_r);
        let dst_d = conv_to_directive(dst_r);
        if dst_d == 29 || dst_d == 30 || (src_d != 29 && src_d != 30) {
            return Ok(false);
        }
        if src_d == 30 {
            imm += 1_000_000;
        }
        let slot = self.em.access_spill_memory(imm as u64);
        let cast = llvm_err(self.em.builder.build_ptr_to_int(slot, self.em.i32_t, ""))?;
        let value = if self.em.opts.no_shadow {
            cast
        } else {
            let shadow = self.em.shadow_base();
            llvm_err(self.em.builder.build_int_sub(cast, shadow, ""))?
        };
        let cell = self.em.reg_ptr(dst_d);
        llvm_err(self.em.builder.build_store(cell, value))?;
        self.em.mark_written(dst_d);
        Ok(true)
    }

    /// Branch target block. Backward targets must hit an existing block.
    fn branch_target(&mut self, op: Operand, relative: bool) -> Result<BasicBlock<'ctx>> {
        let imm = op.imm()?;
        let mut tgt = if relative {
            (self.em.cur_addr as i64).wrapping_add(imm) as u64 & 0xffff_ffff
        } else {
            imm as u64
        };
        if let Some(rr) = self.relocs.resolve(self.em.cur_addr, true) {
            tgt = tgt.wrapping_add(rr.value);
        }
        if tgt <= self.em.cur_addr {
            self.em.handle_back_edge(tgt)
        } else {
            self.em.create_bb(tgt)
        }
    }

    /// Call target, three ways: direct local, relocated local, or a named
    /// external lowered through the libc table.
    fn handle_call_target(&mut self, target: Operand, _count: Operand) -> Result<()> {
        let imm = target.imm()?;
        if imm != 0 {
            let tgt = if let Some(rr) = self.relocs.resolve(self.em.cur_addr, true) {
                (imm as u64).wrapping_add(rr.value)
            } else {
                imm as u64
            };
            return self.em.handle_local_call(tgt);
        }
        let Some(name) = self.relocs.symbol_at(self.em.cur_addr).map(str::to_owned) else {
            return Err(Error::InvalidOperand(
                "call with zero target and no relocation".into(),
            ));
        };
        if syscalls::dispatch(&mut self.em, &name)? {
            return Ok(());
        }
        if let Some(rr) = self.relocs.resolve(self.em.cur_addr, true) {
            return self.em.handle_local_call(rr.value);
        }
        Err(Error::UnknownExternal(name))
    }

    // ── Dispatch ──

    pub fn translate(&mut self, inst: &DecodedInst) -> Result<()> {
        trace!(addr = self.em.cur_addr, opcode = ?inst.opcode, "translating");
        if !matches!(inst.opcode, Opcode::Ldihi) && self.ldi.is_some() {
            return Err(Error::LdiFusion {
                addr: self.em.cur_addr,
            });
        }
        match inst.opcode {
            Opcode::Add => {
                if self.get_spilled_address(inst.op(1)?, inst.op(2)?, inst.op(0)?)? {
                    return Ok(());
                }
                let o1 = self.alu_src(inst.op(1)?)?;
                let o2 = self.alu_src(inst.op(2)?)?;
                let dst = self.alu_dst(inst.op(0)?)?;
                let v = llvm_err(self.em.builder.build_int_add(o1, o2, ""))?;
                self.store_gp(dst, v)
            }
            Opcode::Sub => self.binop(inst, |em, a, b| {
                llvm_err(em.builder.build_int_sub(a, b, ""))
            }),
            Opcode::And => self.binop(inst, |em, a, b| llvm_err(em.builder.build_and(a, b, ""))),
            Opcode::Or => self.binop(inst, |em, a, b| llvm_err(em.builder.build_or(a, b, ""))),
            Opcode::Xor => self.binop(inst, |em, a, b| llvm_err(em.builder.build_xor(a, b, ""))),
            Opcode::Nor => {
                let o1 = self.alu_src(inst.op(1)?)?;
                let o2 = self.alu_src(inst.op(2)?)?;
                let dst = self.alu_dst(inst.op(0)?)?;
                let v = llvm_err(self.em.builder.build_or(o1, o2, ""))?;
                let v = llvm_err(self.em.builder.build_not(v, ""))?;
                self.store_gp(dst, v)
            }
            Opcode::Sll => {
                // `sll $zero, $zero, 0` is the canonical nop encoding.
                if is_zero_reg(inst.op(0)?)
                    && is_zero_reg(inst.op(1)?)
                    && inst.op(2)? == Operand::Imm(0)
                {
                    return Ok(());
                }
                self.binop(inst, |em, a, b| {
                    llvm_err(em.builder.build_left_shift(a, b, ""))
                })
            }
            Opcode::Srl => self.binop(inst, |em, a, b| {
                llvm_err(em.builder.build_right_shift(a, b, false, ""))
            }),
            Opcode::Sra => self.binop(inst, |em, a, b| {
                llvm_err(em.builder.build_right_shift(a, b, true, ""))
            }),
            Opcode::Slt | Opcode::Sltu => self.compare_and_set(inst),
            Opcode::Mul | Opcode::Mulu => self.wide_multiply(inst),
            Opcode::Div | Opcode::Divu => self.divide(inst),
            Opcode::Clz => {
                let o1 = self.alu_src(inst.op(1)?)?;
                let dst = self.alu_dst(inst.op(0)?)?;
                let v = self.call_int_intrinsic_with_flag("llvm.ctlz", o1, false)?;
                self.store_gp(dst, v)
            }
            Opcode::Lw => {
                let dst = self.alu_dst(inst.op(0)?)?;
                let ptr = self.mem_operand(inst.op(1)?, inst.op(2)?, 32, 0)?;
                let v = llvm_err(self.em.builder.build_load(self.em.i32_t, ptr, ""))?;
                self.store_gp(dst, v.into_int_value())
            }
            Opcode::Lh | Opcode::Lhu => {
                let dst = self.alu_dst(inst.op(0)?)?;
                let ptr = self.mem_operand(inst.op(1)?, inst.op(2)?, 16, 0)?;
                let v = llvm_err(self.em.builder.build_load(self.em.i16_t, ptr, ""))?;
                let ext = if inst.opcode == Opcode::Lh {
                    llvm_err(self.em.builder.build_int_s_extend(
                        v.into_int_value(),
                        self.em.i32_t,
                        "",
                    ))?
                } else {
                    llvm_err(self.em.builder.build_int_z_extend(
                        v.into_int_value(),
                        self.em.i32_t,
                        "",
                    ))?
                };
                self.store_gp(dst, ext)
            }
            Opcode::Lb | Opcode::Lbu => {
                let dst = self.alu_dst(inst.op(0)?)?;
                let ptr = self.mem_operand(inst.op(1)?, inst.op(2)?, 8, 0)?;
                let v = llvm_err(self.em.builder.build_load(self.em.i8_t, ptr, ""))?;
                let ext = if inst.opcode == Opcode::Lb {
                    llvm_err(self.em.builder.build_int_s_extend(
                        v.into_int_value(),
                        self.em.i32_t,
                        "",
                    ))?
                } else {
                    llvm_err(self.em.builder.build_int_z_extend(
                        v.into_int_value(),
                        self.em.i32_t,
                        "",
                    ))?
                };
                self.store_gp(dst, ext)
            }
            // The unaligned pairs were re-encoded as 16-bit halves by the
            // guest toolchain: the "left" variants access a byte earlier and
            // write the destination's upper half.
            Opcode::Lwl => {
                let dst = self.alu_dst(inst.op(0)?)?;
                let ptr = self.mem_operand(inst.op(1)?, inst.op(2)?, 16, -1)?;
                let v = llvm_err(self.em.builder.build_load(self.em.i16_t, ptr, ""))?;
                if let Some((d, cell)) = dst {
                    let two = self.em.i32_t.const_int(2, false);
                    let upper = unsafe {
                        llvm_err(self.em.builder.build_gep(self.em.i8_t, cell, &[two], ""))?
                    };
                    llvm_err(self.em.builder.build_store(upper, v.into_int_value()))?;
                    self.em.mark_written(d);
                }
                Ok(())
            }
            Opcode::Lwr => {
                let dst = self.alu_dst(inst.op(0)?)?;
                let ptr = self.mem_operand(inst.op(1)?, inst.op(2)?, 16, 0)?;
                let v = llvm_err(self.em.builder.build_load(self.em.i16_t, ptr, ""))?;
                if let Some((d, cell)) = dst {
                    llvm_err(self.em.builder.build_store(cell, v.into_int_value()))?;
                    self.em.mark_written(d);
                }
                Ok(())
            }
            Opcode::Sw => {
                let src = self.alu_src(inst.op(0)?)?;
                let ptr = self.mem_operand(inst.op(1)?, inst.op(2)?, 32, 0)?;
                llvm_err(self.em.builder.build_store(ptr, src))?;
                Ok(())
            }
            Opcode::Sh => {
                let src = self.alu_src(inst.op(0)?)?;
                let ptr = self.mem_operand(inst.op(1)?, inst.op(2)?, 16, 0)?;
                let tr = llvm_err(self.em.builder.build_int_truncate(src, self.em.i16_t, ""))?;
                llvm_err(self.em.builder.build_store(ptr, tr))?;
                Ok(())
            }
            Opcode::Sb => {
                let src = self.alu_src(inst.op(0)?)?;
                let ptr = self.mem_operand(inst.op(1)?, inst.op(2)?, 8, 0)?;
                let tr = llvm_err(self.em.builder.build_int_truncate(src, self.em.i8_t, ""))?;
                llvm_err(self.em.builder.build_store(ptr, tr))?;
                Ok(())
            }
            Opcode::Swl => {
                let src = self.alu_src(inst.op(0)?)?;
                let ptr = self.mem_operand(inst.op(1)?, inst.op(2)?, 16, -1)?;
                let hi = llvm_err(self.em.builder.build_right_shift(
                    src,
                    self.em.i32_t.const_int(16, false),
                    false,
                    "",
                ))?;
                let tr = llvm_err(self.em.builder.build_int_truncate(hi, self.em.i16_t, ""))?;
                llvm_err(self.em.builder.build_store(ptr, tr))?;
                Ok(())
            }
            Opcode::Swr => {
                let src = self.alu_src(inst.op(0)?)?;
                let ptr = self.mem_operand(inst.op(1)?, inst.op(2)?, 16, 0)?;
                let tr = llvm_err(self.em.builder.build_int_truncate(src, self.em.i16_t, ""))?;
                llvm_err(self.em.builder.build_store(ptr, tr))?;
                Ok(())
            }
            Opcode::Ldi => {
                let low = self.alu_src(inst.op(1)?)?;
                let dst = self.alu_dst(inst.op(0)?)?;
                self.ldi = Some(LdiPending {
                    dst,
                    low,
                    addr: self.em.cur_addr,
                });
                Ok(())
            }
            Opcode::Ldihi => self.ldihi(inst),
            Opcode::Lwc1 | Opcode::Lwxc1 => {
                let dst = self.float_dst(inst.op(0)?)?;
                let ptr = self.fp_mem_operand(inst.op(1)?, inst.op(2)?)?;
                let v = llvm_err(self.em.builder.build_load(self.em.f32_t, ptr, ""))?;
                self.store_float(dst, v.into_float_value())
            }
            Opcode::Ldc1 | Opcode::Ldxc1 => {
                let dst = self.double_dst(inst.op(0)?)?;
                let ptr = self.fp_mem_operand(inst.op(1)?, inst.op(2)?)?;
                let v = llvm_err(self.em.builder.build_load(self.em.f64_t, ptr, ""))?;
                self.store_double(dst, v.into_float_value())
            }
            Opcode::Swc1 | Opcode::Swxc1 => {
                let src = self.float_src(inst.op(0)?)?;
                let ptr = self.fp_mem_operand(inst.op(1)?, inst.op(2)?)?;
                llvm_err(self.em.builder.build_store(ptr, src))?;
                Ok(())
            }
            Opcode::Sdc1 | Opcode::Sdxc1 => {
                let src = self.double_src(inst.op(0)?)?;
                let ptr = self.fp_mem_operand(inst.op(1)?, inst.op(2)?)?;
                llvm_err(self.em.builder.build_store(ptr, src))?;
                Ok(())
            }
            Opcode::FaddD | Opcode::FsubD | Opcode::FmulD | Opcode::FdivD => {
                let o1 = self.double_src(inst.op(1)?)?;
                let o2 = self.double_src(inst.op(2)?)?;
                let dst = self.double_dst(inst.op(0)?)?;
                let v = match inst.opcode {
                    Opcode::FaddD => llvm_err(self.em.builder.build_float_add(o1, o2, ""))?,
                    Opcode::FsubD => llvm_err(self.em.builder.build_float_sub(o1, o2, ""))?,
                    Opcode::FmulD => llvm_err(self.em.builder.build_float_mul(o1, o2, ""))?,
                    _ => llvm_err(self.em.builder.build_float_div(o1, o2, ""))?,
                };
                self.store_double(dst, v)
            }
            Opcode::FaddS | Opcode::FsubS | Opcode::FmulS | Opcode::FdivS => {
                let o1 = self.float_src(inst.op(1)?)?;
                let o2 = self.float_src(inst.op(2)?)?;
                let dst = self.float_dst(inst.op(0)?)?;
                let v = match inst.opcode {
                    Opcode::FaddS => llvm_err(self.em.builder.build_float_add(o1, o2, ""))?,
                    Opcode::FsubS => llvm_err(self.em.builder.build_float_sub(o1, o2, ""))?,
                    Opcode::FmulS => llvm_err(self.em.builder.build_float_mul(o1, o2, ""))?,
                    _ => llvm_err(self.em.builder.build_float_div(o1, o2, ""))?,
                };
                self.store_float(dst, v)
            }
            Opcode::MaddD | Opcode::MsubD => {
                let o1 = self.double_src(inst.op(1)?)?;
                let o2 = self.double_src(inst.op(2)?)?;
                let o3 = self.double_src(inst.op(3)?)?;
                let dst = self.double_dst(inst.op(0)?)?;
                let prod = llvm_err(self.em.builder.build_float_mul(o3, o2, ""))?;
                let v = if inst.opcode == Opcode::MaddD {
                    llvm_err(self.em.builder.build_float_add(prod, o1, ""))?
                } else {
                    llvm_err(self.em.builder.build_float_sub(prod, o1, ""))?
                };
                self.store_double(dst, v)
            }
            Opcode::MaddS | Opcode::MsubS => {
                let o1 = self.float_src(inst.op(1)?)?;
                let o2 = self.float_src(inst.op(2)?)?;
                let o3 = self.float_src(inst.op(3)?)?;
                let dst = self.float_dst(inst.op(0)?)?;
                let prod = llvm_err(self.em.builder.build_float_mul(o3, o2, ""))?;
                let v = if inst.opcode == Opcode::MaddS {
                    llvm_err(self.em.builder.build_float_add(prod, o1, ""))?
                } else {
                    llvm_err(self.em.builder.build_float_sub(prod, o1, ""))?
                };
                self.store_float(dst, v)
            }
            Opcode::FsqrtD => self.double_unary_intrinsic(inst, "llvm.sqrt"),
            Opcode::FabsD => self.double_unary_intrinsic(inst, "llvm.fabs"),
            Opcode::FsqrtS => self.float_unary_intrinsic(inst, "llvm.sqrt"),
            Opcode::FabsS => self.float_unary_intrinsic(inst, "llvm.fabs"),
            Opcode::FnegD => {
                let o1 = self.double_src(inst.op(1)?)?;
                let dst = self.double_dst(inst.op(0)?)?;
                let v = llvm_err(self.em.builder.build_float_neg(o1, ""))?;
                self.store_double(dst, v)
            }
            Opcode::FnegS => {
                let o1 = self.float_src(inst.op(1)?)?;
                let dst = self.float_dst(inst.op(0)?)?;
                let v = llvm_err(self.em.builder.build_float_neg(o1, ""))?;
                self.store_float(dst, v)
            }
            Opcode::FmovD => {
                let o1 = self.double_src(inst.op(1)?)?;
                let dst = self.double_dst(inst.op(0)?)?;
                self.store_double(dst, o1)
            }
            Opcode::FmovS => {
                let o1 = self.float_src(inst.op(1)?)?;
                let dst = self.float_dst(inst.op(0)?)?;
                self.store_float(dst, o1)
            }
            Opcode::CCondD => {
                let o1 = self.double_src(inst.op(0)?)?;
                let o2 = self.double_src(inst.op(1)?)?;
                self.fp_compare(inst.op(2)?, o1, o2)
            }
            // Deliberately mirrors the double-precision handler.
            Opcode::CCondS => {
                let o1 = self.float_src(inst.op(0)?)?;
                let o2 = self.float_src(inst.op(1)?)?;
                self.fp_compare(inst.op(2)?, o1, o2)
            }
            Opcode::Bc1t | Opcode::Bc1f => {
                let target = self.branch_target(inst.op(0)?, true)?;
                let cell = self.em.reg_ptr(FCC);
                self.em.mark_read(FCC);
                let fcc = llvm_err(self.em.builder.build_load(self.em.i32_t, cell, ""))?;
                let cmp = if inst.opcode == Opcode::Bc1t {
                    llvm_err(self.em.builder.build_int_truncate(
                        fcc.into_int_value(),
                        self.em.i1_t,
                        "",
                    ))?
                } else {
                    llvm_err(self.em.builder.build_int_compare(
                        IntPredicate::EQ,
                        fcc.into_int_value(),
                        self.em.i32_t.const_zero(),
                        "",
                    ))?
                };
                let ft = self.em.create_bb(self.em.cur_addr + INSN_SIZE)?;
                llvm_err(self.em.builder.build_conditional_branch(cmp, target, ft))?;
                Ok(())
            }
            Opcode::Beq | Opcode::Bne => {
                let o1 = self.alu_src(inst.op(0)?)?;
                let o2 = self.alu_src(inst.op(1)?)?;
                let target = self.branch_target(inst.op(2)?, true)?;
                let pred = if inst.opcode == Opcode::Beq {
                    IntPredicate::EQ
                } else {
                    IntPredicate::NE
                };
                let cmp = llvm_err(self.em.builder.build_int_compare(pred, o1, o2, ""))?;
                let ft = self.em.create_bb(self.em.cur_addr + INSN_SIZE)?;
                llvm_err(self.em.builder.build_conditional_branch(cmp, target, ft))?;
                Ok(())
            }
            Opcode::Bltz | Opcode::Blez | Opcode::Bgez | Opcode::Bgtz => {
                let o1 = self.alu_src(inst.op(0)?)?;
                let target = self.branch_target(inst.op(1)?, true)?;
                let pred = match inst.opcode {
                    Opcode::Bltz => IntPredicate::SLT,
                    Opcode::Blez => IntPredicate::SLE,
                    Opcode::Bgez => IntPredicate::SGE,
                    _ => IntPredicate::SGT,
                };
                let zero = self.em.i32_t.const_zero();
                let cmp = llvm_err(self.em.builder.build_int_compare(pred, o1, zero, ""))?;
                let ft = self.em.create_bb(self.em.cur_addr + INSN_SIZE)?;
                llvm_err(self.em.builder.build_conditional_branch(cmp, target, ft))?;
                Ok(())
            }
            Opcode::J => {
                let target = self.branch_target(inst.op(0)?, false)?;
                llvm_err(self.em.builder.build_unconditional_branch(target))?;
                self.em.create_bb(self.em.cur_addr + INSN_SIZE)?;
                Ok(())
            }
            Opcode::Jal => self.handle_call_target(inst.op(0)?, inst.op(1)?),
            Opcode::Jalr => {
                let src = self.alu_src(inst.op(0)?)?;
                self.em.add_indirect_call(src)
            }
            Opcode::Jr => {
                let r = inst.op(0)?.reg()?;
                if conv_to_directive(r) == RA {
                    self.em.handle_return()
                } else {
                    let src = self.alu_src(inst.op(0)?)?;
                    self.em.add_indirect_jump(src, None)
                }
            }
            Opcode::Ijmp => {
                let index = self.alu_src(inst.op(1)?)?;
                let count = inst.op(2)?.imm()? as u32;
                let Some(rr) = self.relocs.resolve(self.em.cur_addr, false) else {
                    return Err(Error::JumpTableReloc {
                        addr: self.em.cur_addr,
                    });
                };
                if rr.rtype != R_MICROMIPS_LO16 {
                    return Err(Error::JumpTableReloc {
                        addr: self.em.cur_addr,
                    });
                }
                self.em.add_indirect_jump(index, Some((rr.value, count)))
            }
            Opcode::Ijmphi => Ok(()),
            Opcode::Movz | Opcode::Movn => {
                let o1 = self.alu_src(inst.op(1)?)?;
                let o2 = self.alu_src(inst.op(2)?)?;
                let dst = self.alu_dst(inst.op(0)?)?;
                let Some((d, cell)) = dst else { return Ok(()) };
                let pred = if inst.opcode == Opcode::Movn {
                    IntPredicate::NE
                } else {
                    IntPredicate::EQ
                };
                let zero = self.em.i32_t.const_zero();
                let cmp = llvm_err(self.em.builder.build_int_compare(pred, o2, zero, ""))?;
                let old = llvm_err(self.em.builder.build_load(self.em.i32_t, cell, ""))?;
                let sel = llvm_err(self.em.builder.build_select(
                    cmp,
                    o1,
                    old.into_int_value(),
                    "movz_n",
                ))?;
                llvm_err(self.em.builder.build_store(cell, sel.into_int_value()))?;
                self.em.mark_written(d);
                Ok(())
            }
            Opcode::MovzD | Opcode::MovnD => {
                let o1 = self.double_src(inst.op(1)?)?;
                let o2 = self.alu_src(inst.op(2)?)?;
                let (d, cell) = self.double_dst(inst.op(0)?)?;
                let pred = if inst.opcode == Opcode::MovnD {
                    IntPredicate::NE
                } else {
                    IntPredicate::EQ
                };
                let zero = self.em.i32_t.const_zero();
                let cmp = llvm_err(self.em.builder.build_int_compare(pred, o2, zero, ""))?;
                let old = llvm_err(self.em.builder.build_load(self.em.f64_t, cell, ""))?;
                let sel = llvm_err(self.em.builder.build_select(
                    cmp,
                    o1,
                    old.into_float_value(),
                    "movz_n",
                ))?;
                llvm_err(self.em.builder.build_store(cell, sel.into_float_value()))?;
                self.em.mark_dbl_written(d);
                Ok(())
            }
            Opcode::MovzS | Opcode::MovnS => {
                let o1 = self.float_src(inst.op(1)?)?;
                let o2 = self.alu_src(inst.op(2)?)?;
                let (d, cell) = self.float_dst(inst.op(0)?)?;
                let pred = if inst.opcode == Opcode::MovnS {
                    IntPredicate::NE
                } else {
                    IntPredicate::EQ
                };
                let zero = self.em.i32_t.const_zero();
                let cmp = llvm_err(self.em.builder.build_int_compare(pred, o2, zero, ""))?;
                let old = llvm_err(self.em.builder.build_load(self.em.f32_t, cell, ""))?;
                let sel = llvm_err(self.em.builder.build_select(
                    cmp,
                    o1,
                    old.into_float_value(),
                    "movz_n",
                ))?;
                llvm_err(self.em.builder.build_store(cell, sel.into_float_value()))?;
                self.em.mark_written(d);
                Ok(())
            }
            Opcode::Movt | Opcode::Movf => {
                let o1 = self.alu_src(inst.op(1)?)?;
                let dst = self.alu_dst(inst.op(0)?)?;
                let Some((d, cell)) = dst else { return Ok(()) };
                let cmp = self.fcc_test(inst.opcode == Opcode::Movt)?;
                let old = llvm_err(self.em.builder.build_load(self.em.i32_t, cell, ""))?;
                let sel = llvm_err(self.em.builder.build_select(
                    cmp,
                    o1,
                    old.into_int_value(),
                    "movt",
                ))?;
                llvm_err(self.em.builder.build_store(cell, sel.into_int_value()))?;
                self.em.mark_written(d);
                Ok(())
            }
            Opcode::MovtD | Opcode::MovfD => {
                let o1 = self.double_src(inst.op(1)?)?;
                let (d, cell) = self.double_dst(inst.op(0)?)?;
                let cmp = self.fcc_test(inst.opcode == Opcode::MovtD)?;
                let old = llvm_err(self.em.builder.build_load(self.em.f64_t, cell, ""))?;
                let sel = llvm_err(self.em.builder.build_select(
                    cmp,
                    o1,
                    old.into_float_value(),
                    "movt",
                ))?;
                llvm_err(self.em.builder.build_store(cell, sel.into_float_value()))?;
                self.em.mark_dbl_written(d);
                Ok(())
            }
            Opcode::MovtS | Opcode::MovfS => {
                let o1 = self.float_src(inst.op(1)?)?;
                let (d, cell) = self.float_dst(inst.op(0)?)?;
                let cmp = self.fcc_test(inst.opcode == Opcode::MovtS)?;
                let old = llvm_err(self.em.builder.build_load(self.em.f32_t, cell, ""))?;
                let sel = llvm_err(self.em.builder.build_select(
                    cmp,
                    o1,
                    old.into_float_value(),
                    "movt",
                ))?;
                llvm_err(self.em.builder.build_store(cell, sel.into_float_value()))?;
                self.em.mark_written(d);
                Ok(())
            }
            Opcode::CvtDW => {
                let o1 = self.float_src(inst.op(1)?)?;
                let dst = self.double_dst(inst.op(0)?)?;
                let bits = llvm_err(self.em.builder.build_bit_cast(o1, self.em.i32_t, ""))?;
                let v = llvm_err(self.em.builder.build_signed_int_to_float(
                    bits.into_int_value(),
                    self.em.f64_t,
                    "",
                ))?;
                self.store_double(dst, v)
            }
            Opcode::CvtSW => {
                let o1 = self.float_src(inst.op(1)?)?;
                let dst = self.float_dst(inst.op(0)?)?;
                let bits = llvm_err(self.em.builder.build_bit_cast(o1, self.em.i32_t, ""))?;
                let v = llvm_err(self.em.builder.build_signed_int_to_float(
                    bits.into_int_value(),
                    self.em.f32_t,
                    "",
                ))?;
                self.store_float(dst, v)
            }
            Opcode::CvtDS => {
                let o1 = self.float_src(inst.op(1)?)?;
                let dst = self.double_dst(inst.op(0)?)?;
                let v = llvm_err(self.em.builder.build_float_ext(o1, self.em.f64_t, ""))?;
                self.store_double(dst, v)
            }
            Opcode::CvtSD => {
                let o1 = self.double_src(inst.op(1)?)?;
                let dst = self.float_dst(inst.op(0)?)?;
                let v = llvm_err(self.em.builder.build_float_trunc(o1, self.em.f32_t, ""))?;
                self.store_float(dst, v)
            }
            Opcode::TruncWD => {
                let o1 = self.double_src(inst.op(1)?)?;
                let dst = self.float_dst(inst.op(0)?)?;
                let v = llvm_err(self.em.builder.build_float_to_signed_int(
                    o1,
                    self.em.i32_t,
                    "",
                ))?;
                let bits = llvm_err(self.em.builder.build_bit_cast(v, self.em.f32_t, ""))?;
                self.store_float(dst, bits.into_float_value())
            }
            Opcode::TruncWS => {
                let o1 = self.float_src(inst.op(1)?)?;
                let dst = self.float_dst(inst.op(0)?)?;
                let v = llvm_err(self.em.builder.build_float_to_signed_int(
                    o1,
                    self.em.i32_t,
                    "",
                ))?;
                let bits = llvm_err(self.em.builder.build_bit_cast(v, self.em.f32_t, ""))?;
                self.store_float(dst, bits.into_float_value())
            }
            Opcode::Mfc1 => {
                let o1 = self.float_src(inst.op(1)?)?;
                let dst = self.alu_dst(inst.op(0)?)?;
                if let Some((d, cell)) = dst {
                    llvm_err(self.em.builder.build_store(cell, o1))?;
                    self.em.mark_written(d);
                }
                Ok(())
            }
            Opcode::Mfhc1 | Opcode::Mflc1 => {
                let o1 = self.double_src(inst.op(1)?)?;
                let dst = self.alu_dst(inst.op(0)?)?;
                let (lo, hi) = self.save_double(o1)?;
                let v = if inst.opcode == Opcode::Mfhc1 { hi } else { lo };
                self.store_gp(dst, v)
            }
            Opcode::Mtc1 => {
                let o1 = self.alu_src(inst.op(1)?)?;
                let (d, cell) = self.float_dst(inst.op(0)?)?;
                llvm_err(self.em.builder.build_store(cell, o1))?;
                self.em.mark_written(d);
                Ok(())
            }
            Opcode::Mthc1 | Opcode::Mtlc1 => {
                let o1 = self.alu_src(inst.op(2)?)?;
                let (d, cell) = self.double_dst(inst.op(1)?)?;
                let prev = llvm_err(self.em.builder.build_load(self.em.f64_t, cell, ""))?;
                let (mut lo, mut hi) = self.save_double(prev.into_float_value())?;
                if inst.opcode == Opcode::Mthc1 {
                    hi = o1;
                } else {
                    lo = o1;
                }
                let hi64 = llvm_err(self.em.builder.build_int_z_extend(hi, self.em.i64_t, ""))?;
                let lo64 = llvm_err(self.em.builder.build_int_z_extend(lo, self.em.i64_t, ""))?;
                let shifted = llvm_err(self.em.builder.build_left_shift(
                    hi64,
                    self.em.i64_t.const_int(32, false),
                    "",
                ))?;
                let joined = llvm_err(self.em.builder.build_or(shifted, lo64, ""))?;
                let v = llvm_err(self.em.builder.build_bit_cast(joined, self.em.f64_t, ""))?;
                llvm_err(self.em.builder.build_store(cell, v.into_float_value()))?;
                self.em.mark_dbl_written(d);
                Ok(())
            }
            Opcode::Break => {
                llvm_err(self.em.builder.build_unreachable())?;
                Ok(())
            }
            Opcode::Teq => {
                // The guest uses TEQ for divide-by-zero traps, which are not
                // modeled.
                warn!(addr = self.em.cur_addr, "TEQ: trap is not implemented");
                Ok(())
            }
            Opcode::Nop => Ok(()),
        }
    }

    // ── Grouped handlers ──

    fn binop<F>(&mut self, inst: &DecodedInst, f: F) -> Result<()>
    where
        F: FnOnce(&IrEmitter<'ctx>, IntValue<'ctx>, IntValue<'ctx>) -> Result<IntValue<'ctx>>,
    {
        let o1 = self.alu_src(inst.op(1)?)?;
        let o2 = self.alu_src(inst.op(2)?)?;
        let dst = self.alu_dst(inst.op(0)?)?;
        let v = f(&self.em, o1, o2)?;
        self.store_gp(dst, v)
    }

    /// SLT family: materialize 0/1 through a split-and-join pattern, leaving
    /// the builder in the fall-through block.
    fn compare_and_set(&mut self, inst: &DecodedInst) -> Result<()> {
        let o1 = self.alu_src(inst.op(1)?)?;
        let o2 = self.alu_src(inst.op(2)?)?;
        let dst = self.alu_dst(inst.op(0)?)?;
        let f = self.em.cur_fn();
        let bb1 = self.em.ctx.append_basic_block(f, "");
        let bb2 = self.em.ctx.append_basic_block(f, "");
        let next = self.em.cur_addr + INSN_SIZE;
        let ft = self.em.create_bb(next)?;
        let pred = if inst.opcode == Opcode::Sltu {
            IntPredicate::ULT
        } else {
            IntPredicate::SLT
        };
        let cmp = llvm_err(self.em.builder.build_int_compare(pred, o1, o2, ""))?;
        llvm_err(self.em.builder.build_conditional_branch(cmp, bb1, bb2))?;
        let one = self.em.i32_t.const_int(1, false);
        let zero = self.em.i32_t.const_zero();
        self.em.builder.position_at_end(bb1);
        self.store_gp(dst, one)?;
        llvm_err(self.em.builder.build_unconditional_branch(ft))?;
        self.em.builder.position_at_end(bb2);
        self.store_gp(dst, zero)?;
        llvm_err(self.em.builder.build_unconditional_branch(ft))?;
        self.em.builder.position_at_end(ft);
        self.em.cur_block_addr = next;
        Ok(())
    }

    /// 32x32 -> 64 multiply, high and low halves to two destinations.
    fn wide_multiply(&mut self, inst: &DecodedInst) -> Result<()> {
        let o0 = self.alu_src(inst.op(2)?)?;
        let o1 = self.alu_src(inst.op(3)?)?;
        let dst_hi = self.alu_dst(inst.op(0)?)?;
        let dst_lo = self.alu_dst(inst.op(1)?)?;
        let (e0, e1) = if inst.opcode == Opcode::Mul {
            (
                llvm_err(self.em.builder.build_int_s_extend(o0, self.em.i64_t, ""))?,
                llvm_err(self.em.builder.build_int_s_extend(o1, self.em.i64_t, ""))?,
            )
        } else {
            (
                llvm_err(self.em.builder.build_int_z_extend(o0, self.em.i64_t, ""))?,
                llvm_err(self.em.builder.build_int_z_extend(o1, self.em.i64_t, ""))?,
            )
        };
        let prod = llvm_err(self.em.builder.build_int_mul(e0, e1, ""))?;
        let hi64 = llvm_err(self.em.builder.build_right_shift(
            prod,
            self.em.i64_t.const_int(32, false),
            false,
            "",
        ))?;
        let hi = llvm_err(self.em.builder.build_int_truncate(hi64, self.em.i32_t, ""))?;
        let lo = llvm_err(self.em.builder.build_int_truncate(prod, self.em.i32_t, ""))?;
        self.store_gp(dst_lo, lo)?;
        self.store_gp(dst_hi, hi)
    }

    /// Quotient to the second destination, remainder to the first.
    fn divide(&mut self, inst: &DecodedInst) -> Result<()> {
        let o0 = self.alu_src(inst.op(2)?)?;
        let o1 = self.alu_src(inst.op(3)?)?;
        let dst_rem = self.alu_dst(inst.op(0)?)?;
        let dst_quot = self.alu_dst(inst.op(1)?)?;
        if dst_rem.is_some() {
            let rem = if inst.opcode == Opcode::Div {
                llvm_err(self.em.builder.build_int_signed_rem(o0, o1, ""))?
            } else {
                llvm_err(self.em.builder.build_int_unsigned_rem(o0, o1, ""))?
            };
            self.store_gp(dst_rem, rem)?;
        }
        if dst_quot.is_some() {
            let quot = if inst.opcode == Opcode::Div {
                llvm_err(self.em.builder.build_int_signed_div(o0, o1, ""))?
            } else {
                llvm_err(self.em.builder.build_int_unsigned_div(o0, o1, ""))?
            };
            self.store_gp(dst_quot, quot)?;
        }
        Ok(())
    }

    /// LDIHI must immediately follow its LDI; the fused value is
    /// `(hi << 14) | lo`.
    fn ldihi(&mut self, inst: &DecodedInst) -> Result<()> {
        let hi = self.alu_src(inst.op(0)?)?;
        let Some(pending) = self.ldi.take() else {
            return Err(Error::LdiFusion {
                addr: self.em.cur_addr,
            });
        };
        if pending.addr + INSN_SIZE != self.em.cur_addr {
            return Err(Error::LdiFusion {
                addr: self.em.cur_addr,
            });
        }
        let shifted = llvm_err(self.em.builder.build_left_shift(
            hi,
            self.em.i32_t.const_int(14, false),
            "",
        ))?;
        let value = llvm_err(self.em.builder.build_or(pending.low, shifted, ""))?;
        if let Some((d, cell)) = pending.dst {
            let store = llvm_err(self.em.builder.build_store(cell, value))?;
            self.em.mark_written(d);
            // Both halves of the pair pin the fused store.
            self.em.ins_map.insert(pending.addr, store);
            self.em.ins_map.insert(self.em.cur_addr, store);
        }
        Ok(())
    }

    fn fp_compare(
        &mut self,
        cond_op: Operand,
        o1: FloatValue<'ctx>,
        o2: FloatValue<'ctx>,
    ) -> Result<()> {
        let cond = cond_op.imm()?;
        let cmp = match cond {
            0 => self.em.i1_t.const_zero(),
            1 => llvm_err(self.em.builder.build_float_compare(FloatPredicate::UNO, o1, o2, ""))?,
            2 => llvm_err(self.em.builder.build_float_compare(FloatPredicate::OEQ, o1, o2, ""))?,
            3 => llvm_err(self.em.builder.build_float_compare(FloatPredicate::UEQ, o1, o2, ""))?,
            4 => llvm_err(self.em.builder.build_float_compare(FloatPredicate::OLT, o1, o2, ""))?,
            5 => llvm_err(self.em.builder.build_float_compare(FloatPredicate::ULT, o1, o2, ""))?,
            6 => llvm_err(self.em.builder.build_float_compare(FloatPredicate::OLE, o1, o2, ""))?,
            7 => llvm_err(self.em.builder.build_float_compare(FloatPredicate::ULE, o1, o2, ""))?,
            // Signaling and NG* condition codes would require trap modeling.
            c => return Err(Error::UnimplementedFpCondition(c as u8)),
        };
        let one = self.em.i32_t.const_int(1, false);
        let zero = self.em.i32_t.const_zero();
        let sel = llvm_err(self.em.builder.build_select(cmp, one, zero, ""))?;
        let cell = self.em.reg_ptr(FCC);
        llvm_err(self.em.builder.build_store(cell, sel.into_int_value()))?;
        self.em.mark_written(FCC);
        Ok(())
    }

    /// Load FCC and test it against zero (NE for the "true" sense).
    fn fcc_test(&mut self, if_true: bool) -> Result<IntValue<'ctx>> {
        let cell = self.em.reg_ptr(FCC);
        self.em.mark_read(FCC);
        let fcc = llvm_err(self.em.builder.build_load(self.em.i32_t, cell, ""))?;
        let pred = if if_true {
            IntPredicate::NE
        } else {
            IntPredicate::EQ
        };
        let zero = self.em.i32_t.const_zero();
        llvm_err(self.em.builder.build_int_compare(
            pred,
            fcc.into_int_value(),
            zero,
            "",
        ))
    }

    fn double_unary_intrinsic(&mut self, inst: &DecodedInst, name: &str) -> Result<()> {
        let o1 = self.double_src(inst.op(1)?)?;
        let dst = self.double_dst(inst.op(0)?)?;
        let f = inkwell::intrinsics::Intrinsic::find(name)
            .ok_or_else(|| Error::Llvm(format!("intrinsic {name} not found")))?
            .get_declaration(&self.em.module, &[self.em.f64_t.into()])
            .ok_or_else(|| Error::Llvm(format!("{name} declaration failed")))?;
        let call = llvm_err(self.em.builder.build_call(f, &[o1.into()], ""))?;
        let v = call
            .try_as_basic_value()
            .basic()
            .ok_or_else(|| Error::Llvm(format!("{name} returned void")))?
            .into_float_value();
        self.store_double(dst, v)
    }

    fn float_unary_intrinsic(&mut self, inst: &DecodedInst, name: &str) -> Result<()> {
        let o1 = self.float_src(inst.op(1)?)?;
        let dst = self.float_dst(inst.op(0)?)?;
        let f = inkwell::intrinsics::Intrinsic::find(name)
            .ok_or_else(|| Error::Llvm(format!("intrinsic {name} not found")))?
            .get_declaration(&self.em.module, &[self.em.f32_t.into()])
            .ok_or_else(|| Error::Llvm(format!("{name} declaration failed")))?;
        let call = llvm_err(self.em.builder.build_call(f, &[o1.into()], ""))?;
        let v = call
            .try_as_basic_value()
            .basic()
            .ok_or_else(|| Error::Llvm(format!("{name} returned void")))?
            .into_float_value();
        self.store_float(dst, v)
    }

    /// ctlz-style intrinsics take an extra `is_zero_poison` flag.
    fn call_int_intrinsic_with_flag(
        &mut self,
        name: &str,
        val: IntValue<'ctx>,
        flag: bool,
    ) -> Result<IntValue<'ctx>> {
        let f = inkwell::intrinsics::Intrinsic::find(name)
            .ok_or_else(|| Error::Llvm(format!("intrinsic {name} not found")))?
            .get_declaration(&self.em.module, &[self.em.i32_t.into()])
            .ok_or_else(|| Error::Llvm(format!("{name} declaration failed")))?;
        let flag_val = self.em.i1_t.const_int(u64::from(flag), false);
        let call = llvm_err(
            self.em
                .builder
                .build_call(f, &[val.into(), flag_val.into()], ""),
        )?;
        call.try_as_basic_value()
            .basic()
            .ok_or_else(|| Error::Llvm(format!("{name} returned void")))
            .map(|v| v.into_int_value())
    }
}

fn is_zero_reg(op: Operand) -> bool {
    matches!(op, Operand::Reg(r) if conv_to_directive(r) == 0)
}

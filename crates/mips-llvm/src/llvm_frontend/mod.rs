//! Guest object -> LLVM IR via inkwell.
//!
//! The driver decodes every text section up front, collects basic-block
//! leaders (branch targets and the addresses following terminators), then
//! walks the sections symbol by symbol, handing each decoded instruction to
//! the translator. A final pass resolves the pending indirect-control
//! fix-ups and verifies the module.

pub mod emitter;
pub mod syscalls;
pub mod translator;

use std::collections::BTreeSet;

use inkwell::context::Context;
use inkwell::module::Module;

use crate::disasm::{self, DecodedInst, Opcode, INSN_SIZE};
use crate::obj::reloc::RelocationReader;
use crate::obj::ObjectImage;
use crate::options::TranslationOptions;
use crate::{Error, Result};

use emitter::IrEmitter;
use translator::InstTranslator;

/// Translate a relocatable guest object into an LLVM module.
pub fn translate_object<'ctx>(
    ctx: &'ctx Context,
    object: &[u8],
    opts: &TranslationOptions,
) -> Result<Module<'ctx>> {
    let obj = ObjectImage::parse(object, opts.stack_size)?;
    let reader = RelocationReader::new(&obj);

    let mut shadow = obj.shadow.clone();
    let text_targets = reader.resolve_all_data_relocations(&mut shadow);

    // Decode every text section before emitting anything.
    let mut decoded: Vec<Vec<(u64, DecodedInst)>> = Vec::with_capacity(obj.text_sections.len());
    for ts in &obj.text_sections {
        let mut insts = Vec::with_capacity(ts.bytes.len() / 4);
        let mut off = 0usize;
        while off + 4 <= ts.bytes.len() {
            let word = u32::from_le_bytes([
                ts.bytes[off],
                ts.bytes[off + 1],
                ts.bytes[off + 2],
                ts.bytes[off + 3],
            ]);
            let addr = ts.base + off as u64;
            let inst = disasm::decode(addr, word).map_err(|e| {
                tracing::warn!(addr, word, "invalid instruction encoding");
                e
            })?;
            insts.push((addr, inst));
            off += 4;
        }
        decoded.push(insts);
    }

    let leaders = collect_leaders(&decoded, &reader, &obj, &text_targets);

    let em = IrEmitter::new(ctx, opts.clone(), shadow, obj.stack_top);
    let mut tr = InstTranslator::new(em, &reader);

    let all_symbols: Vec<(u64, String)> = obj
        .text_sections
        .iter()
        .flat_map(|ts| ts.symbols.iter().cloned())
        .collect();
    tr.em.declare_functions(&all_symbols)?;

    for (ts, insts) in obj.text_sections.iter().zip(&decoded) {
        let section_end = ts.base + ts.bytes.len() as u64;
        for (si, (start, name)) in ts.symbols.iter().enumerate() {
            let end = match ts.symbols.get(si + 1) {
                // A symbol sharing its successor's address takes no space.
                Some((next, _)) if next == start => continue,
                Some((next, _)) => *next,
                None => section_end,
            };
            if name == "main" {
                tr.em.start_main_function(*start)?;
            } else {
                tr.em.start_function(name, *start)?;
            }
            for (addr, inst) in insts.iter().filter(|(a, _)| *a >= *start && *a < end) {
                tr.em.cur_addr = *addr;
                if *addr != *start && leaders.contains(addr) {
                    tr.em.switch_to_block(*addr)?;
                }
                // Pin the first IR instruction emitted for this address.
                let pre_bb = tr
                    .em
                    .builder
                    .get_insert_block()
                    .ok_or_else(|| Error::Internal("builder has no insert block".into()))?;
                let pre_last = pre_bb.get_last_instruction();
                tr.translate(inst)?;
                let first = match pre_last {
                    Some(last) => last.get_next_instruction(),
                    None => pre_bb.get_first_instruction(),
                };
                if let Some(fi) = first {
                    tr.em.ins_map.entry(*addr).or_insert(fi);
                }
            }
            tr.em.finish_function()?;
        }
    }

    tr.em.finish_module(&text_targets)?;
    let module = tr.into_emitter().take_module();
    module
        .verify()
        .map_err(|e| Error::Llvm(format!("module verification failed: {e}")))?;
    Ok(module)
}

/// Addresses that start a basic block: branch targets plus the addresses
/// following branches, jumps, compare-and-set sequences and traps. Jump
/// tables in the data image contribute their entries.
fn collect_leaders(
    decoded: &[Vec<(u64, DecodedInst)>],
    reader: &RelocationReader,
    obj: &ObjectImage,
    text_targets: &[(u64, u64)],
) -> BTreeSet<u64> {
    let mut leaders = BTreeSet::new();
    for ts in &obj.text_sections {
        for (addr, _) in &ts.symbols {
            leaders.insert(*addr);
        }
    }
    for (_, target) in text_targets {
        leaders.insert(*target);
    }
    for insts in decoded {
        for (addr, inst) in insts {
            let next = addr + INSN_SIZE;
            match inst.opcode {
                Opcode::Beq | Opcode::Bne => {
                    if let Some(t) = static_target(inst, 2, *addr, reader) {
                        leaders.insert(t);
                    }
                    leaders.insert(next);
                }
                Opcode::Bltz
                | Opcode::Bgez
                | Opcode::Blez
                | Opcode::Bgtz
                | Opcode::Bc1t
                | Opcode::Bc1f => {
                    let last = inst.operands.len() - 1;
                    if let Some(t) = static_target(inst, last, *addr, reader) {
                        leaders.insert(t);
                    }
                    leaders.insert(next);
                }
                Opcode::J => {
                    if let Some(imm) = inst.op(0).ok().and_then(|o| o.imm().ok()) {
                        let mut t = imm as u64;
                        if let Some(rr) = reader.resolve(*addr, true) {
                            t = t.wrapping_add(rr.value);
                        }
                        leaders.insert(t);
                    }
                    leaders.insert(next);
                }
                Opcode::Jal
                | Opcode::Jalr
                | Opcode::Jr
                | Opcode::Ijmp
                | Opcode::Break
                | Opcode::Slt
                | Opcode::Sltu => {
                    leaders.insert(next);
                }
                _ => {}
            }
        }
    }
    leaders
}

fn static_target(
    inst: &DecodedInst,
    op_index: usize,
    addr: u64,
    reader: &RelocationReader,
) -> Option<u64> {
    let imm = inst.op(op_index).ok()?.imm().ok()?;
    let mut t = (addr as i64).wrapping_add(imm) as u64 & 0xffff_ffff;
    if let Some(rr) = reader.resolve(addr, true) {
        t = t.wrapping_add(rr.value);
    }
    Some(t)
}

/// The `-optimize` pipeline: verification, then mem2reg and the scalar
/// clean-up passes, run over the whole module.
pub fn run_optimization_passes(module: &Module) -> Result<()> {
    use inkwell::passes::PassBuilderOptions;
    use inkwell::targets::{InitializationConfig, Target, TargetMachine};

    module
        .verify()
        .map_err(|e| Error::Llvm(format!("verification failed: {e}")))?;

    Target::initialize_all(&InitializationConfig::default());
    let triple = TargetMachine::get_default_triple();
    let target =
        Target::from_triple(&triple).map_err(|e| Error::Llvm(format!("target error: {e}")))?;
    let machine = target
        .create_target_machine(
            &triple,
            "generic",
            "",
            inkwell::OptimizationLevel::None,
            inkwell::targets::RelocMode::Default,
            inkwell::targets::CodeModel::Default,
        )
        .ok_or_else(|| Error::Llvm("failed to create target machine".into()))?;

    let opts = PassBuilderOptions::create();
    module
        .run_passes(
            "mem2reg,instcombine,reassociate,gvn,simplifycfg",
            &machine,
            opts,
        )
        .map_err(|e| Error::Llvm(format!("optimization pipeline failed: {e}")))?;
    Ok(())
}

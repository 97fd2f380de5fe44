//! Object-file loading.
//!
//! Parses an ELF32 little-endian relocatable object with goblin, enumerates
//! text sections with their symbols, builds the section-to-relocations index
//! and materializes the shadow image: a byte-accurate mirror of the guest's
//! data sections. For relocatable input the section *file offset* serves as
//! its guest address, so addresses are unique across sections.

pub mod reloc;

use crate::{Error, Result};
use goblin::elf::section_header::{SHF_ALLOC, SHF_EXECINSTR, SHT_NOBITS};
use goblin::elf::sym::STT_SECTION;
use goblin::elf::{header, Elf};
use std::collections::HashMap;
use tracing::debug;

const SHN_UNDEF: usize = 0;
const SHN_COMMON: usize = 0xfff2;

/// Relocation kinds the translator understands.
pub const R_MIPS_32: u32 = 2;
pub const R_MIPS_26: u32 = 4;
pub const R_MIPS_HI16: u32 = 5;
pub const R_MIPS_LO16: u32 = 6;
pub const R_MICROMIPS_26_S1: u32 = 133;
pub const R_MICROMIPS_HI16: u32 = 134;
pub const R_MICROMIPS_LO16: u32 = 135;

pub fn is_hi16(rtype: u32) -> bool {
    rtype == R_MIPS_HI16 || rtype == R_MICROMIPS_HI16
}

pub fn is_lo16(rtype: u32) -> bool {
    rtype == R_MIPS_LO16 || rtype == R_MICROMIPS_LO16
}

pub fn is_hilo16(rtype: u32) -> bool {
    is_hi16(rtype) || is_lo16(rtype)
}

/// A code section with its guest base address and the symbols defined in it.
#[derive(Debug, Clone)]
pub struct TextSection {
    pub name: String,
    pub base: u64,
    pub bytes: Vec<u8>,
    /// `(guest address, name)` pairs sorted by address.
    pub symbols: Vec<(u64, String)>,
}

/// One relocation record, keyed by the guest address it patches.
#[derive(Debug, Clone)]
pub struct RelocEntry {
    pub patch_addr: u64,
    pub rtype: u32,
    pub symbol: String,
    /// Resolved guest address of the target, when the symbol is defined
    /// (section base + symbol value, or the common-block slot).
    pub target: Option<u64>,
    pub undefined: bool,
    /// The target symbol lives in a text section.
    pub is_func_addr: bool,
}

/// Parsed object: text sections, relocation index, shadow image.
#[derive(Debug)]
pub struct ObjectImage {
    pub text_sections: Vec<TextSection>,
    /// Relocations patching text, keyed by decode address.
    pub text_relocs: HashMap<u64, RelocEntry>,
    /// Relocations patching data sections, in file order.
    pub data_relocs: Vec<RelocEntry>,
    pub shadow: Vec<u8>,
    /// Guest address of the top of the reserved stack (SP's initial value).
    pub stack_top: u64,
}

/// Guest address of a section: `sh_addr`, or the file offset for
/// relocatable objects.
fn section_base(sh_addr: u64, sh_offset: u64) -> u64 {
    if sh_addr != 0 { sh_addr } else { sh_offset }
}

fn align_up(v: u64, a: u64) -> u64 {
    (v + a - 1) & !(a - 1)
}

impl ObjectImage {
    pub fn parse(data: &[u8], stack_size: u32) -> Result<Self> {
        let elf = Elf::parse(data)?;

        if elf.is_64 {
            return Err(Error::BadObject("only 32-bit guests are supported".into()));
        }
        if !elf.little_endian {
            return Err(Error::BadObject("guest objects must be little-endian".into()));
        }
        if elf.header.e_machine != header::EM_MIPS {
            return Err(Error::BadObject(format!(
                "not a MIPS object (e_machine={:#x})",
                elf.header.e_machine
            )));
        }
        if elf.header.e_type != header::ET_REL {
            return Err(Error::BadObject(
                "expected a relocatable object (ET_REL)".into(),
            ));
        }

        let section_name = |idx: usize| -> String {
            elf.section_headers
                .get(idx)
                .and_then(|sh| elf.shdr_strtab.get_at(sh.sh_name))
                .unwrap_or("")
                .to_string()
        };

        // Shadow image: every allocatable non-text section mirrored at its
        // guest address; NOBITS sections are zero-filled.
        let mut shadow = Vec::new();
        for sh in &elf.section_headers {
            if sh.sh_flags & u64::from(SHF_ALLOC) == 0
                || sh.sh_flags & u64::from(SHF_EXECINSTR) != 0
                || sh.sh_size == 0
            {
                continue;
            }
            let base = section_base(sh.sh_addr, sh.sh_offset) as usize;
            let size = sh.sh_size as usize;
            if shadow.len() < base + size {
                shadow.resize(base + size, 0);
            }
            if sh.sh_type != SHT_NOBITS {
                let start = sh.sh_offset as usize;
                let end = start + size;
                if end > data.len() {
                    return Err(Error::BadObject(format!(
                        "section {} extends past end of file",
                        section_name_of(&elf, sh.sh_name)
                    )));
                }
                shadow[base..base + size].copy_from_slice(&data[start..end]);
            }
        }

        // Common (COMDAT) symbols get slots past the last section.
        let mut common = HashMap::new();
        {
            let mut cursor = align_up(shadow.len() as u64, 8);
            for sym in elf.syms.iter() {
                if sym.st_shndx != SHN_COMMON {
                    continue;
                }
                let name = elf.strtab.get_at(sym.st_name).unwrap_or("").to_string();
                // st_value carries the requested alignment for commons.
                let align = match sym.st_value {
                    a if a.is_power_of_two() => a.min(8),
                    _ => 8,
                };
                cursor = align_up(cursor, align);
                common.insert(name, cursor);
                cursor += sym.st_size;
            }
            shadow.resize(align_up(cursor, 8) as usize, 0);
        }

        // Reserved guest stack at the top of the image; SP starts at the
        // highest 8-byte-aligned slot.
        let stack_base = shadow.len() as u64;
        shadow.resize((stack_base + u64::from(stack_size.max(16))) as usize, 0);
        let stack_top = (shadow.len() as u64 - 8) & !7;

        // Text sections with their symbols, sorted by address.
        let mut text_sections = Vec::new();
        for (idx, sh) in elf.section_headers.iter().enumerate() {
            if sh.sh_flags & u64::from(SHF_EXECINSTR) == 0 || sh.sh_size == 0 {
                continue;
            }
            let base = section_base(sh.sh_addr, sh.sh_offset);
            let start = sh.sh_offset as usize;
            let end = start + sh.sh_size as usize;
            if end > data.len() {
                return Err(Error::BadObject(format!(
                    "text section {} extends past end of file",
                    section_name(idx)
                )));
            }

            let mut symbols: Vec<(u64, String)> = elf
                .syms
                .iter()
                .filter(|s| s.st_shndx == idx && s.is_function())
                .map(|s| {
                    let name = elf.strtab.get_at(s.st_name).unwrap_or("").to_string();
                    (base + s.st_value, name)
                })
                .collect();
            symbols.sort();
            if symbols.is_empty() {
                symbols.push((base, section_name(idx)));
            }

            debug!(
                section = %section_name(idx),
                base,
                symbols = symbols.len(),
                "loaded text section"
            );
            text_sections.push(TextSection {
                name: section_name(idx),
                base,
                bytes: data[start..end].to_vec(),
                symbols,
            });
        }

        // Relocation index. `.rel.<sec>` names its target via sh_info; each
        // record is resolved against the symbol table up front.
        let mut text_relocs = HashMap::new();
        let mut data_relocs = Vec::new();
        for (reloc_sh_idx, relocs) in &elf.shdr_relocs {
            let Some(reloc_sh) = elf.section_headers.get(*reloc_sh_idx) else {
                continue;
            };
            let Some(target_sh) = elf.section_headers.get(reloc_sh.sh_info as usize) else {
                continue;
            };
            let target_is_text = target_sh.sh_flags & u64::from(SHF_EXECINSTR) != 0;
            let target_base = section_base(target_sh.sh_addr, target_sh.sh_offset);

            for r in relocs.iter() {
                let Some(sym) = elf.syms.get(r.r_sym) else {
                    continue;
                };
                let name = if sym.st_type() == STT_SECTION {
                    section_name(sym.st_shndx)
                } else {
                    elf.strtab.get_at(sym.st_name).unwrap_or("").to_string()
                };
                let undefined = sym.st_shndx == SHN_UNDEF;
                let is_common = sym.st_shndx == SHN_COMMON;

                let (target, is_func_addr) = if is_common {
                    (common.get(&name).copied(), false)
                } else if undefined {
                    (None, false)
                } else if let Some(sym_sh) = elf.section_headers.get(sym.st_shndx) {
                    let sym_base = section_base(sym_sh.sh_addr, sym_sh.sh_offset);
                    let in_text = sym_sh.sh_flags & u64::from(SHF_EXECINSTR) != 0;
                    (Some(sym_base + sym.st_value), in_text)
                } else {
                    (None, false)
                };

                let entry = RelocEntry {
                    patch_addr: target_base + r.r_offset,
                    rtype: r.r_type,
                    symbol: name,
                    target,
                    undefined,
                    is_func_addr,
                };
                if target_is_text {
                    text_relocs.insert(entry.patch_addr, entry);
                } else {
                    data_relocs.push(entry);
                }
            }
        }

        Ok(Self {
            text_sections,
            text_relocs,
            data_relocs,
            shadow,
            stack_top,
        })
    }
}

fn section_name_of(elf: &Elf, sh_name: usize) -> String {
    elf.shdr_strtab.get_at(sh_name).unwrap_or("?").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage() {
        assert!(ObjectImage::parse(&[0u8; 64], 300).is_err());
    }
}

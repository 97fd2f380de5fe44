//! Relocation lookups for the translator.
//!
//! The instruction translator asks, for the address it is currently
//! decoding, whether a relocation patches that spot and what it refers to.
//! Data-section relocations are applied to the shadow image once, up front;
//! relocations whose targets live in text are left for the indirect-jump
//! resolution pass at module finalization.

use super::{is_hilo16, ObjectImage, RelocEntry, R_MIPS_32};
use tracing::trace;

/// What a relocation at the current decode address refers to.
#[derive(Debug, Clone)]
pub struct ResolvedReloc {
    /// Guest address of the target (section base + symbol value).
    pub value: u64,
    pub rtype: u32,
    pub undefined: bool,
    pub is_func_addr: bool,
    pub symbol: String,
}

pub struct RelocationReader<'a> {
    obj: &'a ObjectImage,
}

impl<'a> RelocationReader<'a> {
    pub fn new(obj: &'a ObjectImage) -> Self {
        Self { obj }
    }

    fn entry_at(&self, addr: u64) -> Option<&RelocEntry> {
        self.obj.text_relocs.get(&addr)
    }

    /// The symbol name referenced by the relocation at `addr`, if any.
    /// Drives the libc dispatch for calls with a zero immediate.
    pub fn symbol_at(&self, addr: u64) -> Option<&str> {
        self.entry_at(addr).map(|e| e.symbol.as_str())
    }

    /// Resolve the relocation at `addr` to its target.
    ///
    /// When `local_only` is set, only relocations with a resolved target
    /// address participate (the call-target and branch-target cases);
    /// undefined externals return `None` there.
    pub fn resolve(&self, addr: u64, local_only: bool) -> Option<ResolvedReloc> {
        let e = self.entry_at(addr)?;
        if local_only && e.target.is_none() {
            return None;
        }
        Some(ResolvedReloc {
            value: e.target.unwrap_or(0),
            rtype: e.rtype,
            undefined: e.undefined,
            is_func_addr: e.is_func_addr,
            symbol: e.symbol.clone(),
        })
    }

    /// Whether the relocation at `addr` is one of the paired HI16/LO16 kinds.
    pub fn hilo_at(&self, addr: u64) -> Option<ResolvedReloc> {
        self.resolve(addr, false).filter(|r| is_hilo16(r.rtype))
    }

    /// Patch every data-section relocation whose target also lives in a data
    /// section directly into the shadow image. Returns the relocations whose
    /// targets live in text; those entries are patched later, when indirect
    /// jumps are processed, and their targets are block leaders.
    pub fn resolve_all_data_relocations(&self, shadow: &mut [u8]) -> Vec<(u64, u64)> {
        let mut text_targets = Vec::new();
        for e in &self.obj.data_relocs {
            let Some(target) = e.target else { continue };
            if e.is_func_addr {
                text_targets.push((e.patch_addr, target));
                continue;
            }
            if e.rtype != R_MIPS_32 && !is_hilo16(e.rtype) {
                continue;
            }
            patch_word(shadow, e.patch_addr, target as u32);
            trace!(patch = e.patch_addr, target, "patched data relocation");
        }
        text_targets
    }
}

/// Overwrite the 32-bit cell at `addr` with `value`.
pub fn patch_word(shadow: &mut [u8], addr: u64, value: u32) {
    let addr = addr as usize;
    if addr + 4 <= shadow.len() {
        shadow[addr..addr + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Read the 32-bit cell at `addr`.
pub fn read_word(shadow: &[u8], addr: u64) -> u32 {
    let addr = addr as usize;
    let mut buf = [0u8; 4];
    if addr + 4 <= shadow.len() {
        buf.copy_from_slice(&shadow[addr..addr + 4]);
    }
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obj::{ObjectImage, R_MIPS_26, R_MIPS_32, R_MIPS_LO16};
    use crate::test_harness::{asm, ObjectBuilder};

    #[test]
    fn resolves_relocation_at_decode_address() {
        let mut b = ObjectBuilder::new();
        let site = b.here();
        b.func("main", &[asm::lw(2, 0, 0), asm::jr(31)]);
        let off = b.data(&[0u8; 8]);
        b.data_symbol("table", off, 8);
        b.reloc(site, R_MIPS_LO16, "table");
        let obj = ObjectImage::parse(&b.build(), 300).unwrap();
        let reader = RelocationReader::new(&obj);

        let rr = reader.resolve(site, false).expect("relocation");
        assert_eq!(rr.rtype, R_MIPS_LO16);
        assert_eq!(rr.value, b.data_addr(off));
        assert!(!rr.undefined);
        assert!(!rr.is_func_addr);
        assert!(reader.resolve(site + 4, false).is_none());
    }

    #[test]
    fn undefined_symbols_are_flagged() {
        let mut b = ObjectBuilder::new();
        let site = b.here();
        b.func("main", &[asm::jal(0), asm::jr(31)]);
        b.reloc(site, R_MIPS_26, "printf");
        let obj = ObjectImage::parse(&b.build(), 300).unwrap();
        let reader = RelocationReader::new(&obj);

        assert_eq!(reader.symbol_at(site), Some("printf"));
        let rr = reader.resolve(site, false).expect("relocation");
        assert!(rr.undefined);
        // local_only filters unresolved externals out
        assert!(reader.resolve(site, true).is_none());
    }

    #[test]
    fn function_symbols_resolve_as_text_targets() {
        let mut b = ObjectBuilder::new();
        let helper = b.func("helper", &[asm::jr(31)]);
        let site = b.here();
        b.func("main", &[asm::jal(0), asm::jr(31)]);
        b.reloc(site, R_MIPS_26, "helper");
        let obj = ObjectImage::parse(&b.build(), 300).unwrap();
        let reader = RelocationReader::new(&obj);

        let rr = reader.resolve(site, true).expect("relocation");
        assert!(rr.is_func_addr);
        assert_eq!(rr.value, helper);
    }

    #[test]
    fn data_relocations_patch_the_shadow() {
        let mut b = ObjectBuilder::new();
        b.func("main", &[asm::jr(31)]);
        let cell = b.data(&[0u8; 4]);
        let payload = b.data(&[1, 2, 3, 4]);
        b.data_symbol("payload", payload, 4);
        b.data_reloc(cell, R_MIPS_32, "payload");
        let obj = ObjectImage::parse(&b.build(), 300).unwrap();
        let reader = RelocationReader::new(&obj);

        let mut shadow = obj.shadow.clone();
        let text_targets = reader.resolve_all_data_relocations(&mut shadow);
        assert!(text_targets.is_empty());
        assert_eq!(
            read_word(&shadow, b.data_addr(cell)),
            b.data_addr(payload) as u32
        );
    }

    #[test]
    fn text_targets_are_deferred() {
        let mut b = ObjectBuilder::new();
        let target = b.func("handler", &[asm::jr(31)]);
        b.func("main", &[asm::jr(31)]);
        let cell = b.data(&[0u8; 4]);
        b.data_reloc(cell, R_MIPS_32, "handler");
        let obj = ObjectImage::parse(&b.build(), 300).unwrap();
        let reader = RelocationReader::new(&obj);

        let mut shadow = obj.shadow.clone();
        let text_targets = reader.resolve_all_data_relocations(&mut shadow);
        assert_eq!(text_targets, vec![(b.data_addr(cell), target)]);
        // Untouched until indirect jumps are processed.
        assert_eq!(read_word(&shadow, b.data_addr(cell)), 0);
    }
}

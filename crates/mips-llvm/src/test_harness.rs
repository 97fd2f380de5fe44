//! Test harness: build guest objects in memory.
//!
//! Integration tests assemble small guest programs with [`asm`], wrap them
//! in a minimal ELF32 little-endian relocatable object with
//! [`ObjectBuilder`], and run the whole translation pipeline on the result.
//! No fixture files are involved.

use std::collections::HashMap;

/// File offset (and therefore guest address) of the text section.
pub const TEXT_BASE: u64 = 52;

/// Run the whole pipeline on a built object and return the textual IR.
pub fn translate_ir(
    builder: &ObjectBuilder,
    opts: &crate::TranslationOptions,
) -> crate::Result<String> {
    let ctx = inkwell::context::Context::create();
    let module = crate::translate_object(&ctx, &builder.build(), opts)?;
    Ok(module.print_to_string().to_string())
}

struct FuncSym {
    name: String,
    offset: u32,
}

struct DataSym {
    name: String,
    offset: u32,
    size: u32,
}

struct RelEntry {
    offset: u32,
    rtype: u32,
    symbol: String,
}

/// Builds an ELF32/LE/MIPS relocatable object from assembled words.
#[derive(Default)]
pub struct ObjectBuilder {
    words: Vec<u32>,
    funcs: Vec<FuncSym>,
    data: Vec<u8>,
    data_syms: Vec<DataSym>,
    text_relocs: Vec<RelEntry>,
    data_relocs: Vec<RelEntry>,
}

impl ObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guest address of the next instruction to be appended.
    pub fn here(&self) -> u64 {
        TEXT_BASE + 4 * self.words.len() as u64
    }

    /// Append a function symbol covering `words`. Returns its guest address.
    pub fn func(&mut self, name: &str, words: &[u32]) -> u64 {
        let addr = self.here();
        self.funcs.push(FuncSym {
            name: name.to_string(),
            offset: 4 * self.words.len() as u32,
        });
        self.words.extend_from_slice(words);
        addr
    }

    /// Append raw bytes to the data section. Returns the offset within it.
    pub fn data(&mut self, bytes: &[u8]) -> u32 {
        let off = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        off
    }

    /// Name a data-section range so relocations can reference it.
    pub fn data_symbol(&mut self, name: &str, offset: u32, size: u32) {
        self.data_syms.push(DataSym {
            name: name.to_string(),
            offset,
            size,
        });
    }

    /// Guest address of a data-section offset. Call after all code is in.
    pub fn data_addr(&self, offset: u32) -> u64 {
        self.data_offset() + u64::from(offset)
    }

    fn data_offset(&self) -> u64 {
        align(TEXT_BASE + 4 * self.words.len() as u64, 8)
    }

    /// Attach a relocation to the instruction at `addr`. Unknown symbol
    /// names become undefined externals.
    pub fn reloc(&mut self, addr: u64, rtype: u32, symbol: &str) {
        self.text_relocs.push(RelEntry {
            offset: (addr - TEXT_BASE) as u32,
            rtype,
            symbol: symbol.to_string(),
        });
    }

    /// Attach a relocation to a data-section cell.
    pub fn data_reloc(&mut self, offset: u32, rtype: u32, symbol: &str) {
        self.data_relocs.push(RelEntry {
            offset,
            rtype,
            symbol: symbol.to_string(),
        });
    }

    /// Serialize the object.
    pub fn build(&self) -> Vec<u8> {
        // Symbol table: null, functions, data symbols, then undefined
        // externals referenced by relocations.
        let mut sym_index: HashMap<String, u32> = HashMap::new();
        let mut strtab = vec![0u8];
        let mut symtab: Vec<[u8; 16]> = vec![[0u8; 16]];

        let mut add_name = |strtab: &mut Vec<u8>, name: &str| -> u32 {
            let off = strtab.len() as u32;
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
            off
        };

        for f in &self.funcs {
            let name_off = add_name(&mut strtab, &f.name);
            sym_index.insert(f.name.clone(), symtab.len() as u32);
            symtab.push(sym_entry(name_off, f.offset, 0, 0x12, 1));
        }
        for d in &self.data_syms {
            let name_off = add_name(&mut strtab, &d.name);
            sym_index.insert(d.name.clone(), symtab.len() as u32);
            symtab.push(sym_entry(name_off, d.offset, d.size, 0x11, 2));
        }
        for r in self.text_relocs.iter().chain(&self.data_relocs) {
            if !sym_index.contains_key(&r.symbol) {
                let name_off = add_name(&mut strtab, &r.symbol);
                sym_index.insert(r.symbol.clone(), symtab.len() as u32);
                symtab.push(sym_entry(name_off, 0, 0, 0x10, 0));
            }
        }

        let text_size = 4 * self.words.len() as u64;
        let data_off = self.data_offset();
        let rel_text_off = align(data_off + self.data.len() as u64, 4);
        let rel_data_off = rel_text_off + 8 * self.text_relocs.len() as u64;
        let symtab_off = rel_data_off + 8 * self.data_relocs.len() as u64;
        let strtab_off = symtab_off + 16 * symtab.len() as u64;
        let shstr_off = strtab_off + strtab.len() as u64;

        let shstrtab: Vec<u8> =
            b"\0.text\0.data\0.rel.text\0.rel.data\0.symtab\0.strtab\0.shstrtab\0".to_vec();
        let sh_off = align(shstr_off + shstrtab.len() as u64, 4);

        let mut out = vec![0u8; sh_off as usize + 8 * 40];

        // ELF header
        out[0..4].copy_from_slice(b"\x7fELF");
        out[4] = 1; // ELFCLASS32
        out[5] = 1; // little-endian
        out[6] = 1; // EV_CURRENT
        p16(&mut out, 16, 1); // ET_REL
        p16(&mut out, 18, 8); // EM_MIPS
        p32(&mut out, 20, 1);
        p32(&mut out, 32, sh_off as u32);
        p16(&mut out, 40, 52); // e_ehsize
        p16(&mut out, 46, 40); // e_shentsize
        p16(&mut out, 48, 8); // e_shnum
        p16(&mut out, 50, 7); // e_shstrndx

        for (i, w) in self.words.iter().enumerate() {
            let off = TEXT_BASE as usize + 4 * i;
            out[off..off + 4].copy_from_slice(&w.to_le_bytes());
        }
        out[data_off as usize..data_off as usize + self.data.len()].copy_from_slice(&self.data);

        for (i, r) in self.text_relocs.iter().enumerate() {
            let off = rel_text_off as usize + 8 * i;
            p32(&mut out, off, r.offset);
            p32(&mut out, off + 4, (sym_index[&r.symbol] << 8) | r.rtype);
        }
        for (i, r) in self.data_relocs.iter().enumerate() {
            let off = rel_data_off as usize + 8 * i;
            p32(&mut out, off, r.offset);
            p32(&mut out, off + 4, (sym_index[&r.symbol] << 8) | r.rtype);
        }
        for (i, s) in symtab.iter().enumerate() {
            let off = symtab_off as usize + 16 * i;
            out[off..off + 16].copy_from_slice(s);
        }
        out[strtab_off as usize..strtab_off as usize + strtab.len()].copy_from_slice(&strtab);
        out[shstr_off as usize..shstr_off as usize + shstrtab.len()].copy_from_slice(&shstrtab);

        // Section headers: null, .text, .data, .rel.text, .rel.data,
        // .symtab, .strtab, .shstrtab
        let shdr = |out: &mut Vec<u8>, idx: usize, vals: [u32; 10]| {
            let base = sh_off as usize + 40 * idx;
            for (k, v) in vals.iter().enumerate() {
                p32(out, base + 4 * k, *v);
            }
        };
        shdr(&mut out, 0, [0; 10]);
        shdr(
            &mut out,
            1,
            [1, 1, 6, 0, TEXT_BASE as u32, text_size as u32, 0, 0, 4, 0],
        );
        shdr(
            &mut out,
            2,
            [7, 1, 3, 0, data_off as u32, self.data.len() as u32, 0, 0, 8, 0],
        );
        shdr(
            &mut out,
            3,
            [
                13,
                9,
                0,
                0,
                rel_text_off as u32,
                8 * self.text_relocs.len() as u32,
                5,
                1,
                4,
                8,
            ],
        );
        shdr(
            &mut out,
            4,
            [
                23,
                9,
                0,
                0,
                rel_data_off as u32,
                8 * self.data_relocs.len() as u32,
                5,
                2,
                4,
                8,
            ],
        );
        shdr(
            &mut out,
            5,
            [
                33,
                2,
                0,
                0,
                symtab_off as u32,
                16 * symtab.len() as u32,
                6,
                1,
                4,
                16,
            ],
        );
        shdr(
            &mut out,
            6,
            [41, 3, 0, 0, strtab_off as u32, strtab.len() as u32, 0, 0, 1, 0],
        );
        shdr(
            &mut out,
            7,
            [49, 3, 0, 0, shstr_off as u32, shstrtab.len() as u32, 0, 0, 1, 0],
        );

        out
    }
}

fn align(v: u64, a: u64) -> u64 {
    (v + a - 1) & !(a - 1)
}

fn p16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn p32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn sym_entry(name: u32, value: u32, size: u32, info: u8, shndx: u16) -> [u8; 16] {
    let mut e = [0u8; 16];
    e[0..4].copy_from_slice(&name.to_le_bytes());
    e[4..8].copy_from_slice(&value.to_le_bytes());
    e[8..12].copy_from_slice(&size.to_le_bytes());
    e[12] = info;
    e[14..16].copy_from_slice(&shndx.to_le_bytes());
    e
}

/// Hand assembler for the guest encodings the decoder understands.
#[allow(clippy::unusual_byte_groupings)]
pub mod asm {
    fn r_type(funct: u32, rs: u32, rt: u32, rd: u32, sa: u32) -> u32 {
        (rs << 21) | (rt << 16) | (rd << 11) | (sa << 6) | funct
    }

    fn i_type(op: u32, rs: u32, rt: u32, imm: i16) -> u32 {
        (op << 26) | (rs << 21) | (rt << 16) | u32::from(imm as u16)
    }

    pub fn nop() -> u32 {
        0
    }

    pub fn addiu(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(9, rs, rt, imm)
    }

    pub fn addu(rd: u32, rs: u32, rt: u32) -> u32 {
        r_type(0x21, rs, rt, rd, 0)
    }

    pub fn subu(rd: u32, rs: u32, rt: u32) -> u32 {
        r_type(0x23, rs, rt, rd, 0)
    }

    pub fn and(rd: u32, rs: u32, rt: u32) -> u32 {
        r_type(0x24, rs, rt, rd, 0)
    }

    pub fn or(rd: u32, rs: u32, rt: u32) -> u32 {
        r_type(0x25, rs, rt, rd, 0)
    }

    pub fn xor(rd: u32, rs: u32, rt: u32) -> u32 {
        r_type(0x26, rs, rt, rd, 0)
    }

    pub fn nor(rd: u32, rs: u32, rt: u32) -> u32 {
        r_type(0x27, rs, rt, rd, 0)
    }

    pub fn ori(rt: u32, rs: u32, imm: u16) -> u32 {
        i_type(13, rs, rt, imm as i16)
    }

    pub fn sll(rd: u32, rt: u32, sa: u32) -> u32 {
        r_type(0, 0, rt, rd, sa)
    }

    pub fn srl(rd: u32, rt: u32, sa: u32) -> u32 {
        r_type(2, 0, rt, rd, sa)
    }

    pub fn sra(rd: u32, rt: u32, sa: u32) -> u32 {
        r_type(3, 0, rt, rd, sa)
    }

    pub fn slt(rd: u32, rs: u32, rt: u32) -> u32 {
        r_type(0x2a, rs, rt, rd, 0)
    }

    pub fn sltu(rd: u32, rs: u32, rt: u32) -> u32 {
        r_type(0x2b, rs, rt, rd, 0)
    }

    pub fn slti(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(10, rs, rt, imm)
    }

    pub fn mul(rd_hi: u32, rd_lo: u32, rs: u32, rt: u32) -> u32 {
        (0x1c << 26) | r_type(0, rs, rt, rd_hi, rd_lo)
    }

    pub fn div(rd_rem: u32, rd_quot: u32, rs: u32, rt: u32) -> u32 {
        (0x1c << 26) | r_type(2, rs, rt, rd_rem, rd_quot)
    }

    pub fn clz(rd: u32, rs: u32) -> u32 {
        (0x1c << 26) | r_type(0x20, rs, 0, rd, 0)
    }

    pub fn lw(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x23, rs, rt, imm)
    }

    pub fn lh(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x21, rs, rt, imm)
    }

    pub fn lhu(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x25, rs, rt, imm)
    }

    pub fn lb(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x20, rs, rt, imm)
    }

    pub fn lbu(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x24, rs, rt, imm)
    }

    pub fn sw(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x2b, rs, rt, imm)
    }

    pub fn sh(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x29, rs, rt, imm)
    }

    pub fn sb(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x28, rs, rt, imm)
    }

    pub fn lwl(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x22, rs, rt, imm)
    }

    pub fn lwr(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x26, rs, rt, imm)
    }

    pub fn swl(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x2a, rs, rt, imm)
    }

    pub fn swr(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x2e, rs, rt, imm)
    }

    /// Branch displacement in instruction words, relative to the branch.
    pub fn beq(rs: u32, rt: u32, off_words: i16) -> u32 {
        i_type(4, rs, rt, off_words)
    }

    pub fn bne(rs: u32, rt: u32, off_words: i16) -> u32 {
        i_type(5, rs, rt, off_words)
    }

    pub fn bltz(rs: u32, off_words: i16) -> u32 {
        i_type(1, rs, 0, off_words)
    }

    pub fn bgez(rs: u32, off_words: i16) -> u32 {
        i_type(1, rs, 1, off_words)
    }

    pub fn blez(rs: u32, off_words: i16) -> u32 {
        i_type(6, rs, 0, off_words)
    }

    pub fn bgtz(rs: u32, off_words: i16) -> u32 {
        i_type(7, rs, 0, off_words)
    }

    pub fn j(target: u64) -> u32 {
        (2 << 26) | ((target as u32 >> 2) & 0x03ff_ffff)
    }

    /// `jal 0` carries its target in a relocation.
    pub fn jal(target: u64) -> u32 {
        (3 << 26) | ((target as u32 >> 2) & 0x03ff_ffff)
    }

    pub fn jr(rs: u32) -> u32 {
        r_type(8, rs, 0, 0, 0)
    }

    pub fn jalr(rs: u32) -> u32 {
        r_type(9, rs, 0, 0, 0)
    }

    pub fn ldi(rt: u32, imm18: u32) -> u32 {
        (0x18 << 26) | (rt << 16) | (imm18 & 0x3_ffff)
    }

    pub fn ldihi(imm14: u32) -> u32 {
        (0x19 << 26) | (imm14 & 0x3fff)
    }

    pub fn ijmp(rt: u32, count: u16) -> u32 {
        (0x1a << 26) | (rt << 16) | u32::from(count)
    }

    pub fn break_() -> u32 {
        13
    }

    pub fn teq(rs: u32, rt: u32) -> u32 {
        r_type(0x34, rs, rt, 0, 0)
    }

    pub fn lwc1(ft: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x31, rs, ft, imm)
    }

    pub fn ldc1(ft: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x35, rs, ft, imm)
    }

    pub fn swc1(ft: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x39, rs, ft, imm)
    }

    pub fn sdc1(ft: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x3d, rs, ft, imm)
    }

    pub fn fadd_d(fd: u32, fs: u32, ft: u32) -> u32 {
        (0x11 << 26) | (17 << 21) | (ft << 16) | (fs << 11) | (fd << 6)
    }

    pub fn fmul_d(fd: u32, fs: u32, ft: u32) -> u32 {
        (0x11 << 26) | (17 << 21) | (ft << 16) | (fs << 11) | (fd << 6) | 2
    }

    /// cond: 2 = eq, 4 = olt, ...
    pub fn c_cond_d(cond: u32, fs: u32, ft: u32) -> u32 {
        (0x11 << 26) | (17 << 21) | (ft << 16) | (fs << 11) | (48 + cond)
    }

    pub fn c_cond_s(cond: u32, fs: u32, ft: u32) -> u32 {
        (0x11 << 26) | (16 << 21) | (ft << 16) | (fs << 11) | (48 + cond)
    }

    pub fn bc1t(off_words: i16) -> u32 {
        (0x11 << 26) | (8 << 21) | (1 << 16) | u32::from(off_words as u16)
    }

    pub fn bc1f(off_words: i16) -> u32 {
        (0x11 << 26) | (8 << 21) | u32::from(off_words as u16)
    }

    pub fn mtc1(fs: u32, rt: u32) -> u32 {
        (0x11 << 26) | (4 << 21) | (rt << 16) | (fs << 11)
    }

    pub fn mfc1(rt: u32, fs: u32) -> u32 {
        (0x11 << 26) | (rt << 16) | (fs << 11)
    }

    pub fn cvt_d_w(fd: u32, fs: u32) -> u32 {
        (0x11 << 26) | (20 << 21) | (fs << 11) | (fd << 6) | 33
    }

    pub fn trunc_w_d(fd: u32, fs: u32) -> u32 {
        (0x11 << 26) | (17 << 21) | (fs << 11) | (fd << 6) | 13
    }
}

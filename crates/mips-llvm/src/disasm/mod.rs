//! Guest instruction decoder.
//!
//! Decodes one 32-bit little-endian word into a tagged
//! `{opcode, operands[]}` record. The encoding is the classic MIPS-I field
//! layout (op/rs/rt/rd/sa/funct) with the guest-specific re-encodings kept
//! as-is:
//!
//! - `LDI`/`LDIHI` split a 32-bit immediate into an 18-bit low and a 14-bit
//!   high half carried by two adjacent words (major opcodes 0x18/0x19),
//! - `IJMP`/`IJMPHI` are the jump-table jumps (0x1a/0x1b),
//! - the wide multiply/divide forms write two destinations (SPECIAL2, with
//!   the second destination in the `sa` field),
//! - branch displacements are in words, relative to the branch itself
//!   (the guest has no delay slots).

pub mod regs;

use crate::{Error, Result};
use regs::{DPR_BASE, FPR_BASE};

/// A decoded operand. Registers carry raw machine numbers (see [`regs`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(u16),
    Imm(i64),
}

impl Operand {
    pub fn reg(self) -> Result<u16> {
        match self {
            Operand::Reg(r) => Ok(r),
            Operand::Imm(v) => Err(Error::InvalidOperand(format!(
                "expected register, got immediate {v}"
            ))),
        }
    }

    pub fn imm(self) -> Result<i64> {
        match self {
            Operand::Imm(v) => Ok(v),
            Operand::Reg(r) => Err(Error::InvalidOperand(format!(
                "expected immediate, got register {r}"
            ))),
        }
    }
}

/// Decoded guest opcodes. Immediate and register forms that share semantics
/// share a variant; signedness distinctions that change semantics do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Integer ALU
    Add,
    Sub,
    And,
    Or,
    Xor,
    Nor,
    Sll,
    Srl,
    Sra,
    Slt,
    Sltu,
    // Wide multiply / divide (two destinations)
    Mul,
    Mulu,
    Div,
    Divu,
    Clz,
    // Integer memory
    Lw,
    Lh,
    Lhu,
    Lb,
    Lbu,
    Lwl,
    Lwr,
    Sw,
    Sh,
    Sb,
    Swl,
    Swr,
    // Fused immediates
    Ldi,
    Ldihi,
    // FP memory
    Lwc1,
    Ldc1,
    Swc1,
    Sdc1,
    Lwxc1,
    Ldxc1,
    Swxc1,
    Sdxc1,
    // FP ALU
    FaddS,
    FsubS,
    FmulS,
    FdivS,
    FsqrtS,
    FabsS,
    FnegS,
    FmovS,
    FaddD,
    FsubD,
    FmulD,
    FdivD,
    FsqrtD,
    FabsD,
    FnegD,
    FmovD,
    MaddS,
    MsubS,
    MaddD,
    MsubD,
    // FP compare and FCC branches
    CCondS,
    CCondD,
    Bc1t,
    Bc1f,
    // Integer branches and jumps
    Beq,
    Bne,
    Bltz,
    Bgez,
    Blez,
    Bgtz,
    J,
    Jal,
    Jr,
    Jalr,
    Ijmp,
    Ijmphi,
    // Conditional moves
    Movz,
    Movn,
    MovzS,
    MovnS,
    MovzD,
    MovnD,
    Movt,
    Movf,
    MovtS,
    MovfS,
    MovtD,
    MovfD,
    // Conversions
    CvtDW,
    CvtSW,
    CvtDS,
    CvtSD,
    TruncWD,
    TruncWS,
    // Int <-> FP moves
    Mfc1,
    Mtc1,
    Mfhc1,
    Mflc1,
    Mthc1,
    Mtlc1,
    // Traps / misc
    Break,
    Teq,
    Nop,
}

/// One decoded guest instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInst {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
}

impl DecodedInst {
    fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self { opcode, operands }
    }

    pub fn op(&self, n: usize) -> Result<Operand> {
        self.operands
            .get(n)
            .copied()
            .ok_or_else(|| Error::InvalidOperand(format!("missing operand {n}")))
    }
}

/// Instruction width in bytes; the guest ISA is fixed-width.
pub const INSN_SIZE: u64 = 4;

fn gpr(n: u32) -> Operand {
    Operand::Reg(n as u16)
}

fn fpr(n: u32) -> Operand {
    Operand::Reg(FPR_BASE + n as u16)
}

/// Doubles are even/odd pairs named by the even single.
fn dpr(n: u32) -> Operand {
    Operand::Reg(DPR_BASE + (n as u16 >> 1))
}

fn sext16(v: u32) -> i64 {
    i64::from(v as u16 as i16)
}

/// Branch displacement: signed word count relative to the branch itself.
fn branch_off(word: u32) -> Operand {
    Operand::Imm(sext16(word) * 4)
}

/// Decode a single instruction word fetched from `addr`.
pub fn decode(addr: u64, word: u32) -> Result<DecodedInst> {
    let op = word >> 26;
    let rs = (word >> 21) & 31;
    let rt = (word >> 16) & 31;
    let rd = (word >> 11) & 31;
    let sa = (word >> 6) & 31;
    let funct = word & 63;
    let bad = || Error::InvalidEncoding { addr, word };

    let inst = match op {
        0 => match funct {
            0 => {
                if word == 0 {
                    DecodedInst::new(Opcode::Nop, vec![])
                } else {
                    DecodedInst::new(Opcode::Sll, vec![gpr(rd), gpr(rt), Operand::Imm(sa.into())])
                }
            }
            2 => DecodedInst::new(Opcode::Srl, vec![gpr(rd), gpr(rt), Operand::Imm(sa.into())]),
            3 => DecodedInst::new(Opcode::Sra, vec![gpr(rd), gpr(rt), Operand::Imm(sa.into())]),
            4 => DecodedInst::new(Opcode::Sll, vec![gpr(rd), gpr(rt), gpr(rs)]),
            6 => DecodedInst::new(Opcode::Srl, vec![gpr(rd), gpr(rt), gpr(rs)]),
            7 => DecodedInst::new(Opcode::Sra, vec![gpr(rd), gpr(rt), gpr(rs)]),
            8 => DecodedInst::new(Opcode::Jr, vec![gpr(rs)]),
            9 => DecodedInst::new(Opcode::Jalr, vec![gpr(rs), Operand::Imm(sa.into())]),
            10 => DecodedInst::new(Opcode::Movz, vec![gpr(rd), gpr(rs), gpr(rt)]),
            11 => DecodedInst::new(Opcode::Movn, vec![gpr(rd), gpr(rs), gpr(rt)]),
            13 => DecodedInst::new(Opcode::Break, vec![]),
            0x20 | 0x21 => DecodedInst::new(Opcode::Add, vec![gpr(rd), gpr(rs), gpr(rt)]),
            0x22 | 0x23 => DecodedInst::new(Opcode::Sub, vec![gpr(rd), gpr(rs), gpr(rt)]),
            0x24 => DecodedInst::new(Opcode::And, vec![gpr(rd), gpr(rs), gpr(rt)]),
            0x25 => DecodedInst::new(Opcode::Or, vec![gpr(rd), gpr(rs), gpr(rt)]),
            0x26 => DecodedInst::new(Opcode::Xor, vec![gpr(rd), gpr(rs), gpr(rt)]),
            0x27 => DecodedInst::new(Opcode::Nor, vec![gpr(rd), gpr(rs), gpr(rt)]),
            0x2a => DecodedInst::new(Opcode::Slt, vec![gpr(rd), gpr(rs), gpr(rt)]),
            0x2b => DecodedInst::new(Opcode::Sltu, vec![gpr(rd), gpr(rs), gpr(rt)]),
            0x34 => DecodedInst::new(Opcode::Teq, vec![gpr(rs), gpr(rt)]),
            _ => return Err(bad()),
        },
        // REGIMM: BLTZ / BGEZ selected by rt
        1 => match rt {
            0 => DecodedInst::new(Opcode::Bltz, vec![gpr(rs), branch_off(word)]),
            1 => DecodedInst::new(Opcode::Bgez, vec![gpr(rs), branch_off(word)]),
            _ => return Err(bad()),
        },
        2 => DecodedInst::new(
            Opcode::J,
            vec![Operand::Imm(i64::from((word & 0x03ff_ffff) << 2))],
        ),
        3 => DecodedInst::new(
            Opcode::Jal,
            vec![
                Operand::Imm(i64::from((word & 0x03ff_ffff) << 2)),
                Operand::Imm(0),
            ],
        ),
        4 => DecodedInst::new(Opcode::Beq, vec![gpr(rs), gpr(rt), branch_off(word)]),
        5 => DecodedInst::new(Opcode::Bne, vec![gpr(rs), gpr(rt), branch_off(word)]),
        6 => DecodedInst::new(Opcode::Blez, vec![gpr(rs), branch_off(word)]),
        7 => DecodedInst::new(Opcode::Bgtz, vec![gpr(rs), branch_off(word)]),
        8 | 9 => DecodedInst::new(
            Opcode::Add,
            vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))],
        ),
        10 => DecodedInst::new(
            Opcode::Slt,
            vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))],
        ),
        11 => DecodedInst::new(
            Opcode::Sltu,
            vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))],
        ),
        12 => DecodedInst::new(
            Opcode::And,
            vec![gpr(rt), gpr(rs), Operand::Imm(i64::from(word & 0xffff))],
        ),
        13 => DecodedInst::new(
            Opcode::Or,
            vec![gpr(rt), gpr(rs), Operand::Imm(i64::from(word & 0xffff))],
        ),
        14 => DecodedInst::new(
            Opcode::Xor,
            vec![gpr(rt), gpr(rs), Operand::Imm(i64::from(word & 0xffff))],
        ),
        // COP1
        0x11 => decode_cop1(addr, word, rs, rt, rd, sa, funct)?,
        // COP1X: indexed FP memory and fused multiply-add
        0x13 => match funct {
            0 => DecodedInst::new(Opcode::Lwxc1, vec![fpr(sa), gpr(rs), gpr(rt)]),
            1 => DecodedInst::new(Opcode::Ldxc1, vec![dpr(sa), gpr(rs), gpr(rt)]),
            8 => DecodedInst::new(Opcode::Swxc1, vec![fpr(rd), gpr(rs), gpr(rt)]),
            9 => DecodedInst::new(Opcode::Sdxc1, vec![dpr(rd), gpr(rs), gpr(rt)]),
            0x20 => DecodedInst::new(Opcode::MaddS, vec![fpr(sa), fpr(rs), fpr(rd), fpr(rt)]),
            0x21 => DecodedInst::new(Opcode::MaddD, vec![dpr(sa), dpr(rs), dpr(rd), dpr(rt)]),
            0x28 => DecodedInst::new(Opcode::MsubS, vec![fpr(sa), fpr(rs), fpr(rd), fpr(rt)]),
            0x29 => DecodedInst::new(Opcode::MsubD, vec![dpr(sa), dpr(rs), dpr(rd), dpr(rt)]),
            _ => return Err(bad()),
        },
        // Guest-specific fused immediates and jump-table jumps
        0x18 => DecodedInst::new(
            Opcode::Ldi,
            vec![gpr(rt), Operand::Imm(i64::from(word & 0x3_ffff))],
        ),
        0x19 => DecodedInst::new(Opcode::Ldihi, vec![Operand::Imm(i64::from(word & 0x3fff))]),
        0x1a => DecodedInst::new(
            Opcode::Ijmp,
            vec![
                Operand::Imm(0),
                gpr(rt),
                Operand::Imm(i64::from(word & 0xffff)),
            ],
        ),
        0x1b => DecodedInst::new(Opcode::Ijmphi, vec![]),
        // SPECIAL2: wide mul/div and CLZ
        0x1c => match funct {
            0 => DecodedInst::new(Opcode::Mul, vec![gpr(rd), gpr(sa), gpr(rs), gpr(rt)]),
            1 => DecodedInst::new(Opcode::Mulu, vec![gpr(rd), gpr(sa), gpr(rs), gpr(rt)]),
            2 => DecodedInst::new(Opcode::Div, vec![gpr(rd), gpr(sa), gpr(rs), gpr(rt)]),
            3 => DecodedInst::new(Opcode::Divu, vec![gpr(rd), gpr(sa), gpr(rs), gpr(rt)]),
            0x20 => DecodedInst::new(Opcode::Clz, vec![gpr(rd), gpr(rs)]),
            _ => return Err(bad()),
        },
        0x20 => DecodedInst::new(Opcode::Lb, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x21 => DecodedInst::new(Opcode::Lh, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x22 => DecodedInst::new(Opcode::Lwl, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x23 => DecodedInst::new(Opcode::Lw, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x24 => DecodedInst::new(Opcode::Lbu, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x25 => DecodedInst::new(Opcode::Lhu, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x26 => DecodedInst::new(Opcode::Lwr, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x28 => DecodedInst::new(Opcode::Sb, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x29 => DecodedInst::new(Opcode::Sh, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x2a => DecodedInst::new(Opcode::Swl, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x2b => DecodedInst::new(Opcode::Sw, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x2e => DecodedInst::new(Opcode::Swr, vec![gpr(rt), gpr(rs), Operand::Imm(sext16(word))]),
        0x31 => DecodedInst::new(
            Opcode::Lwc1,
            vec![fpr(rt), gpr(rs), Operand::Imm(sext16(word))],
        ),
        0x35 => DecodedInst::new(
            Opcode::Ldc1,
            vec![dpr(rt), gpr(rs), Operand::Imm(sext16(word))],
        ),
        0x39 => DecodedInst::new(
            Opcode::Swc1,
            vec![fpr(rt), gpr(rs), Operand::Imm(sext16(word))],
        ),
        0x3d => DecodedInst::new(
            Opcode::Sdc1,
            vec![dpr(rt), gpr(rs), Operand::Imm(sext16(word))],
        ),
        _ => return Err(bad()),
    };
    Ok(inst)
}

fn decode_cop1(
    addr: u64,
    word: u32,
    rs: u32,
    rt: u32,
    rd: u32,
    sa: u32,
    funct: u32,
) -> Result<DecodedInst> {
    let bad = || Error::InvalidEncoding { addr, word };
    // rs selects the sub-op: register moves, FCC branches, or an FP format.
    let inst = match rs {
        0 => DecodedInst::new(Opcode::Mfc1, vec![gpr(rt), fpr(rd)]),
        2 => DecodedInst::new(Opcode::Mflc1, vec![gpr(rt), dpr(rd)]),
        3 => DecodedInst::new(Opcode::Mfhc1, vec![gpr(rt), dpr(rd)]),
        4 => DecodedInst::new(Opcode::Mtc1, vec![fpr(rd), gpr(rt)]),
        // The double destination is duplicated, matching the register-move
        // operand layout the translator expects.
        6 => DecodedInst::new(Opcode::Mtlc1, vec![dpr(rd), dpr(rd), gpr(rt)]),
        7 => DecodedInst::new(Opcode::Mthc1, vec![dpr(rd), dpr(rd), gpr(rt)]),
        8 => {
            let opcode = if rt & 1 == 1 { Opcode::Bc1t } else { Opcode::Bc1f };
            DecodedInst::new(opcode, vec![branch_off(word)])
        }
        // fmt = S
        16 => match funct {
            0 => DecodedInst::new(Opcode::FaddS, vec![fpr(sa), fpr(rd), fpr(rt)]),
            1 => DecodedInst::new(Opcode::FsubS, vec![fpr(sa), fpr(rd), fpr(rt)]),
            2 => DecodedInst::new(Opcode::FmulS, vec![fpr(sa), fpr(rd), fpr(rt)]),
            3 => DecodedInst::new(Opcode::FdivS, vec![fpr(sa), fpr(rd), fpr(rt)]),
            4 => DecodedInst::new(Opcode::FsqrtS, vec![fpr(sa), fpr(rd)]),
            5 => DecodedInst::new(Opcode::FabsS, vec![fpr(sa), fpr(rd)]),
            6 => DecodedInst::new(Opcode::FmovS, vec![fpr(sa), fpr(rd)]),
            7 => DecodedInst::new(Opcode::FnegS, vec![fpr(sa), fpr(rd)]),
            13 => DecodedInst::new(Opcode::TruncWS, vec![fpr(sa), fpr(rd)]),
            17 => {
                let opcode = if rt & 1 == 1 { Opcode::MovtS } else { Opcode::MovfS };
                DecodedInst::new(opcode, vec![fpr(sa), fpr(rd), Operand::Imm(0)])
            }
            18 => DecodedInst::new(Opcode::MovzS, vec![fpr(sa), fpr(rd), gpr(rt)]),
            19 => DecodedInst::new(Opcode::MovnS, vec![fpr(sa), fpr(rd), gpr(rt)]),
            33 => DecodedInst::new(Opcode::CvtDS, vec![dpr(sa), fpr(rd)]),
            48..=63 => DecodedInst::new(
                Opcode::CCondS,
                vec![fpr(rd), fpr(rt), Operand::Imm(i64::from(funct & 15))],
            ),
            _ => return Err(bad()),
        },
        // fmt = D
        17 => match funct {
            0 => DecodedInst::new(Opcode::FaddD, vec![dpr(sa), dpr(rd), dpr(rt)]),
            1 => DecodedInst::new(Opcode::FsubD, vec![dpr(sa), dpr(rd), dpr(rt)]),
            2 => DecodedInst::new(Opcode::FmulD, vec![dpr(sa), dpr(rd), dpr(rt)]),
            3 => DecodedInst::new(Opcode::FdivD, vec![dpr(sa), dpr(rd), dpr(rt)]),
            4 => DecodedInst::new(Opcode::FsqrtD, vec![dpr(sa), dpr(rd)]),
            5 => DecodedInst::new(Opcode::FabsD, vec![dpr(sa), dpr(rd)]),
            6 => DecodedInst::new(Opcode::FmovD, vec![dpr(sa), dpr(rd)]),
            7 => DecodedInst::new(Opcode::FnegD, vec![dpr(sa), dpr(rd)]),
            13 => DecodedInst::new(Opcode::TruncWD, vec![fpr(sa), dpr(rd)]),
            17 => {
                let opcode = if rt & 1 == 1 { Opcode::MovtD } else { Opcode::MovfD };
                DecodedInst::new(opcode, vec![dpr(sa), dpr(rd), Operand::Imm(0)])
            }
            18 => DecodedInst::new(Opcode::MovzD, vec![dpr(sa), dpr(rd), gpr(rt)]),
            19 => DecodedInst::new(Opcode::MovnD, vec![dpr(sa), dpr(rd), gpr(rt)]),
            32 => DecodedInst::new(Opcode::CvtSD, vec![fpr(sa), dpr(rd)]),
            48..=63 => DecodedInst::new(
                Opcode::CCondD,
                vec![dpr(rd), dpr(rt), Operand::Imm(i64::from(funct & 15))],
            ),
            _ => return Err(bad()),
        },
        // fmt = W (integer source)
        20 => match funct {
            32 => DecodedInst::new(Opcode::CvtSW, vec![fpr(sa), fpr(rd)]),
            33 => DecodedInst::new(Opcode::CvtDW, vec![dpr(sa), fpr(rd)]),
            _ => return Err(bad()),
        },
        _ => return Err(bad()),
    };
    Ok(inst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r_type(funct: u32, rs: u32, rt: u32, rd: u32, sa: u32) -> u32 {
        (rs << 21) | (rt << 16) | (rd << 11) | (sa << 6) | funct
    }

    fn i_type(op: u32, rs: u32, rt: u32, imm: u16) -> u32 {
        (op << 26) | (rs << 21) | (rt << 16) | u32::from(imm)
    }

    #[test]
    fn decodes_addiu() {
        // addiu $v0, $zero, 7
        let inst = decode(0, i_type(9, 0, 2, 7)).unwrap();
        assert_eq!(inst.opcode, Opcode::Add);
        assert_eq!(
            inst.operands,
            vec![Operand::Reg(2), Operand::Reg(0), Operand::Imm(7)]
        );
    }

    #[test]
    fn decodes_negative_immediates() {
        // addiu $sp, $sp, -8
        let inst = decode(0, i_type(9, 29, 29, (-8i16) as u16)).unwrap();
        assert_eq!(inst.op(2).unwrap(), Operand::Imm(-8));
    }

    #[test]
    fn word_zero_is_nop() {
        assert_eq!(decode(0, 0).unwrap().opcode, Opcode::Nop);
    }

    #[test]
    fn sll_with_nonzero_fields_is_a_shift() {
        let inst = decode(0, r_type(0, 0, 3, 4, 2)).unwrap();
        assert_eq!(inst.opcode, Opcode::Sll);
        assert_eq!(
            inst.operands,
            vec![Operand::Reg(4), Operand::Reg(3), Operand::Imm(2)]
        );
    }

    #[test]
    fn branch_offsets_are_scaled_and_signed() {
        // beq $a0, $a1, -2 words
        let inst = decode(0x100, i_type(4, 4, 5, (-2i16) as u16)).unwrap();
        assert_eq!(inst.opcode, Opcode::Beq);
        assert_eq!(inst.op(2).unwrap(), Operand::Imm(-8));
    }

    #[test]
    fn decodes_jr_and_jalr() {
        assert_eq!(decode(0, r_type(8, 31, 0, 0, 0)).unwrap().opcode, Opcode::Jr);
        let jalr = decode(0, r_type(9, 25, 0, 0, 2)).unwrap();
        assert_eq!(jalr.opcode, Opcode::Jalr);
        assert_eq!(jalr.op(1).unwrap(), Operand::Imm(2));
    }

    #[test]
    fn decodes_ldi_pair_fields() {
        let ldi = decode(0, (0x18 << 26) | (2 << 16) | 0x1234).unwrap();
        assert_eq!(ldi.opcode, Opcode::Ldi);
        assert_eq!(ldi.op(1).unwrap(), Operand::Imm(0x1234));
        let ldihi = decode(4, (0x19 << 26) | 0x5).unwrap();
        assert_eq!(ldihi.opcode, Opcode::Ldihi);
        assert_eq!(ldihi.op(0).unwrap(), Operand::Imm(5));
    }

    #[test]
    fn decodes_wide_multiply() {
        // mul $t0(hi), $t1(lo), $a0, $a1
        let inst = decode(0, (0x1c << 26) | r_type(0, 4, 5, 8, 9)).unwrap();
        assert_eq!(inst.opcode, Opcode::Mul);
        assert_eq!(
            inst.operands,
            vec![
                Operand::Reg(8),
                Operand::Reg(9),
                Operand::Reg(4),
                Operand::Reg(5)
            ]
        );
    }

    #[test]
    fn decodes_fp_compare_condition() {
        // c.olt.d $f0/$f1 pair vs $f2/$f3 pair: fmt=D, fd field unused
        let word = (0x11 << 26) | (17 << 21) | (2 << 16) | (0 << 11) | (48 + 4);
        let inst = decode(0, word).unwrap();
        assert_eq!(inst.opcode, Opcode::CCondD);
        assert_eq!(inst.op(2).unwrap(), Operand::Imm(4));
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode(0, 0xffff_ffff).is_err());
        assert!(matches!(
            decode(0x40, (0x3f << 26) | 1),
            Err(Error::InvalidEncoding { addr: 0x40, .. })
        ));
    }

    #[test]
    fn double_registers_use_even_pair_names() {
        // ldc1 $f12/D6, 16($sp)
        let inst = decode(0, i_type(0x35, 29, 12, 16)).unwrap();
        assert_eq!(inst.opcode, Opcode::Ldc1);
        assert_eq!(inst.op(0).unwrap(), Operand::Reg(DPR_BASE + 6));
    }
}

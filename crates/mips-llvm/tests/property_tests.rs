//! Property-based tests: the decoder is total (decodes or reports an
//! encoding error, never panics), register numbering round-trips, and the
//! LDI/LDIHI fusion is value-correct for arbitrary halves.

use proptest::prelude::*;

use mips_llvm::disasm::regs::{conv32, conv_to_directive, conv_to_directive_dbl};
use mips_llvm::disasm::{decode, Opcode, Operand};
use mips_llvm::test_harness::{asm, translate_ir, ObjectBuilder};
use mips_llvm::TranslationOptions;

proptest! {
    /// Arbitrary words either decode or fail cleanly.
    #[test]
    fn decoder_is_total(word in any::<u32>(), addr in 0u64..0x1000) {
        match decode(addr * 4, word) {
            Ok(inst) => prop_assert!(!inst.operands.is_empty() || matches!(
                inst.opcode,
                Opcode::Nop | Opcode::Break | Opcode::Ijmphi
            )),
            Err(mips_llvm::Error::InvalidEncoding { .. }) => {}
            Err(e) => prop_assert!(false, "unexpected error {e}"),
        }
    }

    /// 64-bit aliases fold onto the same directive as their 32-bit
    /// counterparts.
    #[test]
    fn alias_round_trip(r in 0u16..32) {
        prop_assert_eq!(conv32(32 + r), r);
        prop_assert_eq!(conv_to_directive(32 + r), conv_to_directive(r));
        prop_assert_eq!(conv_to_directive(r), u32::from(r));
    }

    /// Singles occupy directives 34..=65; doubles step by two and index by
    /// half.
    #[test]
    fn fp_directive_round_trip(n in 0u16..32) {
        let single = conv_to_directive(64 + n);
        prop_assert!((34..=65).contains(&single));
        prop_assert_eq!(single, 34 + u32::from(n));
        let dbl = conv_to_directive(96 + n);
        prop_assert_eq!(dbl, 34 + 2 * u32::from(n));
        prop_assert_eq!(conv_to_directive_dbl(96 + n), u32::from(n));
    }

    /// Branch displacements survive encode/decode with sign and scale.
    #[test]
    fn branch_offsets_round_trip(off in -0x8000i32..0x8000) {
        let inst = decode(0x100, asm::beq(4, 5, off as i16)).unwrap();
        prop_assert_eq!(inst.opcode, Opcode::Beq);
        prop_assert_eq!(inst.op(2).unwrap(), Operand::Imm(i64::from(off) * 4));
    }

    /// Load/store immediates survive encode/decode.
    #[test]
    fn memory_offsets_round_trip(imm in any::<i16>()) {
        let inst = decode(0, asm::lw(4, 29, imm)).unwrap();
        prop_assert_eq!(inst.op(2).unwrap(), Operand::Imm(i64::from(imm)));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Translating an LDI/LDIHI pair stores exactly `(hi << 14) | lo`.
    #[test]
    fn ldi_fusion_is_value_correct(lo in 0u32..0x4_0000, hi in 0u32..0x4000) {
        let mut b = ObjectBuilder::new();
        b.func("main", &[asm::ldi(2, lo), asm::ldihi(hi), asm::jr(31)]);
        let ir = translate_ir(&b, &TranslationOptions::default()).unwrap();
        let fused = (hi << 14) | lo;
        let printed = fused as i32;
        prop_assert!(
            ir.contains(&format!("store i32 {printed}, ptr %r2")),
            "missing fused constant {printed} in:\n{ir}"
        );
    }
}

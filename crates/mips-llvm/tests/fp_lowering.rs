//! Floating-point lowering: arithmetic, compares through the FCC
//! pseudo-register, conversions and the int<->FP moves.

use mips_llvm::test_harness::{asm, translate_ir, ObjectBuilder};
use mips_llvm::TranslationOptions;

fn translate(b: &ObjectBuilder) -> String {
    translate_ir(b, &TranslationOptions::default()).expect("translation failed")
}

#[test]
fn double_arithmetic() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::fadd_d(0, 2, 4), asm::jr(31)]);
    let ir = translate(&b);
    assert!(ir.contains("fadd double"), "{ir}");
    assert!(ir.contains("ptr %d0"), "{ir}");
}

#[test]
fn double_loads_and_stores_go_through_shadow() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[asm::ldc1(12, 29, 0), asm::sdc1(12, 29, 8), asm::jr(31)],
    );
    let ir = translate(&b);
    assert!(ir.contains("load double"), "{ir}");
    assert!(ir.contains("store double"), "{ir}");
    assert!(ir.contains("getelementptr i8, ptr @shadow_image"), "{ir}");
}

/// Every `c.cond.d` writes FCC (258); BC1T reads it back.
#[test]
fn fcc_write_read_discipline() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[
            asm::c_cond_d(2, 0, 2), // c.eq.d
            asm::bc1t(2),           // taken -> 64
            asm::nop(),             // 60
            asm::jr(31),            // 64
        ],
    );
    let ir = translate(&b);
    assert!(ir.contains("fcmp oeq double"), "{ir}");
    assert!(ir.contains("store i32 %"), "{ir}");
    assert!(ir.contains("ptr %r258"), "FCC pseudo-register cell:\n{ir}");
    assert!(ir.contains("load i32, ptr %r258"), "{ir}");
}

/// The single-precision compare mirrors the double-precision handler.
#[test]
fn single_compare_writes_fcc() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[asm::c_cond_s(4, 0, 2), asm::bc1f(2), asm::nop(), asm::jr(31)],
    );
    let ir = translate(&b);
    assert!(ir.contains("fcmp olt float"), "{ir}");
    assert!(ir.contains("ptr %r258"), "{ir}");
}

/// High condition codes are a preserved limitation: abort with a
/// diagnostic.
#[test]
fn high_condition_codes_are_unimplemented() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[asm::c_cond_d(9, 0, 2), asm::jr(31)],
    );
    let err = translate_ir(&b, &TranslationOptions::default()).unwrap_err();
    assert!(
        matches!(err, mips_llvm::Error::UnimplementedFpCondition(9)),
        "{err}"
    );
}

#[test]
fn cvt_d_w_converts_from_int_bits() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::cvt_d_w(0, 12), asm::jr(31)]);
    let ir = translate(&b);
    assert!(ir.contains("sitofp i32"), "{ir}");
    assert!(ir.contains("to double"), "{ir}");
}

/// TRUNC.W.D stores the integer result through the single bank, as 32-bit
/// bits.
#[test]
fn trunc_w_d_keeps_bit_pattern() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::trunc_w_d(12, 0), asm::jr(31)]);
    let ir = translate(&b);
    assert!(ir.contains("fptosi double"), "{ir}");
    assert!(ir.contains("bitcast i32"), "{ir}");
}

/// MTC1 moves integer bits into the single bank; MFC1 moves them back.
#[test]
fn int_fp_moves() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[asm::mtc1(12, 4), asm::mfc1(2, 12), asm::jr(31)],
    );
    let ir = translate(&b);
    // F12's directive cell is r46.
    assert!(ir.contains("ptr %r46"), "{ir}");
    assert!(ir.contains("bitcast i32"), "{ir}");
}

#[test]
fn sqrt_uses_intrinsic() {
    let mut b = ObjectBuilder::new();
    // sqrt.d $f0, $f2
    let word = (0x11 << 26) | (17 << 21) | (2 << 11) | 4;
    b.func("main", &[word, asm::jr(31)]);
    let ir = translate(&b);
    assert!(ir.contains("llvm.sqrt.f64"), "{ir}");
}

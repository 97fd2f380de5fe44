//! Shadow-image addressing, relocated memory operands and NoShadow mode.

use mips_llvm::obj::{R_MIPS_HI16, R_MIPS_LO16};
use mips_llvm::test_harness::{asm, translate_ir, ObjectBuilder};
use mips_llvm::TranslationOptions;

fn no_shadow() -> TranslationOptions {
    TranslationOptions {
        no_shadow: true,
        ..TranslationOptions::default()
    }
}

/// A LO16-relocated load addresses the named data symbol through the
/// shadow image.
#[test]
fn lo16_load_addresses_data_symbol() {
    let mut b = ObjectBuilder::new();
    let site = b.here();
    b.func("main", &[asm::lw(2, 0, 0), asm::jr(31)]);
    let off = b.data(&42u32.to_le_bytes());
    b.data_symbol("counter", off, 4);
    b.reloc(site, R_MIPS_LO16, "counter");
    let target = b.data_addr(off);
    let ir = translate_ir(&b, &TranslationOptions::default()).expect("translation failed");
    assert!(ir.contains("@shadow_image"), "{ir}");
    assert!(
        ir.contains(&format!("i32 {target}")),
        "resolved guest address {target} in:\n{ir}"
    );
}

/// The HI16 half of a pair contributes zero; the LDI pair carries the
/// high bits.
#[test]
fn hi16_contributes_zero() {
    let mut b = ObjectBuilder::new();
    let site = b.here();
    b.func("main", &[asm::addiu(2, 0, 0), asm::jr(31)]);
    let off = b.data(&[0u8; 4]);
    b.data_symbol("buf", off, 4);
    b.reloc(site, R_MIPS_HI16, "buf");
    let ir = translate_ir(&b, &TranslationOptions::default()).expect("translation failed");
    assert!(ir.contains("store i32 0, ptr %r2"), "{ir}");
}

/// Undefined externals resolve to `symbol_host_ptr - shadow_base`, so the
/// usual shadow add lands on the host object at runtime.
#[test]
fn undefined_symbols_rebase_against_shadow() {
    let mut b = ObjectBuilder::new();
    let site = b.here();
    b.func("main", &[asm::lw(2, 0, 0), asm::jr(31)]);
    b.reloc(site, R_MIPS_LO16, "ext_buf");
    let ir = translate_ir(&b, &TranslationOptions::default()).expect("translation failed");
    assert!(ir.contains("@ext_buf"), "{ir}");
    assert!(ir.contains("ptrtoint (ptr @ext_buf to i32)"), "{ir}");
    assert!(ir.contains("ptrtoint (ptr @shadow_image to i32)"), "{ir}");
}

/// NoShadow mode addresses host memory directly.
#[test]
fn no_shadow_uses_host_pointers() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::lw(2, 29, 4), asm::jr(31)]);
    let ir = translate_ir(&b, &no_shadow()).expect("translation failed");
    assert!(ir.contains("inttoptr"), "{ir}");
    assert!(!ir.contains("getelementptr i8, ptr @shadow_image"), "{ir}");
}

/// Sub-word stores truncate their operand.
#[test]
fn narrow_stores_truncate() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[asm::sb(4, 29, 0), asm::sh(4, 29, 2), asm::jr(31)],
    );
    let ir = translate_ir(&b, &TranslationOptions::default()).expect("translation failed");
    assert!(ir.contains("trunc i32"), "{ir}");
    assert!(ir.contains("store i8"), "{ir}");
    assert!(ir.contains("store i16"), "{ir}");
}

/// Sub-word loads extend per signedness.
#[test]
fn narrow_loads_extend() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[asm::lb(2, 29, 0), asm::lhu(3, 29, 2), asm::jr(31)],
    );
    let ir = translate_ir(&b, &TranslationOptions::default()).expect("translation failed");
    assert!(ir.contains("sext i8"), "{ir}");
    assert!(ir.contains("zext i16"), "{ir}");
}

/// The unaligned-access pairs use 16-bit halves: LWL writes the upper half
/// of its destination from a byte-earlier address.
#[test]
fn lwl_lwr_use_sixteen_bit_halves() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[asm::lwl(2, 29, 3), asm::lwr(2, 29, 0), asm::jr(31)],
    );
    let ir = translate_ir(&b, &TranslationOptions::default()).expect("translation failed");
    assert!(ir.contains("load i16"), "{ir}");
    assert!(
        ir.contains("getelementptr i8, ptr %r2, i32 2"),
        "LWL writes the destination's upper half:\n{ir}"
    );
}

/// SWL stores the operand's high half.
#[test]
fn swl_stores_high_half() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::swl(4, 29, 3), asm::jr(31)]);
    let ir = translate_ir(&b, &TranslationOptions::default()).expect("translation failed");
    assert!(ir.contains("lshr i32"), "{ir}");
    assert!(ir.contains("store i16"), "{ir}");
}

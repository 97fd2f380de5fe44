//! One-region mode: a single region function holding every translated
//! block, entered through an address dispatch; calls are branches and
//! returns dispatch on RA.

use mips_llvm::test_harness::{asm, translate_ir, ObjectBuilder};
use mips_llvm::TranslationOptions;

fn one_region() -> TranslationOptions {
    TranslationOptions {
        one_region: true,
        ..TranslationOptions::default()
    }
}

/// The module has exactly one region function plus the host-callable main
/// wrapper.
#[test]
fn single_region_function() {
    let mut b = ObjectBuilder::new();
    b.func("helper", &[asm::addiu(2, 0, 5), asm::jr(31)]);
    b.func("main", &[asm::addiu(2, 0, 7), asm::jr(31)]);
    let ir = translate_ir(&b, &one_region()).expect("translation failed");
    assert!(ir.contains("define void @region(i32"), "{ir}");
    assert!(ir.contains("define i32 @main(i32"), "{ir}");
    assert_eq!(ir.matches("define ").count(), 2, "{ir}");
}

/// The entry block dispatches on the entry-address parameter over every
/// function entry.
#[test]
fn entry_dispatch_covers_all_entries() {
    let mut b = ObjectBuilder::new();
    b.func("helper", &[asm::jr(31)]); // 52 = 0x34
    b.func("main", &[asm::jr(31)]); // 56 = 0x38
    let ir = translate_ir(&b, &one_region()).expect("translation failed");
    assert!(ir.contains("switch i32 %0"), "{ir}");
    assert!(ir.contains("i32 52, label %bb34"), "{ir}");
    assert!(ir.contains("i32 56, label %bb38"), "{ir}");
}

/// A direct call stores the return address into RA and branches; the
/// callee's return dispatches back on RA.
#[test]
fn calls_become_branches() {
    let mut b = ObjectBuilder::new();
    let helper = b.func("helper", &[asm::addiu(2, 0, 3), asm::jr(31)]);
    b.func("main", &[asm::jal(helper), asm::jr(31)]);
    let ir = translate_ir(&b, &one_region()).expect("translation failed");
    // RA := return address (64 = call site + 4), then a branch to the callee.
    assert!(ir.contains("store i32 64, ptr @reg31"), "{ir}");
    assert!(ir.contains("br label %bb34"), "{ir}");
    // Return dispatch on RA with the recorded return address as a case.
    assert!(ir.contains("load i32, ptr @reg31"), "{ir}");
    assert!(ir.contains("i32 64, label %bb40"), "{ir}");
}

/// Registers are globals in one-region mode; no per-function mirrors
/// exist.
#[test]
fn registers_are_globals() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::addiu(2, 0, 7), asm::jr(31)]);
    let ir = translate_ir(&b, &one_region()).expect("translation failed");
    assert!(ir.contains("store i32 7, ptr @reg2"), "{ir}");
    assert!(!ir.contains("%r2 = alloca"), "{ir}");
}

/// The wrapper marshals argc and the stack pointer before entering the
/// region at main's address.
#[test]
fn main_wrapper_sets_up_guest_state() {
    let mut b = ObjectBuilder::new();
    let main_addr = b.func("main", &[asm::jr(31)]);
    let ir = translate_ir(&b, &one_region()).expect("translation failed");
    assert!(ir.contains("ptr @reg4"), "argc lands in A0:\n{ir}");
    assert!(ir.contains("ptr @reg29"), "SP is initialized:\n{ir}");
    assert!(
        ir.contains(&format!("call void @region(i32 {main_addr})")),
        "{ir}"
    );
}

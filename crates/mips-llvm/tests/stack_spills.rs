//! Spill-arena redirection under the stack-optimization flags.

use mips_llvm::test_harness::{asm, translate_ir, ObjectBuilder};
use mips_llvm::TranslationOptions;

fn opts(optimize_stack: bool, aggr: bool) -> TranslationOptions {
    TranslationOptions {
        optimize_stack,
        aggr_optimize_stack: aggr,
        ..TranslationOptions::default()
    }
}

/// `lw $a0, 12($sp)` under aggressive stack optimization reads the spill
/// slot for (SP, 12) instead of shadow memory.
#[test]
fn aggressive_mode_redirects_word_loads() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::lw(4, 29, 12), asm::jr(31)]);
    let ir = translate_ir(&b, &opts(false, true)).expect("translation failed");
    assert!(ir.contains("@spill_34_12"), "{ir}");
    assert!(
        !ir.contains("getelementptr i8, ptr @shadow_image"),
        "the load must not touch the shadow image:\n{ir}"
    );
}

/// FP-relative spills land in a disjoint slot range.
#[test]
fn frame_pointer_spills_are_displaced() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[asm::sw(4, 30, 8), asm::lw(5, 30, 8), asm::jr(31)],
    );
    let ir = translate_ir(&b, &opts(false, true)).expect("translation failed");
    assert!(ir.contains("@spill_34_1000008"), "{ir}");
}

/// Without the flags the same load goes through the shadow image.
#[test]
fn default_mode_uses_shadow_memory() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::lw(4, 29, 12), asm::jr(31)]);
    let ir = translate_ir(&b, &TranslationOptions::default()).expect("translation failed");
    assert!(!ir.contains("@spill_"), "{ir}");
    assert!(ir.contains("getelementptr i8, ptr @shadow_image"), "{ir}");
}

/// Byte-width accesses are never redirected, even aggressively.
#[test]
fn narrow_accesses_stay_in_shadow() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::lb(4, 29, 3), asm::jr(31)]);
    let ir = translate_ir(&b, &opts(false, true)).expect("translation failed");
    assert!(!ir.contains("@spill_"), "{ir}");
}

/// `addiu $a0, $sp, 16` under plain stack optimization hands out the spill
/// slot's address, adjusted back into guest space.
#[test]
fn address_takes_use_the_arena() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::addiu(4, 29, 16), asm::jr(31)]);
    let ir = translate_ir(&b, &opts(true, false)).expect("translation failed");
    assert!(ir.contains("@spill_34_16"), "{ir}");
    assert!(ir.contains("ptrtoint (ptr @spill_34_16 to i32)"), "{ir}");
}

/// NoLocals wins over the optimization flags.
#[test]
fn no_locals_disables_redirection() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::lw(4, 29, 12), asm::jr(31)]);
    let o = TranslationOptions {
        no_locals: true,
        aggr_optimize_stack: true,
        ..TranslationOptions::default()
    };
    let ir = translate_ir(&b, &o).expect("translation failed");
    assert!(!ir.contains("@spill_"), "{ir}");
}

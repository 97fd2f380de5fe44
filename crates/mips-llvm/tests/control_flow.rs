//! Branches, block creation and back-edge handling.

use mips_llvm::test_harness::{asm, translate_ir, ObjectBuilder};
use mips_llvm::TranslationOptions;

fn translate(b: &ObjectBuilder) -> String {
    translate_ir(b, &TranslationOptions::default()).expect("translation failed")
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

/// A backward BNE reuses the block pinned at its target address; the target
/// exists exactly once.
#[test]
fn backward_branch_reuses_target_block() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[
            asm::addiu(2, 0, 0),  // 52
            asm::addiu(2, 2, 1),  // 56 <- loop body
            asm::bne(2, 4, -1),   // 60, target 56 = 0x38
            asm::jr(31),          // 64
        ],
    );
    let ir = translate(&b);
    assert_eq!(count(&ir, "bb38:"), 1, "one block per guest address:\n{ir}");
    assert!(ir.contains("label %bb38"), "{ir}");
    assert!(ir.contains("icmp ne i32"), "{ir}");
}

/// Two branches to the same target share one block.
#[test]
fn repeated_targets_share_a_block() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[
            asm::addiu(2, 0, 0), // 52
            asm::beq(2, 4, 3),   // 56, target 68 = 0x44
            asm::beq(2, 5, 2),   // 60, target 68
            asm::nop(),          // 64
            asm::addiu(2, 2, 1), // 68
            asm::jr(31),         // 72
        ],
    );
    let ir = translate(&b);
    assert_eq!(count(&ir, "bb44:"), 1, "{ir}");
    assert_eq!(count(&ir, "label %bb44"), 2, "{ir}");
}

/// A conditional branch falls through to the next guest address.
#[test]
fn conditional_branch_has_fallthrough() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[
            asm::bltz(4, 2),     // 52, target 60
            asm::addiu(2, 0, 1), // 56 fallthrough
            asm::jr(31),         // 60
        ],
    );
    let ir = translate(&b);
    assert!(ir.contains("icmp slt i32"), "{ir}");
    // both successors named: target 0x3c and fallthrough 0x38
    assert!(ir.contains("label %bb3c"), "{ir}");
    assert!(ir.contains("label %bb38"), "{ir}");
}

/// An unconditional J still materializes the fall-through block for later
/// branches into it.
#[test]
fn j_keeps_fallthrough_block() {
    let mut b = ObjectBuilder::new();
    let entry = 52u64;
    b.func(
        "main",
        &[
            asm::j(entry + 8),   // 52 -> 60
            asm::addiu(2, 0, 9), // 56, dead but addressable
            asm::jr(31),         // 60
        ],
    );
    let ir = translate(&b);
    assert!(ir.contains("br label %bb3c"), "{ir}");
    assert!(ir.contains("bb38:"), "{ir}");
}

/// A backward branch that lands before any emitted instruction is rejected.
#[test]
fn unmapped_backward_target_is_rejected() {
    let mut b = ObjectBuilder::new();
    // The branch at 56 aims at address 4, inside the ELF header.
    b.func(
        "main",
        &[asm::addiu(2, 0, 0), asm::beq(2, 0, -13), asm::jr(31)],
    );
    let err = translate_ir(&b, &TranslationOptions::default()).unwrap_err();
    assert!(
        matches!(err, mips_llvm::Error::UnmappedBranchTarget { addr: 4 }),
        "{err}"
    );
}

/// `jr $ra` in main returns V0 to the host.
#[test]
fn main_returns_v0() {
    let mut b = ObjectBuilder::new();
    b.func("main", &[asm::addiu(2, 0, 41), asm::jr(31)]);
    let ir = translate(&b);
    assert!(ir.contains("define i32 @main(i32"), "{ir}");
    assert!(ir.contains("ret i32"), "{ir}");
}

/// A non-main function flushes written register mirrors to the globals
/// before returning.
#[test]
fn helper_flushes_written_registers() {
    let mut b = ObjectBuilder::new();
    b.func("helper", &[asm::addiu(2, 0, 5), asm::jr(31)]);
    b.func("main", &[asm::jr(31)]);
    let ir = translate(&b);
    assert!(ir.contains("define internal void @a34()"), "{ir}");
    assert!(ir.contains("store i32 %"), "{ir}");
    assert!(ir.contains("@reg2"), "flush must reach the V0 global:\n{ir}");
    assert!(ir.contains("ret void"), "{ir}");
}

/// Direct calls between translated functions become IR calls.
#[test]
fn local_call_is_direct() {
    let mut b = ObjectBuilder::new();
    let helper = b.func("helper", &[asm::addiu(2, 0, 3), asm::jr(31)]);
    b.func("main", &[asm::jal(helper), asm::jr(31)]);
    let ir = translate(&b);
    assert!(ir.contains("call void @a34()"), "{ir}");
}

/// An indirect call dispatches over every known function entry.
#[test]
fn indirect_call_dispatches_over_entries() {
    let mut b = ObjectBuilder::new();
    let helper = b.func("helper", &[asm::jr(31)]);
    b.func(
        "main",
        &[
            asm::addiu(25, 0, helper as i16), // t9 = helper
            asm::jalr(25),
            asm::jr(31),
        ],
    );
    let ir = translate(&b);
    assert!(ir.contains("switch i32"), "{ir}");
    assert!(ir.contains("call void @a34()"), "{ir}");
    // The dispatch covers main too.
    assert!(ir.contains("@main(i32"), "{ir}");
}

/// An indirect jump through a jump table becomes a switch over the table
/// entries read from the shadow image.
#[test]
fn jump_table_jump_becomes_switch() {
    let mut b = ObjectBuilder::new();
    // main:
    //   52: addiu t0, zero, 60
    //   56: ijmp  (table jt, 2 entries)
    //   60: addiu v0, zero, 1   <- table entry 0
    //   64: j 72
    //   68: addiu v0, zero, 2   <- table entry 1
    //   72: jr ra
    b.func(
        "main",
        &[
            asm::addiu(8, 0, 60),
            asm::ijmp(8, 2),
            asm::addiu(2, 0, 1),
            asm::j(72),
            asm::addiu(2, 0, 2),
            asm::jr(31),
        ],
    );
    let jt = b.data(&[60u32.to_le_bytes(), 68u32.to_le_bytes()].concat());
    b.data_symbol("jt", jt, 8);
    b.reloc(56, 135, "jt"); // R_MICROMIPS_LO16 names the table
    let ir = translate(&b);
    assert!(ir.contains("switch i32"), "{ir}");
    assert!(ir.contains("i32 60, label %bb3c"), "{ir}");
    assert!(ir.contains("i32 68, label %bb44"), "{ir}");
}

/// An IJMP without its jump-table relocation is fatal.
#[test]
fn ijmp_without_relocation_is_rejected() {
    let mut b = ObjectBuilder::new();
    b.func(
        "main",
        &[asm::ijmp(8, 2), asm::addiu(2, 0, 1), asm::jr(31)],
    );
    let err = translate_ir(&b, &TranslationOptions::default()).unwrap_err();
    assert!(matches!(err, mips_llvm::Error::JumpTableReloc { .. }), "{err}");
}

//! Libc call lowering: generic descriptors, pointer rebasing, the printf
//! family and the unknown-symbol policy.

use mips_llvm::obj::R_MIPS_26;
use mips_llvm::test_harness::{asm, translate_ir, ObjectBuilder};
use mips_llvm::TranslationOptions;

fn translate(b: &ObjectBuilder) -> String {
    translate_ir(b, &TranslationOptions::default()).expect("translation failed")
}

/// `jal printf` with a symbol relocation marshals the argument registers
/// and writes the return value into V0.
#[test]
fn jal_printf_lowered_as_variadic_call() {
    let mut b = ObjectBuilder::new();
    let call_site = b.here() + 4;
    b.func(
        "main",
        &[asm::addiu(4, 0, 0), asm::jal(0), asm::jr(31)],
    );
    b.reloc(call_site, R_MIPS_26, "printf");
    let ir = translate(&b);
    assert!(ir.contains("declare i32 @printf(ptr, ...)"), "{ir}");
    assert!(ir.contains("call i32 (ptr, ...) @printf"), "{ir}");
    assert!(ir.contains("ptr %r2"), "return value lands in V0:\n{ir}");
}

/// strlen takes a guest pointer: the call receives `shadow_base + A0`.
#[test]
fn pointer_arguments_are_rebased() {
    let mut b = ObjectBuilder::new();
    let call_site = b.here();
    b.func("main", &[asm::jal(0), asm::jr(31)]);
    b.reloc(call_site, R_MIPS_26, "strlen");
    let ir = translate(&b);
    assert!(ir.contains("declare i32 @strlen(ptr)"), "{ir}");
    assert!(
        ir.contains("getelementptr i8, ptr @shadow_image"),
        "{ir}"
    );
}

/// malloc's host pointer result is rebased back into guest space.
#[test]
fn malloc_result_is_rebased_to_guest() {
    let mut b = ObjectBuilder::new();
    let call_site = b.here();
    b.func("main", &[asm::jal(0), asm::jr(31)]);
    b.reloc(call_site, R_MIPS_26, "malloc");
    let ir = translate(&b);
    assert!(ir.contains("declare ptr @malloc(i32)"), "{ir}");
    assert!(ir.contains("ptrtoint ptr %"), "{ir}");
    assert!(
        ir.contains("ptrtoint (ptr @shadow_image to i32)"),
        "guest pointer = host - shadow base:\n{ir}"
    );
}

/// Double-argument math functions read the FP argument bank and write D0.
#[test]
fn sqrt_reads_double_bank() {
    let mut b = ObjectBuilder::new();
    let call_site = b.here();
    b.func("main", &[asm::jal(0), asm::jr(31)]);
    b.reloc(call_site, R_MIPS_26, "sqrt");
    let ir = translate(&b);
    assert!(ir.contains("declare double @sqrt(double)"), "{ir}");
    assert!(ir.contains("load double, ptr %d6"), "{ir}");
    assert!(ir.contains("ptr %d0"), "{ir}");
}

/// Arguments past the fourth slot come from the guest stack at SP + 16.
#[test]
fn stack_arguments_beyond_the_fourth() {
    let mut b = ObjectBuilder::new();
    let call_site = b.here();
    b.func("main", &[asm::jal(0), asm::jr(31)]);
    b.reloc(call_site, R_MIPS_26, "select");
    let ir = translate(&b);
    assert!(
        ir.contains("declare i32 @select(i32, ptr, ptr, ptr, ptr)"),
        "{ir}"
    );
    assert!(ir.contains("add i32 %"), "SP-relative slot load:\n{ir}");
}

/// sprintf takes buffer, format and two trailing ints; snprintf takes
/// buffer, size, format and one.
#[test]
fn bounded_printf_relatives_have_fixed_arity() {
    let mut b = ObjectBuilder::new();
    let sprintf_site = b.here();
    b.func("main", &[asm::jal(0), asm::jal(0), asm::jr(31)]);
    let snprintf_site = sprintf_site + 4;
    b.reloc(sprintf_site, R_MIPS_26, "sprintf");
    b.reloc(snprintf_site, R_MIPS_26, "snprintf");
    let ir = translate(&b);
    assert!(
        ir.contains("declare i32 @sprintf(ptr, ptr, i32, i32)"),
        "{ir}"
    );
    assert!(
        ir.contains("declare i32 @snprintf(ptr, i32, ptr, i32)"),
        "{ir}"
    );
}

/// vsprintf/vfprintf carry their va_list as a plain pointer argument.
#[test]
fn v_printf_relatives_pass_va_list_pointers() {
    let mut b = ObjectBuilder::new();
    let vsprintf_site = b.here();
    b.func("main", &[asm::jal(0), asm::jal(0), asm::jr(31)]);
    let vfprintf_site = vsprintf_site + 4;
    b.reloc(vsprintf_site, R_MIPS_26, "vsprintf");
    b.reloc(vfprintf_site, R_MIPS_26, "vfprintf");
    let ir = translate(&b);
    assert!(
        ir.contains("declare i32 @vsprintf(ptr, ptr, ptr)"),
        "{ir}"
    );
    assert!(
        ir.contains("declare i32 @vfprintf(i32, ptr, ptr)"),
        "{ir}"
    );
}

/// The scanf family passes its trailing arguments as guest pointers.
#[test]
fn scanf_trailing_args_are_pointers() {
    let mut b = ObjectBuilder::new();
    let call_site = b.here();
    b.func("main", &[asm::jal(0), asm::jr(31)]);
    b.reloc(call_site, R_MIPS_26, "__isoc99_scanf");
    let ir = translate(&b);
    assert!(ir.contains("declare i32 @scanf(ptr, ...)"), "{ir}");
    assert!(
        ir.contains("call i32 (ptr, ...) @scanf(ptr %"),
        "{ir}"
    );
}

/// Unknown externals abort translation with a diagnostic naming the symbol.
#[test]
fn unknown_external_is_fatal() {
    let mut b = ObjectBuilder::new();
    let call_site = b.here();
    b.func("main", &[asm::jal(0), asm::jr(31)]);
    b.reloc(call_site, R_MIPS_26, "frobnicate");
    let err = translate_ir(&b, &TranslationOptions::default()).unwrap_err();
    match err {
        mips_llvm::Error::UnknownExternal(name) => assert_eq!(name, "frobnicate"),
        other => panic!("expected UnknownExternal, got {other}"),
    }
}

/// `jal 0` whose relocation names a local function resolves as a direct
/// call, not a library call.
#[test]
fn relocated_local_call_resolves() {
    let mut b = ObjectBuilder::new();
    b.func("helper", &[asm::jr(31)]);
    let call_site = b.here();
    b.func("main", &[asm::jal(0), asm::jr(31)]);
    b.reloc(call_site, R_MIPS_26, "helper");
    let ir = translate(&b);
    assert!(ir.contains("call void @a34()"), "{ir}");
}

/// exit is declared void and does not clobber V0.
#[test]
fn exit_is_void() {
    let mut b = ObjectBuilder::new();
    let call_site = b.here();
    b.func("main", &[asm::jal(0), asm::jr(31)]);
    b.reloc(call_site, R_MIPS_26, "exit");
    let ir = translate(&b);
    assert!(ir.contains("declare void @exit(i32)"), "{ir}");
}

//! Libc call lowering.
//!
//! A called symbol is looked up in a static descriptor table (argument
//! shapes plus return kind) and lowered generically: declare the external
//! function once, load the guest argument registers, rebase pointer
//! arguments between guest and host space, emit the call and write the
//! return value back per the guest ABI (V0, F0 or D0). A handful of
//! functions with irregular marshaling keep bespoke lowerings.

use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, FunctionValue, IntValue};
use tracing::trace;

use crate::disasm::regs::{self, FP_DIRECTIVE_BASE};
use crate::error::llvm_err;
use crate::{Error, Result};

use super::emitter::IrEmitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    I32,
    /// Guest pointer, rebased to a host pointer at the call.
    Ptr,
    F32,
    F64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetType {
    Void,
    I32,
    /// Host pointer result, rebased back into guest space.
    Ptr,
    F32,
    F64,
}

#[derive(Debug, Clone, Copy)]
pub struct SyscallDesc {
    /// Host-side symbol to declare and call.
    pub host_name: &'static str,
    pub args: &'static [ArgType],
    pub ret: RetType,
}

macro_rules! desc {
    ($name:expr, [$($a:ident),*], $ret:ident) => {
        SyscallDesc {
            host_name: $name,
            args: &[$(ArgType::$a),*],
            ret: RetType::$ret,
        }
    };
}

/// The generic support set. Stream handles (`FILE*`, `DIR*` passed back
/// opaquely) travel as `I32`; pointers the guest dereferences travel as
/// `Ptr`.
fn generic_desc(symbol: &str) -> Option<SyscallDesc> {
    let d = match symbol {
        // process / environment
        "abort" => desc!("abort", [], Void),
        "_exit" => desc!("_exit", [I32], Void),
        "fork" => desc!("fork", [], I32),
        "waitpid" => desc!("waitpid", [I32, Ptr, I32], I32),
        "system" => desc!("system", [Ptr], I32),
        "getenv" => desc!("getenv", [Ptr], Ptr),
        "putenv" => desc!("putenv", [Ptr], I32),
        "getpid" => desc!("getpid", [], I32),
        "getuid" => desc!("getuid", [], I32),
        "geteuid" => desc!("geteuid", [], I32),
        "getgid" => desc!("getgid", [], I32),
        "getegid" => desc!("getegid", [], I32),
        "setuid" => desc!("setuid", [I32], I32),
        "setgid" => desc!("setgid", [I32], I32),
        "kill" => desc!("kill", [I32, I32], I32),
        "sleep" => desc!("sleep", [I32], I32),
        "signal" => desc!("signal", [I32, I32], I32),
        "getrlimit" => desc!("getrlimit", [I32, Ptr], I32),
        "setrlimit" => desc!("setrlimit", [I32, Ptr], I32),
        "execl" => desc!("execl", [Ptr, Ptr, I32], I32),
        "execv" => desc!("execv", [Ptr, Ptr], I32),
        "execvp" => desc!("execvp", [Ptr, Ptr], I32),
        "getopt" => desc!("getopt", [I32, Ptr, Ptr], I32),
        "__errno_location" => desc!("__errno_location", [], Ptr),
        "__assert_fail" => desc!("__assert_fail", [Ptr, Ptr, I32, Ptr], Void),
        // files and streams
        "open" => desc!("open", [Ptr, I32], I32),
        "close" => desc!("close", [I32], I32),
        "read" => desc!("read", [I32, Ptr, I32], I32),
        "access" => desc!("access", [Ptr, I32], I32),
        "chmod" => desc!("chmod", [Ptr, I32], I32),
        "chdir" => desc!("chdir", [Ptr], I32),
        "getcwd" => desc!("getcwd", [Ptr, I32], Ptr),
        "rename" => desc!("rename", [Ptr, Ptr], I32),
        "remove" => desc!("remove", [Ptr], I32),
        "unlink" => desc!("unlink", [Ptr], I32),
        "link" => desc!("link", [Ptr, Ptr], I32),
        "mkdir" => desc!("mkdir", [Ptr, I32], I32),
        "rmdir" => desc!("rmdir", [Ptr], I32),
        "truncate" => desc!("truncate", [Ptr, I32], I32),
        "ftruncate" => desc!("ftruncate", [I32, I32], I32),
        "pathconf" => desc!("pathconf", [Ptr, I32], I32),
        "pipe" => desc!("pipe", [Ptr], I32),
        "dup" => desc!("dup", [I32], I32),
        "fcntl" => desc!("fcntl", [I32, I32, I32], I32),
        "ioctl" => desc!("ioctl", [I32, I32, I32], I32),
        "isatty" => desc!("isatty", [I32], I32),
        "select" => desc!("select", [I32, Ptr, Ptr, Ptr, Ptr], I32),
        "tcsetattr" => desc!("tcsetattr", [I32, I32, Ptr], I32),
        "fopen" => desc!("fopen", [Ptr, Ptr], I32),
        "fdopen" => desc!("fdopen", [I32, Ptr], I32),
        "freopen" => desc!("freopen", [Ptr, Ptr, I32], I32),
        "popen" => desc!("popen", [Ptr, Ptr], I32),
        "tmpfile" => desc!("tmpfile", [], I32),
        "fclose" => desc!("fclose", [I32], I32),
        "pclose" => desc!("pclose", [I32], I32),
        "fflush" => desc!("fflush", [I32], I32),
        "feof" => desc!("feof", [I32], I32),
        "ferror" => desc!("ferror", [I32], I32),
        "clearerr" => desc!("clearerr", [I32], I32),
        "fileno" => desc!("fileno", [I32], I32),
        "rewind" => desc!("rewind", [I32], I32),
        "fseek" => desc!("fseek", [I32, I32, I32], I32),
        "ftell" => desc!("ftell", [I32], I32),
        "fgetpos" => desc!("fgetpos", [I32, Ptr], I32),
        "fsetpos" => desc!("fsetpos", [I32, Ptr], I32),
        "fread" => desc!("fread", [Ptr, I32, I32, I32], I32),
        "fwrite" => desc!("fwrite", [Ptr, I32, I32, I32], I32),
        "fgets" => desc!("fgets", [Ptr, I32, I32], I32),
        "fputs" => desc!("fputs", [Ptr, I32], I32),
        "fgetc" => desc!("fgetc", [I32], I32),
        "fputc" => desc!("fputc", [I32, I32], I32),
        "_IO_getc" => desc!("_IO_getc", [I32], I32),
        "_IO_putc" => desc!("_IO_putc", [I32, I32], I32),
        "putc" => desc!("putc", [I32, I32], I32),
        "putchar" => desc!("putchar", [I32], I32),
        "ungetc" => desc!("ungetc", [I32, I32], I32),
        "setbuf" => desc!("setbuf", [I32, Ptr], I32),
        "setvbuf" => desc!("setvbuf", [I32, Ptr, I32, I32], I32),
        "perror" => desc!("perror", [Ptr], Void),
        "opendir" => desc!("opendir", [Ptr], Ptr),
        "readdir" => desc!("readdir", [Ptr], Ptr),
        "closedir" => desc!("closedir", [Ptr], I32),
        // strings and memory
        "strcmp" => desc!("strcmp", [Ptr, Ptr], I32),
        "strncmp" => desc!("strncmp", [Ptr, Ptr, I32], I32),
        "strcoll" => desc!("strcoll", [Ptr, Ptr], I32),
        "strcpy" => desc!("strcpy", [Ptr, Ptr], Ptr),
        "strncpy" => desc!("strncpy", [Ptr, Ptr, I32], Ptr),
        "strcat" => desc!("strcat", [Ptr, Ptr], Ptr),
        "strncat" => desc!("strncat", [Ptr, Ptr, I32], Ptr),
        "strlen" => desc!("strlen", [Ptr], I32),
        "strspn" => desc!("strspn", [Ptr, Ptr], I32),
        "strcspn" => desc!("strcspn", [Ptr, Ptr], I32),
        "strstr" => desc!("strstr", [Ptr, Ptr], Ptr),
        "strchr" => desc!("strchr", [Ptr, I32], Ptr),
        "strrchr" => desc!("strrchr", [Ptr, I32], Ptr),
        "strtok" => desc!("strtok", [Ptr, Ptr], Ptr),
        "__strdup" => desc!("__strdup", [Ptr], Ptr),
        "strerror" => desc!("strerror", [I32], Ptr),
        "strftime" => desc!("strftime", [Ptr, I32, Ptr, Ptr], I32),
        "strtol" => desc!("strtol", [Ptr, Ptr, I32], I32),
        "strtoul" => desc!("strtoul", [Ptr, Ptr, I32], I32),
        "strtod" => desc!("strtod", [Ptr, Ptr], F64),
        "memcmp" => desc!("memcmp", [Ptr, Ptr, I32], I32),
        "memcpy" => desc!("memcpy", [Ptr, Ptr, I32], Ptr),
        "memmove" => desc!("memmove", [Ptr, Ptr, I32], Ptr),
        "memchr" => desc!("memchr", [Ptr, I32, I32], Ptr),
        "__rawmemchr" => desc!("__rawmemchr", [Ptr, I32], Ptr),
        "bcopy" => desc!("bcopy", [Ptr, Ptr, I32], Void),
        "tolower" => desc!("tolower", [I32], I32),
        "toupper" => desc!("toupper", [I32], I32),
        "abs" => desc!("abs", [I32], I32),
        "htonl" => desc!("htonl", [I32], I32),
        "qsort" => desc!("qsort", [Ptr, I32, I32, Ptr], Void),
        "obstack_free" => desc!("obstack_free", [Ptr, Ptr], Void),
        "gcvt" => desc!("gcvt", [F64, I32, Ptr], Ptr),
        // scanf/printf relatives that take a bounded argument list
        "sprintf" => desc!("sprintf", [Ptr, Ptr, I32, I32], I32),
        "snprintf" => desc!("snprintf", [Ptr, I32, Ptr, I32], I32),
        "vsprintf" => desc!("vsprintf", [Ptr, Ptr, Ptr], I32),
        "vfprintf" => desc!("vfprintf", [I32, Ptr, Ptr], I32),
        "sscanf" | "__isoc99_sscanf" => desc!("sscanf", [Ptr, Ptr, Ptr, Ptr], I32),
        "fscanf" | "__isoc99_fscanf" => desc!("fscanf", [I32, Ptr, Ptr, Ptr], I32),
        // time
        "time" => desc!("time", [Ptr], I32),
        "clock" => desc!("clock", [], I32),
        "ctime" => desc!("ctime", [Ptr], Ptr),
        "difftime" => desc!("difftime", [I32, I32], F64),
        "gmtime" => desc!("gmtime", [Ptr], Ptr),
        "localtime" => desc!("localtime", [Ptr], Ptr),
        "gettimeofday" => desc!("gettimeofday", [Ptr, Ptr], I32),
        // setjmp / longjmp
        "siglongjmp" => desc!("siglongjmp", [Ptr, I32], I32),
        "__sigsetjmp" => desc!("__sigsetjmp", [Ptr, I32], I32),
        // math
        "sin" => desc!("sin", [F64], F64),
        "cos" => desc!("cos", [F64], F64),
        "tan" => desc!("tan", [F64], F64),
        "acos" => desc!("acos", [F64], F64),
        "atan" => desc!("atan", [F64], F64),
        "atan2" => desc!("atan2", [F64, F64], F64),
        "exp" => desc!("exp", [F64], F64),
        "exp2" => desc!("exp2", [F64], F64),
        "log" => desc!("log", [F64], F64),
        "log10" => desc!("log10", [F64], F64),
        "logb" => desc!("logb", [F64], F64),
        "logbf" => desc!("logbf", [F32], F32),
        "pow" => desc!("pow", [F64, F64], F64),
        "sqrt" => desc!("sqrt", [F64], F64),
        "sqrtf" => desc!("sqrtf", [F32], F32),
        "ceil" => desc!("ceil", [F64], F64),
        "floor" => desc!("floor", [F64], F64),
        "floorf" => desc!("floorf", [F32], F32),
        "fmod" => desc!("fmod", [F64, F64], F64),
        "fmax" => desc!("fmax", [F64, F64], F64),
        "fmaxf" => desc!("fmaxf", [F32, F32], F32),
        "modf" => desc!("modf", [F64, Ptr], F64),
        "frexp" => desc!("frexp", [F64, Ptr], F64),
        "ldexp" => desc!("ldexp", [F64, I32], F64),
        "scalbn" => desc!("scalbn", [F64, I32], F64),
        "scalbnf" => desc!("scalbnf", [F32, I32], F32),
        "__isnan" => desc!("__isnan", [F64], I32),
        "rand" => desc!("rand", [], I32),
        "srand" => desc!("srand", [I32], Void),
        _ => return None,
    };
    Some(d)
}

/// Lower a call to `symbol` if it is a supported libc function.
/// Returns `false` when the symbol is unknown, so the caller can fall back
/// to local-relocation resolution.
pub fn dispatch<'ctx>(em: &mut IrEmitter<'ctx>, symbol: &str) -> Result<bool> {
    trace!(symbol, "lowering library call");
    match symbol {
        "write" => lower_generic(em, desc!("write", [I32, Ptr, I32], I32)).map(|()| true),
        "atoi" => lower_generic(em, desc!("atoi", [Ptr], I32)).map(|()| true),
        "atof" => lower_generic(em, desc!("atof", [Ptr], F64)).map(|()| true),
        "malloc" => lower_generic(em, desc!("malloc", [I32], Ptr)).map(|()| true),
        "calloc" => lower_generic(em, desc!("calloc", [I32, I32], Ptr)).map(|()| true),
        "realloc" => lower_generic(em, desc!("realloc", [Ptr, I32], Ptr)).map(|()| true),
        "free" => lower_generic(em, desc!("free", [Ptr], Void)).map(|()| true),
        "exit" => lower_generic(em, desc!("exit", [I32], Void)).map(|()| true),
        "puts" => lower_generic(em, desc!("puts", [Ptr], I32)).map(|()| true),
        "memset" => lower_generic(em, desc!("memset", [Ptr, I32, I32], Ptr)).map(|()| true),
        "lseek" => lower_generic(em, desc!("lseek", [I32, I32, I32], I32)).map(|()| true),
        "__xstat" => lower_generic(em, desc!("__xstat", [I32, Ptr, Ptr], I32)).map(|()| true),
        "__fxstat" => lower_generic(em, desc!("__fxstat", [I32, I32, Ptr], I32)).map(|()| true),
        "__ctype_b_loc" => lower_generic(em, desc!("__ctype_b_loc", [], Ptr)).map(|()| true),
        "__ctype_toupper_loc" => {
            lower_generic(em, desc!("__ctype_toupper_loc", [], Ptr)).map(|()| true)
        }
        "__ctype_tolower_loc" => {
            lower_generic(em, desc!("__ctype_tolower_loc", [], Ptr)).map(|()| true)
        }
        "printf" => lower_variadic_format(em, "printf", &[ArgType::Ptr], false).map(|()| true),
        "fprintf" => {
            lower_variadic_format(em, "fprintf", &[ArgType::I32, ArgType::Ptr], false)
                .map(|()| true)
        }
        "scanf" | "__isoc99_scanf" => {
            lower_variadic_format(em, "scanf", &[ArgType::Ptr], true).map(|()| true)
        }
        _ => match generic_desc(symbol) {
            Some(d) => lower_generic(em, d).map(|()| true),
            None => Ok(false),
        },
    }
}

/// Declare (idempotently) the host function for a descriptor.
fn declare<'ctx>(
    em: &mut IrEmitter<'ctx>,
    desc: &SyscallDesc,
    variadic: bool,
) -> FunctionValue<'ctx> {
    if let Some(f) = em.module.get_function(desc.host_name) {
        return f;
    }
    let params: Vec<inkwell::types::BasicMetadataTypeEnum> = desc
        .args
        .iter()
        .map(|a| match a {
            ArgType::I32 => em.i32_t.into(),
            ArgType::Ptr => em.ptr_t.into(),
            ArgType::F32 => em.f32_t.into(),
            ArgType::F64 => em.f64_t.into(),
        })
        .collect();
    let fn_ty = match desc.ret {
        RetType::Void => em.ctx.void_type().fn_type(&params, variadic),
        RetType::I32 => em.i32_t.fn_type(&params, variadic),
        RetType::Ptr => em.ptr_t.fn_type(&params, variadic),
        RetType::F32 => em.f32_t.fn_type(&params, variadic),
        RetType::F64 => em.f64_t.fn_type(&params, variadic),
    };
    em.module.add_function(desc.host_name, fn_ty, None)
}

/// Load the k-th integer argument slot: A0..A3, then the guest stack.
fn int_arg<'ctx>(em: &mut IrEmitter<'ctx>, slot: u32) -> Result<IntValue<'ctx>> {
    if slot < 4 {
        let d = regs::A0 + slot;
        let cell = em.reg_ptr(d);
        em.mark_read(d);
        let v = llvm_err(em.builder.build_load(em.i32_t, cell, ""))?;
        return Ok(v.into_int_value());
    }
    let sp_cell = em.reg_ptr(regs::SP);
    em.mark_read(regs::SP);
    let sp = llvm_err(em.builder.build_load(em.i32_t, sp_cell, ""))?;
    let off = em.i32_t.const_int(u64::from(16 + 4 * (slot - 4)), false);
    let addr = llvm_err(em.builder.build_int_add(sp.into_int_value(), off, ""))?;
    let ptr = em.access_shadow_memory(addr)?;
    let v = llvm_err(em.builder.build_load(em.i32_t, ptr, ""))?;
    Ok(v.into_int_value())
}

/// Guest address -> host pointer argument.
fn ptr_arg<'ctx>(
    em: &mut IrEmitter<'ctx>,
    slot: u32,
) -> Result<BasicMetadataValueEnum<'ctx>> {
    let v = int_arg(em, slot)?;
    let ptr = em.access_shadow_memory(v)?;
    Ok(ptr.into())
}

fn store_result<'ctx>(
    em: &mut IrEmitter<'ctx>,
    ret: RetType,
    result: Option<BasicValueEnum<'ctx>>,
) -> Result<()> {
    match ret {
        RetType::Void => Ok(()),
        RetType::I32 => {
            let v = result
                .ok_or_else(|| Error::Llvm("call returned void unexpectedly".into()))?
                .into_int_value();
            let cell = em.reg_ptr(regs::V0);
            llvm_err(em.builder.build_store(cell, v))?;
            em.mark_written(regs::V0);
            Ok(())
        }
        RetType::Ptr => {
            let v = result
                .ok_or_else(|| Error::Llvm("call returned void unexpectedly".into()))?
                .into_pointer_value();
            let host = llvm_err(em.builder.build_ptr_to_int(v, em.i32_t, ""))?;
            let guest = if em.opts.no_shadow {
                host
            } else {
                let shadow = em.shadow_base();
                llvm_err(em.builder.build_int_sub(host, shadow, ""))?
            };
            let cell = em.reg_ptr(regs::V0);
            llvm_err(em.builder.build_store(cell, guest))?;
            em.mark_written(regs::V0);
            Ok(())
        }
        RetType::F32 => {
            let v = result
                .ok_or_else(|| Error::Llvm("call returned void unexpectedly".into()))?
                .into_float_value();
            let cell = em.reg_ptr(FP_DIRECTIVE_BASE);
            llvm_err(em.builder.build_store(cell, v))?;
            em.mark_written(FP_DIRECTIVE_BASE);
            Ok(())
        }
        RetType::F64 => {
            let v = result
                .ok_or_else(|| Error::Llvm("call returned void unexpectedly".into()))?
                .into_float_value();
            let cell = em.dbl_reg_ptr(0);
            llvm_err(em.builder.build_store(cell, v))?;
            em.mark_dbl_written(0);
            Ok(())
        }
    }
}

/// The common path: marshal arguments per the descriptor, call, write back.
fn lower_generic<'ctx>(em: &mut IrEmitter<'ctx>, desc: SyscallDesc) -> Result<()> {
    let f = declare(em, &desc, false);
    let mut args: Vec<BasicMetadataValueEnum> = Vec::with_capacity(desc.args.len());
    let mut gp_slot = 0u32;
    let mut fp_slot = 0u32;
    for a in desc.args {
        match a {
            ArgType::I32 => {
                args.push(int_arg(em, gp_slot)?.into());
                gp_slot += 1;
            }
            ArgType::Ptr => {
                args.push(ptr_arg(em, gp_slot)?);
                gp_slot += 1;
            }
            ArgType::F64 => {
                // First two FP arguments arrive in the D6/D7 bank.
                let cell = em.dbl_reg_ptr(6 + fp_slot);
                em.mark_dbl_read(6 + fp_slot);
                let v = llvm_err(em.builder.build_load(em.f64_t, cell, ""))?;
                args.push(v.into_float_value().into());
                fp_slot += 1;
            }
            ArgType::F32 => {
                // F12/F14 for single precision.
                let d = FP_DIRECTIVE_BASE + 12 + 2 * fp_slot;
                let cell = em.reg_ptr(d);
                em.mark_read(d);
                let v = llvm_err(em.builder.build_load(em.f32_t, cell, ""))?;
                args.push(v.into_float_value().into());
                fp_slot += 1;
            }
        }
    }
    let call = llvm_err(em.builder.build_call(f, &args, ""))?;
    store_result(em, desc.ret, call.try_as_basic_value().basic())
}

/// printf/scanf family: a variadic declaration with up to five trailing
/// arguments loaded from A1..A3 and the first two stack slots. For the
/// scanf side every trailing argument is a guest pointer to write through.
fn lower_variadic_format<'ctx>(
    em: &mut IrEmitter<'ctx>,
    host_name: &str,
    fixed: &[ArgType],
    trailing_ptrs: bool,
) -> Result<()> {
    const MAX_TRAILING: u32 = 5;
    let f = match em.module.get_function(host_name) {
        Some(f) => f,
        None => {
            // Stream handles are passed as host pointers, so every fixed
            // parameter is pointer-typed.
            let params: Vec<inkwell::types::BasicMetadataTypeEnum> =
                fixed.iter().map(|_| em.ptr_t.into()).collect();
            let fn_ty = em.i32_t.fn_type(&params, true);
            em.module.add_function(host_name, fn_ty, None)
        }
    };
    let mut args: Vec<BasicMetadataValueEnum> = Vec::new();
    let mut slot = 0u32;
    for a in fixed {
        match a {
            ArgType::I32 => {
                // Stream handles are host values carried in guest registers.
                let v = int_arg(em, slot)?;
                let p = llvm_err(em.builder.build_int_to_ptr(v, em.ptr_t, ""))?;
                args.push(p.into());
            }
            _ => args.push(ptr_arg(em, slot)?),
        }
        slot += 1;
    }
    for _ in 0..MAX_TRAILING {
        if trailing_ptrs {
            args.push(ptr_arg(em, slot)?);
        } else {
            args.push(int_arg(em, slot)?.into());
        }
        slot += 1;
    }
    let call = llvm_err(em.builder.build_call(f, &args, ""))?;
    store_result(em, RetType::I32, call.try_as_basic_value().basic())
}

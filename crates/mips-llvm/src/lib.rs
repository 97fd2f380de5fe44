#![allow(
    clippy::too_many_lines, // the opcode dispatch and libc table are long matches
    clippy::missing_errors_doc
)]

pub mod disasm;
pub mod error;
pub mod llvm_frontend;
pub mod obj;
pub mod options;

/// Test harness module for building guest objects in memory.
///
/// This module is only available when running tests or when the
/// `test-harness` feature is enabled.
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use error::{Error, Result};
pub use llvm_frontend::{run_optimization_passes, translate_object};
pub use options::TranslationOptions;

/// Translation modes and tunables shared by the library and the CLI.
///
/// The defaults correspond to plain multi-region translation through the
/// shadow image, with 300 bytes of reserved guest stack.
#[derive(Debug, Clone)]
pub struct TranslationOptions {
    /// Lower the whole guest program into a single region (one IR function);
    /// calls become branches and returns dispatch on the return address.
    pub one_region: bool,
    /// Use host pointers directly instead of shadow-image offsets.
    pub no_shadow: bool,
    /// Disable per-function register mirrors and stack-spill redirection.
    pub no_locals: bool,
    /// Redirect `addiu dst, sp/fp, imm` address takes into the spill arena.
    pub optimize_stack: bool,
    /// Additionally redirect 32-bit `[sp/fp + imm]` accesses into the arena.
    pub aggr_optimize_stack: bool,
    /// Bytes of guest stack reserved at the top of the shadow image.
    pub stack_size: u32,
    /// Dump each function's IR right after translation, before optimization.
    pub debug_ir: bool,
    /// Target triple override recorded on the emitted module.
    pub triple: Option<String>,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            one_region: false,
            no_shadow: false,
            no_locals: false,
            optimize_stack: false,
            aggr_optimize_stack: false,
            stack_size: 300,
            debug_ir: false,
            triple: None,
        }
    }
}

impl TranslationOptions {
    /// Whether stack-spill redirection is active in any form.
    pub fn stack_redirection(&self) -> bool {
        !self.no_locals && (self.optimize_stack || self.aggr_optimize_stack)
    }
}

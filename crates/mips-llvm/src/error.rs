#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("ELF parsing error: {0}")]
    ElfParse(#[from] goblin::error::Error),

    #[error("unsupported object file: {0}")]
    BadObject(String),

    #[error("invalid instruction encoding at {addr:#x}: {word:#010x}")]
    InvalidEncoding { addr: u64, word: u32 },

    #[error("invalid operand shape: {0}")]
    InvalidOperand(String),

    #[error(
        "unrecognized library function call: {0}. \
         Consider adding a lowering for it if you want to support it"
    )]
    UnknownExternal(String),

    #[error("don't know how to handle relocation kind {0}")]
    UnmappedRelocation(u32),

    #[error("LDIHI at {addr:#x} is not adjacent to its LDI")]
    LdiFusion { addr: u64 },

    #[error("indirect jump at {addr:#x} carries no jump-table relocation")]
    JumpTableReloc { addr: u64 },

    #[error("branch target {addr:#x} is not an instruction boundary")]
    UnmappedBranchTarget { addr: u64 },

    #[error("floating-point condition code {0} is not implemented")]
    UnimplementedFpCondition(u8),

    #[error("LLVM error: {0}")]
    Llvm(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Adapter for inkwell builder calls, which report their own error type.
pub(crate) fn llvm_err<T>(
    result: std::result::Result<T, inkwell::builder::BuilderError>,
) -> Result<T> {
    result.map_err(|e| Error::Llvm(format!("builder error: {e:?}")))
}

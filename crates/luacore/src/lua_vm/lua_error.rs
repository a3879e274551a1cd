use crate::lua_vm::OpCode;

/// Errors raised by the table engine and the chunk loader.
///
/// Every variant is fatal for the operation that produced it; nothing here is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LuaError {
    #[error("table index is nil")]
    NilIndex,
    #[error("table index is NaN")]
    NanIndex,
    /// Requested hash capacity exceeds 2^MAXBITS nodes
    #[error("table overflow")]
    TableOverflow,
    /// Resume key of a traversal does not belong to the table
    #[error("invalid key to 'next'")]
    InvalidNextKey,
    #[error("invalid firstkey to 'setlist'")]
    InvalidSetListKey,
    #[error("invalid count to 'setlist'")]
    InvalidSetListCount,
    /// Refused by the allocator collaborator
    #[error("not enough memory")]
    OutOfMemory,
    #[error(transparent)]
    Undump(#[from] UndumpError),
}

/// Why a precompiled chunk was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UndumpError {
    #[error("{name}: not a precompiled chunk")]
    NotAChunk { name: String },
    #[error("{name}: version mismatch in precompiled chunk")]
    VersionMismatch { name: String },
    #[error("{name}: incompatible precompiled chunk")]
    Incompatible { name: String },
    #[error("{name}: corrupted precompiled chunk")]
    Corrupted { name: String },
    #[error("{name}: truncated precompiled chunk")]
    Truncated { name: String },
    #[error("{name}: too many nested functions in precompiled chunk")]
    TooDeep { name: String },
    #[error("{name}: invalid bytecode in precompiled chunk ({reason} at pc {pc})")]
    InvalidBytecode {
        name: String,
        pc: usize,
        opcode: Option<OpCode>,
        reason: &'static str,
    },
}

impl UndumpError {
    /// Name of the chunk the error refers to
    pub fn chunk_name(&self) -> &str {
        match self {
            UndumpError::NotAChunk { name }
            | UndumpError::VersionMismatch { name }
            | UndumpError::Incompatible { name }
            | UndumpError::Corrupted { name }
            | UndumpError::Truncated { name }
            | UndumpError::TooDeep { name }
            | UndumpError::InvalidBytecode { name, .. } => name,
        }
    }
}

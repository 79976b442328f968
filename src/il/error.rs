use thiserror::Error;

/// Program-construction errors.
///
/// These mean the producer of the module graph is broken: the engine
/// reports them and does not try to recover.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IlError {
    #[error("module '{0}' is already defined")]
    DuplicateModule(String),

    #[error("module '{0}' not found")]
    ModuleNotFound(String),

    #[error("type '{0}' is already defined")]
    DuplicateType(String),

    #[error("type '{0}' is not defined")]
    UnknownType(String),

    #[error("function '{0}' is already defined")]
    DuplicateFunction(String),

    #[error("function '{function}' not found in module '{module}'")]
    FunctionNotFound { module: String, function: String },

    #[error("global '{0}' is already defined")]
    DuplicateGlobal(String),

    #[error("circular dependency: struct '{0}' contains itself")]
    CircularStruct(String),

    #[error("struct '{0}' is used by value before its fields are defined")]
    IncompleteType(String),

    #[error("type '{0}' is not a struct")]
    NotAStruct(String),

    #[error("struct '{ty}' has no field {index}")]
    FieldOutOfRange { ty: String, index: u32 },

    #[error("type '{0}' is too large")]
    TypeTooLarge(String),

    #[error("type '{0}' cannot be described by a type reference")]
    UndescribableType(String),

    #[error("unresolvable type reference {id} in module '{module}'")]
    UnresolvedTypeRef { module: String, id: u32 },

    #[error("unresolvable module reference {id} in module '{module}'")]
    UnresolvedModuleRef { module: String, id: u32 },

    #[error("unresolvable function reference {id} in module '{module}'")]
    UnresolvedFunctionRef { module: String, id: u32 },

    #[error("unresolvable string {id} in module '{module}'")]
    UnresolvedString { module: String, id: u32 },

    #[error("unresolvable global {index} in module '{module}'")]
    UnresolvedGlobal { module: String, index: u32 },

    #[error("function '{function}' has no local {index}")]
    UnresolvedLocal { function: String, index: u32 },

    #[error("function '{function}' has no parameter {index}")]
    UnresolvedParam { function: String, index: u32 },

    #[error("function '{0}' has no blocks")]
    EmptyFunction(String),

    #[error("function '{function}' has no block {block}")]
    BlockNotFound { function: String, block: u32 },

    #[error("block {block} of function '{function}' is not terminated")]
    UnterminatedBlock { function: String, block: u32 },

    #[error("block {block} of function '{function}' has a terminator before pc {pc}")]
    TerminatorNotLast { function: String, block: u32, pc: usize },

    #[error("invalid jump target {target} in block {block} of function '{function}'")]
    InvalidJumpTarget {
        function: String,
        block: u32,
        target: u32,
    },

    #[error("jump to empty block {target} in function '{function}'")]
    JumpToPrunedBlock { function: String, target: u32 },

    #[error("invalid instruction: opcode {opcode:#04x}")]
    InvalidInstruction { opcode: u8 },

    #[error("invalid literal in opcode {opcode:#04x}")]
    InvalidLiteral { opcode: u8 },
}

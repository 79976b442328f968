//! Functions and basic blocks.

use super::error::IlError;
use super::instr::{BlockId, Instr};
use super::types::{ModuleId, Type};

/// Identifies a function: owning module and index in its function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId {
    pub module: ModuleId,
    pub index: u32,
}

/// Bytes the call sequence stores between the arguments and the locals:
/// the caller's saved (block, pc) continuation.
pub const CONTINUATION_SIZE: u32 = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    /// Offset from the frame base. Always negative once laid out.
    pub offset: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub ty: Type,
    pub offset: u32,
    /// False once the scope that declared it has been popped.
    pub used: bool,
}

/// Append-only instruction list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    instrs: Vec<Instr>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_instrs(instrs: Vec<Instr>) -> Self {
        Self { instrs }
    }

    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Whether the last instruction is a terminator.
    pub fn is_terminated(&self) -> bool {
        self.instrs.last().is_some_and(Instr::is_terminal)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    /// `None` for void.
    pub return_type: Option<Type>,
    params: Vec<Param>,
    locals: Vec<Local>,
    blocks: Vec<Block>,
    scopes: Vec<Vec<u32>>,
    param_size: u32,
    locals_size: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, return_type: Option<Type>) -> Self {
        Self {
            name: name.into(),
            return_type,
            params: Vec::new(),
            locals: Vec::new(),
            blocks: vec![Block::new()],
            scopes: Vec::new(),
            param_size: 0,
            locals_size: 0,
        }
    }

    /// Rebuild a function from its serialized parts.
    pub fn from_parts(
        name: String,
        return_type: Option<Type>,
        params: Vec<(String, Type)>,
        locals: Vec<Type>,
        blocks: Vec<Block>,
    ) -> Self {
        let mut func = Self::new(name, return_type);
        for (name, ty) in params {
            func.add_param(name, ty);
        }
        for ty in locals {
            func.locals.push(Local {
                ty,
                offset: 0,
                used: true,
            });
        }
        func.blocks = blocks;
        func
    }

    pub fn add_param(&mut self, name: impl Into<String>, ty: Type) -> u32 {
        self.params.push(Param {
            name: name.into(),
            ty,
            offset: 0,
        });
        self.params.len() as u32 - 1
    }

    /// Declare a local, reusing a released slot of the same type if one
    /// exists.
    pub fn declare_local(&mut self, ty: Type) -> u32 {
        let index = match self.locals.iter().position(|l| !l.used && l.ty == ty) {
            Some(i) => {
                self.locals[i].used = true;
                i as u32
            }
            None => {
                self.locals.push(Local {
                    ty,
                    offset: 0,
                    used: true,
                });
                self.locals.len() as u32 - 1
            }
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(index);
        }
        index
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Release every local declared since the matching `push_scope`.
    pub fn pop_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            for index in scope {
                self.locals[index as usize].used = false;
            }
        }
    }

    pub fn new_block(&mut self) -> BlockId {
        self.blocks.push(Block::new());
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub fn emit(&mut self, block: BlockId, instr: Instr) -> Result<(), IlError> {
        let name = &self.name;
        self.blocks
            .get_mut(block.0 as usize)
            .ok_or_else(|| IlError::BlockNotFound {
                function: name.clone(),
                block: block.0,
            })?
            .push(instr);
        Ok(())
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param(&self, index: u32) -> Option<&Param> {
        self.params.get(index as usize)
    }

    pub fn locals(&self) -> &[Local] {
        &self.locals
    }

    pub fn local(&self, index: u32) -> Option<&Local> {
        self.locals.get(index as usize)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0 as usize)
    }

    /// Total bytes of all parameters.
    pub fn param_size(&self) -> u32 {
        self.param_size
    }

    /// Total bytes of all local slots.
    pub fn locals_size(&self) -> u32 {
        self.locals_size
    }

    /// Assign frame offsets given the byte size of each parameter and local.
    ///
    /// Arguments are pushed right to left, so parameter 0 sits highest, just
    /// below the saved continuation.
    pub(crate) fn set_layout(&mut self, param_sizes: &[u32], local_sizes: &[u32]) {
        let param_size: u32 = param_sizes.iter().sum();
        let mut above = 0u32;
        for (param, size) in self.params.iter_mut().zip(param_sizes).rev() {
            param.offset = above as i32 - (param_size + CONTINUATION_SIZE) as i32;
            above += size;
        }
        let mut offset = 0u32;
        for (local, size) in self.locals.iter_mut().zip(local_sizes) {
            local.offset = offset;
            offset += size;
        }
        self.param_size = param_size;
        self.locals_size = offset;
    }

    /// Drop empty blocks and renumber the survivors, rewriting jump targets.
    ///
    /// Returns the number of blocks removed.
    pub(crate) fn prune_blocks(&mut self) -> Result<usize, IlError> {
        if self.blocks.first().is_none_or(Block::is_empty) {
            return Err(IlError::EmptyFunction(self.name.clone()));
        }

        let mut remap = Vec::with_capacity(self.blocks.len());
        let mut next = 0u32;
        for block in &self.blocks {
            if block.is_empty() {
                remap.push(None);
            } else {
                remap.push(Some(BlockId(next)));
                next += 1;
            }
        }
        let removed = self.blocks.len() - next as usize;

        // Check every target before touching the blocks, so a failed prune
        // leaves the function as it was.
        for (index, block) in self.blocks.iter().enumerate() {
            for target in block.instrs.iter().filter_map(Instr::target) {
                match remap.get(target.0 as usize) {
                    Some(Some(_)) => {}
                    Some(None) => {
                        return Err(IlError::JumpToPrunedBlock {
                            function: self.name.clone(),
                            target: target.0,
                        });
                    }
                    None => {
                        return Err(IlError::InvalidJumpTarget {
                            function: self.name.clone(),
                            block: index as u32,
                            target: target.0,
                        });
                    }
                }
            }
        }

        let blocks = std::mem::take(&mut self.blocks);
        for mut block in blocks.into_iter().filter(|b| !b.is_empty()) {
            for instr in &mut block.instrs {
                if let Some(target) = instr.target_mut() {
                    if let Some(Some(new)) = remap.get(target.0 as usize) {
                        *target = *new;
                    }
                }
            }
            self.blocks.push(block);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_local_reuse() {
        let mut f = Function::new("f", None);
        let outer = f.declare_local(Type::i32());
        f.push_scope();
        let a = f.declare_local(Type::i32());
        let b = f.declare_local(Type::f64());
        f.pop_scope();
        f.push_scope();
        let c = f.declare_local(Type::f64());
        let d = f.declare_local(Type::i32());
        let e = f.declare_local(Type::i32());
        f.pop_scope();
        assert_ne!(outer, a);
        assert_eq!(c, b);
        assert_eq!(d, a);
        assert_eq!(e, 3);
        assert_eq!(f.locals().len(), 4);
    }

    #[test]
    fn test_layout_offsets() {
        let mut f = Function::new("sub", Some(Type::i32()));
        f.add_param("a", Type::i32());
        f.add_param("b", Type::i64());
        f.declare_local(Type::i64());
        f.declare_local(Type::Boolean);
        f.set_layout(&[4, 8], &[8, 1]);
        // b pushed first (lowest), then a, then the continuation.
        assert_eq!(f.param(1).unwrap().offset, -20);
        assert_eq!(f.param(0).unwrap().offset, -12);
        assert_eq!(f.local(1).unwrap().offset, 8);
        assert_eq!((f.param_size(), f.locals_size()), (12, 9));
    }

    #[test]
    fn test_prune_renumbers_targets() {
        let mut f = Function::new("f", None);
        let dead = f.new_block();
        let exit = f.new_block();
        f.emit(BlockId::ENTRY, Instr::Jump(exit)).unwrap();
        f.emit(exit, Instr::Return).unwrap();
        assert_eq!(dead, BlockId(1));
        assert_eq!(f.prune_blocks().unwrap(), 1);
        assert_eq!(f.blocks().len(), 2);
        assert_eq!(f.blocks()[0].instrs(), &[Instr::Jump(BlockId(1))]);
    }

    #[test]
    fn test_prune_rejects_jump_into_empty_block() {
        let mut f = Function::new("f", None);
        let empty = f.new_block();
        f.emit(BlockId::ENTRY, Instr::Jump(empty)).unwrap();
        assert!(matches!(
            f.prune_blocks(),
            Err(IlError::JumpToPrunedBlock { target: 1, .. })
        ));
    }

    #[test]
    fn test_failed_prune_keeps_blocks() {
        let mut f = Function::new("f", None);
        let empty = f.new_block();
        let tail = f.new_block();
        f.emit(BlockId::ENTRY, Instr::Jump(tail)).unwrap();
        f.emit(tail, Instr::Jump(empty)).unwrap();
        assert!(f.prune_blocks().is_err());
        assert_eq!(f.blocks().len(), 3);
        assert_eq!(f.blocks()[0].instrs(), &[Instr::Jump(BlockId(2))]);
        assert_eq!(f.blocks()[2].instrs(), &[Instr::Jump(BlockId(1))]);
    }

    #[test]
    fn test_empty_entry_block() {
        let mut f = Function::new("f", None);
        assert_eq!(
            f.prune_blocks(),
            Err(IlError::EmptyFunction("f".to_string()))
        );
    }

    #[test]
    fn test_emit_into_missing_block() {
        let mut f = Function::new("f", None);
        assert!(matches!(
            f.emit(BlockId(4), Instr::Return),
            Err(IlError::BlockNotFound { block: 4, .. })
        ));
    }
}

//! Structural verifier.
//!
//! Checks what the interpreter relies on without re-checking the producer's
//! typing:
//! - every block is non-empty and ends in exactly one terminator
//! - jump targets name existing blocks
//! - local, parameter and table indices are in range
//!
//! Reference ids are only range-checked here; resolving them stays lazy.

#![allow(clippy::collapsible_if)]

use super::context::Context;
use super::error::IlError;
use super::function::Function;
use super::instr::Instr;
use super::module::Module;

pub fn verify_context(ctx: &Context) -> Result<(), IlError> {
    for module in ctx.modules() {
        for func in module.functions() {
            verify_function(module, func)?;
        }
    }
    Ok(())
}

pub fn verify_function(module: &Module, func: &Function) -> Result<(), IlError> {
    let blocks = func.blocks();
    if blocks.is_empty() {
        return Err(IlError::EmptyFunction(func.name.clone()));
    }

    for (index, block) in blocks.iter().enumerate() {
        let block_id = index as u32;
        if !block.is_terminated() {
            return Err(IlError::UnterminatedBlock {
                function: func.name.clone(),
                block: block_id,
            });
        }
        let last = block.len() - 1;
        for (pc, instr) in block.instrs().iter().enumerate() {
            if pc != last && instr.is_terminal() {
                return Err(IlError::TerminatorNotLast {
                    function: func.name.clone(),
                    block: block_id,
                    pc,
                });
            }
            verify_operands(module, func, block_id, instr)?;
        }
    }
    Ok(())
}

fn verify_operands(
    module: &Module,
    func: &Function,
    block: u32,
    instr: &Instr,
) -> Result<(), IlError> {
    if let Some(target) = instr.target() {
        if func.block(target).is_none() {
            return Err(IlError::InvalidJumpTarget {
                function: func.name.clone(),
                block,
                target: target.0,
            });
        }
    }

    if let Some(ty) = instr.type_ref() {
        if module.type_refs().get(ty.0).is_none() {
            return Err(IlError::UnresolvedTypeRef {
                module: module.name().to_string(),
                id: ty.0,
            });
        }
    }

    match *instr {
        Instr::LoadLocal(i) | Instr::StoreLocal(i) | Instr::LocalAddr(i)
            if func.local(i).is_none() =>
        {
            Err(IlError::UnresolvedLocal {
                function: func.name.clone(),
                index: i,
            })
        }
        Instr::LoadArg(i) | Instr::StoreArg(i) | Instr::ArgAddr(i) if func.param(i).is_none() => {
            Err(IlError::UnresolvedParam {
                function: func.name.clone(),
                index: i,
            })
        }
        Instr::LoadGlobal(g) | Instr::StoreGlobal(g) | Instr::GlobalAddr(g)
            if module.module_refs().get(g.module_ref).is_none() =>
        {
            Err(IlError::UnresolvedModuleRef {
                module: module.name().to_string(),
                id: g.module_ref,
            })
        }
        Instr::PushString(s) if module.strings().get(s).is_none() => {
            Err(IlError::UnresolvedString {
                module: module.name().to_string(),
                id: s.0,
            })
        }
        Instr::Call(f) if module.function_refs().get(f.0).is_none() => {
            Err(IlError::UnresolvedFunctionRef {
                module: module.name().to_string(),
                id: f.0,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::instr::BlockId;
    use crate::il::refs::{FunctionRefId, StringId, TypeRefId};
    use crate::il::types::Type;

    fn verify(build: impl FnOnce(&mut Function)) -> Result<(), IlError> {
        let mut ctx = Context::new();
        let m = ctx.add_module("main").unwrap();
        let mut f = Function::new("f", None);
        f.declare_local(Type::i32());
        build(&mut f);
        ctx.add_function(m, f).unwrap();
        let module = ctx.module(m).unwrap();
        verify_function(module, &module.functions()[0])
    }

    #[test]
    fn test_valid_function() {
        let result = verify(|f| {
            let exit = f.new_block();
            f.emit(BlockId::ENTRY, Instr::PushBool(true)).unwrap();
            f.emit(BlockId::ENTRY, Instr::JumpIfFalse(exit)).unwrap();
            f.emit(BlockId::ENTRY, Instr::Jump(exit)).unwrap();
            f.emit(exit, Instr::Return).unwrap();
        });
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_unterminated_block() {
        let result = verify(|f| {
            f.emit(BlockId::ENTRY, Instr::push_i32(1)).unwrap();
        });
        assert!(matches!(
            result,
            Err(IlError::UnterminatedBlock { block: 0, .. })
        ));
    }

    #[test]
    fn test_terminator_before_end() {
        let result = verify(|f| {
            f.emit(BlockId::ENTRY, Instr::Return).unwrap();
            f.emit(BlockId::ENTRY, Instr::Return).unwrap();
        });
        assert!(matches!(
            result,
            Err(IlError::TerminatorNotLast { pc: 0, .. })
        ));
    }

    #[test]
    fn test_jump_out_of_range() {
        let result = verify(|f| {
            f.emit(BlockId::ENTRY, Instr::Jump(BlockId(5))).unwrap();
        });
        assert!(matches!(
            result,
            Err(IlError::InvalidJumpTarget { target: 5, .. })
        ));
    }

    #[test]
    fn test_operand_ranges() {
        let cases = [
            Instr::LoadLocal(1),
            Instr::LoadArg(0),
            Instr::Pop(TypeRefId(0)),
            Instr::PushString(StringId(0)),
            Instr::Call(FunctionRefId(0)),
        ];
        for instr in cases {
            let result = verify(|f| {
                f.emit(BlockId::ENTRY, instr).unwrap();
                f.emit(BlockId::ENTRY, Instr::Return).unwrap();
            });
            assert!(result.is_err(), "{} should be rejected", instr);
        }
    }
}

//! Human-readable and JSON views of a module graph.

use serde::Serialize;

use super::context::Context;
use super::function::Function;
use super::instr::Instr;
use super::module::Module;
use super::registry::DeclaredKind;

/// Disassembler for a whole context.
pub struct Disassembler<'a> {
    ctx: &'a Context,
    output: String,
}

impl<'a> Disassembler<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            output: String::new(),
        }
    }

    pub fn disassemble(&mut self) -> &str {
        for module in self.ctx.modules() {
            self.disassemble_module(module);
        }
        &self.output
    }

    fn disassemble_module(&mut self, module: &Module) {
        self.output
            .push_str(&format!("== Module[{}]: {} ==\n", module.id().0, module.name()));

        for (id, decl) in module.types().iter() {
            match &decl.kind {
                DeclaredKind::Struct(def) => {
                    self.output.push_str(&format!(
                        "  type[{}] struct {} (size: {})\n",
                        id, decl.name, def.size
                    ));
                    for field in &def.fields {
                        self.output.push_str(&format!(
                            "    +{:<4} {}: {}\n",
                            field.offset,
                            field.name,
                            self.ctx.type_name(&field.ty)
                        ));
                    }
                }
                DeclaredKind::Alias(ty) => {
                    self.output.push_str(&format!(
                        "  type[{}] alias {} = {}\n",
                        id,
                        decl.name,
                        self.ctx.type_name(ty)
                    ));
                }
            }
        }

        for (i, global) in module.globals().iter().enumerate() {
            self.output.push_str(&format!(
                "  global[{}] {}: {} @{}\n",
                i,
                global.name,
                self.ctx.type_name(&global.ty),
                global.offset
            ));
        }

        for (i, s) in module.strings().iter().enumerate() {
            let escaped = s.replace('\n', "\\n").replace('\t', "\\t");
            self.output
                .push_str(&format!("  [{:04}] \"{}\"\n", i, escaped));
        }
        self.output.push('\n');

        for (i, func) in module.functions().iter().enumerate() {
            self.disassemble_function(module, func, i);
        }
    }

    fn disassemble_function(&mut self, module: &Module, func: &Function, index: usize) {
        self.output.push_str(&format!(
            "== Function[{}]: {} (params: {}, locals: {}) -> {} ==\n",
            index,
            func.name,
            func.params().len(),
            func.locals().len(),
            func.return_type
                .as_ref()
                .map(|t| self.ctx.type_name(t))
                .unwrap_or_else(|| "void".to_string())
        ));
        for (b, block) in func.blocks().iter().enumerate() {
            self.output.push_str(&format!("block{}:\n", b));
            for (pc, instr) in block.instrs().iter().enumerate() {
                self.output.push_str(&format!("{:04}: {}", pc, instr));
                if let Some(note) = self.annotate(module, instr) {
                    self.output.push_str(" ; ");
                    self.output.push_str(&note);
                }
                self.output.push('\n');
            }
        }
        self.output.push('\n');
    }

    fn annotate(&self, module: &Module, instr: &Instr) -> Option<String> {
        let id = module.id();
        match instr {
            Instr::Call(f) => {
                let target = self.ctx.resolve_function_ref(id, *f).ok()?;
                let callee = self.ctx.module(target.module)?;
                let func = callee.function(target.index)?;
                Some(format!("{}::{}", callee.name(), func.name))
            }
            Instr::PushString(s) => Some(format!("{:?}", self.ctx.string(id, *s).ok()?)),
            Instr::LoadGlobal(g) | Instr::StoreGlobal(g) | Instr::GlobalAddr(g) => {
                let (owner, global) = self.ctx.resolve_global(id, *g).ok()?;
                Some(format!("{}::{}", self.ctx.module(owner)?.name(), global.name))
            }
            other => {
                let resolved = self.ctx.resolve_type_ref(id, other.type_ref()?).ok()?;
                Some(self.ctx.type_name(&resolved.ty))
            }
        }
    }
}

/// Disassemble every module in `ctx`.
pub fn disassemble(ctx: &Context) -> String {
    let mut disassembler = Disassembler::new(ctx);
    disassembler.disassemble().to_string()
}

#[derive(Debug, Serialize)]
pub struct ImageSummary {
    pub modules: Vec<ModuleSummary>,
}

#[derive(Debug, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub types: Vec<TypeSummary>,
    pub globals: Vec<SlotSummary>,
    pub strings: Vec<String>,
    pub functions: Vec<FunctionSummary>,
    pub module_refs: Vec<String>,
    pub type_refs: usize,
    pub function_refs: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeSummary {
    Struct {
        name: String,
        size: u32,
        fields: Vec<SlotSummary>,
    },
    Alias {
        name: String,
        target: String,
    },
}

#[derive(Debug, Serialize)]
pub struct SlotSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct FunctionSummary {
    pub name: String,
    pub returns: Option<String>,
    pub params: Vec<SlotSummary>,
    pub locals: Vec<SlotSummary>,
    pub blocks: Vec<Vec<String>>,
}

/// Structured description of `ctx`, suitable for `serde_json`.
pub fn summarize(ctx: &Context) -> ImageSummary {
    let modules = ctx
        .modules()
        .iter()
        .map(|module| ModuleSummary {
            name: module.name().to_string(),
            types: module
                .types()
                .iter()
                .map(|(_, decl)| match &decl.kind {
                    DeclaredKind::Struct(def) => TypeSummary::Struct {
                        name: decl.name.clone(),
                        size: def.size,
                        fields: def
                            .fields
                            .iter()
                            .map(|f| SlotSummary {
                                name: f.name.clone(),
                                ty: ctx.type_name(&f.ty),
                                offset: f.offset as i64,
                            })
                            .collect(),
                    },
                    DeclaredKind::Alias(ty) => TypeSummary::Alias {
                        name: decl.name.clone(),
                        target: ctx.type_name(ty),
                    },
                })
                .collect(),
            globals: module
                .globals()
                .iter()
                .map(|g| SlotSummary {
                    name: g.name.clone(),
                    ty: ctx.type_name(&g.ty),
                    offset: g.offset as i64,
                })
                .collect(),
            strings: module.strings().iter().map(str::to_string).collect(),
            functions: module
                .functions()
                .iter()
                .map(|f| FunctionSummary {
                    name: f.name.clone(),
                    returns: f.return_type.as_ref().map(|t| ctx.type_name(t)),
                    params: f
                        .params()
                        .iter()
                        .map(|p| SlotSummary {
                            name: p.name.clone(),
                            ty: ctx.type_name(&p.ty),
                            offset: p.offset as i64,
                        })
                        .collect(),
                    locals: f
                        .locals()
                        .iter()
                        .enumerate()
                        .map(|(i, l)| SlotSummary {
                            name: format!("${}", i),
                            ty: ctx.type_name(&l.ty),
                            offset: l.offset as i64,
                        })
                        .collect(),
                    blocks: f
                        .blocks()
                        .iter()
                        .map(|b| b.instrs().iter().map(|i| i.to_string()).collect())
                        .collect(),
                })
                .collect(),
            module_refs: module.module_refs().iter().cloned().collect(),
            type_refs: module.type_refs().len(),
            function_refs: module.function_refs().len(),
        })
        .collect();
    ImageSummary { modules }
}

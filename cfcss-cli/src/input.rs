//! JSON description of a module.
//!
//! Registers are written `v<N>` (program variables, parameters first) and `t<N>`
//! (temporaries). Storage is `@name` for a module global and `%name` for a frame slot of
//! the enclosing function. Branch targets refer to block labels. The same format is used
//! for input and for `instrument --format json`, so instrumented modules can be fed back
//! into `run`.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context};
use cfcss::{
    instrument::Signature,
    ir::{
        BinaryOp, Block, BlockId, Function, Global, GlobalKind, Instruction, Module, Operand,
        Reg, SlotId, Storage, Terminator,
    },
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ModuleDto {
    pub name: String,
    #[serde(default)]
    pub globals: Vec<GlobalDto>,
    #[serde(default)]
    pub functions: Vec<FunctionDto>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GlobalKindDto {
    #[default]
    Program,
    SignatureRegister,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GlobalDto {
    pub name: String,
    #[serde(default)]
    pub init: i64,
    #[serde(default)]
    pub kind: GlobalKindDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlotDto {
    pub name: String,
    #[serde(default = "default_width")]
    pub width: u32,
}

fn default_width() -> u32 {
    64
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FunctionDto {
    pub name: String,
    #[serde(default)]
    pub params: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<SlotDto>,
    #[serde(default)]
    pub blocks: Vec<BlockDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockDto {
    pub label: String,
    #[serde(default)]
    pub instructions: Vec<InstructionDto>,
    pub terminator: TerminatorDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperandDto {
    Const(i64),
    Reg(String),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum InstructionDto {
    Copy {
        dst: String,
        src: OperandDto,
    },
    Binary {
        operator: String,
        dst: String,
        lhs: OperandDto,
        rhs: OperandDto,
    },
    Select {
        dst: String,
        cond: OperandDto,
        if_true: OperandDto,
        if_false: OperandDto,
    },
    Load {
        dst: String,
        src: String,
    },
    Store {
        dst: String,
        value: OperandDto,
    },
    Call {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dst: Option<String>,
        callee: String,
        #[serde(default)]
        args: Vec<OperandDto>,
    },
    Check {
        actual: OperandDto,
        expected: u32,
        handler: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TerminatorDto {
    Jump {
        target: String,
    },
    Branch {
        cond: OperandDto,
        then: String,
        #[serde(rename = "else")]
        otherwise: String,
    },
    Switch {
        value: OperandDto,
        cases: Vec<(i64, String)>,
        default: String,
    },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<OperandDto>,
    },
    Unreachable,
}

impl ModuleDto {
    /// Parse a module description.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("invalid module description")
    }

    /// Build and validate the IR module.
    pub fn into_module(self) -> anyhow::Result<Module> {
        let mut module = Module::new(self.name);
        for global in self.globals {
            let global = match global.kind {
                GlobalKindDto::Program => Global::program(global.name, global.init),
                GlobalKindDto::SignatureRegister => Global::signature_register(global.name),
            };
            module.add_global(global)?;
        }
        for dto in &self.functions {
            let function = build_function(&module, dto)
                .with_context(|| format!("in function '{}'", dto.name))?;
            module.add_function(function)?;
        }
        module.validate()?;
        Ok(module)
    }

    /// Describe an IR module.
    pub fn from_module(module: &Module) -> Self {
        let globals = module
            .globals()
            .iter()
            .map(|global| GlobalDto {
                name: global.name.clone(),
                init: global.init,
                kind: match global.kind {
                    GlobalKind::Program => GlobalKindDto::Program,
                    GlobalKind::SignatureRegister => GlobalKindDto::SignatureRegister,
                },
            })
            .collect();
        let functions = module
            .functions()
            .iter()
            .map(|function| describe_function(module, function))
            .collect();
        Self {
            name: module.name().to_string(),
            globals,
            functions,
        }
    }
}

/// Name resolution for one function.
struct Resolver<'a> {
    module: &'a Module,
    slots: HashMap<&'a str, SlotId>,
    labels: HashMap<&'a str, BlockId>,
    vars: u32,
    temps: u32,
}

impl Resolver<'_> {
    fn reg(&mut self, name: &str) -> anyhow::Result<Reg> {
        let parse = |digits: &str| {
            digits
                .parse::<u32>()
                .with_context(|| format!("invalid register '{name}'"))
        };
        if let Some(digits) = name.strip_prefix('v') {
            let index = parse(digits)?;
            self.vars = self.vars.max(index + 1);
            Ok(Reg::Var(index))
        } else if let Some(digits) = name.strip_prefix('t') {
            let index = parse(digits)?;
            self.temps = self.temps.max(index + 1);
            Ok(Reg::Temp(index))
        } else {
            bail!("invalid register '{name}', expected v<N> or t<N>")
        }
    }

    fn operand(&mut self, operand: &OperandDto) -> anyhow::Result<Operand> {
        match operand {
            OperandDto::Const(value) => Ok(Operand::Const(*value)),
            OperandDto::Reg(name) => Ok(Operand::Reg(self.reg(name)?)),
        }
    }

    fn storage(&self, name: &str) -> anyhow::Result<Storage> {
        if let Some(global) = name.strip_prefix('@') {
            let id = self
                .module
                .global_by_name(global)
                .ok_or_else(|| anyhow!("unknown global '{global}'"))?;
            Ok(Storage::Global(id))
        } else if let Some(slot) = name.strip_prefix('%') {
            let id = self
                .slots
                .get(slot)
                .ok_or_else(|| anyhow!("unknown frame slot '{slot}'"))?;
            Ok(Storage::Frame(*id))
        } else {
            bail!("invalid storage '{name}', expected @global or %slot")
        }
    }

    fn label(&self, label: &str) -> anyhow::Result<BlockId> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| anyhow!("unknown block '{label}'"))
    }

    fn instruction(&mut self, dto: &InstructionDto) -> anyhow::Result<Instruction> {
        Ok(match dto {
            InstructionDto::Copy { dst, src } => Instruction::Copy {
                dst: self.reg(dst)?,
                src: self.operand(src)?,
            },
            InstructionDto::Binary {
                operator,
                dst,
                lhs,
                rhs,
            } => Instruction::Binary {
                op: operator
                    .parse::<BinaryOp>()
                    .map_err(|_| anyhow!("unknown operator '{operator}'"))?,
                dst: self.reg(dst)?,
                lhs: self.operand(lhs)?,
                rhs: self.operand(rhs)?,
            },
            InstructionDto::Select {
                dst,
                cond,
                if_true,
                if_false,
            } => Instruction::Select {
                dst: self.reg(dst)?,
                cond: self.operand(cond)?,
                if_true: self.operand(if_true)?,
                if_false: self.operand(if_false)?,
            },
            InstructionDto::Load { dst, src } => Instruction::Load {
                dst: self.reg(dst)?,
                src: self.storage(src)?,
            },
            InstructionDto::Store { dst, value } => Instruction::Store {
                dst: self.storage(dst)?,
                value: self.operand(value)?,
            },
            InstructionDto::Call { dst, callee, args } => Instruction::Call {
                dst: dst.as_deref().map(|dst| self.reg(dst)).transpose()?,
                callee: callee.clone(),
                args: args
                    .iter()
                    .map(|arg| self.operand(arg))
                    .collect::<anyhow::Result<_>>()?,
            },
            InstructionDto::Check {
                actual,
                expected,
                handler,
            } => Instruction::CheckSignature {
                actual: self.operand(actual)?,
                expected: Signature::new(*expected)
                    .ok_or_else(|| anyhow!("signature 0 is reserved"))?,
                handler: handler.clone(),
            },
        })
    }

    fn terminator(&mut self, dto: &TerminatorDto) -> anyhow::Result<Terminator> {
        Ok(match dto {
            TerminatorDto::Jump { target } => Terminator::Jump(self.label(target)?),
            TerminatorDto::Branch {
                cond,
                then,
                otherwise,
            } => Terminator::Branch {
                cond: self.operand(cond)?,
                then_block: self.label(then)?,
                else_block: self.label(otherwise)?,
            },
            TerminatorDto::Switch {
                value,
                cases,
                default,
            } => Terminator::Switch {
                value: self.operand(value)?,
                cases: cases
                    .iter()
                    .map(|(case, label)| self.label(label).map(|target| (*case, target)))
                    .collect::<anyhow::Result<_>>()?,
                default: self.label(default)?,
            },
            TerminatorDto::Return { value } => {
                Terminator::Return(value.as_ref().map(|v| self.operand(v)).transpose()?)
            }
            TerminatorDto::Unreachable => Terminator::Unreachable,
        })
    }
}

fn build_function(module: &Module, dto: &FunctionDto) -> anyhow::Result<Function> {
    let mut function = Function::new(dto.name.clone(), dto.params);

    let mut slots = HashMap::with_capacity(dto.slots.len());
    for slot in &dto.slots {
        let id = function.get_or_insert_frame_slot(&slot.name, slot.width);
        slots.insert(slot.name.as_str(), id);
    }

    let mut labels = HashMap::with_capacity(dto.blocks.len());
    for block in &dto.blocks {
        let id = function.add_block(Block::new(block.label.clone()));
        if labels.insert(block.label.as_str(), id).is_some() {
            bail!("block label '{}' is used twice", block.label);
        }
    }

    let mut resolver = Resolver {
        module,
        slots,
        labels,
        vars: dto.params,
        temps: 0,
    };

    let mut bodies = Vec::with_capacity(dto.blocks.len());
    for block in &dto.blocks {
        let instructions = block
            .instructions
            .iter()
            .map(|instruction| resolver.instruction(instruction))
            .collect::<anyhow::Result<Vec<_>>>()
            .with_context(|| format!("in block '{}'", block.label))?;
        let terminator = resolver
            .terminator(&block.terminator)
            .with_context(|| format!("in block '{}'", block.label))?;
        bodies.push((instructions, terminator));
    }

    while function.var_count() < resolver.vars {
        function.new_var();
    }
    while function.temp_count() < resolver.temps {
        function.new_temp();
    }

    for (index, (instructions, terminator)) in bodies.into_iter().enumerate() {
        if let Some(block) = function.block_mut(BlockId::new(index)) {
            for instruction in instructions {
                block.push(instruction);
            }
            block.set_terminator(terminator);
        }
    }

    function.validate()?;
    Ok(function)
}

fn reg_name(reg: Reg) -> String {
    match reg {
        Reg::Var(index) => format!("v{index}"),
        Reg::Temp(index) => format!("t{index}"),
    }
}

fn describe_operand(operand: Operand) -> OperandDto {
    match operand {
        Operand::Const(value) => OperandDto::Const(value),
        Operand::Reg(reg) => OperandDto::Reg(reg_name(reg)),
    }
}

fn describe_function(module: &Module, function: &Function) -> FunctionDto {
    let storage = |storage: Storage| match storage {
        Storage::Global(id) => module
            .global(id)
            .map_or_else(|| id.to_string(), |global| format!("@{}", global.name)),
        Storage::Frame(id) => function
            .frame_slots()
            .get(id.index())
            .map_or_else(|| id.to_string(), |slot| format!("%{}", slot.name)),
    };
    let label = |id: BlockId| {
        function
            .block(id)
            .map_or_else(|| id.to_string(), |block| block.label().to_string())
    };

    let blocks = function
        .blocks()
        .iter()
        .filter_map(|block| {
            let instructions = block
                .instructions()
                .iter()
                .map(|instruction| match instruction {
                    Instruction::Copy { dst, src } => InstructionDto::Copy {
                        dst: reg_name(*dst),
                        src: describe_operand(*src),
                    },
                    Instruction::Binary { op, dst, lhs, rhs } => InstructionDto::Binary {
                        operator: op.to_string(),
                        dst: reg_name(*dst),
                        lhs: describe_operand(*lhs),
                        rhs: describe_operand(*rhs),
                    },
                    Instruction::Select {
                        dst,
                        cond,
                        if_true,
                        if_false,
                    } => InstructionDto::Select {
                        dst: reg_name(*dst),
                        cond: describe_operand(*cond),
                        if_true: describe_operand(*if_true),
                        if_false: describe_operand(*if_false),
                    },
                    Instruction::Load { dst, src } => InstructionDto::Load {
                        dst: reg_name(*dst),
                        src: storage(*src),
                    },
                    Instruction::Store { dst, value } => InstructionDto::Store {
                        dst: storage(*dst),
                        value: describe_operand(*value),
                    },
                    Instruction::Call { dst, callee, args } => InstructionDto::Call {
                        dst: dst.map(reg_name),
                        callee: callee.clone(),
                        args: args.iter().copied().map(describe_operand).collect(),
                    },
                    Instruction::CheckSignature {
                        actual,
                        expected,
                        handler,
                    } => InstructionDto::Check {
                        actual: describe_operand(*actual),
                        expected: expected.get(),
                        handler: handler.clone(),
                    },
                })
                .collect();

            let terminator = match block.terminator()? {
                Terminator::Jump(target) => TerminatorDto::Jump {
                    target: label(*target),
                },
                Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                } => TerminatorDto::Branch {
                    cond: describe_operand(*cond),
                    then: label(*then_block),
                    otherwise: label(*else_block),
                },
                Terminator::Switch {
                    value,
                    cases,
                    default,
                } => TerminatorDto::Switch {
                    value: describe_operand(*value),
                    cases: cases
                        .iter()
                        .map(|(case, target)| (*case, label(*target)))
                        .collect(),
                    default: label(*default),
                },
                Terminator::Return(value) => TerminatorDto::Return {
                    value: value.map(describe_operand),
                },
                Terminator::Unreachable => TerminatorDto::Unreachable,
            };

            Some(BlockDto {
                label: block.label().to_string(),
                instructions,
                terminator,
            })
        })
        .collect();

    FunctionDto {
        name: function.name().to_string(),
        params: function.params(),
        slots: function
            .frame_slots()
            .iter()
            .map(|slot| SlotDto {
                name: slot.name.clone(),
                width: slot.width,
            })
            .collect(),
        blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: &str = r#"{
        "name": "demo",
        "globals": [{ "name": "calls", "init": 0 }],
        "functions": [{
            "name": "max",
            "params": 2,
            "blocks": [
                { "label": "entry",
                  "instructions": [
                      { "op": "binary", "operator": "gt", "dst": "v2", "lhs": "v0", "rhs": "v1" },
                      { "op": "load", "dst": "t0", "src": "@calls" },
                      { "op": "binary", "operator": "add", "dst": "t1", "lhs": "t0", "rhs": 1 },
                      { "op": "store", "dst": "@calls", "value": "t1" }
                  ],
                  "terminator": { "kind": "branch", "cond": "v2", "then": "left", "else": "right" } },
                { "label": "left", "terminator": { "kind": "return", "value": "v0" } },
                { "label": "right", "terminator": { "kind": "return", "value": "v1" } }
            ]
        }]
    }"#;

    #[test]
    fn test_parse_module() {
        let module = ModuleDto::from_json(MAX).unwrap().into_module().unwrap();
        let function = module.function("max").unwrap();
        assert_eq!(function.block_count(), 3);
        assert_eq!(function.var_count(), 3);
        assert_eq!(function.temp_count(), 2);
        assert_eq!(module.globals().len(), 1);
    }

    #[test]
    fn test_describe_is_stable() {
        let module = ModuleDto::from_json(MAX).unwrap().into_module().unwrap();
        let json = serde_json::to_string(&ModuleDto::from_module(&module)).unwrap();
        let again = ModuleDto::from_json(&json).unwrap().into_module().unwrap();
        assert_eq!(module, again);
    }

    #[test]
    fn test_unknown_label() {
        let text = r#"{ "name": "m", "functions": [{ "name": "f",
            "blocks": [{ "label": "entry", "terminator": { "kind": "jump", "target": "nowhere" } }] }] }"#;
        let error = ModuleDto::from_json(text).unwrap().into_module().unwrap_err();
        assert!(format!("{error:#}").contains("unknown block 'nowhere'"));
    }
}

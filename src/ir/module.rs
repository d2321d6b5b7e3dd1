//! Modules and global storage.

use std::{collections::HashSet, fmt};

use crate::{
    error::malformed_error,
    ir::{Function, Storage},
    Error, Result,
};

/// Index of a global inside its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub(crate) usize);

impl GlobalId {
    /// Creates a global ID from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        GlobalId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@g{}", self.0)
    }
}

/// Who owns a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalKind {
    /// Declared by the program.
    Program,
    /// Created by the instrumentation to hold a signature register.
    SignatureRegister,
}

/// A module-level storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    /// Symbol name, unique within the module.
    pub name: String,
    /// Owner of the global.
    pub kind: GlobalKind,
    /// Initial value.
    pub init: i64,
    /// Alignment in bytes.
    pub align: u32,
    /// Width in bits. Stores are truncated to this width.
    pub width: u32,
}

impl Global {
    /// Creates a zero-initialised 64-bit program global.
    #[must_use]
    pub fn program(name: impl Into<String>, init: i64) -> Self {
        Self {
            name: name.into(),
            kind: GlobalKind::Program,
            init,
            align: 8,
            width: 64,
        }
    }

    /// Creates a zero-initialised, 4-byte aligned, 32-bit signature register.
    #[must_use]
    pub fn signature_register(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: GlobalKind::SignatureRegister,
            init: 0,
            align: 4,
            width: 32,
        }
    }
}

/// A compilation unit: globals plus functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    name: String,
    globals: Vec<Global>,
    functions: Vec<Function>,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the globals in declaration order.
    #[must_use]
    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    /// Returns a global by ID.
    #[must_use]
    pub fn global(&self, id: GlobalId) -> Option<&Global> {
        self.globals.get(id.0)
    }

    /// Looks up a global by name.
    #[must_use]
    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|global| global.name == name)
            .map(GlobalId)
    }

    /// Adds a global.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if a global with the same name exists.
    pub fn add_global(&mut self, global: Global) -> Result<GlobalId> {
        if self.global_by_name(&global.name).is_some() {
            return Err(malformed_error!(
                "module '{}': global '{}' is declared twice",
                self.name,
                global.name
            ));
        }
        self.globals.push(global);
        Ok(GlobalId(self.globals.len() - 1))
    }

    /// Returns the signature register called `name`, creating it on first use.
    ///
    /// Calling this again for the same name returns the same global, so registers are
    /// created once per compilation unit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegisterConflict`] if the program already declares a global with
    /// that name.
    pub fn get_or_insert_register(&mut self, name: &str) -> Result<GlobalId> {
        match self.global_by_name(name) {
            Some(id) if self.globals[id.0].kind == GlobalKind::SignatureRegister => Ok(id),
            Some(_) => Err(Error::RegisterConflict(name.to_string())),
            None => self.add_global(Global::signature_register(name)),
        }
    }

    /// Returns the functions in declaration order.
    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Returns the functions for modification.
    pub fn functions_mut(&mut self) -> &mut [Function] {
        &mut self.functions
    }

    /// Looks up a function by name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name() == name)
    }

    /// Looks up a function by name for modification.
    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions
            .iter_mut()
            .find(|function| function.name() == name)
    }

    /// Adds a function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if a function with the same name exists.
    pub fn add_function(&mut self, function: Function) -> Result<()> {
        if self.function(function.name()).is_some() {
            return Err(malformed_error!(
                "module '{}': function '{}' is defined twice",
                self.name,
                function.name()
            ));
        }
        self.functions.push(function);
        Ok(())
    }

    /// Validates every function and every reference to global storage.
    ///
    /// # Errors
    ///
    /// Returns the first structural error found.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::with_capacity(self.globals.len());
        for global in &self.globals {
            if !names.insert(global.name.as_str()) {
                return Err(malformed_error!(
                    "module '{}': global '{}' is declared twice",
                    self.name,
                    global.name
                ));
            }
        }

        for function in &self.functions {
            function.validate()?;
            for block in function.blocks() {
                for instruction in block.instructions() {
                    for storage in instruction
                        .read_storage()
                        .into_iter()
                        .chain(instruction.written_storage())
                    {
                        if let Storage::Global(id) = storage {
                            if id.0 >= self.globals.len() {
                                return Err(malformed_error!(
                                    "function '{}': undefined global {}",
                                    function.name(),
                                    id
                                ));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for (index, global) in self.globals.iter().enumerate() {
            let kind = match global.kind {
                GlobalKind::Program => "global",
                GlobalKind::SignatureRegister => "signature",
            };
            writeln!(
                f,
                "{} = {} i{} \"{}\" = {}, align {}",
                GlobalId(index),
                kind,
                global.width,
                global.name,
                global.init,
                global.align
            )?;
        }
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{function}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_created_once() {
        let mut module = Module::new("m");
        let first = module.get_or_insert_register("G").unwrap();
        let second = module.get_or_insert_register("G").unwrap();
        assert_eq!(first, second);
        assert_eq!(module.globals().len(), 1);

        let global = module.global(first).unwrap();
        assert_eq!(global.width, 32);
        assert_eq!(global.align, 4);
        assert_eq!(global.init, 0);
    }

    #[test]
    fn test_register_conflicts_with_program_global() {
        let mut module = Module::new("m");
        module.add_global(Global::program("G", 7)).unwrap();
        assert!(matches!(
            module.get_or_insert_register("G"),
            Err(Error::RegisterConflict(name)) if name == "G"
        ));
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let mut module = Module::new("m");
        module.add_function(Function::new("f", 0)).unwrap();
        assert!(module.add_function(Function::new("f", 1)).is_err());
    }

    #[test]
    fn test_display_lists_globals() {
        let mut module = Module::new("m");
        module.add_global(Global::program("counter", 3)).unwrap();
        module.get_or_insert_register("D").unwrap();
        let text = module.to_string();
        assert!(text.contains("@g0 = global i64 \"counter\" = 3, align 8"));
        assert!(text.contains("@g1 = signature i32 \"D\" = 0, align 4"));
    }
}

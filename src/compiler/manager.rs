//! Running passes over a module.

use std::fmt;

use log::warn;
use rayon::prelude::*;

use crate::{compiler::FunctionPass, ir::Module, Error, Result};

/// What a pass did to one function.
#[derive(Debug)]
pub enum FunctionOutcome {
    /// The pass changed the function.
    Changed {
        /// Instruction count before the pass.
        before: usize,
        /// Instruction count after the pass.
        after: usize,
    },
    /// The pass ran but changed nothing.
    Unchanged,
    /// The pass declined to run on the function.
    Skipped,
    /// The pass failed; the function was left unchanged.
    Failed(Error),
}

/// The outcome of one pass on one function.
#[derive(Debug)]
pub struct FunctionRecord {
    /// Name of the pass.
    pub pass: &'static str,
    /// Name of the function.
    pub function: String,
    /// What happened.
    pub outcome: FunctionOutcome,
}

/// The outcome of running a [`PassManager`] over a module.
#[derive(Debug, Default)]
pub struct ModuleReport {
    /// One record per pass and function, in pass order then function order.
    pub records: Vec<FunctionRecord>,
}

impl ModuleReport {
    /// Returns the names of functions changed by any pass.
    pub fn changed(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|record| matches!(record.outcome, FunctionOutcome::Changed { .. }))
            .map(|record| record.function.as_str())
    }

    /// Returns the names of functions a pass declined to run on.
    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|record| matches!(record.outcome, FunctionOutcome::Skipped))
            .map(|record| record.function.as_str())
    }

    /// Returns the failed functions with their errors.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.records.iter().filter_map(|record| match &record.outcome {
            FunctionOutcome::Failed(error) => Some((record.function.as_str(), error)),
            _ => None,
        })
    }

    /// Returns `true` if any function failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}

impl fmt::Display for ModuleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            write!(f, "[{}] {}: ", record.pass, record.function)?;
            match &record.outcome {
                FunctionOutcome::Changed { before, after } => {
                    writeln!(f, "changed ({before} -> {after} instructions)")?;
                }
                FunctionOutcome::Unchanged => writeln!(f, "unchanged")?,
                FunctionOutcome::Skipped => writeln!(f, "skipped")?,
                FunctionOutcome::Failed(error) => writeln!(f, "failed: {error}")?,
            }
        }
        Ok(())
    }
}

/// Runs a sequence of [`FunctionPass`]es over every function of a module.
///
/// Passes run one after another. Within a pass, functions are processed in parallel:
/// they are independent, and anything they share was created by the sequential
/// [`FunctionPass::initialize`]. A failing function is recorded and left unchanged; the
/// remaining functions are still processed.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn FunctionPass>>,
}

impl PassManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pass.
    pub fn add_pass(&mut self, pass: Box<dyn FunctionPass>) {
        self.passes.push(pass);
    }

    /// Appends a pass (builder pattern).
    #[must_use]
    pub fn with_pass(mut self, pass: Box<dyn FunctionPass>) -> Self {
        self.passes.push(pass);
        self
    }

    /// Returns the number of passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns `true` if no pass was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs every pass over `module`.
    ///
    /// # Errors
    ///
    /// Returns an error only if a pass fails to initialize. Per-function failures are
    /// reported in the [`ModuleReport`].
    pub fn run(&mut self, module: &mut Module) -> Result<ModuleReport> {
        let mut report = ModuleReport::default();

        for pass in &mut self.passes {
            pass.initialize(module)?;

            let pass: &dyn FunctionPass = pass.as_ref();
            let records: Vec<FunctionRecord> = module
                .functions_mut()
                .par_iter_mut()
                .map(|function| {
                    let name = function.name().to_string();
                    if !pass.should_run(function) {
                        return FunctionRecord {
                            pass: pass.name(),
                            function: name,
                            outcome: FunctionOutcome::Skipped,
                        };
                    }

                    let before = function.instruction_count();
                    let outcome = match pass.run_on_function(function) {
                        Ok(true) => FunctionOutcome::Changed {
                            before,
                            after: function.instruction_count(),
                        },
                        Ok(false) => FunctionOutcome::Unchanged,
                        Err(error) => {
                            warn!("{} failed on {}: {}", pass.name(), name, error);
                            FunctionOutcome::Failed(error)
                        }
                    };
                    FunctionRecord {
                        pass: pass.name(),
                        function: name,
                        outcome,
                    }
                })
                .collect();

            report.records.extend(records);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, FunctionBuilder};

    struct Renumber;

    impl FunctionPass for Renumber {
        fn name(&self) -> &'static str {
            "renumber"
        }

        fn should_run(&self, function: &Function) -> bool {
            !function.is_declaration()
        }

        fn run_on_function(&self, function: &mut Function) -> Result<bool> {
            if function.name() == "broken" {
                return Err(Error::Error("cannot renumber".to_string()));
            }
            function.new_temp();
            Ok(false)
        }
    }

    fn module() -> Module {
        let mut module = Module::new("m");
        for name in ["a", "broken", "c"] {
            let mut b = FunctionBuilder::new(name, 0);
            let entry = b.block("entry");
            b.ret(entry, None);
            module.add_function(b.build().unwrap()).unwrap();
        }
        module.add_function(Function::new("extern", 0)).unwrap();
        module
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut module = module();
        let mut manager = PassManager::new().with_pass(Box::new(Renumber));
        let report = manager.run(&mut module).unwrap();

        assert_eq!(report.records.len(), 4);
        assert!(report.has_failures());
        assert_eq!(
            report.failed().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["broken"]
        );
        assert_eq!(report.skipped().collect::<Vec<_>>(), vec!["extern"]);
        assert_eq!(report.changed().count(), 0);
        assert!(report.to_string().contains("[renumber] broken: failed"));
    }

    #[test]
    fn test_records_follow_function_order() {
        let mut module = module();
        let mut manager = PassManager::new().with_pass(Box::new(Renumber));
        let report = manager.run(&mut module).unwrap();
        let names: Vec<&str> = report.records.iter().map(|r| r.function.as_str()).collect();
        assert_eq!(names, vec!["a", "broken", "c", "extern"]);
    }
}

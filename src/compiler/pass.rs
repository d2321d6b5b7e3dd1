//! Pass traits for IR transformations.

use crate::{
    ir::{Function, Module},
    Result,
};

/// A transformation that operates on one function at a time.
///
/// All passes must be thread-safe (Send + Sync) so the [`PassManager`] can run them over
/// the functions of a module in parallel. Passes get mutable access to the function they
/// transform and nothing else; anything shared between functions is set up in
/// [`FunctionPass::initialize`], which runs once, sequentially, before any function.
///
/// [`PassManager`]: crate::compiler::PassManager
pub trait FunctionPass: Send + Sync {
    /// Unique name for logging and reports.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Should this pass run on a specific function?
    ///
    /// Called before `run_on_function`. Override to skip functions that must stay
    /// untouched, such as declarations.
    fn should_run(&self, _function: &Function) -> bool {
        true
    }

    /// Called once per module before any function is processed.
    ///
    /// Use this to create module-level state, e.g. globals the pass writes to.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails; no function is processed in that case.
    fn initialize(&mut self, _module: &mut Module) -> Result<()> {
        Ok(())
    }

    /// Run the pass on a single function.
    ///
    /// Returns `true` if any changes were made, `false` otherwise. On error the function
    /// must be left as it was.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails to process the function.
    fn run_on_function(&self, function: &mut Function) -> Result<bool>;
}

//! The CFCSS function pass.

use log::{debug, info};

use crate::{
    analysis::ControlFlowGraph,
    compiler::FunctionPass,
    config::{CfcssConfig, RegisterScope},
    instrument::{Emitter, Planner, RegisterLayout, SignatureAssigner, SignatureTable},
    ir::{Function, Module, Storage},
    Error, Result,
};

/// Summary of one instrumented function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionReport {
    /// Function name.
    pub function: String,
    /// The signatures that were assigned.
    pub signatures: SignatureTable,
    /// Number of blocks with more than one predecessor (the entry counts when it has any).
    pub merge_blocks: usize,
    /// Number of edges that store an adjustment into `D`.
    pub edge_adjustments: usize,
    /// Number of instructions inserted.
    pub inserted: usize,
}

/// Control-flow checking by signatures.
///
/// Assigns every block a unique signature, plans the `G`/`D` updates and inserts them.
/// Instrumentation is computed on a copy of the function and only committed once every
/// step succeeded, so a failing function is left exactly as it was.
///
/// In [`RegisterScope::Global`] the two registers are module globals created by
/// [`FunctionPass::initialize`]; in [`RegisterScope::PerActivation`] every function gets
/// its own pair of frame slots.
///
/// # Examples
///
/// ```rust
/// use cfcss::compiler::FunctionPass;
/// use cfcss::config::CfcssConfig;
/// use cfcss::instrument::CfcssPass;
/// use cfcss::ir::{FunctionBuilder, Module};
///
/// let mut b = FunctionBuilder::new("main", 0);
/// let entry = b.block("entry");
/// b.ret(entry, None);
///
/// let mut module = Module::new("demo");
/// module.add_function(b.build()?)?;
///
/// let mut pass = CfcssPass::new(CfcssConfig::default());
/// pass.initialize(&mut module)?;
/// let function = module.function_mut("main").unwrap();
/// let report = pass.instrument(function)?;
/// assert_eq!(report.signatures.len(), 1);
/// # Ok::<(), cfcss::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct CfcssPass {
    config: CfcssConfig,
    globals: Option<RegisterLayout>,
}

impl CfcssPass {
    /// Creates the pass.
    #[must_use]
    pub fn new(config: CfcssConfig) -> Self {
        Self {
            config,
            globals: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CfcssConfig {
        &self.config
    }

    /// Returns the register globals, once [`FunctionPass::initialize`] created them.
    #[must_use]
    pub fn global_layout(&self) -> Option<RegisterLayout> {
        self.globals
    }

    /// Instruments one function.
    ///
    /// # Errors
    ///
    /// Returns an error, and leaves `function` unchanged, if the function is malformed, if
    /// signatures cannot be assigned, or if the register storage is missing or collides
    /// with program storage.
    pub fn instrument(&self, function: &mut Function) -> Result<FunctionReport> {
        function.validate()?;

        let mut work = function.clone();
        let layout = self.layout_for(&mut work)?;

        let (report, plan) = {
            let cfg = ControlFlowGraph::new(function)?;
            let table = SignatureAssigner::new(
                self.config.signature_order,
                self.config.first_signature,
            )
            .assign(&cfg)?;
            let plan = Planner::new(self.config.scope).plan(&cfg, &table)?;
            let report = FunctionReport {
                function: function.name().to_string(),
                signatures: table,
                merge_blocks: plan.merge_count(),
                edge_adjustments: plan.edges.len(),
                inserted: 0,
            };
            (report, plan)
        };

        let inserted = Emitter::new(layout, &self.config.fault_handler).emit(&mut work, &plan)?;
        work.validate()?;
        *function = work;

        info!(
            "instrumented {}: {} blocks, {} merge blocks, {} edge adjustments, {} instructions inserted",
            report.function,
            report.signatures.len(),
            report.merge_blocks,
            report.edge_adjustments,
            inserted
        );

        Ok(FunctionReport { inserted, ..report })
    }

    fn layout_for(&self, function: &mut Function) -> Result<RegisterLayout> {
        match self.config.scope {
            RegisterScope::Global => self.globals.ok_or_else(|| {
                Error::Error(format!(
                    "signature registers for '{}' were not created; initialize the pass first",
                    function.name()
                ))
            }),
            RegisterScope::PerActivation => {
                let running = &self.config.running_register;
                let adjusting = &self.config.adjusting_register;
                for name in [running, adjusting] {
                    if function.frame_slot(name).is_some() {
                        return Err(Error::RegisterConflict(name.clone()));
                    }
                }
                if running == adjusting {
                    return Err(Error::RegisterConflict(adjusting.clone()));
                }
                Ok(RegisterLayout {
                    running: Storage::Frame(function.get_or_insert_frame_slot(running, 32)),
                    adjusting: Storage::Frame(function.get_or_insert_frame_slot(adjusting, 32)),
                })
            }
        }
    }
}

impl FunctionPass for CfcssPass {
    fn name(&self) -> &'static str {
        "cfcss"
    }

    fn description(&self) -> &'static str {
        "Control-flow checking by signatures"
    }

    fn should_run(&self, function: &Function) -> bool {
        if function.is_declaration() {
            debug!("skipping declaration {}", function.name());
            return false;
        }
        !self.config.is_excluded(function.name())
    }

    fn initialize(&mut self, module: &mut Module) -> Result<()> {
        if self.config.scope != RegisterScope::Global {
            return Ok(());
        }
        if self.config.running_register == self.config.adjusting_register {
            return Err(Error::RegisterConflict(
                self.config.adjusting_register.clone(),
            ));
        }
        let running = module.get_or_insert_register(&self.config.running_register)?;
        let adjusting = module.get_or_insert_register(&self.config.adjusting_register)?;
        self.globals = Some(RegisterLayout {
            running: Storage::Global(running),
            adjusting: Storage::Global(adjusting),
        });
        Ok(())
    }

    fn run_on_function(&self, function: &mut Function) -> Result<bool> {
        self.instrument(function).map(|_| true)
    }
}

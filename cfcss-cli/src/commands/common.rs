use std::path::Path;

use anyhow::{anyhow, Context};
use cfcss::{
    compiler::{ModuleReport, PassManager},
    config::{CfcssConfig, RegisterScope, SignatureOrder},
    instrument::CfcssPass,
    ir::{Function, Module},
};

use crate::{app::PassOptions, input::ModuleDto};

/// Load a JSON module description.
pub fn load_module(path: &Path) -> anyhow::Result<Module> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read module: {}", path.display()))?;
    ModuleDto::from_json(&text)?
        .into_module()
        .with_context(|| format!("failed to load module: {}", path.display()))
}

/// Find a function with a body by name.
pub fn resolve_function<'m>(module: &'m Module, name: &str) -> anyhow::Result<&'m Function> {
    let function = module.function(name).ok_or_else(|| {
        let available: Vec<&str> = module.functions().iter().map(Function::name).collect();
        anyhow!(
            "function '{name}' not found; available: {}",
            available.join(", ")
        )
    })?;
    if function.is_declaration() {
        return Err(anyhow!("function '{name}' is a declaration without a body"));
    }
    Ok(function)
}

pub fn parse_order(order: &str) -> anyhow::Result<SignatureOrder> {
    order
        .parse()
        .map_err(|_| anyhow!("unknown signature order '{order}' (layout, reverse-postorder)"))
}

/// Build the pass configuration from command line options.
pub fn pass_config(opts: &PassOptions, max_steps: u64) -> anyhow::Result<CfcssConfig> {
    let scope: RegisterScope = opts
        .scope
        .parse()
        .map_err(|_| anyhow!("unknown scope '{}' (global, per-activation)", opts.scope))?;

    let mut config = CfcssConfig::default()
        .with_scope(scope)
        .with_signature_order(parse_order(&opts.order)?)
        .with_first_signature(opts.first_signature)
        .with_fault_handler(opts.handler.clone())
        .with_max_steps(max_steps);
    for name in &opts.skip {
        config = config.with_skip(name.clone());
    }
    Ok(config)
}

/// Instrument every function of `module` in place.
pub fn instrument_module(module: &mut Module, config: CfcssConfig) -> anyhow::Result<ModuleReport> {
    let mut manager = PassManager::new().with_pass(Box::new(CfcssPass::new(config)));
    manager
        .run(module)
        .context("failed to initialize the instrumentation")
}

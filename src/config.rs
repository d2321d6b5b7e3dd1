//! Configuration for the CFCSS pass and the interpreter.
//!
//! All knobs live in one [`CfcssConfig`]. The enums parse from and print as kebab-case
//! strings so that command line front ends can accept them directly.

use strum::{Display, EnumString};

/// Where the running signature `G` and the adjusting signature `D` are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum RegisterScope {
    /// Two module globals shared by every function and every activation.
    ///
    /// Calls made by instrumented code save and restore `G` around the callee. Sound for
    /// single-threaded programs only.
    #[default]
    Global,
    /// Two frame slots of each instrumented function, zeroed on every activation.
    PerActivation,
}

/// The traversal used to hand out signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum SignatureOrder {
    /// Block layout order.
    #[default]
    Layout,
    /// Reverse postorder from the entry, then unreachable blocks in layout order.
    ReversePostorder,
}

/// Configuration for CFCSS instrumentation and execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfcssConfig {
    /// Storage placement of the signature registers (default: [`RegisterScope::Global`]).
    pub scope: RegisterScope,

    /// Name of the running-signature register (default: `G`).
    pub running_register: String,

    /// Name of the adjusting-signature register (default: `D`).
    pub adjusting_register: String,

    /// Symbol invoked when a signature check fails (default: `__ctt_error`).
    ///
    /// A function with this name is never instrumented.
    pub fault_handler: String,

    /// Functions that are left uninstrumented.
    pub skip: Vec<String>,

    /// Traversal used to assign signatures (default: [`SignatureOrder::Layout`]).
    pub signature_order: SignatureOrder,

    /// Signature of the first block in traversal order (default: 1). Must not be 0.
    pub first_signature: u32,

    /// Maximum number of instructions the interpreter executes (default: 1,000,000), applied
    /// by [`Interpreter::with_config`](crate::emulation::Interpreter::with_config).
    pub max_steps: u64,
}

impl Default for CfcssConfig {
    fn default() -> Self {
        Self {
            scope: RegisterScope::Global,
            running_register: "G".to_string(),
            adjusting_register: "D".to_string(),
            fault_handler: "__ctt_error".to_string(),
            skip: Vec::new(),
            signature_order: SignatureOrder::Layout,
            first_signature: 1,
            max_steps: 1_000_000,
        }
    }
}

impl CfcssConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the register scope.
    #[must_use]
    pub fn with_scope(mut self, scope: RegisterScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the names of the running and adjusting registers.
    #[must_use]
    pub fn with_register_names(
        mut self,
        running: impl Into<String>,
        adjusting: impl Into<String>,
    ) -> Self {
        self.running_register = running.into();
        self.adjusting_register = adjusting.into();
        self
    }

    /// Sets the fault handler symbol.
    #[must_use]
    pub fn with_fault_handler(mut self, handler: impl Into<String>) -> Self {
        self.fault_handler = handler.into();
        self
    }

    /// Adds a function to the skip list.
    #[must_use]
    pub fn with_skip(mut self, function: impl Into<String>) -> Self {
        self.skip.push(function.into());
        self
    }

    /// Sets the signature traversal order.
    #[must_use]
    pub fn with_signature_order(mut self, order: SignatureOrder) -> Self {
        self.signature_order = order;
        self
    }

    /// Sets the first signature handed out.
    #[must_use]
    pub fn with_first_signature(mut self, first: u32) -> Self {
        self.first_signature = first;
        self
    }

    /// Sets the interpreter step limit.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Returns `true` if `function` must not be instrumented: it is the fault handler or it
    /// appears in the skip list.
    #[must_use]
    pub fn is_excluded(&self, function: &str) -> bool {
        function == self.fault_handler || self.skip.iter().any(|name| name == function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CfcssConfig::default();
        assert_eq!(config.scope, RegisterScope::Global);
        assert_eq!(config.running_register, "G");
        assert_eq!(config.adjusting_register, "D");
        assert_eq!(config.fault_handler, "__ctt_error");
        assert_eq!(config.first_signature, 1);
        assert_eq!(config.signature_order, SignatureOrder::Layout);
    }

    #[test]
    fn test_enum_strings() {
        assert_eq!(RegisterScope::PerActivation.to_string(), "per-activation");
        assert_eq!(
            "reverse-postorder".parse::<SignatureOrder>().unwrap(),
            SignatureOrder::ReversePostorder
        );
        assert!("stack".parse::<RegisterScope>().is_err());
    }

    #[test]
    fn test_exclusions() {
        let config = CfcssConfig::new()
            .with_fault_handler("on_fault")
            .with_skip("init");
        assert!(config.is_excluded("on_fault"));
        assert!(config.is_excluded("init"));
        assert!(!config.is_excluded("main"));
        assert!(!config.is_excluded("__ctt_error"));
    }
}

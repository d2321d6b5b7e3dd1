// Copyright 2025 The cfcss Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cfcss
//!
//! Control-Flow Checking by Signatures: a compiler pass that instruments the basic blocks
//! of a function so that illegal jumps are detected at runtime.
//!
//! Every block gets a unique compile-time signature. At runtime a running signature `G`
//! is updated on entry to each block with an `XOR` that turns the signature of a legal
//! predecessor into the signature of the block, and compared against the expected value.
//! Blocks with several predecessors use a second register, the adjusting signature `D`,
//! which each non-reference predecessor sets on its way out. A jump that bypasses those
//! updates leaves `G` wrong and the check traps to the fault handler.
//!
//! ## Features
//!
//! - **Small three-address IR** - Modules, globals, functions, blocks and a builder
//! - **CFG view** - Arena graph with ordered predecessors, traversal orders and DOT export
//! - **Deterministic instrumentation** - Same function in, same instrumented function out
//! - **Register scopes** - Module globals, or per-activation frame slots for recursive code
//! - **Parallel pass manager** - Functions are instrumented independently with `rayon`
//! - **Interpreter with fault injection** - Observe detection of corrupted jumps
//!
//! ## Quick Start
//!
//! ```rust
//! use cfcss::prelude::*;
//!
//! let mut b = FunctionBuilder::new("max", 2);
//! let entry = b.block("entry");
//! let left = b.block("left");
//! let right = b.block("right");
//! let join = b.block("join");
//! let (x, y, r) = (b.param(0), b.param(1), b.var());
//! let cond = b.binary(entry, BinaryOp::Gt, x, y);
//! b.branch(entry, cond, left, right);
//! b.copy(left, r, x);
//! b.jump(left, join);
//! b.copy(right, r, y);
//! b.jump(right, join);
//! b.ret(join, Some(r.into()));
//!
//! let mut module = Module::new("demo");
//! module.add_function(b.build()?)?;
//!
//! let mut manager = PassManager::new().with_pass(Box::new(CfcssPass::new(CfcssConfig::default())));
//! let report = manager.run(&mut module)?;
//! assert!(!report.has_failures());
//!
//! let mut interpreter = Interpreter::new(&module);
//! assert_eq!(interpreter.run("max", &[3, 8])?, ExecutionOutcome::Returned(Some(8)));
//!
//! // Jump straight from the entry into the join block, skipping both arms.
//! let mut interpreter =
//!     Interpreter::new(&module).with_fault(JumpFault::new("max", entry, join));
//! assert!(interpreter.run("max", &[3, 8])?.is_faulted());
//! # Ok::<(), cfcss::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - The host IR the pass decorates
//! - [`analysis`] - Control-flow graphs and function statistics
//! - [`instrument`] - Signature assignment, planning, emission and the CFCSS pass
//! - [`compiler`] - The pass interface and the pass manager
//! - [`emulation`] - The interpreter used to observe instrumented code
//! - [`config`] - Pass configuration

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cfcss::prelude::*;
///
/// let pass = CfcssPass::new(CfcssConfig::default().with_scope(RegisterScope::PerActivation));
/// assert_eq!(pass.name(), "cfcss");
/// ```
pub mod prelude;

/// Control-flow graphs and function statistics.
pub mod analysis;

/// Pass interface and pass manager.
pub mod compiler;

/// Configuration of the CFCSS pass.
pub mod config;

/// Interpreter for IR modules, with fault injection.
pub mod emulation;

/// The CFCSS instrumentation.
pub mod instrument;

/// The intermediate representation instrumented by this crate.
pub mod ir;

/// Graph substrate and small helpers.
pub mod utils;

/// `cfcss` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cfcss` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use cfcss::{ir::FunctionBuilder, Error};
///
/// let mut b = FunctionBuilder::new("open", 0);
/// b.block("entry");
/// match b.build() {
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {message}"),
///     Err(e) => println!("Error: {e}"),
///     Ok(_) => unreachable!(),
/// }
/// ```
pub use error::Error;

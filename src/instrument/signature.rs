//! Block signatures and their assignment.

use std::{collections::HashMap, fmt, num::NonZeroU32};

use log::debug;

use crate::{
    analysis::ControlFlowGraph,
    config::SignatureOrder,
    error::malformed_error,
    ir::{BlockId, Function},
    Error, Result,
};

/// The compile-time signature of a basic block.
///
/// Signatures are never zero. Zero stands for "no signature" and is the signature of the
/// virtual predecessor that models the call into a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(NonZeroU32);

impl Signature {
    /// Creates a signature, or returns `None` for the reserved value 0.
    ///
    /// ```rust
    /// use cfcss::instrument::Signature;
    ///
    /// assert_eq!(Signature::new(7).map(Signature::get), Some(7));
    /// assert!(Signature::new(0).is_none());
    /// ```
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        match NonZeroU32::new(value) {
            Some(value) => Some(Signature(value)),
            None => None,
        }
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The signatures of every block of one function, indexed by block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureTable {
    signatures: Vec<Signature>,
}

impl SignatureTable {
    /// Builds a table from externally supplied raw values, one per block in layout order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if a value is 0 and [`Error::DuplicateSignature`] if two
    /// blocks share a value.
    pub fn from_assignments(values: &[u32]) -> Result<Self> {
        let signatures = values
            .iter()
            .enumerate()
            .map(|(block, &value)| {
                Signature::new(value).ok_or_else(|| {
                    malformed_error!("block {} was assigned the reserved signature 0", block)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let table = Self { signatures };
        table.check_unique()?;
        Ok(table)
    }

    /// Returns the signature of `block`.
    #[must_use]
    pub fn get(&self, block: BlockId) -> Option<Signature> {
        self.signatures.get(block.index()).copied()
    }

    /// Returns the number of blocks covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Returns `true` if the table covers no block.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Returns `(block, signature)` pairs in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, Signature)> + '_ {
        self.signatures
            .iter()
            .enumerate()
            .map(|(index, signature)| (BlockId::new(index), *signature))
    }

    /// Checks that the table fits `function`: one signature per block, all distinct.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] on a length mismatch and [`Error::DuplicateSignature`]
    /// if two blocks share a signature.
    pub fn validate(&self, function: &Function) -> Result<()> {
        if self.signatures.len() != function.block_count() {
            return Err(malformed_error!(
                "signature table covers {} blocks but '{}' has {}",
                self.signatures.len(),
                function.name(),
                function.block_count()
            ));
        }
        self.check_unique()
    }

    fn check_unique(&self) -> Result<()> {
        let mut seen: HashMap<Signature, usize> = HashMap::with_capacity(self.signatures.len());
        for (block, signature) in self.signatures.iter().enumerate() {
            if let Some(first) = seen.insert(*signature, block) {
                return Err(Error::DuplicateSignature {
                    signature: *signature,
                    first,
                    second: block,
                });
            }
        }
        Ok(())
    }
}

/// Hands out consecutive signatures in a deterministic traversal order.
#[derive(Debug, Clone, Copy)]
pub struct SignatureAssigner {
    order: SignatureOrder,
    first: u32,
}

impl Default for SignatureAssigner {
    fn default() -> Self {
        Self::new(SignatureOrder::Layout, 1)
    }
}

impl SignatureAssigner {
    /// Creates an assigner that starts at `first` and walks blocks in `order`.
    #[must_use]
    pub const fn new(order: SignatureOrder, first: u32) -> Self {
        Self { order, first }
    }

    /// Assigns a signature to every block of the function behind `cfg`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignatureSpace`] if `first` is 0 or the last signature would not fit
    /// in 32 bits.
    pub fn assign(&self, cfg: &ControlFlowGraph<'_>) -> Result<SignatureTable> {
        let blocks = cfg.block_count();
        let space = Error::SignatureSpace {
            first: self.first,
            blocks,
        };
        if self.first == 0 {
            return Err(space);
        }
        let last_offset = u32::try_from(blocks.saturating_sub(1)).map_err(|_| space)?;
        if self.first.checked_add(last_offset).is_none() {
            return Err(Error::SignatureSpace {
                first: self.first,
                blocks,
            });
        }

        let order: Vec<BlockId> = match self.order {
            SignatureOrder::Layout => cfg.node_ids().map(BlockId::from).collect(),
            SignatureOrder::ReversePostorder => {
                let mut order: Vec<BlockId> =
                    cfg.reverse_postorder().into_iter().map(BlockId::from).collect();
                let mut placed = vec![false; blocks];
                for block in &order {
                    placed[block.index()] = true;
                }
                order.extend(
                    (0..blocks)
                        .filter(|index| !placed[*index])
                        .map(BlockId::new),
                );
                order
            }
        };

        let mut values = vec![0u32; blocks];
        for (offset, block) in (0..=last_offset).zip(order) {
            values[block.index()] = self.first + offset;
        }

        let table = SignatureTable::from_assignments(&values)?;
        debug!(
            "{}: assigned signatures {}..={} in {} order",
            cfg.function().name(),
            self.first,
            self.first + last_offset,
            self.order
        );
        Ok(table)
    }

    /// Assigns signatures to a function, building its CFG first.
    ///
    /// A declaration has no blocks and gets an empty table.
    ///
    /// # Errors
    ///
    /// See [`SignatureAssigner::assign`].
    pub fn assign_function(&self, function: &Function) -> Result<SignatureTable> {
        if function.is_declaration() {
            return Ok(SignatureTable::default());
        }
        let cfg = ControlFlowGraph::new(function)?;
        self.assign(&cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    fn back_edge_layout() -> Function {
        // 0 -> 2 -> 1 -> 3, block 4 unreachable
        let mut b = FunctionBuilder::new("f", 0);
        let b0 = b.block("b0");
        let b1 = b.block("b1");
        let b2 = b.block("b2");
        let b3 = b.block("b3");
        let b4 = b.block("b4");
        b.jump(b0, b2);
        b.jump(b2, b1);
        b.jump(b1, b3);
        b.ret(b3, None);
        b.ret(b4, None);
        b.build().unwrap()
    }

    fn values(table: &SignatureTable) -> Vec<u32> {
        table.iter().map(|(_, s)| s.get()).collect()
    }

    #[test]
    fn test_layout_order() {
        let function = back_edge_layout();
        let table = SignatureAssigner::default()
            .assign_function(&function)
            .unwrap();
        assert_eq!(values(&table), vec![1, 2, 3, 4, 5]);
        assert!(table.validate(&function).is_ok());
    }

    #[test]
    fn test_reverse_postorder_appends_unreachable() {
        let function = back_edge_layout();
        let table = SignatureAssigner::new(SignatureOrder::ReversePostorder, 10)
            .assign_function(&function)
            .unwrap();
        // RPO is b0, b2, b1, b3; b4 comes last.
        assert_eq!(values(&table), vec![10, 12, 11, 13, 14]);
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let function = back_edge_layout();
        let assigner = SignatureAssigner::new(SignatureOrder::ReversePostorder, 1);
        assert_eq!(
            assigner.assign_function(&function).unwrap(),
            assigner.assign_function(&function).unwrap()
        );
    }

    #[test]
    fn test_signature_space() {
        let function = back_edge_layout();
        assert!(matches!(
            SignatureAssigner::new(SignatureOrder::Layout, 0).assign_function(&function),
            Err(Error::SignatureSpace { first: 0, .. })
        ));
        assert!(matches!(
            SignatureAssigner::new(SignatureOrder::Layout, u32::MAX - 3).assign_function(&function),
            Err(Error::SignatureSpace { blocks: 5, .. })
        ));
        assert!(SignatureAssigner::new(SignatureOrder::Layout, u32::MAX - 4)
            .assign_function(&function)
            .is_ok());
    }

    #[test]
    fn test_declaration_gets_empty_table() {
        let function = Function::new("extern", 1);
        let table = SignatureAssigner::default()
            .assign_function(&function)
            .unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_from_assignments_rejects_bad_tables() {
        assert!(matches!(
            SignatureTable::from_assignments(&[3, 0]),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            SignatureTable::from_assignments(&[3, 5, 3]),
            Err(Error::DuplicateSignature {
                first: 0,
                second: 2,
                ..
            })
        ));

        let function = back_edge_layout();
        let short = SignatureTable::from_assignments(&[1, 2]).unwrap();
        assert!(short.validate(&function).is_err());
    }
}

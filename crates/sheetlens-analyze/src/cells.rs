//! The frozen cell table: one record per addressable cell, with interned
//! ids used as graph node handles.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use sheetlens_common::{CellAddress, LiteralValue};

/// Index into [`CellTable::nodes`]. Stable for the lifetime of one run.
pub type NodeId = u32;

bitflags! {
    /// Per-cell attribute bits; the single source of truth for node state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CellFlags: u8 {
        const HAS_FORMULA = 1 << 0;
        const IS_INPUT    = 1 << 1;
        const IS_OUTPUT   = 1 << 2;
        const HAS_ERROR   = 1 << 3;
    }
}

/// One cell record. Implicit nodes (referenced but never populated) have
/// `value = None`, `formula = None` and empty flags.
#[derive(Debug, Clone)]
pub struct CellInfo {
    pub address: CellAddress,
    pub value: Option<LiteralValue>,
    pub formula: Option<String>,
    pub flags: CellFlags,
}

impl CellInfo {
    pub fn has_formula(&self) -> bool {
        self.flags.contains(CellFlags::HAS_FORMULA)
    }

    pub fn is_input(&self) -> bool {
        self.flags.contains(CellFlags::IS_INPUT)
    }

    pub fn is_output(&self) -> bool {
        self.flags.contains(CellFlags::IS_OUTPUT)
    }

    pub fn has_error(&self) -> bool {
        self.flags.contains(CellFlags::HAS_ERROR)
    }
}

/// Cell records plus the address → id index. Populated cells are inserted
/// first (in reader order); implicit nodes are appended while edges are
/// built. Frozen once the graph is assembled.
#[derive(Debug, Default)]
pub struct CellTable {
    nodes: Vec<CellInfo>,
    index: FxHashMap<CellAddress, NodeId>,
}

impl CellTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a populated cell as reported by the reader. Derives
    /// `HAS_FORMULA`, `IS_INPUT` and `HAS_ERROR`; `IS_OUTPUT` is assigned
    /// after edge construction.
    pub fn insert_populated(
        &mut self,
        address: CellAddress,
        value: Option<LiteralValue>,
        formula: Option<String>,
    ) -> NodeId {
        let formula = formula.filter(|f| !f.is_empty());
        let mut flags = CellFlags::empty();
        if formula.is_some() {
            flags |= CellFlags::HAS_FORMULA;
        } else if value.as_ref().is_some_and(|v| !matches!(v, LiteralValue::Empty)) {
            flags |= CellFlags::IS_INPUT;
        }
        if value.as_ref().is_some_and(|v| v.is_error()) {
            flags |= CellFlags::HAS_ERROR;
        }
        match self.index.get(&address) {
            Some(&id) => {
                let node = &mut self.nodes[id as usize];
                node.value = value;
                node.formula = formula;
                node.flags = flags;
                id
            }
            None => {
                let id = self.nodes.len() as NodeId;
                self.index.insert(address.clone(), id);
                self.nodes.push(CellInfo { address, value, formula, flags });
                id
            }
        }
    }

    /// Look up or create a node for `address`. New nodes are implicit: all
    /// flags clear, no value, no formula.
    pub fn intern(&mut self, address: &CellAddress) -> NodeId {
        if let Some(&id) = self.index.get(address) {
            return id;
        }
        let id = self.nodes.len() as NodeId;
        self.index.insert(address.clone(), id);
        self.nodes.push(CellInfo {
            address: address.clone(),
            value: None,
            formula: None,
            flags: CellFlags::empty(),
        });
        id
    }

    pub fn lookup(&self, address: &CellAddress) -> Option<NodeId> {
        self.index.get(address).copied()
    }

    pub fn get(&self, id: NodeId) -> &CellInfo {
        &self.nodes[id as usize]
    }

    pub fn set_flag(&mut self, id: NodeId, flag: CellFlags, on: bool) {
        self.nodes[id as usize].flags.set(flag, on);
    }

    /// True for nodes created by [`intern`](Self::intern) that were never
    /// populated by the reader.
    pub fn is_implicit(&self, id: NodeId) -> bool {
        let node = self.get(id);
        node.flags.is_empty() && node.value.is_none() && node.formula.is_none()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &CellInfo)> {
        self.nodes.iter().enumerate().map(|(i, c)| (i as NodeId, c))
    }

    /// Constant literal held at `address`, if any. The resolver reads this
    /// map after phase 1, when it is immutable.
    pub fn constant_value(&self, address: &CellAddress) -> Option<&LiteralValue> {
        let id = self.lookup(address)?;
        let node = self.get(id);
        if node.has_formula() {
            return None;
        }
        node.value.as_ref().filter(|v| v.is_constant())
    }
}

//! Lifecycle state of an index.

use std::fmt;

use crate::forest::{ForestSource, ForestView};
use crate::persistence::ForestBacking;
use crate::store::VectorStore;

/// Observable lifecycle state.
///
/// ```text
///            add_item
///           ┌────────┐
///           ▼        │
///        Unbuilt ────┘
///           │ build                 load
///           ▼                 ┌──────────────┐
///         Built ── save ──▶ MemoryMapped ◀──┘
///           │                 │
///           └─── unload ──▶ Unloaded ◀── unload
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexState {
    /// Accepting items; no forest yet.
    Unbuilt,
    /// Forest built (or loaded into memory); queries allowed.
    Built,
    /// Forest backed by a mapped file; queries allowed.
    MemoryMapped,
    /// Resources released; only `load` is allowed.
    Unloaded,
}

impl IndexState {
    /// Whether queries may run in this state.
    pub fn is_queryable(self) -> bool {
        matches!(self, IndexState::Built | IndexState::MemoryMapped)
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexState::Unbuilt => "unbuilt",
            IndexState::Built => "built",
            IndexState::MemoryMapped => "memory-mapped",
            IndexState::Unloaded => "unloaded",
        };
        f.write_str(name)
    }
}

/// Resources held in each state.
#[derive(Debug)]
pub(crate) enum Stage {
    Unbuilt(VectorStore),
    Built(ForestBacking),
    Mapped(ForestBacking),
    Unloaded,
}

impl Stage {
    pub(crate) fn state(&self) -> IndexState {
        match self {
            Stage::Unbuilt(_) => IndexState::Unbuilt,
            Stage::Built(_) => IndexState::Built,
            Stage::Mapped(_) => IndexState::MemoryMapped,
            Stage::Unloaded => IndexState::Unloaded,
        }
    }

    /// Forest view when the state allows queries.
    pub(crate) fn view(&self) -> Option<ForestView<'_>> {
        match self {
            Stage::Built(forest) | Stage::Mapped(forest) => Some(forest.view()),
            Stage::Unbuilt(_) | Stage::Unloaded => None,
        }
    }
}

//! Per-node value accessors.

use std::fmt;

use crate::InputNode;

/// A value that is either constant or computed per node.
///
/// Computed accessors are plain function pointers evaluated once whenever
/// the derived buffer is rebuilt; nothing captures caller state long-term.
#[derive(Clone, Copy)]
pub enum Accessor<T: Copy> {
    Constant(T),
    /// Called with the node and its input index.
    PerNode(fn(&InputNode, usize) -> T),
}

impl<T: Copy> Accessor<T> {
    pub fn resolve(&self, node: &InputNode, input_index: usize) -> T {
        match self {
            Accessor::Constant(value) => *value,
            Accessor::PerNode(f) => f(node, input_index),
        }
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Accessor::PerNode(_) => f.write_str("PerNode(..)"),
        }
    }
}

impl<T: Copy> From<T> for Accessor<T> {
    fn from(value: T) -> Self {
        Accessor::Constant(value)
    }
}

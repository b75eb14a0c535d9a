//! Inheritable configuration tree used by presenter definitions.

mod tree;

pub use tree::{AppendList, ConfigNode, ResolvedEntry};

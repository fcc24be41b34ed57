//! Common definitions that are shared between different parts of the
//! allocator.

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers (register names).
pub type Id = internment::Intern<String>;

//! Evaluation: runtime context, the tree-walking evaluator and the built-in library.

pub(crate) mod comparison;
pub mod evaluator;
pub mod functions;
pub(crate) mod numeric;
pub(crate) mod render;
pub mod runtime;

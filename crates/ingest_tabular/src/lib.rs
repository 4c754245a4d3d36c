//! Tabular cell type inference.
//!
//! [`TypeGuesser`] maps one raw cell string to an ordered list of candidate
//! `(type, format)` pairs; [`TypeResolver`] reduces a column's candidate
//! lists to a single winning pair. Both are deterministic: the same input
//! always yields the same result, with no locale or environment influence.

pub mod guess;
pub mod resolve;

pub use guess::{Candidate, CellType, TypeGuesser};
pub use resolve::{ResolvedType, TypeResolver};

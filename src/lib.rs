//! Compiles a BNF-like grammar DSL into a compact, flattened rule table for
//! a constrained-decoding sampler, and renders compiled tables back into
//! canonical grammar text.
//!
//! ```
//! let grammar = gbnf::compile("root ::= [0-9]+").unwrap();
//! let flat = grammar.to_flat();
//! assert_eq!(flat.root, 0);
//! ```
//!
//! Compilation is synchronous and allocates fresh state per call; the
//! resulting [`Grammar`] is immutable and can be shared freely across
//! generation threads.

mod grammar;
mod parser;
pub mod report;
mod serializer;

pub use crate::grammar::{
  Element, ElementType, FlatElement, FlatGrammar, Grammar, Rule, RuleId, SymbolTable,
};
pub use crate::parser::{ParseError, ParseErrorKind};
pub use crate::serializer::{serialize, SerializeError, SerializeErrorKind};

use std::path::Path;

use thiserror::Error;

#[cfg(not(debug_assertions))]
pub(crate) type Map<K, V> = fnv::FnvHashMap<K, V>;

#[cfg(debug_assertions)]
pub(crate) type Map<K, V> = indexmap::IndexMap<K, V, fnv::FnvBuildHasher>;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Parse(#[from] ParseError),
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Compiles grammar source into a rule table. All-or-nothing: any parse
/// error aborts the whole compilation.
pub fn compile(src: &str) -> Result<Grammar, Error> {
  let grammar = parser::parse(src)?;
  Ok(grammar)
}

/// Reads a whole grammar file and compiles it.
pub fn compile_file(path: impl AsRef<Path>) -> Result<Grammar, Error> {
  let src = std::fs::read_to_string(path)?;
  compile(&src)
}

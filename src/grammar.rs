use fnv::FnvBuildHasher;
use indexmap::IndexSet;

/// Dense id of a rule. Ids start at 0 and are assigned in first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u32);

impl RuleId {
  pub(crate) fn new(index: usize) -> Self {
    RuleId(index as u32)
  }

  pub fn id(&self) -> u32 {
    self.0
  }

  pub fn index(&self) -> usize {
    self.0 as usize
  }
}

/// Wire-level element tag, as consumed by the sampler boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
  End,
  Alt,
  RuleRef,
  Char,
  CharNot,
  CharRngUpper,
  CharAlt,
}

/// One unit of a compiled rule body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
  /// match a single literal code point
  Char(u32),
  /// match any code point except this one; only valid as the first
  /// element of a negated char class
  CharNot(u32),
  /// an additional alternative within the current char class
  CharAlt(u32),
  /// closes a range whose lower bound is the preceding char element
  CharRngUpper(u32),
  RuleRef(RuleId),
  /// separator between alternative sequences of one rule
  Alt,
  /// terminal marker, last element of every rule body
  End,
}

impl Element {
  /// true for the four char-class-forming variants.
  pub fn is_char_element(&self) -> bool {
    matches!(
      self,
      Element::Char(_) | Element::CharNot(_) | Element::CharAlt(_) | Element::CharRngUpper(_)
    )
  }

  pub fn ty(&self) -> ElementType {
    match self {
      Element::Char(_) => ElementType::Char,
      Element::CharNot(_) => ElementType::CharNot,
      Element::CharAlt(_) => ElementType::CharAlt,
      Element::CharRngUpper(_) => ElementType::CharRngUpper,
      Element::RuleRef(_) => ElementType::RuleRef,
      Element::Alt => ElementType::Alt,
      Element::End => ElementType::End,
    }
  }

  /// code point for char elements, rule id for references, 0 otherwise.
  pub fn value(&self) -> u32 {
    match self {
      Element::Char(c)
      | Element::CharNot(c)
      | Element::CharAlt(c)
      | Element::CharRngUpper(c) => *c,
      Element::RuleRef(id) => id.id(),
      Element::Alt | Element::End => 0,
    }
  }
}

pub type Rule = Vec<Element>;

/// Maps rule names to dense ids, assigned in insertion order.
/// Append-only for the duration of one compilation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SymbolTable {
  names: IndexSet<String, FnvBuildHasher>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// First occurrence claims the next dense id; repeated lookups are
  /// idempotent.
  pub fn get_or_create(&mut self, name: &str) -> RuleId {
    if let Some(index) = self.names.get_index_of(name) {
      return RuleId::new(index);
    }
    let (index, _) = self.names.insert_full(name.to_owned());
    RuleId::new(index)
  }

  /// Allocates an id for a compiler-synthesized sub-rule, named
  /// `<base>_<id>` so generated rules stay unique and debuggable.
  pub fn generate(&mut self, base: &str) -> RuleId {
    let name = format!("{}_{}", base, self.names.len());
    let (index, inserted) = self.names.insert_full(name);
    debug_assert!(inserted);
    RuleId::new(index)
  }

  pub fn get(&self, name: &str) -> Option<RuleId> {
    self.names.get_index_of(name).map(RuleId::new)
  }

  pub fn name(&self, id: RuleId) -> Option<&str> {
    self.names.get_index(id.index()).map(|s| s.as_str())
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

/// A compiled grammar: the id-indexed rule table plus its symbol table and
/// the id of the `root` rule. Immutable once compilation returns; safe to
/// share read-only across generation threads.
#[derive(Debug, PartialEq, Eq)]
pub struct Grammar {
  rules: Vec<Rule>,
  symbols: SymbolTable,
  root: RuleId,
}

impl Grammar {
  pub(crate) fn new(rules: Vec<Rule>, symbols: SymbolTable, root: RuleId) -> Self {
    Self {
      rules,
      symbols,
      root,
    }
  }

  pub fn root(&self) -> RuleId {
    self.root
  }

  pub fn rule(&self, id: RuleId) -> Option<&[Element]> {
    self.rules.get(id.index()).map(|r| r.as_slice())
  }

  pub fn rules(&self) -> impl Iterator<Item = (RuleId, &[Element])> {
    self.rules.iter().enumerate().map(|(index, rule)| {
      (RuleId::new(index), rule.as_slice())
    })
  }

  pub fn name(&self, id: RuleId) -> Option<&str> {
    self.symbols.name(id)
  }

  pub fn symbols(&self) -> &SymbolTable {
    &self.symbols
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  /// Flattens the rule table into one contiguous element buffer for the
  /// native sampler boundary. Rule `r` spans
  /// `elements[rule_offsets[r]..rule_offsets[r + 1]]`.
  pub fn to_flat(&self) -> FlatGrammar {
    let mut elements = Vec::new();
    let mut rule_offsets = Vec::with_capacity(self.rules.len() + 1);

    for rule in &self.rules {
      rule_offsets.push(elements.len() as u32);
      elements.extend(rule.iter().map(|elem| FlatElement {
        ty: elem.ty(),
        value: elem.value(),
      }));
    }
    rule_offsets.push(elements.len() as u32);

    FlatGrammar {
      elements,
      rule_offsets,
      root: self.root.id(),
    }
  }
}

/// `(type, value)` pair in the flattened export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatElement {
  pub ty: ElementType,
  pub value: u32,
}

/// Flattened rule table: all rule bodies back to back in `elements`,
/// delimited by `rule_offsets`.
#[derive(Debug, PartialEq, Eq)]
pub struct FlatGrammar {
  pub elements: Vec<FlatElement>,
  pub rule_offsets: Vec<u32>,
  pub root: u32,
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn symbol_ids_are_dense_and_idempotent() {
    let mut symbols = SymbolTable::new();

    let root = symbols.get_or_create("root");
    let expr = symbols.get_or_create("expr");
    assert_eq!(root, RuleId::new(0));
    assert_eq!(expr, RuleId::new(1));
    assert_eq!(symbols.get_or_create("root"), root);
    assert_eq!(symbols.len(), 2);

    assert_eq!(symbols.name(root), Some("root"));
    assert_eq!(symbols.name(expr), Some("expr"));
    assert_eq!(symbols.get("expr"), Some(expr));
    assert_eq!(symbols.get("nope"), None);
  }

  #[test]
  fn generated_names_embed_their_id() {
    let mut symbols = SymbolTable::new();
    symbols.get_or_create("root");

    let sub = symbols.generate("root");
    assert_eq!(sub, RuleId::new(1));
    assert_eq!(symbols.name(sub), Some("root_1"));

    let sub2 = symbols.generate("expr");
    assert_eq!(symbols.name(sub2), Some("expr_2"));
  }

  #[test]
  fn flatten_offsets_delimit_rules() {
    let mut symbols = SymbolTable::new();
    let root = symbols.get_or_create("root");
    let other = symbols.get_or_create("other");

    let rules = vec![
      vec![Element::RuleRef(other), Element::End],
      vec![Element::Char(97), Element::CharRngUpper(122), Element::End],
    ];
    let grammar = Grammar::new(rules, symbols, root);
    let flat = grammar.to_flat();

    assert_eq!(flat.root, 0);
    assert_eq!(flat.rule_offsets, vec![0, 2, 5]);
    assert_eq!(flat.elements.len(), 5);
    assert_eq!(
      flat.elements[0],
      FlatElement { ty: ElementType::RuleRef, value: 1 }
    );
    assert_eq!(
      flat.elements[2],
      FlatElement { ty: ElementType::Char, value: 97 }
    );
    assert_eq!(
      flat.elements[4],
      FlatElement { ty: ElementType::End, value: 0 }
    );
  }
}

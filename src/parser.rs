//! Recursive-descent parser for the grammar DSL.
//!
//! The parser keeps a byte cursor into the borrowed source; every method
//! advances `pos` and surfaces failures as a `ParseError` carrying the byte
//! offset where parsing stopped. Postfix quantifiers are rewritten into
//! synthetic recursive sub-rules while the enclosing sequence is parsed.

use log::debug;
use thiserror::Error;

use crate::grammar::{Element, Grammar, Rule, RuleId, SymbolTable};
use crate::Map;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {pos}")]
pub struct ParseError {
  pub kind: ParseErrorKind,
  /// byte offset into the source where parsing stopped.
  pub pos: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
  #[error("expecting name")]
  ExpectedName,
  #[error("expecting ::= at rule definition")]
  ExpectedAssignment,
  #[error("expecting newline or end of input at end of rule")]
  ExpectedNewlineOrEnd,
  #[error("expecting ) at end of group")]
  ExpectedCloseParen,
  #[error("quantifier has no preceding item")]
  DanglingQuantifier,
  #[error("unexpected end of input")]
  UnexpectedEndOfInput,
  #[error("malformed escape sequence")]
  MalformedEscape,
  #[error("undefined rule '{0}'")]
  UndefinedRule(String),
}

/// byte length of a UTF-8 sequence, from the high nibble of its first byte.
const UTF8_LEN: [usize; 16] = [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 3, 4];

fn is_name_char(c: u8) -> bool {
  // `_` appears in generated sub-rule names, so serialized grammars must
  // parse it back
  c.is_ascii_alphanumeric() || c == b'-' || c == b'_'
}

pub(crate) fn parse(src: &str) -> Result<Grammar, ParseError> {
  debug!("compiling grammar, {} bytes", src.len());

  let mut parser = Parser::new(src);
  parser.skip_space(true);
  while !parser.at_end() {
    parser.parse_rule()?;
  }
  parser.finish()
}

pub(crate) struct Parser<'a> {
  src: &'a [u8],
  pos: usize,
  symbols: SymbolTable,
  /// rule-id-indexed slots; `None` marks a rule that has been referenced
  /// but not yet defined.
  rules: Vec<Option<Rule>>,
  /// first-reference offset of every rule that is still undefined.
  pending: Map<RuleId, usize>,
}

impl<'a> Parser<'a> {
  pub(crate) fn new(src: &'a str) -> Self {
    Self::from_bytes(src.as_bytes())
  }

  fn from_bytes(src: &'a [u8]) -> Self {
    Self {
      src,
      pos: 0,
      symbols: SymbolTable::new(),
      rules: vec![],
      pending: Map::default(),
    }
  }

  fn peek(&self) -> Option<u8> {
    self.src.get(self.pos).copied()
  }

  fn peek_at(&self, offset: usize) -> Option<u8> {
    self.src.get(self.pos + offset).copied()
  }

  fn at_end(&self) -> bool {
    self.pos >= self.src.len()
  }

  fn eat(&mut self, bytes: &[u8]) -> bool {
    if self.src[self.pos..].starts_with(bytes) {
      self.pos += bytes.len();
      true
    } else {
      false
    }
  }

  fn err(&self, kind: ParseErrorKind) -> ParseError {
    ParseError {
      kind,
      pos: self.pos,
    }
  }

  fn fail<T>(&self, kind: ParseErrorKind) -> Result<T, ParseError> {
    Err(self.err(kind))
  }

  /// Skips spaces, tabs and `#` comments; `\r`/`\n` only when the caller
  /// says newlines are insignificant at the current position.
  fn skip_space(&mut self, newline_ok: bool) {
    loop {
      match self.peek() {
        Some(b' ') | Some(b'\t') => self.pos += 1,
        Some(b'\r') | Some(b'\n') if newline_ok => self.pos += 1,
        Some(b'#') => {
          // comment runs to end of line; the newline itself is left for
          // the caller to judge
          while let Some(c) = self.peek() {
            if c == b'\r' || c == b'\n' {
              break;
            }
            self.pos += 1;
          }
        }
        _ => break,
      }
    }
  }

  /// Decodes one logical character: a backslash escape, a fixed-width hex
  /// escape, or a permissive UTF-8 sequence.
  fn decode_char(&mut self) -> Result<u32, ParseError> {
    let first = match self.peek() {
      Some(c) => c,
      None => return self.fail(ParseErrorKind::UnexpectedEndOfInput),
    };

    if first == b'\\' {
      self.pos += 1;
      return match self.peek() {
        Some(b'x') => {
          self.pos += 1;
          self.decode_hex(2)
        }
        Some(b'u') => {
          self.pos += 1;
          self.decode_hex(4)
        }
        Some(b'U') => {
          self.pos += 1;
          self.decode_hex(8)
        }
        Some(b't') => {
          self.pos += 1;
          Ok('\t' as u32)
        }
        Some(b'r') => {
          self.pos += 1;
          Ok('\r' as u32)
        }
        Some(b'n') => {
          self.pos += 1;
          Ok('\n' as u32)
        }
        Some(c @ b'\\') | Some(c @ b'"') | Some(c @ b'[') | Some(c @ b']') => {
          self.pos += 1;
          Ok(c as u32)
        }
        _ => self.fail(ParseErrorKind::MalformedEscape),
      };
    }

    // permissive UTF-8: the leading byte declares the length; continuation
    // bytes contribute their low 6 bits without further validation
    let len = UTF8_LEN[(first >> 4) as usize];
    let mask = (1u32 << (8 - len)) - 1;
    let mut value = first as u32 & mask;
    self.pos += 1;
    for _ in 1..len {
      match self.peek() {
        Some(c) => {
          value = (value << 6) | (c as u32 & 0x3F);
          self.pos += 1;
        }
        None => break,
      }
    }
    Ok(value)
  }

  fn decode_hex(&mut self, digits: usize) -> Result<u32, ParseError> {
    let mut value = 0;
    for _ in 0..digits {
      let digit = self
        .peek()
        .and_then(|c| (c as char).to_digit(16))
        .ok_or_else(|| self.err(ParseErrorKind::MalformedEscape))?;
      value = value * 16 + digit;
      self.pos += 1;
    }
    Ok(value)
  }

  fn parse_name(&mut self) -> Result<&'a str, ParseError> {
    let start = self.pos;
    while let Some(c) = self.peek() {
      if !is_name_char(c) {
        break;
      }
      self.pos += 1;
    }
    if self.pos == start {
      return self.fail(ParseErrorKind::ExpectedName);
    }
    // name chars are ASCII, so this cannot fail
    std::str::from_utf8(&self.src[start..self.pos])
      .map_err(|_| self.err(ParseErrorKind::ExpectedName))
  }

  /// Interns a rule reference, remembering where a not-yet-defined rule
  /// was first mentioned so the failure can be reported there.
  fn ref_rule(&mut self, name: &str, ref_pos: usize) -> RuleId {
    let id = self.symbols.get_or_create(name);
    let defined = self
      .rules
      .get(id.index())
      .map_or(false, |slot| slot.is_some());
    if !defined {
      self.pending.entry(id).or_insert(ref_pos);
    }
    id
  }

  fn define_rule(&mut self, id: RuleId, rule: Rule) {
    if self.rules.len() <= id.index() {
      self.rules.resize_with(id.index() + 1, || None);
    }
    self.rules[id.index()] = Some(rule);
    self.pending.remove(&id);
  }

  fn parse_rule(&mut self) -> Result<(), ParseError> {
    let name = self.parse_name()?;
    self.skip_space(false);
    if !self.eat(b"::=") {
      return self.fail(ParseErrorKind::ExpectedAssignment);
    }
    self.skip_space(true);

    let id = self.symbols.get_or_create(name);
    let name = name.to_owned();
    self.parse_alternates(id, &name, false)?;

    match self.peek() {
      Some(b'\r') => {
        self.pos += if self.peek_at(1) == Some(b'\n') { 2 } else { 1 };
      }
      Some(b'\n') => self.pos += 1,
      Some(_) => return self.fail(ParseErrorKind::ExpectedNewlineOrEnd),
      None => {}
    }
    self.skip_space(true);
    Ok(())
  }

  fn parse_alternates(
    &mut self,
    id: RuleId,
    rule_name: &str,
    nested: bool,
  ) -> Result<(), ParseError> {
    let mut rule = Rule::new();
    self.parse_sequence(&mut rule, rule_name, nested)?;
    while self.peek() == Some(b'|') {
      rule.push(Element::Alt);
      self.pos += 1;
      self.skip_space(true);
      self.parse_sequence(&mut rule, rule_name, nested)?;
    }
    rule.push(Element::End);
    self.define_rule(id, rule);
    Ok(())
  }

  fn parse_sequence(
    &mut self,
    out: &mut Rule,
    rule_name: &str,
    nested: bool,
  ) -> Result<(), ParseError> {
    // index in `out` where the last emitted symbol began; quantifier
    // rewriting replaces exactly that range
    let mut last_sym_start = out.len();

    loop {
      match self.peek() {
        Some(b'"') => {
          // literal: a fixed sequence of chars, not a choice
          self.pos += 1;
          last_sym_start = out.len();
          while self.peek() != Some(b'"') {
            let c = self.decode_char()?;
            out.push(Element::Char(c));
          }
          self.pos += 1;
          self.skip_space(nested);
        }
        Some(b'[') => {
          self.pos += 1;
          let negated = self.eat(b"^");
          last_sym_start = out.len();
          while self.peek() != Some(b']') {
            let c = self.decode_char()?;
            let elem = if out.len() > last_sym_start {
              Element::CharAlt(c)
            } else if negated {
              Element::CharNot(c)
            } else {
              Element::Char(c)
            };
            out.push(elem);

            if self.peek() == Some(b'-') && self.peek_at(1) != Some(b']') {
              self.pos += 1;
              let upper = self.decode_char()?;
              out.push(Element::CharRngUpper(upper));
            }
          }
          self.pos += 1;
          self.skip_space(nested);
        }
        Some(c) if is_name_char(c) => {
          let ref_pos = self.pos;
          let name = self.parse_name()?;
          let ref_id = self.ref_rule(name, ref_pos);
          self.skip_space(nested);
          last_sym_start = out.len();
          out.push(Element::RuleRef(ref_id));
        }
        Some(b'(') => {
          // grouping: the group body becomes a synthetic rule, the group
          // itself a reference to it
          self.pos += 1;
          self.skip_space(true);
          let sub_id = self.symbols.generate(rule_name);
          self.parse_alternates(sub_id, rule_name, true)?;
          last_sym_start = out.len();
          out.push(Element::RuleRef(sub_id));
          if !self.eat(b")") {
            return self.fail(ParseErrorKind::ExpectedCloseParen);
          }
          self.skip_space(nested);
        }
        Some(c @ b'*') | Some(c @ b'+') | Some(c @ b'?') => {
          if last_sym_start == out.len() {
            return self.fail(ParseErrorKind::DanglingQuantifier);
          }

          // rewrite S* as R ::= S R |, S+ as R ::= S R | S,
          // and S? as R ::= S |
          let sub_id = self.symbols.generate(rule_name);
          let mut sub_rule: Rule = out[last_sym_start..].to_vec();
          if c == b'*' || c == b'+' {
            sub_rule.push(Element::RuleRef(sub_id));
          }
          sub_rule.push(Element::Alt);
          if c == b'+' {
            sub_rule.extend_from_slice(&out[last_sym_start..]);
          }
          sub_rule.push(Element::End);
          self.define_rule(sub_id, sub_rule);

          out.truncate(last_sym_start);
          out.push(Element::RuleRef(sub_id));

          self.pos += 1;
          self.skip_space(nested);
        }
        _ => break,
      }
    }
    Ok(())
  }

  fn finish(self) -> Result<Grammar, ParseError> {
    let Parser {
      symbols,
      mut rules,
      pending,
      ..
    } = self;

    // every reference must have been resolved by a definition; report the
    // earliest offending reference for determinism
    if let Some((&id, &pos)) = pending.iter().min_by_key(|&(_, &pos)| pos) {
      let name = symbols.name(id).map(str::to_owned).unwrap_or_default();
      return Err(ParseError {
        kind: ParseErrorKind::UndefinedRule(name),
        pos,
      });
    }

    let root = match symbols.get("root") {
      Some(id) => id,
      None => {
        return Err(ParseError {
          kind: ParseErrorKind::UndefinedRule("root".to_owned()),
          pos: 0,
        })
      }
    };

    if rules.len() < symbols.len() {
      rules.resize_with(symbols.len(), || None);
    }
    let mut table = Vec::with_capacity(rules.len());
    for (index, slot) in rules.into_iter().enumerate() {
      match slot {
        Some(rule) => table.push(rule),
        None => {
          let name = symbols
            .name(RuleId::new(index))
            .map(str::to_owned)
            .unwrap_or_default();
          return Err(ParseError {
            kind: ParseErrorKind::UndefinedRule(name),
            pos: 0,
          });
        }
      }
    }

    debug!("compiled {} rules", table.len());
    Ok(Grammar::new(table, symbols, root))
  }
}

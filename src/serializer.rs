//! Renders a compiled rule table back to canonical grammar text, one rule
//! per line. Used for logging, debugging, and round-trip tests.
//!
//! The errors here are defensive checks on invariants a correct parser
//! never violates; hitting one means the table was built by hand or a bug
//! corrupted it.

use std::fmt::Write;

use thiserror::Error;

use crate::grammar::{Element, Grammar, RuleId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} in rule {rule:?}")]
pub struct SerializeError {
  pub kind: SerializeErrorKind,
  pub rule: RuleId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SerializeErrorKind {
  #[error("malformed rule, missing end terminator")]
  MalformedRule,
  #[error("char range/alternative without preceding char element")]
  BrokenCharAdjacency,
}

pub fn serialize(grammar: &Grammar) -> Result<String, SerializeError> {
  let mut buf = String::new();
  for (id, rule) in grammar.rules() {
    serialize_rule(&mut buf, grammar, id, rule)?;
  }
  Ok(buf)
}

fn serialize_rule(
  buf: &mut String,
  grammar: &Grammar,
  id: RuleId,
  rule: &[Element],
) -> Result<(), SerializeError> {
  let err = |kind| SerializeError { kind, rule: id };

  match rule.last() {
    Some(Element::End) => {}
    _ => return Err(err(SerializeErrorKind::MalformedRule)),
  }
  let name = grammar
    .name(id)
    .ok_or_else(|| err(SerializeErrorKind::MalformedRule))?;
  write!(buf, "{} ::= ", name).unwrap();

  let body = &rule[..rule.len() - 1];
  for (i, elem) in body.iter().enumerate() {
    match *elem {
      Element::End => return Err(err(SerializeErrorKind::MalformedRule)),
      Element::Alt => buf.push_str("| "),
      Element::RuleRef(ref_id) => {
        let ref_name = grammar
          .name(ref_id)
          .ok_or_else(|| err(SerializeErrorKind::MalformedRule))?;
        write!(buf, "{} ", ref_name).unwrap();
      }
      Element::Char(c) => {
        buf.push('[');
        push_grammar_char(buf, c);
      }
      Element::CharNot(c) => {
        buf.push_str("[^");
        push_grammar_char(buf, c);
      }
      Element::CharRngUpper(c) => {
        if i == 0 || !body[i - 1].is_char_element() {
          return Err(err(SerializeErrorKind::BrokenCharAdjacency));
        }
        buf.push('-');
        push_grammar_char(buf, c);
      }
      Element::CharAlt(c) => {
        if i == 0 || !body[i - 1].is_char_element() {
          return Err(err(SerializeErrorKind::BrokenCharAdjacency));
        }
        push_grammar_char(buf, c);
      }
    }

    // the open char class runs until the next element stops extending it
    if elem.is_char_element() {
      match body.get(i + 1) {
        Some(Element::CharAlt(_)) | Some(Element::CharRngUpper(_)) => {}
        _ => buf.push_str("] "),
      }
    }
  }
  buf.push('\n');
  Ok(())
}

fn push_grammar_char(buf: &mut String, c: u32) {
  if (0x20..=0x7F).contains(&c) {
    buf.push(c as u8 as char);
  } else {
    write!(buf, "<U+{:04X}>", c).unwrap();
  }
}

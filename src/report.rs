//! Human-readable rendering of compile errors, with `file:line:col`
//! positions derived from the error's byte offset.

use std::fmt::Write;
use std::path::Path;

use crate::{Error, ParseError};

pub fn report(path: impl AsRef<Path>, input: impl AsRef<str>, err: &Error) -> String {
  match err {
    Error::Parse(err) => report_parse_error(path, input, err),
    Error::Io(err) => format!("cannot read {}: {}\n", path.as_ref().display(), err),
  }
}

fn report_parse_error(
  path: impl AsRef<Path>,
  input: impl AsRef<str>,
  err: &ParseError,
) -> String {
  let input = input.as_ref();
  let pos = err.pos.min(input.len());
  let lines = input[..pos].split('\n').collect::<Vec<_>>();
  let line = lines.len();
  let col = lines.last().map_or(0, |l| l.chars().count()) + 1;

  let mut buf = String::new();
  writeln!(
    &mut buf,
    "{} at {}:{}:{}",
    err.kind,
    path.as_ref().display(),
    line,
    col
  )
  .unwrap();

  buf
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn reports_line_and_column() {
    let input = "root ::= ws\nws expr\n";
    let err = crate::compile(input).unwrap_err();
    let rendered = report("test.gbnf", input, &err);

    assert_eq!(
      rendered,
      "expecting ::= at rule definition at test.gbnf:2:4\n"
    );
  }
}

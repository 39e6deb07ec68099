//! Recursive-descent parser for process program text.
//!
//! The surface syntax is a flat sequence of instruction calls:
//!
//! ```text
//! DECLARE(x, 5)
//! ADD(x, x, 3)
//! SUBTRACT(y, x, 1)
//! PRINT("Result: ")
//! SLEEP(2)
//! FOR([PRINT("tick"), ADD(x, x, 1)], 3)
//! ```
//!
//! Tokens may be separated by arbitrary whitespace, including newlines.
//! Atoms are double-quoted strings, alphabetic names, or decimal numbers
//! that must fit in a `u16`. `FOR` bodies nest.

use crate::atom::Atom;
use crate::instruction::Instruction;

use thiserror::Error;

/// A parse failure, carrying the offending remainder of the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at `{snippet}`")]
pub struct ParseError {
    message: String,
    snippet: String,
}

impl ParseError {
    fn new(message: impl Into<String>, rest: &str) -> Self {
        // Keep the error snippet short enough to read in a shell.
        let snippet: String = rest.chars().take(24).collect();
        ParseError {
            message: message.into(),
            snippet,
        }
    }

    /// The human-readable description of what was expected.
    pub fn message(&self) -> &str {
        &self.message
    }
}

type PResult<'a, T> = Result<(T, &'a str), ParseError>;

/// Parse a whole program: zero or more instructions until end of input.
pub fn parse_program(input: &str) -> Result<Vec<Instruction>, ParseError> {
    let mut program = Vec::new();
    let mut rest = input.trim_start();
    while !rest.is_empty() {
        let (instr, tail) = parse_instruction(rest)?;
        program.push(instr);
        rest = tail.trim_start();
    }
    Ok(program)
}

/// Parse a single instruction from the front of `input`.
pub fn parse_instruction(input: &str) -> PResult<'_, Instruction> {
    let rest = input.trim_start();
    if let Some(tail) = rest.strip_prefix("DECLARE") {
        return parse_declare(tail);
    }
    if let Some(tail) = rest.strip_prefix("ADD") {
        let ((dest, lhs, rhs), tail) = parse_three_args(tail)?;
        return Ok((Instruction::Add(dest, lhs, rhs), tail));
    }
    if let Some(tail) = rest.strip_prefix("SUBTRACT") {
        let ((dest, lhs, rhs), tail) = parse_three_args(tail)?;
        return Ok((Instruction::Sub(dest, lhs, rhs), tail));
    }
    if let Some(tail) = rest.strip_prefix("FOR") {
        return parse_for(tail);
    }
    parse_call(rest)
}

// -- calls ------------------------------------------------------------------

/// `PRINT(atom)` / `SLEEP(atom)`. Any other function name is rejected here
/// since the instruction tree has no variant for it.
fn parse_call(input: &str) -> PResult<'_, Instruction> {
    let (name, rest) = parse_bare_name(input)?;
    let rest = expect(rest, "(")?;
    let (arg, rest) = parse_atom(rest)?;
    let rest = expect(rest, ")")?;
    match name.as_str() {
        "PRINT" => Ok((Instruction::Print(arg), rest)),
        "SLEEP" => Ok((Instruction::Sleep(arg), rest)),
        _ => Err(ParseError::new(
            format!("unknown function `{}`", name),
            input,
        )),
    }
}

fn parse_declare(input: &str) -> PResult<'_, Instruction> {
    let rest = expect(input, "(")?;
    let (name, rest) = parse_bare_name(rest)?;
    let rest = expect(rest, ",")?;
    let (value, rest) = parse_atom(rest)?;
    let rest = expect(rest, ")")?;
    Ok((Instruction::Declare(name, value), rest))
}

/// Shared shape of `ADD` and `SUBTRACT`: `(dest, lhs, rhs)`.
fn parse_three_args(input: &str) -> PResult<'_, (String, Atom, Atom)> {
    let rest = expect(input, "(")?;
    let (dest, rest) = parse_bare_name(rest)?;
    let rest = expect(rest, ",")?;
    let (lhs, rest) = parse_atom(rest)?;
    let rest = expect(rest, ",")?;
    let (rhs, rest) = parse_atom(rest)?;
    let rest = expect(rest, ")")?;
    Ok(((dest, lhs, rhs), rest))
}

fn parse_for(input: &str) -> PResult<'_, Instruction> {
    let rest = expect(input, "(")?;
    let mut rest = expect(rest, "[")?;

    let mut body = Vec::new();
    loop {
        let trimmed = rest.trim_start();
        if trimmed.starts_with(']') {
            rest = trimmed;
            break;
        }
        let (instr, tail) = parse_instruction(trimmed)?;
        body.push(instr);
        let tail = tail.trim_start();
        // Commas between body items are optional, matching the tolerant
        // original syntax.
        rest = tail.strip_prefix(',').unwrap_or(tail);
    }

    let rest = expect(rest, "]")?;
    let rest = expect(rest, ",")?;
    let (count, rest) = parse_atom(rest)?;
    let rest = expect(rest, ")")?;
    Ok((Instruction::For(body, count), rest))
}

// -- atoms ------------------------------------------------------------------

/// String, name, or number, tried in that order.
pub fn parse_atom(input: &str) -> PResult<'_, Atom> {
    let rest = input.trim_start();
    if rest.starts_with('"') {
        return parse_string(rest);
    }
    if rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
        let (name, tail) = parse_bare_name(rest)?;
        return Ok((Atom::Name(name), tail));
    }
    if rest.starts_with(|c: char| c.is_ascii_digit()) {
        return parse_number(rest);
    }
    Err(ParseError::new("expected string, name, or number", rest))
}

fn parse_string(input: &str) -> PResult<'_, Atom> {
    let rest = input
        .strip_prefix('"')
        .ok_or_else(|| ParseError::new("expected opening quote", input))?;
    let end = rest
        .find('"')
        .ok_or_else(|| ParseError::new("expected closing quote", input))?;
    Ok((Atom::Str(rest[..end].to_string()), &rest[end + 1..]))
}

fn parse_bare_name(input: &str) -> PResult<'_, String> {
    let rest = input.trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    if end == 0 {
        return Err(ParseError::new("expected a name", rest));
    }
    Ok((rest[..end].to_string(), &rest[end..]))
}

fn parse_number(input: &str) -> PResult<'_, Atom> {
    let rest = input.trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return Err(ParseError::new("expected a number", rest));
    }
    let digits = &rest[..end];
    let value: u16 = digits
        .parse()
        .map_err(|_| ParseError::new("number does not fit in 16 bits", rest))?;
    Ok((Atom::Number(value), &rest[end..]))
}

/// Consume a literal punctuation token, skipping leading whitespace.
fn expect<'a>(input: &'a str, tag: &str) -> Result<&'a str, ParseError> {
    let rest = input.trim_start();
    rest.strip_prefix(tag)
        .ok_or_else(|| ParseError::new(format!("expected `{}`", tag), rest))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_declare() {
        let program = parse_program("DECLARE(x, 5)").unwrap();
        assert_eq!(
            program,
            vec![Instruction::Declare("x".into(), Atom::Number(5))]
        );
    }

    #[test]
    fn parses_arithmetic() {
        let program = parse_program("ADD(x, x, 3) SUBTRACT(y, x, \"oops\")").unwrap();
        assert_eq!(
            program,
            vec![
                Instruction::Add("x".into(), Atom::name("x"), Atom::Number(3)),
                Instruction::Sub("y".into(), Atom::name("x"), Atom::str("oops")),
            ]
        );
    }

    #[test]
    fn parses_print_and_sleep_calls() {
        let program = parse_program("PRINT(\"hello\")\nSLEEP(4)").unwrap();
        assert_eq!(
            program,
            vec![
                Instruction::Print(Atom::str("hello")),
                Instruction::Sleep(Atom::Number(4)),
            ]
        );
    }

    #[test]
    fn parses_nested_for() {
        let src = "FOR([PRINT(\"a\"), FOR([ADD(x, x, 1)], 2)], 3)";
        let program = parse_program(src).unwrap();
        assert_eq!(
            program,
            vec![Instruction::For(
                vec![
                    Instruction::Print(Atom::str("a")),
                    Instruction::For(
                        vec![Instruction::Add("x".into(), Atom::name("x"), Atom::Number(1))],
                        Atom::Number(2),
                    ),
                ],
                Atom::Number(3),
            )]
        );
    }

    #[test]
    fn for_body_commas_are_optional() {
        let with = parse_program("FOR([PRINT(\"a\"), PRINT(\"b\")], 2)").unwrap();
        let without = parse_program("FOR([PRINT(\"a\") PRINT(\"b\")], 2)").unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn empty_for_body_is_allowed() {
        let program = parse_program("FOR([], 5)").unwrap();
        assert_eq!(program, vec![Instruction::For(vec![], Atom::Number(5))]);
    }

    #[test]
    fn whitespace_is_insignificant() {
        let program = parse_program("  DECLARE ( x ,\n 10 )  ").unwrap();
        assert_eq!(
            program,
            vec![Instruction::Declare("x".into(), Atom::Number(10))]
        );
    }

    #[test]
    fn rejects_unknown_function() {
        let err = parse_program("HALT(1)").unwrap_err();
        assert!(err.message().contains("unknown function"));
    }

    #[test]
    fn rejects_oversized_number() {
        let err = parse_program("DECLARE(x, 65536)").unwrap_err();
        assert!(err.message().contains("16 bits"));
    }

    #[test]
    fn boundary_number_is_accepted() {
        let program = parse_program("DECLARE(x, 65535)").unwrap();
        assert_eq!(
            program,
            vec![Instruction::Declare("x".into(), Atom::Number(65535))]
        );
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(parse_program("PRINT(\"oops)").is_err());
    }

    #[test]
    fn empty_input_is_an_empty_program() {
        assert_eq!(parse_program("   \n ").unwrap(), vec![]);
    }
}
